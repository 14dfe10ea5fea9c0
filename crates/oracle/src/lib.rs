#![deny(clippy::all, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
//! # MPC Oracle
//!
//! Builds and runs a Model Predictive Control "oracle" controller against
//! a simulated process environment, as a ground-truth policy for
//! reinforcement-learning evaluation.
//!
//! The crate is orchestration glue: it maps environment semantics
//! (states, setpoints, disturbances, action bounds, delta-action mode)
//! onto the problem-description API of the [`optim`] toolkit, then drives
//! the receding-horizon loop — solve, apply, advance, log — for a fixed
//! number of simulated steps.
//!
//! ## Key components
//!
//! -   [`EnvParams`] describes the process: initial state, setpoint and
//!     disturbance schedules, user constraints, action bounds and the
//!     simulation horizon.
//! -   [`ProcessModel`] is the environment boundary: dimensions, state
//!     names and a dynamics callable returning a single column vector.
//! -   [`build`] translates the above into a solver and a simulator.
//! -   [`Oracle`] runs the lockstep control loop and returns the
//!     [`TrajectoryLog`].

use thiserror::Error;

pub mod builder;
pub mod config;
pub mod process;
pub mod runner;

pub use builder::build;
pub use config::{ActionBounds, ConstraintOp, EnvParams, MpcTuning, Schedule, StateConstraint};
pub use process::{FirstOrderLag, HeatedTank, ProcessModel};
pub use runner::{Oracle, TrajectoryLog};

/// Configuration and run-time errors. Configuration problems surface
/// before the loop starts; solver failures abort the run.
#[derive(Error, Debug)]
pub enum OracleError {
    #[error("unknown state name in configuration: {name}")]
    UnknownState { name: String },
    #[error("{what}: expected {expected}, got {actual}")]
    DimensionMismatch {
        what: &'static str,
        expected: usize,
        actual: usize,
    },
    #[error("delta-action mode requires reconstructed action bounds (a_space_act)")]
    MissingActionBounds,
    #[error(transparent)]
    Solve(#[from] optim::SolveError),
}
