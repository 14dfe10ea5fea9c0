#![deny(clippy::all, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
//! # Receding-Horizon Optimization Toolkit
//!
//! This crate is the numerical backend for the MPC oracle. It owns the
//! pieces the oracle core treats as black boxes: a control-problem
//! description ([`ControlProblem`]), a receding-horizon solver
//! ([`MpcSolver`]) and a forward simulator ([`Simulator`]) built on a
//! fixed-step RK4 integrator.
//!
//! The solver is penalty-based: decision variables live in a box that is
//! enforced by projection, state bounds and soft constraints are folded
//! into the horizon cost as quadratic penalties, and the minimization is a
//! projected gradient descent with finite-difference gradients and an
//! adaptive step size.
//!
//! ## Time convention
//!
//! Both [`MpcSolver::make_step`] and [`Simulator::make_step`] keep their
//! own step counter, starting at 0 and advancing once per call. The
//! solver's parameter feed is evaluated at the index of the step about to
//! be decided; the simulator's feed at the index of the interval being
//! integrated. Driving them in lockstep therefore hands both feeds the
//! same index at every loop iteration.

use thiserror::Error;

pub mod integrator;
pub mod problem;
pub mod simulator;
pub mod solver;

pub use integrator::rk4_step;
pub use problem::{ControlProblem, SoftConstraint, StageParams};
pub use simulator::Simulator;
pub use solver::MpcSolver;

/// Errors surfaced by the solver and simulator. Fatal; never retried.
#[derive(Error, Debug)]
pub enum SolveError {
    #[error("initial state width mismatch: expected {expected}, got {actual}")]
    BadInitialState { expected: usize, actual: usize },
    #[error("horizon cost became non-finite at solver step {step}")]
    NonFiniteCost { step: usize },
}
