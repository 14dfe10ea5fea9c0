//! Control Loop Runner.
//!
//! Drives the receding-horizon loop for exactly `n_sim` steps, keeping
//! solver and simulator in lockstep: solve for the next action, apply it
//! to the simulator, log the new state and the applied action, repeat.
//! A solver failure at any step is fatal and propagates immediately; there
//! are no retries, fallbacks or early exits.

use std::sync::Arc;

use nalgebra::DVector;

use crate::builder::build;
use crate::config::{EnvParams, MpcTuning};
use crate::process::ProcessModel;
use crate::OracleError;

/// Per-step trajectories of one control run. Each log holds exactly one
/// entry per simulated step.
#[derive(Clone, Debug)]
pub struct TrajectoryLog {
    /// State after each simulation step.
    pub states: Vec<DVector<f64>>,
    /// Applied action at each step (controlled width).
    pub actions: Vec<DVector<f64>>,
    /// Raw increments, recorded only in delta-action mode.
    pub increments: Option<Vec<DVector<f64>>>,
}

impl TrajectoryLog {
    fn with_capacity(n: usize, delta: bool) -> Self {
        Self {
            states: Vec::with_capacity(n),
            actions: Vec::with_capacity(n),
            increments: delta.then(|| Vec::with_capacity(n)),
        }
    }

    /// Number of logged steps.
    #[must_use]
    pub fn len(&self) -> usize {
        self.states.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }
}

/// The MPC oracle: a process model, its run configuration and tuning.
pub struct Oracle {
    model: Arc<dyn ProcessModel>,
    params: EnvParams,
    tuning: MpcTuning,
}

impl Oracle {
    /// Oracle with default tuning (`N_horizon = 5`, `Q = I`, `R = 0`).
    #[must_use]
    pub fn new(model: Arc<dyn ProcessModel>, params: EnvParams) -> Self {
        let tuning = MpcTuning::default_for(model.nx(), model.nu() - model.nd());
        Self {
            model,
            params,
            tuning,
        }
    }

    #[must_use]
    pub fn with_tuning(model: Arc<dyn ProcessModel>, params: EnvParams, tuning: MpcTuning) -> Self {
        Self {
            model,
            params,
            tuning,
        }
    }

    /// Run the full receding-horizon loop and return the trajectories.
    ///
    /// # Errors
    ///
    /// Configuration errors surface before the first step; solver errors
    /// abort the run at the failing step.
    pub fn run(&self) -> Result<TrajectoryLog, OracleError> {
        let (mut solver, mut simulator) = build(&self.model, &self.params, &self.tuning)?;

        let nx = self.model.nx();
        let nu = self.model.nu();
        let n_ctl = nu - self.model.nd();
        let delta = self.params.a_delta;

        let mut x = self.params.x0.rows(0, nx).into_owned();
        simulator.set_state(x.clone())?;
        solver.set_initial_guess();

        // delta-mode bookkeeping: the full-width previously applied action
        let mut u_prev = delta.then(|| DVector::from_element(nu, self.params.a_0));

        let mut log = TrajectoryLog::with_capacity(self.params.n_sim, delta);
        tracing::info!(
            steps = self.params.n_sim,
            dt = self.params.dt,
            delta_mode = delta,
            "starting oracle control run"
        );

        for step in 0..self.params.n_sim {
            if let Some(prev) = u_prev.as_ref() {
                solver.set_prev_action(prev.clone());
            }

            let decision = solver.make_step(&x)?;

            let applied = match u_prev.as_mut() {
                Some(prev) => {
                    // increment on top of the previous action
                    *prev += &decision;
                    prev.rows(0, n_ctl).into_owned()
                }
                None => decision.clone(),
            };

            x = simulator.make_step(&applied);

            tracing::debug!(step, state = ?x.as_slice(), action = ?applied.as_slice(), "loop step");

            log.states.push(x.clone());
            log.actions.push(applied);
            if let Some(increments) = log.increments.as_mut() {
                increments.push(decision);
            }
        }

        tracing::info!(steps = log.len(), "oracle control run complete");
        Ok(log)
    }
}
