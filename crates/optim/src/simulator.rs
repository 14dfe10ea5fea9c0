//! Forward simulator.
//!
//! Advances the process state one interval at a time under the absolute
//! applied action, using the same RK4 integrator as the solver rollout but
//! its own parameter feed. See the crate docs for the time convention
//! shared with [`crate::MpcSolver`].

use nalgebra::DVector;

use crate::integrator::rk4_step;
use crate::problem::{DynamicsFn, ParamFeedFn};
use crate::SolveError;

pub struct Simulator {
    pub nx: usize,
    pub dt: f64,
    rhs: DynamicsFn,
    p_fun: ParamFeedFn,
    x: DVector<f64>,
    step_count: usize,
}

impl std::fmt::Debug for Simulator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Simulator")
            .field("nx", &self.nx)
            .field("dt", &self.dt)
            .field("x", &self.x)
            .field("step_count", &self.step_count)
            .finish_non_exhaustive()
    }
}

impl Simulator {
    #[must_use]
    pub fn new(nx: usize, dt: f64, rhs: DynamicsFn, p_fun: ParamFeedFn) -> Self {
        Self {
            nx,
            dt,
            rhs,
            p_fun,
            x: DVector::zeros(nx),
            step_count: 0,
        }
    }

    /// Set the simulator state, typically once before the loop starts.
    ///
    /// # Errors
    ///
    /// Returns [`SolveError::BadInitialState`] on a width mismatch.
    pub fn set_state(&mut self, x0: DVector<f64>) -> Result<(), SolveError> {
        if x0.len() != self.nx {
            return Err(SolveError::BadInitialState {
                expected: self.nx,
                actual: x0.len(),
            });
        }
        self.x = x0;
        Ok(())
    }

    #[must_use]
    pub fn state(&self) -> &DVector<f64> {
        &self.x
    }

    /// Index of the interval the next `make_step` call will integrate.
    #[must_use]
    pub fn step_count(&self) -> usize {
        self.step_count
    }

    /// Advance one interval under the applied action and return the new
    /// state.
    pub fn make_step(&mut self, u: &DVector<f64>) -> DVector<f64> {
        let params = (self.p_fun)(self.step_count);
        let next = rk4_step(|x| (self.rhs)(x, u, &params), &self.x, self.dt);
        self.x.copy_from(&next);
        self.step_count += 1;
        next
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::problem::StageParams;
    use std::cell::RefCell;
    use std::rc::Rc;

    fn constant_params(_i: usize) -> StageParams {
        StageParams {
            setpoint: DVector::zeros(0),
            disturbance: None,
            prev_action: None,
        }
    }

    #[test]
    fn simulator_advances_the_lag_dynamics() {
        // dx = u - x, x(0) = 0, u = 1 => x(dt) = 1 - e^-dt
        let mut sim = Simulator::new(
            1,
            0.2,
            Box::new(|x, u, _p| DVector::from_vec(vec![u[0] - x[0]])),
            Box::new(constant_params),
        );
        let x1 = sim.make_step(&DVector::from_vec(vec![1.0]));
        assert!((x1[0] - (1.0 - (-0.2_f64).exp())).abs() < 1e-6);
    }

    #[test]
    fn set_state_rejects_wrong_width() {
        let mut sim = Simulator::new(
            2,
            0.1,
            Box::new(|x, _u, _p| x.clone()),
            Box::new(constant_params),
        );
        assert!(sim.set_state(DVector::zeros(3)).is_err());
    }

    #[test]
    fn feed_sees_the_interval_being_integrated() {
        let seen = Rc::new(RefCell::new(Vec::new()));
        let seen_feed = Rc::clone(&seen);
        let mut sim = Simulator::new(
            1,
            0.1,
            Box::new(|_x, u, _p| u.clone()),
            Box::new(move |i| {
                seen_feed.borrow_mut().push(i);
                constant_params(i)
            }),
        );
        let u = DVector::from_vec(vec![0.0]);
        sim.make_step(&u);
        sim.make_step(&u);
        assert_eq!(*seen.borrow(), vec![0, 1]);
    }
}
