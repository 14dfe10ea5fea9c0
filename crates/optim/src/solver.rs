//! Receding-horizon solver.
//!
//! Minimizes the horizon cost of a [`ControlProblem`] by projected
//! gradient descent: finite-difference gradients over the decision
//! sequence, an adaptive step size that grows on acceptance and halves on
//! rejection, and projection of every iterate into the decision box. The
//! previous solution, shifted one stage, warm-starts the next solve.

use nalgebra::DVector;

use crate::problem::ControlProblem;
use crate::SolveError;

/// Gradient descent iteration cap per solve.
const GD_ITERATIONS: usize = 80;

/// Relative finite-difference perturbation.
const FD_EPS: f64 = 1e-5;

/// Initial, maximum and minimum gradient step sizes.
const INITIAL_STEP: f64 = 1.0;
const MAX_STEP: f64 = 8.0;
const MIN_STEP: f64 = 1e-10;

/// Gradient-norm threshold treated as converged.
const GRAD_TOL: f64 = 1e-10;

pub struct MpcSolver {
    problem: ControlProblem,
    /// Warm-start decision sequence, one entry per prediction stage.
    u_seq: Vec<DVector<f64>>,
    /// Decision returned by the previous solve; anchors the rate term.
    last_decision: Option<DVector<f64>>,
    /// Externally supplied last applied absolute action, forwarded to the
    /// problem as `StageParams::prev_action` when it asks for one.
    prev_action: Option<DVector<f64>>,
    step_count: usize,
}

impl std::fmt::Debug for MpcSolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MpcSolver")
            .field("u_seq", &self.u_seq)
            .field("last_decision", &self.last_decision)
            .field("prev_action", &self.prev_action)
            .field("step_count", &self.step_count)
            .finish_non_exhaustive()
    }
}

impl MpcSolver {
    #[must_use]
    pub fn new(problem: ControlProblem) -> Self {
        let nu = problem.nu;
        let n_horizon = problem.n_horizon;
        let mut solver = Self {
            problem,
            u_seq: vec![DVector::zeros(nu); n_horizon],
            last_decision: None,
            prev_action: None,
            step_count: 0,
        };
        solver.set_initial_guess();
        solver
    }

    #[must_use]
    pub fn problem(&self) -> &ControlProblem {
        &self.problem
    }

    /// Index of the step the next `make_step` call will decide.
    #[must_use]
    pub fn step_count(&self) -> usize {
        self.step_count
    }

    /// Reset the warm start to the box-projected zero decision.
    pub fn set_initial_guess(&mut self) {
        let mut guess = DVector::zeros(self.problem.nu);
        self.problem.project(&mut guess);
        for u in &mut self.u_seq {
            u.copy_from(&guess);
        }
    }

    /// Supply the absolute action applied at the previous loop step. Read
    /// at the next solve when the problem reconstructs actions from
    /// increments.
    pub fn set_prev_action(&mut self, u_prev: DVector<f64>) {
        self.prev_action = Some(u_prev);
    }

    /// Solve the horizon problem from `x0` and return the first decision
    /// of the optimized sequence.
    ///
    /// # Errors
    ///
    /// Returns [`SolveError::BadInitialState`] on a width mismatch and
    /// [`SolveError::NonFiniteCost`] if the dynamics or costs produce a
    /// non-finite value. Failures are fatal; no retry is attempted.
    pub fn make_step(&mut self, x0: &DVector<f64>) -> Result<DVector<f64>, SolveError> {
        if x0.len() != self.problem.nx {
            return Err(SolveError::BadInitialState {
                expected: self.problem.nx,
                actual: x0.len(),
            });
        }

        let mut params = self.problem.params_at(self.step_count);
        if self.problem.uses_prev_action {
            params.prev_action = self.prev_action.clone();
        }

        for u in &mut self.u_seq {
            self.problem.project(u);
        }

        let mut cost = self
            .problem
            .horizon_cost(x0, &self.u_seq, &params, self.last_decision.as_ref());
        if !cost.is_finite() {
            return Err(SolveError::NonFiniteCost {
                step: self.step_count,
            });
        }

        let mut step = INITIAL_STEP;
        let mut iterations = 0;
        for _ in 0..GD_ITERATIONS {
            iterations += 1;
            let grad = self.gradient(x0, &params);
            let grad_norm: f64 = grad.iter().map(|g| g.norm_squared()).sum::<f64>().sqrt();
            if grad_norm < GRAD_TOL {
                break;
            }

            let mut improved = false;
            while step >= MIN_STEP {
                let mut candidate = self.u_seq.clone();
                for (u, g) in candidate.iter_mut().zip(&grad) {
                    *u -= g * step;
                    self.problem.project(u);
                }
                let candidate_cost = self.problem.horizon_cost(
                    x0,
                    &candidate,
                    &params,
                    self.last_decision.as_ref(),
                );
                if candidate_cost.is_finite() && candidate_cost < cost - f64::EPSILON * cost.abs()
                {
                    self.u_seq = candidate;
                    cost = candidate_cost;
                    step = (step * 2.0).min(MAX_STEP);
                    improved = true;
                    break;
                }
                step *= 0.5;
            }
            if !improved {
                break;
            }
        }

        tracing::debug!(
            step = self.step_count,
            cost,
            iterations,
            "horizon solve complete"
        );

        let applied = self.u_seq[0].clone();
        self.last_decision = Some(applied.clone());

        // shift the sequence one stage for the next warm start, repeating
        // the final stage
        self.u_seq.rotate_left(1);
        if self.u_seq.len() >= 2 {
            let repeated = self.u_seq[self.u_seq.len() - 2].clone();
            let tail = self.u_seq.len() - 1;
            self.u_seq[tail].copy_from(&repeated);
        }

        self.step_count += 1;
        Ok(applied)
    }

    /// Central finite-difference gradient of the horizon cost with respect
    /// to every decision component.
    fn gradient(
        &self,
        x0: &DVector<f64>,
        params: &crate::problem::StageParams,
    ) -> Vec<DVector<f64>> {
        let mut grad = vec![DVector::zeros(self.problem.nu); self.problem.n_horizon];
        let mut probe = self.u_seq.clone();

        for k in 0..self.problem.n_horizon {
            for j in 0..self.problem.nu {
                let u0 = probe[k][j];
                let eps = FD_EPS * (1.0 + u0.abs());

                probe[k][j] = u0 + eps;
                let up = self
                    .problem
                    .horizon_cost(x0, &probe, params, self.last_decision.as_ref());
                probe[k][j] = u0 - eps;
                let down = self
                    .problem
                    .horizon_cost(x0, &probe, params, self.last_decision.as_ref());
                probe[k][j] = u0;

                grad[k][j] = (up - down) / (2.0 * eps);
            }
        }
        grad
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::problem::StageParams;
    use std::cell::RefCell;
    use std::rc::Rc;

    fn integrator_problem() -> ControlProblem {
        // dx = u, track setpoint 1.0
        let mut problem = ControlProblem::new(
            1,
            1,
            5,
            0.5,
            Box::new(|_x, u, _p| u.clone()),
            Box::new(|x, _u, p| (x[0] - p.setpoint[0]).powi(2)),
            Box::new(|x, p| (x[0] - p.setpoint[0]).powi(2)),
            Box::new(|_i| StageParams {
                setpoint: DVector::from_vec(vec![1.0]),
                disturbance: None,
                prev_action: None,
            }),
        );
        problem.set_action_bounds(DVector::from_vec(vec![-1.0]), DVector::from_vec(vec![1.0]));
        problem
    }

    #[test]
    fn solver_pushes_toward_the_setpoint() {
        let mut solver = MpcSolver::new(integrator_problem());
        let u = solver.make_step(&DVector::from_vec(vec![0.0])).unwrap();
        assert!(u[0] > 0.5, "expected a strong positive action, got {}", u[0]);
        assert!(u[0] <= 1.0 + 1e-12);
    }

    #[test]
    fn solver_respects_the_decision_box() {
        let mut solver = MpcSolver::new(integrator_problem());
        // far below the setpoint: the unconstrained optimum is far above 1
        let u = solver.make_step(&DVector::from_vec(vec![-50.0])).unwrap();
        assert!(u[0] <= 1.0 + 1e-12);
        assert!(u[0] >= -1.0 - 1e-12);
    }

    #[test]
    fn state_width_mismatch_is_fatal() {
        let mut solver = MpcSolver::new(integrator_problem());
        let err = solver
            .make_step(&DVector::from_vec(vec![0.0, 0.0]))
            .unwrap_err();
        assert!(matches!(
            err,
            SolveError::BadInitialState {
                expected: 1,
                actual: 2
            }
        ));
    }

    #[test]
    fn feed_sees_the_step_about_to_be_decided() {
        let seen = Rc::new(RefCell::new(Vec::new()));
        let seen_feed = Rc::clone(&seen);
        let mut problem = ControlProblem::new(
            1,
            1,
            2,
            0.1,
            Box::new(|_x, u, _p| u.clone()),
            Box::new(|x, _u, p| (x[0] - p.setpoint[0]).powi(2)),
            Box::new(|x, p| (x[0] - p.setpoint[0]).powi(2)),
            Box::new(move |i| {
                seen_feed.borrow_mut().push(i);
                StageParams {
                    setpoint: DVector::from_vec(vec![0.0]),
                    disturbance: None,
                    prev_action: None,
                }
            }),
        );
        problem.set_action_bounds(DVector::from_vec(vec![-1.0]), DVector::from_vec(vec![1.0]));

        let mut solver = MpcSolver::new(problem);
        let x0 = DVector::from_vec(vec![0.0]);
        solver.make_step(&x0).unwrap();
        solver.make_step(&x0).unwrap();
        assert_eq!(*seen.borrow(), vec![0, 1]);
    }
}
