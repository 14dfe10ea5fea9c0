//! Control-problem description.
//!
//! A [`ControlProblem`] collects everything the solver needs: the
//! dynamics, the stage and terminal costs, decision-variable bounds,
//! per-component rate weights, hard state bounds, soft constraints and
//! the parameter feed. Parameters are held constant across the prediction
//! horizon of a single solve; they change only between solves, through the
//! feed.

use nalgebra::DVector;

use crate::integrator::rk4_step;

/// Time-varying parameters handed to the solver or simulator before a
/// step. Produced by a parameter-feed callback from a schedule index.
#[derive(Clone, Debug)]
pub struct StageParams {
    /// Active setpoint, one entry per tracked channel.
    pub setpoint: DVector<f64>,
    /// Active disturbance values, if the problem carries disturbances.
    pub disturbance: Option<DVector<f64>>,
    /// Previously applied absolute action. Injected by the solver when the
    /// problem declares it reconstructs actions from increments.
    pub prev_action: Option<DVector<f64>>,
}

pub type DynamicsFn = Box<dyn Fn(&DVector<f64>, &DVector<f64>, &StageParams) -> DVector<f64>>;
pub type StageCostFn = Box<dyn Fn(&DVector<f64>, &DVector<f64>, &StageParams) -> f64>;
pub type TerminalCostFn = Box<dyn Fn(&DVector<f64>, &StageParams) -> f64>;
pub type ConstraintFn = Box<dyn Fn(&DVector<f64>, &DVector<f64>, &StageParams) -> DVector<f64>>;
pub type ParamFeedFn = Box<dyn Fn(usize) -> StageParams>;

/// Penalty weight used to enforce hard state bounds inside the
/// penalty-based solver.
const STATE_BOUND_PENALTY: f64 = 1e6;

/// An inequality enforced through the objective: `eval` must be `>= 0`
/// componentwise, and each unit of violation costs `penalty * v^2`.
pub struct SoftConstraint {
    pub penalty: f64,
    eval: ConstraintFn,
}

impl SoftConstraint {
    #[must_use]
    pub fn new(penalty: f64, eval: ConstraintFn) -> Self {
        Self { penalty, eval }
    }
}

/// Everything the solver needs to score a candidate decision sequence.
pub struct ControlProblem {
    /// State width.
    pub nx: usize,
    /// Decision-vector width (absolute action or increment).
    pub nu: usize,
    /// Prediction horizon (number of stages), distinct from the
    /// simulation horizon the caller runs the loop for.
    pub n_horizon: usize,
    /// Integration step used in the prediction rollout.
    pub dt: f64,
    /// Decision box, enforced by projection.
    pub u_lower: DVector<f64>,
    pub u_upper: DVector<f64>,
    /// Hard state bounds, enforced as high-weight penalties.
    pub x_lower: DVector<f64>,
    pub x_upper: DVector<f64>,
    /// Incremental cost on successive decisions, one weight per component.
    pub rate_weight: DVector<f64>,
    /// Whether the stage cost and dynamics read `StageParams::prev_action`.
    pub uses_prev_action: bool,
    rhs: DynamicsFn,
    stage_cost: StageCostFn,
    terminal_cost: TerminalCostFn,
    soft: Vec<SoftConstraint>,
    p_fun: ParamFeedFn,
}

impl ControlProblem {
    #[must_use]
    pub fn new(
        nx: usize,
        nu: usize,
        n_horizon: usize,
        dt: f64,
        rhs: DynamicsFn,
        stage_cost: StageCostFn,
        terminal_cost: TerminalCostFn,
        p_fun: ParamFeedFn,
    ) -> Self {
        Self {
            nx,
            nu,
            n_horizon,
            dt,
            u_lower: DVector::from_element(nu, f64::NEG_INFINITY),
            u_upper: DVector::from_element(nu, f64::INFINITY),
            x_lower: DVector::from_element(nx, f64::NEG_INFINITY),
            x_upper: DVector::from_element(nx, f64::INFINITY),
            rate_weight: DVector::zeros(nu),
            uses_prev_action: false,
            rhs,
            stage_cost,
            terminal_cost,
            soft: Vec::new(),
            p_fun,
        }
    }

    /// Box bounds on the decision vector.
    pub fn set_action_bounds(&mut self, lower: DVector<f64>, upper: DVector<f64>) {
        self.u_lower = lower;
        self.u_upper = upper;
    }

    /// Hard upper bound on one state component.
    pub fn set_state_upper(&mut self, index: usize, bound: f64) {
        self.x_upper[index] = bound;
    }

    /// Hard lower bound on one state component.
    pub fn set_state_lower(&mut self, index: usize, bound: f64) {
        self.x_lower[index] = bound;
    }

    pub fn set_rate_weight(&mut self, weight: DVector<f64>) {
        self.rate_weight = weight;
    }

    pub fn set_uses_prev_action(&mut self, uses: bool) {
        self.uses_prev_action = uses;
    }

    pub fn add_soft_constraint(&mut self, constraint: SoftConstraint) {
        self.soft.push(constraint);
    }

    /// Evaluate the parameter feed at a schedule index.
    #[must_use]
    pub fn params_at(&self, index: usize) -> StageParams {
        (self.p_fun)(index)
    }

    /// Clamp a decision vector into the box, in place.
    pub fn project(&self, u: &mut DVector<f64>) {
        for j in 0..self.nu {
            u[j] = u[j].clamp(self.u_lower[j], self.u_upper[j]);
        }
    }

    /// Score a candidate decision sequence: rolled-out tracking cost plus
    /// rate, soft-constraint and state-bound penalties. `u_anchor` is the
    /// decision applied at the previous solver step, anchoring the rate
    /// term; `None` on the very first solve.
    #[must_use]
    pub fn horizon_cost(
        &self,
        x0: &DVector<f64>,
        u_seq: &[DVector<f64>],
        params: &StageParams,
        u_anchor: Option<&DVector<f64>>,
    ) -> f64 {
        let mut cost = 0.0;
        let mut x = x0.clone();

        for (k, u) in u_seq.iter().enumerate() {
            cost += (self.stage_cost)(&x, u, params);
            cost += self.rate_cost(k, u, u_seq, u_anchor);
            cost += self.soft_cost(&x, u, params);

            x = rk4_step(|x| (self.rhs)(x, u, params), &x, self.dt);
            cost += self.state_bound_cost(&x);
        }

        cost + (self.terminal_cost)(&x, params)
    }

    fn rate_cost(
        &self,
        k: usize,
        u: &DVector<f64>,
        u_seq: &[DVector<f64>],
        u_anchor: Option<&DVector<f64>>,
    ) -> f64 {
        let mut cost = 0.0;
        for j in 0..self.nu {
            let w = self.rate_weight[j];
            if w == 0.0 {
                continue;
            }
            let prev = if k == 0 {
                match u_anchor {
                    Some(anchor) => anchor[j],
                    None => u[j], // first stage of the first solve is unanchored
                }
            } else {
                u_seq[k - 1][j]
            };
            let d = u[j] - prev;
            cost += w * d * d;
        }
        cost
    }

    fn soft_cost(&self, x: &DVector<f64>, u: &DVector<f64>, params: &StageParams) -> f64 {
        let mut cost = 0.0;
        for c in &self.soft {
            let g = (c.eval)(x, u, params);
            for i in 0..g.len() {
                let violation = (-g[i]).max(0.0);
                cost += c.penalty * violation * violation;
            }
        }
        cost
    }

    fn state_bound_cost(&self, x: &DVector<f64>) -> f64 {
        let mut cost = 0.0;
        for i in 0..self.nx {
            let above = (x[i] - self.x_upper[i]).max(0.0);
            let below = (self.x_lower[i] - x[i]).max(0.0);
            cost += STATE_BOUND_PENALTY * (above * above + below * below);
        }
        cost
    }
}
