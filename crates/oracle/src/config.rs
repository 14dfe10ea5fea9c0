//! Environment parameters and MPC tuning.

use nalgebra::{DMatrix, DVector};

/// A time-indexed sequence of values for one named channel (a tracked
/// state or a disturbance).
#[derive(Clone, Debug)]
pub struct Schedule {
    pub name: String,
    pub values: Vec<f64>,
}

impl Schedule {
    #[must_use]
    pub fn new(name: impl Into<String>, values: Vec<f64>) -> Self {
        Self {
            name: name.into(),
            values,
        }
    }

    /// Value active at step `index`. Indexing past the end holds the last
    /// entry; it never wraps and never errors.
    #[must_use]
    pub fn value_at(&self, index: usize) -> f64 {
        self.values[index.min(self.values.len() - 1)]
    }
}

/// Box bounds on an action vector.
#[derive(Clone, Debug)]
pub struct ActionBounds {
    pub low: DVector<f64>,
    pub high: DVector<f64>,
}

impl ActionBounds {
    #[must_use]
    pub fn new(low: Vec<f64>, high: Vec<f64>) -> Self {
        Self {
            low: DVector::from_vec(low),
            high: DVector::from_vec(high),
        }
    }
}

/// Operator of a user-declared state constraint.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConstraintOp {
    /// `state <= bound` — maps to an upper bound.
    Le,
    /// `state >= bound` — maps to a lower bound.
    Ge,
}

/// A per-state bound declared by the user.
#[derive(Clone, Debug)]
pub struct StateConstraint {
    pub state: String,
    pub bound: f64,
    pub op: ConstraintOp,
}

impl StateConstraint {
    #[must_use]
    pub fn new(state: impl Into<String>, bound: f64, op: ConstraintOp) -> Self {
        Self {
            state: state.into(),
            bound,
            op,
        }
    }
}

/// Configuration describing one control run of the process.
#[derive(Clone, Debug)]
pub struct EnvParams {
    /// Initial state; at least as wide as the model state.
    pub x0: DVector<f64>,
    /// Setpoint schedules, one per tracked state, in channel order.
    pub setpoints: Vec<Schedule>,
    /// Disturbance schedules, one per disturbance channel, in slot order.
    pub disturbances: Option<Vec<Schedule>>,
    /// User-declared state bounds.
    pub constraints: Vec<StateConstraint>,
    /// Bounds on the decision vector: the absolute controlled action, or
    /// the increment in delta-action mode.
    pub a_space: ActionBounds,
    /// Bounds on the reconstructed absolute action in delta-action mode.
    pub a_space_act: Option<ActionBounds>,
    /// Whether actions are increments on the previously applied action.
    pub a_delta: bool,
    /// Initial action value every slot starts from in delta-action mode.
    pub a_0: f64,
    /// Simulation step size.
    pub dt: f64,
    /// Simulation horizon: the loop runs exactly this many steps.
    pub n_sim: usize,
    /// Total simulated time.
    pub tsim: f64,
}

impl EnvParams {
    /// Minimal absolute-action configuration; optional pieces start empty.
    #[must_use]
    pub fn basic(
        x0: Vec<f64>,
        setpoints: Vec<Schedule>,
        a_space: ActionBounds,
        dt: f64,
        n_sim: usize,
    ) -> Self {
        Self {
            x0: DVector::from_vec(x0),
            setpoints,
            disturbances: None,
            constraints: Vec::new(),
            a_space,
            a_space_act: None,
            a_delta: false,
            a_0: 0.0,
            dt,
            n_sim,
            tsim: dt * n_sim as f64,
        }
    }
}

/// MPC tuning overrides: prediction horizon and weighting matrices. Each
/// field defaults independently via [`MpcTuning::default_for`].
#[derive(Clone, Debug)]
pub struct MpcTuning {
    /// Prediction horizon, distinct from the simulation horizon.
    pub n_horizon: usize,
    /// State tracking weights, `nx x nx`.
    pub q: DMatrix<f64>,
    /// Action (or increment) weights, sized to the controlled width.
    pub r: DMatrix<f64>,
}

impl MpcTuning {
    /// Defaults: horizon 5, `Q = I`, `R = 0`. Constructs fresh matrices on
    /// every call so runs built from the same template never alias.
    #[must_use]
    pub fn default_for(nx: usize, n_ctl: usize) -> Self {
        Self {
            n_horizon: 5,
            q: DMatrix::identity(nx, nx),
            r: DMatrix::zeros(n_ctl, n_ctl),
        }
    }
}
