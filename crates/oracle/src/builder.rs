//! Problem Builder.
//!
//! Translates [`EnvParams`] plus a [`ProcessModel`] into a ready-to-solve
//! [`optim::ControlProblem`] (wrapped in an [`optim::MpcSolver`]) and a
//! matching [`optim::Simulator`].
//!
//! The full action vector handed to the model is always `nu` wide: the
//! controlled slice first, then the disturbance slots (zero when no
//! disturbance schedule is configured). In delta-action mode the decision
//! vector is the increment, the absolute action is reconstructed from
//! `StageParams::prev_action`, and the disturbance slots of the increment
//! are pinned to zero.

use std::sync::Arc;

use nalgebra::DVector;
use optim::problem::{DynamicsFn, ParamFeedFn, StageCostFn, TerminalCostFn};
use optim::{ControlProblem, MpcSolver, Simulator, SoftConstraint, StageParams};

use crate::config::{ConstraintOp, EnvParams, MpcTuning};
use crate::process::ProcessModel;
use crate::OracleError;

/// Penalty coefficient for the reconstructed-action soft bounds in
/// delta-action mode. Fixed policy default.
const DELTA_ACTION_PENALTY: f64 = 1000.0;

/// Build the solver and simulator for one control run.
///
/// # Errors
///
/// Fails fast on configuration errors: unresolvable state names, width
/// mismatches, empty schedules, or delta-action mode without
/// `a_space_act`. Nothing is silently coerced.
pub fn build(
    model: &Arc<dyn ProcessModel>,
    params: &EnvParams,
    tuning: &MpcTuning,
) -> Result<(MpcSolver, Simulator), OracleError> {
    let nx = model.nx();
    let nu = model.nu();
    let nd = model.nd();
    let n_ctl = nu - nd;
    let n_dec = if params.a_delta { nu } else { n_ctl };

    validate(params, tuning, nx, n_ctl, nd)?;

    let names = model.state_names();
    let mut sp_idx = Vec::with_capacity(params.setpoints.len());
    let mut sp_weight = Vec::with_capacity(params.setpoints.len());
    for sched in &params.setpoints {
        let idx = resolve(&names, &sched.name)?;
        sp_idx.push(idx);
        sp_weight.push(tuning.q[(idx, idx)]);
    }

    let a_delta = params.a_delta;
    let has_dist = params.disturbances.is_some();

    // prediction-side dynamics: decision vector in, derivative out
    let rhs_model = Arc::clone(model);
    let rhs: DynamicsFn = Box::new(move |x, u_dec, p| {
        let u_ctl = controlled_action(u_dec, p, n_ctl, a_delta);
        let u_full = assemble_full(&u_ctl, p, nu, n_ctl, has_dist);
        rhs_model.rhs(x, &u_full)
    });

    let r = tuning.r.clone();
    let sp_idx_stage = sp_idx.clone();
    let sp_w_stage = sp_weight.clone();
    let stage_cost: StageCostFn = Box::new(move |x, u_dec, p| {
        let mut cost = tracking_cost(x, p, &sp_idx_stage, &sp_w_stage);
        let u_ctl = controlled_action(u_dec, p, n_ctl, a_delta);
        cost += u_ctl.dot(&(&r * &u_ctl));
        cost
    });

    // terminal cost carries only the state-tracking sum
    let sp_idx_term = sp_idx;
    let sp_w_term = sp_weight;
    let terminal_cost: TerminalCostFn =
        Box::new(move |x, p| tracking_cost(x, p, &sp_idx_term, &sp_w_term));

    let mut problem = ControlProblem::new(
        nx,
        n_dec,
        tuning.n_horizon,
        params.dt,
        rhs,
        stage_cost,
        terminal_cost,
        make_feed(params),
    );
    problem.set_uses_prev_action(a_delta);

    let r_diag = tuning.r.diagonal();
    if a_delta {
        // decision box: increment bounds for the controlled slice,
        // disturbance slots pinned to zero
        let mut lower = DVector::zeros(n_dec);
        let mut upper = DVector::zeros(n_dec);
        lower.rows_mut(0, n_ctl).copy_from(&params.a_space.low);
        upper.rows_mut(0, n_ctl).copy_from(&params.a_space.high);
        problem.set_action_bounds(lower, upper);

        let mut rate = DVector::zeros(n_dec);
        rate.rows_mut(0, n_ctl).copy_from(&r_diag);
        problem.set_rate_weight(rate);

        // the reconstructed absolute action is not a decision variable,
        // so its bounds are soft
        let act = params
            .a_space_act
            .as_ref()
            .ok_or(OracleError::MissingActionBounds)?
            .clone();
        problem.add_soft_constraint(SoftConstraint::new(
            DELTA_ACTION_PENALTY,
            Box::new(move |_x, u_dec, p| {
                let u_ctl = controlled_action(u_dec, p, n_ctl, true);
                let mut g = DVector::zeros(2 * n_ctl);
                for j in 0..n_ctl {
                    g[j] = u_ctl[j] - act.low[j];
                    g[n_ctl + j] = act.high[j] - u_ctl[j];
                }
                g
            }),
        ));
    } else {
        problem.set_action_bounds(params.a_space.low.clone(), params.a_space.high.clone());
        problem.set_rate_weight(r_diag);
    }

    for c in &params.constraints {
        let idx = resolve(&names, &c.state)?;
        match c.op {
            ConstraintOp::Le => problem.set_state_upper(idx, c.bound),
            ConstraintOp::Ge => problem.set_state_lower(idx, c.bound),
        }
    }

    let solver = MpcSolver::new(problem);

    // simulator side: absolute applied action, its own feed
    let sim_model = Arc::clone(model);
    let sim_rhs: DynamicsFn = Box::new(move |x, u_applied, p| {
        let u_ctl = u_applied.rows(0, n_ctl).into_owned();
        let u_full = assemble_full(&u_ctl, p, nu, n_ctl, has_dist);
        sim_model.rhs(x, &u_full)
    });
    let simulator = Simulator::new(nx, params.dt, sim_rhs, make_feed(params));

    Ok((solver, simulator))
}

fn validate(
    params: &EnvParams,
    tuning: &MpcTuning,
    nx: usize,
    n_ctl: usize,
    nd: usize,
) -> Result<(), OracleError> {
    if params.x0.len() < nx {
        return Err(OracleError::DimensionMismatch {
            what: "initial state width",
            expected: nx,
            actual: params.x0.len(),
        });
    }
    if tuning.q.nrows() != nx || tuning.q.ncols() != nx {
        return Err(OracleError::DimensionMismatch {
            what: "Q rows/cols",
            expected: nx,
            actual: tuning.q.nrows().max(tuning.q.ncols()),
        });
    }
    if tuning.r.nrows() != n_ctl || tuning.r.ncols() != n_ctl {
        return Err(OracleError::DimensionMismatch {
            what: "R rows/cols",
            expected: n_ctl,
            actual: tuning.r.nrows().max(tuning.r.ncols()),
        });
    }
    if params.a_space.low.len() != n_ctl || params.a_space.high.len() != n_ctl {
        return Err(OracleError::DimensionMismatch {
            what: "a_space width",
            expected: n_ctl,
            actual: params.a_space.low.len().max(params.a_space.high.len()),
        });
    }
    if params.a_delta {
        match params.a_space_act.as_ref() {
            None => return Err(OracleError::MissingActionBounds),
            Some(act) => {
                if act.low.len() != n_ctl || act.high.len() != n_ctl {
                    return Err(OracleError::DimensionMismatch {
                        what: "a_space_act width",
                        expected: n_ctl,
                        actual: act.low.len().max(act.high.len()),
                    });
                }
            }
        }
    }
    for sched in &params.setpoints {
        if sched.values.is_empty() {
            return Err(OracleError::DimensionMismatch {
                what: "setpoint schedule length",
                expected: 1,
                actual: 0,
            });
        }
    }
    if let Some(dists) = params.disturbances.as_ref() {
        if dists.len() != nd {
            return Err(OracleError::DimensionMismatch {
                what: "disturbance channel count",
                expected: nd,
                actual: dists.len(),
            });
        }
        for sched in dists {
            if sched.values.is_empty() {
                return Err(OracleError::DimensionMismatch {
                    what: "disturbance schedule length",
                    expected: 1,
                    actual: 0,
                });
            }
        }
    }
    Ok(())
}

fn resolve(names: &[String], key: &str) -> Result<usize, OracleError> {
    names
        .iter()
        .position(|n| n == key)
        .ok_or_else(|| OracleError::UnknownState {
            name: key.to_string(),
        })
}

/// Controlled action from the decision vector: the decision itself in
/// absolute mode, `prev_action + increment` in delta mode.
fn controlled_action(
    u_dec: &DVector<f64>,
    params: &StageParams,
    n_ctl: usize,
    a_delta: bool,
) -> DVector<f64> {
    let mut u = u_dec.rows(0, n_ctl).into_owned();
    if a_delta {
        if let Some(prev) = params.prev_action.as_ref() {
            u += prev.rows(0, n_ctl);
        }
    }
    u
}

/// Full action vector: controlled slice first, then the disturbance slots
/// from the stage parameters (zero when none are configured).
fn assemble_full(
    u_ctl: &DVector<f64>,
    params: &StageParams,
    nu: usize,
    n_ctl: usize,
    has_dist: bool,
) -> DVector<f64> {
    let mut u_full = DVector::zeros(nu);
    u_full.rows_mut(0, n_ctl).copy_from(u_ctl);
    if has_dist {
        if let Some(d) = params.disturbance.as_ref() {
            u_full.rows_mut(n_ctl, nu - n_ctl).copy_from(d);
        }
    }
    u_full
}

fn tracking_cost(x: &DVector<f64>, params: &StageParams, idx: &[usize], weight: &[f64]) -> f64 {
    let mut cost = 0.0;
    for (ch, (&si, &w)) in idx.iter().zip(weight).enumerate() {
        let e = x[si] - params.setpoint[ch];
        cost += w * e * e;
    }
    cost
}

/// Schedule feed shared by the solver and the simulator: each channel is
/// indexed by the caller's own step count, clamped to the last entry.
fn make_feed(params: &EnvParams) -> ParamFeedFn {
    let setpoints = params.setpoints.clone();
    let disturbances = params.disturbances.clone();
    Box::new(move |i| StageParams {
        setpoint: DVector::from_iterator(
            setpoints.len(),
            setpoints.iter().map(|s| s.value_at(i)),
        ),
        disturbance: disturbances.as_ref().map(|ds| {
            DVector::from_iterator(ds.len(), ds.iter().map(|s| s.value_at(i)))
        }),
        prev_action: None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ActionBounds, Schedule, StateConstraint};
    use crate::process::{FirstOrderLag, HeatedTank};

    fn lag_model() -> Arc<dyn ProcessModel> {
        Arc::new(FirstOrderLag::default())
    }

    fn lag_params() -> EnvParams {
        EnvParams::basic(
            vec![0.0],
            vec![Schedule::new("x", vec![1.0; 5])],
            ActionBounds::new(vec![-1.0], vec![1.0]),
            0.5,
            5,
        )
    }

    #[test]
    fn unknown_setpoint_name_fails_fast() {
        let model = lag_model();
        let mut params = lag_params();
        params.setpoints = vec![Schedule::new("pressure", vec![1.0])];
        let tuning = MpcTuning::default_for(1, 1);
        let err = build(&model, &params, &tuning).unwrap_err();
        assert!(matches!(err, OracleError::UnknownState { name } if name == "pressure"));
    }

    #[test]
    fn unknown_constraint_name_fails_fast() {
        let model = lag_model();
        let mut params = lag_params();
        params
            .constraints
            .push(StateConstraint::new("flow", 2.0, ConstraintOp::Le));
        let tuning = MpcTuning::default_for(1, 1);
        let err = build(&model, &params, &tuning).unwrap_err();
        assert!(matches!(err, OracleError::UnknownState { name } if name == "flow"));
    }

    #[test]
    fn le_constraint_sets_the_upper_bound_only() {
        let model = lag_model();
        let mut params = lag_params();
        params
            .constraints
            .push(StateConstraint::new("x", 5.0, ConstraintOp::Le));
        let tuning = MpcTuning::default_for(1, 1);
        let (solver, _sim) = build(&model, &params, &tuning).unwrap();
        let problem = solver.problem();
        assert!((problem.x_upper[0] - 5.0).abs() < 1e-12);
        assert_eq!(problem.x_lower[0], f64::NEG_INFINITY);
    }

    #[test]
    fn ge_constraint_sets_the_lower_bound_only() {
        let model = lag_model();
        let mut params = lag_params();
        params
            .constraints
            .push(StateConstraint::new("x", -2.0, ConstraintOp::Ge));
        let tuning = MpcTuning::default_for(1, 1);
        let (solver, _sim) = build(&model, &params, &tuning).unwrap();
        let problem = solver.problem();
        assert!((problem.x_lower[0] + 2.0).abs() < 1e-12);
        assert_eq!(problem.x_upper[0], f64::INFINITY);
    }

    #[test]
    fn delta_mode_without_act_bounds_is_rejected() {
        let model = lag_model();
        let mut params = lag_params();
        params.a_delta = true;
        let tuning = MpcTuning::default_for(1, 1);
        let err = build(&model, &params, &tuning).unwrap_err();
        assert!(matches!(err, OracleError::MissingActionBounds));
    }

    #[test]
    fn delta_mode_pins_disturbance_increments_to_zero() {
        let model: Arc<dyn ProcessModel> = Arc::new(HeatedTank {
            with_disturbance: true,
            ..HeatedTank::default()
        });
        let mut params = EnvParams::basic(
            vec![1.0, 20.0],
            vec![Schedule::new("temp", vec![25.0; 4])],
            ActionBounds::new(vec![-0.1, -0.1], vec![0.1, 0.1]),
            0.1,
            4,
        );
        params.a_delta = true;
        params.a_space_act = Some(ActionBounds::new(vec![0.0, -1.0], vec![2.0, 1.0]));
        params.disturbances = Some(vec![Schedule::new("t_in", vec![20.0; 4])]);

        let tuning = MpcTuning::default_for(2, 2);
        let (solver, _sim) = build(&model, &params, &tuning).unwrap();
        let problem = solver.problem();
        assert_eq!(problem.nu, 3);
        assert!((problem.u_lower[0] + 0.1).abs() < 1e-12);
        assert!((problem.u_upper[1] - 0.1).abs() < 1e-12);
        assert_eq!(problem.u_lower[2], 0.0);
        assert_eq!(problem.u_upper[2], 0.0);
    }

    #[test]
    fn q_size_mismatch_is_rejected() {
        let model = lag_model();
        let params = lag_params();
        let tuning = MpcTuning::default_for(3, 1); // wrong nx
        let err = build(&model, &params, &tuning).unwrap_err();
        assert!(matches!(
            err,
            OracleError::DimensionMismatch {
                what: "Q rows/cols",
                ..
            }
        ));
    }
}
