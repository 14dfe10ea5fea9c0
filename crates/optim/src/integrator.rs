//! Fixed-step numerical integration.
//!
//! The simulator and the solver's prediction rollout both advance the
//! continuous dynamics with classical fourth-order Runge-Kutta.

use nalgebra::DVector;

/// Advance `x` by one RK4 step of `dt` under the vector field `f`.
pub fn rk4_step<F>(f: F, x: &DVector<f64>, dt: f64) -> DVector<f64>
where
    F: Fn(&DVector<f64>) -> DVector<f64>,
{
    let k1 = f(x);
    let k2 = f(&(x + &k1 * (dt / 2.0)));
    let k3 = f(&(x + &k2 * (dt / 2.0)));
    let k4 = f(&(x + &k3 * dt));

    x + (k1 + k2 * 2.0 + k3 * 2.0 + k4) * (dt / 6.0)
}
