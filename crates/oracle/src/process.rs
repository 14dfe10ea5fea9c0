//! Process-model boundary and reference models.
//!
//! [`ProcessModel`] is the contract the oracle depends on: dimensions,
//! declared state names and a dynamics callable. The dynamics returns a
//! single column vector; an environment that produces per-state scalars
//! adapts at its own boundary, not here.
//!
//! The concrete models below are small reference processes used by the
//! demo binary and the integration tests.

use nalgebra::DVector;

/// The environment boundary the oracle controls against.
///
/// `nu` is the total action width including disturbance slots; the
/// controlled width is `nu - nd`. The full action vector handed to
/// [`ProcessModel::rhs`] carries the controlled slice first, then the
/// disturbance slots.
pub trait ProcessModel: Send + Sync {
    /// Number of model states used for control (`Nx_oracle`).
    fn nx(&self) -> usize;

    /// Total action width, including disturbance slots (`Nu`).
    fn nu(&self) -> usize;

    /// Number of disturbance channels (`Nd_model`).
    fn nd(&self) -> usize {
        0
    }

    /// Declared state names, indexable by setpoint and constraint keys.
    fn state_names(&self) -> Vec<String>;

    /// State derivative at `(x, u_full)`, as a single column vector.
    fn rhs(&self, x: &DVector<f64>, u_full: &DVector<f64>) -> DVector<f64>;
}

/// First-order lag: `dx = (gain * u - x) / tau`. One state, one input,
/// no disturbances.
#[derive(Clone, Debug)]
pub struct FirstOrderLag {
    pub gain: f64,
    pub tau: f64,
}

impl Default for FirstOrderLag {
    fn default() -> Self {
        Self {
            gain: 1.0,
            tau: 1.0,
        }
    }
}

impl ProcessModel for FirstOrderLag {
    fn nx(&self) -> usize {
        1
    }

    fn nu(&self) -> usize {
        1
    }

    fn state_names(&self) -> Vec<String> {
        vec!["x".to_string()]
    }

    fn rhs(&self, x: &DVector<f64>, u_full: &DVector<f64>) -> DVector<f64> {
        DVector::from_vec(vec![(self.gain * u_full[0] - x[0]) / self.tau])
    }
}

/// Heated tank: level and temperature states, inflow and heater inputs,
/// optionally an inlet-temperature disturbance channel.
///
/// States: `level`, `temp`. Inputs: `q_in`, `heat`, then `t_in` when the
/// disturbance channel is enabled.
#[derive(Clone, Debug)]
pub struct HeatedTank {
    /// Tank cross-section; scales the level response to flow.
    pub area: f64,
    /// Outflow proportional to level.
    pub outflow_coeff: f64,
    /// Temperature rise per unit heater input.
    pub heater_gain: f64,
    /// Mixing rate between inlet and tank temperature.
    pub mixing_rate: f64,
    /// Inlet temperature used when no disturbance channel is configured.
    pub inlet_temp: f64,
    /// Whether the inlet temperature arrives as a disturbance slot.
    pub with_disturbance: bool,
}

impl Default for HeatedTank {
    fn default() -> Self {
        Self {
            area: 1.0,
            outflow_coeff: 0.5,
            heater_gain: 1.0,
            mixing_rate: 0.5,
            inlet_temp: 20.0,
            with_disturbance: false,
        }
    }
}

impl ProcessModel for HeatedTank {
    fn nx(&self) -> usize {
        2
    }

    fn nu(&self) -> usize {
        2 + self.nd()
    }

    fn nd(&self) -> usize {
        usize::from(self.with_disturbance)
    }

    fn state_names(&self) -> Vec<String> {
        vec!["level".to_string(), "temp".to_string()]
    }

    fn rhs(&self, x: &DVector<f64>, u_full: &DVector<f64>) -> DVector<f64> {
        let level = x[0];
        let temp = x[1];
        let q_in = u_full[0];
        let heat = u_full[1];
        let t_in = if self.with_disturbance {
            u_full[2]
        } else {
            self.inlet_temp
        };

        let d_level = (q_in - self.outflow_coeff * level) / self.area;
        let d_temp = self.mixing_rate * q_in * (t_in - temp) + self.heater_gain * heat;
        DVector::from_vec(vec![d_level, d_temp])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lag_settles_at_gain_times_input() {
        let model = FirstOrderLag {
            gain: 2.0,
            tau: 1.0,
        };
        // at x = gain * u the derivative vanishes
        let dx = model.rhs(
            &DVector::from_vec(vec![6.0]),
            &DVector::from_vec(vec![3.0]),
        );
        assert!(dx[0].abs() < 1e-12);
    }

    #[test]
    fn tank_widths_track_the_disturbance_channel() {
        let plain = HeatedTank::default();
        assert_eq!((plain.nx(), plain.nu(), plain.nd()), (2, 2, 0));

        let disturbed = HeatedTank {
            with_disturbance: true,
            ..HeatedTank::default()
        };
        assert_eq!((disturbed.nx(), disturbed.nu(), disturbed.nd()), (2, 3, 1));
        assert_eq!(disturbed.state_names(), vec!["level", "temp"]);
    }
}
