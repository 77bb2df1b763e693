//! Battery state of charge.
//!
//! A single integrator shared by every layer that references the battery:
//!
//! ```text
//!   dSOC/dt = (P_charge·η − (P_b1 + P_b2)) · P_base · t_unit / (κ · E_max)
//! ```
//!
//! Powers are per-unit of the grid base and `t_unit` converts the layer's own
//! time unit to hours, so the scheduler (hours) and the wind farm (minutes)
//! integrate the same physical battery.

use crate::config::BatteryConfig;
use crate::expr::Scalar;
use crate::units::Kilowatts;

#[derive(Debug, Clone, PartialEq)]
pub struct Battery {
    config: BatteryConfig,
    base: Kilowatts,
    time_unit_h: f64,
}

impl Battery {
    pub fn new(config: &BatteryConfig, base: Kilowatts, time_unit_h: f64) -> Self {
        Self {
            config: config.clone(),
            base,
            time_unit_h,
        }
    }

    /// SOC rate per layer time unit for per-unit charge and discharge powers
    pub fn soc_rate<S: Scalar>(&self, charge: S, discharge_1: S, discharge_2: S) -> S {
        let gain = self.base.value() * self.time_unit_h / (self.config.kappa * self.config.capacity_kwh.value());
        (charge * self.config.efficiency - (discharge_1 + discharge_2)) * gain
    }
}
