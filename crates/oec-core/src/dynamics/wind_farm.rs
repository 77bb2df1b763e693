//! Wind-farm dynamics: available wind power, dispatch setpoints and battery.
//!
//! ```text
//!   x = [P_v, P_wtg1, P_wtg2, SOC, P_b1, P_b2, P_charge]   (per-unit of base)
//!   u = rates of [P_wtg1, P_wtg2, P_b1, P_b2, P_charge]
//!   p = [v]                                                (wind speed, m/s)
//!
//!   Ṗ_v  = (curve(v) − P_v) / τ
//!   SOĊ  = battery(P_charge, P_b1, P_b2)
//!   Ṗ_*  = matching control
//! ```

use super::{Battery, Dimensions, Dynamics, WindTurbine};
use crate::config::{BatteryConfig, WindConfig};
use crate::expr::Scalar;
use crate::units::Kilowatts;

#[derive(Debug, Clone, PartialEq)]
pub struct WindFarmDynamics {
    turbine: WindTurbine,
    battery: Battery,
    base: Kilowatts,
}

impl WindFarmDynamics {
    pub fn new(wind: &WindConfig, battery: &BatteryConfig, base: Kilowatts, time_unit_h: f64) -> Self {
        Self {
            turbine: WindTurbine::new(wind),
            battery: Battery::new(battery, base, time_unit_h),
            base,
        }
    }

    pub fn turbine(&self) -> &WindTurbine {
        &self.turbine
    }

    /// Available wind power in per-unit of the grid base
    pub fn available_power<S: Scalar>(&self, v: S) -> S {
        self.turbine.power_curve(v) * (self.turbine.rated() / self.base)
    }
}

/// Indices into the wind-farm state vector
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindFarmState {
    Available = 0,
    Turbine1 = 1,
    Turbine2 = 2,
    Soc = 3,
    Battery1 = 4,
    Battery2 = 5,
    Charge = 6,
}

impl WindFarmState {
    pub const COUNT: usize = 7;

    pub const fn index(self) -> usize {
        self as usize
    }
}

impl Dynamics for WindFarmDynamics {
    fn name(&self) -> &str {
        "wind_farm"
    }

    fn dimensions(&self) -> Dimensions {
        Dimensions::new(WindFarmState::COUNT, 5, 1)
    }

    fn state_names(&self) -> Vec<String> {
        ["available", "wtg1", "wtg2", "soc", "battery1", "battery2", "charge"]
            .iter()
            .map(|s| format!("wind_farm.{s}"))
            .collect()
    }

    fn control_names(&self) -> Vec<String> {
        ["wtg1_rate", "wtg2_rate", "battery1_rate", "battery2_rate", "charge_rate"]
            .iter()
            .map(|s| format!("wind_farm.{s}"))
            .collect()
    }

    fn derivative<S: Scalar>(&self, x: &[S], u: &[S], p: &[f64]) -> Vec<S> {
        let v = S::from(p[0]);
        let available = x[WindFarmState::Available.index()];
        vec![
            (self.available_power(v) - available) / self.turbine.tau(),
            u[0],
            u[1],
            self.battery.soc_rate(
                x[WindFarmState::Charge.index()],
                x[WindFarmState::Battery1.index()],
                x[WindFarmState::Battery2.index()],
            ),
            u[2],
            u[3],
            u[4],
        ]
    }
}
