//! Scheduler dynamics: the battery SOC integrator on its own.
//!
//! x = [SOC], u = [P_charge, P_b1, P_b2] in per-unit of the grid base.

use super::{Battery, Dimensions, Dynamics};
use crate::config::BatteryConfig;
use crate::expr::Scalar;
use crate::units::Kilowatts;

#[derive(Debug, Clone, PartialEq)]
pub struct SchedulerDynamics {
    battery: Battery,
}

impl SchedulerDynamics {
    pub fn new(battery: &BatteryConfig, base: Kilowatts, time_unit_h: f64) -> Self {
        Self {
            battery: Battery::new(battery, base, time_unit_h),
        }
    }
}

impl Dynamics for SchedulerDynamics {
    fn name(&self) -> &str {
        "scheduler"
    }

    fn dimensions(&self) -> Dimensions {
        Dimensions::new(1, 3, 0)
    }

    fn state_names(&self) -> Vec<String> {
        vec!["scheduler.soc".into()]
    }

    fn control_names(&self) -> Vec<String> {
        vec![
            "scheduler.charge".into(),
            "scheduler.battery1".into(),
            "scheduler.battery2".into(),
        ]
    }

    fn derivative<S: Scalar>(&self, _x: &[S], u: &[S], _p: &[f64]) -> Vec<S> {
        vec![self.battery.soc_rate(u[0], u[1], u[2])]
    }
}
