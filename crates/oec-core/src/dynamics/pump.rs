//! Water-injection pump: commanded power with a first-order lag to flow.
//!
//! Both states are normalized: power against the rated shaft power and flow
//! against the flow reached at rated power, so in steady state `Q = P`.

use super::{Dimensions, Dynamics};
use crate::config::PumpConfig;
use crate::expr::Scalar;
use crate::units::Kilowatts;

/// x = [power, flow], u = [power rate]
#[derive(Debug, Clone, PartialEq)]
pub struct Pump {
    label: String,
    config: PumpConfig,
}

impl Pump {
    pub fn new(label: impl Into<String>, config: &PumpConfig) -> Self {
        Self {
            label: label.into(),
            config: config.clone(),
        }
    }

    pub fn rated(&self) -> Kilowatts {
        self.config.rated_kw
    }

    /// Normalized shaft power re-expressed in per-unit of `base`
    pub fn power_on_base<S: Scalar>(&self, power: S, base: Kilowatts) -> S {
        power * (self.config.rated_kw / base)
    }

    /// Absolute flow (m³/s) for a normalized flow
    pub fn flow_m3_s(&self, flow: f64) -> f64 {
        flow * self.config.max_flow_m3_s()
    }
}

impl Dynamics for Pump {
    fn name(&self) -> &str {
        &self.label
    }

    fn dimensions(&self) -> Dimensions {
        Dimensions::new(2, 1, 0)
    }

    fn state_names(&self) -> Vec<String> {
        vec![format!("{}.power", self.label), format!("{}.flow", self.label)]
    }

    fn control_names(&self) -> Vec<String> {
        vec![format!("{}.power_rate", self.label)]
    }

    fn derivative<S: Scalar>(&self, x: &[S], u: &[S], _p: &[f64]) -> Vec<S> {
        vec![u[0], (x[0] - x[1]) / self.config.tau_flow]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flow_lags_power() {
        let pump = Pump::new("pump", &PumpConfig::default());
        let dx = pump.derivative(&[1.0, 0.0], &[0.0], &[]);
        assert_eq!(dx, vec![0.0, 0.5]);
    }

    #[test]
    fn test_power_on_grid_base() {
        let pump = Pump::new("pump", &PumpConfig::default());
        let p: f64 = pump.power_on_base(1.0, Kilowatts(10_000.0));
        assert!((p - 1.5).abs() < 1e-12);
        assert!((pump.flow_m3_s(1.0) - 15.0e6 / (2_000.0 * 1_000.0 * 9.81)).abs() < 1e-12);
    }
}
