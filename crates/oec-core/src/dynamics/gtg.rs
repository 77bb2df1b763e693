//! Gas-turbine generator: first-order lag chain `valve → fuel flow → load`.
//!
//! ```text
//!   γ̇ = dγ                 (valve, driven by the control)
//!   V̇ = (γ − V) / τ_fuel    (fuel flow)
//!   Ṗl = (V − Pl) / τ_load  (load pressure, normalized)
//!
//!   P_out = η(Pl) · Pl · P_rated,   η(l) = a1·l² + a2·l + a3
//! ```

use super::{Dimensions, Dynamics};
use crate::config::GtgConfig;
use crate::expr::Scalar;
use crate::units::Kilowatts;

/// One gas-turbine generator, x = [fuel, load, valve], u = [valve rate]
#[derive(Debug, Clone, PartialEq)]
pub struct GasTurbine {
    label: String,
    tau_fuel: f64,
    tau_load: f64,
    rated: Kilowatts,
    efficiency: [f64; 3],
}

impl GasTurbine {
    pub fn new(label: impl Into<String>, config: &GtgConfig) -> Self {
        Self {
            label: label.into(),
            tau_fuel: config.tau_fuel,
            tau_load: config.tau_load,
            rated: config.rated_kw,
            efficiency: config.efficiency,
        }
    }

    pub fn rated(&self) -> Kilowatts {
        self.rated
    }

    /// Quadratic efficiency fit at normalized load `l`
    pub fn efficiency<S: Scalar>(&self, load: S) -> S {
        let [a1, a2, a3] = self.efficiency;
        load * load * a1 + load * a2 + a3
    }

    /// Electrical output in per-unit of the rated power
    pub fn output_per_unit<S: Scalar>(&self, load: S) -> S {
        self.efficiency(load) * load
    }

    /// Electrical output in per-unit of an arbitrary base
    pub fn output_on_base<S: Scalar>(&self, load: S, base: Kilowatts) -> S {
        self.output_per_unit(load) * (self.rated / base)
    }

    pub fn output_kw(&self, load: f64) -> Kilowatts {
        self.rated * self.output_per_unit(load)
    }
}

impl Dynamics for GasTurbine {
    fn name(&self) -> &str {
        &self.label
    }

    fn dimensions(&self) -> Dimensions {
        Dimensions::new(3, 1, 0)
    }

    fn state_names(&self) -> Vec<String> {
        ["fuel", "load", "valve"]
            .iter()
            .map(|s| format!("{}.{s}", self.label))
            .collect()
    }

    fn control_names(&self) -> Vec<String> {
        vec![format!("{}.valve_rate", self.label)]
    }

    fn derivative<S: Scalar>(&self, x: &[S], u: &[S], _p: &[f64]) -> Vec<S> {
        let (fuel, load, valve) = (x[0], x[1], x[2]);
        vec![
            (valve - fuel) / self.tau_fuel,
            (fuel - load) / self.tau_load,
            u[0],
        ]
    }
}
