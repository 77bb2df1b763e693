//! Smooth wind-turbine power curve.
//!
//! Three regimes blended by two logistic sigmoids so the curve stays
//! differentiable everywhere:
//!
//! ```text
//!   P(v) = A·v³ · (1 − σ_in(v))  +  P_rated · σ_in(v) · (1 − σ_out(v))
//!          └── cubic growth ──┘     └────── saturated, then cut-out ──┘
//!
//!   σ_in  = logistic(v; k_in,  v_cut_in)
//!   σ_out = logistic(v; k_out, v_cut_out)
//! ```

use crate::config::WindConfig;
use crate::expr::{logistic, Scalar};
use crate::units::Kilowatts;

#[derive(Debug, Clone, PartialEq)]
pub struct WindTurbine {
    config: WindConfig,
}

impl WindTurbine {
    pub fn new(config: &WindConfig) -> Self {
        Self {
            config: config.clone(),
        }
    }

    pub fn rated(&self) -> Kilowatts {
        self.config.rated_kw
    }

    pub fn tau(&self) -> f64 {
        self.config.tau
    }

    /// Output in per-unit of rated power at wind speed `v` (m/s)
    pub fn power_curve<S: Scalar>(&self, v: S) -> S {
        let c = &self.config;
        let rated = c.rated_kw.value();
        let blend_in = logistic(v, c.cut_in_steepness, c.cut_in_m_s);
        let blend_out = logistic(v, c.cut_out_steepness, c.cut_out_m_s);

        let cubic = v * v * v * c.cubic_coeff;
        let below = cubic * (-blend_in + 1.0);
        let rated_regime = blend_in * (-blend_out + 1.0) * rated;
        (below + rated_regime) / rated
    }

    pub fn power_kw(&self, v: f64) -> Kilowatts {
        self.config.rated_kw * self.power_curve(v)
    }
}
