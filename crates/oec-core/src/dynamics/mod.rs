//! Continuous-time dynamics models.
//!
//! A dynamics model is the triple `(x, ẋ(x, u, p), u)`: named states, named
//! controls, and a closed-form vector field built from elementary arithmetic
//! and exponentials. No branching, so every model is smooth enough for a
//! gradient-based solver.
//!
//! # Composition
//!
//! Composite subsystems are vertical concatenations of independent
//! sub-models. [`Stack`] places two models on top of each other:
//!
//! ```text
//!   Stack(Pump, Stack(Gtg, Gtg))
//!
//!   x = [ Pp  Q │ V₁ Pl₁ γ₁ │ V₂ Pl₂ γ₂ ]     u = [ dPp │ dγ₁ │ dγ₂ ]
//!         └pump┘ └── gtg1 ──┘ └── gtg2 ──┘
//! ```
//!
//! The blocks share only the parameter vector, never state.
//!
//! # Validation
//!
//! [`DynamicsSpec`] wraps a model after checking that its name lists and
//! derivative length agree with its declared [`Dimensions`]. A mismatch is a
//! construction error; once wrapped the model is immutable.

mod battery;
mod gtg;
mod platform;
mod pump;
mod scheduler;
mod wind;
mod wind_farm;

pub use battery::Battery;
pub use gtg::GasTurbine;
pub use platform::{platform_dynamics, PlatformDynamics, PlatformState};
pub use pump::Pump;
pub use scheduler::SchedulerDynamics;
pub use wind::WindTurbine;
pub use wind_farm::{WindFarmDynamics, WindFarmState};

use crate::error::{ModelError, ModelResult};
use crate::expr::Scalar;

/// Lengths of the state, control and parameter vectors of a model
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Dimensions {
    pub states: usize,
    pub controls: usize,
    pub parameters: usize,
}

impl Dimensions {
    pub const fn new(states: usize, controls: usize, parameters: usize) -> Self {
        Self {
            states,
            controls,
            parameters,
        }
    }
}

/// A continuous-time state-space model `ẋ = f(x, u, p)`.
///
/// `derivative` is generic over [`Scalar`] so that the same expressions run on
/// `f64` for simulation and on dual numbers for exact Jacobians. Parameters are
/// exogenous and never differentiated.
pub trait Dynamics: Send + Sync {
    /// Label used in diagnostics
    fn name(&self) -> &str;

    fn dimensions(&self) -> Dimensions;

    fn state_names(&self) -> Vec<String>;

    fn control_names(&self) -> Vec<String>;

    /// Vector field at `(x, u, p)`; must return `dimensions().states` entries
    fn derivative<S: Scalar>(&self, x: &[S], u: &[S], p: &[f64]) -> Vec<S>;
}

/// A validated, immutable dynamics model
#[derive(Debug, Clone)]
pub struct DynamicsSpec<M> {
    model: M,
    dims: Dimensions,
}

impl<M: Dynamics> DynamicsSpec<M> {
    /// Check the model's name lists and derivative length against its dimensions
    pub fn new(model: M) -> ModelResult<Self> {
        let dims = model.dimensions();
        let name = model.name().to_string();

        let states = model.state_names();
        if states.len() != dims.states {
            return Err(mismatch(&name, "state names", dims.states, states.len()));
        }
        let controls = model.control_names();
        if controls.len() != dims.controls {
            return Err(mismatch(&name, "control names", dims.controls, controls.len()));
        }

        let x = vec![0.0; dims.states];
        let u = vec![0.0; dims.controls];
        let p = vec![0.0; dims.parameters];
        let dx = model.derivative(&x, &u, &p);
        if dx.len() != dims.states {
            return Err(mismatch(&name, "derivative", dims.states, dx.len()));
        }

        tracing::trace!(model = %name, states = dims.states, controls = dims.controls, "dynamics validated");
        Ok(Self { model, dims })
    }

    pub fn model(&self) -> &M {
        &self.model
    }

    pub fn dimensions(&self) -> Dimensions {
        self.dims
    }

    pub fn name(&self) -> &str {
        self.model.name()
    }

    pub fn state_names(&self) -> Vec<String> {
        self.model.state_names()
    }

    pub fn control_names(&self) -> Vec<String> {
        self.model.control_names()
    }

    /// Vector field without length checks
    #[inline]
    pub fn derivative<S: Scalar>(&self, x: &[S], u: &[S], p: &[f64]) -> Vec<S> {
        self.model.derivative(x, u, p)
    }

    /// Vector field with length and finiteness checks
    pub fn evaluate(&self, x: &[f64], u: &[f64], p: &[f64]) -> ModelResult<Vec<f64>> {
        self.check_inputs(x, u, p)?;
        let dx = self.model.derivative(x, u, p);
        if dx.iter().any(|v| !v.is_finite()) {
            return Err(ModelError::NonFinite {
                model: self.name().to_string(),
                what: "derivative".into(),
            });
        }
        Ok(dx)
    }

    pub(crate) fn check_inputs(&self, x: &[f64], u: &[f64], p: &[f64]) -> ModelResult<()> {
        let name = self.name();
        if x.len() != self.dims.states {
            return Err(mismatch(name, "state", self.dims.states, x.len()));
        }
        if u.len() != self.dims.controls {
            return Err(mismatch(name, "control", self.dims.controls, u.len()));
        }
        if p.len() != self.dims.parameters {
            return Err(mismatch(name, "parameter", self.dims.parameters, p.len()));
        }
        Ok(())
    }
}

pub(crate) fn mismatch(model: &str, what: &str, expected: usize, actual: usize) -> ModelError {
    ModelError::DimensionMismatch {
        model: model.to_string(),
        what: what.to_string(),
        expected,
        actual,
    }
}

// =============================================================================
// Stack: vertical concatenation
// =============================================================================

/// Two independent models stacked into one.
///
/// States and controls are concatenated (`a` first); both blocks receive the
/// full parameter vector.
#[derive(Debug, Clone)]
pub struct Stack<A, B> {
    name: String,
    a: A,
    b: B,
}

impl<A: Dynamics, B: Dynamics> Stack<A, B> {
    pub fn new(a: A, b: B) -> Self {
        let name = format!("{}+{}", a.name(), b.name());
        Self { name, a, b }
    }

    pub fn first(&self) -> &A {
        &self.a
    }

    pub fn second(&self) -> &B {
        &self.b
    }
}

impl<A: Dynamics, B: Dynamics> Dynamics for Stack<A, B> {
    fn name(&self) -> &str {
        &self.name
    }

    fn dimensions(&self) -> Dimensions {
        let a = self.a.dimensions();
        let b = self.b.dimensions();
        Dimensions {
            states: a.states + b.states,
            controls: a.controls + b.controls,
            parameters: a.parameters.max(b.parameters),
        }
    }

    fn state_names(&self) -> Vec<String> {
        let mut names = self.a.state_names();
        names.extend(self.b.state_names());
        names
    }

    fn control_names(&self) -> Vec<String> {
        let mut names = self.a.control_names();
        names.extend(self.b.control_names());
        names
    }

    fn derivative<S: Scalar>(&self, x: &[S], u: &[S], p: &[f64]) -> Vec<S> {
        let da = self.a.dimensions();
        let (xa, xb) = x.split_at(da.states.min(x.len()));
        let (ua, ub) = u.split_at(da.controls.min(u.len()));
        let mut dx = self.a.derivative(xa, ua, p);
        dx.extend(self.b.derivative(xb, ub, p));
        dx
    }
}
