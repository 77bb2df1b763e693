//! Fixed-step explicit Runge–Kutta discretization.
//!
//! Turns a [`DynamicsSpec`] into the transition map `x⁺ = F(x, u, p)` over one
//! control interval `dt = horizon / steps`. The interval is split into
//! `finite_elements` equal sub-steps of the classic four-stage scheme:
//!
//! ```text
//!   k1 = f(x,            u, p)
//!   k2 = f(x + h/2·k1,   u, p)
//!   k3 = f(x + h/2·k2,   u, p)
//!   k4 = f(x + h·k3,     u, p)
//!   x⁺ = x + h/6·(k1 + 2k2 + 2k3 + k4)          h = dt / finite_elements
//! ```
//!
//! `u` and `p` are held constant over the whole interval (zero-order hold).
//! The map is generic over [`Scalar`], so the same code produces numeric
//! successors and exact sensitivities for the shooting constraints.

use crate::dynamics::{mismatch, Dimensions, Dynamics, DynamicsSpec};
use crate::error::{ModelError, ModelResult};
use crate::expr::Scalar;

/// A dynamics model bound to a fixed step size
#[derive(Debug, Clone)]
pub struct DiscretizedModel<M> {
    spec: DynamicsSpec<M>,
    dt: f64,
    steps: usize,
    finite_elements: usize,
}

impl<M: Dynamics> DiscretizedModel<M> {
    /// `steps` is the number of shooting nodes over `horizon`; `dt = horizon / steps`.
    pub fn new(spec: DynamicsSpec<M>, horizon: f64, steps: usize, finite_elements: usize) -> ModelResult<Self> {
        if !(horizon.is_finite() && horizon > 0.0) {
            return Err(ModelError::InvalidDiscretization(format!(
                "horizon must be positive and finite, got {horizon}"
            )));
        }
        if steps == 0 {
            return Err(ModelError::InvalidDiscretization("steps must be at least 1".into()));
        }
        if finite_elements == 0 {
            return Err(ModelError::InvalidDiscretization(
                "finite_elements must be at least 1".into(),
            ));
        }
        let dt = horizon / steps as f64;
        tracing::debug!(model = spec.name(), dt, finite_elements, "discretized dynamics");
        Ok(Self {
            spec,
            dt,
            steps,
            finite_elements,
        })
    }

    pub fn spec(&self) -> &DynamicsSpec<M> {
        &self.spec
    }

    pub fn dimensions(&self) -> Dimensions {
        self.spec.dimensions()
    }

    /// Control interval length
    pub fn dt(&self) -> f64 {
        self.dt
    }

    pub fn steps(&self) -> usize {
        self.steps
    }

    pub fn finite_elements(&self) -> usize {
        self.finite_elements
    }

    /// Transition map over one control interval
    pub fn step<S: Scalar>(&self, x: &[S], u: &[S], p: &[f64]) -> Vec<S> {
        let h = self.dt / self.finite_elements as f64;
        let mut state = x.to_vec();
        for _ in 0..self.finite_elements {
            state = self.rk4(&state, u, p, h);
        }
        state
    }

    fn rk4<S: Scalar>(&self, x: &[S], u: &[S], p: &[f64], h: f64) -> Vec<S> {
        let k1 = self.spec.derivative(x, u, p);
        let x2 = axpy(x, &k1, h * 0.5);
        let k2 = self.spec.derivative(&x2, u, p);
        let x3 = axpy(x, &k2, h * 0.5);
        let k3 = self.spec.derivative(&x3, u, p);
        let x4 = axpy(x, &k3, h);
        let k4 = self.spec.derivative(&x4, u, p);

        x.iter()
            .zip(k1.iter().zip(k2.iter()).zip(k3.iter().zip(k4.iter())))
            .map(|(&xi, ((&a, &b), (&c, &d)))| xi + (a + b * 2.0 + c * 2.0 + d) * (h / 6.0))
            .collect()
    }

    /// Checked numeric transition
    pub fn step_checked(&self, x: &[f64], u: &[f64], p: &[f64]) -> ModelResult<Vec<f64>> {
        self.spec.check_inputs(x, u, p)?;
        let next = self.step(x, u, p);
        if next.iter().any(|v| !v.is_finite()) {
            return Err(ModelError::NonFinite {
                model: self.spec.name().to_string(),
                what: "transition".into(),
            });
        }
        Ok(next)
    }

    /// Accumulated transition: the successor state of every interval.
    ///
    /// `params` holds either one entry, held for every interval, or one entry
    /// per control. Returns `controls.len()` states, `x₁ … x_N` (the initial
    /// state is not repeated).
    pub fn rollout(&self, x0: &[f64], controls: &[Vec<f64>], params: &[Vec<f64>]) -> ModelResult<Vec<Vec<f64>>> {
        let name = self.spec.name();
        if !params.is_empty() && params.len() != 1 && params.len() != controls.len() {
            return Err(mismatch(name, "parameter sequence", controls.len(), params.len()));
        }
        let empty = Vec::new();

        let mut trajectory = Vec::with_capacity(controls.len());
        let mut x = x0.to_vec();
        for (i, u) in controls.iter().enumerate() {
            let p = match params.len() {
                0 => &empty,
                1 => &params[0],
                _ => &params[i],
            };
            x = self.step_checked(&x, u, p)?;
            trajectory.push(x.clone());
        }
        Ok(trajectory)
    }
}

fn axpy<S: Scalar>(x: &[S], k: &[S], h: f64) -> Vec<S> {
    x.iter().zip(k).map(|(&xi, &ki)| xi + ki * h).collect()
}
