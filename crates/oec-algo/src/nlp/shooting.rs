//! Direct multiple-shooting transcription.
//!
//! ```text
//!   node     0       1       2            N-1
//!   x     [x₀]────[x₁]────[x₂]── … ──[x_{N-1}]      nx × N decision block
//!   u        u₀      u₁          u_{N-2}            nu × (N-1) decision block
//!
//!   x₀ = x0 (parameter)
//!   x_{i+1} = F(x_i, u_i, p_i)    i = 0 … N-2        "dynamics[i]"
//! ```
//!
//! `F` is the Runge–Kutta transition of a [`DiscretizedModel`]; each
//! continuity block is a [`VectorExpression`], so its Jacobian seeds several
//! inputs per model step. Exogenous
//! inputs `p_i` are absent, held constant over the horizon, or supplied per
//! interval. Layer-specific costs and constraints are added through the two
//! callbacks of [`MultipleShooting::build`].

use crate::nlp::problem::{Constraint, ParamBlock, Problem, ProblemBuilder, ProblemError, VarBlock};
use oec_core::{DiscretizedModel, Dynamics, Scalar, VectorExpression, VectorFunction};
use std::sync::Arc;

/// How exogenous model parameters enter the horizon
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Exogenous {
    None,
    /// One vector of `len` values shared by every interval
    Constant { name: String, len: usize },
    /// `len` values per interval, `len × (N-1)` in total
    PerInterval { name: String, len: usize },
}

/// Handles to the blocks created by the transcription
#[derive(Debug, Clone, Copy)]
pub struct ShootingVars {
    /// States, `nx × N`
    pub x: VarBlock,
    /// Controls, `nu × (N-1)`
    pub u: VarBlock,
    /// Initial-state parameter
    pub x0: ParamBlock,
    /// Exogenous parameter, if any
    pub exogenous: Option<ParamBlock>,
    pub nodes: usize,
}

impl ShootingVars {
    pub fn intervals(&self) -> usize {
        self.nodes - 1
    }
}

/// Continuity residual `F(x_i, u_i, p_i) - x_{i+1}` of one interval
struct Continuity<M> {
    model: Arc<DiscretizedModel<M>>,
    nx: usize,
    nu: usize,
    /// Exogenous values of this interval within the parameter vector
    params: Option<(usize, usize)>,
}

impl<M: Dynamics> VectorFunction for Continuity<M> {
    fn input_len(&self) -> usize {
        2 * self.nx + self.nu
    }

    fn output_len(&self) -> usize {
        self.nx
    }

    fn eval<S: Scalar>(&self, v: &[S], p: &[f64]) -> Vec<S> {
        let (xi, rest) = v.split_at(self.nx);
        let (ui, next) = rest.split_at(self.nu);
        let params = match self.params {
            Some((start, len)) => &p[start..start + len],
            None => &[][..],
        };
        self.model
            .step(xi, ui, params)
            .into_iter()
            .zip(next)
            .map(|(f, &x1)| f - x1)
            .collect()
    }
}

pub struct MultipleShooting<M> {
    model: Arc<DiscretizedModel<M>>,
    nodes: usize,
    exogenous: Exogenous,
    state_bounds: Vec<(f64, f64)>,
    control_bounds: Vec<(f64, f64)>,
}

impl<M: Dynamics + 'static> MultipleShooting<M> {
    /// Transcribe over the model's own `steps` nodes
    pub fn new(model: DiscretizedModel<M>) -> Result<Self, ProblemError> {
        let nodes = model.steps();
        if nodes < 2 {
            return Err(ProblemError::InvalidShooting(format!(
                "need at least 2 shooting nodes, got {nodes}"
            )));
        }
        let dims = model.dimensions();
        Ok(Self {
            model: Arc::new(model),
            nodes,
            exogenous: Exogenous::None,
            state_bounds: vec![(f64::NEG_INFINITY, f64::INFINITY); dims.states],
            control_bounds: vec![(f64::NEG_INFINITY, f64::INFINITY); dims.controls],
        })
    }

    pub fn with_exogenous(mut self, exogenous: Exogenous) -> Self {
        self.exogenous = exogenous;
        self
    }

    /// Same box on every state
    pub fn with_uniform_state_bounds(mut self, lower: f64, upper: f64) -> Self {
        self.state_bounds.iter_mut().for_each(|b| *b = (lower, upper));
        self
    }

    /// Per-control `(lower, upper)` boxes
    pub fn with_control_bounds(mut self, bounds: Vec<(f64, f64)>) -> Result<Self, ProblemError> {
        if bounds.len() != self.control_bounds.len() {
            return Err(ProblemError::InvalidShooting(format!(
                "{} control bounds given for {} controls",
                bounds.len(),
                self.control_bounds.len()
            )));
        }
        self.control_bounds = bounds;
        Ok(self)
    }

    pub fn nodes(&self) -> usize {
        self.nodes
    }

    pub fn model(&self) -> &DiscretizedModel<M> {
        &self.model
    }

    /// Declare `x`, `u`, `x0` (and the exogenous parameter) and add the
    /// initial-condition and continuity constraints to `builder`.
    pub fn transcribe(&self, builder: &mut ProblemBuilder) -> Result<ShootingVars, ProblemError> {
        let dims = self.model.dimensions();
        let (nx, nu, n) = (dims.states, dims.controls, self.nodes);

        let x = builder.variable("x", nx, n)?;
        let u = builder.variable("u", nu, n - 1)?;
        let x0 = builder.parameter("x0", nx)?;

        let exogenous = match &self.exogenous {
            Exogenous::None => None,
            Exogenous::Constant { name, len } | Exogenous::PerInterval { name, len } => {
                if *len != dims.parameters {
                    return Err(ProblemError::InvalidShooting(format!(
                        "model `{}` takes {} parameters, exogenous `{name}` has {len}",
                        self.model.spec().name(),
                        dims.parameters
                    )));
                }
                let total = match self.exogenous {
                    Exogenous::PerInterval { .. } => len * (n - 1),
                    _ => *len,
                };
                Some(builder.parameter(name, total)?)
            }
        };
        if exogenous.is_none() && dims.parameters > 0 {
            return Err(ProblemError::InvalidShooting(format!(
                "model `{}` needs {} exogenous parameters",
                self.model.spec().name(),
                dims.parameters
            )));
        }

        for (row, &(lo, hi)) in self.state_bounds.iter().enumerate() {
            builder.bound_row(x, row, lo, hi);
        }
        for (row, &(lo, hi)) in self.control_bounds.iter().enumerate() {
            builder.bound_row(u, row, lo, hi);
        }

        builder.subject_to(
            Constraint::new("initial_state", [x.col(0)], move |v, p| {
                v.iter().enumerate().map(|(k, &xk)| xk - x0.get(p, k)).collect()
            })
            .equal_to(0.0),
        );

        let per_interval = matches!(self.exogenous, Exogenous::PerInterval { .. });
        let np = dims.parameters;
        for i in 0..n - 1 {
            let params = exogenous.map(|block| {
                if per_interval {
                    (block.offset() + i * np, np)
                } else {
                    (block.offset(), block.len())
                }
            });
            let continuity = Continuity {
                model: Arc::clone(&self.model),
                nx,
                nu,
                params,
            };
            builder.subject_to(
                Constraint::from_expression(
                    format!("dynamics[{i}]"),
                    [x.col(i), u.col(i), x.col(i + 1)],
                    VectorExpression::new(continuity),
                )
                .equal_to(0.0),
            );
        }

        tracing::debug!(
            model = self.model.spec().name(),
            nodes = n,
            states = nx,
            controls = nu,
            "multiple shooting transcribed"
        );

        Ok(ShootingVars {
            x,
            u,
            x0,
            exogenous,
            nodes: n,
        })
    }

    /// Transcribe, let the caller add cost terms and layer constraints, and
    /// freeze the problem.
    pub fn build<O, C>(self, objective: O, constraints: C) -> Result<(Problem, ShootingVars), ProblemError>
    where
        O: FnOnce(&mut ProblemBuilder, &ShootingVars) -> Result<(), ProblemError>,
        C: FnOnce(&mut ProblemBuilder, &ShootingVars) -> Result<(), ProblemError>,
    {
        let mut builder = ProblemBuilder::new();
        let vars = self.transcribe(&mut builder)?;
        constraints(&mut builder, &vars)?;
        objective(&mut builder, &vars)?;
        Ok((builder.build()?, vars))
    }
}
