//! Differentiable expressions backed by forward-mode dual numbers.
//!
//! The optimization layer never needs to know how derivatives are produced,
//! only that they are exact. An expression maps a short vector of decision
//! values (plus a read-only parameter vector) to a short vector of outputs;
//! its Jacobian is extracted by evaluating it once per input with that input's
//! dual part seeded to one.
//!
//! ```text
//!   x ∈ ℝⁿ ──► f(x, p) ──► y ∈ ℝᵐ        J[i][j] = ∂yᵢ/∂xⱼ
//!              │
//!              └─ evaluated on Dual64: (xⱼ + ε) gives column j in one pass
//! ```
//!
//! Functions written generically over [`Scalar`] ([`VectorFunction`]) skip
//! that per-input loop: [`VectorExpression`] seeds [`JACOBIAN_CHUNK`] inputs
//! per pass on `DualSVec64`, so an expensive model step over `n` inputs runs
//! `⌈n / 8⌉` times instead of `n`.
//!
//! Expressions are kept small on purpose: the problem builder attaches each
//! one to the handful of variables it touches, which is what keeps constraint
//! Jacobians sparse.

use nalgebra::{Const, U1};
use num_dual::{Derivative, Dual64, DualNum, DualSVec64};
use std::fmt;
use std::sync::Arc;

/// Scalar type the closed-form model equations are written against.
///
/// Implemented for `f64` and every `num_dual` dual number, so a dynamics model
/// written once evaluates numerically and under automatic differentiation.
/// Constants must appear on the right of a binary operator (`x * 2.0`, not
/// `2.0 * x`) since only `S ∘ f64` is provided.
pub trait Scalar: DualNum<f64> + Copy + Send + Sync + 'static {}

impl<T: DualNum<f64> + Copy + Send + Sync + 'static> Scalar for T {}

/// Capability: evaluate a vector function and its exact Jacobian.
pub trait DifferentiableExpression: fmt::Debug + Send + Sync {
    /// Number of differentiated inputs
    fn input_len(&self) -> usize;

    /// Number of outputs
    fn output_len(&self) -> usize;

    /// Evaluate on dual numbers; `params` are held constant.
    fn evaluate_dual(&self, inputs: &[Dual64], params: &[f64]) -> Vec<Dual64>;

    /// Numeric value at `inputs`
    fn evaluate(&self, inputs: &[f64], params: &[f64]) -> Vec<f64> {
        let duals: Vec<Dual64> = inputs.iter().map(|&v| Dual64::from(v)).collect();
        self.evaluate_dual(&duals, params).iter().map(|d| d.re).collect()
    }

    /// Value and dense row-major Jacobian (`output_len × input_len`)
    fn jacobian(&self, inputs: &[f64], params: &[f64]) -> (Vec<f64>, Vec<f64>) {
        let n = inputs.len();
        let m = self.output_len();
        let mut jac = vec![0.0; m * n];
        let mut seeded: Vec<Dual64> = inputs.iter().map(|&v| Dual64::from(v)).collect();

        if n == 0 {
            return (self.evaluate(inputs, params), jac);
        }

        let mut values = Vec::new();
        for j in 0..n {
            seeded[j].eps = 1.0;
            let out = self.evaluate_dual(&seeded, params);
            seeded[j].eps = 0.0;
            for (i, d) in out.iter().enumerate().take(m) {
                jac[i * n + j] = d.eps;
            }
            if j == 0 {
                values = out.iter().map(|d| d.re).collect();
            }
        }
        (values, jac)
    }
}

/// Boxed vector function over dual numbers
pub type DualFn = Arc<dyn Fn(&[Dual64], &[f64]) -> Vec<Dual64> + Send + Sync>;

/// [`DifferentiableExpression`] wrapping a closure.
#[derive(Clone)]
pub struct ClosureExpression {
    input_len: usize,
    output_len: usize,
    f: DualFn,
}

impl ClosureExpression {
    pub fn new<F>(input_len: usize, output_len: usize, f: F) -> Self
    where
        F: Fn(&[Dual64], &[f64]) -> Vec<Dual64> + Send + Sync + 'static,
    {
        Self {
            input_len,
            output_len,
            f: Arc::new(f),
        }
    }

    /// Scalar-valued expression
    pub fn scalar<F>(input_len: usize, f: F) -> Self
    where
        F: Fn(&[Dual64], &[f64]) -> Dual64 + Send + Sync + 'static,
    {
        Self::new(input_len, 1, move |x, p| vec![f(x, p)])
    }

    /// `outer ∘ self`: feeds this expression's outputs into `outer`.
    ///
    /// Both stages see the same parameter vector. `outer.input_len()` must
    /// equal `self.output_len()`.
    pub fn compose(&self, outer: &ClosureExpression) -> ClosureExpression {
        let inner = Arc::clone(&self.f);
        let outer_f = Arc::clone(&outer.f);
        ClosureExpression {
            input_len: self.input_len,
            output_len: outer.output_len,
            f: Arc::new(move |x, p| outer_f(&inner(x, p), p)),
        }
    }
}

impl DifferentiableExpression for ClosureExpression {
    fn input_len(&self) -> usize {
        self.input_len
    }

    fn output_len(&self) -> usize {
        self.output_len
    }

    fn evaluate_dual(&self, inputs: &[Dual64], params: &[f64]) -> Vec<Dual64> {
        (self.f)(inputs, params)
    }
}

impl fmt::Debug for ClosureExpression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClosureExpression")
            .field("input_len", &self.input_len)
            .field("output_len", &self.output_len)
            .finish_non_exhaustive()
    }
}

/// Inputs seeded per evaluation by [`VectorExpression::jacobian`]
pub const JACOBIAN_CHUNK: usize = 8;

type ChunkDual = DualSVec64<JACOBIAN_CHUNK>;

/// Vector function written once for every [`Scalar`].
pub trait VectorFunction: Send + Sync {
    fn input_len(&self) -> usize;

    fn output_len(&self) -> usize;

    fn eval<S: Scalar>(&self, inputs: &[S], params: &[f64]) -> Vec<S>;
}

/// [`DifferentiableExpression`] over a [`VectorFunction`].
///
/// Values are computed on plain `f64`; the Jacobian comes from vector-valued
/// duals, [`JACOBIAN_CHUNK`] columns per evaluation.
#[derive(Clone)]
pub struct VectorExpression<F> {
    f: F,
}

impl<F: VectorFunction> VectorExpression<F> {
    pub fn new(f: F) -> Self {
        Self { f }
    }

    pub fn function(&self) -> &F {
        &self.f
    }
}

impl<F: VectorFunction> DifferentiableExpression for VectorExpression<F> {
    fn input_len(&self) -> usize {
        self.f.input_len()
    }

    fn output_len(&self) -> usize {
        self.f.output_len()
    }

    fn evaluate_dual(&self, inputs: &[Dual64], params: &[f64]) -> Vec<Dual64> {
        self.f.eval(inputs, params)
    }

    fn evaluate(&self, inputs: &[f64], params: &[f64]) -> Vec<f64> {
        self.f.eval(inputs, params)
    }

    fn jacobian(&self, inputs: &[f64], params: &[f64]) -> (Vec<f64>, Vec<f64>) {
        let n = inputs.len();
        let m = self.output_len();
        let mut jac = vec![0.0; m * n];
        if n == 0 {
            return (self.evaluate(inputs, params), jac);
        }

        let mut seeded: Vec<ChunkDual> = inputs.iter().map(|&v| ChunkDual::from_re(v)).collect();
        let mut values = Vec::new();
        for start in (0..n).step_by(JACOBIAN_CHUNK) {
            let end = (start + JACOBIAN_CHUNK).min(n);
            for (k, s) in seeded[start..end].iter_mut().enumerate() {
                s.eps = Derivative::derivative_generic(Const::<JACOBIAN_CHUNK>, U1, k);
            }
            let out = self.f.eval(&seeded, params);
            for s in &mut seeded[start..end] {
                s.eps = Derivative::none();
            }
            for (i, d) in out.iter().enumerate().take(m) {
                let eps = d.eps.clone().unwrap_generic(Const::<JACOBIAN_CHUNK>, U1);
                for j in start..end {
                    jac[i * n + j] = eps[j - start];
                }
            }
            if start == 0 {
                values = out.iter().map(|d| d.re).collect();
            }
        }
        (values, jac)
    }
}

impl<F> fmt::Debug for VectorExpression<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VectorExpression").finish_non_exhaustive()
    }
}

/// Logistic sigmoid `1 / (1 + exp(-k (x - x0)))`
pub fn logistic<S: Scalar>(x: S, steepness: f64, centre: f64) -> S {
    (((x - centre) * (-steepness)).exp() + 1.0).recip()
}
