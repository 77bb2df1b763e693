//! Powell–Hestenes–Rockafellar augmented Lagrangian with L-BFGS inner solves.
//!
//! Every constraint row `lo ≤ g(z) ≤ hi` and every variable bound is split
//! into equalities `e = g - lo` (when `lo == hi`) and inequalities `h ≤ 0`.
//! The inner problem is unconstrained:
//!
//! ```text
//! L_A(z) = f(z) + Σ λ·e + μ/2 Σ e² + 1/(2μ) Σ [max(0, ν + μ·h)² - ν²]
//! ∇L_A   = ∇f   + Σ (λ + μ·e)·∇e     + Σ max(0, ν + μ·h)·∇h
//! ```
//!
//! and is minimized with argmin's L-BFGS (More–Thuente line search) using the
//! exact sparse Jacobian. After each inner solve the multipliers move to
//! `λ += μ·e`, `ν = max(0, ν + μ·h)`; the penalty grows only when the primal
//! violation failed to shrink by 4×.
//!
//! Variable bounds are penalized like any other inequality during the inner
//! solves; the final iterate is projected back onto the box.

use crate::nlp::backends::NlpBackend;
use crate::nlp::config::SolverConfig;
use crate::nlp::problem::{ParameterValues, Problem, INFINITE_BOUND};
use crate::nlp::solution::{Diagnostics, SolveError, SolveResult, SolveStatus};
use argmin::core::{CostFunction, Executor, Gradient, State};
use argmin::solver::linesearch::MoreThuenteLineSearch;
use argmin::solver::quasinewton::LBFGS;
use std::time::{Duration, Instant};

/// Inner gradient tolerance of the first outer iteration
const INITIAL_INNER_TOL: f64 = 1e-1;
/// Outer iterations without 1% progress, at maximum penalty, before giving up
const STALL_LIMIT: usize = 3;
/// Worst violations kept in the diagnostics
const REPORTED_VIOLATIONS: usize = 5;

/// Pure-Rust NLP backend, always available
#[derive(Debug, Clone, Copy, Default)]
pub struct AugmentedLagrangian;

// ============================================================================
// MULTIPLIERS
// ============================================================================

/// Two-sided rows `lo ≤ g ≤ hi` and their multipliers
#[derive(Debug, Clone)]
struct Rows {
    lo: Vec<f64>,
    hi: Vec<f64>,
    lambda: Vec<f64>,
    nu_lo: Vec<f64>,
    nu_hi: Vec<f64>,
}

impl Rows {
    fn new(lo: &[f64], hi: &[f64]) -> Self {
        let n = lo.len();
        Self {
            lo: lo.to_vec(),
            hi: hi.to_vec(),
            lambda: vec![0.0; n],
            nu_lo: vec![0.0; n],
            nu_hi: vec![0.0; n],
        }
    }

    #[inline]
    fn is_equality(&self, i: usize) -> bool {
        self.lo[i] == self.hi[i]
    }

    #[inline]
    fn has_lower(&self, i: usize) -> bool {
        self.lo[i] > -INFINITE_BOUND
    }

    #[inline]
    fn has_upper(&self, i: usize) -> bool {
        self.hi[i] < INFINITE_BOUND
    }

    /// Penalty value and its derivative with respect to each row value
    fn penalty(&self, g: &[f64], mu: f64) -> (f64, Vec<f64>) {
        let mut value = 0.0;
        let mut weights = vec![0.0; g.len()];
        for (i, &gi) in g.iter().enumerate() {
            if self.is_equality(i) {
                let e = gi - self.lo[i];
                value += self.lambda[i] * e + 0.5 * mu * e * e;
                weights[i] = self.lambda[i] + mu * e;
                continue;
            }
            if self.has_lower(i) {
                let t = (self.nu_lo[i] + mu * (self.lo[i] - gi)).max(0.0);
                value += (t * t - self.nu_lo[i] * self.nu_lo[i]) / (2.0 * mu);
                weights[i] -= t;
            }
            if self.has_upper(i) {
                let t = (self.nu_hi[i] + mu * (gi - self.hi[i])).max(0.0);
                value += (t * t - self.nu_hi[i] * self.nu_hi[i]) / (2.0 * mu);
                weights[i] += t;
            }
        }
        (value, weights)
    }

    /// First-order multiplier update; returns (max violation, max |ν·h|)
    fn update(&mut self, g: &[f64], mu: f64) -> (f64, f64) {
        let mut violation: f64 = 0.0;
        let mut compl: f64 = 0.0;
        for (i, &gi) in g.iter().enumerate() {
            if self.is_equality(i) {
                let e = gi - self.lo[i];
                self.lambda[i] += mu * e;
                violation = violation.max(e.abs());
                continue;
            }
            if self.has_lower(i) {
                let h = self.lo[i] - gi;
                self.nu_lo[i] = (self.nu_lo[i] + mu * h).max(0.0);
                violation = violation.max(h);
                compl = compl.max((self.nu_lo[i] * h).abs());
            }
            if self.has_upper(i) {
                let h = gi - self.hi[i];
                self.nu_hi[i] = (self.nu_hi[i] + mu * h).max(0.0);
                violation = violation.max(h);
                compl = compl.max((self.nu_hi[i] * h).abs());
            }
        }
        (violation, compl)
    }
}

// ============================================================================
// INNER PROBLEM
// ============================================================================

/// `L_A(·; λ, ν, μ)` as an argmin problem
struct InnerProblem<'a> {
    problem: &'a Problem,
    params: &'a [f64],
    constraints: &'a Rows,
    bounds: &'a Rows,
    mu: f64,
}

impl InnerProblem<'_> {
    /// `(∇L_A, ∇f)` at `z`
    fn gradients(&self, z: &[f64]) -> (Vec<f64>, Vec<f64>) {
        let (_, grad_f) = self.problem.objective_and_gradient(z, self.params);
        let (c, jac) = self.problem.constraints_and_jacobian(z, self.params);
        let (_, wc) = self.constraints.penalty(&c, self.mu);
        let (_, wz) = self.bounds.penalty(z, self.mu);

        let mut grad = grad_f.clone();
        let (rows, cols) = self.problem.jacobian_structure();
        for ((&r, &j), &d) in rows.iter().zip(cols).zip(&jac) {
            grad[j] += d * wc[r];
        }
        for (g, w) in grad.iter_mut().zip(wz) {
            *g += w;
        }
        (grad, grad_f)
    }
}

impl CostFunction for InnerProblem<'_> {
    type Param = Vec<f64>;
    type Output = f64;

    fn cost(&self, z: &Self::Param) -> Result<Self::Output, argmin::core::Error> {
        let f = self.problem.objective(z, self.params);
        let c = self.problem.constraints(z, self.params);
        let (pc, _) = self.constraints.penalty(&c, self.mu);
        let (pz, _) = self.bounds.penalty(z, self.mu);
        let value = f + pc + pz;
        if value.is_finite() {
            Ok(value)
        } else {
            Err(argmin::core::Error::msg("augmented Lagrangian is not finite"))
        }
    }
}

impl Gradient for InnerProblem<'_> {
    type Param = Vec<f64>;
    type Gradient = Vec<f64>;

    fn gradient(&self, z: &Self::Param) -> Result<Self::Gradient, argmin::core::Error> {
        let (grad, _) = self.gradients(z);
        if grad.iter().all(|g| g.is_finite()) {
            Ok(grad)
        } else {
            Err(argmin::core::Error::msg("augmented Lagrangian gradient is not finite"))
        }
    }
}

/// Run L-BFGS from `z`; keeps `z` when argmin gives up without a finite point.
///
/// `budget` is the wall-clock time left for the whole solve.
fn inner_solve(
    inner: InnerProblem<'_>,
    z: &[f64],
    tol: f64,
    config: &SolverConfig,
    budget: Option<Duration>,
) -> (Vec<f64>, u64) {
    let solver = match LBFGS::new(MoreThuenteLineSearch::new(), config.lbfgs_memory).with_tolerance_grad(tol) {
        Ok(solver) => solver,
        Err(err) => {
            tracing::debug!(error = %err, "invalid L-BFGS tolerance");
            return (z.to_vec(), 0);
        }
    };

    let mut executor = Executor::new(inner, solver)
        .configure(|state| state.param(z.to_vec()).max_iters(config.max_inner_iterations));
    if let Some(budget) = budget {
        executor = executor.timeout(budget);
    }
    let result = executor.run();

    match result {
        Ok(res) => {
            let iters = res.state().get_iter();
            match res.state().get_best_param() {
                Some(best) if best.iter().all(|v| v.is_finite()) => (best.clone(), iters),
                _ => (z.to_vec(), iters),
            }
        }
        Err(err) => {
            // line search failures are common at high penalties; the outer
            // loop continues from the last accepted point
            tracing::debug!(error = %err, "inner solve stopped early");
            (z.to_vec(), 0)
        }
    }
}

fn out_of_time(started: Instant, config: &SolverConfig) -> bool {
    config.timeout.is_some_and(|limit| started.elapsed() >= limit)
}

fn inf_norm(v: &[f64]) -> f64 {
    v.iter().fold(0.0, |acc: f64, x| acc.max(x.abs()))
}

// ============================================================================
// OUTER LOOP
// ============================================================================

#[derive(Debug, Clone, Copy, Default)]
struct Residuals {
    primal: f64,
    dual: f64,
    compl: f64,
}

impl Residuals {
    fn is_optimal(&self, c: &SolverConfig) -> bool {
        self.primal <= c.tol && self.dual <= c.dual_inf_tol && self.compl <= c.compl_inf_tol
    }

    fn is_acceptable(&self, c: &SolverConfig) -> bool {
        self.primal <= c.acceptable_tol
            && self.dual <= c.acceptable_dual_inf_tol
            && self.compl <= c.acceptable_compl_inf_tol
    }

    fn is_finite(&self) -> bool {
        self.primal.is_finite() && self.dual.is_finite() && self.compl.is_finite()
    }
}

impl NlpBackend for AugmentedLagrangian {
    fn id(&self) -> &str {
        "augmented-lagrangian"
    }

    fn is_available(&self) -> bool {
        true
    }

    fn solve(
        &self,
        problem: &Problem,
        params: &ParameterValues,
        start: &[f64],
        config: &SolverConfig,
    ) -> Result<SolveResult, SolveError> {
        let started = Instant::now();
        let p = params.as_slice();
        let (con_lo, con_hi) = problem.constraint_bounds();
        let (var_lo, var_hi) = problem.variable_bounds();

        let mut constraints = Rows::new(con_lo, con_hi);
        let mut bounds = Rows::new(var_lo, var_hi);
        let mut mu = config.initial_penalty;
        let mut inner_tol = INITIAL_INNER_TOL;
        let mut z = start.to_vec();

        let mut residuals = Residuals::default();
        let mut theta_prev = f64::INFINITY;
        let mut theta_best = f64::INFINITY;
        let mut stalled = 0;
        let mut acceptable_streak = 0;
        let mut inner_iterations = 0;
        let mut iterations = 0;
        let mut status = None;

        for k in 1..=config.max_iterations {
            iterations = k;
            if out_of_time(started, config) {
                status = Some(SolveStatus::Timeout);
                break;
            }

            // ================================================================
            // INNER SOLVE AND RESIDUALS
            // ================================================================
            let (grad_la, grad_f) = {
                let inner = InnerProblem {
                    problem,
                    params: p,
                    constraints: &constraints,
                    bounds: &bounds,
                    mu,
                };
                let (grad, _) = inner.gradients(&z);
                if inf_norm(&grad) > inner_tol {
                    let budget = config.timeout.map(|limit| limit.saturating_sub(started.elapsed()));
                    let (next, iters) = inner_solve(inner, &z, inner_tol, config, budget);
                    z = next;
                    inner_iterations += iters;
                }
                // ∇L_A with the old multipliers is the Lagrangian gradient
                // with the updated ones
                InnerProblem {
                    problem,
                    params: p,
                    constraints: &constraints,
                    bounds: &bounds,
                    mu,
                }
                .gradients(&z)
            };

            let c = problem.constraints(&z, p);
            let (theta_c, compl_c) = constraints.update(&c, mu);
            let (theta_z, compl_z) = bounds.update(&z, mu);
            residuals = Residuals {
                primal: theta_c.max(theta_z),
                dual: inf_norm(&grad_la) / inf_norm(&grad_f).max(1.0),
                compl: compl_c.max(compl_z),
            };

            if config.print_level >= 2 {
                tracing::debug!(
                    iteration = k,
                    primal = residuals.primal,
                    dual = residuals.dual,
                    compl = residuals.compl,
                    penalty = mu,
                    inner_tol,
                    "augmented Lagrangian iteration"
                );
            }

            // ================================================================
            // TERMINATION
            // ================================================================
            if !residuals.is_finite() || z.iter().any(|v| !v.is_finite()) {
                status = Some(SolveStatus::NumericalError);
                break;
            }
            if residuals.is_optimal(config) {
                status = Some(SolveStatus::Optimal);
                break;
            }
            if residuals.is_acceptable(config) {
                acceptable_streak += 1;
                if acceptable_streak >= config.acceptable_iter {
                    status = Some(SolveStatus::Acceptable);
                    break;
                }
            } else {
                acceptable_streak = 0;
            }

            let theta = residuals.primal;
            if mu >= config.max_penalty && theta > config.acceptable_tol {
                if theta > 0.99 * theta_best {
                    stalled += 1;
                } else {
                    stalled = 0;
                }
                if stalled >= STALL_LIMIT {
                    status = Some(SolveStatus::Infeasible);
                    break;
                }
            }
            theta_best = theta_best.min(theta);

            if out_of_time(started, config) {
                status = Some(SolveStatus::Timeout);
                break;
            }

            // ================================================================
            // PENALTY AND TOLERANCE UPDATE
            // ================================================================
            if theta > 0.25 * theta_prev {
                mu = (mu * config.penalty_growth).min(config.max_penalty);
            }
            theta_prev = theta;
            inner_tol = (inner_tol * 0.1).max(config.dual_inf_tol * 0.1);
        }

        let status = status.unwrap_or(if residuals.is_acceptable(config) {
            SolveStatus::Acceptable
        } else {
            SolveStatus::IterationLimit
        });

        // ====================================================================
        // POST-PROCESSING
        // ====================================================================
        //
        // Bound violations left by the penalty are removed by projection when
        // they are within the acceptable tier.
        if status != SolveStatus::NumericalError && problem.bound_violation(&z) <= config.acceptable_tol {
            z = problem.project(&z);
        }

        let objective = problem.objective(&z, p);
        let diagnostics = Diagnostics {
            backend: self.id().to_string(),
            iterations,
            inner_iterations,
            primal_infeasibility: problem.max_violation(&z, p),
            dual_infeasibility: residuals.dual,
            complementarity: residuals.compl,
            final_penalty: mu,
            elapsed: started.elapsed(),
            worst_violations: problem.violations(&z, p, config.tol, REPORTED_VIOLATIONS),
        };

        Ok(SolveResult {
            status,
            objective,
            primal: z,
            diagnostics,
        })
    }
}
