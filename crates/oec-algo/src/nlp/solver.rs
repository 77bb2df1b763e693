use crate::nlp::backends::{default_backend, NlpBackend};
use crate::nlp::config::SolverConfig;
use crate::nlp::problem::{ParameterValues, Problem};
use crate::nlp::solution::{SolveError, SolveResult};
use std::fmt;
use std::sync::Arc;

/// Configured entry point for solving bound problems.
///
/// Validates the binding and the warm start, runs the backend, logs the
/// outcome according to `print_level`, and applies `error_on_fail`.
#[derive(Clone)]
pub struct Solver {
    backend: Arc<dyn NlpBackend>,
    config: SolverConfig,
}

impl fmt::Debug for Solver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Solver")
            .field("backend", &self.backend.id())
            .field("config", &self.config)
            .finish()
    }
}

impl Default for Solver {
    fn default() -> Self {
        Self::new(SolverConfig::default())
    }
}

impl Solver {
    /// Solver on the default backend of this build
    pub fn new(config: SolverConfig) -> Self {
        Self {
            backend: Arc::from(default_backend()),
            config,
        }
    }

    pub fn with_backend(backend: Arc<dyn NlpBackend>, config: SolverConfig) -> Self {
        Self { backend, config }
    }

    pub fn config(&self) -> &SolverConfig {
        &self.config
    }

    pub fn backend_id(&self) -> &str {
        self.backend.id()
    }

    /// Solve `problem` under `params`, starting from `warm_start` (projected
    /// onto the variable box) or from the problem's default guess.
    pub fn solve(
        &self,
        problem: &Problem,
        params: &ParameterValues,
        warm_start: Option<&[f64]>,
    ) -> Result<SolveResult, SolveError> {
        if params.len() != problem.n_parameters() {
            return Err(SolveError::InvalidBinding(format!(
                "{} parameter values for a problem with {}",
                params.len(),
                problem.n_parameters()
            )));
        }
        if let Some(bad) = params.as_slice().iter().find(|v| !v.is_finite()) {
            return Err(SolveError::InvalidBinding(format!("non-finite parameter value {bad}")));
        }

        let start = match warm_start {
            Some(z) if z.len() != problem.n_variables() => {
                return Err(SolveError::InvalidBinding(format!(
                    "warm start has {} entries, problem has {} variables",
                    z.len(),
                    problem.n_variables()
                )));
            }
            Some(z) if z.iter().all(|v| v.is_finite()) => problem.project(z),
            Some(_) => {
                tracing::warn!("ignoring non-finite warm start");
                problem.initial_guess()
            }
            None => problem.initial_guess(),
        };

        if !self.backend.is_available() {
            return Err(SolveError::Backend {
                backend: self.backend.id().to_string(),
                message: "backend not available in this build".into(),
            });
        }

        let result = self.backend.solve(problem, params, &start, &self.config)?;
        let d = &result.diagnostics;

        if self.config.print_level >= 1 {
            tracing::debug!(
                backend = %d.backend,
                status = %result.status,
                objective = result.objective,
                iterations = d.iterations,
                primal = d.primal_infeasibility,
                dual = d.dual_infeasibility,
                elapsed_ms = d.elapsed.as_secs_f64() * 1e3,
                "solve finished"
            );
        }
        if !result.status.is_success() || result.status.is_degraded() {
            tracing::warn!(status = %result.status, "{d}");
        }

        if self.config.error_on_fail {
            if let Some(err) = SolveError::from_status(result.status, result.diagnostics.clone()) {
                return Err(err);
            }
        }
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nlp::problem::{Constraint, ProblemBuilder};
    use crate::nlp::solution::SolveStatus;
    use crate::nlp::AugmentedLagrangian;

    fn pinned(value: f64) -> Problem {
        let mut b = ProblemBuilder::new();
        let x = b.variable("x", 1, 1).unwrap();
        let target = b.parameter("target", 1).unwrap();
        b.bound_all(x, 0.0, 1.0);
        b.subject_to(Constraint::new("pin", [x.all()], move |v, _| vec![v[0]]).equal_to(value));
        b.minimize("track", [x.all()], move |v, p| (v[0] - target.get(p, 0)) * (v[0] - target.get(p, 0)));
        b.build().unwrap()
    }

    fn alm(config: SolverConfig) -> Solver {
        Solver::with_backend(Arc::new(AugmentedLagrangian), config)
    }

    #[test]
    fn test_error_on_fail_turns_infeasible_into_err() {
        let problem = pinned(1.5);
        let params = problem.bind(&[("target", &[0.0])]).unwrap();
        let err = alm(SolverConfig::control_loop()).solve(&problem, &params, None).unwrap_err();
        assert!(matches!(err, SolveError::Infeasible(_)));

        let lenient = alm(SolverConfig::control_loop().with_error_on_fail(false));
        let result = lenient.solve(&problem, &params, None).unwrap();
        assert_eq!(result.status, SolveStatus::Infeasible);
    }

    #[test]
    fn test_rejects_mismatched_warm_start() {
        let problem = pinned(0.5);
        let params = problem.bind(&[("target", &[0.0])]).unwrap();
        let err = alm(SolverConfig::control_loop())
            .solve(&problem, &params, Some(&[0.0, 1.0]))
            .unwrap_err();
        assert!(matches!(err, SolveError::InvalidBinding(_)));
    }

    #[test]
    fn test_rejects_non_finite_parameters() {
        let problem = pinned(0.5);
        let params = problem.bind(&[("target", &[f64::NAN])]).unwrap();
        let err = alm(SolverConfig::control_loop()).solve(&problem, &params, None).unwrap_err();
        assert!(matches!(err, SolveError::InvalidBinding(_)));
    }

    #[test]
    fn test_warm_start_at_solution() {
        let problem = pinned(0.5);
        let params = problem.bind(&[("target", &[0.5])]).unwrap();
        let result = alm(SolverConfig::control_loop())
            .solve(&problem, &params, Some(&[0.5]))
            .unwrap();
        assert_eq!(result.status, SolveStatus::Optimal);
        assert_eq!(result.diagnostics.inner_iterations, 0);
        assert_eq!(result.primal, vec![0.5]);
    }
}
