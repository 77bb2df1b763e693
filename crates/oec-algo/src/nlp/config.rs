use oec_core::SolverSettings;
use serde::Serialize;
use std::time::Duration;

/// Tuning of an NLP solve inside a control loop.
///
/// The tight tier (`tol`, `dual_inf_tol`, `compl_inf_tol`) yields
/// [`SolveStatus::Optimal`](super::SolveStatus::Optimal); the looser
/// `acceptable_*` tier yields `Acceptable` once it has held for
/// `acceptable_iter` consecutive outer iterations.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SolverConfig {
    /// Outer iteration ceiling
    pub max_iterations: usize,
    /// Iteration ceiling of every inner L-BFGS solve
    pub max_inner_iterations: u64,
    /// Primal infeasibility tolerance (max-norm)
    pub tol: f64,
    /// Scaled dual infeasibility tolerance
    pub dual_inf_tol: f64,
    /// Complementarity tolerance
    pub compl_inf_tol: f64,
    pub acceptable_tol: f64,
    pub acceptable_dual_inf_tol: f64,
    pub acceptable_compl_inf_tol: f64,
    pub acceptable_iter: usize,
    /// 0 = silent, 1 = per-solve summary, 2 = per-iteration progress
    pub print_level: u8,
    /// Return `Err` for every status other than Optimal/Acceptable
    pub error_on_fail: bool,
    /// Wall-clock budget per solve
    pub timeout: Option<Duration>,
    pub initial_penalty: f64,
    pub penalty_growth: f64,
    pub max_penalty: f64,
    /// L-BFGS history length
    pub lbfgs_memory: usize,
}

impl Default for SolverConfig {
    fn default() -> Self {
        Self::control_loop()
    }
}

impl SolverConfig {
    /// Bounded iterations and silent output for receding-horizon solves
    pub fn control_loop() -> Self {
        Self {
            max_iterations: 60,
            max_inner_iterations: 400,
            tol: 1e-6,
            dual_inf_tol: 1e-4,
            compl_inf_tol: 1e-6,
            acceptable_tol: 1e-4,
            acceptable_dual_inf_tol: 1e-2,
            acceptable_compl_inf_tol: 1e-3,
            acceptable_iter: 3,
            print_level: 0,
            error_on_fail: true,
            timeout: None,
            initial_penalty: 10.0,
            penalty_growth: 10.0,
            max_penalty: 1e8,
            lbfgs_memory: 10,
        }
    }

    /// Looser acceptable tier for layers tracking noisy setpoints
    pub fn relaxed() -> Self {
        Self {
            acceptable_tol: 1e-3,
            acceptable_dual_inf_tol: 1e10,
            acceptable_compl_inf_tol: 0.1,
            acceptable_iter: 5,
            ..Self::control_loop()
        }
    }

    /// Apply the `[solver]` section of the cluster configuration
    pub fn with_settings(mut self, settings: &SolverSettings) -> Self {
        if let Some(max) = settings.max_iterations {
            self.max_iterations = max;
        }
        self.print_level = settings.print_level;
        self.error_on_fail = settings.error_on_fail;
        self.timeout = (settings.timeout_seconds > 0.0).then(|| Duration::from_secs_f64(settings.timeout_seconds));
        self
    }

    pub fn with_max_iterations(mut self, max: usize) -> Self {
        self.max_iterations = max;
        self
    }

    pub fn with_error_on_fail(mut self, error_on_fail: bool) -> Self {
        self.error_on_fail = error_on_fail;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_relaxed_only_loosens_acceptable_tier() {
        let tight = SolverConfig::control_loop();
        let relaxed = SolverConfig::relaxed();
        assert_eq!(relaxed.tol, tight.tol);
        assert!(relaxed.acceptable_tol > tight.acceptable_tol);
        assert!(relaxed.acceptable_compl_inf_tol > tight.acceptable_compl_inf_tol);
        assert_eq!(relaxed.acceptable_iter, 5);
    }

    #[test]
    fn test_settings_override() {
        let settings = SolverSettings {
            max_iterations: Some(7),
            print_level: 2,
            timeout_seconds: 0.5,
            error_on_fail: false,
        };
        let config = SolverConfig::control_loop().with_settings(&settings);
        assert_eq!(config.max_iterations, 7);
        assert_eq!(config.print_level, 2);
        assert_eq!(config.timeout, Some(Duration::from_millis(500)));
        assert!(!config.error_on_fail);

        let keep = SolverConfig::relaxed().with_settings(&SolverSettings::default());
        assert_eq!(keep.max_iterations, SolverConfig::relaxed().max_iterations);
        assert_eq!(keep.timeout, Some(Duration::from_secs(5)));

        let unbounded = SolverSettings {
            timeout_seconds: 0.0,
            ..SolverSettings::default()
        };
        assert_eq!(SolverConfig::control_loop().with_settings(&unbounded).timeout, None);
    }
}
