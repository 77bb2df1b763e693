use crate::nlp::problem::{VarBlock, Violation};
use serde::Serialize;
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Outcome of an NLP solve.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SolveStatus {
    /// Tight tolerances met.
    Optimal,
    /// Only the looser acceptable tier met; usable but degraded.
    Acceptable,
    /// No point satisfies the constraints within tolerance.
    Infeasible,
    /// Iteration ceiling reached before either tier.
    IterationLimit,
    /// NaN/Inf in residuals or derivatives.
    NumericalError,
    /// Wall-clock budget exhausted.
    Timeout,
}

impl SolveStatus {
    /// Optimal or Acceptable
    pub fn is_success(&self) -> bool {
        matches!(self, SolveStatus::Optimal | SolveStatus::Acceptable)
    }

    pub fn is_degraded(&self) -> bool {
        matches!(self, SolveStatus::Acceptable)
    }
}

impl fmt::Display for SolveStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SolveStatus::Optimal => write!(f, "optimal"),
            SolveStatus::Acceptable => write!(f, "acceptable"),
            SolveStatus::Infeasible => write!(f, "infeasible"),
            SolveStatus::IterationLimit => write!(f, "iteration_limit"),
            SolveStatus::NumericalError => write!(f, "numerical_error"),
            SolveStatus::Timeout => write!(f, "timeout"),
        }
    }
}

/// Residuals and bookkeeping of a finished solve
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Diagnostics {
    pub backend: String,
    /// Outer iterations
    pub iterations: usize,
    /// Inner iterations summed over all outer iterations
    pub inner_iterations: u64,
    /// Max constraint or bound violation
    pub primal_infeasibility: f64,
    /// Scaled Lagrangian gradient norm
    pub dual_infeasibility: f64,
    pub complementarity: f64,
    pub final_penalty: f64,
    pub elapsed: Duration,
    /// Worst violated rows and bounds, largest first
    pub worst_violations: Vec<Violation>,
}

impl fmt::Display for Diagnostics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} after {} iterations: primal {:.2e}, dual {:.2e}, compl {:.2e}",
            self.backend, self.iterations, self.primal_infeasibility, self.dual_infeasibility, self.complementarity
        )?;
        if let Some(worst) = self.worst_violations.first() {
            write!(f, ", worst `{}` ({:.2e})", worst.name, worst.magnitude)?;
        }
        Ok(())
    }
}

/// Primal point and status of a solve
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SolveResult {
    pub status: SolveStatus,
    pub objective: f64,
    pub primal: Vec<f64>,
    pub diagnostics: Diagnostics,
}

impl SolveResult {
    /// Entry `(row, col)` of a variable block
    pub fn value(&self, block: VarBlock, row: usize, col: usize) -> f64 {
        block.value(&self.primal, row, col)
    }

    /// Variable block as a list of columns
    pub fn columns(&self, block: VarBlock) -> Vec<Vec<f64>> {
        block.columns(&self.primal)
    }

    /// One row of a variable block across all columns
    pub fn row(&self, block: VarBlock, row: usize) -> Vec<f64> {
        (0..block.cols()).map(|c| self.value(block, row, c)).collect()
    }
}

/// Solve failures
#[derive(Error, Debug, Clone)]
pub enum SolveError {
    #[error("problem infeasible: {0}")]
    Infeasible(Box<Diagnostics>),

    #[error("iteration limit reached: {0}")]
    IterationLimit(Box<Diagnostics>),

    #[error("numerical error: {0}")]
    NumericalError(Box<Diagnostics>),

    #[error("solve timed out: {0}")]
    Timeout(Box<Diagnostics>),

    #[error("invalid binding: {0}")]
    InvalidBinding(String),

    #[error("backend `{backend}` failed: {message}")]
    Backend { backend: String, message: String },
}

impl SolveError {
    /// Error for a failed status; `None` for Optimal and Acceptable
    pub fn from_status(status: SolveStatus, diagnostics: Diagnostics) -> Option<Self> {
        let d = Box::new(diagnostics);
        match status {
            SolveStatus::Optimal | SolveStatus::Acceptable => None,
            SolveStatus::Infeasible => Some(SolveError::Infeasible(d)),
            SolveStatus::IterationLimit => Some(SolveError::IterationLimit(d)),
            SolveStatus::NumericalError => Some(SolveError::NumericalError(d)),
            SolveStatus::Timeout => Some(SolveError::Timeout(d)),
        }
    }

    /// Status the solve ended with; `None` when it never ran
    pub fn status(&self) -> Option<SolveStatus> {
        match self {
            SolveError::Infeasible(_) => Some(SolveStatus::Infeasible),
            SolveError::IterationLimit(_) => Some(SolveStatus::IterationLimit),
            SolveError::NumericalError(_) => Some(SolveStatus::NumericalError),
            SolveError::Timeout(_) => Some(SolveStatus::Timeout),
            SolveError::InvalidBinding(_) | SolveError::Backend { .. } => None,
        }
    }

    pub fn diagnostics(&self) -> Option<&Diagnostics> {
        match self {
            SolveError::Infeasible(d)
            | SolveError::IterationLimit(d)
            | SolveError::NumericalError(d)
            | SolveError::Timeout(d) => Some(d),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_display_is_snake_case() {
        assert_eq!(SolveStatus::IterationLimit.to_string(), "iteration_limit");
        assert_eq!(SolveStatus::Acceptable.to_string(), "acceptable");
    }

    #[test]
    fn test_success_statuses() {
        assert!(SolveStatus::Optimal.is_success());
        assert!(SolveStatus::Acceptable.is_success());
        assert!(SolveStatus::Acceptable.is_degraded());
        assert!(!SolveStatus::Infeasible.is_success());
        assert!(!SolveStatus::Timeout.is_success());
    }

    #[test]
    fn test_error_carries_worst_violation() {
        let diagnostics = Diagnostics {
            backend: "alm".into(),
            iterations: 4,
            primal_infeasibility: 0.25,
            worst_violations: vec![Violation {
                name: "initial_state[0]".into(),
                magnitude: 0.25,
            }],
            ..Default::default()
        };
        let err = SolveError::from_status(SolveStatus::Infeasible, diagnostics).unwrap();
        assert!(err.to_string().contains("initial_state[0]"));
        assert_eq!(err.diagnostics().unwrap().iterations, 4);
        assert_eq!(err.status(), Some(SolveStatus::Infeasible));
        assert!(SolveError::from_status(SolveStatus::Optimal, Diagnostics::default()).is_none());
    }
}
