//! NLP backends.
//!
//! | Backend | Feature | Method |
//! |---------|---------|--------|
//! | [`AugmentedLagrangian`] | always | PHR augmented Lagrangian, argmin L-BFGS inner solves |
//! | `Ipopt` | `solver-ipopt` | interior point, limited-memory Hessian |

mod augmented_lagrangian;
#[cfg(feature = "solver-ipopt")]
mod interior_point;

pub use augmented_lagrangian::AugmentedLagrangian;
#[cfg(feature = "solver-ipopt")]
pub use interior_point::Ipopt;

use crate::nlp::config::SolverConfig;
use crate::nlp::problem::{ParameterValues, Problem};
use crate::nlp::solution::{SolveError, SolveResult};

/// Solves a bound [`Problem`] from a starting point.
///
/// Backends always report the status they reached; turning failed statuses
/// into errors is the job of [`Solver`](crate::nlp::Solver). `Err` is
/// reserved for the backend itself breaking down.
pub trait NlpBackend: Send + Sync {
    /// Unique identifier (e.g. "augmented-lagrangian", "ipopt")
    fn id(&self) -> &str;

    /// Check if this backend is usable in the current build
    fn is_available(&self) -> bool;

    fn solve(
        &self,
        problem: &Problem,
        params: &ParameterValues,
        start: &[f64],
        config: &SolverConfig,
    ) -> Result<SolveResult, SolveError>;
}

/// Default backend for this build: IPOPT when compiled in, otherwise the
/// pure-Rust augmented Lagrangian.
pub fn default_backend() -> Box<dyn NlpBackend> {
    #[cfg(feature = "solver-ipopt")]
    {
        Box::new(Ipopt)
    }
    #[cfg(not(feature = "solver-ipopt"))]
    {
        Box::new(AugmentedLagrangian)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backend_is_object_safe_and_send_sync() {
        fn _accepts_backend(_b: &dyn NlpBackend) {}
        fn _assert_send<T: Send>() {}
        fn _assert_sync<T: Sync>() {}
        _assert_send::<Box<dyn NlpBackend>>();
        _assert_sync::<Box<dyn NlpBackend>>();
    }

    #[test]
    fn test_default_backend_available() {
        assert!(default_backend().is_available());
    }
}
