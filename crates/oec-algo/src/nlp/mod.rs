//! Parametrized nonlinear programs and their solvers.
//!
//! ```text
//!   ProblemBuilder ──build()──► Problem ──bind()──► ParameterValues
//!        ▲                         │                      │
//!   MultipleShooting               └──────► Solver ◄──────┘
//!   (x, u, x0, dynamics[i])                   │
//!                                       NlpBackend
//!                              AugmentedLagrangian | Ipopt
//! ```

pub mod backends;
mod config;
mod problem;
mod shooting;
mod solution;
mod solver;

pub use backends::{default_backend, AugmentedLagrangian, NlpBackend};
#[cfg(feature = "solver-ipopt")]
pub use backends::Ipopt;
pub use config::SolverConfig;
pub use problem::{
    Constraint, ParamBlock, ParameterValues, Problem, ProblemBuilder, ProblemError, Rhs, Selection, VarBlock,
    Violation, INFINITE_BOUND,
};
pub use shooting::{Exogenous, MultipleShooting, ShootingVars};
pub use solution::{Diagnostics, SolveError, SolveResult, SolveStatus};
pub use solver::Solver;
