//! # oec-algo: Multiple-Shooting MPC for the Offshore Energy Cluster
//!
//! Turns the discretized models of [`oec_core`] into parametrized nonlinear
//! programs, solves them, and runs the three control layers of the cluster.
//!
//! ## Nonlinear programs
//!
//! | Type | Role |
//! |------|------|
//! | [`ProblemBuilder`] | named variable blocks, parameters, bounds, constraints, cost terms |
//! | [`MultipleShooting`] | `x`/`u` blocks, `x0`, `dynamics[i]` continuity rows |
//! | [`Solver`] | warm starts, status policy, logging |
//! | [`nlp::AugmentedLagrangian`] | pure-Rust PHR augmented Lagrangian over argmin L-BFGS |
//! | `nlp::Ipopt` | interior point, cargo feature `solver-ipopt` |
//!
//! Every derivative is exact: constraint and cost closures are evaluated on
//! forward-mode dual numbers.
//!
//! ## Control layers
//!
//! | Layer | Time scale | Parameters |
//! |-------|------------|------------|
//! | [`SchedulerMpc`] | hours | `x0`, `P_expected`, `V_target`, `SOC_d` |
//! | [`WindFarmMpc`] | minutes | `x0`, `v`, `setpoints` |
//! | [`PlatformMpc`] | seconds to minutes | `x0`, `Qd`, `Pdel` |
//!
//! [`MpcController`] runs one layer in a receding-horizon loop with a
//! fail-safe hold; [`Cascade`] wires the layers outer-first through
//! [`SetpointBoard`]s.
//!
//! ## Example
//!
//! ```ignore
//! use oec_algo::{Layer, MpcController, PlatformInputs, PlatformMpc};
//! use oec_core::ClusterConfig;
//!
//! let config = ClusterConfig::default();
//! let platform = PlatformMpc::from_config(&config)?;
//! let mut controller = MpcController::new(platform, &config.solver, vec![0.0; 8])?;
//!
//! let report = controller.tick(&PlatformInputs { qd: 0.5, pdel: 0.2 })?;
//! println!("{:?} -> {:?}", report.status, report.action);
//! ```

pub mod mpc;
pub mod nlp;

pub use mpc::{
    Cascade, CascadeTargets, CascadeTick, ControllerState, Layer, MpcController, MpcError, PlatformInputs,
    PlatformMpc, PlatformPlan, SchedulerInputs, SchedulerMpc, SchedulerPlan, SetpointBoard, TickReport,
    WindFarmInputs, WindFarmMpc, WindFarmPlan,
};
pub use nlp::{
    Constraint, MultipleShooting, Problem, ProblemBuilder, ProblemError, SolveError, SolveResult, SolveStatus,
    Solver, SolverConfig,
};
