//! Receding-horizon control layers of the cluster.
//!
//! ```text
//!   SchedulerMpc (hours)    SOC plan, power split, flow demand
//!        │ SetpointBoard: [P_wtg1, P_wtg2, P_b1, P_b2, P_charge], Qd
//!        ▼
//!   WindFarmMpc (minutes)   turbine dispatch, battery, delivered power
//!        │ SetpointBoard: Pdel per platform
//!        ▼
//!   PlatformMpc ×2          pump and GTG increments
//! ```
//!
//! Each layer is a multiple-shooting [`Problem`] with a fixed named-parameter
//! contract. [`MpcController`] drives one layer through the
//! `Idle → ParametersBound → Solved → ActionApplied → Idle` cycle and
//! [`Cascade`] ticks the layers outer-first.

mod cascade;
mod controller;
mod platform;
mod scheduler;
mod wind_farm;

pub use cascade::{
    delivered_power_setpoints, flow_demands, wind_farm_setpoints, Cascade, CascadeTargets, CascadeTick,
    DeliverySetpoints, ScheduleSetpoints, SetpointBoard,
};
pub use controller::{ControllerState, MpcController, TickReport};
pub use platform::{PlatformInputs, PlatformMpc, PlatformPlan};
pub use scheduler::{SchedulerInputs, SchedulerMpc, SchedulerPlan};
pub use wind_farm::{WindFarmInputs, WindFarmMpc, WindFarmPlan};

use crate::nlp::{ParameterValues, Problem, ProblemError, SolveError, SolveResult, SolverConfig};
use oec_core::ModelError;
use serde::Serialize;
use std::fmt;
use thiserror::Error;

/// Control-layer failures
#[derive(Error, Debug, Clone)]
pub enum MpcError {
    #[error(transparent)]
    Problem(#[from] ProblemError),

    #[error(transparent)]
    Solve(#[from] SolveError),

    #[error(transparent)]
    Model(#[from] ModelError),

    #[error("{layer}: state entry {index} is not finite")]
    NonFiniteState { layer: String, index: usize },

    #[error("{layer}: state has {actual} entries, expected {expected}")]
    StateDimension {
        layer: String,
        expected: usize,
        actual: usize,
    },

    #[error("{layer}: invalid input: {reason}")]
    InvalidInput { layer: String, reason: String },

    #[error("{layer}: cannot {action} while {state}")]
    InvalidTransition {
        layer: String,
        action: &'static str,
        state: ControllerState,
    },
}

/// One receding-horizon layer: a built problem plus the glue that binds
/// measurements and reads plans back out.
pub trait Layer: Send + Sync {
    /// Exogenous inputs of one tick (forecasts, setpoints)
    type Inputs: Clone + fmt::Debug + Send + Sync;
    /// Decoded plan of one solve
    type Output: Clone + fmt::Debug + Serialize + Send + Sync;

    fn name(&self) -> &str;

    fn problem(&self) -> &Problem;

    fn state_dim(&self) -> usize;

    /// Solver tuning this layer is designed for
    fn solver_config(&self) -> SolverConfig {
        SolverConfig::control_loop()
    }

    /// Bind the measured state and the tick's inputs to the named parameters
    fn bind(&self, x0: &[f64], inputs: &Self::Inputs) -> Result<ParameterValues, MpcError>;

    fn extract(&self, result: &SolveResult) -> Self::Output;

    /// Control applied to the plant this tick
    fn first_action(&self, output: &Self::Output) -> Vec<f64>;

    /// Plant step under `action` using the layer's own transition map
    fn advance(&self, x: &[f64], action: &[f64], inputs: &Self::Inputs) -> Result<Vec<f64>, MpcError>;
}

/// Reject non-finite layer inputs before they reach a parameter binding
pub(crate) fn check_finite(layer: &str, what: &str, values: &[f64]) -> Result<(), MpcError> {
    match values.iter().position(|v| !v.is_finite()) {
        Some(i) => Err(MpcError::InvalidInput {
            layer: layer.to_string(),
            reason: format!("{what}[{i}] is not finite"),
        }),
        None => Ok(()),
    }
}
