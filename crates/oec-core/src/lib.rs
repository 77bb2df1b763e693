//! # oec-core: Offshore Energy Cluster Modeling Core
//!
//! Continuous-time models of the cluster's physical subsystems and the
//! fixed-step discretization that turns them into transition maps for
//! receding-horizon control.
//!
//! ## Pipeline
//!
//! ```text
//!   ┌────────────────┐    ┌──────────────────┐    ┌────────────────────────┐
//!   │ Dynamics model │───►│ DynamicsSpec     │───►│ DiscretizedModel       │
//!   │ ẋ = f(x, u, p) │    │ (validated dims) │    │ x⁺ = F(x, u, p), RK4   │
//!   └────────────────┘    └──────────────────┘    └────────────────────────┘
//!                                                            │
//!                                     oec-algo: multiple shooting, solve
//! ```
//!
//! ## Subsystems
//!
//! | Model | States | Controls | Parameters |
//! |-------|--------|----------|------------|
//! | [`GasTurbine`] | fuel, load, valve | valve rate | – |
//! | [`Pump`] | power, flow | power rate | – |
//! | [`PlatformDynamics`] | pump + 2 GTGs (8) | 3 | – |
//! | [`WindFarmDynamics`] | 7 | 5 | wind speed |
//! | [`SchedulerDynamics`] | SOC | charge, 2 discharges | – |
//!
//! Every model takes its constants from [`ClusterConfig`] at construction.
//!
//! ## Quick Start
//!
//! ```rust
//! use oec_core::*;
//!
//! let config = ClusterConfig::default();
//! let spec = DynamicsSpec::new(platform_dynamics(&config.gtg, &config.pump)).unwrap();
//! let model = DiscretizedModel::new(spec, 10.0, 20, 10).unwrap();
//!
//! let x0 = vec![0.0; 8];
//! let next = model.step(&x0, &[0.1, 0.0, 0.0], &[]);
//! assert!(next[0] > 0.0);
//! ```

pub mod config;
pub mod dynamics;
pub mod error;
pub mod expr;
pub mod integrate;
pub mod units;

pub use config::{
    BatteryConfig, CascadeConfig, ClusterConfig, GridConfig, GtgConfig, PlatformConfig, PumpConfig, SchedulerConfig,
    SolverSettings, WindConfig, WindFarmConfig,
};
pub use dynamics::{
    platform_dynamics, Battery, Dimensions, Dynamics, DynamicsSpec, GasTurbine, PlatformDynamics,
    PlatformState, Pump, SchedulerDynamics, Stack, WindFarmDynamics, WindFarmState, WindTurbine,
};
pub use error::{ConfigError, ModelError, ModelResult};
pub use expr::{
    logistic, ClosureExpression, DifferentiableExpression, DualFn, Scalar, VectorExpression, VectorFunction,
    JACOBIAN_CHUNK,
};
pub use integrate::DiscretizedModel;
pub use units::{KilowattHours, Kilowatts, PerUnit};

pub use num_dual::Dual64;
