//! Cluster configuration: the single source of truth for physical constants
//! and controller tuning.
//!
//! Every dynamics model and every controller layer receives the section it
//! needs at construction time and nothing reads ambient global state. Two
//! differently configured instances (say, two GTGs with different efficiency
//! fits) can coexist in one process.
//!
//! All sections are `#[serde(default)]`, so a partial TOML file only has to
//! name the values it overrides:
//!
//! ```toml
//! [gtg]
//! rated_kw = 5000.0
//!
//! [scheduler]
//! horizon = 12.0
//! steps = 24
//! ```

use crate::error::ConfigError;
use crate::units::{KilowattHours, Kilowatts};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Complete configuration of the offshore energy cluster
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct ClusterConfig {
    /// Base quantities shared by every energy balance
    #[serde(default)]
    pub grid: GridConfig,
    /// Gas-turbine generator model
    #[serde(default)]
    pub gtg: GtgConfig,
    /// Water-injection pump model
    #[serde(default)]
    pub pump: PumpConfig,
    /// Wind-turbine power curve and lag
    #[serde(default)]
    pub wind: WindConfig,
    /// Shared battery storage
    #[serde(default)]
    pub battery: BatteryConfig,
    /// Platform MPC layer
    #[serde(default)]
    pub platform: PlatformConfig,
    /// Wind-farm MPC layer
    #[serde(default)]
    pub wind_farm: WindFarmConfig,
    /// Scheduler MPC layer
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    /// Relative tick rates of the layers
    #[serde(default)]
    pub cascade: CascadeConfig,
    /// Overrides applied to every layer's solver settings
    #[serde(default)]
    pub solver: SolverSettings,
}

// =============================================================================
// Physical sections
// =============================================================================

/// Base powers used to normalize energy balances
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GridConfig {
    /// Base power; every energy balance is written in per-unit of this value
    pub base_kw: Kilowatts,
    /// Cap on wind plus battery power delivered to one platform
    pub max_delivered_kw: Kilowatts,
}

impl Default for GridConfig {
    fn default() -> Self {
        Self {
            base_kw: Kilowatts(10_000.0),
            max_delivered_kw: Kilowatts(15_000.0),
        }
    }
}

/// Gas-turbine generator: valve → fuel flow → load pressure lag chain
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GtgConfig {
    /// Valve to fuel-flow time constant
    pub tau_fuel: f64,
    /// Fuel-flow to load-pressure time constant
    pub tau_load: f64,
    /// Rated electrical output
    pub rated_kw: Kilowatts,
    /// Quadratic efficiency fit `[a1, a2, a3]` of `a1·l² + a2·l + a3`
    pub efficiency: [f64; 3],
    /// Maximum valve rate of change
    pub max_valve_rate: f64,
}

impl Default for GtgConfig {
    fn default() -> Self {
        Self {
            tau_fuel: 0.5,
            tau_load: 0.5,
            rated_kw: Kilowatts(4_500.0),
            efficiency: [-0.5714, 1.286, 0.2757],
            max_valve_rate: 0.2,
        }
    }
}

/// Water-injection pump
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PumpConfig {
    /// Pump head (m)
    pub head_m: f64,
    /// Liquid density (kg/m³)
    pub density_kg_m3: f64,
    /// Gravitational acceleration (m/s²)
    pub gravity: f64,
    /// Hydraulic efficiency
    pub efficiency: f64,
    /// Commanded power to flow time constant
    pub tau_flow: f64,
    /// Rated shaft power
    pub rated_kw: Kilowatts,
    /// Maximum normalized power rate of change
    pub max_power_rate: f64,
}

impl Default for PumpConfig {
    fn default() -> Self {
        Self {
            head_m: 2_000.0,
            density_kg_m3: 1_000.0,
            gravity: 9.81,
            efficiency: 1.0,
            tau_flow: 2.0,
            rated_kw: Kilowatts(15_000.0),
            max_power_rate: 1.0,
        }
    }
}

impl PumpConfig {
    /// Power drawn for a volumetric flow, `P = H·ρ·g·Q / η`
    pub fn power_for_flow(&self, flow_m3_s: f64) -> Kilowatts {
        Kilowatts::from_watts(self.head_m * self.density_kg_m3 * self.gravity * flow_m3_s / self.efficiency)
    }

    /// Flow delivered for a shaft power, the inverse of [`Self::power_for_flow`]
    pub fn flow_for_power(&self, power: Kilowatts) -> f64 {
        power.to_watts() * self.efficiency / (self.head_m * self.density_kg_m3 * self.gravity)
    }

    /// Flow at rated power (m³/s)
    pub fn max_flow_m3_s(&self) -> f64 {
        self.flow_for_power(self.rated_kw)
    }
}

/// Wind-turbine power curve and delivered-power lag
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WindConfig {
    /// Centre of the cut-in logistic (m/s)
    pub cut_in_m_s: f64,
    /// Centre of the cut-out logistic (m/s)
    pub cut_out_m_s: f64,
    /// Slope of the cut-in logistic
    pub cut_in_steepness: f64,
    /// Slope of the cut-out logistic
    pub cut_out_steepness: f64,
    /// Cubic coefficient below cut-in, kW/(m/s)³
    pub cubic_coeff: f64,
    /// Saturated output between cut-in and cut-out
    pub rated_kw: Kilowatts,
    /// Power-curve to delivered-power time constant
    pub tau: f64,
}

impl Default for WindConfig {
    fn default() -> Self {
        Self {
            cut_in_m_s: 5.0,
            cut_out_m_s: 26.0,
            cut_in_steepness: 1.0,
            cut_out_steepness: 5.0,
            cubic_coeff: 1.0,
            rated_kw: Kilowatts(10_000.0),
            tau: 2.0,
        }
    }
}

/// Battery shared by the wind-farm and scheduler layers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BatteryConfig {
    /// Usable energy capacity
    pub capacity_kwh: KilowattHours,
    /// Capacity scaling factor
    pub kappa: f64,
    /// Charging efficiency
    pub efficiency: f64,
}

impl Default for BatteryConfig {
    fn default() -> Self {
        Self {
            capacity_kwh: KilowattHours(50_000.0),
            kappa: 2.0,
            efficiency: 0.8,
        }
    }
}

// =============================================================================
// Layer sections
// =============================================================================

/// Platform MPC: pump plus two GTGs
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlatformConfig {
    pub horizon: f64,
    pub steps: usize,
    pub finite_elements: usize,
    /// Weight on pump power rate
    pub r_power_rate: f64,
    /// Weight on GTG valve rates
    pub r_valve_rate: f64,
    /// Weight on pump-flow tracking
    pub q_flow: f64,
    /// Weight on GTG efficiency tracking
    pub q_efficiency: f64,
    /// Weight on energy-balance slack
    pub q_slack: f64,
}

impl Default for PlatformConfig {
    fn default() -> Self {
        Self {
            horizon: 10.0,
            steps: 20,
            finite_elements: 10,
            r_power_rate: 0.1,
            r_valve_rate: 1.0,
            q_flow: 50.0,
            q_efficiency: 50.0,
            q_slack: 100.0,
        }
    }
}

/// Wind-farm MPC: turbines, battery dispatch and charging
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WindFarmConfig {
    pub horizon: f64,
    pub steps: usize,
    pub finite_elements: usize,
    /// Layer time unit expressed in hours
    pub time_unit_h: f64,
    /// Rate limit on turbine and battery dispatch setpoints
    pub max_power_rate: f64,
    /// Rate limit on the charging setpoint
    pub max_charge_rate: f64,
    pub r_rate: f64,
    pub q_delivered: f64,
    pub q_turbine: f64,
    pub q_battery: f64,
    pub q_charge: f64,
    pub q_slack: f64,
}

impl Default for WindFarmConfig {
    fn default() -> Self {
        Self {
            horizon: 60.0,
            steps: 20,
            finite_elements: 1,
            time_unit_h: 1.0 / 60.0,
            max_power_rate: 0.2,
            max_charge_rate: 1.0,
            r_rate: 0.1,
            q_delivered: 50.0,
            q_turbine: 10.0,
            q_battery: 10.0,
            q_charge: 10.0,
            q_slack: 100.0,
        }
    }
}

/// Scheduler MPC: battery state of charge and pumping plan
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Horizon in hours
    pub horizon: f64,
    pub steps: usize,
    pub finite_elements: usize,
    pub time_unit_h: f64,
    pub q_soc: f64,
    pub q_emissions: f64,
    /// Volume-target slack weight, multiplied by `steps²`
    pub q_slack: f64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            horizon: 24.0,
            steps: 48,
            finite_elements: 1,
            time_unit_h: 1.0,
            q_soc: 0.01,
            q_emissions: 1.0,
            q_slack: 10.0,
        }
    }
}

/// Tick periods of the outer layers, counted in cascade ticks.
///
/// A cascade tick always runs both platforms; the scheduler runs on ticks
/// divisible by `scheduler_period` and the wind farm on ticks divisible by
/// `wind_farm_period`. In between, inner layers keep reading the last
/// published setpoints.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CascadeConfig {
    pub scheduler_period: usize,
    pub wind_farm_period: usize,
}

impl Default for CascadeConfig {
    fn default() -> Self {
        Self {
            scheduler_period: 1,
            wind_farm_period: 1,
        }
    }
}

/// Default per-solve wall-clock budget in seconds
pub const DEFAULT_SOLVE_TIMEOUT_S: f64 = 5.0;

/// Solver overrides applied on top of each layer's preset
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SolverSettings {
    /// Outer iteration ceiling; `None` keeps the layer preset
    pub max_iterations: Option<usize>,
    /// 0 = silent, 1 = solve summaries, 2 = per-iteration progress
    pub print_level: u8,
    /// Wall-clock budget per solve in seconds (0 = no timeout). A solve that
    /// runs out of time leaves its layer holding the previous action.
    pub timeout_seconds: f64,
    /// Turn every non-converged status into an error
    pub error_on_fail: bool,
}

impl Default for SolverSettings {
    fn default() -> Self {
        Self {
            max_iterations: None,
            print_level: 0,
            timeout_seconds: DEFAULT_SOLVE_TIMEOUT_S,
            error_on_fail: true,
        }
    }
}

// =============================================================================
// Loading and validation
// =============================================================================

impl ClusterConfig {
    /// Parse a TOML document and validate it
    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        let config: ClusterConfig = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a TOML file
    pub fn from_toml_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::from_toml_str(&contents)?;
        tracing::debug!(path = %path.display(), "loaded cluster configuration");
        Ok(config)
    }

    /// Render as pretty TOML
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Reject physically meaningless values
    pub fn validate(&self) -> Result<(), ConfigError> {
        positive("grid.base_kw", self.grid.base_kw.value())?;
        positive("grid.max_delivered_kw", self.grid.max_delivered_kw.value())?;

        positive("gtg.tau_fuel", self.gtg.tau_fuel)?;
        positive("gtg.tau_load", self.gtg.tau_load)?;
        positive("gtg.rated_kw", self.gtg.rated_kw.value())?;
        positive("gtg.max_valve_rate", self.gtg.max_valve_rate)?;
        if self.gtg.efficiency.iter().any(|c| !c.is_finite()) {
            return Err(ConfigError::invalid("gtg.efficiency", "coefficients must be finite"));
        }

        positive("pump.head_m", self.pump.head_m)?;
        positive("pump.density_kg_m3", self.pump.density_kg_m3)?;
        positive("pump.gravity", self.pump.gravity)?;
        fraction("pump.efficiency", self.pump.efficiency)?;
        positive("pump.tau_flow", self.pump.tau_flow)?;
        positive("pump.rated_kw", self.pump.rated_kw.value())?;
        positive("pump.max_power_rate", self.pump.max_power_rate)?;

        positive("wind.cut_in_m_s", self.wind.cut_in_m_s)?;
        if self.wind.cut_out_m_s <= self.wind.cut_in_m_s {
            return Err(ConfigError::invalid(
                "wind.cut_out_m_s",
                format!("must exceed cut_in_m_s ({})", self.wind.cut_in_m_s),
            ));
        }
        positive("wind.cut_in_steepness", self.wind.cut_in_steepness)?;
        positive("wind.cut_out_steepness", self.wind.cut_out_steepness)?;
        non_negative("wind.cubic_coeff", self.wind.cubic_coeff)?;
        positive("wind.rated_kw", self.wind.rated_kw.value())?;
        positive("wind.tau", self.wind.tau)?;

        positive("battery.capacity_kwh", self.battery.capacity_kwh.value())?;
        positive("battery.kappa", self.battery.kappa)?;
        fraction("battery.efficiency", self.battery.efficiency)?;

        discretization("platform", self.platform.horizon, self.platform.steps, self.platform.finite_elements)?;
        for (field, w) in [
            ("platform.r_power_rate", self.platform.r_power_rate),
            ("platform.r_valve_rate", self.platform.r_valve_rate),
            ("platform.q_flow", self.platform.q_flow),
            ("platform.q_efficiency", self.platform.q_efficiency),
            ("platform.q_slack", self.platform.q_slack),
        ] {
            non_negative(field, w)?;
        }

        let wf = &self.wind_farm;
        discretization("wind_farm", wf.horizon, wf.steps, wf.finite_elements)?;
        positive("wind_farm.time_unit_h", wf.time_unit_h)?;
        positive("wind_farm.max_power_rate", wf.max_power_rate)?;
        positive("wind_farm.max_charge_rate", wf.max_charge_rate)?;
        for (field, w) in [
            ("wind_farm.r_rate", wf.r_rate),
            ("wind_farm.q_delivered", wf.q_delivered),
            ("wind_farm.q_turbine", wf.q_turbine),
            ("wind_farm.q_battery", wf.q_battery),
            ("wind_farm.q_charge", wf.q_charge),
            ("wind_farm.q_slack", wf.q_slack),
        ] {
            non_negative(field, w)?;
        }

        let sc = &self.scheduler;
        discretization("scheduler", sc.horizon, sc.steps, sc.finite_elements)?;
        positive("scheduler.time_unit_h", sc.time_unit_h)?;
        for (field, w) in [
            ("scheduler.q_soc", sc.q_soc),
            ("scheduler.q_emissions", sc.q_emissions),
            ("scheduler.q_slack", sc.q_slack),
        ] {
            non_negative(field, w)?;
        }

        for (field, period) in [
            ("cascade.scheduler_period", self.cascade.scheduler_period),
            ("cascade.wind_farm_period", self.cascade.wind_farm_period),
        ] {
            if period == 0 {
                return Err(ConfigError::invalid(field, "must be at least 1"));
            }
        }

        if let Some(0) = self.solver.max_iterations {
            return Err(ConfigError::invalid("solver.max_iterations", "must be at least 1"));
        }
        non_negative("solver.timeout_seconds", self.solver.timeout_seconds)?;
        if self.solver.print_level > 2 {
            return Err(ConfigError::invalid("solver.print_level", "must be 0, 1 or 2"));
        }

        Ok(())
    }
}

fn positive(field: &str, value: f64) -> Result<(), ConfigError> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(ConfigError::invalid(field, format!("must be positive, got {value}")))
    }
}

fn non_negative(field: &str, value: f64) -> Result<(), ConfigError> {
    if value.is_finite() && value >= 0.0 {
        Ok(())
    } else {
        Err(ConfigError::invalid(field, format!("must be non-negative, got {value}")))
    }
}

fn fraction(field: &str, value: f64) -> Result<(), ConfigError> {
    if value > 0.0 && value <= 1.0 {
        Ok(())
    } else {
        Err(ConfigError::invalid(field, format!("must lie in (0, 1], got {value}")))
    }
}

fn discretization(section: &str, horizon: f64, steps: usize, finite_elements: usize) -> Result<(), ConfigError> {
    positive(&format!("{section}.horizon"), horizon)?;
    if steps < 2 {
        return Err(ConfigError::invalid(
            &format!("{section}.steps"),
            format!("need at least 2 shooting nodes, got {steps}"),
        ));
    }
    if finite_elements == 0 {
        return Err(ConfigError::invalid(&format!("{section}.finite_elements"), "must be at least 1"));
    }
    Ok(())
}
