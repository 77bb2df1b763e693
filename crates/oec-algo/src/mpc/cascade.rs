//! Outer-to-inner setpoint passing between the control layers.
//!
//! Each outer layer publishes an immutable snapshot to a [`SetpointBoard`];
//! the inner layer copies the latest snapshot into its next binding. Boards are
//! last-writer-wins, so layers on separate threads never wait on each other
//! and a stale setpoint is read rather than blocked on.
//!
//! [`Cascade::run`] ticks the platforms every time and the outer layers every
//! `[cascade]` period:
//!
//! ```text
//!   tick        0   1   2   3   4   5   6
//!   scheduler   ●           ●           ●      scheduler_period = 3
//!   wind farm   ●       ●       ●       ●      wind_farm_period = 2
//!   platforms   ●   ●   ●   ●   ●   ●   ●
//! ```

use crate::mpc::{
    Layer, MpcController, MpcError, PlatformInputs, PlatformMpc, PlatformPlan, SchedulerInputs, SchedulerMpc,
    SchedulerPlan, TickReport, WindFarmInputs, WindFarmMpc, WindFarmPlan,
};
use oec_core::{CascadeConfig, ClusterConfig, GridConfig, WindFarmState};
use parking_lot::RwLock;
use serde::Serialize;
use std::sync::Arc;

/// Latest published value of one setpoint stream
#[derive(Debug)]
pub struct SetpointBoard<T> {
    slot: RwLock<Option<Arc<T>>>,
}

impl<T> Default for SetpointBoard<T> {
    fn default() -> Self {
        Self {
            slot: RwLock::new(None),
        }
    }
}

impl<T> SetpointBoard<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the snapshot; readers holding the old one keep it
    pub fn publish(&self, value: T) {
        *self.slot.write() = Some(Arc::new(value));
    }

    pub fn latest(&self) -> Option<Arc<T>> {
        self.slot.read().clone()
    }

    pub fn clear(&self) {
        *self.slot.write() = None;
    }
}

/// Scheduler output consumed by the wind farm and the platforms
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct ScheduleSetpoints {
    /// `[P_wtg1, P_wtg2, P_b1, P_b2, P_charge]`, per-unit of base
    pub wind_farm: [f64; 5],
    /// Normalized pump-flow demand per platform
    pub flow_demand: [f64; 2],
}

/// Wind-farm output consumed by the platforms
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct DeliverySetpoints {
    /// Delivered power per platform, per-unit of the delivery cap
    pub delivered: [f64; 2],
}

fn first(row: &[f64]) -> f64 {
    row.first().copied().unwrap_or(0.0)
}

fn first_of(rows: &[Vec<f64>], k: usize) -> f64 {
    rows.get(k).map_or(0.0, |row| first(row))
}

/// First-interval dispatch of the scheduler plan as wind-farm setpoints
pub fn wind_farm_setpoints(plan: &SchedulerPlan) -> [f64; 5] {
    [
        first_of(&plan.wind, 0),
        first_of(&plan.wind, 1),
        first_of(&plan.discharge, 0),
        first_of(&plan.discharge, 1),
        first(&plan.charge),
    ]
}

/// First-interval flow of each platform
pub fn flow_demands(plan: &SchedulerPlan) -> [f64; 2] {
    [first_of(&plan.flow, 0), first_of(&plan.flow, 1)]
}

/// Delivered power at the wind farm's first planned node, rebased from the
/// grid base to the per-platform delivery cap the platform layer expects.
pub fn delivered_power_setpoints(plan: &WindFarmPlan, grid: &GridConfig) -> [f64; 2] {
    let scale = grid.base_kw / grid.max_delivered_kw;
    let delivered = plan.delivered(1).or_else(|| plan.delivered(0)).unwrap_or([0.0; 2]);
    delivered.map(|d| d * scale)
}

/// Targets the scheduler plans against
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct CascadeTargets {
    /// Mean normalized flow per platform over the scheduler horizon
    pub volume: [f64; 2],
    pub soc: f64,
}

impl Default for CascadeTargets {
    fn default() -> Self {
        Self {
            volume: [0.5, 0.5],
            soc: 0.5,
        }
    }
}

/// Reports of every layer that ran in one cascade tick
#[derive(Debug, Clone, Serialize)]
pub struct CascadeTick {
    pub tick: usize,
    pub wind_speed: f64,
    /// Absent on ticks between scheduler periods
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scheduler: Option<TickReport<SchedulerPlan>>,
    /// Absent on ticks between wind-farm periods
    #[serde(skip_serializing_if = "Option::is_none")]
    pub wind_farm: Option<TickReport<WindFarmPlan>>,
    pub platforms: Vec<TickReport<PlatformPlan>>,
}

impl CascadeTick {
    /// Some layer that ran this tick re-applied its previous action
    pub fn held(&self) -> bool {
        self.scheduler.as_ref().is_some_and(|r| r.held)
            || self.wind_farm.as_ref().is_some_and(|r| r.held)
            || self.platforms.iter().any(|p| p.held)
    }
}

/// One scheduler, one wind farm and two platforms, ticked outer-first
pub struct Cascade {
    grid: GridConfig,
    periods: CascadeConfig,
    targets: CascadeTargets,
    scheduler: MpcController<SchedulerMpc>,
    wind_farm: MpcController<WindFarmMpc>,
    platforms: [MpcController<PlatformMpc>; 2],
    schedule: Arc<SetpointBoard<ScheduleSetpoints>>,
    delivery: Arc<SetpointBoard<DeliverySetpoints>>,
}

impl Cascade {
    /// Every layer at its configured horizon, battery starting at `soc0`
    pub fn from_config(config: &ClusterConfig, soc0: f64) -> Result<Self, MpcError> {
        let platforms = [PlatformMpc::from_config(config)?, PlatformMpc::from_config(config)?];
        Self::new(
            config,
            SchedulerMpc::from_config(config)?,
            WindFarmMpc::from_config(config)?,
            platforms,
            soc0,
        )
    }

    /// Cascade over prebuilt layers; plants start at rest with the battery at `soc0`
    pub fn new(
        config: &ClusterConfig,
        scheduler: SchedulerMpc,
        wind_farm: WindFarmMpc,
        platforms: [PlatformMpc; 2],
        soc0: f64,
    ) -> Result<Self, MpcError> {
        let settings = &config.solver;
        let mut wf_x0 = vec![0.0; wind_farm.state_dim()];
        wf_x0[WindFarmState::Soc.index()] = soc0;
        let [p1, p2] = platforms;
        let p_x0 = vec![0.0; p1.state_dim()];

        Ok(Self {
            grid: config.grid.clone(),
            periods: CascadeConfig {
                scheduler_period: config.cascade.scheduler_period.max(1),
                wind_farm_period: config.cascade.wind_farm_period.max(1),
            },
            targets: CascadeTargets::default(),
            scheduler: MpcController::new(scheduler, settings, vec![soc0])?,
            wind_farm: MpcController::new(wind_farm, settings, wf_x0)?,
            platforms: [
                MpcController::new(p1, settings, p_x0.clone())?,
                MpcController::new(p2, settings, p_x0)?,
            ],
            schedule: Arc::new(SetpointBoard::new()),
            delivery: Arc::new(SetpointBoard::new()),
        })
    }

    pub fn with_targets(mut self, targets: CascadeTargets) -> Self {
        self.targets = targets;
        self
    }

    pub fn targets(&self) -> CascadeTargets {
        self.targets
    }

    pub fn periods(&self) -> &CascadeConfig {
        &self.periods
    }

    pub fn schedule_board(&self) -> Arc<SetpointBoard<ScheduleSetpoints>> {
        Arc::clone(&self.schedule)
    }

    pub fn delivery_board(&self) -> Arc<SetpointBoard<DeliverySetpoints>> {
        Arc::clone(&self.delivery)
    }

    pub fn scheduler(&self) -> &MpcController<SchedulerMpc> {
        &self.scheduler
    }

    pub fn wind_farm(&self) -> &MpcController<WindFarmMpc> {
        &self.wind_farm
    }

    pub fn platforms(&self) -> &[MpcController<PlatformMpc>; 2] {
        &self.platforms
    }

    /// Plan the day from the battery SOC measured on the wind-farm plant and a
    /// persistence forecast of the current wind.
    pub fn tick_scheduler(&mut self, wind_speed: f64) -> Result<TickReport<SchedulerPlan>, MpcError> {
        let soc = self.wind_farm.x()[WindFarmState::Soc.index()];
        self.scheduler.set_state(vec![soc])?;

        let available = self.wind_farm.layer().model().spec().model().available_power(wind_speed);
        let inputs = SchedulerInputs::persistence(
            available,
            self.scheduler.layer().intervals(),
            self.targets.volume,
            self.targets.soc,
        );
        let report = self.scheduler.tick(&inputs)?;
        if let Some(plan) = &report.plan {
            self.schedule.publish(ScheduleSetpoints {
                wind_farm: wind_farm_setpoints(plan),
                flow_demand: flow_demands(plan),
            });
        }
        Ok(report)
    }

    pub fn tick_wind_farm(&mut self, wind_speed: f64) -> Result<TickReport<WindFarmPlan>, MpcError> {
        let schedule = self.schedule.latest().map(|s| *s).unwrap_or_default();
        let inputs = WindFarmInputs {
            wind_speed,
            setpoints: schedule.wind_farm,
        };
        let report = self.wind_farm.tick(&inputs)?;
        if let Some(plan) = &report.plan {
            self.delivery.publish(DeliverySetpoints {
                delivered: delivered_power_setpoints(plan, &self.grid),
            });
        }
        Ok(report)
    }

    pub fn tick_platforms(&mut self) -> Result<Vec<TickReport<PlatformPlan>>, MpcError> {
        let schedule = self.schedule.latest().map(|s| *s).unwrap_or_default();
        let delivery = self.delivery.latest().map(|d| *d).unwrap_or_default();
        self.platforms
            .iter_mut()
            .enumerate()
            .map(|(k, platform)| {
                platform.tick(&PlatformInputs {
                    qd: schedule.flow_demand[k],
                    pdel: delivery.delivered[k],
                })
            })
            .collect()
    }

    /// Closed loop over one wind speed per tick, outer layers first, each
    /// outer layer only on its own period
    pub fn run(&mut self, wind_speeds: &[f64]) -> Result<Vec<CascadeTick>, MpcError> {
        wind_speeds
            .iter()
            .enumerate()
            .map(|(tick, &wind_speed)| {
                let scheduler = match tick % self.periods.scheduler_period {
                    0 => Some(self.tick_scheduler(wind_speed)?),
                    _ => None,
                };
                let wind_farm = match tick % self.periods.wind_farm_period {
                    0 => Some(self.tick_wind_farm(wind_speed)?),
                    _ => None,
                };
                let platforms = self.tick_platforms()?;
                let report = CascadeTick {
                    tick,
                    wind_speed,
                    scheduler,
                    wind_farm,
                    platforms,
                };
                tracing::info!(
                    tick,
                    wind_speed,
                    scheduler = ?report.scheduler.as_ref().map(|r| r.status),
                    wind_farm = ?report.wind_farm.as_ref().map(|r| r.status),
                    held = report.held(),
                    "cascade tick"
                );
                Ok(report)
            })
            .collect()
    }
}
