use anyhow::{Context, Result};
use oec_algo::{
    Layer, MpcController, PlatformInputs, PlatformMpc, SchedulerInputs, SchedulerMpc, TickReport, WindFarmInputs,
    WindFarmMpc,
};
use oec_cli::cli::SolveCommands;
use oec_core::{ClusterConfig, PlatformState, WindFarmState};
use serde::Serialize;
use std::path::Path;
use std::time::Instant;
use tracing::{info, warn};

use super::{fixed, load_config, write_pretty_json};

/// JSON summary of a one-shot solve
#[derive(Debug, Serialize)]
struct SolveOutput<O> {
    solve_time_ms: f64,
    #[serde(flatten)]
    report: TickReport<O>,
}

pub fn handle(config_path: Option<&Path>, command: SolveCommands) -> Result<()> {
    let config = load_config(config_path)?;
    match command {
        SolveCommands::Platform { qd, pdel, state } => {
            let x0 = state.unwrap_or_else(|| vec![0.0; PlatformState::COUNT]);
            let layer = PlatformMpc::from_config(&config).context("building the platform problem")?;
            run_once(&config, layer, x0, &PlatformInputs { qd, pdel })
        }
        SolveCommands::WindFarm {
            wind_speed,
            setpoints,
            soc,
        } => {
            let mut x0 = vec![0.0; WindFarmState::COUNT];
            x0[WindFarmState::Soc.index()] = soc;
            let inputs = WindFarmInputs {
                wind_speed,
                setpoints: fixed("setpoints", &setpoints)?,
            };
            let layer = WindFarmMpc::from_config(&config).context("building the wind-farm problem")?;
            run_once(&config, layer, x0, &inputs)
        }
        SolveCommands::Scheduler {
            forecast,
            volume,
            soc_target,
            soc,
        } => {
            let layer = SchedulerMpc::from_config(&config).context("building the scheduler problem")?;
            let inputs =
                SchedulerInputs::persistence(forecast, layer.intervals(), fixed("volume", &volume)?, soc_target);
            run_once(&config, layer, vec![soc], &inputs)
        }
    }
}

fn run_once<L: Layer>(config: &ClusterConfig, layer: L, x0: Vec<f64>, inputs: &L::Inputs) -> Result<()> {
    let name = layer.name().to_string();
    let mut controller = MpcController::new(layer, &config.solver, x0).with_context(|| format!("starting {name}"))?;

    let start = Instant::now();
    let report = controller.tick(inputs).with_context(|| format!("{name} tick"))?;
    let solve_time_ms = start.elapsed().as_secs_f64() * 1000.0;

    if report.held {
        warn!(layer = %name, error = ?report.error, "no usable plan, holding");
    } else {
        info!(layer = %name, status = ?report.status, solve_time_ms, "solved");
    }
    write_pretty_json(&SolveOutput { solve_time_ms, report })
}
