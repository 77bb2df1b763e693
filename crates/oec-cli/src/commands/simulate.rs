use anyhow::{bail, Context, Result};
use oec_algo::{Cascade, CascadeTargets};
use oec_core::WindFarmState;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::info;

use super::{fixed, load_config, open_output};

#[derive(Debug, Clone)]
pub struct SimulateArgs {
    pub ticks: Option<usize>,
    pub wind: Vec<f64>,
    pub soc0: f64,
    pub volume: Vec<f64>,
    pub soc_target: f64,
    pub output: Option<PathBuf>,
}

pub fn handle(config_path: Option<&Path>, args: SimulateArgs) -> Result<()> {
    let config = load_config(config_path)?;
    let wind = wind_profile(&args.wind, args.ticks)?;
    let targets = CascadeTargets {
        volume: fixed("volume", &args.volume)?,
        soc: args.soc_target,
    };

    let mut cascade = Cascade::from_config(&config, args.soc0)
        .context("building the cascade")?
        .with_targets(targets);

    let start = Instant::now();
    let ticks = cascade.run(&wind).context("running the cascade")?;
    let elapsed_ms = start.elapsed().as_secs_f64() * 1000.0;

    let mut out = open_output(args.output.as_deref())?;
    for tick in &ticks {
        serde_json::to_writer(&mut out, tick).context("serializing tick")?;
        writeln!(out)?;
    }
    out.flush()?;

    let holds = ticks.iter().filter(|t| t.held()).count();
    info!(
        ticks = ticks.len(),
        holds,
        final_soc = cascade.wind_farm().x()[WindFarmState::Soc.index()],
        elapsed_ms,
        "simulation finished"
    );
    Ok(())
}

/// One wind speed per tick: truncated to `ticks`, or padded with the last value
fn wind_profile(wind: &[f64], ticks: Option<usize>) -> Result<Vec<f64>> {
    let Some(&last) = wind.last() else {
        bail!("--wind needs at least one value");
    };
    if let Some(bad) = wind.iter().find(|v| !v.is_finite() || **v < 0.0) {
        bail!("wind speed {bad} is not a finite non-negative number");
    }
    let n = ticks.unwrap_or(wind.len());
    Ok((0..n).map(|i| wind.get(i).copied().unwrap_or(last)).collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wind_profile_holds_last_value() {
        assert_eq!(wind_profile(&[8.0, 9.0], Some(4)).unwrap(), vec![8.0, 9.0, 9.0, 9.0]);
        assert_eq!(wind_profile(&[8.0, 9.0, 10.0], Some(2)).unwrap(), vec![8.0, 9.0]);
        assert_eq!(wind_profile(&[8.0, 9.0], None).unwrap(), vec![8.0, 9.0]);
    }

    #[test]
    fn test_wind_profile_rejects_bad_speeds() {
        assert!(wind_profile(&[], None).is_err());
        assert!(wind_profile(&[8.0, f64::NAN], None).is_err());
        assert!(wind_profile(&[-1.0], None).is_err());
    }
}
