pub mod config;
pub mod simulate;
pub mod solve;

use anyhow::{bail, Context, Result};
use oec_core::ClusterConfig;
use serde::Serialize;
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;

/// The configuration at `path`, or the defaults
pub fn load_config(path: Option<&Path>) -> Result<ClusterConfig> {
    match path {
        Some(path) => ClusterConfig::from_toml_path(path)
            .with_context(|| format!("loading cluster configuration from {}", path.display())),
        None => Ok(ClusterConfig::default()),
    }
}

/// A comma-separated argument that must carry exactly `N` values
pub fn fixed<const N: usize>(name: &str, values: &[f64]) -> Result<[f64; N]> {
    match <[f64; N]>::try_from(values) {
        Ok(array) => Ok(array),
        Err(_) => bail!("--{name} expects {N} values, got {}", values.len()),
    }
}

/// Stdout, or a buffered file when `output` is given
pub fn open_output(output: Option<&Path>) -> Result<Box<dyn Write>> {
    match output {
        Some(path) => {
            let file = File::create(path).with_context(|| format!("creating {}", path.display()))?;
            Ok(Box::new(BufWriter::new(file)))
        }
        None => Ok(Box::new(io::stdout().lock())),
    }
}

pub fn write_pretty_json<T: Serialize>(value: &T) -> Result<()> {
    let mut stdout = io::stdout().lock();
    serde_json::to_writer_pretty(&mut stdout, value).context("serializing result")?;
    writeln!(stdout)?;
    Ok(())
}
