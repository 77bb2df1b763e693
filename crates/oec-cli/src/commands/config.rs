use anyhow::{Context, Result};
use std::fs;
use std::path::Path;
use tracing::info;

use super::load_config;

pub fn handle(config_path: Option<&Path>, output: Option<&Path>) -> Result<()> {
    let config = load_config(config_path)?;
    let rendered = config.to_toml().context("rendering configuration")?;
    match output {
        Some(path) => {
            fs::write(path, rendered).with_context(|| format!("writing {}", path.display()))?;
            info!(path = %path.display(), "configuration written");
        }
        None => print!("{rendered}"),
    }
    Ok(())
}
