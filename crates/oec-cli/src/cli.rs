use clap::{CommandFactory, Parser, Subcommand, ValueHint};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "oec", author, version, about = "Offshore energy cluster MPC", long_about = None)]
pub struct Cli {
    /// Set the logging level (overridden by RUST_LOG)
    #[arg(long, default_value = "info", global = true)]
    pub log_level: tracing::Level,

    /// Cluster configuration (TOML); defaults are used when omitted
    #[arg(long, global = true, value_hint = ValueHint::FilePath)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Print the effective configuration as TOML
    Config {
        /// Write to a file instead of stdout
        #[arg(short, long, value_hint = ValueHint::FilePath)]
        output: Option<PathBuf>,
    },
    /// Run one controller tick of a single layer
    Solve {
        #[command(subcommand)]
        command: SolveCommands,
    },
    /// Closed-loop cascade: scheduler, wind farm and both platforms per tick
    Simulate {
        /// Number of ticks; the last wind speed is held past the end of `--wind`
        #[arg(long)]
        ticks: Option<usize>,
        /// Wind speed of each tick in m/s (comma separated)
        #[arg(long, value_delimiter = ',', required = true, num_args = 1..)]
        wind: Vec<f64>,
        /// Initial battery state of charge
        #[arg(long, default_value = "0.5")]
        soc0: f64,
        /// Mean normalized flow target per platform
        #[arg(long, value_delimiter = ',', default_values_t = vec![0.5, 0.5])]
        volume: Vec<f64>,
        /// Battery state-of-charge target of the scheduler
        #[arg(long, default_value = "0.5")]
        soc_target: f64,
        /// Write one JSON line per tick here instead of stdout
        #[arg(short, long, value_hint = ValueHint::FilePath)]
        output: Option<PathBuf>,
    },
}

#[derive(Subcommand, Debug)]
pub enum SolveCommands {
    /// Platform MPC: pump and two gas turbines
    Platform {
        /// Normalized pump flow demand
        #[arg(long, default_value = "0.0")]
        qd: f64,
        /// Delivered power, per-unit of the maximum delivery
        #[arg(long, default_value = "0.0")]
        pdel: f64,
        /// Initial state, 8 entries (comma separated); at rest when omitted
        #[arg(long, value_delimiter = ',')]
        state: Option<Vec<f64>>,
    },
    /// Wind-farm MPC: turbine dispatch, battery and charging
    WindFarm {
        /// Wind speed in m/s
        #[arg(long)]
        wind_speed: f64,
        /// `P_wtg1,P_wtg2,P_b1,P_b2,P_charge` setpoints from the scheduler
        #[arg(long, value_delimiter = ',', default_values_t = vec![0.0; 5])]
        setpoints: Vec<f64>,
        /// Battery state of charge
        #[arg(long, default_value = "0.5")]
        soc: f64,
    },
    /// Scheduler MPC: battery, wind split and pumping plan
    Scheduler {
        /// Persistence forecast of available wind power, per-unit of base
        #[arg(long)]
        forecast: f64,
        /// Mean normalized flow target per platform
        #[arg(long, value_delimiter = ',', default_values_t = vec![0.5, 0.5])]
        volume: Vec<f64>,
        /// Battery state-of-charge target
        #[arg(long, default_value = "0.5")]
        soc_target: f64,
        /// Measured battery state of charge
        #[arg(long, default_value = "0.5")]
        soc: f64,
    },
}

pub fn build_cli_command() -> clap::Command {
    Cli::command()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_definition_is_consistent() {
        build_cli_command().debug_assert();
    }

    #[test]
    fn test_parse_simulate_lists() {
        let cli = Cli::try_parse_from(["oec", "simulate", "--wind", "8,9.5,11", "--volume", "0.4,0.6"]).unwrap();
        match cli.command {
            Commands::Simulate {
                ticks, wind, volume, soc0, ..
            } => {
                assert_eq!(ticks, None);
                assert_eq!(wind, vec![8.0, 9.5, 11.0]);
                assert_eq!(volume, vec![0.4, 0.6]);
                assert_eq!(soc0, 0.5);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn test_parse_wind_farm_setpoints() {
        let cli = Cli::try_parse_from([
            "oec",
            "solve",
            "wind-farm",
            "--wind-speed",
            "10",
            "--setpoints",
            "0.1,0.2,0,0,0.05",
        ])
        .unwrap();
        match cli.command {
            Commands::Solve {
                command: SolveCommands::WindFarm { setpoints, soc, .. },
            } => {
                assert_eq!(setpoints, vec![0.1, 0.2, 0.0, 0.0, 0.05]);
                assert_eq!(soc, 0.5);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn test_simulate_requires_wind() {
        assert!(Cli::try_parse_from(["oec", "simulate"]).is_err());
    }

    #[test]
    fn test_global_config_after_subcommand() {
        let cli = Cli::try_parse_from(["oec", "solve", "platform", "--qd", "0.3", "--config", "cluster.toml"]).unwrap();
        assert_eq!(cli.config, Some(PathBuf::from("cluster.toml")));
        assert!(matches!(
            cli.command,
            Commands::Solve {
                command: SolveCommands::Platform { state: None, .. }
            }
        ));
    }
}
