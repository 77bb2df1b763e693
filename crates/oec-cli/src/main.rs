use anyhow::Result;
use clap::Parser;
use oec_cli::cli::{Cli, Commands};
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::EnvFilter;

mod commands;

fn main() -> Result<()> {
    let cli = Cli::parse();

    // stdout carries the JSON results, logs go to stderr
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::default().add_directive(LevelFilter::from_level(cli.log_level).into()));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let config_path = cli.config.as_deref();
    match cli.command {
        Commands::Config { output } => commands::config::handle(config_path, output.as_deref()),
        Commands::Solve { command } => commands::solve::handle(config_path, command),
        Commands::Simulate {
            ticks,
            wind,
            soc0,
            volume,
            soc_target,
            output,
        } => commands::simulate::handle(
            config_path,
            commands::simulate::SimulateArgs {
                ticks,
                wind,
                soc0,
                volume,
                soc_target,
                output,
            },
        ),
    }
}
