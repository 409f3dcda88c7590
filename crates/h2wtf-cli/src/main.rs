use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::EnvFilter;

use h2wtf_cli::commands::summary::SummaryOptions;
use h2wtf_cli::commands::{Outcome, lines, summary};
use h2wtf_cli::{Cli, Commands, Config};

fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    // Initialize tracing with verbose flag support
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    // Keep stdout for records and tables
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();

    let config = Config::load_from(cli.config.as_deref()).context("failed to load configuration")?;
    tracing::debug!(?config, "loaded configuration");

    let outcome = match cli.command {
        Some(Commands::Summary {
            log,
            streams,
            frames,
            echo,
            json,
        }) => {
            let options = SummaryOptions {
                streams,
                frames,
                echo,
                json,
            };
            summary::run(&log, &config, &options)?
        }
        Some(Commands::Lines { log, select }) => lines::run(&log, &config, &select)?,
        None => {
            // No subcommand, show help
            use clap::CommandFactory;
            Cli::command().print_help()?;
            println!();
            Outcome::Data
        }
    };

    Ok(outcome.exit_code())
}
