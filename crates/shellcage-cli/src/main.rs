mod cli;
mod commands;
mod config;
mod error;
mod output;

use std::process::ExitCode;

use anyhow::Result;
use clap::Parser;
use cli::{Cli, Commands};
use tracing_subscriber::EnvFilter;

const LOG_ENV: &str = "SHELLCAGE_LOG";

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Logs go to stderr; stdout belongs to the sandboxed command
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_level(true)
        .init();

    match dispatch(cli).await {
        Ok(code) => ExitCode::from(u8::try_from(code).unwrap_or(1)),
        Err(err) => error::handle_error(err),
    }
}

async fn dispatch(cli: Cli) -> Result<i32> {
    let load_config = || config::CliConfig::load(cli.config.as_deref());

    match cli.command {
        Commands::Run(args) => commands::run::run(args, &load_config()?).await,
        Commands::Wrap(args) => commands::wrap::run(args, &load_config()?, cli.format).map(|()| 0),
        Commands::Profile(args) => {
            commands::profile::run(args, &load_config()?, cli.format).map(|()| 0)
        }
        Commands::Classify { addresses } => {
            commands::classify::run(&addresses, cli.format).map(|()| 0)
        }
        Commands::Completions { shell } => {
            commands::completions::run(shell, &mut std::io::stdout());
            Ok(0)
        }
    }
}
