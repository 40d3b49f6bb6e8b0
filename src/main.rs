use anyhow::Result;
use clap::{CommandFactory, Parser, Subcommand};
use divvy::PurgeTarget;
use divvy::core::log::init_logging;

#[derive(Parser)]
#[command(version, about)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Path to optional configuration file
    #[arg(short, long, global = true)]
    config_path: Option<String>,

    #[command(subcommand)]
    command: Option<Commands>,
}

impl From<Commands> for divvy::AppCommand {
    fn from(cmd: Commands) -> divvy::AppCommand {
        match cmd {
            Commands::Sync => divvy::AppCommand::Sync,
            Commands::Report { month } => divvy::AppCommand::Report { month },
            Commands::Status => divvy::AppCommand::Status,
            Commands::Purge { target } => divvy::AppCommand::Purge(target),
            Commands::Setup => unreachable!("Setup command should be handled separately"),
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Create default configuration
    Setup,
    /// Mirror expenses from Splitwise into the local store
    Sync,
    /// Display a monthly expense report
    Report {
        /// Month to report on, e.g. 2026-07 (defaults to the current month)
        #[arg(short, long)]
        month: Option<String>,
    },
    /// Show the outcome of the most recent sync for each person
    Status,
    /// Remove all stored records of the given kind
    Purge {
        #[arg(value_enum)]
        target: PurgeTarget,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_logging(cli.verbose);

    let result = match cli.command {
        Some(Commands::Setup) => divvy::cli::setup::setup(),
        Some(cmd) => divvy::run_command(cmd.into(), cli.config_path.as_deref()).await,
        None => {
            Cli::command().print_help()?;
            Ok(())
        }
    };

    if let Err(e) = &result {
        tracing::error!(error = %e, "Application failed");
    }
    result
}
