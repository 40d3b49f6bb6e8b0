pub mod cli;
pub mod core;
pub mod providers;
pub mod store;

pub use crate::cli::purge::PurgeTarget;

use anyhow::Result;
use tracing::debug;

/// The commands the application can run against a loaded configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AppCommand {
    Sync,
    Report { month: Option<String> },
    Status,
    Purge(PurgeTarget),
}

pub async fn run_command(command: AppCommand, config_path: Option<&str>) -> Result<()> {
    let config = match config_path {
        Some(path) => crate::core::config::AppConfig::load_from_path(path)?,
        None => crate::core::config::AppConfig::load()?,
    };
    debug!("Running {command:?} for {} people", config.people.len());

    match command {
        AppCommand::Sync => cli::sync::run(&config).await,
        AppCommand::Report { month } => cli::report::run(&config, month.as_deref()),
        AppCommand::Status => cli::status::run(&config),
        AppCommand::Purge(target) => cli::purge::run(&config, target),
    }
}
