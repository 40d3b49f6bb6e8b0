use crate::core::config::AppConfig;
use crate::store::Store;
use anyhow::Result;
use tracing::info;

/// What to remove from the local store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum PurgeTarget {
    /// All mirrored expense records
    Expenses,
    /// All sync audit markers
    Markers,
}

pub fn run(config: &AppConfig, target: PurgeTarget) -> Result<()> {
    let store = Store::open(&config.store_path()?)?;

    let removed = match target {
        PurgeTarget::Expenses => {
            info!("Asked to purge all expenses from the store");
            store.purge_expenses()?
        }
        PurgeTarget::Markers => {
            info!("Asked to purge all markers from the store");
            store.purge_markers()?
        }
    };

    println!("{removed} records purged");
    Ok(())
}
