use super::ui;
use crate::core::config::AppConfig;
use crate::core::sync::SyncEngine;
use crate::providers::frankfurter::FrankfurterProvider;
use crate::providers::splitwise::SplitwiseClient;
use crate::store::Store;
use anyhow::Result;
use tracing::{error, info};

/// Synchronizes every configured person, one after another. A failed sync
/// for one person is recorded in their audit trail and does not stop the
/// others.
pub async fn run(config: &AppConfig) -> Result<()> {
    let store = Store::open(&config.store_path()?)?;
    let rates = FrankfurterProvider::new(config.providers.frankfurter_base_url())?;

    let pb = ui::new_progress_bar(config.people.len() as u64, true);
    pb.set_message("Syncing expenses...");

    for person in &config.people {
        info!("Syncing expenses for {}", person.name);
        let ledger = SplitwiseClient::new(config.providers.splitwise_base_url(), person)?;
        let engine = SyncEngine::new(&store, person, &ledger, &rates);

        let marker = engine.execute().await?;
        pb.inc(1);

        if marker.success {
            info!(
                "Sync for {} succeeded: {} added/updated, {} deleted, {} currency conversions",
                person.name,
                marker.counts.updates,
                marker.counts.deletes,
                marker.counts.conversions
            );
        } else {
            error!(
                "Sync for {} failed: {}",
                person.name,
                marker.message.as_deref().unwrap_or("unknown error")
            );
            if let Some(last_ok) = store.last_successful_marker(person.user_id)? {
                info!(
                    "Last successful sync for {} was at {}",
                    person.name, last_ok.created_at
                );
            }
        }
    }
    pb.finish_and_clear();
    Ok(())
}
