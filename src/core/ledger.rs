//! The remote ledger collaborator seam.

use crate::core::expense::{Expense, ExpenseId};
use anyhow::Result;
use async_trait::async_trait;
use chrono::NaiveDateTime;

/// Changes reported by the remote ledger since a watermark: records to
/// upsert (already filtered to the ones applicable to the person) and
/// identifiers of remotely deleted records.
#[derive(Debug, Default, Clone)]
pub struct LedgerChanges {
    pub updated: Vec<Expense>,
    pub deleted: Vec<ExpenseId>,
}

#[async_trait]
pub trait LedgerClient: Send + Sync {
    /// Fetches applicable new/updated expenses and deleted record ids.
    /// `since` of `None` means "since the beginning".
    async fn fetch_changes(&self, since: Option<NaiveDateTime>) -> Result<LedgerChanges>;
}
