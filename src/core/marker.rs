//! Sync audit entries. One marker is appended per sync run, success or not.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// Counters accumulated over a single sync run. Threaded through the run as
/// a value and embedded in the resulting marker, so concurrent runs for
/// different people cannot interfere.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncCounts {
    pub updates: u64,
    pub deletes: u64,
    pub conversions: u64,
}

/// The immutable record of one sync run's outcome. The creation timestamp of
/// the most recent successful marker is the watermark for the next run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Marker {
    pub user_id: i64,
    pub created_at: NaiveDateTime,
    pub success: bool,
    #[serde(flatten)]
    pub counts: SyncCounts,
    pub message: Option<String>,
}

impl Marker {
    pub fn succeeded(user_id: i64, created_at: NaiveDateTime, counts: SyncCounts) -> Self {
        Self {
            user_id,
            created_at,
            success: true,
            counts,
            message: None,
        }
    }

    pub fn failed(
        user_id: i64,
        created_at: NaiveDateTime,
        counts: SyncCounts,
        message: String,
    ) -> Self {
        Self {
            user_id,
            created_at,
            success: false,
            counts,
            message: Some(message),
        }
    }
}
