//! The mirrored expense record and its composite identity.

use chrono::NaiveDateTime;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt::Display;

/// Identity of a mirrored expense: the owning person's Splitwise user id
/// combined with the remote expense id. Re-ingesting the same remote record
/// always maps to the same identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ExpenseId {
    pub user_id: i64,
    pub remote_id: i64,
}

impl ExpenseId {
    pub fn new(user_id: i64, remote_id: i64) -> Self {
        Self { user_id, remote_id }
    }
}

impl Display for ExpenseId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.user_id, self.remote_id)
    }
}

/// One person's share of a shared expense, as stored locally.
///
/// `currency` equals `original_currency` until the sync run converts the
/// record into the person's reporting currency; `cost` is always expressed
/// in `currency` at 2-place precision.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Expense {
    pub id: ExpenseId,
    pub group_id: i64,
    pub group: String,
    pub occurred_at: NaiveDateTime,
    pub description: String,
    pub parent_category: String,
    pub child_category: String,
    pub cost: Decimal,
    pub original_currency: String,
    pub currency: String,
}

impl Expense {
    /// The two-level category key, e.g. "Home/Rent".
    pub fn category(&self) -> String {
        format!("{}/{}", self.parent_category, self.child_category)
    }

    /// Human-facing category name. Splitwise names the catch-all child of
    /// every parent "Other", so that case is disambiguated with the parent.
    pub fn category_display(&self) -> String {
        if self.child_category == "Other" {
            format!("Other {}", self.parent_category)
        } else {
            self.child_category.clone()
        }
    }
}
