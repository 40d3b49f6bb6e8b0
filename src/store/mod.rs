//! Durable local store: mirrored expenses, sync markers and cached
//! conversion rates, each in its own partition of one fjall keyspace.

use crate::core::expense::{Expense, ExpenseId};
use crate::core::marker::Marker;
use anyhow::Result;
use chrono::NaiveDate;
use fjall::{Config, Keyspace, PartitionCreateOptions, PartitionHandle};
use rust_decimal::Decimal;
use std::path::Path;
use tracing::debug;

pub struct Store {
    // Held so the keyspace outlives its partition handles.
    _keyspace: Keyspace,
    expenses: PartitionHandle,
    markers: PartitionHandle,
    rates: PartitionHandle,
}

impl Store {
    pub fn open(path: &Path) -> Result<Self> {
        std::fs::create_dir_all(path)?;

        let keyspace = Config::new(path).open()?;
        let expenses = keyspace.open_partition("expenses", PartitionCreateOptions::default())?;
        let markers = keyspace.open_partition("markers", PartitionCreateOptions::default())?;
        let rates = keyspace.open_partition("rates", PartitionCreateOptions::default())?;
        Ok(Self {
            _keyspace: keyspace,
            expenses,
            markers,
            rates,
        })
    }

    fn expense_key(id: &ExpenseId) -> String {
        format!("{}/{}", id.user_id, id.remote_id)
    }

    // Marker keys sort chronologically per user: the timestamp is rendered
    // at fixed width with nanosecond precision.
    fn marker_key(marker: &Marker) -> String {
        format!(
            "{}/{}",
            marker.user_id,
            marker.created_at.format("%Y-%m-%dT%H:%M:%S%.9f")
        )
    }

    fn rate_key(on: NaiveDate, from: &str, to: &str) -> String {
        format!("{on}/{from}/{to}")
    }

    /// Inserts or overwrites an expense under its composite identity.
    pub fn upsert_expense(&self, expense: &Expense) -> Result<()> {
        let key = Self::expense_key(&expense.id);
        self.expenses.insert(&key, serde_json::to_vec(expense)?)?;
        debug!("Expense UPSERT for key: {key}");
        Ok(())
    }

    /// Removes an expense if present. Returns whether a record was removed;
    /// deleting an absent id is not an error.
    pub fn delete_expense(&self, id: &ExpenseId) -> Result<bool> {
        let key = Self::expense_key(id);
        let existed = self.expenses.contains_key(&key)?;
        if existed {
            self.expenses.remove(&key)?;
            debug!("Expense DELETE for key: {key}");
        }
        Ok(existed)
    }

    pub fn get_expense(&self, id: &ExpenseId) -> Result<Option<Expense>> {
        match self.expenses.get(Self::expense_key(id))? {
            Some(value) => Ok(Some(serde_json::from_slice(&value)?)),
            None => Ok(None),
        }
    }

    /// All of a person's expenses whose occurrence date falls within the
    /// inclusive range, ordered by cost descending then recency.
    pub fn expenses_between(
        &self,
        user_id: i64,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<Expense>> {
        let mut results = Vec::new();
        for entry in self.expenses.prefix(format!("{user_id}/")) {
            let (_key, value) = entry?;
            let expense: Expense = serde_json::from_slice(&value)?;
            let on = expense.occurred_at.date();
            if on >= start && on <= end {
                results.push(expense);
            }
        }
        results.sort_by(|a, b| b.cost.cmp(&a.cost).then(b.occurred_at.cmp(&a.occurred_at)));
        Ok(results)
    }

    /// Appends a sync marker to the person's audit trail.
    pub fn append_marker(&self, marker: &Marker) -> Result<()> {
        let key = Self::marker_key(marker);
        self.markers.insert(&key, serde_json::to_vec(marker)?)?;
        debug!("Marker APPEND for key: {key}");
        Ok(())
    }

    pub fn last_marker(&self, user_id: i64) -> Result<Option<Marker>> {
        for entry in self.markers.prefix(format!("{user_id}/")).rev() {
            let (_key, value) = entry?;
            return Ok(Some(serde_json::from_slice(&value)?));
        }
        Ok(None)
    }

    /// The most recent marker with `success = true`, i.e. the watermark
    /// source for the next incremental sync.
    pub fn last_successful_marker(&self, user_id: i64) -> Result<Option<Marker>> {
        for entry in self.markers.prefix(format!("{user_id}/")).rev() {
            let (_key, value) = entry?;
            let marker: Marker = serde_json::from_slice(&value)?;
            if marker.success {
                return Ok(Some(marker));
            }
        }
        Ok(None)
    }

    pub fn cached_rate(&self, on: NaiveDate, from: &str, to: &str) -> Result<Option<Decimal>> {
        match self.rates.get(Self::rate_key(on, from, to))? {
            Some(value) => Ok(Some(serde_json::from_slice(&value)?)),
            None => Ok(None),
        }
    }

    /// Caches a conversion rate for a (date, from, to) triple. A rate stored
    /// for a past date is an immutable fact: if the triple is already
    /// present the existing value is kept and this is a no-op.
    pub fn put_rate(&self, on: NaiveDate, from: &str, to: &str, rate: Decimal) -> Result<()> {
        let key = Self::rate_key(on, from, to);
        if self.rates.contains_key(&key)? {
            debug!("Rate already cached for key: {key}, keeping existing value");
            return Ok(());
        }
        self.rates.insert(&key, serde_json::to_vec(&rate)?)?;
        debug!("Rate PUT for key: {key}");
        Ok(())
    }

    pub fn purge_expenses(&self) -> Result<u64> {
        Self::purge_partition(&self.expenses)
    }

    pub fn purge_markers(&self) -> Result<u64> {
        Self::purge_partition(&self.markers)
    }

    fn purge_partition(partition: &PartitionHandle) -> Result<u64> {
        let mut keys = Vec::new();
        for entry in partition.iter() {
            let (key, _value) = entry?;
            keys.push(key);
        }
        let removed = keys.len() as u64;
        for key in keys {
            partition.remove(key)?;
        }
        Ok(removed)
    }
}
