//! Brings the local expense mirror up to date with the remote ledger for
//! one person and records the outcome in the audit trail.

use crate::core::config::Person;
use crate::core::currency::{RateProvider, round_money};
use crate::core::expense::Expense;
use crate::core::ledger::LedgerClient;
use crate::core::marker::{Marker, SyncCounts};
use crate::store::Store;
use anyhow::Result;
use chrono::Utc;
use tracing::{debug, warn};

pub struct SyncEngine<'a> {
    store: &'a Store,
    person: &'a Person,
    ledger: &'a dyn LedgerClient,
    rates: &'a dyn RateProvider,
}

impl<'a> SyncEngine<'a> {
    pub fn new(
        store: &'a Store,
        person: &'a Person,
        ledger: &'a dyn LedgerClient,
        rates: &'a dyn RateProvider,
    ) -> Self {
        Self {
            store,
            person,
            ledger,
            rates,
        }
    }

    /// Runs one sync pass and appends exactly one marker, success or not.
    /// Errors during the run are captured in a failed marker together with
    /// the counters accumulated so far; work committed before the failure
    /// stays committed. The only error returned from here is a failure to
    /// append the marker itself.
    pub async fn execute(&self) -> Result<Marker> {
        let started_at = Utc::now().naive_utc();
        let mut counts = SyncCounts::default();

        let marker = match self.run(&mut counts).await {
            Ok(()) => Marker::succeeded(self.person.user_id, started_at, counts),
            Err(e) => {
                warn!("Sync run for {} failed: {e:#}", self.person.name);
                Marker::failed(self.person.user_id, started_at, counts, format!("{e:#}"))
            }
        };
        self.store.append_marker(&marker)?;
        Ok(marker)
    }

    async fn run(&self, counts: &mut SyncCounts) -> Result<()> {
        let watermark = self
            .store
            .last_successful_marker(self.person.user_id)?
            .map(|marker| marker.created_at);
        debug!(
            "Syncing {} with watermark {watermark:?}",
            self.person.name
        );

        let changes = self.ledger.fetch_changes(watermark).await?;
        for mut expense in changes.updated {
            self.convert_currency(&mut expense, counts).await?;
            self.store.upsert_expense(&expense)?;
            counts.updates += 1;
        }
        for id in changes.deleted {
            if self.store.delete_expense(&id)? {
                counts.deletes += 1;
            }
        }
        Ok(())
    }

    /// Converts the expense into the person's reporting currency, using a
    /// cached rate for the (date, from, to) triple when one exists and
    /// persisting a freshly fetched one otherwise. A record already in the
    /// reporting currency is left untouched.
    async fn convert_currency(&self, expense: &mut Expense, counts: &mut SyncCounts) -> Result<()> {
        let target = &self.person.reporting_currency;
        if expense.currency == *target {
            return Ok(());
        }

        let on = expense.occurred_at.date();
        let from = expense.original_currency.clone();
        let rate = match self.store.cached_rate(on, &from, target)? {
            Some(rate) => rate,
            None => {
                let rate = self.rates.rate_for(on, &from, target).await?;
                self.store.put_rate(on, &from, target, rate)?;
                rate
            }
        };

        expense.cost = round_money(expense.cost * rate);
        expense.currency = target.clone();
        counts.conversions += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::GroupRule;
    use crate::core::currency::UnknownCurrency;
    use crate::core::expense::ExpenseId;
    use crate::core::ledger::LedgerChanges;
    use anyhow::anyhow;
    use async_trait::async_trait;
    use chrono::{NaiveDate, NaiveDateTime};
    use rust_decimal::Decimal;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::tempdir;

    struct StaticLedger {
        changes: LedgerChanges,
        last_since: Mutex<Option<Option<NaiveDateTime>>>,
    }

    impl StaticLedger {
        fn new(changes: LedgerChanges) -> Self {
            Self {
                changes,
                last_since: Mutex::new(None),
            }
        }
    }

    #[async_trait]
    impl LedgerClient for StaticLedger {
        async fn fetch_changes(&self, since: Option<NaiveDateTime>) -> Result<LedgerChanges> {
            *self.last_since.lock().unwrap() = Some(since);
            Ok(self.changes.clone())
        }
    }

    struct FailingLedger;

    #[async_trait]
    impl LedgerClient for FailingLedger {
        async fn fetch_changes(&self, _since: Option<NaiveDateTime>) -> Result<LedgerChanges> {
            Err(anyhow!("Request error: connection refused"))
        }
    }

    struct FixedRateProvider {
        rate: Decimal,
        call_count: AtomicUsize,
    }

    impl FixedRateProvider {
        fn new(rate: &str) -> Self {
            Self {
                rate: rate.parse().unwrap(),
                call_count: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl RateProvider for FixedRateProvider {
        async fn rate_for(&self, _on: NaiveDate, _from: &str, _to: &str) -> Result<Decimal> {
            self.call_count.fetch_add(1, Ordering::SeqCst);
            Ok(self.rate)
        }
    }

    struct RejectingRateProvider;

    #[async_trait]
    impl RateProvider for RejectingRateProvider {
        async fn rate_for(&self, _on: NaiveDate, from: &str, _to: &str) -> Result<Decimal> {
            Err(UnknownCurrency(from.to_string()).into())
        }
    }

    fn person() -> Person {
        Person {
            name: "Ada".to_string(),
            user_id: 1,
            email: "ada@example.com".to_string(),
            api_key: "secret".to_string(),
            reporting_currency: "GBP".to_string(),
            groups: vec![
                GroupRule {
                    id: Some(7),
                    label: "Home".to_string(),
                },
                GroupRule {
                    id: None,
                    label: "Other".to_string(),
                },
            ],
        }
    }

    fn dec(s: &str) -> Decimal {
        s.parse().unwrap()
    }

    fn expense(remote_id: i64, cost: &str, currency: &str, date: &str) -> Expense {
        Expense {
            id: ExpenseId::new(1, remote_id),
            group_id: 7,
            group: "Home".to_string(),
            occurred_at: NaiveDate::parse_from_str(date, "%Y-%m-%d")
                .unwrap()
                .and_hms_opt(12, 0, 0)
                .unwrap(),
            description: "Groceries".to_string(),
            parent_category: "Food and drink".to_string(),
            child_category: "Groceries".to_string(),
            cost: dec(cost),
            original_currency: currency.to_string(),
            currency: currency.to_string(),
        }
    }

    fn all_rows(store: &Store) -> Vec<Expense> {
        store
            .expenses_between(
                1,
                NaiveDate::from_ymd_opt(2000, 1, 1).unwrap(),
                NaiveDate::from_ymd_opt(2099, 12, 31).unwrap(),
            )
            .unwrap()
    }

    #[tokio::test]
    async fn test_sync_converts_with_cache_and_provider() {
        let dir = tempdir().unwrap();
        let store = Store::open(dir.path()).unwrap();
        let person = person();

        // SEK rate for 2026-06-05 is already cached; the DKK rate must be
        // fetched from the provider.
        store
            .put_rate(
                NaiveDate::from_ymd_opt(2026, 6, 5).unwrap(),
                "SEK",
                "GBP",
                dec("0.08"),
            )
            .unwrap();

        let ledger = StaticLedger::new(LedgerChanges {
            updated: vec![
                expense(1, "4.33", "SEK", "2026-06-05"),
                expense(2, "5.79", "SEK", "2026-06-05"),
                expense(3, "3.33", "DKK", "2026-07-02"),
                expense(4, "4.30", "GBP", "2026-07-10"),
            ],
            deleted: vec![],
        });
        let rates = FixedRateProvider::new("0.09");

        let marker = SyncEngine::new(&store, &person, &ledger, &rates)
            .execute()
            .await
            .unwrap();

        assert!(marker.success);
        assert_eq!(marker.counts.updates, 4);
        assert_eq!(marker.counts.deletes, 0);
        // One conversion per record whose currency differs, cached or not.
        assert_eq!(marker.counts.conversions, 3);
        // Only the DKK rate was missing from the cache.
        assert_eq!(rates.call_count.load(Ordering::SeqCst), 1);

        let rows = all_rows(&store);
        assert_eq!(rows.len(), 4);

        let by_id = |remote_id| {
            store
                .get_expense(&ExpenseId::new(1, remote_id))
                .unwrap()
                .unwrap()
        };
        // 4.33 * 0.08 = 0.3464 -> 0.35
        assert_eq!(by_id(1).cost, dec("0.35"));
        // 5.79 * 0.08 = 0.4632 -> 0.46
        assert_eq!(by_id(2).cost, dec("0.46"));
        // 3.33 * 0.09 = 0.2997 -> 0.30
        assert_eq!(by_id(3).cost, dec("0.30"));
        assert_eq!(by_id(4).cost, dec("4.30"));
        for remote_id in 1..=4 {
            assert_eq!(by_id(remote_id).currency, "GBP");
        }
        assert_eq!(by_id(1).original_currency, "SEK");
        assert_eq!(by_id(4).original_currency, "GBP");

        // The fetched DKK rate is now cached for later runs.
        assert_eq!(
            store
                .cached_rate(NaiveDate::from_ymd_opt(2026, 7, 2).unwrap(), "DKK", "GBP")
                .unwrap(),
            Some(dec("0.09"))
        );
    }

    #[tokio::test]
    async fn test_sync_deletes_reported_records() {
        let dir = tempdir().unwrap();
        let store = Store::open(dir.path()).unwrap();
        let person = person();

        store
            .put_rate(
                NaiveDate::from_ymd_opt(2026, 6, 5).unwrap(),
                "SEK",
                "GBP",
                dec("0.08"),
            )
            .unwrap();
        let ledger = StaticLedger::new(LedgerChanges {
            updated: vec![
                expense(1, "4.33", "SEK", "2026-06-05"),
                expense(2, "5.79", "SEK", "2026-06-05"),
                expense(3, "3.33", "DKK", "2026-07-02"),
                expense(4, "4.30", "GBP", "2026-07-10"),
            ],
            deleted: vec![],
        });
        let rates = FixedRateProvider::new("0.09");
        SyncEngine::new(&store, &person, &ledger, &rates)
            .execute()
            .await
            .unwrap();
        let before: Vec<Expense> = all_rows(&store)
            .into_iter()
            .filter(|e| e.id.remote_id != 2)
            .collect();

        // The next sync reports one of the four records as deleted.
        let ledger = StaticLedger::new(LedgerChanges {
            updated: vec![],
            deleted: vec![ExpenseId::new(1, 2)],
        });
        let marker = SyncEngine::new(&store, &person, &ledger, &rates)
            .execute()
            .await
            .unwrap();

        assert!(marker.success);
        assert_eq!(marker.counts.updates, 0);
        assert_eq!(marker.counts.deletes, 1);
        let after = all_rows(&store);
        assert_eq!(after.len(), 3);
        assert_eq!(after, before);
    }

    #[tokio::test]
    async fn test_deleting_absent_record_is_a_noop() {
        let dir = tempdir().unwrap();
        let store = Store::open(dir.path()).unwrap();
        let person = person();

        let ledger = StaticLedger::new(LedgerChanges {
            updated: vec![],
            deleted: vec![ExpenseId::new(1, 999)],
        });
        let rates = FixedRateProvider::new("0.09");
        let marker = SyncEngine::new(&store, &person, &ledger, &rates)
            .execute()
            .await
            .unwrap();

        assert!(marker.success);
        assert_eq!(marker.counts.deletes, 0);
    }

    #[tokio::test]
    async fn test_rerunning_with_same_upstream_state_is_idempotent() {
        let dir = tempdir().unwrap();
        let store = Store::open(dir.path()).unwrap();
        let person = person();

        let ledger = StaticLedger::new(LedgerChanges {
            updated: vec![
                expense(1, "4.33", "SEK", "2026-06-05"),
                expense(2, "4.30", "GBP", "2026-07-10"),
            ],
            deleted: vec![],
        });
        let rates = FixedRateProvider::new("0.08");

        SyncEngine::new(&store, &person, &ledger, &rates)
            .execute()
            .await
            .unwrap();
        let first = all_rows(&store);

        // Upstream re-reports the same records: same rows, same values.
        SyncEngine::new(&store, &person, &ledger, &rates)
            .execute()
            .await
            .unwrap();
        assert_eq!(all_rows(&store), first);
        // The second run reused the cached SEK rate.
        assert_eq!(rates.call_count.load(Ordering::SeqCst), 1);

        // No upstream changes at all is a no-op with zero counters.
        let quiet = StaticLedger::new(LedgerChanges::default());
        let marker = SyncEngine::new(&store, &person, &quiet, &rates)
            .execute()
            .await
            .unwrap();
        assert!(marker.success);
        assert_eq!(marker.counts, SyncCounts::default());
        assert_eq!(all_rows(&store), first);
    }

    #[tokio::test]
    async fn test_one_provider_call_per_rate_triple() {
        let dir = tempdir().unwrap();
        let store = Store::open(dir.path()).unwrap();
        let person = person();

        let ledger = StaticLedger::new(LedgerChanges {
            updated: vec![
                expense(1, "4.33", "SEK", "2026-06-05"),
                expense(2, "5.79", "SEK", "2026-06-05"),
                expense(3, "9.10", "SEK", "2026-06-06"),
            ],
            deleted: vec![],
        });
        let rates = FixedRateProvider::new("0.08");
        let marker = SyncEngine::new(&store, &person, &ledger, &rates)
            .execute()
            .await
            .unwrap();

        assert_eq!(marker.counts.conversions, 3);
        // Two distinct (date, SEK, GBP) triples, so two provider calls.
        assert_eq!(rates.call_count.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_watermark_comes_from_last_successful_marker() {
        let dir = tempdir().unwrap();
        let store = Store::open(dir.path()).unwrap();
        let person = person();
        let rates = FixedRateProvider::new("0.08");

        let ledger = StaticLedger::new(LedgerChanges::default());
        SyncEngine::new(&store, &person, &ledger, &rates)
            .execute()
            .await
            .unwrap();
        // A full sync starts from the beginning.
        assert_eq!(*ledger.last_since.lock().unwrap(), Some(None));
        let first_marker = store.last_successful_marker(1).unwrap().unwrap();

        // A failed run in between must not advance the watermark.
        SyncEngine::new(&store, &person, &FailingLedger, &rates)
            .execute()
            .await
            .unwrap();

        let ledger = StaticLedger::new(LedgerChanges::default());
        SyncEngine::new(&store, &person, &ledger, &rates)
            .execute()
            .await
            .unwrap();
        assert_eq!(
            *ledger.last_since.lock().unwrap(),
            Some(Some(first_marker.created_at))
        );
    }

    #[tokio::test]
    async fn test_ledger_failure_writes_failed_marker() {
        let dir = tempdir().unwrap();
        let store = Store::open(dir.path()).unwrap();
        let person = person();
        let rates = FixedRateProvider::new("0.08");

        let marker = SyncEngine::new(&store, &person, &FailingLedger, &rates)
            .execute()
            .await
            .unwrap();

        assert!(!marker.success);
        assert_eq!(marker.counts, SyncCounts::default());
        assert!(
            marker
                .message
                .as_deref()
                .unwrap()
                .contains("connection refused")
        );
        assert_eq!(store.last_marker(1).unwrap(), Some(marker));
    }

    #[tokio::test]
    async fn test_mid_run_failure_keeps_partial_progress() {
        let dir = tempdir().unwrap();
        let store = Store::open(dir.path()).unwrap();
        let person = person();

        // The first record needs no conversion and commits; the second hits
        // an unknown currency and aborts the rest of the run.
        let ledger = StaticLedger::new(LedgerChanges {
            updated: vec![
                expense(1, "4.30", "GBP", "2026-07-01"),
                expense(2, "3.33", "XXX", "2026-07-02"),
                expense(3, "5.00", "GBP", "2026-07-03"),
            ],
            deleted: vec![],
        });
        let marker = SyncEngine::new(&store, &person, &ledger, &RejectingRateProvider)
            .execute()
            .await
            .unwrap();

        assert!(!marker.success);
        assert_eq!(marker.counts.updates, 1);
        assert_eq!(marker.counts.conversions, 0);
        assert!(marker.message.as_deref().unwrap().contains("XXX"));

        let rows = all_rows(&store);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].id.remote_id, 1);
    }
}
