use anyhow::{Context, Result, anyhow, bail};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime};
use rust_decimal::Decimal;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use std::collections::HashMap;
use tracing::{debug, instrument};

use crate::core::config::{GroupMap, Person};
use crate::core::expense::{Expense, ExpenseId};
use crate::core::ledger::{LedgerChanges, LedgerClient};

// Settlement records are bookkeeping noise, not spending.
const EXCLUDED_CREATION_METHODS: [&str; 2] = ["debt_consolidation", "payment"];

/// Splitwise API client for one person. Decides which remote records count
/// toward that person's expenses (their share must be positive, settlements
/// and records deleted upstream do not count) and maps raw API records into
/// local expenses, including category and group-label resolution.
pub struct SplitwiseClient {
    base_url: String,
    client: reqwest::Client,
    person: Person,
    groups: GroupMap,
}

impl SplitwiseClient {
    pub fn new(base_url: &str, person: &Person) -> Result<Self> {
        let groups = person.group_map()?;
        let client = reqwest::Client::builder().user_agent("divvy/1.0").build()?;
        Ok(SplitwiseClient {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
            person: person.clone(),
            groups,
        })
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<T> {
        let url = format!("{}/{}", self.base_url, path);
        debug!("Requesting {url}");

        let response = self
            .client
            .get(&url)
            .bearer_auth(&self.person.api_key)
            .query(query)
            .send()
            .await
            .map_err(|e| anyhow!("Request error: {e} for URL: {url}"))?;

        if !response.status().is_success() {
            bail!("HTTP error: {} for URL: {}", response.status(), url);
        }

        let text = response.text().await?;
        serde_json::from_str(&text)
            .map_err(|e| anyhow!("Failed to parse response from {url}: {e}"))
    }

    /// Fetches the category tree and flattens it into subcategory id ->
    /// (parent name, child name).
    async fn fetch_categories(&self) -> Result<HashMap<i64, Category>> {
        let response: CategoriesResponse = self.get_json("get_categories", &[]).await?;
        let mut categories = HashMap::new();
        for parent in response.categories {
            for sub in parent.subcategories {
                categories.insert(
                    sub.id,
                    Category {
                        parent: parent.name.clone(),
                        name: sub.name,
                    },
                );
            }
        }
        Ok(categories)
    }

    /// The share owed by this person within the raw expense, 0 when the
    /// person is not among its users.
    fn user_share(&self, raw: &RawExpense) -> Result<Decimal> {
        for share in &raw.users {
            if share.user.id == self.person.user_id {
                return match &share.owed_share {
                    Some(amount) => amount.parse().with_context(|| {
                        format!("Invalid owed_share '{amount}' on expense {}", raw.id)
                    }),
                    None => Ok(Decimal::ZERO),
                };
            }
        }
        Ok(Decimal::ZERO)
    }

    fn involves_user(&self, raw: &RawExpense) -> bool {
        raw.users.iter().any(|s| s.user.id == self.person.user_id)
    }

    fn is_applicable(raw: &RawExpense, share: Decimal) -> bool {
        if let Some(method) = &raw.creation_method {
            if EXCLUDED_CREATION_METHODS.contains(&method.as_str()) {
                return false;
            }
        }
        share > Decimal::ZERO
    }

    fn to_expense(
        &self,
        raw: RawExpense,
        share: Decimal,
        categories: &HashMap<i64, Category>,
    ) -> Result<Expense> {
        let category = categories.get(&raw.category.id).with_context(|| {
            format!("Unknown category id {} on expense {}", raw.category.id, raw.id)
        })?;
        // The timezone is dropped deliberately; Splitwise reports UTC.
        let occurred_at = DateTime::parse_from_rfc3339(&raw.date)
            .with_context(|| format!("Invalid date '{}' on expense {}", raw.date, raw.id))?
            .naive_utc();
        let group_id = raw.group_id.unwrap_or(0);

        Ok(Expense {
            id: ExpenseId::new(self.person.user_id, raw.id),
            group_id,
            group: self.groups.label(group_id).to_string(),
            occurred_at,
            description: raw.description.unwrap_or_default().trim().to_string(),
            parent_category: category.parent.clone(),
            child_category: category.name.clone(),
            cost: share,
            original_currency: raw.currency_code.clone(),
            currency: raw.currency_code,
        })
    }
}

#[async_trait]
impl LedgerClient for SplitwiseClient {
    #[instrument(
        name = "SplitwiseFetchChanges",
        skip(self),
        fields(person = %self.person.name)
    )]
    async fn fetch_changes(&self, since: Option<NaiveDateTime>) -> Result<LedgerChanges> {
        let categories = self.fetch_categories().await?;

        let query = match since {
            Some(watermark) => vec![(
                "updated_after",
                watermark.format("%Y-%m-%dT%H:%M:%SZ").to_string(),
            )],
            None => vec![("limit", "0".to_string())],
        };
        let response: ExpensesResponse = self.get_json("get_expenses", &query).await?;

        let mut changes = LedgerChanges::default();
        for raw in response.expenses {
            if raw.deleted_at.is_some() {
                if self.involves_user(&raw) {
                    changes
                        .deleted
                        .push(ExpenseId::new(self.person.user_id, raw.id));
                }
                continue;
            }
            let share = self.user_share(&raw)?;
            if !Self::is_applicable(&raw, share) {
                continue;
            }
            changes.updated.push(self.to_expense(raw, share, &categories)?);
        }
        debug!(
            "Fetched {} updated and {} deleted expenses",
            changes.updated.len(),
            changes.deleted.len()
        );
        Ok(changes)
    }
}

struct Category {
    parent: String,
    name: String,
}

#[derive(Debug, Deserialize)]
struct ExpensesResponse {
    expenses: Vec<RawExpense>,
}

#[derive(Debug, Deserialize)]
struct RawExpense {
    id: i64,
    group_id: Option<i64>,
    date: String,
    description: Option<String>,
    currency_code: String,
    creation_method: Option<String>,
    deleted_at: Option<String>,
    category: RawCategoryRef,
    #[serde(default)]
    users: Vec<RawShare>,
}

#[derive(Debug, Deserialize)]
struct RawCategoryRef {
    id: i64,
}

#[derive(Debug, Deserialize)]
struct RawShare {
    user: RawUser,
    owed_share: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawUser {
    id: i64,
}

#[derive(Debug, Deserialize)]
struct CategoriesResponse {
    categories: Vec<RawCategory>,
}

#[derive(Debug, Deserialize)]
struct RawCategory {
    name: String,
    #[serde(default)]
    subcategories: Vec<RawSubcategory>,
}

#[derive(Debug, Deserialize)]
struct RawSubcategory {
    id: i64,
    name: String,
}
