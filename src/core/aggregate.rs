//! Turns stored expenses into a deterministic monthly rollup: grouped by
//! expense group, then by category, rounded and ranked.

use crate::core::config::Person;
use crate::core::currency::round_money;
use crate::core::expense::Expense;
use crate::store::Store;
use anyhow::{Context, Result};
use chrono::{Datelike, Days, Months, NaiveDate, Utc};
use rust_decimal::Decimal;
use std::collections::BTreeMap;

/// One ranked category line within a group, with the records behind it.
#[derive(Debug, Clone)]
pub struct CategoryTotal {
    pub name: String,
    pub total: Decimal,
    pub expenses: Vec<Expense>,
}

#[derive(Debug, Clone)]
pub struct GroupSummary {
    pub group: String,
    pub total: Decimal,
    pub categories: Vec<CategoryTotal>,
}

/// The rollup for one person over a date range. Groups keep their discovery
/// order; categories within a group are ordered by descending total.
#[derive(Debug, Clone)]
pub struct ExpenseSummary {
    pub group_totals: BTreeMap<String, Decimal>,
    pub groups: Vec<GroupSummary>,
    pub grand_total: Decimal,
}

struct CategoryAcc {
    key: String,
    display: String,
    total: Decimal,
    expenses: Vec<Expense>,
}

struct GroupAcc {
    name: String,
    categories: Vec<CategoryAcc>,
}

/// Summarizes a person's stored expenses over the inclusive date range.
/// An empty range yields zero totals and empty groupings.
pub fn summarize(
    store: &Store,
    person: &Person,
    start: NaiveDate,
    end: NaiveDate,
) -> Result<ExpenseSummary> {
    let expenses = store.expenses_between(person.user_id, start, end)?;

    let mut groups: Vec<GroupAcc> = Vec::new();
    for expense in expenses {
        let group_ix = match groups.iter().position(|g| g.name == expense.group) {
            Some(ix) => ix,
            None => {
                groups.push(GroupAcc {
                    name: expense.group.clone(),
                    categories: Vec::new(),
                });
                groups.len() - 1
            }
        };
        let group = &mut groups[group_ix];

        let key = expense.category();
        let category_ix = match group.categories.iter().position(|c| c.key == key) {
            Some(ix) => ix,
            None => {
                group.categories.push(CategoryAcc {
                    key,
                    display: expense.category_display(),
                    total: Decimal::ZERO,
                    expenses: Vec::new(),
                });
                group.categories.len() - 1
            }
        };
        let category = &mut group.categories[category_ix];
        category.total += expense.cost;
        category.expenses.push(expense);
    }

    let mut summary = ExpenseSummary {
        group_totals: BTreeMap::new(),
        groups: Vec::new(),
        grand_total: Decimal::ZERO,
    };
    let mut grand_total = Decimal::ZERO;
    for mut group in groups {
        // Stable sort: equal totals keep their discovery order.
        group.categories.sort_by(|a, b| b.total.cmp(&a.total));
        let group_total: Decimal = group.categories.iter().map(|c| c.total).sum();
        grand_total += group_total;

        summary
            .group_totals
            .insert(group.name.clone(), round_money(group_total));
        summary.groups.push(GroupSummary {
            group: group.name,
            total: round_money(group_total),
            categories: group
                .categories
                .into_iter()
                .map(|c| CategoryTotal {
                    name: c.display,
                    total: round_money(c.total),
                    expenses: c.expenses,
                })
                .collect(),
        });
    }
    summary.grand_total = round_money(grand_total);
    Ok(summary)
}

/// Summarizes the current calendar month.
pub fn summarize_current_month(store: &Store, person: &Person) -> Result<ExpenseSummary> {
    let (start, end) = current_month_range()?;
    summarize(store, person, start, end)
}

/// First and last day of the given month; the last day follows the
/// calendar's month-length rule, leap years included.
pub fn month_range(year: i32, month: u32) -> Result<(NaiveDate, NaiveDate)> {
    let first = NaiveDate::from_ymd_opt(year, month, 1)
        .with_context(|| format!("Invalid month: {year}-{month:02}"))?;
    let last = first
        .checked_add_months(Months::new(1))
        .and_then(|d| d.checked_sub_days(Days::new(1)))
        .with_context(|| format!("Could not compute the last day of {year}-{month:02}"))?;
    Ok((first, last))
}

pub fn current_month_range() -> Result<(NaiveDate, NaiveDate)> {
    let today = Utc::now().date_naive();
    month_range(today.year(), today.month())
}
