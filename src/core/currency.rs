//! Currency conversion abstractions

use anyhow::Result;
use async_trait::async_trait;
use chrono::NaiveDate;
use rust_decimal::{Decimal, RoundingStrategy};
use std::fmt;

#[async_trait]
pub trait RateProvider: Send + Sync {
    /// Returns the conversion rate from `from` to `to` on the given date.
    async fn rate_for(&self, on: NaiveDate, from: &str, to: &str) -> Result<Decimal>;
}

/// Raised by a rate provider when asked about a currency it does not know.
/// Kept as a concrete type so callers can tell it apart from transport
/// failures via downcasting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownCurrency(pub String);

impl fmt::Display for UnknownCurrency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Not a known currency: {}", self.0)
    }
}

impl std::error::Error for UnknownCurrency {}

/// Rounds a money amount to 2 decimal places, half-up.
pub fn round_money(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}
