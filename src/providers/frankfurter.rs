use anyhow::{Result, anyhow, bail};
use async_trait::async_trait;
use chrono::NaiveDate;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::Deserialize;
use std::collections::HashMap;
use tracing::{debug, instrument};

use crate::core::currency::{RateProvider, UnknownCurrency};

// ECB reference currencies published by the API, plus the EUR base itself.
const KNOWN_CURRENCIES: [&str; 31] = [
    "EUR", "USD", "JPY", "BGN", "CZK", "DKK", "GBP", "HUF", "PLN", "RON", "SEK", "CHF", "ISK",
    "NOK", "TRY", "AUD", "BRL", "CAD", "CNY", "HKD", "IDR", "ILS", "INR", "KRW", "MXN", "MYR",
    "NZD", "PHP", "SGD", "THB", "ZAR",
];

/// Historical exchange rates from the Frankfurter API. Rates are published
/// against an EUR base, so any other pair is derived as a cross rate.
pub struct FrankfurterProvider {
    base_url: String,
    client: reqwest::Client,
}

impl FrankfurterProvider {
    pub fn new(base_url: &str) -> Result<Self> {
        let client = reqwest::Client::builder().user_agent("divvy/1.0").build()?;
        Ok(FrankfurterProvider {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
        })
    }

    fn validate_currency(currency: &str) -> Result<()> {
        if !KNOWN_CURRENCIES.contains(&currency) {
            return Err(UnknownCurrency(currency.to_string()).into());
        }
        Ok(())
    }

    /// EUR-based rate for a currency on the response; EUR itself is the base
    /// and never appears in the rates map.
    fn eur_rate(rates: &HashMap<String, Decimal>, currency: &str, on: NaiveDate) -> Result<Decimal> {
        if currency == "EUR" {
            return Ok(Decimal::ONE);
        }
        rates
            .get(currency)
            .copied()
            .ok_or_else(|| anyhow!("No rate published for {currency} on {on}"))
    }
}

#[derive(Debug, Deserialize)]
struct RatesResponse {
    rates: HashMap<String, Decimal>,
}

#[async_trait]
impl RateProvider for FrankfurterProvider {
    #[instrument(name = "FrankfurterRateFetch", skip(self))]
    async fn rate_for(&self, on: NaiveDate, from: &str, to: &str) -> Result<Decimal> {
        Self::validate_currency(from)?;
        Self::validate_currency(to)?;

        if from == to {
            return Ok(Decimal::ONE);
        }

        let url = format!("{}/{}", self.base_url, on);
        debug!("Requesting exchange rates from {url}");

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| anyhow!("Request error: {e} for rates on {on}"))?;

        if !response.status().is_success() {
            bail!("HTTP error: {} for rates on {}", response.status(), on);
        }

        let text = response.text().await?;
        let data: RatesResponse = serde_json::from_str(&text)
            .map_err(|e| anyhow!("Failed to parse rates response for {on}: {e}"))?;

        let to_rate = Self::eur_rate(&data.rates, to, on)?;
        let from_rate = Self::eur_rate(&data.rates, from, on)?;
        if from_rate.is_zero() {
            bail!("Zero rate published for {from} on {on}");
        }

        let rate = (to_rate / from_rate)
            .round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero);
        Ok(rate)
    }
}
