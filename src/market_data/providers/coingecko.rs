//! CoinGecko spot price source.
//!
//! Uses the free `/simple/price` endpoint, which takes a comma-joined list of
//! coin ids and returns `{ "<id>": { "usd": <number> } }`. No API key.

use std::collections::HashMap;
use std::str::FromStr;

use anyhow::{anyhow, Context, Result};
use rust_decimal::Decimal;
use tracing::debug;

use crate::market_data::PriceSource;

pub const COINGECKO_API_BASE: &str = "https://api.coingecko.com/api/v3";

/// `/simple/price` body: coin id -> currency -> price.
type SimplePriceResponse = HashMap<String, HashMap<String, Option<f64>>>;

pub struct CoinGeckoPriceSource {
    client: reqwest::Client,
    base_url: String,
    /// Quote currency requested from the API (always lower-case).
    vs_currency: String,
}

impl CoinGeckoPriceSource {
    pub fn new() -> Self {
        Self::with_client(reqwest::Client::new())
    }

    pub fn with_client(client: reqwest::Client) -> Self {
        Self {
            client,
            base_url: COINGECKO_API_BASE.to_string(),
            vs_currency: "usd".to_string(),
        }
    }

    /// Points the source at another host (mock servers, proxies).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_vs_currency(mut self, currency: impl Into<String>) -> Self {
        self.vs_currency = currency.into().to_lowercase();
        self
    }

    fn parse_prices(&self, body: SimplePriceResponse) -> HashMap<String, Decimal> {
        let mut prices = HashMap::with_capacity(body.len());
        for (id, by_currency) in body {
            let Some(Some(raw)) = by_currency.get(&self.vs_currency) else {
                debug!(id = %id, currency = %self.vs_currency, "no price in response");
                continue;
            };
            match Decimal::from_str(&raw.to_string()) {
                Ok(price) => {
                    prices.insert(id, price);
                }
                Err(err) => {
                    debug!(id = %id, raw = %raw, error = %err, "unrepresentable price");
                }
            }
        }
        prices
    }
}

impl Default for CoinGeckoPriceSource {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl PriceSource for CoinGeckoPriceSource {
    async fn fetch_usd_prices(&self, ids: &[String]) -> Result<HashMap<String, Decimal>> {
        if ids.is_empty() {
            return Ok(HashMap::new());
        }

        let url = format!("{}/simple/price", self.base_url);
        let ids_param = ids.join(",");

        let response = self
            .client
            .get(&url)
            .query(&[
                ("ids", ids_param.as_str()),
                ("vs_currencies", self.vs_currency.as_str()),
            ])
            .header("Accept", "application/json")
            .send()
            .await
            .context("CoinGecko request failed")?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(anyhow!("CoinGecko simple/price API error: {status} - {body}"));
        }

        let body: SimplePriceResponse = response
            .json()
            .await
            .context("Malformed CoinGecko simple/price body")?;

        Ok(self.parse_prices(body))
    }

    fn name(&self) -> &str {
        "coingecko"
    }
}
