use std::collections::HashMap;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::models::Symbol;

/// Price of one feed id as last fetched by the price service.
///
/// Keyed by the feed's own id; never leaves the adapter/store boundary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedQuote {
    pub price_usd: Decimal,
    pub price_local: Decimal,
    pub fetched_at: DateTime<Utc>,
}

/// Feed id -> quote, as returned by [`super::PriceService::refresh`].
pub type FeedQuotes = HashMap<String, FeedQuote>;

/// A token's price in both reporting currencies.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceQuote {
    pub symbol: Symbol,
    pub price_in_usdt: Decimal,
    pub price_in_local_currency: Decimal,
    pub fetched_at: DateTime<Utc>,
}

impl PriceQuote {
    pub fn from_feed(symbol: Symbol, feed: &FeedQuote) -> Self {
        Self {
            symbol,
            price_in_usdt: feed.price_usd,
            price_in_local_currency: feed.price_local,
            fetched_at: feed.fetched_at,
        }
    }
}

/// Symbol -> quote, the store's price cache.
pub type PriceMap = HashMap<Symbol, PriceQuote>;
