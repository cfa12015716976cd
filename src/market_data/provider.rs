use std::collections::HashMap;

use anyhow::Result;
use rust_decimal::Decimal;

/// Upstream spot-price feed.
#[async_trait::async_trait]
pub trait PriceSource: Send + Sync {
    /// Fetch USD spot prices for the given feed ids in a single request.
    ///
    /// Ids the feed does not know are simply absent from the result.
    async fn fetch_usd_prices(&self, ids: &[String]) -> Result<HashMap<String, Decimal>>;

    fn name(&self) -> &str;
}

pub struct NoopSource;

#[async_trait::async_trait]
impl PriceSource for NoopSource {
    async fn fetch_usd_prices(&self, _ids: &[String]) -> Result<HashMap<String, Decimal>> {
        Ok(HashMap::new())
    }

    fn name(&self) -> &str {
        "noop"
    }
}
