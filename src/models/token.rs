use std::fmt;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Canonical, case-insensitive token symbol.
///
/// Stored lower-cased; `Display` and serialization use the canonical form, so
/// "BTC", "btc" and " Btc " are the same key everywhere in the store.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Symbol(String);

impl Symbol {
    pub fn new(raw: impl AsRef<str>) -> Self {
        Self(raw.as_ref().trim().to_lowercase())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<&str> for Symbol {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for Symbol {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}

impl Serialize for Symbol {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for Symbol {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Ok(Self::new(raw))
    }
}

/// A whitelisted tradable asset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenDescriptor {
    /// Ticker as displayed (e.g. "BTC"). Use [`TokenDescriptor::key`] for lookups.
    pub symbol: String,
    #[serde(rename = "name")]
    pub display_name: String,
    /// Identifier used by the price feed (CoinGecko coin id).
    #[serde(rename = "coingecko_id")]
    pub external_price_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub logo_url: Option<String>,
}

impl TokenDescriptor {
    pub fn new(
        symbol: impl Into<String>,
        display_name: impl Into<String>,
        external_price_id: impl Into<String>,
    ) -> Self {
        Self {
            symbol: symbol.into(),
            display_name: display_name.into(),
            external_price_id: external_price_id.into(),
            logo_url: None,
        }
    }

    pub fn with_logo_url(mut self, url: impl Into<String>) -> Self {
        self.logo_url = Some(url.into());
        self
    }

    pub fn key(&self) -> Symbol {
        Symbol::new(&self.symbol)
    }
}
