use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::decimal::deserialize_decimal_lenient;
use super::{Id, Symbol};

/// A fund participant. While signed in, this record is the holder session and
/// is mirrored into session-scoped storage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Holder {
    pub id: Id,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access_code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
}

impl Holder {
    pub fn new(id: impl Into<Id>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            access_code: None,
            created_at: None,
        }
    }

    pub fn with_access_code(mut self, code: impl Into<String>) -> Self {
        self.access_code = Some(code.into());
        self
    }
}

/// Quantity of one token held by one holder.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssetHolding {
    pub holder_id: Id,
    pub token_symbol: Symbol,
    /// `None` when the backend value is missing or not numeric.
    #[serde(
        rename = "amount",
        default,
        deserialize_with = "deserialize_decimal_lenient"
    )]
    pub quantity: Option<Decimal>,
}

impl AssetHolding {
    pub fn new(holder_id: impl Into<Id>, token_symbol: impl Into<Symbol>, quantity: Decimal) -> Self {
        Self {
            holder_id: holder_id.into(),
            token_symbol: token_symbol.into(),
            quantity: Some(quantity),
        }
    }
}
