use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::decimal::deserialize_decimal_lenient;
use super::{Id, Symbol};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionStatus {
    Pending,
    Approved,
    Rejected,
    #[serde(other)]
    Other,
}

/// A holder's deposit, withdrawal or swap request as stored by the backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transaction {
    pub id: Id,
    pub holder_id: Id,
    /// Free-form kind reported by the backend ("deposit", "withdraw", "swap", ...).
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_symbol: Option<Symbol>,
    #[serde(default, deserialize_with = "deserialize_decimal_lenient")]
    pub amount: Option<Decimal>,
    #[serde(default, deserialize_with = "deserialize_decimal_lenient")]
    pub fee: Option<Decimal>,
    pub status: TransactionStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
}

impl Transaction {
    /// A pending transaction with no amounts or timestamp yet.
    pub fn new(id: impl Into<Id>, holder_id: impl Into<Id>, kind: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            holder_id: holder_id.into(),
            kind: kind.into(),
            token_symbol: None,
            amount: None,
            fee: None,
            status: TransactionStatus::Pending,
            created_at: None,
        }
    }
}

/// Fee column of an approved transaction.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CommissionFee {
    #[serde(default, deserialize_with = "deserialize_decimal_lenient")]
    pub fee: Option<Decimal>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_backend_row() {
        let row = r#"{
            "id": "t1",
            "holder_id": "h1",
            "type": "deposit",
            "token_symbol": "USDT",
            "amount": "100",
            "fee": null,
            "status": "pending",
            "created_at": "2026-01-02T03:04:05Z"
        }"#;
        let tx: Transaction = serde_json::from_str(row).unwrap();
        assert_eq!(tx.kind, "deposit");
        assert_eq!(tx.status, TransactionStatus::Pending);
        assert_eq!(tx.amount, Some(Decimal::from(100)));
        assert_eq!(tx.fee, None);
    }

    #[test]
    fn unknown_status_is_other() {
        let tx: Transaction =
            serde_json::from_str(r#"{"id":"t","holder_id":"h","status":"cancelled"}"#).unwrap();
        assert_eq!(tx.status, TransactionStatus::Other);
    }
}
