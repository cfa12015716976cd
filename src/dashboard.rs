//! Read-only summaries for the admin and holder dashboards.

use anyhow::{Context, Result};
use rust_decimal::Decimal;
use serde::Serialize;
use tracing::debug;

use crate::backend::Backend;
use crate::models::{CommissionFee, Id, Transaction};

/// Transactions shown on the holder dashboard.
pub const DEFAULT_RECENT_LIMIT: usize = 5;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AdminOverview {
    pub holders: usize,
    pub pending_approvals: usize,
    pub total_commissions: Decimal,
}

/// Fetch the admin dashboard counters concurrently.
pub async fn admin_overview(backend: &dyn Backend) -> Result<AdminOverview> {
    let (holders, pending, fees) = tokio::try_join!(
        async { backend.list_holders().await.context("Failed to load holders") },
        async {
            backend
                .get_pending_transactions()
                .await
                .context("Failed to load pending transactions")
        },
        async {
            backend
                .get_commission_fees()
                .await
                .context("Failed to load commission fees")
        },
    )?;

    let overview = AdminOverview {
        holders: holders.len(),
        pending_approvals: pending.len(),
        total_commissions: sum_fees(&fees),
    };
    debug!(?overview, "admin overview loaded");
    Ok(overview)
}

/// Sum of every parseable fee. Missing fees count as nothing.
pub fn sum_fees(fees: &[CommissionFee]) -> Decimal {
    fees.iter()
        .filter_map(|row| row.fee)
        .fold(Decimal::ZERO, |acc, fee| acc.checked_add(fee).unwrap_or(acc))
}

/// Newest transactions of one holder, at most `limit`.
pub async fn recent_transactions(
    backend: &dyn Backend,
    holder_id: &Id,
    limit: usize,
) -> Result<Vec<Transaction>> {
    let mut transactions = backend
        .get_transactions_by_holder(holder_id)
        .await
        .with_context(|| format!("Failed to load transactions for holder {holder_id}"))?;
    // Undated rows sort last.
    transactions.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    transactions.truncate(limit);
    Ok(transactions)
}
