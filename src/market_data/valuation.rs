use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::PriceMap;
use crate::models::AssetHolding;

/// Portfolio value in both reporting currencies.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortfolioTotals {
    pub total_value_usdt: Decimal,
    pub total_value_local: Decimal,
}

impl PortfolioTotals {
    pub fn is_zero(&self) -> bool {
        self.total_value_usdt.is_zero() && self.total_value_local.is_zero()
    }
}

/// Sum `quantity x price` over every holding that has a quote.
///
/// Holdings without a quote or without a parseable quantity contribute
/// nothing. Lines that would overflow are dropped and logged.
pub fn compute_totals(assets: &[AssetHolding], prices: &PriceMap) -> PortfolioTotals {
    let mut totals = PortfolioTotals::default();
    if assets.is_empty() || prices.is_empty() {
        return totals;
    }

    for holding in assets {
        let Some(quote) = prices.get(&holding.token_symbol) else {
            debug!(symbol = %holding.token_symbol, "no quote for holding; skipping");
            continue;
        };
        let Some(quantity) = holding.quantity else {
            debug!(symbol = %holding.token_symbol, "holding has no numeric quantity; skipping");
            continue;
        };

        let line = quantity
            .checked_mul(quote.price_in_usdt)
            .zip(quantity.checked_mul(quote.price_in_local_currency));
        let Some((usdt, local)) = line else {
            debug!(symbol = %holding.token_symbol, "holding value overflows; skipping");
            continue;
        };

        match (
            totals.total_value_usdt.checked_add(usdt),
            totals.total_value_local.checked_add(local),
        ) {
            (Some(usdt), Some(local)) => {
                totals.total_value_usdt = usdt;
                totals.total_value_local = local;
            }
            _ => debug!(symbol = %holding.token_symbol, "running total overflows; skipping"),
        }
    }

    totals
}
