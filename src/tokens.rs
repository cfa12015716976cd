//! Whitelisted tokens, loaded once at startup.

use std::collections::HashSet;
use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{info, warn};

use crate::backend::Backend;
use crate::models::{Symbol, TokenDescriptor};

#[async_trait::async_trait]
pub trait TokenRegistry: Send + Sync {
    /// Ordered token list. Reload to pick up new tokens.
    async fn load(&self) -> Result<Vec<TokenDescriptor>>;
}

/// Reads the `token_whitelist` rows.
pub struct BackendTokenRegistry {
    backend: Arc<dyn Backend>,
}

impl BackendTokenRegistry {
    pub fn new(backend: Arc<dyn Backend>) -> Self {
        Self { backend }
    }
}

#[async_trait::async_trait]
impl TokenRegistry for BackendTokenRegistry {
    async fn load(&self) -> Result<Vec<TokenDescriptor>> {
        let tokens = self
            .backend
            .list_tokens()
            .await
            .context("Failed to load token whitelist")?;
        let tokens = dedupe_by_symbol(tokens);
        info!(count = tokens.len(), "token whitelist loaded");
        Ok(tokens)
    }
}

/// Tokens fixed at construction, typically from `[[tokens]]` in the config file.
#[derive(Debug, Clone, Default)]
pub struct StaticTokenRegistry {
    tokens: Vec<TokenDescriptor>,
}

impl StaticTokenRegistry {
    pub fn new(tokens: Vec<TokenDescriptor>) -> Self {
        Self {
            tokens: dedupe_by_symbol(tokens),
        }
    }
}

#[async_trait::async_trait]
impl TokenRegistry for StaticTokenRegistry {
    async fn load(&self) -> Result<Vec<TokenDescriptor>> {
        Ok(self.tokens.clone())
    }
}

/// Keep the first descriptor for each case-insensitive symbol.
fn dedupe_by_symbol(tokens: Vec<TokenDescriptor>) -> Vec<TokenDescriptor> {
    let mut seen = HashSet::new();
    tokens
        .into_iter()
        .filter(|token| {
            let key = token.key();
            if key.is_empty() {
                warn!("dropping token with empty symbol");
                return false;
            }
            if !seen.insert(key) {
                warn!(symbol = %token.symbol, "duplicate token symbol; keeping first");
                return false;
            }
            true
        })
        .collect()
}

/// Token-picker search: case-insensitive substring match over symbol and
/// display name, optionally hiding one symbol (the other side of a swap).
pub fn filter_tokens<'a>(
    tokens: &'a [TokenDescriptor],
    query: &str,
    exclude: Option<&Symbol>,
) -> Vec<&'a TokenDescriptor> {
    let query = query.trim().to_lowercase();
    tokens
        .iter()
        .filter(|token| exclude.map_or(true, |excluded| token.key() != *excluded))
        .filter(|token| {
            query.is_empty()
                || token.symbol.to_lowercase().contains(&query)
                || token.display_name.to_lowercase().contains(&query)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Vec<TokenDescriptor> {
        vec![
            TokenDescriptor::new("BTC", "Bitcoin", "bitcoin"),
            TokenDescriptor::new("ETH", "Ethereum", "ethereum"),
            TokenDescriptor::new("USDT", "Tether", "tether"),
        ]
    }

    #[test]
    fn search_matches_symbol_or_name() {
        let tokens = sample();
        let symbols = |found: Vec<&TokenDescriptor>| {
            found.iter().map(|t| t.symbol.clone()).collect::<Vec<_>>()
        };

        assert_eq!(symbols(filter_tokens(&tokens, "eth", None)), vec!["ETH", "USDT"]);
        assert_eq!(symbols(filter_tokens(&tokens, "BIT", None)), vec!["BTC"]);
        assert_eq!(filter_tokens(&tokens, "  ", None).len(), 3);
    }

    #[test]
    fn exclude_hides_one_symbol() {
        let tokens = sample();
        let excluded = Symbol::new("btc");
        let found = filter_tokens(&tokens, "", Some(&excluded));
        assert_eq!(found.len(), 2);
        assert!(found.iter().all(|t| t.symbol != "BTC"));
    }

    #[tokio::test]
    async fn static_registry_dedupes_case_insensitively() -> Result<()> {
        let registry = StaticTokenRegistry::new(vec![
            TokenDescriptor::new("BTC", "Bitcoin", "bitcoin"),
            TokenDescriptor::new("btc", "Wrapped", "wrapped-bitcoin"),
            TokenDescriptor::new("", "Nameless", "nothing"),
        ]);
        let tokens = registry.load().await?;
        assert_eq!(tokens.len(), 1);
        assert_eq!(tokens[0].external_price_id, "bitcoin");
        Ok(())
    }
}
