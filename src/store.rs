//! Application state: tokens, prices, the signed-in holder, their holdings and
//! the derived portfolio totals.
//!
//! State is only changed through [`AppStore`] methods. Observers hold a
//! `watch::Receiver` and always see a complete snapshot.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::backend::Backend;
use crate::market_data::{
    compute_totals, InFlightGuard, PortfolioTotals, PriceMap, PriceQuote, PriceService,
};
use crate::models::{AssetHolding, Holder, TokenDescriptor};
use crate::storage::SessionStorage;
use crate::tokens::TokenRegistry;

/// Session storage key for the current holder record.
pub const DEFAULT_HOLDER_KEY: &str = "lethex_holder";

#[derive(Debug, Clone, Default, PartialEq)]
pub struct AppState {
    pub tokens: Vec<TokenDescriptor>,
    pub prices: PriceMap,
    pub current_holder: Option<Holder>,
    pub assets: Vec<AssetHolding>,
    pub totals: PortfolioTotals,
}

pub struct AppStore {
    state: watch::Sender<AppState>,
    registry: Arc<dyn TokenRegistry>,
    price_service: Arc<PriceService>,
    backend: Arc<dyn Backend>,
    session: Arc<dyn SessionStorage>,
    holder_key: String,
    prices_pending: AtomicBool,
}

impl AppStore {
    /// Build the store and restore any holder persisted in `session`.
    pub fn new(
        registry: Arc<dyn TokenRegistry>,
        price_service: Arc<PriceService>,
        backend: Arc<dyn Backend>,
        session: Arc<dyn SessionStorage>,
        holder_key: impl Into<String>,
    ) -> Self {
        let holder_key = holder_key.into();
        let current_holder = restore_holder(session.as_ref(), &holder_key);
        let (state, _) = watch::channel(AppState {
            current_holder,
            ..AppState::default()
        });
        Self {
            state,
            registry,
            price_service,
            backend,
            session,
            holder_key,
            prices_pending: AtomicBool::new(false),
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<AppState> {
        self.state.subscribe()
    }

    pub fn snapshot(&self) -> AppState {
        self.state.borrow().clone()
    }

    pub fn tokens(&self) -> Vec<TokenDescriptor> {
        self.state.borrow().tokens.clone()
    }

    pub fn prices(&self) -> PriceMap {
        self.state.borrow().prices.clone()
    }

    pub fn current_holder(&self) -> Option<Holder> {
        self.state.borrow().current_holder.clone()
    }

    pub fn assets(&self) -> Vec<AssetHolding> {
        self.state.borrow().assets.clone()
    }

    pub fn totals(&self) -> PortfolioTotals {
        self.state.borrow().totals
    }

    pub fn is_updating_prices(&self) -> bool {
        self.prices_pending.load(Ordering::Acquire)
    }

    /// Replace the token list from the registry. On failure the old list stays.
    pub async fn load_tokens(&self) -> Result<()> {
        let tokens = self.registry.load().await?;
        info!(count = tokens.len(), "tokens loaded into store");
        self.state.send_modify(|state| state.tokens = tokens);
        Ok(())
    }

    /// Refresh prices for every registered token and recompute totals.
    ///
    /// Does nothing while a previous update is pending or before tokens are
    /// loaded, so it can be called on a fixed interval indefinitely.
    pub async fn update_prices(&self) {
        let tokens = self.tokens();
        if tokens.is_empty() {
            debug!("no tokens loaded; skipping price update");
            return;
        }
        let Some(_pending) = InFlightGuard::acquire(&self.prices_pending) else {
            debug!("price update already pending");
            return;
        };

        let ids: Vec<String> = tokens
            .iter()
            .map(|token| token.external_price_id.clone())
            .collect();
        let feed = self.price_service.refresh(&ids).await;

        let prices: PriceMap = tokens
            .iter()
            .filter_map(|token| {
                let quote = feed.get(&token.external_price_id)?;
                let symbol = token.key();
                Some((symbol.clone(), PriceQuote::from_feed(symbol, quote)))
            })
            .collect();

        self.state.send_if_modified(|state| {
            if state.prices == prices {
                return false;
            }
            state.prices = prices;
            state.totals = compute_totals(&state.assets, &state.prices);
            true
        });
    }

    /// Replace the holdings wholesale and recompute totals.
    pub fn set_assets(&self, assets: Vec<AssetHolding>) {
        self.state.send_modify(|state| {
            state.assets = assets;
            state.totals = compute_totals(&state.assets, &state.prices);
        });
    }

    /// Recompute totals from the current holdings and prices.
    pub fn recompute_totals(&self) {
        self.state.send_if_modified(|state| {
            let totals = compute_totals(&state.assets, &state.prices);
            if totals == state.totals {
                return false;
            }
            state.totals = totals;
            true
        });
    }

    /// Set or clear the current holder.
    ///
    /// Setting persists the record to session storage. Clearing, or switching
    /// to another holder, drops the previous holdings; callers fetch the new
    /// ones with [`AppStore::sync_holder_assets`] or use
    /// [`AppStore::switch_holder`].
    pub fn set_current_holder(&self, holder: Option<Holder>) {
        match &holder {
            Some(holder) => self.persist_holder(holder),
            None => {
                if let Err(err) = self.session.remove(&self.holder_key) {
                    warn!(error = %err, "failed to remove persisted holder");
                }
            }
        }

        self.state.send_modify(|state| {
            let same_holder = matches!(
                (&state.current_holder, &holder),
                (Some(old), Some(new)) if old.id == new.id
            );
            if !same_holder {
                state.assets.clear();
            }
            state.current_holder = holder;
            state.totals = compute_totals(&state.assets, &state.prices);
        });
    }

    pub fn clear_current_holder(&self) {
        self.set_current_holder(None);
    }

    /// Make `holder` current and fetch their holdings.
    ///
    /// The holder stays current even when the fetch fails.
    pub async fn switch_holder(&self, holder: Holder) -> Result<()> {
        self.set_current_holder(Some(holder));
        self.sync_holder_assets().await
    }

    /// Fetch the current holder's holdings and install them.
    ///
    /// The result is dropped if the holder changed while the request ran.
    pub async fn sync_holder_assets(&self) -> Result<()> {
        let Some(holder) = self.current_holder() else {
            warn!("no current holder; skipping asset sync");
            return Ok(());
        };

        let assets = self
            .backend
            .get_assets_by_holder(&holder.id)
            .await
            .with_context(|| format!("Failed to load assets for holder {}", holder.id))?;

        let installed = self.state.send_if_modified(|state| {
            if state.current_holder.as_ref().map(|h| &h.id) != Some(&holder.id) {
                return false;
            }
            state.assets = assets;
            state.totals = compute_totals(&state.assets, &state.prices);
            true
        });

        if installed {
            info!(holder_id = %holder.id, "holder assets synced");
        } else {
            debug!(holder_id = %holder.id, "holder changed during asset sync; result dropped");
        }
        Ok(())
    }

    fn persist_holder(&self, holder: &Holder) {
        let json = match serde_json::to_string(holder) {
            Ok(json) => json,
            Err(err) => {
                warn!(error = %err, "failed to serialize holder");
                return;
            }
        };
        if let Err(err) = self.session.set(&self.holder_key, &json) {
            warn!(error = %err, "failed to persist holder");
        }
    }
}

fn restore_holder(session: &dyn SessionStorage, key: &str) -> Option<Holder> {
    let raw = match session.get(key) {
        Ok(Some(raw)) => raw,
        Ok(None) => return None,
        Err(err) => {
            warn!(error = %err, "failed to read persisted holder");
            return None;
        }
    };

    match serde_json::from_str::<Holder>(&raw) {
        Ok(holder) => {
            info!(holder_id = %holder.id, "restored holder from session");
            Some(holder)
        }
        Err(err) => {
            warn!(error = %err, "discarding corrupt holder record");
            if let Err(err) = session.remove(key) {
                warn!(error = %err, "failed to remove corrupt holder record");
            }
            None
        }
    }
}
