//! Wiring: builds the backend, price feed, store and identity resolver from
//! configuration and owns their lifetimes.

use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::auth::access_code::{self, LoginError, LoginOutcome};
use crate::auth::IdentityResolver;
use crate::backend::{Backend, MemoryBackend, RestBackend};
use crate::config::ResolvedConfig;
use crate::market_data::providers::CoinGeckoPriceSource;
use crate::market_data::{PriceService, PriceSource};
use crate::poller::{PollerHandle, PricePoller};
use crate::routing::AccessContext;
use crate::storage::{JsonFileSessionStorage, SessionStorage};
use crate::store::AppStore;
use crate::tokens::{BackendTokenRegistry, StaticTokenRegistry, TokenRegistry};

pub struct App {
    config: ResolvedConfig,
    backend: Arc<dyn Backend>,
    resolver: Arc<IdentityResolver>,
    store: Arc<AppStore>,
    poller: Option<PollerHandle>,
    identity_start: Option<JoinHandle<()>>,
}

impl App {
    /// Build every component from configuration.
    ///
    /// Without `backend.url` an empty in-memory backend is used, which is
    /// enough for price queries against `[[tokens]]`.
    pub fn from_config(config: ResolvedConfig) -> Result<Self> {
        let backend: Arc<dyn Backend> = match (&config.backend.url, config.backend.anon_key()) {
            (Some(url), Some(anon_key)) => Arc::new(RestBackend::new(url.clone(), anon_key)),
            (Some(_), None) => anyhow::bail!("backend.anon_key is required when backend.url is set"),
            (None, _) => {
                warn!("no backend configured; using in-memory backend");
                Arc::new(MemoryBackend::new())
            }
        };

        let source = Arc::new(
            CoinGeckoPriceSource::new().with_base_url(config.prices.api_base_url.clone()),
        );
        let session = Arc::new(
            JsonFileSessionStorage::with_path(&config.session_dir)
                .context("Failed to open session storage")?,
        );

        Ok(Self::with_parts(config, backend, source, session))
    }

    /// Build around caller-supplied backend, price source and session storage.
    pub fn with_parts(
        config: ResolvedConfig,
        backend: Arc<dyn Backend>,
        source: Arc<dyn PriceSource>,
        session: Arc<dyn SessionStorage>,
    ) -> Self {
        let registry: Arc<dyn TokenRegistry> = if config.tokens.is_empty() {
            Arc::new(BackendTokenRegistry::new(backend.clone()))
        } else {
            Arc::new(StaticTokenRegistry::new(config.tokens.clone()))
        };
        let prices = Arc::new(PriceService::from_config(source, &config.prices));
        let store = Arc::new(AppStore::new(
            registry,
            prices,
            backend.clone(),
            session,
            config.holder_key.clone(),
        ));
        let resolver = Arc::new(
            IdentityResolver::new(backend.clone())
                .with_email_domain(config.backend.email_domain.clone()),
        );

        Self {
            config,
            backend,
            resolver,
            store,
            poller: None,
            identity_start: None,
        }
    }

    /// Start identity resolution in the background, load tokens and start
    /// price polling.
    ///
    /// The price flow never waits on the identity flow; use
    /// [`IdentityResolver::settled`] to wait for the first identity. A token
    /// load failure is logged; polling starts anyway and does nothing until
    /// tokens are loaded.
    pub async fn start(&mut self) {
        if self.identity_start.is_none() {
            let resolver = self.resolver.clone();
            self.identity_start = Some(tokio::spawn(async move { resolver.start().await }));
        }
        if let Err(err) = self.store.load_tokens().await {
            warn!(error = %err, "token load failed; prices stay empty");
        }
        if self.store.current_holder().is_some() {
            if let Err(err) = self.store.sync_holder_assets().await {
                warn!(error = %err, "restored holder asset sync failed");
            }
        }
        if self.poller.is_none() {
            let poller = PricePoller::new(self.store.clone(), self.config.prices.poll_interval);
            self.poller = Some(poller.spawn());
        }
        info!("app started");
    }

    pub fn config(&self) -> &ResolvedConfig {
        &self.config
    }

    pub fn backend(&self) -> &Arc<dyn Backend> {
        &self.backend
    }

    pub fn resolver(&self) -> &IdentityResolver {
        &self.resolver
    }

    pub fn store(&self) -> &Arc<AppStore> {
        &self.store
    }

    /// Current inputs of the route gate.
    pub fn access_context(&self) -> AccessContext {
        AccessContext::new(self.resolver.state(), self.store.current_holder())
    }

    pub async fn login(&self, code: &str) -> Result<LoginOutcome, LoginError> {
        access_code::login(code, self.backend.as_ref(), &self.resolver, &self.store).await
    }

    /// End both the backend session and any holder session.
    pub async fn logout(&self) {
        self.store.clear_current_holder();
        if let Err(err) = self.resolver.sign_out().await {
            warn!(error = %err, "backend sign-out failed; local identity cleared");
        }
        info!("logged out");
    }

    /// Stop the poller and the identity listener.
    pub async fn shutdown(mut self) {
        if let Some(poller) = self.poller.take() {
            poller.shutdown().await;
        }
        if let Some(task) = self.identity_start.take() {
            if !task.is_finished() {
                debug!("identity still resolving at shutdown");
                task.abort();
            }
        }
        self.resolver.shutdown();
        info!("app stopped");
    }
}
