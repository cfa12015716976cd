mod support;

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use lethex::app::App;
use lethex::backend::{Backend, MemoryBackend};
use lethex::market_data::providers::CoinGeckoPriceSource;
use lethex::market_data::PortfolioTotals;
use lethex::models::{AssetHolding, Holder};
use lethex::routing::{GateDecision, Router, HOLDER_HOME, LOGIN};
use lethex::storage::{JsonFileSessionStorage, SessionStorage};
use lethex::store::AppState;
use rust_decimal::Decimal;
use serde_json::json;
use tempfile::TempDir;
use tokio::sync::watch;
use wiremock::MockServer;

use support::{config_for, mount_prices};

async fn seeded_backend() -> Arc<MemoryBackend> {
    let backend = Arc::new(MemoryBackend::new());
    backend
        .add_holder(Holder::new("h1", "Aziz").with_access_code("H-1001"))
        .await;
    backend
        .add_asset(AssetHolding::new("h1", "BTC", Decimal::from(2)))
        .await;
    backend
        .add_asset(AssetHolding::new("h1", "ZZZ", Decimal::from(1000)))
        .await;
    backend
}

async fn app(server: &MockServer, dir: &TempDir, backend: Arc<MemoryBackend>) -> Result<App> {
    let backend: Arc<dyn Backend> = backend;
    let source = Arc::new(CoinGeckoPriceSource::new().with_base_url(server.uri()));
    let session: Arc<dyn SessionStorage> = Arc::new(JsonFileSessionStorage::with_path(dir.path())?);
    Ok(App::with_parts(
        config_for(server, dir.path()),
        backend,
        source,
        session,
    ))
}

async fn wait_for_state(
    rx: &mut watch::Receiver<AppState>,
    pred: impl FnMut(&AppState) -> bool,
) -> AppState {
    tokio::time::timeout(Duration::from_secs(5), rx.wait_for(pred))
        .await
        .expect("state never reached")
        .expect("store dropped")
        .clone()
}

#[tokio::test]
async fn holder_login_values_portfolio_and_logout_clears_it() -> Result<()> {
    let server = MockServer::start().await;
    mount_prices(
        &server,
        json!({ "bitcoin": { "usd": 50000 }, "ethereum": { "usd": 2500 } }),
    )
    .await;
    let dir = TempDir::new()?;

    let mut app = app(&server, &dir, seeded_backend().await).await?;
    app.start().await;
    app.resolver().settled().await;
    let mut rx = app.store().subscribe();

    let mut router = Router::new("/holder/portfolio");
    let decision = router.reevaluate(&app.access_context());
    assert_eq!(decision, GateDecision::Allow);
    assert_eq!(router.current_path(), LOGIN);
    assert_eq!(router.return_to(), Some("/holder/portfolio"));

    app.login("H-1001").await?;
    let state = wait_for_state(&mut rx, |s| !s.totals.is_zero()).await;
    // ZZZ has no price and adds nothing.
    assert_eq!(state.totals.total_value_usdt, Decimal::from(100000));
    assert_eq!(
        state.totals.total_value_local,
        Decimal::from(100000) / Decimal::new(115, 4)
    );

    router.navigate(&app.access_context(), LOGIN);
    assert_eq!(router.current_path(), HOLDER_HOME);

    app.logout().await;
    let state = wait_for_state(&mut rx, |s| s.current_holder.is_none()).await;
    assert_eq!(state.totals, PortfolioTotals::default());
    assert!(state.assets.is_empty());

    router.reevaluate(&app.access_context());
    assert_eq!(router.current_path(), LOGIN);

    app.shutdown().await;
    Ok(())
}

#[tokio::test]
async fn holder_session_survives_restart() -> Result<()> {
    let server = MockServer::start().await;
    mount_prices(&server, json!({ "bitcoin": { "usd": 50000 } })).await;
    let dir = TempDir::new()?;
    let backend = seeded_backend().await;

    {
        let mut first = app(&server, &dir, backend.clone()).await?;
        first.start().await;
        first.login("H-1001").await?;
        first.shutdown().await;
    }
    assert!(dir.path().join("lethex_holder.json").exists());

    let mut second = app(&server, &dir, backend).await?;
    assert_eq!(
        second.store().current_holder().map(|h| h.name),
        Some("Aziz".to_string())
    );
    second.start().await;
    let mut rx = second.store().subscribe();
    let state = wait_for_state(&mut rx, |s| !s.totals.is_zero()).await;
    assert_eq!(state.totals.total_value_usdt, Decimal::from(100000));

    second.logout().await;
    second.shutdown().await;
    assert!(!dir.path().join("lethex_holder.json").exists());
    Ok(())
}

#[tokio::test]
async fn corrupt_session_record_is_discarded() -> Result<()> {
    let server = MockServer::start().await;
    mount_prices(&server, json!({})).await;
    let dir = TempDir::new()?;
    std::fs::write(dir.path().join("lethex_holder.json"), "{not json")?;

    let app = app(&server, &dir, seeded_backend().await).await?;
    assert!(app.store().current_holder().is_none());
    assert!(!dir.path().join("lethex_holder.json").exists());
    Ok(())
}

#[tokio::test]
async fn price_outage_keeps_app_running() -> Result<()> {
    let server = MockServer::start().await;
    let dir = TempDir::new()?;

    let mut app = app(&server, &dir, seeded_backend().await).await?;
    app.start().await;
    app.login("H-1001").await?;
    tokio::time::sleep(Duration::from_millis(200)).await;

    assert!(app.store().prices().is_empty());
    assert!(app.store().totals().is_zero());
    assert_eq!(app.store().assets().len(), 2);
    app.shutdown().await;
    Ok(())
}

#[tokio::test]
async fn prices_load_while_identity_is_still_resolving() -> Result<()> {
    let server = MockServer::start().await;
    mount_prices(&server, json!({ "bitcoin": { "usd": 50000 } })).await;
    let dir = TempDir::new()?;
    let backend = seeded_backend().await;
    let release = backend.hold_session_lookups().await;

    let mut app = app(&server, &dir, backend).await?;
    tokio::time::timeout(Duration::from_secs(2), app.start()).await?;
    let mut rx = app.store().subscribe();
    let state = wait_for_state(&mut rx, |s| !s.prices.is_empty()).await;
    assert_eq!(state.tokens.len(), 2);
    assert!(app.resolver().state().loading);

    release.notify_one();
    let auth = tokio::time::timeout(Duration::from_secs(2), app.resolver().settled()).await?;
    assert_eq!(auth.identity, None);
    app.shutdown().await;
    Ok(())
}
