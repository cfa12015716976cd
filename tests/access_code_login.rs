mod support;

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use lethex::auth::access_code::{login, LoginError, LoginOutcome};
use lethex::auth::{AuthState, IdentityResolver};
use lethex::backend::{Backend, MemoryBackend};
use lethex::market_data::{NoopSource, PriceService};
use lethex::models::{AssetHolding, Holder, Role};
use lethex::routing::{decide, AccessContext, GateDecision};
use lethex::storage::MemorySessionStorage;
use lethex::store::AppStore;
use lethex::tokens::StaticTokenRegistry;
use rust_decimal::Decimal;

struct Harness {
    backend: Arc<MemoryBackend>,
    resolver: IdentityResolver,
    store: AppStore,
}

async fn harness() -> Harness {
    let backend = Arc::new(MemoryBackend::new());
    backend.set_admin_access_code("admin-654321").await;
    backend
        .add_holder(Holder::new("h1", "Aziz").with_access_code("H-1001"))
        .await;
    backend
        .add_asset(AssetHolding::new("h1", "BTC", Decimal::from(2)))
        .await;

    let shared: Arc<dyn Backend> = backend.clone();
    let resolver = IdentityResolver::new(shared.clone());
    resolver.start().await;
    let store = AppStore::new(
        Arc::new(StaticTokenRegistry::new(support::btc_eth_tokens())),
        Arc::new(PriceService::new(Arc::new(NoopSource))),
        shared,
        Arc::new(MemorySessionStorage::new()),
        "lethex_holder",
    );
    Harness {
        backend,
        resolver,
        store,
    }
}

async fn wait_for_role(resolver: &IdentityResolver, role: Role) -> AuthState {
    let mut rx = resolver.subscribe();
    let state = tokio::time::timeout(
        Duration::from_secs(2),
        rx.wait_for(|state| state.role() == Some(role)),
    )
    .await
    .expect("role never published")
    .expect("resolver dropped");
    state.clone()
}

#[tokio::test]
async fn empty_code_is_rejected_before_any_lookup() {
    let h = harness().await;
    h.backend.set_fail_rows(true);
    assert_eq!(
        login("   ", h.backend.as_ref(), &h.resolver, &h.store).await,
        Err(LoginError::EmptyAccessCode)
    );
}

#[tokio::test]
async fn unknown_code_is_invalid() {
    let h = harness().await;
    assert_eq!(
        login("nope", h.backend.as_ref(), &h.resolver, &h.store).await,
        Err(LoginError::InvalidAccessCode)
    );
    assert!(h.store.current_holder().is_none());
}

#[tokio::test]
async fn holder_code_opens_holder_session_and_syncs_assets() -> Result<()> {
    let h = harness().await;

    let outcome = login("H-1001", h.backend.as_ref(), &h.resolver, &h.store).await?;
    assert_eq!(outcome.home(), "/holder/dashboard");
    let LoginOutcome::Holder(holder) = outcome else {
        panic!("expected holder login");
    };
    assert_eq!(holder.name, "Aziz");
    assert_eq!(h.store.current_holder(), Some(holder));
    assert_eq!(h.store.assets().len(), 1);

    // No backend account is involved.
    assert_eq!(h.resolver.state().identity, None);
    Ok(())
}

#[tokio::test]
async fn holder_login_ends_open_admin_session() -> Result<()> {
    let h = harness().await;
    login("admin-654321", h.backend.as_ref(), &h.resolver, &h.store).await?;
    wait_for_role(&h.resolver, Role::Admin).await;

    let outcome = login("H-1001", h.backend.as_ref(), &h.resolver, &h.store).await?;
    assert!(matches!(outcome, LoginOutcome::Holder(_)));
    assert!(h.backend.get_session().await?.is_none());

    let mut rx = h.resolver.subscribe();
    tokio::time::timeout(
        Duration::from_secs(2),
        rx.wait_for(|state| state.identity.is_none() && !state.loading),
    )
    .await??;
    let ctx = AccessContext::new(h.resolver.state(), h.store.current_holder());
    assert_eq!(ctx.role(), Some(Role::Holder));
    assert_eq!(decide(&ctx, outcome.home()), GateDecision::Allow);
    Ok(())
}

#[tokio::test]
async fn first_admin_login_creates_and_promotes_account() -> Result<()> {
    let h = harness().await;

    let outcome = login("admin-654321", h.backend.as_ref(), &h.resolver, &h.store).await?;
    assert_eq!(outcome, LoginOutcome::Admin);
    assert_eq!(outcome.home(), "/admin/dashboard");

    let state = wait_for_role(&h.resolver, Role::Admin).await;
    let account_id = state.identity.unwrap().account_id;
    let profile = h.backend.get_profile(&account_id).await?.unwrap();
    assert_eq!(profile.effective_role(), Role::Admin);
    Ok(())
}

#[tokio::test]
async fn later_admin_logins_sign_in_to_the_same_account() -> Result<()> {
    let h = harness().await;

    login("admin-654321", h.backend.as_ref(), &h.resolver, &h.store).await?;
    let first = wait_for_role(&h.resolver, Role::Admin).await;
    h.resolver.sign_out().await?;

    login("admin-654321", h.backend.as_ref(), &h.resolver, &h.store).await?;
    let second = wait_for_role(&h.resolver, Role::Admin).await;
    assert_eq!(first.identity, second.identity);
    Ok(())
}

#[tokio::test]
async fn admin_auth_outage_is_reported() {
    let h = harness().await;
    h.backend.set_fail_auth(true);
    assert!(matches!(
        login("admin-654321", h.backend.as_ref(), &h.resolver, &h.store).await,
        Err(LoginError::AdminAuthFailed(_))
    ));
}

#[tokio::test]
async fn backend_outage_during_lookup_is_reported() {
    let h = harness().await;
    h.backend.set_fail_rows(true);
    assert!(matches!(
        login("H-1001", h.backend.as_ref(), &h.resolver, &h.store).await,
        Err(LoginError::Backend(_))
    ));
}
