//! Supabase-compatible REST backend.
//!
//! Auth goes through GoTrue (`/auth/v1/...`), rows through PostgREST
//! (`/rest/v1/<table>?col=eq.value`). Every request carries the project's anon
//! key as `apikey`, and the bearer token of the current session (or the anon
//! key when signed out).

use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use reqwest::{Client, RequestBuilder, Response};
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::json;
use tokio::sync::{broadcast, RwLock};
use tracing::{debug, info, warn};

use super::{AuthSession, AuthUser, Backend, SessionEvent, SESSION_EVENT_CAPACITY};
use crate::clock::{Clock, SystemClock};
use crate::models::{
    AssetHolding, CommissionFee, Holder, Id, Profile, Role, TokenDescriptor, Transaction,
};

/// GoTrue token response (password and refresh grants, auto-confirmed sign-up).
#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    expires_in: Option<i64>,
    #[serde(default)]
    expires_at: Option<i64>,
    user: AuthUser,
}

impl TokenResponse {
    fn into_session(self, now: DateTime<Utc>) -> AuthSession {
        let expires_at = self
            .expires_at
            .and_then(|secs| DateTime::from_timestamp(secs, 0))
            .or_else(|| {
                self.expires_in
                    .map(|secs| now + ChronoDuration::seconds(secs))
            });
        AuthSession {
            access_token: SecretString::from(self.access_token),
            refresh_token: self.refresh_token.map(SecretString::from),
            user: self.user,
            expires_at,
        }
    }
}

pub struct RestBackend {
    client: Client,
    base_url: String,
    anon_key: SecretString,
    clock: Arc<dyn Clock>,
    session: RwLock<Option<AuthSession>>,
    events: broadcast::Sender<SessionEvent>,
}

impl RestBackend {
    pub fn new(base_url: impl Into<String>, anon_key: SecretString) -> Self {
        Self::with_client(Client::new(), base_url, anon_key)
    }

    pub fn with_client(client: Client, base_url: impl Into<String>, anon_key: SecretString) -> Self {
        let (events, _) = broadcast::channel(SESSION_EVENT_CAPACITY);
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            anon_key,
            clock: Arc::new(SystemClock),
            session: RwLock::new(None),
            events,
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    fn auth_url(&self, path: &str) -> String {
        format!("{}/auth/v1/{}", self.base_url, path)
    }

    fn rest_url(&self, table: &str) -> String {
        format!("{}/rest/v1/{}", self.base_url, table)
    }

    /// Attach `apikey` and bearer headers.
    ///
    /// An expired session is refreshed first; if that fails the request goes
    /// out with the anon key.
    async fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        let bearer = match self.get_session().await {
            Ok(Some(session)) => session.access_token.expose_secret().to_string(),
            Ok(None) => self.anon_key.expose_secret().to_string(),
            Err(err) => {
                warn!(error = %err, "session lookup failed; using anon key");
                self.anon_key.expose_secret().to_string()
            }
        };
        request
            .header("apikey", self.anon_key.expose_secret())
            .bearer_auth(bearer)
            .header("Accept", "application/json")
    }

    async fn check(response: Response, what: &str) -> Result<Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(anyhow!("{what} failed: {status} - {body}"))
    }

    async fn select<T: DeserializeOwned>(
        &self,
        table: &str,
        filters: &[(&str, String)],
    ) -> Result<Vec<T>> {
        let mut query: Vec<(&str, String)> = vec![("select", "*".to_string())];
        query.extend(filters.iter().cloned());

        let request = self.client.get(self.rest_url(table)).query(&query);
        let response = self
            .authorize(request)
            .await
            .send()
            .await
            .with_context(|| format!("Request to {table} failed"))?;
        let response = Self::check(response, &format!("select from {table}")).await?;

        response
            .json()
            .await
            .with_context(|| format!("Malformed {table} rows"))
    }

    async fn rpc<T: DeserializeOwned>(&self, function: &str, args: serde_json::Value) -> Result<T> {
        let request = self
            .client
            .post(self.rest_url(&format!("rpc/{function}")))
            .json(&args);
        let response = self
            .authorize(request)
            .await
            .send()
            .await
            .with_context(|| format!("RPC {function} failed"))?;
        let response = Self::check(response, &format!("rpc {function}")).await?;

        response
            .json()
            .await
            .with_context(|| format!("Malformed {function} result"))
    }

    async fn token_grant(&self, grant_type: &str, body: serde_json::Value) -> Result<AuthSession> {
        let request = self
            .client
            .post(self.auth_url("token"))
            .query(&[("grant_type", grant_type)])
            .header("apikey", self.anon_key.expose_secret())
            .json(&body);
        let response = request
            .send()
            .await
            .with_context(|| format!("{grant_type} grant request failed"))?;
        let response = Self::check(response, &format!("{grant_type} grant")).await?;

        let token: TokenResponse = response
            .json()
            .await
            .context("Malformed token response")?;
        Ok(token.into_session(self.clock.now()))
    }

    async fn install_session(&self, session: AuthSession, event: fn(AuthSession) -> SessionEvent) {
        {
            let mut current = self.session.write().await;
            *current = Some(session.clone());
        }
        // No subscribers is fine.
        let _ = self.events.send(event(session));
    }

    /// Exchange the refresh token for a new session.
    ///
    /// Returns `Ok(None)` when there is no session or no refresh token.
    pub async fn refresh_session(&self) -> Result<Option<AuthSession>> {
        let refresh_token = {
            let current = self.session.read().await;
            match current.as_ref().and_then(|s| s.refresh_token.as_ref()) {
                Some(token) => token.expose_secret().to_string(),
                None => return Ok(None),
            }
        };

        let session = self
            .token_grant("refresh_token", json!({ "refresh_token": refresh_token }))
            .await?;
        info!(account_id = %session.user.id, "session token refreshed");
        self.install_session(session.clone(), SessionEvent::token_refreshed)
            .await;
        Ok(Some(session))
    }

    async fn clear_session(&self) -> bool {
        let mut current = self.session.write().await;
        current.take().is_some()
    }
}

#[async_trait::async_trait]
impl Backend for RestBackend {
    async fn get_session(&self) -> Result<Option<AuthSession>> {
        {
            let current = self.session.read().await;
            match current.as_ref() {
                None => return Ok(None),
                Some(session) if !session.is_expired(self.clock.now()) => {
                    return Ok(Some(session.clone()));
                }
                Some(_) => {}
            }
        }

        match self.refresh_session().await {
            Ok(Some(session)) => return Ok(Some(session)),
            Ok(None) => debug!("expired session has no refresh token"),
            Err(err) => warn!(error = %err, "session refresh failed"),
        }
        if self.clear_session().await {
            let _ = self.events.send(SessionEvent::signed_out());
        }
        Ok(None)
    }

    fn subscribe_session_changes(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    async fn sign_in(&self, email: &str, password: &SecretString) -> Result<()> {
        let session = self
            .token_grant(
                "password",
                json!({ "email": email, "password": password.expose_secret() }),
            )
            .await?;
        info!(account_id = %session.user.id, "signed in");
        self.install_session(session, SessionEvent::signed_in).await;
        Ok(())
    }

    async fn sign_up(&self, email: &str, password: &SecretString) -> Result<()> {
        let request = self
            .client
            .post(self.auth_url("signup"))
            .header("apikey", self.anon_key.expose_secret())
            .json(&json!({ "email": email, "password": password.expose_secret() }));
        let response = request.send().await.context("Sign-up request failed")?;
        let response = Self::check(response, "sign-up").await?;

        let body: serde_json::Value = response
            .json()
            .await
            .context("Malformed sign-up response")?;

        // Projects with email confirmation return a bare user and no session.
        if body.get("access_token").is_some() {
            let token: TokenResponse =
                serde_json::from_value(body).context("Malformed sign-up session")?;
            let session = token.into_session(self.clock.now());
            info!(account_id = %session.user.id, "signed up");
            self.install_session(session, SessionEvent::signed_in).await;
        } else {
            info!(email = %email, "signed up; awaiting confirmation");
        }
        Ok(())
    }

    async fn sign_out(&self) -> Result<()> {
        let has_session = self.session.read().await.is_some();
        if has_session {
            let request = self.client.post(self.auth_url("logout"));
            let result = self.authorize(request).await.send().await;
            match result {
                Ok(response) => {
                    if let Err(err) = Self::check(response, "logout").await {
                        warn!(error = %err, "backend logout rejected; clearing local session");
                    }
                }
                Err(err) => warn!(error = %err, "backend logout failed; clearing local session"),
            }
        }

        if self.clear_session().await {
            info!("signed out");
        }
        let _ = self.events.send(SessionEvent::signed_out());
        Ok(())
    }

    async fn get_profile(&self, account_id: &Id) -> Result<Option<Profile>> {
        let rows: Vec<Profile> = self
            .select("profiles", &[("id", format!("eq.{account_id}"))])
            .await?;
        Ok(rows.into_iter().next())
    }

    async fn update_profile_role(&self, account_id: &Id, role: Role) -> Result<()> {
        let request = self
            .client
            .patch(self.rest_url("profiles"))
            .query(&[("id", format!("eq.{account_id}"))])
            .header("Prefer", "return=minimal")
            .json(&json!({ "role": role }));
        let response = self
            .authorize(request)
            .await
            .send()
            .await
            .context("Profile update request failed")?;
        Self::check(response, "profile role update").await?;
        info!(account_id = %account_id, role = %role, "profile role updated");
        Ok(())
    }

    async fn list_tokens(&self) -> Result<Vec<TokenDescriptor>> {
        self.select("token_whitelist", &[("order", "symbol.asc".to_string())])
            .await
    }

    async fn get_assets_by_holder(&self, holder_id: &Id) -> Result<Vec<AssetHolding>> {
        self.select("assets", &[("holder_id", format!("eq.{holder_id}"))])
            .await
    }

    async fn get_holder_by_access_code(&self, code: &str) -> Result<Option<Holder>> {
        let rows: Vec<Holder> = self
            .select("holders", &[("access_code", format!("eq.{code}"))])
            .await?;
        Ok(rows.into_iter().next())
    }

    async fn verify_admin_access_code(&self, code: &str) -> Result<bool> {
        self.rpc("verify_admin_access_code", json!({ "input_code": code }))
            .await
    }

    async fn update_admin_access_code(&self, new_code: &str) -> Result<bool> {
        self.rpc("update_admin_access_code", json!({ "new_code": new_code }))
            .await
    }

    async fn list_holders(&self) -> Result<Vec<Holder>> {
        self.select("holders", &[("order", "created_at.desc".to_string())])
            .await
    }

    async fn get_transactions_by_holder(&self, holder_id: &Id) -> Result<Vec<Transaction>> {
        self.select(
            "transactions",
            &[
                ("holder_id", format!("eq.{holder_id}")),
                ("order", "created_at.desc".to_string()),
            ],
        )
        .await
    }

    async fn get_pending_transactions(&self) -> Result<Vec<Transaction>> {
        self.select(
            "transactions",
            &[
                ("status", "eq.pending".to_string()),
                ("order", "created_at.desc".to_string()),
            ],
        )
        .await
    }

    async fn get_commission_fees(&self) -> Result<Vec<CommissionFee>> {
        let request = self.client.get(self.rest_url("transactions")).query(&[
            ("select", "fee"),
            ("status", "eq.approved"),
            ("fee", "not.is.null"),
        ]);
        let response = self
            .authorize(request)
            .await
            .send()
            .await
            .context("Commission request failed")?;
        let response = Self::check(response, "select commissions").await?;
        response.json().await.context("Malformed commission rows")
    }
}
