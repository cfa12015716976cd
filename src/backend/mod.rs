//! Backend-as-a-service boundary: auth sessions plus row access.

mod memory;
mod rest;

pub use memory::MemoryBackend;
pub use rest::RestBackend;

use anyhow::Result;
use chrono::{DateTime, Utc};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::models::{
    AssetHolding, CommissionFee, Holder, Id, Profile, Role, TokenDescriptor, Transaction,
};

/// Capacity of the session event channel. Slow subscribers see `Lagged`.
pub const SESSION_EVENT_CAPACITY: usize = 16;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthUser {
    pub id: Id,
    #[serde(default)]
    pub email: Option<String>,
}

/// A signed-in backend session.
#[derive(Debug)]
pub struct AuthSession {
    pub access_token: SecretString,
    pub refresh_token: Option<SecretString>,
    pub user: AuthUser,
    pub expires_at: Option<DateTime<Utc>>,
}

impl AuthSession {
    pub fn new(user: AuthUser, access_token: impl Into<String>) -> Self {
        Self {
            access_token: SecretString::from(access_token.into()),
            refresh_token: None,
            user,
            expires_at: None,
        }
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }
}

impl Clone for AuthSession {
    fn clone(&self) -> Self {
        Self {
            access_token: SecretString::from(self.access_token.expose_secret().to_string()),
            refresh_token: self
                .refresh_token
                .as_ref()
                .map(|t| SecretString::from(t.expose_secret().to_string())),
            user: self.user.clone(),
            expires_at: self.expires_at,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEventKind {
    SignedIn,
    SignedOut,
    TokenRefreshed,
}

/// Pushed to subscribers whenever the backend session changes.
#[derive(Debug, Clone)]
pub struct SessionEvent {
    pub kind: SessionEventKind,
    pub session: Option<AuthSession>,
}

impl SessionEvent {
    pub fn signed_in(session: AuthSession) -> Self {
        Self {
            kind: SessionEventKind::SignedIn,
            session: Some(session),
        }
    }

    pub fn signed_out() -> Self {
        Self {
            kind: SessionEventKind::SignedOut,
            session: None,
        }
    }

    pub fn token_refreshed(session: AuthSession) -> Self {
        Self {
            kind: SessionEventKind::TokenRefreshed,
            session: Some(session),
        }
    }
}

/// Everything the core needs from the backend.
///
/// Row reads return empty collections rather than errors when nothing matches.
#[async_trait::async_trait]
pub trait Backend: Send + Sync {
    // Auth
    async fn get_session(&self) -> Result<Option<AuthSession>>;
    fn subscribe_session_changes(&self) -> broadcast::Receiver<SessionEvent>;
    async fn sign_in(&self, email: &str, password: &SecretString) -> Result<()>;
    async fn sign_up(&self, email: &str, password: &SecretString) -> Result<()>;
    async fn sign_out(&self) -> Result<()>;

    // Profiles
    async fn get_profile(&self, account_id: &Id) -> Result<Option<Profile>>;
    async fn update_profile_role(&self, account_id: &Id, role: Role) -> Result<()>;

    // Tokens and holdings
    async fn list_tokens(&self) -> Result<Vec<TokenDescriptor>>;
    async fn get_assets_by_holder(&self, holder_id: &Id) -> Result<Vec<AssetHolding>>;

    // Holders and access codes
    async fn get_holder_by_access_code(&self, code: &str) -> Result<Option<Holder>>;
    async fn verify_admin_access_code(&self, code: &str) -> Result<bool>;
    async fn update_admin_access_code(&self, new_code: &str) -> Result<bool>;
    async fn list_holders(&self) -> Result<Vec<Holder>>;

    // Transactions
    async fn get_transactions_by_holder(&self, holder_id: &Id) -> Result<Vec<Transaction>>;
    async fn get_pending_transactions(&self) -> Result<Vec<Transaction>>;
    async fn get_commission_fees(&self) -> Result<Vec<CommissionFee>>;
}
