//! In-memory backend for tests and offline runs.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::{anyhow, bail, Result};
use secrecy::{ExposeSecret, SecretString};
use tokio::sync::{broadcast, Mutex, Notify};

use super::{AuthSession, AuthUser, Backend, SessionEvent, SESSION_EVENT_CAPACITY};
use crate::models::{
    AssetHolding, CommissionFee, Holder, Id, Profile, Role, TokenDescriptor, Transaction,
    TransactionStatus,
};

struct Account {
    id: Id,
    password: SecretString,
}

pub struct MemoryBackend {
    accounts: Mutex<HashMap<String, Account>>,
    session: Mutex<Option<AuthSession>>,
    profiles: Mutex<HashMap<Id, Profile>>,
    tokens: Mutex<Vec<TokenDescriptor>>,
    holders: Mutex<Vec<Holder>>,
    assets: Mutex<Vec<AssetHolding>>,
    transactions: Mutex<Vec<Transaction>>,
    admin_access_code: Mutex<Option<String>>,
    events: broadcast::Sender<SessionEvent>,
    fail_profiles: AtomicBool,
    fail_rows: AtomicBool,
    fail_auth: AtomicBool,
    asset_gate: Mutex<Option<Arc<Notify>>>,
    session_gate: Mutex<Option<Arc<Notify>>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(SESSION_EVENT_CAPACITY);
        Self {
            accounts: Mutex::new(HashMap::new()),
            session: Mutex::new(None),
            profiles: Mutex::new(HashMap::new()),
            tokens: Mutex::new(Vec::new()),
            holders: Mutex::new(Vec::new()),
            assets: Mutex::new(Vec::new()),
            transactions: Mutex::new(Vec::new()),
            admin_access_code: Mutex::new(None),
            events,
            fail_profiles: AtomicBool::new(false),
            fail_rows: AtomicBool::new(false),
            fail_auth: AtomicBool::new(false),
            asset_gate: Mutex::new(None),
            session_gate: Mutex::new(None),
        }
    }

    /// Register an account and its profile row.
    pub async fn add_account(&self, email: &str, password: &str, role: Option<Role>) -> Id {
        let id = Id::new();
        self.accounts.lock().await.insert(
            email.to_string(),
            Account {
                id: id.clone(),
                password: SecretString::from(password.to_string()),
            },
        );
        let mut profile = Profile::new(id.clone(), Role::User);
        profile.role = role;
        profile.username = email.split('@').next().map(str::to_string);
        self.profiles.lock().await.insert(id.clone(), profile);
        id
    }

    /// Put the backend into a signed-in state without emitting an event.
    pub async fn set_session(&self, session: Option<AuthSession>) {
        *self.session.lock().await = session;
    }

    /// Emit a session event to every subscriber.
    pub fn emit(&self, event: SessionEvent) {
        let _ = self.events.send(event);
    }

    pub async fn set_tokens(&self, tokens: Vec<TokenDescriptor>) {
        *self.tokens.lock().await = tokens;
    }

    pub async fn add_holder(&self, holder: Holder) {
        self.holders.lock().await.push(holder);
    }

    pub async fn add_asset(&self, holding: AssetHolding) {
        self.assets.lock().await.push(holding);
    }

    pub async fn add_transaction(&self, transaction: Transaction) {
        self.transactions.lock().await.push(transaction);
    }

    pub async fn set_admin_access_code(&self, code: &str) {
        *self.admin_access_code.lock().await = Some(code.to_string());
    }

    pub async fn admin_access_code(&self) -> Option<String> {
        self.admin_access_code.lock().await.clone()
    }

    pub fn set_fail_profiles(&self, fail: bool) {
        self.fail_profiles.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_rows(&self, fail: bool) {
        self.fail_rows.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_auth(&self, fail: bool) {
        self.fail_auth.store(fail, Ordering::SeqCst);
    }

    /// Make asset queries wait until the returned `Notify` is signalled.
    pub async fn hold_asset_queries(&self) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        *self.asset_gate.lock().await = Some(gate.clone());
        gate
    }

    /// Make session lookups wait until the returned `Notify` is signalled.
    pub async fn hold_session_lookups(&self) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        *self.session_gate.lock().await = Some(gate.clone());
        gate
    }

    fn check_rows(&self) -> Result<()> {
        if self.fail_rows.load(Ordering::SeqCst) {
            bail!("backend unavailable");
        }
        Ok(())
    }

    fn check_auth(&self) -> Result<()> {
        if self.fail_auth.load(Ordering::SeqCst) {
            bail!("auth service unavailable");
        }
        Ok(())
    }

    async fn start_session(&self, id: Id, email: &str) -> AuthSession {
        let session = AuthSession::new(
            AuthUser {
                id,
                email: Some(email.to_string()),
            },
            Id::new().to_string(),
        );
        *self.session.lock().await = Some(session.clone());
        self.emit(SessionEvent::signed_in(session.clone()));
        session
    }
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl Backend for MemoryBackend {
    async fn get_session(&self) -> Result<Option<AuthSession>> {
        let gate = self.session_gate.lock().await.clone();
        if let Some(gate) = gate {
            gate.notified().await;
        }
        self.check_auth()?;
        Ok(self.session.lock().await.clone())
    }

    fn subscribe_session_changes(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    async fn sign_in(&self, email: &str, password: &SecretString) -> Result<()> {
        self.check_auth()?;
        let id = {
            let accounts = self.accounts.lock().await;
            let account = accounts
                .get(email)
                .ok_or_else(|| anyhow!("Invalid login credentials"))?;
            if account.password.expose_secret() != password.expose_secret() {
                bail!("Invalid login credentials");
            }
            account.id.clone()
        };
        self.start_session(id, email).await;
        Ok(())
    }

    async fn sign_up(&self, email: &str, password: &SecretString) -> Result<()> {
        self.check_auth()?;
        if self.accounts.lock().await.contains_key(email) {
            bail!("User already registered");
        }
        let id = self
            .add_account(email, password.expose_secret(), Some(Role::User))
            .await;
        self.start_session(id, email).await;
        Ok(())
    }

    async fn sign_out(&self) -> Result<()> {
        *self.session.lock().await = None;
        self.emit(SessionEvent::signed_out());
        Ok(())
    }

    async fn get_profile(&self, account_id: &Id) -> Result<Option<Profile>> {
        if self.fail_profiles.load(Ordering::SeqCst) {
            bail!("profile lookup failed");
        }
        Ok(self.profiles.lock().await.get(account_id).cloned())
    }

    async fn update_profile_role(&self, account_id: &Id, role: Role) -> Result<()> {
        self.check_rows()?;
        let mut profiles = self.profiles.lock().await;
        let profile = profiles
            .get_mut(account_id)
            .ok_or_else(|| anyhow!("Profile not found: {account_id}"))?;
        profile.role = Some(role);
        Ok(())
    }

    async fn list_tokens(&self) -> Result<Vec<TokenDescriptor>> {
        self.check_rows()?;
        Ok(self.tokens.lock().await.clone())
    }

    async fn get_assets_by_holder(&self, holder_id: &Id) -> Result<Vec<AssetHolding>> {
        let gate = self.asset_gate.lock().await.clone();
        if let Some(gate) = gate {
            gate.notified().await;
        }
        self.check_rows()?;
        Ok(self
            .assets
            .lock()
            .await
            .iter()
            .filter(|a| &a.holder_id == holder_id)
            .cloned()
            .collect())
    }

    async fn get_holder_by_access_code(&self, code: &str) -> Result<Option<Holder>> {
        self.check_rows()?;
        Ok(self
            .holders
            .lock()
            .await
            .iter()
            .find(|h| h.access_code.as_deref() == Some(code))
            .cloned())
    }

    async fn verify_admin_access_code(&self, code: &str) -> Result<bool> {
        self.check_rows()?;
        Ok(self.admin_access_code.lock().await.as_deref() == Some(code))
    }

    async fn update_admin_access_code(&self, new_code: &str) -> Result<bool> {
        self.check_rows()?;
        *self.admin_access_code.lock().await = Some(new_code.to_string());
        Ok(true)
    }

    async fn list_holders(&self) -> Result<Vec<Holder>> {
        self.check_rows()?;
        let mut holders = self.holders.lock().await.clone();
        holders.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(holders)
    }

    async fn get_transactions_by_holder(&self, holder_id: &Id) -> Result<Vec<Transaction>> {
        self.check_rows()?;
        let mut txns: Vec<Transaction> = self
            .transactions
            .lock()
            .await
            .iter()
            .filter(|t| &t.holder_id == holder_id)
            .cloned()
            .collect();
        txns.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(txns)
    }

    async fn get_pending_transactions(&self) -> Result<Vec<Transaction>> {
        self.check_rows()?;
        Ok(self
            .transactions
            .lock()
            .await
            .iter()
            .filter(|t| t.status == TransactionStatus::Pending)
            .cloned()
            .collect())
    }

    async fn get_commission_fees(&self) -> Result<Vec<CommissionFee>> {
        self.check_rows()?;
        Ok(self
            .transactions
            .lock()
            .await
            .iter()
            .filter(|t| t.status == TransactionStatus::Approved && t.fee.is_some())
            .map(|t| CommissionFee { fee: t.fee })
            .collect())
    }
}
