//! Who is signed in, resolved from the backend session plus a profile row.

pub mod access_code;

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use secrecy::SecretString;
use thiserror::Error;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::backend::{AuthSession, Backend, SessionEvent};
use crate::models::{Id, Identity, Role};

/// Default domain appended to usernames to form backend login emails.
pub const DEFAULT_EMAIL_DOMAIN: &str = "miaoda.com";

/// Identity as seen by the route gate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthState {
    pub identity: Option<Identity>,
    /// True until the first resolution completes.
    pub loading: bool,
}

impl AuthState {
    pub fn resolving() -> Self {
        Self {
            identity: None,
            loading: true,
        }
    }

    pub fn settled(identity: Option<Identity>) -> Self {
        Self {
            identity,
            loading: false,
        }
    }

    pub fn role(&self) -> Option<Role> {
        self.identity.as_ref().map(|identity| identity.role)
    }
}

impl Default for AuthState {
    fn default() -> Self {
        Self::resolving()
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum AuthError {
    #[error("username must not be empty")]
    EmptyUsername,
    #[error("sign-in failed: {0}")]
    SignIn(String),
    #[error("sign-up failed: {0}")]
    SignUp(String),
    #[error("sign-out failed: {0}")]
    SignOut(String),
    #[error("profile update failed: {0}")]
    ProfileUpdate(String),
}

struct Shared {
    backend: Arc<dyn Backend>,
    state: watch::Sender<AuthState>,
    /// Bumped whenever a resolution starts; only the newest may publish.
    generation: AtomicU64,
}

impl Shared {
    fn begin(&self) -> u64 {
        self.generation.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Resolve `session` and publish the result unless a newer resolution started meanwhile.
    async fn settle(&self, session: Option<&AuthSession>) {
        let generation = self.begin();
        let identity = self.resolve(session).await;
        self.publish(generation, identity);
    }

    async fn resolve(&self, session: Option<&AuthSession>) -> Option<Identity> {
        let session = session?;
        let account_id = &session.user.id;
        let role = match self.backend.get_profile(account_id).await {
            Ok(Some(profile)) => profile.effective_role(),
            Ok(None) => {
                warn!(account_id = %account_id, "no profile row; using unprivileged role");
                Role::User
            }
            Err(err) => {
                warn!(
                    account_id = %account_id,
                    error = %err,
                    "profile lookup failed; using unprivileged role"
                );
                Role::User
            }
        };
        Some(Identity::new(account_id.clone(), role))
    }

    fn publish(&self, generation: u64, identity: Option<Identity>) {
        let next = AuthState::settled(identity);
        self.state.send_if_modified(|state| {
            if self.generation.load(Ordering::SeqCst) != generation {
                debug!(generation, "stale identity resolution dropped");
                return false;
            }
            if *state == next {
                return false;
            }
            debug!(identity = ?next.identity, "identity settled");
            *state = next;
            true
        });
    }

    async fn listen(self: Arc<Self>, mut events: broadcast::Receiver<SessionEvent>) {
        loop {
            let session = match events.recv().await {
                Ok(event) => {
                    debug!(kind = ?event.kind, "session event");
                    event.session
                }
                Err(RecvError::Lagged(n)) => {
                    warn!(lagged = n, "session event receiver lagged; re-reading session");
                    match self.backend.get_session().await {
                        Ok(session) => session,
                        Err(err) => {
                            warn!(error = %err, "session lookup failed; keeping identity");
                            continue;
                        }
                    }
                }
                Err(RecvError::Closed) => {
                    debug!("session event stream closed");
                    break;
                }
            };

            self.settle(session.as_ref()).await;
        }
    }
}

/// Resolves and tracks the signed-in identity.
///
/// State is published through a `watch` channel, so readers always see a
/// whole [`AuthState`].
pub struct IdentityResolver {
    shared: Arc<Shared>,
    email_domain: String,
    listener: Mutex<Option<JoinHandle<()>>>,
}

impl IdentityResolver {
    pub fn new(backend: Arc<dyn Backend>) -> Self {
        let (state, _) = watch::channel(AuthState::resolving());
        Self {
            shared: Arc::new(Shared {
                backend,
                state,
                generation: AtomicU64::new(0),
            }),
            email_domain: DEFAULT_EMAIL_DOMAIN.to_string(),
            listener: Mutex::new(None),
        }
    }

    pub fn with_email_domain(mut self, domain: impl Into<String>) -> Self {
        self.email_domain = domain.into();
        self
    }

    /// Resolve the current session, then follow session changes.
    ///
    /// Calling it again while already listening does nothing.
    pub async fn start(&self) {
        if self.lock_listener().is_some() {
            debug!("identity resolver already started");
            return;
        }

        // Subscribe first so no change between the lookup and the listener is lost.
        let events = self.shared.backend.subscribe_session_changes();

        let session = match self.shared.backend.get_session().await {
            Ok(session) => session,
            Err(err) => {
                warn!(error = %err, "session lookup failed; treating as signed out");
                None
            }
        };
        self.shared.settle(session.as_ref()).await;

        let handle = tokio::spawn(self.shared.clone().listen(events));
        *self.lock_listener() = Some(handle);
        info!("identity resolver started");
    }

    /// Stop following session changes. The last state stays readable.
    pub fn shutdown(&self) {
        if let Some(handle) = self.lock_listener().take() {
            handle.abort();
            debug!("identity resolver stopped");
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<AuthState> {
        self.shared.state.subscribe()
    }

    pub fn state(&self) -> AuthState {
        self.shared.state.borrow().clone()
    }

    /// Wait for the first resolution to complete.
    pub async fn settled(&self) -> AuthState {
        let mut rx = self.subscribe();
        let state = match rx.wait_for(|state| !state.loading).await {
            Ok(state) => state.clone(),
            Err(_) => self.state(),
        };
        state
    }

    pub fn email_for(&self, username: &str) -> String {
        format!("{}@{}", username.trim(), self.email_domain)
    }

    pub async fn sign_in(&self, username: &str, password: &str) -> Result<(), AuthError> {
        let email = self.login_email(username)?;
        let password = SecretString::from(password.to_string());
        self.shared
            .backend
            .sign_in(&email, &password)
            .await
            .map_err(|err| {
                warn!(email = %email, error = %err, "sign-in failed");
                AuthError::SignIn(err.to_string())
            })
    }

    pub async fn sign_up(&self, username: &str, password: &str) -> Result<(), AuthError> {
        let email = self.login_email(username)?;
        let password = SecretString::from(password.to_string());
        self.shared
            .backend
            .sign_up(&email, &password)
            .await
            .map_err(|err| {
                warn!(email = %email, error = %err, "sign-up failed");
                AuthError::SignUp(err.to_string())
            })
    }

    /// Sign out and clear the identity right away.
    pub async fn sign_out(&self) -> Result<(), AuthError> {
        let result = self.shared.backend.sign_out().await;
        let generation = self.shared.begin();
        self.shared.publish(generation, None);
        result.map_err(|err| {
            warn!(error = %err, "sign-out failed");
            AuthError::SignOut(err.to_string())
        })
    }

    /// Re-read the current session and its profile, then republish.
    pub async fn refresh_profile(&self) {
        match self.shared.backend.get_session().await {
            Ok(session) => self.shared.settle(session.as_ref()).await,
            Err(err) => warn!(error = %err, "session lookup failed; keeping identity"),
        }
    }

    pub async fn update_profile_role(&self, account_id: &Id, role: Role) -> Result<(), AuthError> {
        self.shared
            .backend
            .update_profile_role(account_id, role)
            .await
            .map_err(|err| {
                warn!(account_id = %account_id, error = %err, "role update failed");
                AuthError::ProfileUpdate(err.to_string())
            })?;
        info!(account_id = %account_id, role = %role, "profile role updated");
        self.refresh_profile().await;
        Ok(())
    }

    fn login_email(&self, username: &str) -> Result<String, AuthError> {
        if username.trim().is_empty() {
            return Err(AuthError::EmptyUsername);
        }
        Ok(self.email_for(username))
    }

    fn lock_listener(&self) -> std::sync::MutexGuard<'_, Option<JoinHandle<()>>> {
        self.listener.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Drop for IdentityResolver {
    fn drop(&mut self) {
        self.shutdown();
    }
}
