//! Access-code login and admin code rotation.
//!
//! One input field serves both roles: the admin code signs in the fixed
//! `admin` account, a holder code opens a holder session without a backend
//! account.

use thiserror::Error;
use tracing::{info, warn};

use super::{AuthError, IdentityResolver};
use crate::backend::Backend;
use crate::models::{Holder, Role};
use crate::routing::{ADMIN_HOME, HOLDER_HOME};
use crate::store::AppStore;

/// Backend username used for the admin account.
pub const ADMIN_USERNAME: &str = "admin";

pub const MIN_ACCESS_CODE_LEN: usize = 6;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoginOutcome {
    Admin,
    Holder(Holder),
}

impl LoginOutcome {
    /// Dashboard to navigate to after a successful login.
    pub fn home(&self) -> &'static str {
        match self {
            LoginOutcome::Admin => ADMIN_HOME,
            LoginOutcome::Holder(_) => HOLDER_HOME,
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum LoginError {
    #[error("Please enter an access code")]
    EmptyAccessCode,
    #[error("Invalid access code")]
    InvalidAccessCode,
    #[error("Admin authentication failed")]
    AdminAuthFailed(#[source] AuthError),
    #[error("An error occurred during login: {0}")]
    Backend(String),
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum AccessCodeError {
    #[error("Please enter a new access code")]
    Empty,
    #[error("Access code must be at least {MIN_ACCESS_CODE_LEN} characters")]
    TooShort,
    #[error("Access codes do not match")]
    Mismatch,
    #[error("Failed to update access code")]
    Rejected,
    #[error("An error occurred: {0}")]
    Backend(String),
}

/// Log in with an admin or holder access code.
pub async fn login(
    code: &str,
    backend: &dyn Backend,
    resolver: &IdentityResolver,
    store: &AppStore,
) -> Result<LoginOutcome, LoginError> {
    if code.trim().is_empty() {
        return Err(LoginError::EmptyAccessCode);
    }

    let is_admin = backend.verify_admin_access_code(code).await.map_err(|err| {
        warn!(error = %err, "admin code check failed");
        LoginError::Backend(err.to_string())
    })?;
    if is_admin {
        sign_in_admin(code, backend, resolver).await?;
        info!("admin logged in");
        return Ok(LoginOutcome::Admin);
    }

    let holder = backend
        .get_holder_by_access_code(code)
        .await
        .map_err(|err| {
            warn!(error = %err, "holder lookup failed");
            LoginError::Backend(err.to_string())
        })?;
    let Some(holder) = holder else {
        info!("login rejected: unknown access code");
        return Err(LoginError::InvalidAccessCode);
    };

    // A backend identity outranks the holder session in routing.
    let has_backend_session = matches!(backend.get_session().await, Ok(Some(_)));
    if has_backend_session || resolver.state().identity.is_some() {
        if let Err(err) = resolver.sign_out().await {
            warn!(error = %err, "backend sign-out before holder login failed");
        }
    }

    if let Err(err) = store.switch_holder(holder.clone()).await {
        warn!(holder_id = %holder.id, error = %err, "initial asset sync failed");
    }
    info!(holder_id = %holder.id, "holder logged in");
    Ok(LoginOutcome::Holder(holder))
}

/// Sign in the admin account, creating it on first use.
async fn sign_in_admin(
    code: &str,
    backend: &dyn Backend,
    resolver: &IdentityResolver,
) -> Result<(), LoginError> {
    if resolver.sign_in(ADMIN_USERNAME, code).await.is_ok() {
        return Ok(());
    }

    resolver
        .sign_up(ADMIN_USERNAME, code)
        .await
        .map_err(LoginError::AdminAuthFailed)?;

    let session = backend
        .get_session()
        .await
        .map_err(|err| LoginError::Backend(err.to_string()))?;
    let Some(session) = session else {
        // Sign-up awaiting confirmation; nothing to promote yet.
        return Ok(());
    };

    // A freshly created account starts unprivileged.
    let role = match backend.get_profile(&session.user.id).await {
        Ok(profile) => profile.map(|p| p.effective_role()),
        Err(err) => {
            warn!(error = %err, "profile lookup after admin sign-up failed");
            None
        }
    };
    if role != Some(Role::Admin) {
        resolver
            .update_profile_role(&session.user.id, Role::Admin)
            .await
            .map_err(LoginError::AdminAuthFailed)?;
    }
    Ok(())
}

/// Replace the admin access code after validating the form input.
pub async fn change_admin_access_code(
    new_code: &str,
    confirm: &str,
    backend: &dyn Backend,
) -> Result<(), AccessCodeError> {
    if new_code.trim().is_empty() {
        return Err(AccessCodeError::Empty);
    }
    if new_code.chars().count() < MIN_ACCESS_CODE_LEN {
        return Err(AccessCodeError::TooShort);
    }
    if new_code != confirm {
        return Err(AccessCodeError::Mismatch);
    }

    match backend.update_admin_access_code(new_code).await {
        Ok(true) => {
            info!("admin access code updated");
            Ok(())
        }
        Ok(false) => Err(AccessCodeError::Rejected),
        Err(err) => {
            warn!(error = %err, "admin access code update failed");
            Err(AccessCodeError::Backend(err.to_string()))
        }
    }
}
