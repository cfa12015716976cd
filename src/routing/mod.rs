//! Route authorization: which page may render for the current identity.

mod gate;
mod history;
mod routes;

use tracing::{debug, warn};

pub use gate::{decide, AccessContext, GateDecision, Redirect};
pub use history::{History, HistoryEntry};
pub use routes::{
    find_route, is_admin_path, is_holder_path, is_public, normalize_path, Area, Route, ADMIN_HOME,
    ADMIN_PREFIX, FORBIDDEN, HOLDER_HOME, HOLDER_PREFIX, LOGIN, NOT_FOUND, PUBLIC_PATHS, ROOT,
    ROUTES,
};

/// Redirects followed in one navigation before giving up.
pub const MAX_REDIRECT_HOPS: usize = 8;

/// Applies gate decisions to a [`History`].
///
/// Redirects replace the current entry, so going back never lands on a page
/// the gate already refused.
#[derive(Debug, Clone)]
pub struct Router {
    history: History,
}

impl Router {
    pub fn new(initial: &str) -> Self {
        Self {
            history: History::new(normalize_path(initial)),
        }
    }

    pub fn current_path(&self) -> &str {
        &self.history.current().path
    }

    /// Where a login redirect was headed, if the current page is one.
    pub fn return_to(&self) -> Option<&str> {
        self.history.current().from.as_deref()
    }

    pub fn history(&self) -> &History {
        &self.history
    }

    /// Push `path` and settle it against the gate.
    pub fn navigate(&mut self, ctx: &AccessContext, path: &str) -> GateDecision {
        self.history.push(HistoryEntry::new(normalize_path(path)));
        self.settle(ctx)
    }

    /// Re-run the gate for the current page, e.g. after the identity changed.
    pub fn reevaluate(&mut self, ctx: &AccessContext) -> GateDecision {
        self.settle(ctx)
    }

    pub fn back(&mut self, ctx: &AccessContext) -> GateDecision {
        self.history.back();
        self.settle(ctx)
    }

    fn settle(&mut self, ctx: &AccessContext) -> GateDecision {
        let mut decision = decide(ctx, self.current_path());
        for _ in 0..MAX_REDIRECT_HOPS {
            let redirect = match decision {
                GateDecision::Redirect(redirect) => redirect,
                settled => return settled,
            };
            debug!(from = %self.current_path(), to = %redirect.to, "redirecting");
            let entry = HistoryEntry {
                path: redirect.to,
                from: redirect.from,
            };
            if redirect.replace {
                self.history.replace(entry);
            } else {
                self.history.push(entry);
            }
            decision = decide(ctx, self.current_path());
        }
        warn!(path = %self.current_path(), "redirect limit reached");
        decision
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::AuthState;
    use crate::models::{Holder, Identity, Role};

    fn admin() -> AccessContext {
        AccessContext::new(
            AuthState::settled(Some(Identity::new("acct-1", Role::Admin))),
            None,
        )
    }

    #[test]
    fn unauthenticated_navigation_lands_on_login_with_origin() {
        let ctx = AccessContext::new(AuthState::settled(None), None);
        let mut router = Router::new("/login");

        let decision = router.navigate(&ctx, "/admin/holders");
        assert_eq!(decision, GateDecision::Allow);
        assert_eq!(router.current_path(), "/login");
        assert_eq!(router.return_to(), Some("/admin/holders"));
        assert_eq!(router.history().len(), 2);
    }

    #[test]
    fn root_settles_on_role_home() {
        let mut router = Router::new("/");
        assert_eq!(router.reevaluate(&admin()), GateDecision::Allow);
        assert_eq!(router.current_path(), ADMIN_HOME);
        assert_eq!(router.history().len(), 1);
    }

    #[test]
    fn loading_keeps_requested_page() {
        let mut router = Router::new("/admin/settings");
        assert_eq!(
            router.reevaluate(&AccessContext::default()),
            GateDecision::Loading
        );
        assert_eq!(router.current_path(), "/admin/settings");

        assert_eq!(router.reevaluate(&admin()), GateDecision::Allow);
        assert_eq!(router.current_path(), "/admin/settings");
    }

    #[test]
    fn back_does_not_return_to_refused_page() {
        let holder = AccessContext::new(AuthState::settled(None), Some(Holder::new("h1", "Aziz")));
        let mut router = Router::new("/holder/dashboard");
        router.navigate(&holder, "/admin/approvals");
        assert_eq!(router.current_path(), HOLDER_HOME);

        router.back(&holder);
        assert_eq!(router.current_path(), HOLDER_HOME);
        assert!(router
            .history()
            .entries()
            .iter()
            .all(|entry| entry.path != "/admin/approvals"));
    }
}
