//! Navigation gate: a pure function from identity + path to a decision.

use serde::Serialize;

use super::routes::{
    is_admin_path, is_holder_path, is_public, normalize_path, ADMIN_HOME, HOLDER_HOME, LOGIN, ROOT,
};
use crate::auth::AuthState;
use crate::models::{Holder, Role};

/// Everything the gate looks at.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AccessContext {
    pub auth: AuthState,
    /// Holder session from the store, if any.
    pub holder: Option<Holder>,
}

impl AccessContext {
    pub fn new(auth: AuthState, holder: Option<Holder>) -> Self {
        Self { auth, holder }
    }

    /// Role used for routing.
    ///
    /// Holder logins do not create a backend session, so a holder session
    /// with no backend identity counts as the holder role.
    pub fn role(&self) -> Option<Role> {
        match (&self.auth.identity, &self.holder) {
            (Some(identity), _) => Some(identity.role),
            (None, Some(_)) => Some(Role::Holder),
            (None, None) => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Redirect {
    pub to: String,
    /// Originally requested path, so login can send the user back.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub from: Option<String>,
    /// Replace the current history entry instead of pushing.
    pub replace: bool,
}

impl Redirect {
    fn to(path: &str) -> Self {
        Self {
            to: path.to_string(),
            from: None,
            replace: true,
        }
    }

    fn to_login_from(path: &str) -> Self {
        Self {
            to: LOGIN.to_string(),
            from: Some(path.to_string()),
            replace: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "decision", rename_all = "snake_case")]
pub enum GateDecision {
    /// Identity still resolving: show a loading indicator, do not redirect.
    Loading,
    Allow,
    Redirect(Redirect),
}

impl GateDecision {
    fn redirect(path: &str) -> Self {
        GateDecision::Redirect(Redirect::to(path))
    }

    pub fn redirect_target(&self) -> Option<&str> {
        match self {
            GateDecision::Redirect(redirect) => Some(&redirect.to),
            _ => None,
        }
    }
}

/// Home page for a role, if it has one usable in this context.
fn home_for(role: Role, has_holder_session: bool) -> Option<&'static str> {
    match role {
        Role::Admin => Some(ADMIN_HOME),
        Role::Holder if has_holder_session => Some(HOLDER_HOME),
        Role::Holder | Role::User => None,
    }
}

/// Decide whether `path` may render for `ctx`.
pub fn decide(ctx: &AccessContext, path: &str) -> GateDecision {
    if ctx.auth.loading {
        return GateDecision::Loading;
    }

    let normalized = normalize_path(path);
    let path: &str = &normalized;

    let Some(role) = ctx.role() else {
        if is_public(path) {
            return GateDecision::Allow;
        }
        if path == ROOT {
            return GateDecision::redirect(LOGIN);
        }
        return GateDecision::Redirect(Redirect::to_login_from(path));
    };

    let home = home_for(role, ctx.holder.is_some());

    if path == LOGIN || path == ROOT {
        return match home {
            Some(home) => GateDecision::redirect(home),
            // No usable home: login is the only place to go.
            None if path == LOGIN => GateDecision::Allow,
            None => GateDecision::redirect(LOGIN),
        };
    }

    if is_public(path) {
        return GateDecision::Allow;
    }

    let Some(home) = home else {
        return GateDecision::redirect(LOGIN);
    };

    match role {
        Role::Admin if is_holder_path(path) => GateDecision::redirect(home),
        Role::Holder if is_admin_path(path) => GateDecision::redirect(home),
        _ if !is_admin_path(path) && !is_holder_path(path) => GateDecision::redirect(home),
        _ => GateDecision::Allow,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Identity;

    fn ctx(role: Option<Role>, holder: bool) -> AccessContext {
        AccessContext {
            auth: AuthState::settled(role.map(|r| Identity::new("acct-1", r))),
            holder: holder.then(|| Holder::new("h1", "Aziz")),
        }
    }

    fn redirect_to(decision: &GateDecision) -> Option<&str> {
        decision.redirect_target()
    }

    #[test]
    fn resolving_never_redirects() {
        let resolving = AccessContext::default();
        assert_eq!(decide(&resolving, "/login"), GateDecision::Loading);
        assert_eq!(decide(&resolving, "/admin/dashboard"), GateDecision::Loading);
    }

    #[test]
    fn unauthenticated_goes_to_login_with_origin() {
        let decision = decide(&ctx(None, false), "/admin/dashboard");
        assert_eq!(
            decision,
            GateDecision::Redirect(Redirect {
                to: "/login".into(),
                from: Some("/admin/dashboard".into()),
                replace: true,
            })
        );
        assert_eq!(decide(&ctx(None, false), "/login"), GateDecision::Allow);
        assert_eq!(decide(&ctx(None, false), "/404"), GateDecision::Allow);
        assert_eq!(
            decide(&ctx(None, false), "/"),
            GateDecision::Redirect(Redirect::to("/login"))
        );
    }

    #[test]
    fn login_and_root_send_to_role_home() {
        let admin = ctx(Some(Role::Admin), false);
        assert_eq!(redirect_to(&decide(&admin, "/login")), Some(ADMIN_HOME));
        assert_eq!(redirect_to(&decide(&admin, "/")), Some(ADMIN_HOME));

        let holder = ctx(Some(Role::Holder), true);
        assert_eq!(redirect_to(&decide(&holder, "/login")), Some(HOLDER_HOME));
    }

    #[test]
    fn role_without_home_stays_on_login() {
        let user = ctx(Some(Role::User), false);
        assert_eq!(decide(&user, "/login"), GateDecision::Allow);
        assert_eq!(redirect_to(&decide(&user, "/")), Some(LOGIN));
        assert_eq!(redirect_to(&decide(&user, "/admin/dashboard")), Some(LOGIN));
        assert_eq!(decide(&user, "/403"), GateDecision::Allow);
    }

    #[test]
    fn cross_role_access_goes_home_not_login() {
        let admin = ctx(Some(Role::Admin), false);
        assert_eq!(redirect_to(&decide(&admin, "/holder/portfolio")), Some(ADMIN_HOME));

        let holder = ctx(Some(Role::Holder), true);
        assert_eq!(redirect_to(&decide(&holder, "/admin/settings")), Some(HOLDER_HOME));
    }

    #[test]
    fn holder_role_without_session_is_sent_to_login() {
        let holder = ctx(Some(Role::Holder), false);
        assert_eq!(redirect_to(&decide(&holder, "/holder/portfolio")), Some(LOGIN));
        assert_eq!(decide(&holder, "/login"), GateDecision::Allow);
    }

    #[test]
    fn holder_session_alone_counts_as_holder() {
        let holder = ctx(None, true);
        assert_eq!(decide(&holder, "/holder/portfolio"), GateDecision::Allow);
        assert_eq!(redirect_to(&decide(&holder, "/login")), Some(HOLDER_HOME));
        assert_eq!(redirect_to(&decide(&holder, "/admin/holders")), Some(HOLDER_HOME));
    }

    #[test]
    fn dot_segments_cannot_cross_areas() {
        let holder = ctx(None, true);
        assert_eq!(
            redirect_to(&decide(&holder, "/holder/../admin/settings")),
            Some(HOLDER_HOME)
        );
        assert_eq!(
            decide(&holder, "/holder/./portfolio"),
            GateDecision::Allow
        );

        let decision = decide(&ctx(None, false), "/holder/../admin/holders");
        assert_eq!(
            decision,
            GateDecision::Redirect(Redirect {
                to: "/login".into(),
                from: Some("/admin/holders".into()),
                replace: true,
            })
        );
    }

    #[test]
    fn unknown_area_goes_home() {
        let admin = ctx(Some(Role::Admin), false);
        assert_eq!(redirect_to(&decide(&admin, "/settings")), Some(ADMIN_HOME));
        assert_eq!(redirect_to(&decide(&admin, "/admin")), Some(ADMIN_HOME));
        assert_eq!(decide(&admin, "/admin/holders"), GateDecision::Allow);
    }

    #[test]
    fn every_redirect_replaces_history() {
        let contexts = [
            ctx(None, false),
            ctx(Some(Role::Admin), false),
            ctx(Some(Role::Holder), true),
            ctx(Some(Role::Holder), false),
            ctx(Some(Role::User), false),
        ];
        let paths = ["/", "/login", "/admin/dashboard", "/holder/history", "/elsewhere"];
        for ctx in &contexts {
            for path in paths {
                if let GateDecision::Redirect(redirect) = decide(ctx, path) {
                    assert!(redirect.replace, "{path} for {:?}", ctx.role());
                }
            }
        }
    }
}
