//! Known pages and the path classes the gate reasons about.

use std::borrow::Cow;

use serde::Serialize;

pub const ROOT: &str = "/";
pub const LOGIN: &str = "/login";
pub const FORBIDDEN: &str = "/403";
pub const NOT_FOUND: &str = "/404";

/// Reachable without a signed-in identity.
pub const PUBLIC_PATHS: &[&str] = &[LOGIN, FORBIDDEN, NOT_FOUND];

pub const ADMIN_PREFIX: &str = "/admin/";
pub const HOLDER_PREFIX: &str = "/holder/";

pub const ADMIN_HOME: &str = "/admin/dashboard";
pub const HOLDER_HOME: &str = "/holder/dashboard";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Area {
    Public,
    Admin,
    Holder,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Route {
    pub name: &'static str,
    pub path: &'static str,
    pub area: Area,
}

const fn route(name: &'static str, path: &'static str, area: Area) -> Route {
    Route { name, path, area }
}

pub const ROUTES: &[Route] = &[
    route("Login", LOGIN, Area::Public),
    route("Forbidden", FORBIDDEN, Area::Public),
    route("Not Found", NOT_FOUND, Area::Public),
    route("Admin Dashboard", ADMIN_HOME, Area::Admin),
    route("Admin Settings", "/admin/settings", Area::Admin),
    route("Admin Holders", "/admin/holders", Area::Admin),
    route("Admin Assets", "/admin/assets", Area::Admin),
    route("Admin Active Assets", "/admin/active-assets", Area::Admin),
    route("Admin Approvals", "/admin/approvals", Area::Admin),
    route("Admin History", "/admin/history", Area::Admin),
    route("Admin Commissions", "/admin/commissions", Area::Admin),
    route("Holder Dashboard", HOLDER_HOME, Area::Holder),
    route("Holder Portfolio", "/holder/portfolio", Area::Holder),
    route("Holder Transactions", "/holder/transactions", Area::Holder),
    route("Holder History", "/holder/history", Area::Holder),
];

/// Strip query string and fragment, resolve `.` and `..` segments, and
/// collapse repeated and trailing slashes. Empty input becomes `/`.
///
/// `..` never climbs above the root.
pub fn normalize_path(path: &str) -> Cow<'_, str> {
    let end = path.find(['?', '#']).unwrap_or(path.len());
    let path = &path[..end];

    let mut segments: Vec<&str> = Vec::new();
    for segment in path.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                segments.pop();
            }
            segment => segments.push(segment),
        }
    }
    if segments.is_empty() {
        return Cow::Borrowed(ROOT);
    }

    let normalized = format!("/{}", segments.join("/"));
    let trimmed = path.trim_end_matches('/');
    if trimmed == normalized {
        Cow::Borrowed(trimmed)
    } else {
        Cow::Owned(normalized)
    }
}

pub fn find_route(path: &str) -> Option<&'static Route> {
    let path = normalize_path(path);
    ROUTES.iter().find(|route| route.path == path)
}

pub fn is_public(path: &str) -> bool {
    let path = normalize_path(path);
    PUBLIC_PATHS.iter().any(|public| *public == path)
}

pub fn is_admin_path(path: &str) -> bool {
    normalize_path(path).starts_with(ADMIN_PREFIX)
}

pub fn is_holder_path(path: &str) -> bool {
    normalize_path(path).starts_with(HOLDER_PREFIX)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalizes_query_fragment_and_slashes() {
        assert_eq!(normalize_path("/login/"), "/login");
        assert_eq!(normalize_path("/admin/holders?page=2#top"), "/admin/holders");
        assert_eq!(normalize_path(""), "/");
        assert_eq!(normalize_path("///"), "/");
        assert_eq!(normalize_path("//admin//holders"), "/admin/holders");
    }

    #[test]
    fn resolves_dot_segments() {
        assert_eq!(normalize_path("/holder/../admin/settings"), "/admin/settings");
        assert_eq!(normalize_path("/holder/./portfolio/"), "/holder/portfolio");
        assert_eq!(normalize_path("/../../login"), "/login");
        assert_eq!(normalize_path("/admin/.."), "/");
        assert!(is_admin_path("/holder/../admin/settings"));
        assert!(!is_holder_path("/holder/../admin/settings"));
    }

    #[test]
    fn classifies_paths() {
        assert!(is_public("/404"));
        assert!(!is_public("/"));
        assert!(is_admin_path("/admin/dashboard"));
        assert!(!is_admin_path("/admin"));
        assert!(!is_admin_path("/administrator"));
        assert!(is_holder_path("/holder/portfolio/"));
    }

    #[test]
    fn finds_known_routes() {
        let route = find_route("/holder/portfolio?x=1").unwrap();
        assert_eq!(route.name, "Holder Portfolio");
        assert_eq!(route.area, Area::Holder);
        assert!(find_route("/admin/unknown").is_none());
    }
}
