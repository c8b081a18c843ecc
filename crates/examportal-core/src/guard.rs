//! Gate for pages that require a logged-in user.

use crate::auth::AuthSnapshot;

/// Pages that need an authenticated session
pub const PROTECTED_PATHS: &[&str] = &[
    "/profile",
    "/settings",
    "/application-status",
    "/admin",
    "/ai-study-assistance",
];

/// Where to go when no return path was recorded
const HOME_PATH: &str = "/";

pub const LOGIN_PATH: &str = "/login";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GuardDecision {
    Allow,
    /// Credentials have not been read yet; show a spinner, don't redirect.
    Wait,
    RedirectToLogin { return_to: String },
}

pub struct RouteGuard;

impl RouteGuard {
    pub fn is_protected(path: &str) -> bool {
        let path = normalize(path);
        PROTECTED_PATHS.iter().any(|protected| {
            path == *protected
                || path
                    .strip_prefix(protected)
                    .is_some_and(|rest| rest.starts_with('/'))
        })
    }

    pub fn check(path: &str, auth: &AuthSnapshot) -> GuardDecision {
        if !Self::is_protected(path) {
            return GuardDecision::Allow;
        }
        if auth.is_loading {
            return GuardDecision::Wait;
        }
        if auth.is_authenticated {
            GuardDecision::Allow
        } else {
            GuardDecision::RedirectToLogin {
                return_to: path.to_string(),
            }
        }
    }

    /// Destination after a successful login. The login page itself is never
    /// a destination.
    pub fn after_login(return_to: Option<&str>) -> String {
        match return_to {
            Some(path)
                if path.starts_with('/')
                    && !path.starts_with("//")
                    && normalize(path) != LOGIN_PATH =>
            {
                path.to_string()
            }
            _ => HOME_PATH.to_string(),
        }
    }
}

/// Drop the query string and trailing slash
fn normalize(path: &str) -> &str {
    let path = path.split(['?', '#']).next().unwrap_or(path);
    if path.len() > 1 {
        path.trim_end_matches('/')
    } else {
        path
    }
}
