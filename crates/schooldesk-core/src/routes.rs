//! Route guard applied before a page is served.
//!
//! Authentication is judged only by the presence of the `access_token`
//! cookie; validity is left to the backend.

use crate::auth::boundary::SIGN_IN_PATH;
use crate::auth::store::ACCESS_TOKEN_KEY;

/// Landing page for authenticated users.
pub const DASHBOARD_PATH: &str = "/dashboard";

/// Path prefixes that require an access token.
pub const PROTECTED_PREFIXES: &[&str] = &[DASHBOARD_PATH];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GuardDecision {
    Continue,
    Redirect(String),
}

/// Decide what to do with a request for `path` carrying `cookie_header`.
pub fn guard(path: &str, cookie_header: Option<&str>) -> GuardDecision {
    let authenticated = cookie_header
        .and_then(|header| cookie_value(header, ACCESS_TOKEN_KEY))
        .is_some_and(|v| !v.is_empty());

    if !authenticated && is_protected(path) {
        return GuardDecision::Redirect(SIGN_IN_PATH.to_string());
    }
    if authenticated && matches_prefix(path, SIGN_IN_PATH) {
        return GuardDecision::Redirect(DASHBOARD_PATH.to_string());
    }
    GuardDecision::Continue
}

pub fn is_protected(path: &str) -> bool {
    PROTECTED_PREFIXES.iter().any(|prefix| matches_prefix(path, prefix))
}

/// `prefix` itself or anything below it, on segment boundaries.
fn matches_prefix(path: &str, prefix: &str) -> bool {
    match path.strip_prefix(prefix) {
        Some(rest) => rest.is_empty() || rest.starts_with('/') || rest.starts_with('?'),
        None => false,
    }
}

/// Find the first non-empty cookie with `name` in a `Cookie` request header.
pub fn cookie_value<'a>(header: &'a str, name: &str) -> Option<&'a str> {
    header.split(';').find_map(|pair| {
        let (key, value) = pair.trim().split_once('=')?;
        let value = value.trim();
        (key.trim() == name && !value.is_empty()).then_some(value)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unauthenticated_protected_path_redirects_to_sign_in() {
        assert_eq!(
            guard("/dashboard/students", None),
            GuardDecision::Redirect("/sign-in".into())
        );
        assert_eq!(
            guard("/dashboard", Some("theme=dark; access_token=")),
            GuardDecision::Redirect("/sign-in".into())
        );
    }

    #[test]
    fn test_authenticated_sign_in_redirects_to_dashboard() {
        assert_eq!(
            guard("/sign-in", Some("access_token=abc")),
            GuardDecision::Redirect("/dashboard".into())
        );
        assert_eq!(
            guard("/sign-in?error=missing_code", Some("a=1; access_token=abc")),
            GuardDecision::Redirect("/dashboard".into())
        );
    }

    #[test]
    fn test_other_requests_continue() {
        assert_eq!(guard("/", None), GuardDecision::Continue);
        assert_eq!(guard("/sign-in", None), GuardDecision::Continue);
        assert_eq!(guard("/dashboard/exams", Some("access_token=abc")), GuardDecision::Continue);
        assert_eq!(guard("/dashboardx", None), GuardDecision::Continue);
    }

    #[test]
    fn test_cookie_value() {
        let header = "refresh_token=r; access_token=a=b ; other";
        assert_eq!(cookie_value(header, "access_token"), Some("a=b"));
        assert_eq!(cookie_value(header, "refresh_token"), Some("r"));
        assert_eq!(cookie_value(header, "missing"), None);
    }

    #[test]
    fn test_empty_duplicate_cookie_is_skipped() {
        let header = "access_token=; access_token=abc";
        assert_eq!(cookie_value(header, "access_token"), Some("abc"));
        assert_eq!(guard("/dashboard", Some(header)), GuardDecision::Continue);
        assert_eq!(cookie_value("access_token=", "access_token"), None);
    }
}
