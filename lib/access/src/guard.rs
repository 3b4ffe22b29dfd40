//! Per-request access decisions for guarded routes.

use tracing::{debug, warn};

use crate::backend::UserBackend;
use crate::session::SessionData;

/// Authorization level a route group requires.
///
/// The empty scope admits any logged-in user. Every non-empty scope,
/// `admin` or otherwise, requires an administrator; there are no
/// intermediate tiers.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RequiredScope(String);

impl RequiredScope {
    pub const ADMIN: &'static str = "admin";

    #[must_use]
    pub fn new(scope: impl Into<String>) -> Self {
        Self(scope.into())
    }

    /// Any authenticated user.
    #[must_use]
    pub fn authenticated() -> Self {
        Self(String::new())
    }

    /// Administrators only.
    #[must_use]
    pub fn admin() -> Self {
        Self(Self::ADMIN.to_string())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    #[must_use]
    pub fn requires_admin(&self) -> bool {
        !self.0.is_empty()
    }
}

/// Outcome of checking a session against a scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessDecision {
    /// No logged-in session; send the client to the login page.
    LoginRequired,
    /// Logged in, but not allowed on this route.
    InsufficientScope,
    /// The user behind the session is gone or disabled; drop the session.
    SessionInvalidated,
    /// Let the request through.
    Granted,
}

/// Decides whether `session` may access a route guarded by `scope`.
///
/// Checks run in order and the first failing one decides. The backend is
/// consulted on every call; any backend error counts as an invalid
/// session.
pub async fn evaluate(
    session: &SessionData,
    scope: &RequiredScope,
    backend: &dyn UserBackend,
) -> AccessDecision {
    if !session.logged_in {
        return AccessDecision::LoginRequired;
    }

    if scope.requires_admin() && !session.is_admin {
        debug!(
            user = %session.user_identifier,
            scope = scope.as_str(),
            "insufficient permissions"
        );
        return AccessDecision::InsufficientScope;
    }

    match backend.get_active_user(&session.user_identifier).await {
        Ok(_) => AccessDecision::Granted,
        Err(err) => {
            warn!(
                user = %session.user_identifier,
                error = %err,
                "session user is no longer valid"
            );
            AccessDecision::SessionInvalidated
        }
    }
}
