//! Session records and the session store contract.
//!
//! A session is created empty on a client's first contact, filled in on
//! login, and destroyed on logout or when the middleware finds the user is
//! no longer valid. The record itself is transport independent; the web
//! layer decides how the session id travels (cookie, header, ...).

use async_trait::async_trait;
use rootcause::Report;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::time::Instant;
use tracing::instrument;
use wg_portal_core::{ProviderId, SessionId, UserIdentifier};

use crate::authenticator::AuthenticatorUserInfo;
use crate::error::SessionStoreError;

/// Status code that sends the follow-up redirect to the site root.
const NOT_FOUND: u16 = 404;

/// Error waiting to be shown on the error page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorData {
    pub message: String,
    pub details: String,
    /// HTTP status code.
    pub code: u16,
    /// Where the error page links back to.
    pub path: String,
}

impl ErrorData {
    /// Builds an error payload for a request to `path`.
    ///
    /// A 404 points back at `/` instead of the page that does not exist.
    #[must_use]
    pub fn new(
        code: u16,
        message: impl Into<String>,
        details: impl Into<String>,
        path: impl Into<String>,
    ) -> Self {
        let path = if code == NOT_FOUND {
            "/".to_string()
        } else {
            path.into()
        };
        Self {
            message: message.into(),
            details: details.into(),
            code,
            path,
        }
    }
}

/// An OAuth login that was started but whose callback has not arrived yet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingLogin {
    /// Provider the user was sent to.
    pub provider: ProviderId,
    /// CSRF state echoed back by the provider.
    pub state: String,
    /// OIDC nonce, absent for plain OAuth.
    pub nonce: Option<String>,
    pub pkce_verifier: String,
}

/// Per-client session record.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionData {
    pub logged_in: bool,
    pub is_admin: bool,
    pub user_identifier: UserIdentifier,
    pub firstname: String,
    pub lastname: String,
    pub email: String,
    /// Provider that authenticated this session.
    pub provider: Option<ProviderId>,
    /// Originally requested URI, restored after login.
    pub deep_link: Option<String>,
    pub pending_login: Option<PendingLogin>,
    pub error: Option<ErrorData>,
}

impl SessionData {
    /// Marks the session as logged in for the given user.
    ///
    /// Keeps the deep-link so the login handler can redirect to it, and
    /// drops any pending login state.
    pub fn log_in(&mut self, provider: ProviderId, user: AuthenticatorUserInfo, is_admin: bool) {
        self.logged_in = true;
        self.is_admin = is_admin;
        self.user_identifier = user.identifier;
        self.firstname = user.firstname.unwrap_or_default();
        self.lastname = user.lastname.unwrap_or_default();
        self.email = user.email.unwrap_or_default();
        self.provider = Some(provider);
        self.pending_login = None;
    }

    /// Removes and returns the deep-link.
    pub fn take_deep_link(&mut self) -> Option<String> {
        self.deep_link.take()
    }

    /// Removes and returns the pending error.
    pub fn take_error(&mut self) -> Option<ErrorData> {
        self.error.take()
    }
}

/// Storage for session records, keyed by session id.
///
/// Implementations must tolerate repeated calls for the same id within one
/// request; the last `save` wins.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Loads a session, `None` if the id is unknown.
    async fn load(&self, id: &SessionId) -> Result<Option<SessionData>, Report<SessionStoreError>>;

    /// Stores a session, replacing any previous record.
    async fn save(&self, id: &SessionId, data: &SessionData)
    -> Result<(), Report<SessionStoreError>>;

    /// Removes a session. Unknown ids are not an error.
    async fn destroy(&self, id: &SessionId) -> Result<(), Report<SessionStoreError>>;

    /// Removes expired sessions, returning how many were dropped.
    async fn delete_expired(&self) -> Result<u64, Report<SessionStoreError>>;
}

/// Process-local session store.
///
/// Sessions do not survive a restart. Every save pushes the expiry `ttl`
/// into the future; expired records read as absent until
/// [`SessionStore::delete_expired`] drops them.
#[derive(Debug)]
pub struct MemorySessionStore {
    ttl: Duration,
    sessions: RwLock<HashMap<SessionId, StoredSession>>,
}

#[derive(Debug)]
struct StoredSession {
    data: SessionData,
    expires_at: Instant,
}

impl MemorySessionStore {
    /// Creates an empty store whose records live for `ttl` after each save.
    #[must_use]
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            sessions: RwLock::default(),
        }
    }

    /// Returns the number of stored sessions, expired ones included.
    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    /// Returns true if no sessions are stored.
    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    #[instrument(skip(self), level = "trace")]
    async fn load(&self, id: &SessionId) -> Result<Option<SessionData>, Report<SessionStoreError>> {
        let now = Instant::now();
        Ok(self
            .sessions
            .read()
            .await
            .get(id)
            .filter(|stored| stored.expires_at > now)
            .map(|stored| stored.data.clone()))
    }

    #[instrument(skip(self, data), level = "trace")]
    async fn save(
        &self,
        id: &SessionId,
        data: &SessionData,
    ) -> Result<(), Report<SessionStoreError>> {
        let stored = StoredSession {
            data: data.clone(),
            expires_at: Instant::now() + self.ttl,
        };
        self.sessions.write().await.insert(id.clone(), stored);
        Ok(())
    }

    #[instrument(skip(self), level = "trace")]
    async fn destroy(&self, id: &SessionId) -> Result<(), Report<SessionStoreError>> {
        self.sessions.write().await.remove(id);
        Ok(())
    }

    #[instrument(skip(self), level = "trace")]
    async fn delete_expired(&self) -> Result<u64, Report<SessionStoreError>> {
        let now = Instant::now();
        let mut sessions = self.sessions.write().await;
        let before = sessions.len();
        sessions.retain(|_, stored| stored.expires_at > now);
        Ok((before - sessions.len()) as u64)
    }
}
