//! Cookie-carried session handles for Axum.
//!
//! The session record lives in a [`SessionStore`]; the client only holds a
//! signed cookie with the record's id. [`session_layer`] resolves the id for
//! every request and hands a [`Session`] to the handlers through the request
//! extensions. Cookie changes are applied to the response once the handler
//! has finished.

use axum::{
    extract::{FromRequestParts, Request, State},
    http::{StatusCode, request::Parts},
    middleware::Next,
    response::{IntoResponse, Response},
};
use axum_extra::extract::cookie::{Cookie, Key, SameSite, SignedCookieJar};
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{error, warn};
use wg_portal_access::{SessionData, SessionStore};
use wg_portal_core::SessionId;

use crate::config::SessionConfig;

/// Session cookie name.
pub const SESSION_COOKIE: &str = "wgPortalSession";

/// Shared settings for [`session_layer`].
#[derive(Clone)]
pub struct SessionLayer {
    store: Arc<dyn SessionStore>,
    key: Key,
    secure: bool,
    max_age: time::Duration,
}

impl SessionLayer {
    pub fn new(store: Arc<dyn SessionStore>, key: Key, config: &SessionConfig) -> Self {
        Self {
            store,
            key,
            secure: config.secure_cookies,
            max_age: time::Duration::minutes(config.duration_minutes),
        }
    }

    fn session_cookie(&self, id: &SessionId) -> Cookie<'static> {
        Cookie::build((SESSION_COOKIE, id.to_string()))
            .path("/")
            .http_only(true)
            .secure(self.secure)
            .same_site(SameSite::Lax)
            .max_age(self.max_age)
            .build()
    }
}

/// What to do with the session cookie after the handler ran.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CookieAction {
    Keep,
    Issue,
    Remove,
}

struct HandleState {
    id: SessionId,
    action: CookieAction,
}

struct SessionInner {
    store: Arc<dyn SessionStore>,
    state: Mutex<HandleState>,
}

/// Handle to the current request's session.
///
/// Reads and writes go straight to the store; within one request the last
/// write wins.
#[derive(Clone)]
pub struct Session {
    inner: Arc<SessionInner>,
}

impl Session {
    fn new(id: SessionId, store: Arc<dyn SessionStore>) -> Self {
        Self {
            inner: Arc::new(SessionInner {
                store,
                state: Mutex::new(HandleState {
                    id,
                    action: CookieAction::Keep,
                }),
            }),
        }
    }

    fn with_state<T>(&self, f: impl FnOnce(&mut HandleState) -> T) -> T {
        let mut state = self
            .inner
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        f(&mut state)
    }

    fn id(&self) -> SessionId {
        self.with_state(|state| state.id.clone())
    }

    /// Returns the session record, or an empty one if there is none.
    ///
    /// Store failures are logged and read as an empty session.
    pub async fn get_data(&self) -> SessionData {
        let id = self.id();
        match self.inner.store.load(&id).await {
            Ok(Some(data)) => data,
            Ok(None) => SessionData::default(),
            Err(err) => {
                warn!(error = %err, "failed to load session, starting fresh");
                SessionData::default()
            }
        }
    }

    /// Persists the session record and makes sure the client holds the cookie.
    ///
    /// Store failures are logged; the request carries on.
    pub async fn set_data(&self, data: &SessionData) {
        let id = self.with_state(|state| {
            state.action = CookieAction::Issue;
            state.id.clone()
        });
        if let Err(err) = self.inner.store.save(&id, data).await {
            error!(error = %err, "failed to store session");
        }
    }

    /// Deletes the session record and removes the cookie.
    ///
    /// The handle switches to a fresh id, so a later [`Session::set_data`]
    /// in the same request starts a new session instead of reviving the old
    /// one.
    pub async fn destroy_data(&self) {
        let id = self.with_state(|state| {
            let old = std::mem::replace(&mut state.id, SessionId::generate());
            state.action = CookieAction::Remove;
            old
        });
        if let Err(err) = self.inner.store.destroy(&id).await {
            error!(error = %err, "failed to destroy session");
        }
    }

    /// Moves the session record to a fresh id and reissues the cookie.
    ///
    /// The old record is deleted, so an id handed out before a login stops
    /// working once the login succeeds.
    pub async fn regenerate(&self) {
        let id = self.with_state(|state| {
            state.action = CookieAction::Issue;
            std::mem::replace(&mut state.id, SessionId::generate())
        });
        if let Err(err) = self.inner.store.destroy(&id).await {
            error!(error = %err, "failed to drop replaced session");
        }
    }

    fn finish(&self) -> (SessionId, CookieAction) {
        self.with_state(|state| (state.id.clone(), state.action))
    }
}

impl<S> FromRequestParts<S> for Session
where
    S: Send + Sync,
{
    type Rejection = (StatusCode, &'static str);

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts.extensions.get::<Session>().cloned().ok_or((
            StatusCode::INTERNAL_SERVER_ERROR,
            "session layer is not installed",
        ))
    }
}

/// Middleware attaching a [`Session`] to every request.
pub async fn session_layer(
    State(layer): State<SessionLayer>,
    mut req: Request,
    next: Next,
) -> Response {
    let jar = SignedCookieJar::from_headers(req.headers(), layer.key.clone());
    let id = jar
        .get(SESSION_COOKIE)
        .map(|cookie| cookie.value().to_string())
        .filter(|value| !value.is_empty())
        .map_or_else(SessionId::generate, SessionId::new);

    let session = Session::new(id, layer.store.clone());
    req.extensions_mut().insert(session.clone());

    let response = next.run(req).await;

    match session.finish() {
        (_, CookieAction::Keep) => response,
        (id, CookieAction::Issue) => {
            let jar = jar.add(layer.session_cookie(&id));
            (jar, response).into_response()
        }
        (_, CookieAction::Remove) => {
            let jar = jar.remove(Cookie::build(SESSION_COOKIE).path("/"));
            (jar, response).into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use wg_portal_access::MemorySessionStore;

    fn store() -> Arc<MemorySessionStore> {
        Arc::new(MemorySessionStore::new(Duration::from_secs(3600)))
    }

    #[tokio::test]
    async fn unknown_session_reads_as_empty() {
        let store = store();
        let session = Session::new(SessionId::generate(), store);
        let data = session.get_data().await;
        assert!(!data.logged_in);
        assert_eq!(session.finish().1, CookieAction::Keep);
    }

    #[tokio::test]
    async fn set_data_issues_cookie() {
        let store = store();
        let session = Session::new(SessionId::generate(), store.clone());

        let data = SessionData {
            deep_link: Some("/admin/".to_string()),
            ..SessionData::default()
        };
        session.set_data(&data).await;

        assert_eq!(session.finish().1, CookieAction::Issue);
        assert_eq!(session.get_data().await.deep_link.as_deref(), Some("/admin/"));
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn destroy_switches_to_a_fresh_id() {
        let store = store();
        let original = SessionId::generate();
        let session = Session::new(original.clone(), store.clone());
        session
            .set_data(&SessionData {
                logged_in: true,
                ..SessionData::default()
            })
            .await;

        session.destroy_data().await;

        let (id, action) = session.finish();
        assert_eq!(action, CookieAction::Remove);
        assert_ne!(id, original);
        assert!(store.load(&original).await.expect("load").is_none());
        assert!(!session.get_data().await.logged_in);
    }

    #[tokio::test]
    async fn regenerate_moves_record_to_new_id() {
        let store = store();
        let original = SessionId::generate();
        let session = Session::new(original.clone(), store.clone());
        session
            .set_data(&SessionData {
                deep_link: Some("/admin/".to_string()),
                ..SessionData::default()
            })
            .await;

        let mut data = session.get_data().await;
        session.regenerate().await;
        data.logged_in = true;
        session.set_data(&data).await;

        let (id, action) = session.finish();
        assert_eq!(action, CookieAction::Issue);
        assert_ne!(id, original);
        assert!(store.load(&original).await.expect("load").is_none());
        let moved = store.load(&id).await.expect("load").expect("present");
        assert!(moved.logged_in);
        assert_eq!(moved.deep_link.as_deref(), Some("/admin/"));
        assert_eq!(store.len().await, 1);
    }
}
