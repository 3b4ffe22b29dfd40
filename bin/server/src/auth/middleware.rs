//! Route guard middleware for Axum.

use axum::{
    extract::{OriginalUri, Request, State},
    http::StatusCode,
    middleware::Next,
    response::{IntoResponse, Redirect, Response},
};
use std::sync::Arc;
use tracing::debug;
use wg_portal_access::{AccessDecision, RequiredScope, evaluate};

use super::AppState;
use crate::session::Session;

/// Where unauthenticated clients are sent.
pub const LOGIN_PAGE: &str = "/auth/login";

/// State for one guarded route group: the app state plus the scope the
/// group requires.
#[derive(Clone)]
pub struct ScopeGuard {
    state: Arc<AppState>,
    scope: RequiredScope,
}

impl ScopeGuard {
    pub fn new(state: Arc<AppState>, scope: RequiredScope) -> Self {
        Self { state, scope }
    }
}

/// Guards a route group.
///
/// Install with `route_layer(from_fn_with_state(ScopeGuard::new(..), require_scope))`.
/// Logged-out clients are redirected to the login page with the requested
/// URI remembered as the deep-link. Sessions whose user the backend no
/// longer accepts are destroyed.
pub async fn require_scope(
    State(guard): State<ScopeGuard>,
    session: Session,
    OriginalUri(uri): OriginalUri,
    req: Request,
    next: Next,
) -> Response {
    let mut data = session.get_data().await;

    match evaluate(&data, &guard.scope, guard.state.backend.as_ref()).await {
        AccessDecision::Granted => next.run(req).await,
        AccessDecision::LoginRequired => {
            let deep_link = uri
                .path_and_query()
                .map_or_else(|| uri.path().to_string(), ToString::to_string);
            debug!(deep_link = %deep_link, "login required");

            data.deep_link = Some(deep_link);
            session.set_data(&data).await;
            Redirect::to(LOGIN_PAGE).into_response()
        }
        AccessDecision::InsufficientScope => (
            StatusCode::UNAUTHORIZED,
            "unauthorized: not enough permissions",
        )
            .into_response(),
        AccessDecision::SessionInvalidated => {
            session.destroy_data().await;
            (
                StatusCode::UNAUTHORIZED,
                "unauthorized: session no longer available",
            )
                .into_response()
        }
    }
}
