//! Authentication route handlers.

use axum::{
    Form, Json,
    extract::{OriginalUri, Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Redirect, Response},
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, warn};
use wg_portal_access::{AuthenticatorType, AuthenticatorUserInfo, SessionData};
use wg_portal_core::ProviderId;

use super::AppState;
use crate::error::report_error;
use crate::session::Session;

/// Where a login ends up when no deep-link was recorded.
const DEFAULT_LANDING: &str = "/";

/// A redirect-based provider offered on the login page.
#[derive(Debug, Serialize)]
pub struct LoginProvider {
    pub id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub kind: AuthenticatorType,
    /// Starts the login with this provider.
    pub url: String,
}

/// Login page contents.
#[derive(Debug, Serialize)]
pub struct LoginPage {
    pub site_title: String,
    /// Whether username/password login is available.
    pub credentials_enabled: bool,
    pub providers: Vec<LoginProvider>,
}

/// Lists the available login methods.
///
/// Logged-in users are sent on to the landing page.
pub async fn login_get(State(state): State<Arc<AppState>>, session: Session) -> Response {
    if session.get_data().await.logged_in {
        return Redirect::to(DEFAULT_LANDING).into_response();
    }

    let providers = state
        .registry
        .oauth_providers()
        .into_iter()
        .filter_map(|(id, name)| {
            let authenticator = state.registry.oauth(id.as_str())?;
            Some(LoginProvider {
                id: id.to_string(),
                name: name.to_string(),
                kind: authenticator.authenticator_type(),
                url: format!("/auth/login/{id}"),
            })
        })
        .collect();

    Json(LoginPage {
        site_title: state.web.site_title.clone(),
        credentials_enabled: state.registry.has_ldap(),
        providers,
    })
    .into_response()
}

/// Username/password login form.
#[derive(Debug, Deserialize)]
pub struct LoginForm {
    pub username: String,
    pub password: String,
}

/// Checks credentials against each LDAP directory in configuration order.
pub async fn login_post(
    State(state): State<Arc<AppState>>,
    session: Session,
    OriginalUri(uri): OriginalUri,
    Form(form): Form<LoginForm>,
) -> Response {
    if !state.registry.has_ldap() {
        return report_error(
            &session,
            uri.path(),
            StatusCode::BAD_REQUEST,
            "login failed",
            "username and password login is not enabled",
        )
        .await
        .into_response();
    }

    let username = form.username.trim();
    for (provider, directory) in state.registry.ldap_authenticators() {
        match directory.validate_credentials(username, &form.password).await {
            Ok(user) => {
                return complete_login(&state, &session, uri.path(), provider.clone(), user).await;
            }
            Err(err) => {
                debug!(provider = %provider, error = %err, "credential check failed");
            }
        }
    }

    info!(username = %username, "login with credentials failed");
    report_error(
        &session,
        uri.path(),
        StatusCode::UNAUTHORIZED,
        "login failed",
        "invalid username or password",
    )
    .await
    .into_response()
}

/// Starts a login with a redirect-based provider.
pub async fn oauth_login(
    State(state): State<Arc<AppState>>,
    session: Session,
    OriginalUri(uri): OriginalUri,
    Path(provider): Path<String>,
) -> Response {
    let mut data = session.get_data().await;
    if data.logged_in {
        return Redirect::to(DEFAULT_LANDING).into_response();
    }

    let Some(authenticator) = state.registry.oauth(&provider) else {
        return report_error(
            &session,
            uri.path(),
            StatusCode::NOT_FOUND,
            "login failed",
            format!("unknown authentication provider {provider}"),
        )
        .await
        .into_response();
    };

    let (authorization_url, pending) = authenticator
        .initiate_login()
        .into_pending(ProviderId::normalize(&provider));
    data.pending_login = Some(pending);
    session.set_data(&data).await;

    Redirect::to(&authorization_url).into_response()
}

/// Query parameters of a provider callback.
#[derive(Debug, Deserialize)]
pub struct CallbackQuery {
    pub code: Option<String>,
    pub state: Option<String>,
    pub error: Option<String>,
    pub error_description: Option<String>,
}

/// Completes a login with a redirect-based provider.
pub async fn oauth_callback(
    State(state): State<Arc<AppState>>,
    session: Session,
    OriginalUri(uri): OriginalUri,
    Path(provider): Path<String>,
    Query(query): Query<CallbackQuery>,
) -> Response {
    let path = uri.path();

    // The pending login is single use, whatever the outcome.
    let mut data = session.get_data().await;
    let pending = data.pending_login.take();
    session.set_data(&data).await;

    if let Some(error) = query.error {
        let details = query.error_description.unwrap_or(error);
        return report_error(&session, path, StatusCode::BAD_REQUEST, "login failed", details)
            .await
            .into_response();
    }

    let provider_id = ProviderId::normalize(&provider);
    let (Some(pending), Some(code), Some(csrf_state)) = (pending, query.code, query.state) else {
        return report_error(
            &session,
            path,
            StatusCode::BAD_REQUEST,
            "login failed",
            "invalid login state",
        )
        .await
        .into_response();
    };

    if pending.provider != provider_id || pending.state != csrf_state {
        warn!(provider = %provider_id, "login callback state mismatch");
        return report_error(
            &session,
            path,
            StatusCode::BAD_REQUEST,
            "login failed",
            "invalid login state",
        )
        .await
        .into_response();
    }

    let Some(authenticator) = state.registry.oauth(provider_id.as_str()) else {
        return report_error(
            &session,
            path,
            StatusCode::NOT_FOUND,
            "login failed",
            format!("unknown authentication provider {provider}"),
        )
        .await
        .into_response();
    };

    match authenticator.handle_callback(&code, &pending).await {
        Ok(user) => complete_login(&state, &session, path, provider_id, user).await,
        Err(err) => {
            warn!(provider = %provider_id, error = %err, "login callback failed");
            report_error(
                &session,
                path,
                StatusCode::UNAUTHORIZED,
                "login failed",
                format!("authentication with {provider_id} failed"),
            )
            .await
            .into_response()
        }
    }
}

/// Logs the user in after a provider vouched for them.
///
/// The account must also be active in the user backend. The administrator
/// flag is granted if either the backend or the provider says so. The
/// session moves to a fresh id so the pre-login cookie is worthless.
async fn complete_login(
    state: &AppState,
    session: &Session,
    path: &str,
    provider: ProviderId,
    user: AuthenticatorUserInfo,
) -> Response {
    let account = match state.backend.get_active_user(&user.identifier).await {
        Ok(account) => account,
        Err(err) => {
            warn!(user = %user.identifier, error = %err, "login refused for inactive account");
            return report_error(
                session,
                path,
                StatusCode::UNAUTHORIZED,
                "login failed",
                "user account is not active",
            )
            .await
            .into_response();
        }
    };

    let mut data: SessionData = session.get_data().await;
    session.regenerate().await;
    let is_admin = account.is_admin || user.is_admin;
    info!(user = %user.identifier, provider = %provider, is_admin, "user logged in");
    data.log_in(provider, user, is_admin);

    let target = data
        .take_deep_link()
        .unwrap_or_else(|| DEFAULT_LANDING.to_string());
    session.set_data(&data).await;

    Redirect::to(&target).into_response()
}

/// Ends the session.
pub async fn logout(session: Session) -> Redirect {
    let data = session.get_data().await;
    if data.logged_in {
        info!(user = %data.user_identifier, "user logged out");
    }
    session.destroy_data().await;
    Redirect::to(DEFAULT_LANDING)
}
