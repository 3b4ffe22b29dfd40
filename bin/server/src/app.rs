//! Router assembly and the public and admin pages.
//!
//! Pages answer with JSON; the HTML front end is served separately.

use axum::{
    Json, Router,
    extract::{OriginalUri, State},
    http::StatusCode,
    middleware::from_fn_with_state,
    response::{IntoResponse, Redirect, Response},
    routing::get,
};
use serde::Serialize;
use serde_json::json;
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use wg_portal_access::RequiredScope;

use crate::auth::{self, AppState, ScopeGuard, require_scope};
use crate::error::report_error;
use crate::session::{Session, SessionLayer, session_layer};

/// Builds the application router.
pub fn router(state: Arc<AppState>, sessions: SessionLayer) -> Router {
    build(state, sessions, admin_routes())
}

/// Admin pages, before the guard is applied.
fn admin_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/admin/", get(admin_index))
        .route("/admin/interface/new", get(interface_new))
        .route("/admin/interface/create", get(interface_create))
        .route("/admin/interface/import", get(interface_import))
        .route("/admin/users", get(users))
}

fn build(state: Arc<AppState>, sessions: SessionLayer, admin: Router<Arc<AppState>>) -> Router {
    let admin = admin.route_layer(from_fn_with_state(
        ScopeGuard::new(state.clone(), RequiredScope::admin()),
        require_scope,
    ));

    Router::new()
        .route("/", get(index))
        .route("/oops", get(oops))
        .route("/admin", get(|| async { Redirect::permanent("/admin/") }))
        .route("/auth/login", get(auth::login_get).post(auth::login_post))
        .route("/auth/login/{provider}", get(auth::oauth_login))
        .route("/auth/login/{provider}/callback", get(auth::oauth_callback))
        .route("/auth/logout", get(auth::logout))
        .merge(admin)
        .fallback(not_found)
        .layer(from_fn_with_state(sessions, session_layer))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[derive(Debug, Serialize)]
struct CurrentUser {
    identifier: String,
    firstname: String,
    lastname: String,
    email: String,
    is_admin: bool,
}

#[derive(Debug, Serialize)]
struct IndexPage {
    site_title: String,
    company_name: String,
    logged_in: bool,
    user: Option<CurrentUser>,
}

async fn index(State(state): State<Arc<AppState>>, session: Session) -> Json<IndexPage> {
    let data = session.get_data().await;
    let user = data.logged_in.then(|| CurrentUser {
        identifier: data.user_identifier.to_string(),
        firstname: data.firstname.clone(),
        lastname: data.lastname.clone(),
        email: data.email.clone(),
        is_admin: data.is_admin,
    });

    Json(IndexPage {
        site_title: state.web.site_title.clone(),
        company_name: state.web.company_name.clone(),
        logged_in: data.logged_in,
        user,
    })
}

/// Shows the pending error once.
async fn oops(session: Session) -> Response {
    let mut data = session.get_data().await;
    let Some(error) = data.take_error() else {
        return Redirect::to("/").into_response();
    };
    session.set_data(&data).await;

    let status = StatusCode::from_u16(error.code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    (status, Json(error)).into_response()
}

async fn not_found(session: Session, OriginalUri(uri): OriginalUri) -> Redirect {
    report_error(
        &session,
        uri.path(),
        StatusCode::NOT_FOUND,
        "Oops... you have reached the end of the internet",
        format!("Requested page {} not found", uri.path()),
    )
    .await
}

async fn admin_index() -> Json<serde_json::Value> {
    Json(json!({ "page": "admin/index" }))
}

async fn interface_new() -> Json<serde_json::Value> {
    Json(json!({ "page": "admin/interface/new" }))
}

async fn interface_create() -> Json<serde_json::Value> {
    Json(json!({ "page": "admin/interface/create" }))
}

async fn interface_import() -> Json<serde_json::Value> {
    Json(json!({ "page": "admin/interface/import" }))
}

async fn users() -> Json<serde_json::Value> {
    Json(json!({ "page": "admin/users" }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{SessionConfig, WebConfig};
    use crate::session::SESSION_COOKIE;
    use async_trait::async_trait;
    use axum::body::Body;
    use axum::http::{HeaderMap, HeaderValue, Request, header};
    use axum_extra::extract::cookie::{Cookie, Key, SignedCookieJar};
    use rootcause::Report;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tower::ServiceExt;
    use wg_portal_access::{
        AuthConfig, AuthenticationError, AuthenticatorFactory, AuthenticatorRegistry,
        AuthenticatorType, AuthenticatorUserInfo, LdapAuthenticator, LdapProviderConfig,
        LoginInitiation, MemorySessionStore, MemoryUserBackend, OauthAuthenticator,
        OauthProviderConfig, OidcProviderConfig, PendingLogin, SessionData, SessionStore, User,
    };
    use wg_portal_core::{SessionId, UserIdentifier};

    const SECRET: &str = "0123456789abcdef0123456789abcdef";
    const STUB_STATE: &str = "state-123";

    /// Accepts any code and treats it as the user identifier; "bad" fails.
    struct StubOauth;

    #[async_trait]
    impl OauthAuthenticator for StubOauth {
        fn display_name(&self) -> &str {
            "Stub Login"
        }

        fn authenticator_type(&self) -> AuthenticatorType {
            AuthenticatorType::OAuth
        }

        fn initiate_login(&self) -> LoginInitiation {
            LoginInitiation {
                authorization_url: "https://idp.example.com/authorize".to_string(),
                state: STUB_STATE.to_string(),
                nonce: None,
                pkce_verifier: "verifier".to_string(),
            }
        }

        async fn handle_callback(
            &self,
            code: &str,
            _pending: &PendingLogin,
        ) -> Result<AuthenticatorUserInfo, Report<AuthenticationError>> {
            if code == "bad" {
                return Err(AuthenticationError::InvalidToken {
                    reason: "rejected".to_string(),
                }
                .into());
            }
            Ok(AuthenticatorUserInfo {
                identifier: UserIdentifier::new(code),
                ..AuthenticatorUserInfo::default()
            })
        }
    }

    /// Accepts password "secret" for any user.
    struct StubLdap;

    #[async_trait]
    impl LdapAuthenticator for StubLdap {
        fn url(&self) -> &str {
            "ldap://stub"
        }

        async fn validate_credentials(
            &self,
            username: &str,
            password: &str,
        ) -> Result<AuthenticatorUserInfo, Report<AuthenticationError>> {
            if password != "secret" {
                return Err(AuthenticationError::InvalidCredentials.into());
            }
            Ok(AuthenticatorUserInfo {
                identifier: UserIdentifier::new(username),
                ..AuthenticatorUserInfo::default()
            })
        }
    }

    struct StubFactory;

    #[async_trait]
    impl AuthenticatorFactory for StubFactory {
        async fn oidc(
            &self,
            _callback_url: &str,
            _config: &OidcProviderConfig,
        ) -> Result<Arc<dyn OauthAuthenticator>, Report<AuthenticationError>> {
            Ok(Arc::new(StubOauth))
        }

        async fn oauth(
            &self,
            _callback_url: &str,
            _config: &OauthProviderConfig,
        ) -> Result<Arc<dyn OauthAuthenticator>, Report<AuthenticationError>> {
            Ok(Arc::new(StubOauth))
        }

        async fn ldap(
            &self,
            _config: &LdapProviderConfig,
        ) -> Result<Arc<dyn LdapAuthenticator>, Report<AuthenticationError>> {
            Ok(Arc::new(StubLdap))
        }
    }

    struct Harness {
        app: Router,
        store: Arc<MemorySessionStore>,
        key: Key,
        hits: Arc<AtomicUsize>,
    }

    async fn harness(users: impl IntoIterator<Item = User>) -> Harness {
        harness_with_ttl(users, Duration::from_secs(3600)).await
    }

    async fn harness_with_ttl(users: impl IntoIterator<Item = User>, ttl: Duration) -> Harness {
        let config = AuthConfig {
            oauth: vec![OauthProviderConfig::new(
                "Stub",
                "client",
                "secret",
                "https://idp.example.com/authorize",
                "https://idp.example.com/token",
                "https://idp.example.com/user",
            )],
            ldap: vec![LdapProviderConfig::new(
                "ldap://stub",
                "DC=example,DC=com",
                "CN=svc",
                "secret",
            )],
            ..AuthConfig::default()
        };
        let registry =
            AuthenticatorRegistry::setup(&config, "https://vpn.example.com", &StubFactory)
                .await
                .expect("registry");

        let backend = Arc::new(MemoryUserBackend::with_users(users));
        let state = Arc::new(AppState::new(registry, backend, WebConfig::default()));

        let store = Arc::new(MemorySessionStore::new(ttl));
        let key = Key::derive_from(SECRET.as_bytes());
        let sessions = SessionLayer::new(store.clone(), key.clone(), &SessionConfig::default());

        let hits = Arc::new(AtomicUsize::new(0));
        let counter = hits.clone();
        let admin = admin_routes().route(
            "/admin/probe",
            get(move || {
                let counter = counter.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    "probe"
                }
            }),
        );

        Harness {
            app: build(state, sessions, admin),
            store,
            key,
            hits,
        }
    }

    impl Harness {
        /// Stores a session and returns the matching signed cookie.
        async fn session_cookie(&self, data: SessionData) -> (SessionId, String) {
            let id = SessionId::generate();
            self.store.save(&id, &data).await.expect("save");

            let response = SignedCookieJar::new(self.key.clone())
                .add(Cookie::new(SESSION_COOKIE, id.to_string()))
                .into_response();
            (id, cookie_pair(response.headers()).expect("cookie"))
        }

        /// Resolves the session id carried by a `name=value` cookie pair.
        fn session_id(&self, cookie: &str) -> SessionId {
            let mut headers = HeaderMap::new();
            headers.insert(header::COOKIE, HeaderValue::from_str(cookie).expect("header"));
            let jar = SignedCookieJar::from_headers(&headers, self.key.clone());
            SessionId::new(jar.get(SESSION_COOKIE).expect("signed cookie").value())
        }

        async fn stored(&self, id: &SessionId) -> Option<SessionData> {
            self.store.load(id).await.expect("load")
        }

        async fn get(&self, uri: &str, cookie: Option<&str>) -> Response {
            let mut request = Request::builder().uri(uri);
            if let Some(cookie) = cookie {
                request = request.header(header::COOKIE, cookie);
            }
            self.app
                .clone()
                .oneshot(request.body(Body::empty()).expect("request"))
                .await
                .expect("response")
        }

        async fn post_form(&self, uri: &str, form: &str, cookie: Option<&str>) -> Response {
            let mut request = Request::builder()
                .method("POST")
                .uri(uri)
                .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded");
            if let Some(cookie) = cookie {
                request = request.header(header::COOKIE, cookie);
            }
            self.app
                .clone()
                .oneshot(request.body(Body::from(form.to_string())).expect("request"))
                .await
                .expect("response")
        }
    }

    fn logged_in(user: &str, is_admin: bool) -> SessionData {
        SessionData {
            logged_in: true,
            is_admin,
            user_identifier: UserIdentifier::new(user),
            ..SessionData::default()
        }
    }

    /// First `name=value` pair of the session Set-Cookie header.
    fn cookie_pair(headers: &HeaderMap) -> Option<String> {
        headers
            .get_all(header::SET_COOKIE)
            .iter()
            .filter_map(|value| value.to_str().ok())
            .find(|value| value.starts_with(SESSION_COOKIE))
            .and_then(|value| value.split(';').next())
            .map(str::to_string)
    }

    fn location(response: &Response) -> &str {
        response
            .headers()
            .get(header::LOCATION)
            .and_then(|value| value.to_str().ok())
            .unwrap_or_default()
    }

    async fn body_text(response: Response) -> String {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body");
        String::from_utf8(bytes.to_vec()).expect("utf8")
    }

    #[tokio::test]
    async fn admin_route_without_session_redirects_to_login() {
        let harness = harness([]).await;

        let response = harness.get("/admin/users?page=2", None).await;

        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        assert_eq!(location(&response), "/auth/login");

        let cookie = cookie_pair(response.headers()).expect("session cookie issued");
        let session = harness
            .stored(&harness.session_id(&cookie))
            .await
            .expect("session stored");
        assert!(!session.logged_in);
        assert_eq!(session.deep_link.as_deref(), Some("/admin/users?page=2"));
    }

    #[tokio::test]
    async fn non_admin_is_unauthorized_without_redirect() {
        let harness = harness([User::new("bob")]).await;
        let (_, cookie) = harness.session_cookie(logged_in("bob", false)).await;

        let response = harness.get("/admin/probe", Some(&cookie)).await;

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert!(response.headers().get(header::LOCATION).is_none());
        assert_eq!(harness.hits.load(Ordering::SeqCst), 0);
        assert!(body_text(response).await.contains("not enough permissions"));
    }

    #[tokio::test]
    async fn inactive_admin_session_is_destroyed() {
        let harness = harness([User::new("root").with_admin(true).with_disabled(true)]).await;
        let (id, cookie) = harness.session_cookie(logged_in("root", true)).await;

        let response = harness.get("/admin/probe", Some(&cookie)).await;

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(harness.hits.load(Ordering::SeqCst), 0);
        assert!(body_text(response).await.contains("session no longer available"));
        assert!(harness.stored(&id).await.is_none());

        // Replaying the old cookie now looks like a fresh visitor.
        let replay = harness.get("/admin/probe", Some(&cookie)).await;
        assert_eq!(replay.status(), StatusCode::SEE_OTHER);
        assert_eq!(location(&replay), "/auth/login");
    }

    #[tokio::test]
    async fn unknown_admin_user_is_treated_as_inactive() {
        let harness = harness([]).await;
        let (id, cookie) = harness.session_cookie(logged_in("ghost", true)).await;

        let response = harness.get("/admin/", Some(&cookie)).await;

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert!(harness.stored(&id).await.is_none());
    }

    #[tokio::test]
    async fn active_admin_reaches_handler_once() {
        let harness = harness([User::new("root").with_admin(true)]).await;
        let (_, cookie) = harness.session_cookie(logged_in("root", true)).await;

        let response = harness.get("/admin/probe", Some(&cookie)).await;

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_text(response).await, "probe");
        assert_eq!(harness.hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn unknown_route_reports_not_found() {
        let harness = harness([]).await;
        let (id, cookie) = harness.session_cookie(SessionData::default()).await;

        let response = harness.get("/does/not/exist", Some(&cookie)).await;
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        assert_eq!(location(&response), "/oops");

        let error = harness
            .stored(&id)
            .await
            .and_then(|session| session.error)
            .expect("pending error");
        assert_eq!(error.code, 404);
        assert_eq!(error.path, "/");
        assert_eq!(error.details, "Requested page /does/not/exist not found");

        let page = harness.get("/oops", Some(&cookie)).await;
        assert_eq!(page.status(), StatusCode::NOT_FOUND);
        assert!(body_text(page).await.contains("end of the internet"));

        // Shown once.
        let again = harness.get("/oops", Some(&cookie)).await;
        assert_eq!(again.status(), StatusCode::SEE_OTHER);
        assert_eq!(location(&again), "/");
    }

    #[tokio::test]
    async fn oauth_login_round_trip_returns_to_deep_link() {
        let harness = harness([User::new("alice").with_admin(true)]).await;

        let first = harness.get("/admin/users", None).await;
        let cookie = cookie_pair(first.headers()).expect("cookie");
        let id = harness.session_id(&cookie);

        let start = harness.get("/auth/login/STUB", Some(&cookie)).await;
        assert_eq!(start.status(), StatusCode::SEE_OTHER);
        assert_eq!(location(&start), "https://idp.example.com/authorize");
        let pending = harness
            .stored(&id)
            .await
            .and_then(|session| session.pending_login)
            .expect("pending login");
        assert_eq!(pending.provider.as_str(), "stub");

        let callback = harness
            .get(
                &format!("/auth/login/stub/callback?code=alice&state={STUB_STATE}"),
                Some(&cookie),
            )
            .await;
        assert_eq!(callback.status(), StatusCode::SEE_OTHER);
        assert_eq!(location(&callback), "/admin/users");

        let login_cookie = cookie_pair(callback.headers()).expect("fresh cookie");
        let login_id = harness.session_id(&login_cookie);
        assert_ne!(login_id, id);
        assert!(harness.stored(&id).await.is_none());

        let session = harness.stored(&login_id).await.expect("session");
        assert!(session.logged_in);
        assert!(session.is_admin);
        assert!(session.pending_login.is_none());
        assert!(session.deep_link.is_none());

        let page = harness.get("/admin/users", Some(&login_cookie)).await;
        assert_eq!(page.status(), StatusCode::OK);

        // The pre-login cookie does not ride along.
        let stale = harness.get("/admin/users", Some(&cookie)).await;
        assert_eq!(location(&stale), "/auth/login");
    }

    #[tokio::test]
    async fn callback_with_wrong_state_is_rejected() {
        let harness = harness([User::new("alice")]).await;
        let (id, cookie) = harness.session_cookie(SessionData::default()).await;
        harness.get("/auth/login/stub", Some(&cookie)).await;

        let response = harness
            .get("/auth/login/stub/callback?code=alice&state=forged", Some(&cookie))
            .await;

        assert_eq!(location(&response), "/oops");
        let session = harness.stored(&id).await.expect("session");
        assert!(!session.logged_in);
        assert!(session.pending_login.is_none());
        let error = session.error.expect("error");
        assert_eq!(error.code, 400);
        assert_eq!(error.path, "/auth/login/stub/callback");
    }

    #[tokio::test]
    async fn provider_login_of_unknown_user_is_refused() {
        let harness = harness([]).await;
        let (id, cookie) = harness.session_cookie(SessionData::default()).await;
        harness.get("/auth/login/stub", Some(&cookie)).await;

        let response = harness
            .get(
                &format!("/auth/login/stub/callback?code=mallory&state={STUB_STATE}"),
                Some(&cookie),
            )
            .await;

        assert_eq!(location(&response), "/oops");
        let session = harness.stored(&id).await.expect("session");
        assert!(!session.logged_in);
        assert_eq!(session.error.map(|e| e.code), Some(401));
    }

    #[tokio::test]
    async fn unknown_provider_reports_not_found() {
        let harness = harness([]).await;
        let (id, cookie) = harness.session_cookie(SessionData::default()).await;

        let response = harness.get("/auth/login/nope", Some(&cookie)).await;

        assert_eq!(location(&response), "/oops");
        let error = harness
            .stored(&id)
            .await
            .and_then(|session| session.error)
            .expect("error");
        assert_eq!(error.code, 404);
        assert_eq!(error.path, "/");
    }

    #[tokio::test]
    async fn credential_login_uses_directory_and_backend() {
        let harness = harness([User::new("carol")]).await;
        let (id, cookie) = harness.session_cookie(SessionData::default()).await;

        let denied = harness
            .post_form("/auth/login", "username=carol&password=wrong", Some(&cookie))
            .await;
        assert_eq!(location(&denied), "/oops");
        assert_eq!(
            harness.stored(&id).await.and_then(|s| s.error).map(|e| e.code),
            Some(401)
        );

        let accepted = harness
            .post_form("/auth/login", "username=carol&password=secret", Some(&cookie))
            .await;
        assert_eq!(location(&accepted), "/");
        let login_cookie = cookie_pair(accepted.headers()).expect("fresh cookie");
        let login_id = harness.session_id(&login_cookie);
        assert_ne!(login_id, id);
        assert!(harness.stored(&id).await.is_none());

        let session = harness.stored(&login_id).await.expect("session");
        assert!(session.logged_in);
        assert!(!session.is_admin);
        assert_eq!(session.provider.as_ref().map(|p| p.as_str()), Some("ldap://stub"));
    }

    #[tokio::test]
    async fn login_page_lists_providers() {
        let harness = harness([]).await;

        let response = harness.get("/auth/login", None).await;
        assert_eq!(response.status(), StatusCode::OK);

        let page: serde_json::Value =
            serde_json::from_str(&body_text(response).await).expect("json");
        assert_eq!(page["credentials_enabled"], true);
        assert_eq!(page["providers"][0]["id"], "stub");
        assert_eq!(page["providers"][0]["name"], "Stub Login");
        assert_eq!(page["providers"][0]["type"], "oauth");
    }

    #[tokio::test]
    async fn logout_destroys_session() {
        let harness = harness([User::new("root").with_admin(true)]).await;
        let (id, cookie) = harness.session_cookie(logged_in("root", true)).await;

        let response = harness.get("/auth/logout", Some(&cookie)).await;

        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        assert_eq!(location(&response), "/");
        assert!(harness.stored(&id).await.is_none());

        let replay = harness.get("/admin/", Some(&cookie)).await;
        assert_eq!(location(&replay), "/auth/login");
    }

    #[tokio::test]
    async fn index_reports_login_state() {
        let harness = harness([]).await;
        let (_, cookie) = harness.session_cookie(logged_in("root", true)).await;

        let anonymous: serde_json::Value =
            serde_json::from_str(&body_text(harness.get("/", None).await).await).expect("json");
        assert_eq!(anonymous["logged_in"], false);
        assert_eq!(anonymous["site_title"], "WireGuard VPN");

        let known: serde_json::Value =
            serde_json::from_str(&body_text(harness.get("/", Some(&cookie)).await).await)
                .expect("json");
        assert_eq!(known["logged_in"], true);
        assert_eq!(known["user"]["identifier"], "root");
    }

    #[tokio::test]
    async fn login_does_not_adopt_planted_session_id() {
        let harness = harness([User::new("carol")]).await;

        // A cookie obtained anonymously and handed to someone else.
        let first = harness.get("/admin/", None).await;
        let planted = cookie_pair(first.headers()).expect("cookie");
        let planted_id = harness.session_id(&planted);

        let accepted = harness
            .post_form("/auth/login", "username=carol&password=secret", Some(&planted))
            .await;
        assert_eq!(location(&accepted), "/admin/");

        let login_cookie = cookie_pair(accepted.headers()).expect("fresh cookie");
        assert_ne!(harness.session_id(&login_cookie), planted_id);
        assert!(harness.stored(&planted_id).await.is_none());

        let index: serde_json::Value =
            serde_json::from_str(&body_text(harness.get("/", Some(&planted)).await).await)
                .expect("json");
        assert_eq!(index["logged_in"], false);
    }

    #[tokio::test]
    async fn anonymous_sessions_are_cleaned_up_after_expiry() {
        let harness = harness_with_ttl([], Duration::ZERO).await;

        for i in 0..20 {
            let response = harness.get(&format!("/nope/{i}"), None).await;
            assert_eq!(location(&response), "/oops");
        }
        assert_eq!(harness.store.len().await, 20);

        assert_eq!(harness.store.delete_expired().await.expect("cleanup"), 20);
        assert!(harness.store.is_empty().await);
    }

    #[tokio::test]
    async fn admin_without_trailing_slash_enters_admin_group() {
        let harness = harness([]).await;

        let response = harness.get("/admin", None).await;
        assert_eq!(response.status(), StatusCode::PERMANENT_REDIRECT);
        assert_eq!(location(&response), "/admin/");

        let guarded = harness.get("/admin/", None).await;
        assert_eq!(location(&guarded), "/auth/login");
    }
}
