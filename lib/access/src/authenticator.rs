//! Authenticator capabilities.
//!
//! Redirect-based providers (OIDC and plain OAuth2) implement
//! [`OauthAuthenticator`]; credential-checking providers (LDAP) implement
//! [`LdapAuthenticator`]. Concrete implementations live with the web server,
//! which also supplies the [`AuthenticatorFactory`] the registry builds them
//! through.

use async_trait::async_trait;
use rootcause::Report;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use wg_portal_core::{ProviderId, UserIdentifier};

use crate::config::{LdapProviderConfig, OauthFields, OauthProviderConfig, OidcProviderConfig};
use crate::error::AuthenticationError;
use crate::session::PendingLogin;

/// Kind of redirect-based authenticator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuthenticatorType {
    Oidc,
    OAuth,
}

/// User attributes reported by a provider after a successful login.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AuthenticatorUserInfo {
    pub identifier: UserIdentifier,
    pub email: Option<String>,
    pub firstname: Option<String>,
    pub lastname: Option<String>,
    /// Administrator flag as asserted by the provider.
    pub is_admin: bool,
}

/// Login initiation data for redirecting to a provider.
#[derive(Debug, Clone)]
pub struct LoginInitiation {
    /// The URL to redirect the user to for authentication.
    pub authorization_url: String,
    /// State parameter for CSRF protection.
    pub state: String,
    /// Nonce for ID token validation (OIDC only).
    pub nonce: Option<String>,
    /// PKCE code verifier for the token exchange.
    pub pkce_verifier: String,
}

impl LoginInitiation {
    /// Splits into the redirect URL and the state to keep in the session.
    #[must_use]
    pub fn into_pending(self, provider: ProviderId) -> (String, PendingLogin) {
        let pending = PendingLogin {
            provider,
            state: self.state,
            nonce: self.nonce,
            pkce_verifier: self.pkce_verifier,
        };
        (self.authorization_url, pending)
    }
}

/// A redirect-based identity provider.
#[async_trait]
pub trait OauthAuthenticator: Send + Sync {
    /// Name shown on the login page.
    fn display_name(&self) -> &str;

    fn authenticator_type(&self) -> AuthenticatorType;

    /// Starts a login: builds the provider URL and the state to remember.
    fn initiate_login(&self) -> LoginInitiation;

    /// Completes a login from the provider's callback.
    async fn handle_callback(
        &self,
        code: &str,
        pending: &PendingLogin,
    ) -> Result<AuthenticatorUserInfo, Report<AuthenticationError>>;
}

/// A credential-checking identity provider.
#[async_trait]
pub trait LdapAuthenticator: Send + Sync {
    /// Connection URL this authenticator talks to.
    fn url(&self) -> &str;

    /// Verifies username and password and returns the user's attributes.
    async fn validate_credentials(
        &self,
        username: &str,
        password: &str,
    ) -> Result<AuthenticatorUserInfo, Report<AuthenticationError>>;
}

/// Constructs authenticators from provider configuration.
///
/// Constructors may perform network I/O (discovery, test binds); the
/// registry bounds them with its setup deadline.
#[async_trait]
pub trait AuthenticatorFactory: Send + Sync {
    async fn oidc(
        &self,
        callback_url: &str,
        config: &OidcProviderConfig,
    ) -> Result<Arc<dyn OauthAuthenticator>, Report<AuthenticationError>>;

    async fn oauth(
        &self,
        callback_url: &str,
        config: &OauthProviderConfig,
    ) -> Result<Arc<dyn OauthAuthenticator>, Report<AuthenticationError>>;

    async fn ldap(
        &self,
        config: &LdapProviderConfig,
    ) -> Result<Arc<dyn LdapAuthenticator>, Report<AuthenticationError>>;
}

/// Maps provider claims onto portal user fields.
///
/// The identifier claim is mandatory; the others are optional. String and
/// numeric identifiers are accepted.
pub fn map_claims(
    claims: &Value,
    fields: &OauthFields,
) -> Result<AuthenticatorUserInfo, AuthenticationError> {
    let identifier = match claims.get(&fields.user_identifier) {
        Some(Value::String(s)) if !s.is_empty() => s.clone(),
        Some(Value::Number(n)) => n.to_string(),
        _ => {
            return Err(AuthenticationError::MissingClaim {
                claim: fields.user_identifier.clone(),
            });
        }
    };

    let string_claim = |name: &str| {
        claims
            .get(name)
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
    };

    Ok(AuthenticatorUserInfo {
        identifier: UserIdentifier::new(identifier),
        email: string_claim(&fields.email),
        firstname: string_claim(&fields.firstname),
        lastname: string_claim(&fields.lastname),
        is_admin: claims.get(&fields.is_admin).is_some_and(is_truthy),
    })
}

fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_i64() == Some(1),
        Value::String(s) => matches!(s.to_lowercase().as_str(), "true" | "1" | "yes"),
        _ => false,
    }
}
