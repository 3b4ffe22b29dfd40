//! Plain OAuth2 authenticator.
//!
//! For providers without OIDC discovery: the endpoints come from
//! configuration and the user's profile is fetched from a user-info URL
//! with the access token.

use async_trait::async_trait;
use oauth2::{
    AuthUrl, AuthorizationCode, ClientId, ClientSecret, CsrfToken, PkceCodeChallenge,
    PkceCodeVerifier, RedirectUrl, Scope, TokenResponse, TokenUrl,
    basic::{BasicClient, BasicTokenResponse},
};
use reqwest::header;
use rootcause::Report;
use serde_json::Value;
use wg_portal_access::authenticator::map_claims;
use wg_portal_access::{
    AuthenticationError, AuthenticatorType, AuthenticatorUserInfo, LoginInitiation,
    OauthAuthenticator, OauthProviderConfig, PendingLogin,
};

/// Authenticator for a generic OAuth2 provider.
pub struct PlainOauthAuthenticator {
    client_id: ClientId,
    client_secret: ClientSecret,
    auth_url: AuthUrl,
    token_url: TokenUrl,
    redirect_url: RedirectUrl,
    http_client: reqwest::Client,
    config: OauthProviderConfig,
}

impl PlainOauthAuthenticator {
    /// Creates a new authenticator from configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if one of the configured URLs is invalid.
    pub fn new(
        http_client: reqwest::Client,
        callback_url: &str,
        config: &OauthProviderConfig,
    ) -> Result<Self, Report<AuthenticationError>> {
        let auth_url = AuthUrl::new(config.auth_url.clone()).map_err(|e| {
            AuthenticationError::Configuration {
                reason: format!("invalid auth URL: {e}"),
            }
        })?;
        let token_url = TokenUrl::new(config.token_url.clone()).map_err(|e| {
            AuthenticationError::Configuration {
                reason: format!("invalid token URL: {e}"),
            }
        })?;
        let redirect_url = RedirectUrl::new(callback_url.to_string()).map_err(|e| {
            AuthenticationError::Configuration {
                reason: format!("invalid redirect URL: {e}"),
            }
        })?;
        url::Url::parse(&config.user_info_url).map_err(|e| {
            AuthenticationError::Configuration {
                reason: format!("invalid user info URL: {e}"),
            }
        })?;

        Ok(Self {
            client_id: ClientId::new(config.client_id.clone()),
            client_secret: ClientSecret::new(config.client_secret.clone()),
            auth_url,
            token_url,
            redirect_url,
            http_client,
            config: config.clone(),
        })
    }

    fn provider_error(&self, reason: String) -> AuthenticationError {
        AuthenticationError::ProviderError {
            provider: self.config.provider_name.clone(),
            reason,
        }
    }

    async fn fetch_user_info(&self, access_token: &str) -> Result<Value, AuthenticationError> {
        let response = self
            .http_client
            .get(&self.config.user_info_url)
            .bearer_auth(access_token)
            .header(header::ACCEPT, "application/json")
            .header(header::USER_AGENT, "wg-portal")
            .send()
            .await
            .map_err(|e| self.provider_error(format!("user info request failed: {e}")))?
            .error_for_status()
            .map_err(|e| self.provider_error(format!("user info request rejected: {e}")))?;

        response
            .json()
            .await
            .map_err(|e| self.provider_error(format!("invalid user info response: {e}")))
    }
}

#[async_trait]
impl OauthAuthenticator for PlainOauthAuthenticator {
    fn display_name(&self) -> &str {
        self.config.display_name()
    }

    fn authenticator_type(&self) -> AuthenticatorType {
        AuthenticatorType::OAuth
    }

    fn initiate_login(&self) -> LoginInitiation {
        let client = BasicClient::new(self.client_id.clone())
            .set_client_secret(self.client_secret.clone())
            .set_auth_uri(self.auth_url.clone())
            .set_redirect_uri(self.redirect_url.clone());

        let (pkce_challenge, pkce_verifier) = PkceCodeChallenge::new_random_sha256();

        let mut auth_request = client
            .authorize_url(CsrfToken::new_random)
            .set_pkce_challenge(pkce_challenge);

        for scope in &self.config.scopes {
            auth_request = auth_request.add_scope(Scope::new(scope.clone()));
        }

        let (auth_url, csrf_token) = auth_request.url();

        LoginInitiation {
            authorization_url: auth_url.to_string(),
            state: csrf_token.secret().clone(),
            nonce: None,
            pkce_verifier: pkce_verifier.secret().clone(),
        }
    }

    async fn handle_callback(
        &self,
        code: &str,
        pending: &PendingLogin,
    ) -> Result<AuthenticatorUserInfo, Report<AuthenticationError>> {
        let client = BasicClient::new(self.client_id.clone())
            .set_client_secret(self.client_secret.clone())
            .set_token_uri(self.token_url.clone())
            .set_redirect_uri(self.redirect_url.clone());

        let token_response: BasicTokenResponse = client
            .exchange_code(AuthorizationCode::new(code.to_string()))
            .set_pkce_verifier(PkceCodeVerifier::new(pending.pkce_verifier.clone()))
            .request_async(&self.http_client)
            .await
            .map_err(|e| self.provider_error(format!("token exchange failed: {e}")))?;

        let user_info = self
            .fetch_user_info(token_response.access_token().secret())
            .await?;
        Ok(map_claims(&user_info, &self.config.field_map)?)
    }
}
