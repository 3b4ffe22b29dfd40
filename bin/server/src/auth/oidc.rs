//! OIDC authenticator using the openidconnect crate.

use async_trait::async_trait;
use base64::Engine;
use openidconnect::core::{
    CoreAuthenticationFlow, CoreClient, CoreProviderMetadata, CoreTokenResponse,
};
use openidconnect::{
    AuthorizationCode, ClientId, ClientSecret, CsrfToken, IssuerUrl, Nonce, PkceCodeChallenge,
    PkceCodeVerifier, RedirectUrl, Scope, TokenResponse,
};
use rootcause::Report;
use serde_json::Value;
use tracing::{debug, instrument};
use wg_portal_access::authenticator::map_claims;
use wg_portal_access::{
    AuthenticationError, AuthenticatorType, AuthenticatorUserInfo, LoginInitiation,
    OauthAuthenticator, OidcProviderConfig, PendingLogin,
};

/// Authenticator for an OpenID Connect provider.
pub struct OidcAuthenticator {
    provider_metadata: CoreProviderMetadata,
    client_id: ClientId,
    client_secret: ClientSecret,
    redirect_url: RedirectUrl,
    http_client: reqwest::Client,
    config: OidcProviderConfig,
}

impl OidcAuthenticator {
    /// Creates the authenticator by discovering the provider metadata.
    ///
    /// # Errors
    ///
    /// Returns an error if a URL is invalid or discovery fails.
    #[instrument(skip(http_client, config), fields(provider = %config.provider_name))]
    pub async fn discover(
        http_client: reqwest::Client,
        callback_url: &str,
        config: &OidcProviderConfig,
    ) -> Result<Self, Report<AuthenticationError>> {
        let issuer_url = IssuerUrl::new(config.base_url.clone()).map_err(|e| {
            AuthenticationError::Configuration {
                reason: format!("invalid issuer URL: {e}"),
            }
        })?;

        let redirect_url = RedirectUrl::new(callback_url.to_string()).map_err(|e| {
            AuthenticationError::Configuration {
                reason: format!("invalid redirect URL: {e}"),
            }
        })?;

        let provider_metadata = CoreProviderMetadata::discover_async(issuer_url, &http_client)
            .await
            .map_err(|e| AuthenticationError::ProviderError {
                provider: config.provider_name.clone(),
                reason: format!("failed to discover provider: {e}"),
            })?;
        debug!("discovered OIDC provider metadata");

        Ok(Self {
            provider_metadata,
            client_id: ClientId::new(config.client_id.clone()),
            client_secret: ClientSecret::new(config.client_secret.clone()),
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
}

#[async_trait]
impl OauthAuthenticator for OidcAuthenticator {
    fn display_name(&self) -> &str {
        self.config.display_name()
    }

    fn authenticator_type(&self) -> AuthenticatorType {
        AuthenticatorType::Oidc
    }

    fn initiate_login(&self) -> LoginInitiation {
        let client = CoreClient::from_provider_metadata(
            self.provider_metadata.clone(),
            self.client_id.clone(),
            Some(self.client_secret.clone()),
        )
        .set_redirect_uri(self.redirect_url.clone());
        let (pkce_challenge, pkce_verifier) = PkceCodeChallenge::new_random_sha256();

        let mut auth_request = client
            .authorize_url(
                CoreAuthenticationFlow::AuthorizationCode,
                CsrfToken::new_random,
                Nonce::new_random,
            )
            .set_pkce_challenge(pkce_challenge);

        // openid is implied by the flow
        for scope in self.config.scopes().into_iter().filter(|s| *s != "openid") {
            auth_request = auth_request.add_scope(Scope::new(scope.to_string()));
        }

        let (auth_url, csrf_token, nonce) = auth_request.url();

        LoginInitiation {
            authorization_url: auth_url.to_string(),
            state: csrf_token.secret().clone(),
            nonce: Some(nonce.secret().clone()),
            pkce_verifier: pkce_verifier.secret().clone(),
        }
    }

    async fn handle_callback(
        &self,
        code: &str,
        pending: &PendingLogin,
    ) -> Result<AuthenticatorUserInfo, Report<AuthenticationError>> {
        let client = CoreClient::from_provider_metadata(
            self.provider_metadata.clone(),
            self.client_id.clone(),
            Some(self.client_secret.clone()),
        )
        .set_redirect_uri(self.redirect_url.clone());

        let token_request = client
            .exchange_code(AuthorizationCode::new(code.to_string()))
            .map_err(|e| self.provider_error(format!("token endpoint error: {e}")))?;

        let token_response: CoreTokenResponse = token_request
            .set_pkce_verifier(PkceCodeVerifier::new(pending.pkce_verifier.clone()))
            .request_async(&self.http_client)
            .await
            .map_err(|e| self.provider_error(format!("token exchange failed: {e}")))?;

        let id_token = token_response
            .id_token()
            .ok_or_else(|| AuthenticationError::InvalidToken {
                reason: "no ID token in response".to_string(),
            })?;

        let nonce = pending
            .nonce
            .clone()
            .ok_or_else(|| AuthenticationError::InvalidToken {
                reason: "no nonce stored for this login".to_string(),
            })?;
        id_token
            .claims(&client.id_token_verifier(), &Nonce::new(nonce))
            .map_err(|e| AuthenticationError::InvalidToken {
                reason: format!("ID token validation failed: {e}"),
            })?;

        // Custom claims (admin flag, renamed fields) are only reachable
        // through the raw payload.
        let payload = raw_id_token_payload(&token_response)?;
        Ok(map_claims(&payload, &self.config.field_map)?)
    }
}

/// Decodes the payload of the ID token carried in a token response.
///
/// Callers must have verified the token's signature and nonce already.
fn raw_id_token_payload<TR>(token_response: &TR) -> Result<Value, AuthenticationError>
where
    TR: serde::Serialize,
{
    let response_json =
        serde_json::to_value(token_response).map_err(|e| AuthenticationError::InvalidToken {
            reason: format!("failed to serialize token response: {e}"),
        })?;

    let id_token = response_json
        .get("id_token")
        .and_then(Value::as_str)
        .ok_or_else(|| AuthenticationError::InvalidToken {
            reason: "no id_token in response".to_string(),
        })?;

    decode_jwt_payload(id_token)
}

/// Decodes the JSON payload of a compact JWT without checking its signature.
fn decode_jwt_payload(jwt: &str) -> Result<Value, AuthenticationError> {
    // header.payload.signature
    let parts: Vec<&str> = jwt.split('.').collect();
    if parts.len() != 3 {
        return Err(AuthenticationError::InvalidToken {
            reason: "invalid JWT format".to_string(),
        });
    }

    let payload_bytes = base64::engine::general_purpose::URL_SAFE_NO_PAD
        .decode(parts[1])
        .map_err(|e| AuthenticationError::InvalidToken {
            reason: format!("failed to decode JWT payload: {e}"),
        })?;

    serde_json::from_slice(&payload_bytes).map_err(|e| AuthenticationError::InvalidToken {
        reason: format!("failed to parse JWT payload: {e}"),
    })
}
