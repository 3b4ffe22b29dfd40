//! Builds the concrete authenticators for the registry.

use async_trait::async_trait;
use rootcause::Report;
use std::sync::Arc;
use wg_portal_access::{
    AuthenticationError, AuthenticatorFactory, LdapAuthenticator, LdapProviderConfig,
    OauthAuthenticator, OauthProviderConfig, OidcProviderConfig,
};

use super::ldap::LdapDirectory;
use super::oauth::PlainOauthAuthenticator;
use super::oidc::OidcAuthenticator;

/// Factory backed by the network-facing authenticator implementations.
///
/// All redirect-based providers share one HTTP client.
#[derive(Clone)]
pub struct ProviderFactory {
    http_client: reqwest::Client,
}

impl ProviderFactory {
    /// Creates the factory and its HTTP client.
    ///
    /// Redirects are not followed, as required for OAuth token endpoints.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new() -> Result<Self, Report<AuthenticationError>> {
        let http_client = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .map_err(|e| AuthenticationError::Configuration {
                reason: format!("failed to create HTTP client: {e}"),
            })?;
        Ok(Self { http_client })
    }
}

#[async_trait]
impl AuthenticatorFactory for ProviderFactory {
    async fn oidc(
        &self,
        callback_url: &str,
        config: &OidcProviderConfig,
    ) -> Result<Arc<dyn OauthAuthenticator>, Report<AuthenticationError>> {
        let authenticator =
            OidcAuthenticator::discover(self.http_client.clone(), callback_url, config).await?;
        Ok(Arc::new(authenticator))
    }

    async fn oauth(
        &self,
        callback_url: &str,
        config: &OauthProviderConfig,
    ) -> Result<Arc<dyn OauthAuthenticator>, Report<AuthenticationError>> {
        let authenticator =
            PlainOauthAuthenticator::new(self.http_client.clone(), callback_url, config)?;
        Ok(Arc::new(authenticator))
    }

    async fn ldap(
        &self,
        config: &LdapProviderConfig,
    ) -> Result<Arc<dyn LdapAuthenticator>, Report<AuthenticationError>> {
        let authenticator = LdapDirectory::connect(config).await?;
        Ok(Arc::new(authenticator))
    }
}
