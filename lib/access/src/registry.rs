//! The authenticator registry.
//!
//! Built once at startup from [`AuthConfig`] and read-only afterwards.
//! OIDC and plain OAuth providers share one namespace keyed by lower-cased
//! provider name; LDAP providers have their own, keyed by lower-cased URL.

use rootcause::Report;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{info, instrument};
use url::Url;
use wg_portal_core::ProviderId;

use crate::authenticator::{AuthenticatorFactory, LdapAuthenticator, OauthAuthenticator};
use crate::config::AuthConfig;
use crate::error::{AuthenticationError, ProviderFamily, SetupError};

/// Time budget for constructing all configured providers.
pub const SETUP_TIMEOUT: Duration = Duration::from_secs(10);

/// Configured authenticators, indexed by provider identifier.
#[derive(Default)]
pub struct AuthenticatorRegistry {
    oauth: HashMap<ProviderId, Arc<dyn OauthAuthenticator>>,
    ldap: HashMap<ProviderId, Arc<dyn LdapAuthenticator>>,
    /// LDAP identifiers in configuration order.
    ldap_order: Vec<ProviderId>,
}

impl std::fmt::Debug for AuthenticatorRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthenticatorRegistry")
            .field("oauth", &self.oauth.keys().collect::<Vec<_>>())
            .field("ldap", &self.ldap_order)
            .finish()
    }
}

impl AuthenticatorRegistry {
    /// Builds the registry with the default [`SETUP_TIMEOUT`].
    ///
    /// # Errors
    ///
    /// Fails on a malformed external URL, a duplicate provider identifier,
    /// a failing provider constructor or an exceeded deadline. No partial
    /// registry is returned.
    pub async fn setup(
        config: &AuthConfig,
        external_url: &str,
        factory: &dyn AuthenticatorFactory,
    ) -> wg_portal_core::Result<Self, SetupError> {
        Self::setup_with_timeout(config, external_url, factory, SETUP_TIMEOUT).await
    }

    /// Builds the registry, giving all provider constructors together
    /// `timeout` to finish.
    #[instrument(skip(config, factory), fields(
        oidc = config.oidc.len(),
        oauth = config.oauth.len(),
        ldap = config.ldap.len(),
    ))]
    pub async fn setup_with_timeout(
        config: &AuthConfig,
        external_url: &str,
        factory: &dyn AuthenticatorFactory,
        timeout: Duration,
    ) -> wg_portal_core::Result<Self, SetupError> {
        let base_url = Url::parse(external_url).map_err(|e| SetupError::InvalidExternalUrl {
            url: external_url.to_string(),
            reason: e.to_string(),
        })?;
        let deadline = Instant::now() + timeout;
        let mut registry = Self::default();

        for provider in &config.oidc {
            let id = ProviderId::normalize(&provider.provider_name);
            registry.ensure_oauth_vacant(ProviderFamily::Oidc, &id)?;

            let callback = callback_url(&base_url, &id);
            let authenticator = within_deadline(
                deadline,
                ProviderFamily::Oidc,
                &provider.provider_name,
                factory.oidc(&callback, provider),
            )
            .await?;

            info!(provider = %id, callback = %callback, "registered OIDC authentication provider");
            registry.oauth.insert(id, authenticator);
        }

        for provider in &config.oauth {
            let id = ProviderId::normalize(&provider.provider_name);
            registry.ensure_oauth_vacant(ProviderFamily::OAuth, &id)?;

            let callback = callback_url(&base_url, &id);
            let authenticator = within_deadline(
                deadline,
                ProviderFamily::OAuth,
                id.as_str(),
                factory.oauth(&callback, provider),
            )
            .await?;

            info!(provider = %id, callback = %callback, "registered OAuth authentication provider");
            registry.oauth.insert(id, authenticator);
        }

        for provider in &config.ldap {
            let id = ProviderId::normalize(&provider.url);
            if registry.ldap.contains_key(&id) {
                return Err(SetupError::DuplicateProvider {
                    family: ProviderFamily::Ldap,
                    provider: id.to_string(),
                }
                .into());
            }

            let authenticator = within_deadline(
                deadline,
                ProviderFamily::Ldap,
                id.as_str(),
                factory.ldap(provider),
            )
            .await?;

            info!(provider = %id, "registered LDAP authentication provider");
            registry.ldap.insert(id.clone(), authenticator);
            registry.ldap_order.push(id);
        }

        Ok(registry)
    }

    fn ensure_oauth_vacant(
        &self,
        family: ProviderFamily,
        id: &ProviderId,
    ) -> Result<(), Report<SetupError>> {
        if self.oauth.contains_key(id) {
            return Err(SetupError::DuplicateProvider {
                family,
                provider: id.to_string(),
            }
            .into());
        }
        Ok(())
    }

    /// Looks up an OIDC or OAuth authenticator, ignoring case.
    #[must_use]
    pub fn oauth(&self, provider: &str) -> Option<&Arc<dyn OauthAuthenticator>> {
        self.oauth.get(&ProviderId::normalize(provider))
    }

    /// OIDC and OAuth providers with their display names, sorted by id.
    #[must_use]
    pub fn oauth_providers(&self) -> Vec<(&ProviderId, &str)> {
        let mut providers: Vec<_> = self
            .oauth
            .iter()
            .map(|(id, authenticator)| (id, authenticator.display_name()))
            .collect();
        providers.sort_by(|a, b| a.0.cmp(b.0));
        providers
    }

    /// LDAP authenticators in configuration order.
    pub fn ldap_authenticators(
        &self,
    ) -> impl Iterator<Item = (&ProviderId, &Arc<dyn LdapAuthenticator>)> {
        self.ldap_order
            .iter()
            .filter_map(|id| self.ldap.get(id).map(|authenticator| (id, authenticator)))
    }

    /// Returns true if at least one LDAP provider is configured.
    #[must_use]
    pub fn has_ldap(&self) -> bool {
        !self.ldap.is_empty()
    }
}

/// Builds the callback URL for a redirect-based provider.
///
/// The path `/auth/login/{provider}/callback` is appended to the external
/// URL's own path, so portals served below a prefix keep it.
#[must_use]
pub fn callback_url(external_url: &Url, provider: &ProviderId) -> String {
    let mut url = external_url.clone();
    let base = url.path().trim_end_matches('/').to_string();
    url.set_path(&format!("{base}/auth/login/{provider}/callback"));
    url.set_query(None);
    url.set_fragment(None);
    url.to_string()
}

async fn within_deadline<T>(
    deadline: Instant,
    family: ProviderFamily,
    provider: &str,
    construct: impl Future<Output = Result<T, Report<AuthenticationError>>>,
) -> Result<T, Report<SetupError>> {
    match tokio::time::timeout_at(deadline, construct).await {
        Ok(Ok(authenticator)) => Ok(authenticator),
        Ok(Err(err)) => Err(err.context(SetupError::ProviderSetupFailed {
            family,
            provider: provider.to_string(),
        })),
        Err(_) => Err(SetupError::SetupTimeout {
            family,
            provider: provider.to_string(),
        }
        .into()),
    }
}
