//! LDAP authenticator using the ldap3 crate.
//!
//! Credentials are checked in three steps on one connection: bind with the
//! service account, search the user with the configured filter, then bind
//! again as the user's DN with the supplied password.

use async_trait::async_trait;
use ldap3::{Ldap, LdapConnAsync, LdapConnSettings, Scope, SearchEntry, ldap_escape};
use rootcause::Report;
use std::time::Duration;
use tracing::{debug, instrument, warn};
use wg_portal_access::config::LOGIN_PLACEHOLDER;
use wg_portal_access::{
    AuthenticationError, AuthenticatorUserInfo, LdapAuthenticator, LdapProviderConfig,
};
use wg_portal_core::UserIdentifier;

/// Connection timeout for each LDAP connection.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Authenticator backed by an LDAP directory.
pub struct LdapDirectory {
    config: LdapProviderConfig,
}

impl LdapDirectory {
    /// Creates the authenticator after a test bind with the service account.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory is unreachable or rejects the
    /// service account.
    #[instrument(skip(config), fields(url = %config.url))]
    pub async fn connect(
        config: &LdapProviderConfig,
    ) -> Result<Self, Report<AuthenticationError>> {
        let directory = Self {
            config: config.clone(),
        };

        let mut ldap = directory.open().await?;
        directory.bind_service(&mut ldap).await?;
        if let Err(e) = ldap.unbind().await {
            debug!(error = %e, "LDAP unbind failed");
        }

        Ok(directory)
    }

    fn provider_error(&self, reason: String) -> AuthenticationError {
        AuthenticationError::ProviderError {
            provider: self.config.url.clone(),
            reason,
        }
    }

    async fn open(&self) -> Result<Ldap, AuthenticationError> {
        let settings = LdapConnSettings::new()
            .set_conn_timeout(CONNECT_TIMEOUT)
            .set_starttls(self.config.start_tls);

        let (conn, ldap) = LdapConnAsync::with_settings(settings, &self.config.url)
            .await
            .map_err(|e| self.provider_error(format!("failed to connect: {e}")))?;

        tokio::spawn(async move {
            if let Err(e) = conn.drive().await {
                warn!(error = %e, "LDAP connection terminated");
            }
        });

        Ok(ldap)
    }

    async fn bind_service(&self, ldap: &mut Ldap) -> Result<(), AuthenticationError> {
        ldap.simple_bind(&self.config.bind_user, &self.config.bind_pass)
            .await
            .and_then(|result| result.success())
            .map_err(|e| self.provider_error(format!("service account bind failed: {e}")))?;
        Ok(())
    }

    async fn find_user(
        &self,
        ldap: &mut Ldap,
        username: &str,
    ) -> Result<SearchEntry, AuthenticationError> {
        let filter = login_filter(&self.config.login_filter, username);
        let fields = &self.config.field_map;
        let attributes = vec![
            fields.user_identifier.as_str(),
            fields.email.as_str(),
            fields.firstname.as_str(),
            fields.lastname.as_str(),
            fields.group_membership.as_str(),
        ];

        let (entries, _) = ldap
            .search(&self.config.base_dn, Scope::Subtree, &filter, attributes)
            .await
            .and_then(|result| result.success())
            .map_err(|e| self.provider_error(format!("user search failed: {e}")))?;

        let mut entries = entries.into_iter();
        match (entries.next(), entries.next()) {
            (Some(entry), None) => Ok(SearchEntry::construct(entry)),
            (None, _) => Err(AuthenticationError::UserNotFound {
                username: username.to_string(),
            }),
            (Some(_), Some(_)) => Err(self.provider_error(format!(
                "login filter matched more than one entry for {username}"
            ))),
        }
    }
}

#[async_trait]
impl LdapAuthenticator for LdapDirectory {
    fn url(&self) -> &str {
        &self.config.url
    }

    #[instrument(skip(self, password), fields(url = %self.config.url))]
    async fn validate_credentials(
        &self,
        username: &str,
        password: &str,
    ) -> Result<AuthenticatorUserInfo, Report<AuthenticationError>> {
        // An empty password would be an unauthenticated bind, which most
        // servers accept.
        if username.is_empty() || password.is_empty() {
            return Err(AuthenticationError::InvalidCredentials.into());
        }

        let mut ldap = self.open().await?;
        self.bind_service(&mut ldap).await?;
        let entry = self.find_user(&mut ldap, username).await?;

        let user_bind = ldap.simple_bind(&entry.dn, password).await;

        if let Err(e) = ldap.unbind().await {
            debug!(error = %e, "LDAP unbind failed");
        }

        let user_bind =
            user_bind.map_err(|e| self.provider_error(format!("user bind failed: {e}")))?;
        if user_bind.rc != 0 {
            debug!(dn = %entry.dn, rc = user_bind.rc, "user bind rejected");
            return Err(AuthenticationError::InvalidCredentials.into());
        }

        Ok(map_entry(&entry, &self.config)?)
    }
}

/// Substitutes the escaped login name into the configured filter.
fn login_filter(template: &str, username: &str) -> String {
    template.replace(LOGIN_PLACEHOLDER, &ldap_escape(username))
}

/// Case-insensitive attribute lookup.
fn attribute<'a>(entry: &'a SearchEntry, name: &str) -> &'a [String] {
    entry
        .attrs
        .iter()
        .find(|(key, _)| key.eq_ignore_ascii_case(name))
        .map(|(_, values)| values.as_slice())
        .unwrap_or_default()
}

fn first_value(entry: &SearchEntry, name: &str) -> Option<String> {
    attribute(entry, name)
        .iter()
        .find(|value| !value.is_empty())
        .cloned()
}

/// Maps a directory entry to user attributes.
fn map_entry(
    entry: &SearchEntry,
    config: &LdapProviderConfig,
) -> Result<AuthenticatorUserInfo, AuthenticationError> {
    let fields = &config.field_map;

    let identifier = first_value(entry, &fields.user_identifier).ok_or_else(|| {
        AuthenticationError::MissingClaim {
            claim: fields.user_identifier.clone(),
        }
    })?;

    let is_admin = config.admin_group_dn.as_deref().is_some_and(|admin_group| {
        attribute(entry, &fields.group_membership)
            .iter()
            .any(|group| group.eq_ignore_ascii_case(admin_group))
    });

    Ok(AuthenticatorUserInfo {
        identifier: UserIdentifier::new(identifier),
        email: first_value(entry, &fields.email),
        firstname: first_value(entry, &fields.firstname),
        lastname: first_value(entry, &fields.lastname),
        is_admin,
    })
}
