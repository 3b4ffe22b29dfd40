//! Authentication provider configuration.
//!
//! One entry per configured identity provider. OIDC and plain OAuth
//! providers are keyed by `provider_name`, LDAP providers by `url`.
//!
//! Fields with defaults can be omitted when loading from a config file or
//! environment variables.

use serde::{Deserialize, Serialize};

/// All configured authentication providers, grouped by family.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AuthConfig {
    /// OpenID Connect providers.
    #[serde(default)]
    pub oidc: Vec<OidcProviderConfig>,
    /// Plain OAuth2 providers.
    #[serde(default)]
    pub oauth: Vec<OauthProviderConfig>,
    /// LDAP directories.
    #[serde(default)]
    pub ldap: Vec<LdapProviderConfig>,
}

/// Mapping from provider claims to portal user fields.
///
/// Used by both OIDC (ID token claims) and plain OAuth (user-info response).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OauthFields {
    #[serde(default = "default_oauth_identifier")]
    pub user_identifier: String,
    #[serde(default = "default_oauth_email")]
    pub email: String,
    #[serde(default = "default_oauth_firstname")]
    pub firstname: String,
    #[serde(default = "default_oauth_lastname")]
    pub lastname: String,
    /// Claim holding a boolean-like administrator flag.
    #[serde(default = "default_oauth_is_admin")]
    pub is_admin: String,
}

fn default_oauth_identifier() -> String {
    "sub".to_string()
}

fn default_oauth_email() -> String {
    "email".to_string()
}

fn default_oauth_firstname() -> String {
    "given_name".to_string()
}

fn default_oauth_lastname() -> String {
    "family_name".to_string()
}

fn default_oauth_is_admin() -> String {
    "admin_flag".to_string()
}

impl Default for OauthFields {
    fn default() -> Self {
        Self {
            user_identifier: default_oauth_identifier(),
            email: default_oauth_email(),
            firstname: default_oauth_firstname(),
            lastname: default_oauth_lastname(),
            is_admin: default_oauth_is_admin(),
        }
    }
}

/// Configuration for an OpenID Connect provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OidcProviderConfig {
    /// Unique provider name, also used in the callback path.
    pub provider_name: String,
    /// Name shown on the login page. Defaults to the provider name.
    #[serde(default)]
    pub display_name: Option<String>,
    /// The OIDC issuer URL used for discovery.
    pub base_url: String,
    /// The OAuth2 client ID registered with the provider.
    pub client_id: String,
    /// The OAuth2 client secret.
    pub client_secret: String,
    /// Scopes requested in addition to `openid`, `email` and `profile`.
    #[serde(default)]
    pub extra_scopes: Vec<String>,
    #[serde(default)]
    pub field_map: OauthFields,
}

impl OidcProviderConfig {
    /// Creates a new OIDC provider configuration with defaults for optional fields.
    #[must_use]
    pub fn new(
        provider_name: impl Into<String>,
        base_url: impl Into<String>,
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
    ) -> Self {
        Self {
            provider_name: provider_name.into(),
            display_name: None,
            base_url: base_url.into(),
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            extra_scopes: Vec::new(),
            field_map: OauthFields::default(),
        }
    }

    /// Returns the name shown to users.
    #[must_use]
    pub fn display_name(&self) -> &str {
        self.display_name.as_deref().unwrap_or(&self.provider_name)
    }

    /// Returns all scopes to request, `openid` first.
    #[must_use]
    pub fn scopes(&self) -> Vec<&str> {
        let mut scopes = vec!["openid", "email", "profile"];
        for scope in &self.extra_scopes {
            if !scopes.contains(&scope.as_str()) {
                scopes.push(scope);
            }
        }
        scopes
    }
}

/// Configuration for a plain OAuth2 provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OauthProviderConfig {
    /// Unique provider name, also used in the callback path.
    pub provider_name: String,
    #[serde(default)]
    pub display_name: Option<String>,
    pub client_id: String,
    pub client_secret: String,
    /// Authorization endpoint.
    pub auth_url: String,
    /// Token endpoint.
    pub token_url: String,
    /// Endpoint returning the user's profile as JSON.
    pub user_info_url: String,
    #[serde(default)]
    pub scopes: Vec<String>,
    #[serde(default)]
    pub field_map: OauthFields,
}

impl OauthProviderConfig {
    /// Creates a new OAuth provider configuration with defaults for optional fields.
    #[must_use]
    pub fn new(
        provider_name: impl Into<String>,
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
        auth_url: impl Into<String>,
        token_url: impl Into<String>,
        user_info_url: impl Into<String>,
    ) -> Self {
        Self {
            provider_name: provider_name.into(),
            display_name: None,
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            auth_url: auth_url.into(),
            token_url: token_url.into(),
            user_info_url: user_info_url.into(),
            scopes: Vec::new(),
            field_map: OauthFields::default(),
        }
    }

    /// Returns the name shown to users.
    #[must_use]
    pub fn display_name(&self) -> &str {
        self.display_name.as_deref().unwrap_or(&self.provider_name)
    }
}

/// Mapping from LDAP attributes to portal user fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LdapFields {
    #[serde(default = "default_ldap_identifier")]
    pub user_identifier: String,
    #[serde(default = "default_ldap_email")]
    pub email: String,
    #[serde(default = "default_ldap_firstname")]
    pub firstname: String,
    #[serde(default = "default_ldap_lastname")]
    pub lastname: String,
    /// Multi-valued attribute listing group DNs.
    #[serde(default = "default_ldap_group_membership")]
    pub group_membership: String,
}

fn default_ldap_identifier() -> String {
    "mail".to_string()
}

fn default_ldap_email() -> String {
    "mail".to_string()
}

fn default_ldap_firstname() -> String {
    "givenName".to_string()
}

fn default_ldap_lastname() -> String {
    "sn".to_string()
}

fn default_ldap_group_membership() -> String {
    "memberOf".to_string()
}

impl Default for LdapFields {
    fn default() -> Self {
        Self {
            user_identifier: default_ldap_identifier(),
            email: default_ldap_email(),
            firstname: default_ldap_firstname(),
            lastname: default_ldap_lastname(),
            group_membership: default_ldap_group_membership(),
        }
    }
}

/// Placeholder replaced with the escaped login name in `login_filter`.
pub const LOGIN_PLACEHOLDER: &str = "{login_identifier}";

/// Configuration for an LDAP directory.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LdapProviderConfig {
    /// Connection URL, e.g. `ldaps://dc1.example.com:636`.
    pub url: String,
    /// Upgrade a plain `ldap://` connection with StartTLS.
    #[serde(default)]
    pub start_tls: bool,
    /// Search base for user lookups.
    pub base_dn: String,
    /// Service account used for searching.
    pub bind_user: String,
    pub bind_pass: String,
    /// Search filter; `{login_identifier}` is replaced with the login name.
    #[serde(default = "default_login_filter")]
    pub login_filter: String,
    /// Members of this group DN are portal administrators.
    #[serde(default)]
    pub admin_group_dn: Option<String>,
    #[serde(default)]
    pub field_map: LdapFields,
}

fn default_login_filter() -> String {
    "(&(objectClass=organizationalPerson)(mail={login_identifier}))".to_string()
}

impl LdapProviderConfig {
    /// Creates a new LDAP configuration with defaults for optional fields.
    #[must_use]
    pub fn new(
        url: impl Into<String>,
        base_dn: impl Into<String>,
        bind_user: impl Into<String>,
        bind_pass: impl Into<String>,
    ) -> Self {
        Self {
            url: url.into(),
            start_tls: false,
            base_dn: base_dn.into(),
            bind_user: bind_user.into(),
            bind_pass: bind_pass.into(),
            login_filter: default_login_filter(),
            admin_group_dn: None,
            field_map: LdapFields::default(),
        }
    }
}
