//! Error types for the access crate.
//!
//! Errors are designed for layered context using rootcause:
//! - `SetupError`: Fatal failures while building the authenticator registry
//! - `AuthenticationError`: Failures verifying a user against a provider
//! - `SessionStoreError`: Failures reading or writing session records
//! - `BackendError`: Failures of the user validity oracle

use std::fmt;
use wg_portal_core::UserIdentifier;

/// The provider family an authenticator belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProviderFamily {
    /// OpenID Connect provider.
    Oidc,
    /// Plain OAuth2 provider.
    OAuth,
    /// LDAP directory.
    Ldap,
}

impl fmt::Display for ProviderFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Oidc => write!(f, "oidc"),
            Self::OAuth => write!(f, "oauth"),
            Self::Ldap => write!(f, "ldap"),
        }
    }
}

/// Errors from building the authenticator registry.
///
/// Every variant is fatal to process startup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SetupError {
    /// The configured external URL could not be parsed.
    InvalidExternalUrl { url: String, reason: String },
    /// A provider identifier is already registered in its namespace.
    DuplicateProvider {
        family: ProviderFamily,
        provider: String,
    },
    /// The provider-specific constructor failed.
    ProviderSetupFailed {
        family: ProviderFamily,
        provider: String,
    },
    /// The setup deadline passed while constructing the provider.
    SetupTimeout {
        family: ProviderFamily,
        provider: String,
    },
}

impl fmt::Display for SetupError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidExternalUrl { url, reason } => {
                write!(f, "failed to parse external url '{url}': {reason}")
            }
            Self::DuplicateProvider { provider, .. } => {
                write!(f, "auth provider with name {provider} is already registered")
            }
            Self::ProviderSetupFailed { family, provider } => {
                write!(
                    f,
                    "failed to setup {family} authentication provider {provider}"
                )
            }
            Self::SetupTimeout { family, provider } => {
                write!(
                    f,
                    "timed out setting up {family} authentication provider {provider}"
                )
            }
        }
    }
}

impl std::error::Error for SetupError {}

/// Errors from authenticating a user against a provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthenticationError {
    /// Provider configuration is unusable.
    Configuration { reason: String },
    /// The provider could not be reached or answered with an error.
    ProviderError { provider: String, reason: String },
    /// Token exchange or validation failed.
    InvalidToken { reason: String },
    /// A claim or attribute needed for the user mapping is missing.
    MissingClaim { claim: String },
    /// Username or password rejected.
    InvalidCredentials,
    /// The directory has no entry for the given login name.
    UserNotFound { username: String },
}

impl fmt::Display for AuthenticationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Configuration { reason } => {
                write!(f, "invalid provider configuration: {reason}")
            }
            Self::ProviderError { provider, reason } => {
                write!(f, "provider '{provider}' error: {reason}")
            }
            Self::InvalidToken { reason } => {
                write!(f, "invalid token: {reason}")
            }
            Self::MissingClaim { claim } => {
                write!(f, "missing required claim: {claim}")
            }
            Self::InvalidCredentials => write!(f, "invalid username or password"),
            Self::UserNotFound { username } => {
                write!(f, "user not found: {username}")
            }
        }
    }
}

impl std::error::Error for AuthenticationError {}

/// Errors from a session store backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionStoreError {
    /// The backing storage failed.
    Storage { details: String },
    /// A stored record could not be encoded or decoded.
    Serialization { details: String },
}

impl fmt::Display for SessionStoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Storage { details } => write!(f, "session storage error: {details}"),
            Self::Serialization { details } => {
                write!(f, "session serialization error: {details}")
            }
        }
    }
}

impl std::error::Error for SessionStoreError {}

/// Errors from the user backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendError {
    /// No user with this identifier exists.
    UserNotFound { identifier: UserIdentifier },
    /// The user exists but is disabled or deleted.
    UserInactive { identifier: UserIdentifier },
    /// The backend query itself failed.
    Database { details: String },
}

impl fmt::Display for BackendError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UserNotFound { identifier } => write!(f, "user {identifier} not found"),
            Self::UserInactive { identifier } => write!(f, "user {identifier} is not active"),
            Self::Database { details } => write!(f, "user backend error: {details}"),
        }
    }
}

impl std::error::Error for BackendError {}
