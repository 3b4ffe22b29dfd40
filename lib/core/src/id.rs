//! Strongly-typed identifiers shared across wg-portal.
//!
//! Identifiers are plain strings on the wire. The newtypes keep user
//! identifiers, provider keys and session tokens from being mixed up.

use serde::{Deserialize, Serialize};
use std::fmt;
use ulid::Ulid;

/// Macro to generate a string-backed identifier wrapper.
macro_rules! define_string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(
            Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize,
        )]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Returns the identifier as a string slice.
            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }

            /// Returns true if the identifier is the empty string.
            #[must_use]
            pub fn is_empty(&self) -> bool {
                self.0.is_empty()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }
    };
}

define_string_id!(
    /// Identifier of a portal user, as known to the user backend.
    ///
    /// This is the value an authenticator maps out of the provider's claims
    /// (for example the OIDC `sub` claim or the LDAP `uid` attribute).
    UserIdentifier
);

impl UserIdentifier {
    /// Creates a user identifier from any string.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }
}

impl From<String> for UserIdentifier {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for UserIdentifier {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

define_string_id!(
    /// Normalized key of a configured authentication provider.
    ///
    /// Always lower case. OIDC and OAuth providers are keyed by provider
    /// name, LDAP providers by connection URL.
    ProviderId
);

impl ProviderId {
    /// Normalizes a configured provider name or URL into an identifier.
    #[must_use]
    pub fn normalize(raw: &str) -> Self {
        Self(raw.to_lowercase())
    }
}

define_string_id!(
    /// Opaque token naming a server-side session record.
    SessionId
);

impl SessionId {
    /// Wraps an existing token, e.g. one read back from a cookie.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Generates a fresh session token.
    #[must_use]
    pub fn generate() -> Self {
        Self(Ulid::new().to_string())
    }
}
