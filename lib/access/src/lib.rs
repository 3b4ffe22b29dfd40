//! Authentication and authorization core for wg-portal.
//!
//! This crate provides:
//! - Provider configuration (`OidcProviderConfig`, `OauthProviderConfig`, `LdapProviderConfig`)
//! - Authenticator capabilities (`OauthAuthenticator`, `LdapAuthenticator`)
//! - The startup-built `AuthenticatorRegistry`
//! - Session records (`SessionData`, `ErrorData`) and the `SessionStore` contract
//! - The user validity oracle (`UserBackend`)
//! - Per-request access decisions (`evaluate`, `RequiredScope`)
//!
//! # Example
//!
//! ```
//! use wg_portal_access::{ErrorData, RequiredScope, SessionData};
//!
//! let session = SessionData::default();
//! assert!(!session.logged_in);
//!
//! assert!(RequiredScope::admin().requires_admin());
//! assert!(!RequiredScope::authenticated().requires_admin());
//!
//! let error = ErrorData::new(404, "not found", "no such page", "/admin/missing");
//! assert_eq!(error.path, "/");
//! ```

pub mod authenticator;
pub mod backend;
pub mod config;
pub mod error;
pub mod guard;
pub mod registry;
pub mod session;

// Re-export main types at crate root
pub use authenticator::{
    AuthenticatorFactory, AuthenticatorType, AuthenticatorUserInfo, LdapAuthenticator,
    LoginInitiation, OauthAuthenticator,
};
pub use backend::{MemoryUserBackend, User, UserBackend};
pub use config::{
    AuthConfig, LdapFields, LdapProviderConfig, OauthFields, OauthProviderConfig,
    OidcProviderConfig,
};
pub use error::{
    AuthenticationError, BackendError, ProviderFamily, SessionStoreError, SetupError,
};
pub use guard::{AccessDecision, RequiredScope, evaluate};
pub use registry::{AuthenticatorRegistry, SETUP_TIMEOUT, callback_url};
pub use session::{ErrorData, MemorySessionStore, PendingLogin, SessionData, SessionStore};
