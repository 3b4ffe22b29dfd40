//! Authentication module for the wg-portal server.
//!
//! This module provides:
//! - Concrete OIDC, OAuth2 and LDAP authenticators
//! - The provider factory the [`AuthenticatorRegistry`] is built through
//! - Database-backed user and session stores
//! - The route guard middleware for protected route groups
//! - Login, callback and logout handlers
//!
//! # Authorization Model
//!
//! Logging in establishes the session; it does not grant access on its own.
//! Every request to a guarded route group re-checks the session against the
//! user backend, so disabling or deleting an account locks its sessions out
//! on their next request rather than at expiry.

pub mod db;
pub mod factory;
pub mod ldap;
pub mod middleware;
pub mod oauth;
pub mod oidc;
pub mod routes;

use std::sync::Arc;
use wg_portal_access::{AuthenticatorRegistry, UserBackend};

use crate::config::WebConfig;

pub use factory::ProviderFactory;
pub use middleware::{ScopeGuard, require_scope};
pub use routes::{login_get, login_post, logout, oauth_callback, oauth_login};

/// Shared application state.
pub struct AppState {
    /// Authenticators built at startup.
    pub registry: AuthenticatorRegistry,
    /// User validity oracle.
    pub backend: Arc<dyn UserBackend>,
    /// Front end branding.
    pub web: WebConfig,
}

impl AppState {
    /// Creates a new application state.
    pub fn new(
        registry: AuthenticatorRegistry,
        backend: Arc<dyn UserBackend>,
        web: WebConfig,
    ) -> Self {
        Self {
            registry,
            backend,
            web,
        }
    }
}
