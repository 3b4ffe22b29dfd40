//! Centralized server configuration.
//!
//! This module provides strongly-typed configuration for the server,
//! loaded via the `config` crate from an optional file overlaid with
//! environment variables (`WG_PORTAL__CORE__EXTERNAL_URL=...`).
//!
//! See [`AuthConfig`](wg_portal_access::AuthConfig) for the authentication
//! provider listings.

use axum_extra::extract::cookie::Key;
use rootcause::Report;
use serde::Deserialize;
use std::fmt;
use std::time::Duration;
use wg_portal_access::AuthConfig;

/// Environment variable naming the config file.
pub const CONFIG_PATH_ENV: &str = "WG_PORTAL_CONFIG";

/// Config file used when [`CONFIG_PATH_ENV`] is unset.
const DEFAULT_CONFIG_PATH: &str = "config.yml";

/// Shortest accepted session secret, in bytes.
const MIN_SESSION_SECRET_LEN: usize = 32;

/// Server configuration composed from library configs.
#[derive(Debug, Deserialize)]
pub struct ServerConfig {
    pub core: CoreConfig,

    /// PostgreSQL database connection URL.
    pub database_url: String,

    #[serde(default)]
    pub session: SessionConfig,

    /// Authentication providers.
    #[serde(default)]
    pub auth: AuthConfig,

    #[serde(default)]
    pub web: WebConfig,
}

/// Core settings.
#[derive(Debug, Deserialize)]
pub struct CoreConfig {
    /// Externally reachable base URL, used to build provider callback URLs.
    pub external_url: String,

    /// Secret the session cookie is signed with. At least 32 bytes.
    pub session_secret: String,

    #[serde(default = "default_listening_address")]
    pub listening_address: String,
}

fn default_listening_address() -> String {
    "0.0.0.0:8888".to_string()
}

/// Where session records are kept.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionBackend {
    /// Process memory; sessions are lost on restart.
    Memory,
    /// The `sessions` table of the portal database.
    #[default]
    Database,
}

/// Session-related configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct SessionConfig {
    #[serde(default)]
    pub backend: SessionBackend,

    /// Session lifetime in minutes, renewed on every write.
    #[serde(default = "default_session_duration_minutes")]
    pub duration_minutes: i64,

    /// Interval between expired-session cleanup runs, in seconds.
    #[serde(default = "default_cleanup_interval_seconds")]
    pub cleanup_interval_seconds: u64,

    /// Whether to set the Secure flag on cookies (requires HTTPS).
    /// Defaults to true for production safety; set to false for local HTTP development.
    #[serde(default = "default_secure_cookies")]
    pub secure_cookies: bool,
}

fn default_session_duration_minutes() -> i64 {
    8 * 60
}

fn default_cleanup_interval_seconds() -> u64 {
    300
}

fn default_secure_cookies() -> bool {
    true
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            backend: SessionBackend::default(),
            duration_minutes: default_session_duration_minutes(),
            cleanup_interval_seconds: default_cleanup_interval_seconds(),
            secure_cookies: default_secure_cookies(),
        }
    }
}

impl SessionConfig {
    /// Session lifetime. Negative durations count as zero.
    #[must_use]
    pub fn lifetime(&self) -> Duration {
        Duration::from_secs(self.duration_minutes.max(0).unsigned_abs().saturating_mul(60))
    }

    /// Time between cleanup runs, never shorter than one second.
    #[must_use]
    pub fn cleanup_interval(&self) -> Duration {
        Duration::from_secs(self.cleanup_interval_seconds.max(1))
    }
}

/// Branding shown by the front end.
#[derive(Debug, Clone, serde::Serialize, Deserialize)]
pub struct WebConfig {
    #[serde(default = "default_site_title")]
    pub site_title: String,
    #[serde(default = "default_company_name")]
    pub company_name: String,
}

fn default_site_title() -> String {
    "WireGuard VPN".to_string()
}

fn default_company_name() -> String {
    "WireGuard Portal".to_string()
}

impl Default for WebConfig {
    fn default() -> Self {
        Self {
            site_title: default_site_title(),
            company_name: default_company_name(),
        }
    }
}

/// Errors turning configuration into runtime values.
#[derive(Debug)]
pub enum ConfigError {
    /// The session secret is too short to derive a signing key from.
    WeakSessionSecret { length: usize },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::WeakSessionSecret { length } => write!(
                f,
                "session secret must be at least {MIN_SESSION_SECRET_LEN} bytes, got {length}"
            ),
        }
    }
}

impl std::error::Error for ConfigError {}

impl ServerConfig {
    /// Loads configuration from the config file and environment variables.
    ///
    /// The file is optional; environment variables take precedence.
    ///
    /// # Errors
    ///
    /// Returns an error if required configuration is missing or invalid.
    pub fn load() -> Result<Self, config::ConfigError> {
        let path =
            std::env::var(CONFIG_PATH_ENV).unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());

        config::Config::builder()
            .add_source(config::File::with_name(&path).required(false))
            .add_source(
                config::Environment::with_prefix("WG_PORTAL")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()
    }
}

impl CoreConfig {
    /// Derives the cookie signing key from the session secret.
    ///
    /// # Errors
    ///
    /// Returns an error if the secret is shorter than 32 bytes.
    pub fn cookie_key(&self) -> Result<Key, Report<ConfigError>> {
        let secret = self.session_secret.as_bytes();
        if secret.len() < MIN_SESSION_SECRET_LEN {
            return Err(ConfigError::WeakSessionSecret {
                length: secret.len(),
            }
            .into());
        }
        Ok(Key::derive_from(secret))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn core(secret: &str) -> CoreConfig {
        CoreConfig {
            external_url: "https://vpn.example.com".to_string(),
            session_secret: secret.to_string(),
            listening_address: default_listening_address(),
        }
    }

    #[test]
    fn session_config_has_correct_defaults() {
        let config = SessionConfig::default();
        assert_eq!(config.backend, SessionBackend::Database);
        assert_eq!(config.duration_minutes, 480);
        assert_eq!(config.cleanup_interval_seconds, 300);
        assert!(config.secure_cookies);
    }

    #[test]
    fn zero_cleanup_interval_is_clamped() {
        let config = SessionConfig {
            cleanup_interval_seconds: 0,
            ..SessionConfig::default()
        };
        assert_eq!(config.cleanup_interval(), Duration::from_secs(1));
        assert_eq!(
            SessionConfig::default().cleanup_interval(),
            Duration::from_secs(300)
        );
    }

    #[test]
    fn lifetime_follows_duration_minutes() {
        assert_eq!(SessionConfig::default().lifetime(), Duration::from_secs(480 * 60));

        let negative = SessionConfig {
            duration_minutes: -5,
            ..SessionConfig::default()
        };
        assert_eq!(negative.lifetime(), Duration::ZERO);
    }

    #[test]
    fn short_session_secret_is_rejected() {
        let err = core("too-short").cookie_key().expect_err("weak secret");
        assert!(err.to_string().contains("at least 32 bytes"));
    }

    #[test]
    fn long_session_secret_derives_key() {
        let secret = "0123456789abcdef0123456789abcdef";
        assert!(core(secret).cookie_key().is_ok());
    }

    #[test]
    fn config_deserializes_with_defaults() {
        let json = r#"{
            "core": {
                "external_url": "https://vpn.example.com",
                "session_secret": "0123456789abcdef0123456789abcdef"
            },
            "database_url": "postgres://localhost/wgportal",
            "session": { "backend": "memory" },
            "auth": {
                "oauth": [{
                    "provider_name": "GitHub",
                    "client_id": "id",
                    "client_secret": "secret",
                    "auth_url": "https://github.com/login/oauth/authorize",
                    "token_url": "https://github.com/login/oauth/access_token",
                    "user_info_url": "https://api.github.com/user"
                }]
            }
        }"#;

        let config: ServerConfig = serde_json::from_str(json).expect("deserialize");

        assert_eq!(config.core.listening_address, "0.0.0.0:8888");
        assert_eq!(config.session.backend, SessionBackend::Memory);
        assert_eq!(config.session.duration_minutes, 480);
        assert_eq!(config.auth.oauth.len(), 1);
        assert!(config.auth.ldap.is_empty());
        assert_eq!(config.web.site_title, "WireGuard VPN");
    }
}
