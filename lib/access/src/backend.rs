//! The user validity oracle.
//!
//! Previously authenticated sessions are only trusted while the backend
//! still reports the user as an active account. The middleware asks on
//! every guarded request; implementations are free to cache.

use async_trait::async_trait;
use rootcause::Report;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tokio::sync::RwLock;
use wg_portal_core::UserIdentifier;

use crate::error::BackendError;

/// A portal user account as known to the backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub identifier: UserIdentifier,
    pub email: Option<String>,
    pub firstname: Option<String>,
    pub lastname: Option<String>,
    pub is_admin: bool,
    /// Disabled accounts are not active.
    pub disabled: bool,
}

impl User {
    /// Creates an enabled, non-admin user.
    #[must_use]
    pub fn new(identifier: impl Into<UserIdentifier>) -> Self {
        Self {
            identifier: identifier.into(),
            email: None,
            firstname: None,
            lastname: None,
            is_admin: false,
            disabled: false,
        }
    }

    /// Sets the administrator flag.
    #[must_use]
    pub fn with_admin(mut self, is_admin: bool) -> Self {
        self.is_admin = is_admin;
        self
    }

    /// Sets the disabled flag.
    #[must_use]
    pub fn with_disabled(mut self, disabled: bool) -> Self {
        self.disabled = disabled;
        self
    }
}

/// Backend capability used to revalidate sessions.
#[async_trait]
pub trait UserBackend: Send + Sync {
    /// Returns the user if it exists and is active.
    ///
    /// Missing and disabled users are errors.
    async fn get_active_user(&self, id: &UserIdentifier) -> Result<User, Report<BackendError>>;
}

/// In-memory user backend.
#[derive(Debug, Default)]
pub struct MemoryUserBackend {
    users: RwLock<HashMap<UserIdentifier, User>>,
}

impl MemoryUserBackend {
    /// Creates a backend holding the given users.
    #[must_use]
    pub fn with_users(users: impl IntoIterator<Item = User>) -> Self {
        let users = users
            .into_iter()
            .map(|user| (user.identifier.clone(), user))
            .collect();
        Self {
            users: RwLock::new(users),
        }
    }

    /// Inserts or replaces a user.
    pub async fn upsert(&self, user: User) {
        self.users
            .write()
            .await
            .insert(user.identifier.clone(), user);
    }

    /// Marks a user as disabled. Returns false if the user is unknown.
    pub async fn disable(&self, id: &UserIdentifier) -> bool {
        match self.users.write().await.get_mut(id) {
            Some(user) => {
                user.disabled = true;
                true
            }
            None => false,
        }
    }
}

#[async_trait]
impl UserBackend for MemoryUserBackend {
    async fn get_active_user(&self, id: &UserIdentifier) -> Result<User, Report<BackendError>> {
        let users = self.users.read().await;
        let user = users.get(id).ok_or_else(|| BackendError::UserNotFound {
            identifier: id.clone(),
        })?;
        if user.disabled {
            return Err(BackendError::UserInactive {
                identifier: id.clone(),
            }
            .into());
        }
        Ok(user.clone())
    }
}
