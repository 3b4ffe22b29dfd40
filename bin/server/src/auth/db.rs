//! PostgreSQL adapters for users and sessions.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use rootcause::Report;
use sqlx::{FromRow, PgPool};
use tracing::instrument;
use wg_portal_access::{
    BackendError, SessionData, SessionStore, SessionStoreError, User, UserBackend,
};
use wg_portal_core::{SessionId, UserIdentifier};

/// Row type for user queries.
#[derive(FromRow)]
struct UserRow {
    identifier: String,
    email: Option<String>,
    firstname: Option<String>,
    lastname: Option<String>,
    is_admin: bool,
    disabled_at: Option<DateTime<Utc>>,
}

impl From<UserRow> for User {
    fn from(row: UserRow) -> Self {
        Self {
            identifier: UserIdentifier::new(row.identifier),
            email: row.email,
            firstname: row.firstname,
            lastname: row.lastname,
            is_admin: row.is_admin,
            disabled: row.disabled_at.is_some(),
        }
    }
}

/// User backend reading the `users` table.
///
/// Deleted users are treated as unknown.
#[derive(Clone)]
pub struct PgUserBackend {
    pool: PgPool,
}

impl PgUserBackend {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl UserBackend for PgUserBackend {
    #[instrument(skip(self), level = "debug")]
    async fn get_active_user(&self, id: &UserIdentifier) -> Result<User, Report<BackendError>> {
        let row: Option<UserRow> = sqlx::query_as(
            r#"
            SELECT identifier, email, firstname, lastname, is_admin, disabled_at
            FROM users
            WHERE identifier = $1 AND deleted_at IS NULL
            "#,
        )
        .bind(id.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| BackendError::Database {
            details: e.to_string(),
        })?;

        let user: User = row
            .ok_or_else(|| BackendError::UserNotFound {
                identifier: id.clone(),
            })?
            .into();

        if user.disabled {
            return Err(BackendError::UserInactive {
                identifier: id.clone(),
            }
            .into());
        }
        Ok(user)
    }
}

/// Row type for session queries.
#[derive(FromRow)]
struct SessionRow {
    data: serde_json::Value,
}

/// Session store backed by the `sessions` table.
///
/// Every save pushes the expiry `duration` into the future; expired rows
/// read as absent until [`SessionStore::delete_expired`] removes them.
#[derive(Clone)]
pub struct PgSessionStore {
    pool: PgPool,
    duration: Duration,
}

impl PgSessionStore {
    pub fn new(pool: PgPool, duration: Duration) -> Self {
        Self { pool, duration }
    }
}

fn storage_error(e: sqlx::Error) -> SessionStoreError {
    SessionStoreError::Storage {
        details: e.to_string(),
    }
}

#[async_trait]
impl SessionStore for PgSessionStore {
    #[instrument(skip(self), level = "trace")]
    async fn load(&self, id: &SessionId) -> Result<Option<SessionData>, Report<SessionStoreError>> {
        let row: Option<SessionRow> = sqlx::query_as(
            r#"
            SELECT data
            FROM sessions
            WHERE id = $1 AND expires_at > NOW()
            "#,
        )
        .bind(id.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(storage_error)?;

        let Some(row) = row else {
            return Ok(None);
        };
        let data = serde_json::from_value(row.data).map_err(|e| {
            SessionStoreError::Serialization {
                details: e.to_string(),
            }
        })?;
        Ok(Some(data))
    }

    #[instrument(skip(self, data), level = "trace")]
    async fn save(
        &self,
        id: &SessionId,
        data: &SessionData,
    ) -> Result<(), Report<SessionStoreError>> {
        let json = serde_json::to_value(data).map_err(|e| SessionStoreError::Serialization {
            details: e.to_string(),
        })?;
        let expires_at = Utc::now() + self.duration;

        sqlx::query(
            r#"
            INSERT INTO sessions (id, data, expires_at)
            VALUES ($1, $2, $3)
            ON CONFLICT (id) DO UPDATE SET data = EXCLUDED.data, expires_at = EXCLUDED.expires_at
            "#,
        )
        .bind(id.as_str())
        .bind(json)
        .bind(expires_at)
        .execute(&self.pool)
        .await
        .map_err(storage_error)?;

        Ok(())
    }

    #[instrument(skip(self), level = "trace")]
    async fn destroy(&self, id: &SessionId) -> Result<(), Report<SessionStoreError>> {
        sqlx::query("DELETE FROM sessions WHERE id = $1")
            .bind(id.as_str())
            .execute(&self.pool)
            .await
            .map_err(storage_error)?;
        Ok(())
    }

    #[instrument(skip(self), level = "trace")]
    async fn delete_expired(&self) -> Result<u64, Report<SessionStoreError>> {
        let result = sqlx::query("DELETE FROM sessions WHERE expires_at <= NOW()")
            .execute(&self.pool)
            .await
            .map_err(storage_error)?;
        Ok(result.rows_affected())
    }
}
