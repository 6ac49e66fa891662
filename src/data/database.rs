//! SQLite database operations
//!
//! All database access goes through this module.

use async_trait::async_trait;
use chrono::Utc;
use sqlx::{Pool, Sqlite, SqlitePool};
use std::path::Path;

use super::models::*;
use crate::error::AppError;

/// Persistence operations the sign-in flow depends on
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait UserRepository: Send + Sync {
    /// Exact match on `(provider, uid)`
    async fn find_by_provider_uid(
        &self,
        provider: &str,
        uid: &str,
    ) -> Result<Option<User>, AppError>;

    /// Return the user for `(payload.provider, payload.uid)`, inserting it
    /// first if absent. The flag is `true` when this call created the row.
    async fn find_or_create_from_auth(&self, payload: &AuthPayload)
    -> Result<(User, bool), AppError>;

    async fn get_user(&self, id: &str) -> Result<Option<User>, AppError>;

    /// Number of users ever created
    async fn count_users(&self) -> Result<i64, AppError>;
}

/// Database connection pool wrapper.
pub struct Database {
    pool: Pool<Sqlite>,
}

impl Database {
    // =========================================================================
    // Connection
    // =========================================================================

    /// Connect to SQLite database
    ///
    /// Creates the database file if it doesn't exist.
    /// Runs pending migrations automatically.
    ///
    /// # Arguments
    /// * `path` - Path to SQLite database file
    ///
    /// # Errors
    /// Returns error if connection or migration fails
    pub async fn connect(path: &Path) -> Result<Self, AppError> {
        // Create parent directory if it doesn't exist
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| AppError::Database(sqlx::Error::Io(e)))?;
        }

        let connection_string = format!("sqlite:{}?mode=rwc", path.display());
        let pool = SqlitePool::connect(&connection_string).await?;

        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .map_err(|e| {
                tracing::error!("Migration failed: {}", e);
                AppError::Internal(anyhow::anyhow!("Migration failed: {}", e))
            })?;

        tracing::info!("Database connected and migrated successfully");

        Ok(Self { pool })
    }
}

#[async_trait]
impl UserRepository for Database {
    async fn find_by_provider_uid(
        &self,
        provider: &str,
        uid: &str,
    ) -> Result<Option<User>, AppError> {
        let user =
            sqlx::query_as::<_, User>("SELECT * FROM users WHERE provider = ? AND uid = ? LIMIT 1")
                .bind(provider)
                .bind(uid)
                .fetch_optional(&self.pool)
                .await?;

        Ok(user)
    }

    /// Upsert by natural key.
    ///
    /// The insert and the read-back share one transaction, and the UNIQUE
    /// index on `(provider, uid)` turns a concurrent duplicate insert into a
    /// no-op, so two racing callbacks always resolve to the same row.
    async fn find_or_create_from_auth(
        &self,
        payload: &AuthPayload,
    ) -> Result<(User, bool), AppError> {
        let mut tx = self.pool.begin().await?;

        let result = sqlx::query(
            r#"
            INSERT INTO users (id, provider, uid, name, email, created_at)
            VALUES (?, ?, ?, ?, ?, ?)
            ON CONFLICT(provider, uid) DO NOTHING
            "#,
        )
        .bind(EntityId::new().0)
        .bind(&payload.provider)
        .bind(&payload.uid)
        .bind(&payload.name)
        .bind(&payload.email)
        .bind(Utc::now())
        .execute(&mut *tx)
        .await?;

        let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE provider = ? AND uid = ?")
            .bind(&payload.provider)
            .bind(&payload.uid)
            .fetch_one(&mut *tx)
            .await?;

        tx.commit().await?;

        Ok((user, result.rows_affected() == 1))
    }

    async fn get_user(&self, id: &str) -> Result<Option<User>, AppError> {
        let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(user)
    }

    async fn count_users(&self) -> Result<i64, AppError> {
        let count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM users")
            .fetch_one(&self.pool)
            .await?;

        Ok(count.0)
    }
}
