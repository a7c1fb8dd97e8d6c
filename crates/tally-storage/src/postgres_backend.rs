//! PostgreSQL credential store.
//!
//! Users live in a `users` table with the ledger as a `JSONB` document and a
//! `version` column for compare-and-swap writes. Refresh token hashes live in
//! `refreshtokens`. Both tables are created on connect if missing.
//!
//! Feature-gated behind `postgres-backend`. Uses `sqlx` with the Tokio
//! runtime for fully async operations.

use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use tracing::info;

use crate::{CredentialStore, StorageError, UserRecord};

/// SQLSTATE for `unique_violation`.
const UNIQUE_VIOLATION: &str = "23505";

/// A credential store backed by PostgreSQL.
///
/// Thread-safe via `PgPool` (connection pool). All operations are fully async.
///
/// # Examples
///
/// ```no_run
/// # use tally_storage::PostgresBackend;
/// # #[tokio::main]
/// # async fn main() {
/// let backend = PostgresBackend::connect("postgres://localhost/tally", 10).await.unwrap();
/// # }
/// ```
#[derive(Clone)]
pub struct PostgresBackend {
    pool: PgPool,
}

impl std::fmt::Debug for PostgresBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PostgresBackend")
            .field("pool", &"[PgPool]")
            .finish_non_exhaustive()
    }
}

impl PostgresBackend {
    /// Connect to PostgreSQL and run the initial migration.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Open`] if the connection or migration fails.
    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self, StorageError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await
            .map_err(|e| StorageError::Open {
                target: "[redacted database url]".to_owned(),
                reason: e.to_string(),
            })?;

        let migrations = [
            "CREATE TABLE IF NOT EXISTS users (\
                username TEXT   PRIMARY KEY, \
                password TEXT   NOT NULL, \
                data     JSONB  NOT NULL, \
                version  BIGINT NOT NULL DEFAULT 0\
            )",
            "CREATE TABLE IF NOT EXISTS refreshtokens (\
                token    TEXT PRIMARY KEY, \
                username TEXT NOT NULL, \
                created  DATE NOT NULL DEFAULT CURRENT_DATE\
            )",
            "CREATE INDEX IF NOT EXISTS idx_refreshtokens_username \
             ON refreshtokens (username)",
        ];

        for statement in migrations {
            sqlx::query(statement)
                .execute(&pool)
                .await
                .map_err(|e| StorageError::Open {
                    target: "[redacted database url]".to_owned(),
                    reason: format!("migration failed: {e}"),
                })?;
        }

        info!(max_connections, "PostgreSQL credential store ready");

        Ok(Self { pool })
    }
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db_err) if db_err.code().as_deref() == Some(UNIQUE_VIOLATION))
}

#[async_trait::async_trait]
impl CredentialStore for PostgresBackend {
    async fn create_user(
        &self,
        username: &str,
        password_hash: &str,
        ledger_json: &str,
    ) -> Result<(), StorageError> {
        sqlx::query(
            "INSERT INTO users (username, password, data, version) \
             VALUES (LOWER($1), $2, $3::jsonb, 0)",
        )
        .bind(username)
        .bind(password_hash)
        .bind(ledger_json)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                StorageError::Conflict {
                    entity: format!("user '{}'", username.to_lowercase()),
                }
            } else {
                StorageError::Write {
                    entity: "user".to_owned(),
                    reason: e.to_string(),
                }
            }
        })?;

        Ok(())
    }

    async fn get_user(&self, username: &str) -> Result<Option<UserRecord>, StorageError> {
        let row: Option<(String, String, String, i64)> = sqlx::query_as(
            "SELECT username, password, data::text, version \
             FROM users WHERE username = LOWER($1)",
        )
        .bind(username)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| StorageError::Read {
            entity: "user".to_owned(),
            reason: e.to_string(),
        })?;

        Ok(row.map(|(username, password_hash, ledger_json, version)| UserRecord {
            username,
            password_hash,
            ledger_json,
            version,
        }))
    }

    async fn user_exists(&self, username: &str) -> Result<bool, StorageError> {
        let row: Option<(bool,)> =
            sqlx::query_as("SELECT EXISTS(SELECT 1 FROM users WHERE username = LOWER($1))")
                .bind(username)
                .fetch_optional(&self.pool)
                .await
                .map_err(|e| StorageError::Read {
                    entity: "user".to_owned(),
                    reason: e.to_string(),
                })?;

        Ok(row.is_some_and(|(exists,)| exists))
    }

    async fn replace_ledger(
        &self,
        username: &str,
        expected_version: i64,
        ledger_json: &str,
    ) -> Result<Option<i64>, StorageError> {
        let row: Option<(i64,)> = sqlx::query_as(
            "UPDATE users SET data = $3::jsonb, version = version + 1 \
             WHERE username = LOWER($1) AND version = $2 \
             RETURNING version",
        )
        .bind(username)
        .bind(expected_version)
        .bind(ledger_json)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| StorageError::Write {
            entity: "ledger".to_owned(),
            reason: e.to_string(),
        })?;

        Ok(row.map(|(version,)| version))
    }

    async fn delete_user(&self, username: &str) -> Result<bool, StorageError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| StorageError::Transaction {
                reason: e.to_string(),
            })?;

        sqlx::query("DELETE FROM refreshtokens WHERE username = LOWER($1)")
            .bind(username)
            .execute(&mut *tx)
            .await
            .map_err(|e| StorageError::Delete {
                entity: "refresh tokens".to_owned(),
                reason: e.to_string(),
            })?;

        let result = sqlx::query("DELETE FROM users WHERE username = LOWER($1)")
            .bind(username)
            .execute(&mut *tx)
            .await
            .map_err(|e| StorageError::Delete {
                entity: "user".to_owned(),
                reason: e.to_string(),
            })?;

        tx.commit().await.map_err(|e| StorageError::Transaction {
            reason: e.to_string(),
        })?;

        Ok(result.rows_affected() > 0)
    }

    async fn insert_refresh_token(
        &self,
        token_hash: &str,
        username: &str,
    ) -> Result<(), StorageError> {
        sqlx::query(
            "INSERT INTO refreshtokens (token, username, created) \
             VALUES ($1, LOWER($2), CURRENT_DATE)",
        )
        .bind(token_hash)
        .bind(username)
        .execute(&self.pool)
        .await
        .map_err(|e| StorageError::Write {
            entity: "refresh token".to_owned(),
            reason: e.to_string(),
        })?;

        Ok(())
    }

    async fn refresh_token_owner(&self, token_hash: &str) -> Result<Option<String>, StorageError> {
        let row: Option<(String,)> =
            sqlx::query_as("SELECT username FROM refreshtokens WHERE token = $1")
                .bind(token_hash)
                .fetch_optional(&self.pool)
                .await
                .map_err(|e| StorageError::Read {
                    entity: "refresh token".to_owned(),
                    reason: e.to_string(),
                })?;

        Ok(row.map(|(username,)| username))
    }

    async fn revoke_refresh_tokens(&self, username: &str) -> Result<u64, StorageError> {
        let result = sqlx::query("DELETE FROM refreshtokens WHERE username = LOWER($1)")
            .bind(username)
            .execute(&self.pool)
            .await
            .map_err(|e| StorageError::Delete {
                entity: "refresh tokens".to_owned(),
                reason: e.to_string(),
            })?;

        Ok(result.rows_affected())
    }

    async fn close(&self) {
        self.pool.close().await;
        info!("PostgreSQL pool drained");
    }
}
