//! Credential store abstraction for `Tally`.
//!
//! This crate defines the [`CredentialStore`] trait, the persistence
//! interface for user rows (username, password hash, ledger document) and
//! refresh tokens. It knows nothing about ledger semantics or token signing:
//! ledgers arrive here as serialized JSON text and refresh tokens as hashes.
//!
//! Two implementations are provided:
//!
//! - [`PostgresBackend`]: production default, backed by `sqlx` (feature `postgres-backend`)
//! - [`MemoryBackend`]: in-memory, for tests and local development
//!
//! Usernames are case-insensitive identifiers. Every backend lowercases the
//! username before storing or comparing it.

mod error;
mod memory;
#[cfg(feature = "postgres-backend")]
mod postgres_backend;

pub use error::StorageError;
pub use memory::MemoryBackend;
#[cfg(feature = "postgres-backend")]
pub use postgres_backend::PostgresBackend;

/// A stored user row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserRecord {
    /// Lowercased username.
    pub username: String,
    /// Password hash in PHC string format.
    pub password_hash: String,
    /// The serialized ledger document.
    pub ledger_json: String,
    /// Row version, bumped on every ledger write.
    pub version: i64,
}

/// Normalize a username for storage and lookup.
#[must_use]
pub fn normalize_username(username: &str) -> String {
    username.to_lowercase()
}

/// A pluggable credential store.
///
/// Implementations must be safe to share across async tasks (`Send + Sync`).
#[async_trait::async_trait]
pub trait CredentialStore: Send + Sync + 'static {
    /// Insert a new user row with version `0`.
    ///
    /// # Errors
    ///
    /// - [`StorageError::Conflict`] if the (lowercased) username already exists.
    /// - [`StorageError::Write`] if the underlying backend fails.
    async fn create_user(
        &self,
        username: &str,
        password_hash: &str,
        ledger_json: &str,
    ) -> Result<(), StorageError>;

    /// Fetch a user row.
    ///
    /// Returns `Ok(None)` if the user does not exist.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Read`] if the underlying backend fails.
    async fn get_user(&self, username: &str) -> Result<Option<UserRecord>, StorageError>;

    /// Check whether a user exists.
    ///
    /// The default implementation calls [`get_user`](CredentialStore::get_user).
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Read`] if the underlying backend fails.
    async fn user_exists(&self, username: &str) -> Result<bool, StorageError> {
        Ok(self.get_user(username).await?.is_some())
    }

    /// Replace the ledger document if the row is still at `expected_version`.
    ///
    /// Returns the new version on success, or `Ok(None)` when the row moved
    /// to another version (or was deleted) since it was read.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Write`] if the underlying backend fails.
    async fn replace_ledger(
        &self,
        username: &str,
        expected_version: i64,
        ledger_json: &str,
    ) -> Result<Option<i64>, StorageError>;

    /// Delete a user row together with its refresh tokens.
    ///
    /// Returns `true` if a row was removed.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Delete`] if the underlying backend fails.
    async fn delete_user(&self, username: &str) -> Result<bool, StorageError>;

    /// Persist a refresh token hash for a user, stamped with today's date.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Write`] if the underlying backend fails.
    async fn insert_refresh_token(
        &self,
        token_hash: &str,
        username: &str,
    ) -> Result<(), StorageError>;

    /// Look up the owner of a refresh token hash.
    ///
    /// Returns `Ok(None)` if the token is not (or no longer) stored.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Read`] if the underlying backend fails.
    async fn refresh_token_owner(&self, token_hash: &str) -> Result<Option<String>, StorageError>;

    /// Delete every refresh token belonging to a user.
    ///
    /// Returns the number of tokens removed. Idempotent.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Delete`] if the underlying backend fails.
    async fn revoke_refresh_tokens(&self, username: &str) -> Result<u64, StorageError>;

    /// Release backend resources (drain the connection pool).
    ///
    /// Called once at shutdown. The default implementation does nothing.
    async fn close(&self) {}
}
