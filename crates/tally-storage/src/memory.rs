//! In-memory credential store for testing and local development.
//!
//! This backend keeps users and refresh tokens in `BTreeMap`s behind a single
//! `RwLock`. It is not persistent: all data is lost when the process exits.

use std::collections::BTreeMap;
use std::sync::Arc;

use tokio::sync::RwLock;

use crate::{CredentialStore, StorageError, UserRecord, normalize_username};

#[derive(Debug, Default)]
struct Tables {
    users: BTreeMap<String, UserRecord>,
    /// Token hash to owning username.
    refresh_tokens: BTreeMap<String, String>,
}

/// An in-memory credential store.
///
/// Thread-safe and async-compatible. Clones share the same underlying data.
///
/// # Examples
///
/// ```
/// # use tally_storage::{CredentialStore, MemoryBackend};
/// # #[tokio::main]
/// # async fn main() {
/// let store = MemoryBackend::new();
/// store.create_user("Alice", "$argon2id$...", "{}").await.unwrap();
/// assert!(store.user_exists("alice").await.unwrap());
/// # }
/// ```
#[derive(Debug, Clone, Default)]
pub struct MemoryBackend {
    tables: Arc<RwLock<Tables>>,
}

impl MemoryBackend {
    /// Create a new empty in-memory store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl CredentialStore for MemoryBackend {
    async fn create_user(
        &self,
        username: &str,
        password_hash: &str,
        ledger_json: &str,
    ) -> Result<(), StorageError> {
        let username = normalize_username(username);
        let mut tables = self.tables.write().await;
        if tables.users.contains_key(&username) {
            return Err(StorageError::Conflict {
                entity: format!("user '{username}'"),
            });
        }
        tables.users.insert(
            username.clone(),
            UserRecord {
                username,
                password_hash: password_hash.to_owned(),
                ledger_json: ledger_json.to_owned(),
                version: 0,
            },
        );
        Ok(())
    }

    async fn get_user(&self, username: &str) -> Result<Option<UserRecord>, StorageError> {
        let tables = self.tables.read().await;
        Ok(tables.users.get(&normalize_username(username)).cloned())
    }

    async fn user_exists(&self, username: &str) -> Result<bool, StorageError> {
        let tables = self.tables.read().await;
        Ok(tables.users.contains_key(&normalize_username(username)))
    }

    async fn replace_ledger(
        &self,
        username: &str,
        expected_version: i64,
        ledger_json: &str,
    ) -> Result<Option<i64>, StorageError> {
        let mut tables = self.tables.write().await;
        let Some(user) = tables.users.get_mut(&normalize_username(username)) else {
            return Ok(None);
        };
        if user.version != expected_version {
            return Ok(None);
        }
        user.version = user.version.saturating_add(1);
        ledger_json.clone_into(&mut user.ledger_json);
        Ok(Some(user.version))
    }

    async fn delete_user(&self, username: &str) -> Result<bool, StorageError> {
        let username = normalize_username(username);
        let mut tables = self.tables.write().await;
        tables.refresh_tokens.retain(|_, owner| *owner != username);
        Ok(tables.users.remove(&username).is_some())
    }

    async fn insert_refresh_token(
        &self,
        token_hash: &str,
        username: &str,
    ) -> Result<(), StorageError> {
        let mut tables = self.tables.write().await;
        tables
            .refresh_tokens
            .insert(token_hash.to_owned(), normalize_username(username));
        Ok(())
    }

    async fn refresh_token_owner(&self, token_hash: &str) -> Result<Option<String>, StorageError> {
        let tables = self.tables.read().await;
        Ok(tables.refresh_tokens.get(token_hash).cloned())
    }

    async fn revoke_refresh_tokens(&self, username: &str) -> Result<u64, StorageError> {
        let username = normalize_username(username);
        let mut tables = self.tables.write().await;
        let before = tables.refresh_tokens.len();
        tables.refresh_tokens.retain(|_, owner| *owner != username);
        let removed = before.saturating_sub(tables.refresh_tokens.len());
        Ok(u64::try_from(removed).unwrap_or(u64::MAX))
    }
}
