//! Account lifecycle: signup, login, logout, deletion.
//!
//! Passwords are hashed with Argon2id (default parameters) into PHC strings.
//! Hashing and verification are CPU-bound, so both run on the blocking pool.

use std::sync::Arc;

use argon2::Argon2;
use password_hash::rand_core::OsRng;
use password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use tally_storage::{CredentialStore, StorageError};
use tracing::{info, warn};

use crate::error::AccountError;
use crate::ledger::Ledger;
use crate::token::{SessionTokens, TokenService};
use crate::validation;

/// Creates accounts and starts or ends their sessions.
pub struct AccountService {
    store: Arc<dyn CredentialStore>,
    tokens: Arc<TokenService>,
}

impl AccountService {
    #[must_use]
    pub fn new(store: Arc<dyn CredentialStore>, tokens: Arc<TokenService>) -> Self {
        Self { store, tokens }
    }

    /// Register a new user with an empty ledger.
    ///
    /// # Errors
    ///
    /// - [`AccountError::Validation`] if the username or password is rejected.
    /// - [`AccountError::UsernameTaken`] if the name is already registered
    ///   under any casing.
    /// - [`AccountError::Hashing`] or [`AccountError::Storage`] on internal failure.
    pub async fn signup(&self, username: &str, password: &str) -> Result<(), AccountError> {
        validation::validate_username(username)?;
        validation::validate_password(password)?;

        if self.store.user_exists(username).await? {
            return Err(AccountError::UsernameTaken);
        }

        let password_hash = hash_password(password.to_owned()).await?;
        let ledger_json = Ledger::new().to_json().map_err(|e| AccountError::Serialization {
            reason: e.to_string(),
        })?;

        // The existence check above is advisory; the unique key decides.
        match self
            .store
            .create_user(username, &password_hash, &ledger_json)
            .await
        {
            Ok(()) => {
                info!(username, "account created");
                Ok(())
            }
            Err(StorageError::Conflict { .. }) => Err(AccountError::UsernameTaken),
            Err(e) => Err(e.into()),
        }
    }

    /// Check credentials and start a new session.
    ///
    /// Any earlier refresh token of the user stops working.
    ///
    /// # Errors
    ///
    /// - [`AccountError::Validation`] if the username or password fails the
    ///   signup rules, so malformed input never reaches the store.
    /// - [`AccountError::UserNotFound`] if no such user exists.
    /// - [`AccountError::InvalidCredentials`] if the password does not match.
    /// - [`AccountError::Token`] or [`AccountError::Storage`] on internal failure.
    pub async fn login(&self, username: &str, password: &str) -> Result<SessionTokens, AccountError> {
        validation::validate_username(username)?;
        validation::validate_password(password)?;

        let user = self
            .store
            .get_user(username)
            .await?
            .ok_or(AccountError::UserNotFound)?;

        if !verify_password(password.to_owned(), user.password_hash).await? {
            warn!(username = %user.username, "login rejected: password mismatch");
            return Err(AccountError::InvalidCredentials);
        }

        let session = self.tokens.start_session(&user.username).await?;
        info!(username = %user.username, "login succeeded");
        Ok(session)
    }

    /// End every session of the user.
    ///
    /// # Errors
    ///
    /// Returns [`AccountError::Token`] if the store fails.
    pub async fn logout(&self, username: &str) -> Result<(), AccountError> {
        self.tokens.end_session(username).await?;
        Ok(())
    }

    /// Remove a user and all of their refresh tokens.
    ///
    /// Administrative; no HTTP route calls this. Returns `false` if the user
    /// did not exist.
    ///
    /// # Errors
    ///
    /// Returns [`AccountError::Storage`] if the store fails.
    pub async fn delete_account(&self, username: &str) -> Result<bool, AccountError> {
        let removed = self.store.delete_user(username).await?;
        if removed {
            info!(username, "account deleted");
        }
        Ok(removed)
    }
}

impl std::fmt::Debug for AccountService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccountService").finish_non_exhaustive()
    }
}

async fn hash_password(password: String) -> Result<String, AccountError> {
    tokio::task::spawn_blocking(move || {
        let salt = SaltString::generate(&mut OsRng);
        Argon2::default()
            .hash_password(password.as_bytes(), &salt)
            .map(|hash| hash.to_string())
            .map_err(|e| AccountError::Hashing {
                reason: e.to_string(),
            })
    })
    .await
    .map_err(|e| AccountError::Hashing {
        reason: format!("hashing task failed: {e}"),
    })?
}

async fn verify_password(password: String, stored: String) -> Result<bool, AccountError> {
    tokio::task::spawn_blocking(move || {
        let parsed = PasswordHash::new(&stored).map_err(|e| AccountError::Hashing {
            reason: format!("stored hash is malformed: {e}"),
        })?;
        match Argon2::default().verify_password(password.as_bytes(), &parsed) {
            Ok(()) => Ok(true),
            Err(password_hash::Error::Password) => Ok(false),
            Err(e) => Err(AccountError::Hashing {
                reason: e.to_string(),
            }),
        }
    })
    .await
    .map_err(|e| AccountError::Hashing {
        reason: format!("verification task failed: {e}"),
    })?
}
