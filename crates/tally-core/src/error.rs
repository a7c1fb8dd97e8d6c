//! Error types for `tally-core`.
//!
//! Each error variant carries enough context to diagnose the problem without
//! a debugger. Token and password errors never include secret material.

use tally_storage::StorageError;

use crate::ledger::EntryKind;

/// Errors from boundary validation of user input.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    /// A required field was empty or absent.
    #[error("{field} is required")]
    Missing { field: &'static str },

    /// The username contains characters outside `[A-Za-z0-9_]`.
    #[error("username can only contain letters, numbers, and underscores")]
    InvalidUsername,

    /// The password is shorter than the minimum length.
    #[error("password must be at least {min} characters long")]
    PasswordTooShort { min: usize },

    /// The password lacks a required character class.
    #[error("password must include uppercase, lowercase, number, and special character")]
    WeakPassword,

    /// The amount is not a positive finite number.
    #[error("{field} must be a positive number")]
    InvalidAmount { field: &'static str },
}

/// Errors from ledger reads and mutations.
#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    /// The input failed validation.
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// The user row does not exist.
    #[error("user '{username}' not found")]
    UserNotFound { username: String },

    /// No entry with the given name exists in the target list.
    #[error("{kind} with the name \"{name}\" not found")]
    EntryNotFound { kind: EntryKind, name: String },

    /// The change would push the ledger past the size cap.
    #[error("data size limit exceeded: {size} bytes exceeds {limit} bytes")]
    SizeLimitExceeded { size: usize, limit: usize },

    /// Concurrent writers kept winning the version race.
    #[error("ledger update conflicted {attempts} times, try again")]
    Contended { attempts: u32 },

    /// The stored document is not a valid ledger.
    #[error("stored ledger for '{username}' is corrupt: {reason}")]
    Corrupt { username: String, reason: String },

    /// Serializing the ledger failed.
    #[error("ledger serialization failed: {reason}")]
    Serialization { reason: String },

    /// The credential store returned an error.
    #[error("ledger storage error: {0}")]
    Storage(#[from] StorageError),
}

/// Errors from session token operations.
#[derive(Debug, thiserror::Error)]
pub enum TokenError {
    /// The access token's expiry has passed.
    #[error("token expired")]
    Expired,

    /// The token is malformed or its signature does not verify.
    #[error("invalid token: {reason}")]
    Invalid { reason: String },

    /// The refresh token is not present in the store.
    #[error("refresh token has been revoked")]
    Revoked,

    /// Signing a new token failed.
    #[error("token signing failed: {reason}")]
    Signing { reason: String },

    /// The credential store returned an error.
    #[error("token storage error: {0}")]
    Storage(#[from] StorageError),
}

/// Errors from account signup, login, and deletion.
#[derive(Debug, thiserror::Error)]
pub enum AccountError {
    /// The input failed validation.
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// No user with this name exists.
    #[error("user not found")]
    UserNotFound,

    /// The password does not match the stored hash.
    #[error("credentials do not match")]
    InvalidCredentials,

    /// The username is already registered.
    #[error("username has already been taken")]
    UsernameTaken,

    /// Password hashing or verification failed internally.
    #[error("password hashing failed: {reason}")]
    Hashing { reason: String },

    /// Encoding the initial ledger failed.
    #[error("initial ledger serialization failed: {reason}")]
    Serialization { reason: String },

    /// Issuing or revoking session tokens failed.
    #[error("account token error: {0}")]
    Token(#[from] TokenError),

    /// The credential store returned an error.
    #[error("account storage error: {0}")]
    Storage(#[from] StorageError),
}
