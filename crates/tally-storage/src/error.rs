//! Storage error types.
//!
//! Every error variant carries enough context to diagnose the problem
//! without a debugger. Variants never include password hashes or tokens.

/// Errors that can occur during credential store operations.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// Failed to open or connect to the storage backend.
    #[error("failed to open storage at '{target}': {reason}")]
    Open { target: String, reason: String },

    /// Failed to read a row.
    #[error("failed to read {entity}: {reason}")]
    Read { entity: String, reason: String },

    /// Failed to write a row.
    #[error("failed to write {entity}: {reason}")]
    Write { entity: String, reason: String },

    /// Failed to delete rows.
    #[error("failed to delete {entity}: {reason}")]
    Delete { entity: String, reason: String },

    /// A unique constraint rejected the write.
    #[error("{entity} already exists")]
    Conflict { entity: String },

    /// Failed to begin or commit a transaction.
    #[error("transaction failed: {reason}")]
    Transaction { reason: String },
}
