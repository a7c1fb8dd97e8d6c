//! Ledger mutation service.
//!
//! Every operation validates its input, loads the user's current ledger,
//! applies the change, enforces the size cap, and persists the whole
//! document. Writes are a compare-and-swap on the row version: if another
//! request wrote in between, the change is reapplied to the fresh document,
//! up to [`MAX_WRITE_ATTEMPTS`] times.

use std::sync::Arc;

use tally_storage::CredentialStore;
use tracing::{debug, info};

use crate::error::LedgerError;
use crate::ledger::{self, Entry, EntryKind, Ledger, Upsert};
use crate::validation::{self, AmountInput};

/// Attempts made before a contended write gives up.
pub const MAX_WRITE_ATTEMPTS: u32 = 3;

/// Applies add/update/delete operations to per-user ledgers.
pub struct LedgerService {
    store: Arc<dyn CredentialStore>,
}

impl LedgerService {
    /// Create a new service backed by the given store.
    #[must_use]
    pub fn new(store: Arc<dyn CredentialStore>) -> Self {
        Self { store }
    }

    /// Load a user's ledger.
    ///
    /// # Errors
    ///
    /// - [`LedgerError::Validation`] if the username is malformed.
    /// - [`LedgerError::UserNotFound`] if no such user exists.
    /// - [`LedgerError::Corrupt`] if the stored document does not parse.
    /// - [`LedgerError::Storage`] if the store fails.
    pub async fn get_ledger(&self, username: &str) -> Result<Ledger, LedgerError> {
        validation::validate_username(username)?;
        let (ledger, _) = self.load(username).await?;
        Ok(ledger)
    }

    /// Add an entry, or update the amount of the case-insensitively matching
    /// entry. Re-adding with an unchanged amount performs no write.
    ///
    /// # Errors
    ///
    /// - [`LedgerError::Validation`] on a bad username, empty name, or an
    ///   amount that is not a positive finite number.
    /// - [`LedgerError::SizeLimitExceeded`] if the document would exceed 1 MiB.
    /// - [`LedgerError::UserNotFound`], [`LedgerError::Contended`],
    ///   [`LedgerError::Storage`] as for any write.
    pub async fn add_entry(
        &self,
        username: &str,
        kind: EntryKind,
        name: &str,
        amount: &AmountInput,
    ) -> Result<Ledger, LedgerError> {
        validation::validate_username(username)?;
        let name = validation::validate_entry_name(name, name_field(kind))?;
        let amount = validation::parse_amount(amount, amount_field(kind))?;

        let delta = Entry {
            name: name.to_owned(),
            amount,
        };

        let ledger = self
            .mutate(username, |doc, current_json| {
                ledger::check_size(current_json, &delta)?;
                Ok(doc.upsert(kind, &delta.name, delta.amount) != Upsert::Unchanged)
            })
            .await?;

        info!(username, %kind, "ledger entry saved");
        Ok(ledger)
    }

    /// Delete the case-insensitively matching entry.
    ///
    /// # Errors
    ///
    /// - [`LedgerError::Validation`] on a bad username or empty name.
    /// - [`LedgerError::EntryNotFound`] if no entry matched; nothing is written.
    /// - [`LedgerError::UserNotFound`], [`LedgerError::Contended`],
    ///   [`LedgerError::Storage`] as for any write.
    pub async fn delete_entry(
        &self,
        username: &str,
        kind: EntryKind,
        name: &str,
    ) -> Result<Ledger, LedgerError> {
        validation::validate_username(username)?;
        let name = validation::validate_entry_name(name, name_field(kind))?;

        let ledger = self
            .mutate(username, |doc, _| {
                if doc.remove(kind, name) {
                    Ok(true)
                } else {
                    Err(LedgerError::EntryNotFound {
                        kind,
                        name: name.to_owned(),
                    })
                }
            })
            .await?;

        info!(username, %kind, "ledger entry deleted");
        Ok(ledger)
    }

    async fn load(&self, username: &str) -> Result<(Ledger, i64), LedgerError> {
        let record = self
            .store
            .get_user(username)
            .await?
            .ok_or_else(|| LedgerError::UserNotFound {
                username: username.to_lowercase(),
            })?;

        let ledger = Ledger::from_json(&record.username, &record.ledger_json)?;
        Ok((ledger, record.version))
    }

    /// Load, apply, and conditionally write. `apply` returns whether the
    /// ledger changed; unchanged ledgers are returned without a write.
    async fn mutate<F>(&self, username: &str, mut apply: F) -> Result<Ledger, LedgerError>
    where
        F: FnMut(&mut Ledger, &str) -> Result<bool, LedgerError>,
    {
        for attempt in 1..=MAX_WRITE_ATTEMPTS {
            let (mut ledger, version) = self.load(username).await?;
            // Size is measured on our own compact encoding, not on whatever
            // formatting the backend returns (jsonb adds whitespace).
            let current_json = ledger.to_json()?;

            if !apply(&mut ledger, &current_json)? {
                return Ok(ledger);
            }

            let updated_json = ledger.to_json()?;
            match self
                .store
                .replace_ledger(username, version, &updated_json)
                .await?
            {
                Some(_) => return Ok(ledger),
                None => {
                    debug!(username, attempt, "ledger version moved, retrying");
                }
            }
        }

        Err(LedgerError::Contended {
            attempts: MAX_WRITE_ATTEMPTS,
        })
    }
}

impl std::fmt::Debug for LedgerService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LedgerService").finish_non_exhaustive()
    }
}

/// Request field naming the entry for `kind`.
#[must_use]
pub fn name_field(kind: EntryKind) -> &'static str {
    match kind {
        EntryKind::Income => "incomeName",
        EntryKind::Expense => "expenseName",
    }
}

/// Request field carrying the amount for `kind`.
#[must_use]
pub fn amount_field(kind: EntryKind) -> &'static str {
    match kind {
        EntryKind::Income => "incomeAmount",
        EntryKind::Expense => "expenseAmount",
    }
}
