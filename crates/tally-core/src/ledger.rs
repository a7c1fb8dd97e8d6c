//! The per-user ledger document.
//!
//! A [`Ledger`] holds two ordered lists of named amounts: incomes and
//! expenses. Entry names are unique per list under case-insensitive
//! comparison; the first spelling a user chose is preserved.
//!
//! This module contains only pure document operations. Loading, size
//! enforcement, and persistence live in [`crate::mutator`].

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::LedgerError;

/// Maximum serialized size of a ledger document in bytes (1 MiB).
pub const LEDGER_SIZE_LIMIT: usize = 1024 * 1024;

/// Which list of the ledger an operation targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryKind {
    Income,
    Expense,
}

impl fmt::Display for EntryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Income => write!(f, "income"),
            Self::Expense => write!(f, "expense"),
        }
    }
}

/// A named amount within a ledger list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entry {
    pub name: String,
    pub amount: f64,
}

/// Income and expense lists for one user.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Ledger {
    pub incomes: Vec<Entry>,
    pub expenses: Vec<Entry>,
}

/// Outcome of [`Ledger::upsert`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Upsert {
    /// No entry matched; a new one was appended.
    Appended,
    /// An entry matched and its amount changed.
    Updated,
    /// An entry matched with the same amount; nothing changed.
    Unchanged,
}

/// Running totals derived from a ledger.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Totals {
    pub total_income: f64,
    pub total_expenses: f64,
    pub net_balance: f64,
}

impl Ledger {
    /// An empty ledger, as created at signup.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a stored ledger document.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::Corrupt`] if the JSON is malformed or either
    /// list is missing.
    pub fn from_json(username: &str, json: &str) -> Result<Self, LedgerError> {
        serde_json::from_str(json).map_err(|e| LedgerError::Corrupt {
            username: username.to_owned(),
            reason: e.to_string(),
        })
    }

    /// Serialize the ledger for storage.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::Serialization`] if encoding fails.
    pub fn to_json(&self) -> Result<String, LedgerError> {
        serde_json::to_string(self).map_err(|e| LedgerError::Serialization {
            reason: e.to_string(),
        })
    }

    /// Borrow the list for `kind`.
    #[must_use]
    pub fn entries(&self, kind: EntryKind) -> &[Entry] {
        match kind {
            EntryKind::Income => &self.incomes,
            EntryKind::Expense => &self.expenses,
        }
    }

    fn entries_mut(&mut self, kind: EntryKind) -> &mut Vec<Entry> {
        match kind {
            EntryKind::Income => &mut self.incomes,
            EntryKind::Expense => &mut self.expenses,
        }
    }

    /// Insert an entry, or update the amount of the entry whose name matches
    /// case-insensitively.
    #[allow(clippy::float_cmp)]
    pub fn upsert(&mut self, kind: EntryKind, name: &str, amount: f64) -> Upsert {
        let list = self.entries_mut(kind);
        let key = name.to_lowercase();

        if let Some(existing) = list.iter_mut().find(|e| e.name.to_lowercase() == key) {
            if existing.amount == amount {
                return Upsert::Unchanged;
            }
            existing.amount = amount;
            return Upsert::Updated;
        }

        list.push(Entry {
            name: name.to_owned(),
            amount,
        });
        Upsert::Appended
    }

    /// Remove every entry whose name matches case-insensitively.
    ///
    /// Returns `true` if anything was removed.
    pub fn remove(&mut self, kind: EntryKind, name: &str) -> bool {
        let list = self.entries_mut(kind);
        let key = name.to_lowercase();
        let before = list.len();
        list.retain(|e| e.name.to_lowercase() != key);
        list.len() != before
    }

    /// Sum both lists.
    #[must_use]
    pub fn totals(&self) -> Totals {
        let total_income: f64 = self.incomes.iter().map(|e| e.amount).sum();
        let total_expenses: f64 = self.expenses.iter().map(|e| e.amount).sum();
        Totals {
            total_income,
            total_expenses,
            net_balance: total_income - total_expenses,
        }
    }
}

/// Reject a change whose projected size would exceed [`LEDGER_SIZE_LIMIT`].
///
/// The projection is the compact serialization of the current document plus
/// the serialized standalone delta entry. It overestimates the true
/// post-change size, so the check never needs the updated document.
///
/// # Errors
///
/// - [`LedgerError::SizeLimitExceeded`] if the projected size is over the cap.
/// - [`LedgerError::Serialization`] if encoding fails.
pub fn check_size(current_json: &str, delta: &Entry) -> Result<(), LedgerError> {
    let delta_len = serde_json::to_vec(delta)
        .map_err(|e| LedgerError::Serialization {
            reason: e.to_string(),
        })?
        .len();
    let size = current_json.len().saturating_add(delta_len);
    if size > LEDGER_SIZE_LIMIT {
        return Err(LedgerError::SizeLimitExceeded {
            size,
            limit: LEDGER_SIZE_LIMIT,
        });
    }
    Ok(())
}
