//! Core library for `Tally`.
//!
//! Contains the ledger document model, the entry mutator, the two-token
//! session service, account signup/login, and the input validators. This
//! crate depends on `tally-storage` for the credential store trait and knows
//! nothing about HTTP.

pub mod account;
pub mod error;
pub mod ledger;
pub mod mutator;
pub mod token;
pub mod validation;
