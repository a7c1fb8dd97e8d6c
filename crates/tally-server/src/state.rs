//! Shared application state for the `Tally` server.
//!
//! A single [`AppState`] is constructed at startup and shared across all
//! Axum handlers via `Arc`. It owns the credential store handle and the
//! services built on top of it.

use std::sync::Arc;

use tally_core::account::AccountService;
use tally_core::mutator::LedgerService;
use tally_core::token::{TokenConfig, TokenService};
use tally_storage::CredentialStore;

/// Shared application state passed to all HTTP handlers.
pub struct AppState {
    /// The credential store, closed after graceful shutdown.
    pub store: Arc<dyn CredentialStore>,
    /// Ledger reads and mutations.
    pub ledgers: Arc<LedgerService>,
    /// Session token issuance, verification, and rotation.
    pub tokens: Arc<TokenService>,
    /// Signup, login, and logout.
    pub accounts: Arc<AccountService>,
    /// Whether session cookies carry the `Secure` attribute.
    pub secure_cookies: bool,
}

impl AppState {
    /// Wire every service to one store.
    #[must_use]
    pub fn new(store: Arc<dyn CredentialStore>, tokens: &TokenConfig, secure_cookies: bool) -> Self {
        let token_service = Arc::new(TokenService::new(Arc::clone(&store), tokens));
        Self {
            ledgers: Arc::new(LedgerService::new(Arc::clone(&store))),
            accounts: Arc::new(AccountService::new(
                Arc::clone(&store),
                Arc::clone(&token_service),
            )),
            tokens: token_service,
            store,
            secure_cookies,
        }
    }
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("secure_cookies", &self.secure_cookies)
            .finish_non_exhaustive()
    }
}
