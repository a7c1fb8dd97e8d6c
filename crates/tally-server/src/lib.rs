//! `Tally` HTTP server.
//!
//! Wires together the core library, the credential store, and the HTTP
//! routes into a running Axum server. Protected routes sit behind the cookie
//! session middleware.

pub mod config;
pub mod error;
pub mod extract;
pub mod middleware;
pub mod routes;
pub mod state;
