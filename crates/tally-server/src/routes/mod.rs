//! HTTP route modules for the `Tally` server.

pub mod auth;
pub mod health;
pub mod ledger;

use std::sync::Arc;

use axum::Router;
use axum::http::{HeaderValue, Method, header};
use axum::middleware as axum_mw;
use tower::limit::ConcurrencyLimitLayer;
use tower_http::cors::{Any, CorsLayer};
use tower_http::set_header::SetResponseHeaderLayer;
use tower_http::trace::TraceLayer;

use crate::middleware::session_middleware;
use crate::state::AppState;

/// Concurrent signup/login requests allowed; each one runs Argon2.
pub const AUTH_CONCURRENCY_LIMIT: usize = 16;

/// Build the Axum router with all routes and middleware.
pub fn build_router(state: Arc<AppState>) -> Router {
    // Session routes go through the cookie middleware.
    let session_routes = Router::new()
        .merge(auth::session_router())
        .merge(ledger::router())
        .route_layer(axum_mw::from_fn_with_state(
            Arc::clone(&state),
            session_middleware,
        ));

    // Concurrency-limit signup/login so hashing cannot exhaust the blocking pool.
    let credential_routes = auth::router().layer(ConcurrencyLimitLayer::new(AUTH_CONCURRENCY_LIMIT));

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::DELETE])
        .allow_headers([header::CONTENT_TYPE]);

    Router::new()
        .merge(credential_routes)
        .merge(session_routes)
        .merge(health::router())
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .layer(SetResponseHeaderLayer::overriding(
            header::X_CONTENT_TYPE_OPTIONS,
            HeaderValue::from_static("nosniff"),
        ))
        .layer(SetResponseHeaderLayer::overriding(
            header::X_FRAME_OPTIONS,
            HeaderValue::from_static("DENY"),
        ))
        .layer(SetResponseHeaderLayer::overriding(
            header::CACHE_CONTROL,
            HeaderValue::from_static("no-store"),
        ))
        .with_state(state)
}
