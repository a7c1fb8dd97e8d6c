//! `Tally` server entry point.
//!
//! Builds the credential store and services, then starts the Axum HTTP
//! server with graceful shutdown. The store is closed once in-flight
//! requests have drained.

use std::sync::Arc;

use anyhow::Context;
use tokio::net::TcpListener;
use tracing::{info, warn};

use tally_storage::{CredentialStore, MemoryBackend};

use tally_server::config::{ServerConfig, StorageBackendType};
use tally_server::routes::build_router;
use tally_server::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = ServerConfig::from_env();

    // Initialize structured logging.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.log_level)),
        )
        .json()
        .init();

    info!(storage = storage_kind(&config.storage_backend), "Tally starting");

    if config.ephemeral_secrets {
        warn!(
            "ACCESS_TOKEN_SECRET or REFRESH_TOKEN_SECRET not set, using random per-process secrets; sessions will not survive a restart"
        );
    }

    if config.access_ttl_adjusted {
        warn!(
            ttl_secs = config.tokens.access_ttl.num_seconds(),
            "TALLY_ACCESS_TOKEN_TTL is not a usable number of seconds, using a bounded value"
        );
    }

    let store = open_store(&config).await?;
    let state = Arc::new(AppState::new(store, &config.tokens, config.secure_cookies));

    let app = build_router(Arc::clone(&state));

    let listener = TcpListener::bind(config.bind_addr)
        .await
        .with_context(|| format!("failed to bind to {}", config.bind_addr))?;

    info!(addr = %config.bind_addr, "Tally server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    info!("closing credential store");
    state.store.close().await;

    info!("Tally server stopped");
    Ok(())
}

/// Open the configured credential store.
async fn open_store(config: &ServerConfig) -> anyhow::Result<Arc<dyn CredentialStore>> {
    let store: Arc<dyn CredentialStore> = match &config.storage_backend {
        StorageBackendType::Memory => {
            info!("using in-memory storage (data will not persist)");
            Arc::new(MemoryBackend::new())
        }
        #[cfg(feature = "postgres-backend")]
        StorageBackendType::Postgres { url } => {
            info!(url = %"[redacted]", "using PostgreSQL storage");
            Arc::new(
                tally_storage::PostgresBackend::connect(url, config.db_max_connections)
                    .await
                    .context("failed to connect to PostgreSQL storage")?,
            )
        }
        #[cfg(not(feature = "postgres-backend"))]
        StorageBackendType::Postgres { .. } => {
            anyhow::bail!(
                "PostgreSQL backend requested but feature 'postgres-backend' is not enabled"
            );
        }
    };
    Ok(store)
}

fn storage_kind(backend: &StorageBackendType) -> &'static str {
    match backend {
        StorageBackendType::Memory => "memory",
        StorageBackendType::Postgres { .. } => "postgres",
    }
}

/// Wait for SIGINT or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c().await.ok();
    };

    #[cfg(unix)]
    let terminate = async {
        if let Ok(mut sig) =
            tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
        {
            sig.recv().await;
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    info!("shutdown signal received, stopping server");
}
