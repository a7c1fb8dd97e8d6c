//! Server configuration for `Tally`.
//!
//! Loads configuration from environment variables with sensible defaults.
//! Token secrets are generated per process when unset, which logs every user
//! out on restart; set them explicitly in production.

use std::net::SocketAddr;

use chrono::Duration;
use tally_core::token::{DEFAULT_ACCESS_TTL_SECS, TokenConfig};

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to bind the HTTP listener to.
    pub bind_addr: SocketAddr,
    /// Storage backend type.
    pub storage_backend: StorageBackendType,
    /// Maximum pooled connections for the PostgreSQL backend.
    pub db_max_connections: u32,
    /// Log level filter (e.g., `info`, `debug`, `warn`).
    pub log_level: String,
    /// Token signing secrets and access token lifetime.
    pub tokens: TokenConfig,
    /// Whether the token secrets were generated because none were configured.
    pub ephemeral_secrets: bool,
    /// Whether `TALLY_ACCESS_TOKEN_TTL` was unusable and replaced by a bound.
    pub access_ttl_adjusted: bool,
    /// Whether session cookies carry the `Secure` attribute.
    pub secure_cookies: bool,
}

/// Supported storage backend types.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StorageBackendType {
    /// In-memory (development only, data lost on restart).
    Memory,
    /// PostgreSQL persistent storage.
    Postgres { url: String },
}

impl ServerConfig {
    /// Load configuration from environment variables.
    ///
    /// Environment variables:
    /// - `TALLY_BIND_ADDR`: full bind address (default: `127.0.0.1:3000`)
    /// - `PORT` / `SERVER_PORT`: port to bind on `0.0.0.0` when no bind address is set
    /// - `TALLY_STORAGE`: `memory` or `postgres` (default: `postgres` when
    ///   `DATABASE_URL` is set, otherwise `memory`)
    /// - `DATABASE_URL`: PostgreSQL connection string
    /// - `TALLY_DB_MAX_CONNECTIONS`: pool size (default: `10`)
    /// - `ACCESS_TOKEN_SECRET`, `REFRESH_TOKEN_SECRET`: HS256 signing secrets
    /// - `TALLY_ACCESS_TOKEN_TTL`: access token lifetime in seconds (default: `900`,
    ///   at most one day)
    /// - `TALLY_SECURE_COOKIES`: mark cookies `Secure` (default: `false`)
    /// - `TALLY_LOG_LEVEL`: log filter (default: `info`)
    #[must_use]
    pub fn from_env() -> Self {
        let default_addr = SocketAddr::from(([127, 0, 0, 1], 3000));
        // Priority: TALLY_BIND_ADDR > PORT > SERVER_PORT > default
        let bind_addr = if let Ok(addr) = std::env::var("TALLY_BIND_ADDR") {
            addr.parse().unwrap_or(default_addr)
        } else if let Ok(port_str) =
            std::env::var("PORT").or_else(|_| std::env::var("SERVER_PORT"))
        {
            let port: u16 = port_str.parse().unwrap_or(3000);
            SocketAddr::from(([0, 0, 0, 0], port))
        } else {
            default_addr
        };

        let database_url = std::env::var("DATABASE_URL").ok();
        let storage_backend = match std::env::var("TALLY_STORAGE")
            .map(|v| v.to_lowercase())
            .ok()
            .as_deref()
        {
            Some("memory") => StorageBackendType::Memory,
            Some("postgres" | "postgresql") => StorageBackendType::Postgres {
                url: database_url
                    .unwrap_or_else(|| "postgres://localhost/tally".to_owned()),
            },
            _ => database_url.map_or(StorageBackendType::Memory, |url| {
                StorageBackendType::Postgres { url }
            }),
        };

        let db_max_connections = std::env::var("TALLY_DB_MAX_CONNECTIONS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(10);

        let log_level = std::env::var("TALLY_LOG_LEVEL")
            .unwrap_or_else(|_| "info".to_owned());

        let access_secret = std::env::var("ACCESS_TOKEN_SECRET").ok();
        let refresh_secret = std::env::var("REFRESH_TOKEN_SECRET").ok();
        let ephemeral_secrets = access_secret.is_none() || refresh_secret.is_none();

        let (access_ttl, access_ttl_adjusted) =
            parse_access_ttl(std::env::var("TALLY_ACCESS_TOKEN_TTL").ok().as_deref());

        let tokens = TokenConfig {
            access_secret: access_secret.map_or_else(random_secret, String::into_bytes),
            refresh_secret: refresh_secret.map_or_else(random_secret, String::into_bytes),
            access_ttl,
        };

        let secure_cookies = std::env::var("TALLY_SECURE_COOKIES")
            .map(|v| v == "true" || v == "1")
            .unwrap_or(false);

        Self {
            bind_addr,
            storage_backend,
            db_max_connections,
            log_level,
            tokens,
            ephemeral_secrets,
            access_ttl_adjusted,
            secure_cookies,
        }
    }
}

/// Longest accepted access token lifetime.
pub const MAX_ACCESS_TTL_SECS: i64 = 24 * 60 * 60;

/// Parse an access token lifetime in seconds.
///
/// Unset means the default. Non-numeric or non-positive values fall back to
/// the default and values above [`MAX_ACCESS_TTL_SECS`] are clamped; both
/// report `true` so the caller can warn.
fn parse_access_ttl(raw: Option<&str>) -> (Duration, bool) {
    let default = Duration::seconds(DEFAULT_ACCESS_TTL_SECS);
    let Some(raw) = raw else {
        return (default, false);
    };
    match raw.trim().parse::<i64>() {
        Ok(secs) if secs > MAX_ACCESS_TTL_SECS => (Duration::seconds(MAX_ACCESS_TTL_SECS), true),
        Ok(secs) if secs > 0 => (Duration::seconds(secs), false),
        _ => (default, true),
    }
}

/// 32 bytes of OS CSPRNG randomness from two UUID v4s.
fn random_secret() -> Vec<u8> {
    let a = uuid::Uuid::new_v4();
    let b = uuid::Uuid::new_v4();
    let mut key = Vec::with_capacity(32);
    key.extend_from_slice(a.as_bytes());
    key.extend_from_slice(b.as_bytes());
    key
}
