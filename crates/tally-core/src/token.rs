//! Session tokens for `Tally`.
//!
//! A session is a pair of HS256-signed tokens:
//!
//! - **Access token**: short-lived (15 minutes by default), carries `exp`.
//!   Verified on every request by signature and expiry alone.
//! - **Refresh token**: no `exp` claim. Its validity is decided by presence
//!   in the credential store, not by its signature: a correctly signed
//!   refresh token whose hash is no longer stored is revoked.
//!
//! # Security model
//!
//! - Access and refresh tokens use separate secrets.
//! - Refresh tokens are stored as `SHA-256(token)`; the plaintext only ever
//!   lives in the client's cookie.
//! - Starting a session deletes every previous refresh token of the user, so
//!   at most one refresh token is live per user after a login.
//! - Verification uses zero leeway on expiry.

use std::sync::Arc;

use chrono::{Duration, Utc};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tally_storage::{CredentialStore, normalize_username};
use tracing::{debug, info};

use crate::error::TokenError;

/// Default access token lifetime.
pub const DEFAULT_ACCESS_TTL_SECS: i64 = 15 * 60;

/// Claims carried by an access token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessClaims {
    /// Lowercased username.
    pub sub: String,
    pub iat: i64,
    pub exp: i64,
}

/// Claims carried by a refresh token. No expiry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefreshClaims {
    /// Lowercased username.
    pub sub: String,
    pub iat: i64,
    /// Unique per issuance so two sessions never share a token.
    pub jti: String,
}

/// Secrets and lifetimes for the token service.
#[derive(Clone)]
pub struct TokenConfig {
    pub access_secret: Vec<u8>,
    pub refresh_secret: Vec<u8>,
    pub access_ttl: Duration,
}

impl std::fmt::Debug for TokenConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenConfig")
            .field("access_secret", &"[redacted]")
            .field("refresh_secret", &"[redacted]")
            .field("access_ttl", &self.access_ttl)
            .finish()
    }
}

/// A freshly issued access/refresh pair.
#[derive(Clone)]
pub struct SessionTokens {
    pub access_token: String,
    pub refresh_token: String,
}

impl std::fmt::Debug for SessionTokens {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionTokens").finish_non_exhaustive()
    }
}

/// Result of minting a new access token from a refresh token.
#[derive(Clone)]
pub struct Rotation {
    /// Owner of the refresh token.
    pub username: String,
    /// The newly issued access token.
    pub access_token: String,
}

impl std::fmt::Debug for Rotation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Rotation")
            .field("username", &self.username)
            .finish_non_exhaustive()
    }
}

/// Issues, verifies, rotates, and revokes session tokens.
pub struct TokenService {
    store: Arc<dyn CredentialStore>,
    access_encoding: EncodingKey,
    access_decoding: DecodingKey,
    refresh_encoding: EncodingKey,
    refresh_decoding: DecodingKey,
    access_ttl: Duration,
}

impl TokenService {
    /// Create a new token service backed by the given store.
    #[must_use]
    pub fn new(store: Arc<dyn CredentialStore>, config: &TokenConfig) -> Self {
        Self {
            store,
            access_encoding: EncodingKey::from_secret(&config.access_secret),
            access_decoding: DecodingKey::from_secret(&config.access_secret),
            refresh_encoding: EncodingKey::from_secret(&config.refresh_secret),
            refresh_decoding: DecodingKey::from_secret(&config.refresh_secret),
            access_ttl: config.access_ttl,
        }
    }

    /// Issue a signed access token expiring after the configured TTL.
    ///
    /// # Errors
    ///
    /// Returns [`TokenError::Signing`] if the expiry is out of range or encoding fails.
    pub fn issue_access_token(&self, username: &str) -> Result<String, TokenError> {
        let now = Utc::now();
        let expires = now
            .checked_add_signed(self.access_ttl)
            .ok_or_else(|| TokenError::Signing {
                reason: "access token expiry is out of range".to_owned(),
            })?;
        let claims = AccessClaims {
            sub: normalize_username(username),
            iat: now.timestamp(),
            exp: expires.timestamp(),
        };
        sign(&claims, &self.access_encoding)
    }

    /// Issue a signed refresh token with no encoded expiry.
    ///
    /// The token is not persisted here; see [`start_session`](Self::start_session).
    ///
    /// # Errors
    ///
    /// Returns [`TokenError::Signing`] if encoding fails.
    pub fn issue_refresh_token(&self, username: &str) -> Result<String, TokenError> {
        let claims = RefreshClaims {
            sub: normalize_username(username),
            iat: Utc::now().timestamp(),
            jti: uuid::Uuid::new_v4().as_simple().to_string(),
        };
        sign(&claims, &self.refresh_encoding)
    }

    /// Verify an access token's signature and expiry.
    ///
    /// # Errors
    ///
    /// - [`TokenError::Expired`] if `exp` has passed.
    /// - [`TokenError::Invalid`] for any other decoding or signature failure.
    pub fn verify_access(&self, token: &str) -> Result<AccessClaims, TokenError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        validation.set_required_spec_claims(&["exp", "sub"]);

        jsonwebtoken::decode::<AccessClaims>(token, &self.access_decoding, &validation)
            .map(|data| data.claims)
            .map_err(|e| match e.kind() {
                ErrorKind::ExpiredSignature => TokenError::Expired,
                _ => TokenError::Invalid {
                    reason: e.to_string(),
                },
            })
    }

    /// Verify a refresh token's signature. Does not consult the store.
    ///
    /// # Errors
    ///
    /// Returns [`TokenError::Invalid`] if the token does not decode or verify.
    pub fn verify_refresh(&self, token: &str) -> Result<RefreshClaims, TokenError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = false;
        validation.set_required_spec_claims(&["sub"]);

        jsonwebtoken::decode::<RefreshClaims>(token, &self.refresh_decoding, &validation)
            .map(|data| data.claims)
            .map_err(|e| TokenError::Invalid {
                reason: e.to_string(),
            })
    }

    /// Mint a new access token from a refresh token.
    ///
    /// Store membership is checked first and is authoritative: an absent
    /// token is revoked no matter how valid its signature is.
    ///
    /// # Errors
    ///
    /// - [`TokenError::Revoked`] if the token hash is not stored.
    /// - [`TokenError::Invalid`] if the signature fails or the subject does
    ///   not match the stored owner.
    /// - [`TokenError::Storage`] if the store fails.
    pub async fn rotate_on_expiry(&self, refresh_token: &str) -> Result<Rotation, TokenError> {
        let owner = self
            .store
            .refresh_token_owner(&hash_token(refresh_token))
            .await?
            .ok_or(TokenError::Revoked)?;

        let claims = self.verify_refresh(refresh_token)?;
        if claims.sub != owner {
            return Err(TokenError::Invalid {
                reason: "refresh token subject does not match its owner".to_owned(),
            });
        }

        let access_token = self.issue_access_token(&owner)?;
        debug!(username = %owner, "access token rotated");

        Ok(Rotation {
            username: owner,
            access_token,
        })
    }

    /// Start a new session: revoke every prior refresh token of the user,
    /// then issue and persist a fresh pair.
    ///
    /// # Errors
    ///
    /// - [`TokenError::Signing`] if encoding fails.
    /// - [`TokenError::Storage`] if the store fails.
    pub async fn start_session(&self, username: &str) -> Result<SessionTokens, TokenError> {
        let revoked = self.store.revoke_refresh_tokens(username).await?;

        let access_token = self.issue_access_token(username)?;
        let refresh_token = self.issue_refresh_token(username)?;
        self.store
            .insert_refresh_token(&hash_token(&refresh_token), username)
            .await?;

        info!(username, revoked, "session started");

        Ok(SessionTokens {
            access_token,
            refresh_token,
        })
    }

    /// End every session of the user by deleting their refresh tokens.
    ///
    /// Returns the number of tokens revoked.
    ///
    /// # Errors
    ///
    /// Returns [`TokenError::Storage`] if the store fails.
    pub async fn end_session(&self, username: &str) -> Result<u64, TokenError> {
        let revoked = self.store.revoke_refresh_tokens(username).await?;
        info!(username, revoked, "session ended");
        Ok(revoked)
    }
}

impl std::fmt::Debug for TokenService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenService")
            .field("access_ttl", &self.access_ttl)
            .finish_non_exhaustive()
    }
}

fn sign<T: Serialize>(claims: &T, key: &EncodingKey) -> Result<String, TokenError> {
    jsonwebtoken::encode(&Header::new(Algorithm::HS256), claims, key).map_err(|e| {
        TokenError::Signing {
            reason: e.to_string(),
        }
    })
}

/// Hash a token with SHA-256, returning the hex-encoded digest.
///
/// Refresh tokens are stored and looked up by this hash.
#[must_use]
pub fn hash_token(token: &str) -> String {
    let digest = Sha256::digest(token.as_bytes());
    hex::encode(digest)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use tally_storage::MemoryBackend;

    fn config(ttl: Duration) -> TokenConfig {
        TokenConfig {
            access_secret: b"access-secret-for-tests".to_vec(),
            refresh_secret: b"refresh-secret-for-tests".to_vec(),
            access_ttl: ttl,
        }
    }

    fn service() -> (TokenService, MemoryBackend) {
        let store = MemoryBackend::new();
        let svc = TokenService::new(
            Arc::new(store.clone()),
            &config(Duration::seconds(DEFAULT_ACCESS_TTL_SECS)),
        );
        (svc, store)
    }

    #[test]
    fn access_token_roundtrip() {
        let (svc, _) = service();
        let token = svc.issue_access_token("Alice").unwrap();
        let claims = svc.verify_access(&token).unwrap();
        assert_eq!(claims.sub, "alice");
        assert_eq!(claims.exp - claims.iat, DEFAULT_ACCESS_TTL_SECS);
    }

    #[test]
    fn expired_access_token_is_reported_as_expired() {
        let store = Arc::new(MemoryBackend::new());
        let svc = TokenService::new(store, &config(Duration::seconds(-120)));
        let token = svc.issue_access_token("alice").unwrap();
        assert!(matches!(svc.verify_access(&token), Err(TokenError::Expired)));
    }

    #[test]
    fn out_of_range_ttl_is_an_error_not_a_panic() {
        let store = Arc::new(MemoryBackend::new());
        let svc = TokenService::new(store, &config(Duration::days(365_000_000)));
        assert!(matches!(
            svc.issue_access_token("alice"),
            Err(TokenError::Signing { .. })
        ));
    }

    #[test]
    fn tampered_or_foreign_tokens_are_invalid() {
        let (svc, _) = service();
        assert!(matches!(
            svc.verify_access("not.a.jwt"),
            Err(TokenError::Invalid { .. })
        ));

        // A refresh token is signed with the other secret.
        let refresh = svc.issue_refresh_token("alice").unwrap();
        assert!(matches!(
            svc.verify_access(&refresh),
            Err(TokenError::Invalid { .. })
        ));

        let access = svc.issue_access_token("alice").unwrap();
        assert!(matches!(
            svc.verify_refresh(&access),
            Err(TokenError::Invalid { .. })
        ));
    }

    #[test]
    fn refresh_tokens_are_unique_per_issue() {
        let (svc, _) = service();
        let a = svc.issue_refresh_token("alice").unwrap();
        let b = svc.issue_refresh_token("alice").unwrap();
        assert_ne!(a, b);
        assert_eq!(svc.verify_refresh(&a).unwrap().sub, "alice");
    }

    #[tokio::test]
    async fn unstored_refresh_token_is_revoked_even_if_signed() {
        let (svc, _) = service();
        let refresh = svc.issue_refresh_token("alice").unwrap();
        assert!(matches!(
            svc.rotate_on_expiry(&refresh).await,
            Err(TokenError::Revoked)
        ));
    }

    #[tokio::test]
    async fn session_refresh_token_rotates() {
        let (svc, _) = service();
        let session = svc.start_session("Alice").await.unwrap();

        let rotation = svc.rotate_on_expiry(&session.refresh_token).await.unwrap();
        assert_eq!(rotation.username, "alice");
        assert_eq!(svc.verify_access(&rotation.access_token).unwrap().sub, "alice");
    }

    #[tokio::test]
    async fn new_session_revokes_previous_refresh_tokens() {
        let (svc, _) = service();
        let first = svc.start_session("alice").await.unwrap();
        let second = svc.start_session("ALICE").await.unwrap();

        assert!(matches!(
            svc.rotate_on_expiry(&first.refresh_token).await,
            Err(TokenError::Revoked)
        ));
        assert!(svc.rotate_on_expiry(&second.refresh_token).await.is_ok());
    }

    #[tokio::test]
    async fn end_session_revokes_refresh_token() {
        let (svc, _) = service();
        let session = svc.start_session("alice").await.unwrap();

        assert_eq!(svc.end_session("alice").await.unwrap(), 1);
        assert!(matches!(
            svc.rotate_on_expiry(&session.refresh_token).await,
            Err(TokenError::Revoked)
        ));
    }

    #[tokio::test]
    async fn refresh_tokens_are_stored_hashed() {
        let (svc, store) = service();
        let session = svc.start_session("alice").await.unwrap();

        assert_eq!(store.refresh_token_owner(&session.refresh_token).await.unwrap(), None);
        assert_eq!(
            store
                .refresh_token_owner(&hash_token(&session.refresh_token))
                .await
                .unwrap()
                .as_deref(),
            Some("alice")
        );
    }

    #[tokio::test]
    async fn stored_token_with_mismatched_owner_is_invalid() {
        let (svc, store) = service();
        let refresh = svc.issue_refresh_token("alice").unwrap();
        store
            .insert_refresh_token(&hash_token(&refresh), "mallory")
            .await
            .unwrap();

        assert!(matches!(
            svc.rotate_on_expiry(&refresh).await,
            Err(TokenError::Invalid { .. })
        ));
    }

    #[test]
    fn hash_is_stable_hex_sha256() {
        assert_eq!(
            hash_token("abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }
}
