//! Token service — issue, verify, rotate, and revoke bearer credential pairs.
//!
//! Access and refresh tokens are signed with distinct secrets so one leaked
//! key never compromises both. Revocation keys are SHA-256 fingerprints of
//! the token text (the raw bearer string is never stored server-side), with
//! TTL equal to the token's remaining lifetime.
//!
//! Rotation closes the replay window: the old refresh token's fingerprint
//! is claimed atomically before a new pair is issued, so a refresh token
//! rotates successfully exactly once. A second rotation attempt on the same
//! token fails with [`AuthError::Revoked`] — probable token theft.

use std::sync::Arc;
use std::time::Duration;

use base64::Engine as _;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use sha2::{Digest, Sha256};
use tracing::{debug, instrument};

use crate::claims::{Claims, Subject, TokenPair, TokenType};
use crate::errors::AuthError;
use crate::revocation::RevocationStore;

/// Token service configuration.
#[derive(Clone)]
pub struct TokenServiceConfig {
    /// HS256 secret for access tokens.
    pub access_secret: String,
    /// HS256 secret for refresh tokens.
    pub refresh_secret: String,
    /// Access token lifetime in seconds.
    pub access_ttl_secs: u64,
    /// Refresh token lifetime in seconds.
    pub refresh_ttl_secs: u64,
}

impl TokenServiceConfig {
    /// Config with the given secrets and default lifetimes
    /// (15 minutes access, 30 days refresh).
    #[must_use]
    pub fn new(access_secret: impl Into<String>, refresh_secret: impl Into<String>) -> Self {
        Self {
            access_secret: access_secret.into(),
            refresh_secret: refresh_secret.into(),
            access_ttl_secs: 900,
            refresh_ttl_secs: 30 * 24 * 60 * 60,
        }
    }
}

/// Issues, verifies, rotates, and revokes bearer credential pairs.
pub struct TokenService {
    access_encoding: EncodingKey,
    access_decoding: DecodingKey,
    refresh_encoding: EncodingKey,
    refresh_decoding: DecodingKey,
    access_ttl_secs: u64,
    refresh_ttl_secs: u64,
    validation: Validation,
    revocations: Arc<dyn RevocationStore>,
}

impl TokenService {
    /// Create a token service over the given revocation store.
    #[must_use]
    pub fn new(config: &TokenServiceConfig, revocations: Arc<dyn RevocationStore>) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        // Revocation must take effect with sub-second consistency, so no
        // clock leeway on expiry checks either.
        validation.leeway = 0;
        Self {
            access_encoding: EncodingKey::from_secret(config.access_secret.as_bytes()),
            access_decoding: DecodingKey::from_secret(config.access_secret.as_bytes()),
            refresh_encoding: EncodingKey::from_secret(config.refresh_secret.as_bytes()),
            refresh_decoding: DecodingKey::from_secret(config.refresh_secret.as_bytes()),
            access_ttl_secs: config.access_ttl_secs,
            refresh_ttl_secs: config.refresh_ttl_secs,
            validation,
            revocations,
        }
    }

    /// Issue a fresh access + refresh pair for a subject. No side effects
    /// beyond signing.
    pub fn issue(&self, subject: &Subject) -> Result<TokenPair, AuthError> {
        let now = chrono::Utc::now().timestamp();
        let access_claims = Claims::new(
            subject,
            TokenType::Access,
            now,
            i64::try_from(self.access_ttl_secs).unwrap_or(i64::MAX),
        );
        let refresh_claims = Claims::new(
            subject,
            TokenType::Refresh,
            now,
            i64::try_from(self.refresh_ttl_secs).unwrap_or(i64::MAX),
        );

        let header = Header::new(Algorithm::HS256);
        let access_token = encode(&header, &access_claims, &self.access_encoding)
            .map_err(|e| AuthError::Signing(e.to_string()))?;
        let refresh_token = encode(&header, &refresh_claims, &self.refresh_encoding)
            .map_err(|e| AuthError::Signing(e.to_string()))?;

        Ok(TokenPair {
            access_token,
            refresh_token,
        })
    }

    /// Verify an access token: signature, expiry, token type, and
    /// revocation state.
    pub async fn verify_access(&self, token: &str) -> Result<Claims, AuthError> {
        let claims = self.decode(token, TokenType::Access)?;
        if self.revocations.exists(&fingerprint(token)).await? {
            return Err(AuthError::Revoked);
        }
        Ok(claims)
    }

    /// Verify a refresh token: signature, expiry, token type, and
    /// revocation state.
    pub async fn verify_refresh(&self, token: &str) -> Result<Claims, AuthError> {
        let claims = self.decode(token, TokenType::Refresh)?;
        if self.revocations.exists(&fingerprint(token)).await? {
            return Err(AuthError::Revoked);
        }
        Ok(claims)
    }

    /// Rotate a refresh token: blacklist the old token and issue a new
    /// pair, atomically with respect to concurrent rotations of the same
    /// token.
    #[instrument(skip_all)]
    pub async fn rotate_refresh(&self, old_refresh: &str) -> Result<TokenPair, AuthError> {
        let claims = self.decode(old_refresh, TokenType::Refresh)?;

        let now = chrono::Utc::now().timestamp();
        let ttl = Duration::from_secs(claims.remaining_secs(now));
        let claimed = self
            .revocations
            .insert_if_absent(&fingerprint(old_refresh), ttl)
            .await?;
        if !claimed {
            debug!(sub = %claims.sub, "refresh token replayed");
            return Err(AuthError::Revoked);
        }

        self.issue(&Subject {
            id: claims.sub,
            email: claims.email,
        })
    }

    /// Revoke a token (either kind) for the remainder of its lifetime.
    ///
    /// Revoking an already-expired token is a no-op: the expiry check
    /// rejects it regardless.
    pub async fn revoke(&self, token: &str) -> Result<(), AuthError> {
        let claims = self
            .decode(token, TokenType::Access)
            .or_else(|_| self.decode(token, TokenType::Refresh))?;

        let now = chrono::Utc::now().timestamp();
        let remaining = claims.remaining_secs(now);
        if remaining == 0 {
            return Ok(());
        }
        self.revocations
            .set_with_expiry(&fingerprint(token), Duration::from_secs(remaining))
            .await
    }

    /// Whether a token is in the revocation set.
    pub async fn is_revoked(&self, token: &str) -> Result<bool, AuthError> {
        self.revocations.exists(&fingerprint(token)).await
    }

    /// Decode and validate one token kind.
    fn decode(&self, token: &str, expected: TokenType) -> Result<Claims, AuthError> {
        let key = match expected {
            TokenType::Access => &self.access_decoding,
            TokenType::Refresh => &self.refresh_decoding,
        };
        let data = decode::<Claims>(token, key, &self.validation)
            .map_err(|e| AuthError::InvalidToken(e.to_string()))?;
        if data.claims.token_type != expected {
            return Err(AuthError::InvalidToken("wrong token type".into()));
        }
        Ok(data.claims)
    }
}

/// Revocation-set key for a token: namespaced SHA-256 fingerprint. The raw
/// bearer string never reaches the store.
fn fingerprint(token: &str) -> String {
    let digest = Sha256::digest(token.as_bytes());
    format!("revoked:{}", URL_SAFE_NO_PAD.encode(digest))
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
