//! JWT claim and token-pair types.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Whether a token grants access or refresh rights.
///
/// Carried in the claims so an access token can never be replayed against
/// the refresh endpoint (and vice versa), even if the secrets were shared.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenType {
    /// Short-lived bearer credential for API calls.
    Access,
    /// Long-lived credential exchangeable for a new pair.
    Refresh,
}

/// Claims carried by both token kinds.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Claims {
    /// Subject identifier.
    pub sub: String,
    /// Subject email.
    pub email: String,
    /// Issued-at (unix seconds).
    pub iat: i64,
    /// Expiry (unix seconds).
    pub exp: i64,
    /// Unique token identifier.
    pub jti: String,
    /// Access vs. refresh discriminator.
    pub token_type: TokenType,
}

impl Claims {
    /// Build claims for a subject with the given lifetime.
    #[must_use]
    pub fn new(subject: &Subject, token_type: TokenType, now: i64, ttl_secs: i64) -> Self {
        Self {
            sub: subject.id.clone(),
            email: subject.email.clone(),
            iat: now,
            exp: now + ttl_secs,
            jti: Uuid::now_v7().to_string(),
            token_type,
        }
    }

    /// Seconds until expiry from `now` (zero if already expired).
    #[must_use]
    pub fn remaining_secs(&self, now: i64) -> u64 {
        u64::try_from(self.exp - now).unwrap_or(0)
    }
}

/// The identity a token pair is issued for.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subject {
    /// Subject identifier.
    pub id: String,
    /// Subject email.
    pub email: String,
}

/// An issued access + refresh token pair.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenPair {
    /// Short-lived access token.
    pub access_token: String,
    /// Long-lived refresh token.
    pub refresh_token: String,
}
