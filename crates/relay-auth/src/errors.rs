//! Auth error types.

use thiserror::Error;

/// Errors returned by the token service.
#[derive(Debug, Error)]
pub enum AuthError {
    /// Signature, expiry, or shape check failed.
    #[error("invalid token: {0}")]
    InvalidToken(String),

    /// The token is present in the revocation set. On a rotation attempt
    /// this signals replay (the refresh token was already used once).
    #[error("token has been revoked")]
    Revoked,

    /// The revocation store is unreachable or failed.
    #[error("revocation store error: {0}")]
    Store(String),

    /// Token signing failed (bad key material).
    #[error("token signing failed: {0}")]
    Signing(String),
}

impl AuthError {
    /// Machine-readable code for wire responses.
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidToken(_) => "INVALID_TOKEN",
            Self::Revoked => "TOKEN_REVOKED",
            Self::Store(_) => "AUTH_STORE_ERROR",
            Self::Signing(_) => "TOKEN_SIGNING_ERROR",
        }
    }
}
