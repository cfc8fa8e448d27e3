//! Authentication errors.

use thiserror::Error;

/// Errors from token handling and header parsing.
#[derive(Debug, Error)]
pub enum AuthError {
    /// The `Authorization` header was absent or not `<scheme> <token>`.
    #[error("malformed authorization header")]
    MalformedHeader,

    /// Token failed signature, expiry, or claim checks.
    #[error("invalid token: {0}")]
    InvalidToken(String),

    /// Token could not be signed.
    #[error("token signing failed: {0}")]
    Signing(String),
}

/// Convenience type alias for auth results.
pub type Result<T> = std::result::Result<T, AuthError>;
