//! Session error taxonomy.

use courier_auth::AuthError;
use thiserror::Error;

use crate::sink::SinkError;

/// Why a session ended abnormally.
#[derive(Debug, Error)]
pub enum SessionError {
    /// Missing, malformed, or invalid credentials.
    #[error("unauthorized: {0}")]
    Unauthorized(#[from] AuthError),

    /// An outbound write failed or timed out.
    #[error("write failed: {0}")]
    Write(#[from] SinkError),

    /// The inbound stream reported an error.
    #[error("read failed: {0}")]
    Read(String),
}
