//! `Authorization` header parsing.

use crate::errors::{AuthError, Result};

/// Extract the token from `<scheme> <token>`.
///
/// The value must split on single spaces into exactly two non-empty parts.
/// The scheme itself is not checked.
pub fn parse_authorization(value: &str) -> Result<&str> {
    let mut parts = value.split(' ');
    match (parts.next(), parts.next(), parts.next()) {
        (Some(scheme), Some(token), None) if !scheme.is_empty() && !token.is_empty() => Ok(token),
        _ => Err(AuthError::MalformedHeader),
    }
}
