//! # courier-auth
//!
//! Identity assertion for the Courier relay.
//!
//! - [`token`]: HS256 tokens binding a login, validated into a typed [`Assertion`]
//! - [`header`]: `Authorization: <scheme> <token>` parsing
//! - [`password`]: salted password hashing and verification

#![deny(unsafe_code)]

pub mod errors;
pub mod header;
pub mod password;
pub mod token;

pub use errors::{AuthError, Result};
pub use header::parse_authorization;
pub use password::{hash_password, verify_password};
pub use token::{Assertion, TokenIssuer, TokenValidator};
