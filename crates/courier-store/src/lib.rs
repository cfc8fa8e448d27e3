//! # courier-store
//!
//! Durable log for the Courier relay, backed by `SQLite`.
//!
//! - [`connection`]: `r2d2` pool with WAL and busy-timeout pragmas
//! - [`migrations`]: embedded, versioned schema migrations
//! - [`repositories`]: stateless SQL access (`UserRepo`, `MessageRepo`)
//! - [`traits`]: the async seams the relay depends on (`AccountDirectory`, `MessageLog`)
//! - [`sqlite`]: [`SqliteStore`], implementing both seams over a pool
//!
//! Repositories are synchronous and take `&Connection`; [`SqliteStore`]
//! moves each call onto the blocking pool so async callers never block a
//! runtime worker on disk I/O.

#![deny(unsafe_code)]

pub mod connection;
pub mod errors;
pub mod migrations;
pub mod repositories;
pub mod sqlite;
pub mod traits;

pub use connection::{ConnectionConfig, ConnectionPool};
pub use errors::{Result, StoreError};
pub use sqlite::SqliteStore;
pub use traits::{AccountDirectory, MessageLog};
