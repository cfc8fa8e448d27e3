//! # courier-core
//!
//! Foundation types shared by every Courier crate.
//!
//! - [`ids`]: `UserId` (account identity) and `SessionId` (one live connection)
//! - [`message`]: the `{from, to, msg}` wire shape and inbound envelope validation
//! - [`logging`]: `tracing` subscriber bootstrap

#![deny(unsafe_code)]

pub mod ids;
pub mod logging;
pub mod message;

pub use ids::{SessionId, UserId};
pub use message::{ChatMessage, EnvelopeError, InboundEnvelope};
