//! # courier-server
//!
//! The relay core and its Axum surface.
//!
//! - [`registry`]: live `UserId` → session map with conditional unregister
//! - [`session`]: per-connection state and outbound writes
//! - [`handler`]: the session state machine (authenticate, replay, active loop, teardown)
//! - [`router`]: single consumer that delivers submitted messages to recipients
//! - [`api`]: registration, login, and user listing endpoints
//! - [`server`]: route table, listener, graceful shutdown

#![deny(unsafe_code)]

pub mod api;
pub mod config;
pub mod errors;
pub mod handler;
pub mod health;
pub mod metrics;
pub mod registry;
pub mod router;
pub mod server;
pub mod session;
pub mod shutdown;
pub mod sink;

pub use config::ServerConfig;
pub use errors::SessionError;
pub use handler::{CloseReason, InboundFrame, SessionHandler};
pub use registry::ConnectionRegistry;
pub use router::{Router, RouterHandle};
pub use server::{AppState, CourierServer, ServerHandle};
pub use session::{Session, SessionState};
pub use sink::{FrameSink, SinkError, WsSink};
