//! Async seams consumed by the relay.
//!
//! The relay holds these as `Arc<dyn ...>` so tests can swap in fakes.

use async_trait::async_trait;
use courier_core::{ChatMessage, UserId};

use crate::errors::Result;

/// Append-and-query access to message history.
#[async_trait]
pub trait MessageLog: Send + Sync {
    /// Durably record a message.
    async fn append(&self, message: &ChatMessage) -> Result<()>;

    /// Messages between `a` and `b` (unordered), in storage order.
    async fn conversation(&self, a: &UserId, b: &UserId) -> Result<Vec<ChatMessage>>;
}

/// Account storage.
#[async_trait]
pub trait AccountDirectory: Send + Sync {
    /// Create an account. Fails with `DuplicateAccount` if the login exists.
    async fn create_account(&self, login: &str, password_hash: &str) -> Result<()>;

    /// Stored password hash for a login.
    async fn credential(&self, login: &str) -> Result<Option<String>>;

    /// Every registered login.
    async fn list_accounts(&self) -> Result<Vec<UserId>>;
}
