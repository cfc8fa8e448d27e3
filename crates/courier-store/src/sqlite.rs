//! [`SqliteStore`]: pool-backed implementation of the store seams.

use async_trait::async_trait;
use courier_core::{ChatMessage, UserId};
use rusqlite::Connection;

use crate::connection::{self, ConnectionConfig, ConnectionPool};
use crate::errors::{Result, StoreError};
use crate::migrations::run_migrations;
use crate::repositories::{MessageRepo, UserRepo};
use crate::traits::{AccountDirectory, MessageLog};

/// Durable log over an `r2d2` `SQLite` pool.
#[derive(Clone)]
pub struct SqliteStore {
    pool: ConnectionPool,
}

impl SqliteStore {
    /// Wrap an existing pool.
    pub fn new(pool: ConnectionPool) -> Self {
        Self { pool }
    }

    /// Open a file-backed store and bring its schema up to date.
    pub fn open(path: &str, config: &ConnectionConfig) -> Result<Self> {
        let store = Self::new(connection::new_file(path, config)?);
        let _ = store.migrate()?;
        Ok(store)
    }

    /// Open a migrated in-memory store (for tests).
    pub fn in_memory() -> Result<Self> {
        let store = Self::new(connection::new_in_memory(&ConnectionConfig::default())?);
        let _ = store.migrate()?;
        Ok(store)
    }

    /// Apply pending migrations. Returns how many ran.
    pub fn migrate(&self) -> Result<u32> {
        let conn = self.pool.get()?;
        run_migrations(&conn)
    }

    /// Run `f` with a pooled connection on the blocking thread pool.
    async fn with_conn<T, F>(&self, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> Result<T> + Send + 'static,
    {
        let pool = self.pool.clone();
        tokio::task::spawn_blocking(move || {
            let conn = pool.get()?;
            f(&conn)
        })
        .await
        .map_err(|e| StoreError::Internal(format!("blocking task failed: {e}")))?
    }
}

#[async_trait]
impl MessageLog for SqliteStore {
    async fn append(&self, message: &ChatMessage) -> Result<()> {
        let message = message.clone();
        let _ = self
            .with_conn(move |conn| MessageRepo::append(conn, &message))
            .await?;
        Ok(())
    }

    async fn conversation(&self, a: &UserId, b: &UserId) -> Result<Vec<ChatMessage>> {
        let (a, b) = (a.clone(), b.clone());
        self.with_conn(move |conn| MessageRepo::conversation(conn, &a, &b))
            .await
    }
}

#[async_trait]
impl AccountDirectory for SqliteStore {
    async fn create_account(&self, login: &str, password_hash: &str) -> Result<()> {
        let (login, hash) = (login.to_string(), password_hash.to_string());
        self.with_conn(move |conn| UserRepo::insert(conn, &login, &hash))
            .await
    }

    async fn credential(&self, login: &str) -> Result<Option<String>> {
        let login = login.to_string();
        self.with_conn(move |conn| UserRepo::credential(conn, &login))
            .await
    }

    async fn list_accounts(&self) -> Result<Vec<UserId>> {
        self.with_conn(UserRepo::list).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    fn msg(from: &str, to: &str, body: &str) -> ChatMessage {
        ChatMessage::new(UserId::new(from), UserId::new(to), body).unwrap()
    }

    #[tokio::test]
    async fn accounts_roundtrip() {
        let store = SqliteStore::in_memory().unwrap();
        store.create_account("alice", "h").await.unwrap();
        assert_matches!(
            store.create_account("alice", "h").await,
            Err(StoreError::DuplicateAccount(_))
        );
        assert_eq!(store.credential("alice").await.unwrap().as_deref(), Some("h"));
        assert_eq!(store.list_accounts().await.unwrap(), [UserId::new("alice")]);
    }

    #[tokio::test]
    async fn history_roundtrip() {
        let store = SqliteStore::in_memory().unwrap();
        store.append(&msg("alice", "bob", "hi")).await.unwrap();
        store.append(&msg("bob", "alice", "yo")).await.unwrap();
        let got = store
            .conversation(&UserId::new("bob"), &UserId::new("alice"))
            .await
            .unwrap();
        assert_eq!(got, [msg("alice", "bob", "hi"), msg("bob", "alice", "yo")]);
    }

    #[tokio::test]
    async fn file_store_persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("courier.db");
        let path = path.to_str().unwrap();
        {
            let store = SqliteStore::open(path, &ConnectionConfig::default()).unwrap();
            store.append(&msg("alice", "bob", "kept")).await.unwrap();
        }
        let store = SqliteStore::open(path, &ConnectionConfig::default()).unwrap();
        assert_eq!(store.migrate().unwrap(), 0);
        let got = store
            .conversation(&UserId::new("alice"), &UserId::new("bob"))
            .await
            .unwrap();
        assert_eq!(got.len(), 1);
    }
}
