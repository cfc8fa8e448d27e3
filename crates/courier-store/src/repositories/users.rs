//! User repository: CRUD for the `users` table.

use courier_core::UserId;
use rusqlite::{Connection, ErrorCode, OptionalExtension, params};

use crate::errors::{Result, StoreError};

/// User repository.
pub struct UserRepo;

impl UserRepo {
    /// Insert a new account.
    ///
    /// A login that already exists yields [`StoreError::DuplicateAccount`].
    pub fn insert(conn: &Connection, login: &str, password_hash: &str) -> Result<()> {
        match conn.execute(
            "INSERT INTO users (login, password) VALUES (?1, ?2)",
            params![login, password_hash],
        ) {
            Ok(_) => Ok(()),
            Err(rusqlite::Error::SqliteFailure(e, _))
                if e.code == ErrorCode::ConstraintViolation =>
            {
                Err(StoreError::DuplicateAccount(login.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Stored password hash for `login`, if the account exists.
    pub fn credential(conn: &Connection, login: &str) -> Result<Option<String>> {
        let hash = conn
            .query_row(
                "SELECT password FROM users WHERE login = ?1",
                params![login],
                |row| row.get(0),
            )
            .optional()?;
        Ok(hash)
    }

    /// All logins, alphabetically.
    pub fn list(conn: &Connection) -> Result<Vec<UserId>> {
        let mut stmt = conn.prepare("SELECT login FROM users ORDER BY login")?;
        let rows = stmt
            .query_map([], |row| row.get::<_, String>(0).map(UserId::new))?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }
}
