//! Message repository: append and conversation queries over `messages`.

use courier_core::{ChatMessage, UserId};
use rusqlite::{Connection, params};

use crate::errors::Result;

/// Message repository.
pub struct MessageRepo;

impl MessageRepo {
    /// Append a message. Returns its storage id.
    pub fn append(conn: &Connection, message: &ChatMessage) -> Result<i64> {
        let _ = conn.execute(
            r#"INSERT INTO messages ("from", "to", msg) VALUES (?1, ?2, ?3)"#,
            params![message.from.as_str(), message.to.as_str(), message.msg],
        )?;
        Ok(conn.last_insert_rowid())
    }

    /// Every message exchanged between `a` and `b`, in storage order.
    ///
    /// The pair is unordered. When `a == b` only messages a user sent to
    /// themselves match.
    pub fn conversation(conn: &Connection, a: &UserId, b: &UserId) -> Result<Vec<ChatMessage>> {
        let mut stmt = conn.prepare(
            r#"SELECT "from", "to", msg FROM messages
               WHERE ("from" = ?1 AND "to" = ?2) OR ("from" = ?2 AND "to" = ?1)
               ORDER BY id"#,
        )?;
        let rows = stmt
            .query_map(params![a.as_str(), b.as_str()], Self::map_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    fn map_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<ChatMessage> {
        Ok(ChatMessage {
            from: UserId::new(row.get::<_, String>(0)?),
            to: UserId::new(row.get::<_, String>(1)?),
            msg: row.get(2)?,
        })
    }
}
