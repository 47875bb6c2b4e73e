use anyhow::{Result, anyhow};
use rusqlite::{Connection, OptionalExtension, Row, params};
use tracing::{debug, info};
use uuid::Uuid;

use twinby_types::models::canonical_pair;

use crate::columns::{now_timestamp, opt_time_at, time_at, uuid_at};
use crate::models::{ChatRow, ChatSummaryRow, MessageRow};
use crate::{Database, is_unique_violation, write_tx};

/// Outcome of inserting a chat row for a canonical pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChatInsert {
    Created(Uuid),
    /// The pair already has a chat; the unique constraint rejected the insert.
    Conflict,
}

impl Database {
    // -- Chats --

    /// Returns the chat for the unordered pair, creating it if needed.
    pub fn ensure_chat(&self, actor: Uuid, target: Uuid) -> Result<Uuid> {
        self.with_conn_mut(|conn| {
            let tx = write_tx(conn)?;
            let chat_id = ensure_chat(&tx, actor, target)?;
            tx.commit()?;
            Ok(chat_id)
        })
    }

    /// Raw insert without the existence check, for callers that want to see conflicts.
    pub fn insert_chat(&self, actor: Uuid, target: Uuid) -> Result<ChatInsert> {
        self.with_conn(|conn| {
            let (a, b) = canonical_pair(actor, target);
            insert_chat(conn, a, b)
        })
    }

    pub fn get_chat(&self, chat_id: Uuid) -> Result<Option<ChatRow>> {
        self.with_conn(|conn| {
            let row = conn
                .query_row(
                    "SELECT id, user_a_id, user_b_id, created_at FROM chats WHERE id = ?1",
                    [chat_id.to_string()],
                    chat_from_row,
                )
                .optional()?;
            Ok(row)
        })
    }

    pub fn get_chat_by_pair(&self, x: Uuid, y: Uuid) -> Result<Option<ChatRow>> {
        let (a, b) = canonical_pair(x, y);
        self.with_conn(|conn| query_chat_by_pair(conn, a, b))
    }

    /// Chats `user_id` takes part in, newest first. Chats whose counterpart has
    /// no profile are left out.
    pub fn list_chats_for(&self, user_id: Uuid) -> Result<Vec<ChatSummaryRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT c.id, p.user_id, p.name, p.photo_path,
                        (SELECT m.text FROM messages m WHERE m.chat_id = c.id
                         ORDER BY m.created_at DESC, m.rowid DESC LIMIT 1),
                        (SELECT m.created_at FROM messages m WHERE m.chat_id = c.id
                         ORDER BY m.created_at DESC, m.rowid DESC LIMIT 1),
                        c.created_at
                 FROM chats c
                 JOIN profiles p
                   ON p.user_id = CASE WHEN c.user_a_id = ?1 THEN c.user_b_id ELSE c.user_a_id END
                 WHERE c.user_a_id = ?1 OR c.user_b_id = ?1
                 ORDER BY c.created_at DESC, c.rowid DESC",
            )?;

            let rows = stmt
                .query_map([user_id.to_string()], |row| {
                    Ok(ChatSummaryRow {
                        chat_id: uuid_at(row, 0)?,
                        other_user_id: uuid_at(row, 1)?,
                        other_name: row.get(2)?,
                        other_photo_path: row.get(3)?,
                        last_message: row.get(4)?,
                        last_message_at: opt_time_at(row, 5)?,
                        created_at: time_at(row, 6)?,
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            Ok(rows)
        })
    }

    // -- Messages --

    /// Stores a message with a server-assigned id and timestamp.
    pub fn insert_message(&self, chat_id: Uuid, sender_id: Uuid, text: &str) -> Result<MessageRow> {
        let id = Uuid::new_v4();
        let created_at = now_timestamp();

        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO messages (id, chat_id, sender_id, text, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![id.to_string(), chat_id.to_string(), sender_id.to_string(), text, created_at],
            )?;

            conn.query_row(
                "SELECT id, chat_id, sender_id, text, created_at FROM messages WHERE id = ?1",
                [id.to_string()],
                message_from_row,
            )
            .map_err(Into::into)
        })
    }

    /// Messages of a chat in display order (oldest first).
    pub fn get_messages(&self, chat_id: Uuid) -> Result<Vec<MessageRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, chat_id, sender_id, text, created_at
                 FROM messages
                 WHERE chat_id = ?1
                 ORDER BY created_at ASC, rowid ASC",
            )?;

            let rows = stmt
                .query_map([chat_id.to_string()], message_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            Ok(rows)
        })
    }
}

/// Match engine core: find the chat for the canonical pair or create it.
///
/// The lookup is a fast path only. Uniqueness is enforced by the
/// `UNIQUE (user_a_id, user_b_id)` constraint, see [`create_or_reread`].
pub(crate) fn ensure_chat(conn: &Connection, actor: Uuid, target: Uuid) -> Result<Uuid> {
    let (a, b) = canonical_pair(actor, target);

    if let Some(chat) = query_chat_by_pair(conn, a, b)? {
        return Ok(chat.id);
    }
    create_or_reread(conn, a, b)
}

/// Inserts the chat for the canonical pair `(a, b)`. An insert that loses a
/// race comes back as [`ChatInsert::Conflict`] and the winner's row is re-read.
fn create_or_reread(conn: &Connection, a: Uuid, b: Uuid) -> Result<Uuid> {
    match insert_chat(conn, a, b)? {
        ChatInsert::Created(id) => {
            info!("Chat {} created for pair ({}, {})", id, a, b);
            Ok(id)
        }
        ChatInsert::Conflict => {
            debug!("Chat for pair ({}, {}) created concurrently, re-reading", a, b);
            query_chat_by_pair(conn, a, b)?
                .map(|chat| chat.id)
                .ok_or_else(|| anyhow!("chat pair ({}, {}) conflicted but no row found", a, b))
        }
    }
}

fn insert_chat(conn: &Connection, a: Uuid, b: Uuid) -> Result<ChatInsert> {
    let id = Uuid::new_v4();
    let inserted = conn.execute(
        "INSERT INTO chats (id, user_a_id, user_b_id, created_at) VALUES (?1, ?2, ?3, ?4)",
        params![id.to_string(), a.to_string(), b.to_string(), now_timestamp()],
    );

    match inserted {
        Ok(_) => Ok(ChatInsert::Created(id)),
        Err(e) if is_unique_violation(&e) => Ok(ChatInsert::Conflict),
        Err(e) => Err(e.into()),
    }
}

fn query_chat_by_pair(conn: &Connection, a: Uuid, b: Uuid) -> Result<Option<ChatRow>> {
    let row = conn
        .query_row(
            "SELECT id, user_a_id, user_b_id, created_at FROM chats
             WHERE user_a_id = ?1 AND user_b_id = ?2",
            [a.to_string(), b.to_string()],
            chat_from_row,
        )
        .optional()?;
    Ok(row)
}

fn chat_from_row(row: &Row<'_>) -> rusqlite::Result<ChatRow> {
    Ok(ChatRow {
        id: uuid_at(row, 0)?,
        user_a_id: uuid_at(row, 1)?,
        user_b_id: uuid_at(row, 2)?,
        created_at: time_at(row, 3)?,
    })
}

fn message_from_row(row: &Row<'_>) -> rusqlite::Result<MessageRow> {
    Ok(MessageRow {
        id: uuid_at(row, 0)?,
        chat_id: uuid_at(row, 1)?,
        sender_id: uuid_at(row, 2)?,
        text: row.get(3)?,
        created_at: time_at(row, 4)?,
    })
}
