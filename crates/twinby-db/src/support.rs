use anyhow::Result;
use chrono::{DateTime, Utc};
use rusqlite::{Connection, Row, params};
use uuid::Uuid;

use twinby_types::models::SupportRole;

use crate::{Database, write_tx};
use crate::columns::{format_timestamp, parsed_at, time_at, uuid_at};
use crate::models::SupportMessageRow;

impl Database {
    /// Appends one support turn: the user's message, then the assistant's reply.
    /// Both rows commit together or not at all.
    pub fn append_support_turn(
        &self,
        user_id: Uuid,
        user_text: &str,
        asked_at: DateTime<Utc>,
        reply_text: &str,
    ) -> Result<(SupportMessageRow, SupportMessageRow)> {
        self.with_conn_mut(|conn| {
            let tx = write_tx(conn)?;
            let question = insert_support_message(&tx, user_id, SupportRole::User, user_text, asked_at)?;
            // The reply can never sort before the question it answers.
            let replied_at = Utc::now().max(asked_at);
            let answer =
                insert_support_message(&tx, user_id, SupportRole::Assistant, reply_text, replied_at)?;
            tx.commit()?;
            Ok((question, answer))
        })
    }

    /// The user's support transcript, oldest first.
    pub fn get_support_messages(&self, user_id: Uuid) -> Result<Vec<SupportMessageRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, user_id, role, text, created_at
                 FROM support_messages
                 WHERE user_id = ?1
                 ORDER BY created_at ASC, rowid ASC",
            )?;

            let rows = stmt
                .query_map([user_id.to_string()], support_message_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            Ok(rows)
        })
    }
}

fn insert_support_message(
    conn: &Connection,
    user_id: Uuid,
    role: SupportRole,
    text: &str,
    created_at: DateTime<Utc>,
) -> Result<SupportMessageRow> {
    let id = Uuid::new_v4();
    let stored_at = format_timestamp(created_at);
    conn.execute(
        "INSERT INTO support_messages (id, user_id, role, text, created_at) VALUES (?1, ?2, ?3, ?4, ?5)",
        params![id.to_string(), user_id.to_string(), role.as_str(), text, stored_at],
    )?;

    let row = conn.query_row(
        "SELECT id, user_id, role, text, created_at FROM support_messages WHERE id = ?1",
        [id.to_string()],
        support_message_from_row,
    )?;
    Ok(row)
}

fn support_message_from_row(row: &Row<'_>) -> rusqlite::Result<SupportMessageRow> {
    Ok(SupportMessageRow {
        id: uuid_at(row, 0)?,
        user_id: uuid_at(row, 1)?,
        role: parsed_at(row, 2)?,
        text: row.get(3)?,
        created_at: time_at(row, 4)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::user;

    #[test]
    fn support_turns_append_in_order() {
        let db = Database::open_in_memory().unwrap();
        let u = user(&db, "u");

        let (q, a) = db.append_support_turn(u, "where is my match?", Utc::now(), "Check the chats tab.").unwrap();
        db.append_support_turn(u, "thanks", Utc::now(), "You're welcome!").unwrap();

        assert_eq!(q.role, SupportRole::User);
        assert_eq!(a.role, SupportRole::Assistant);
        assert!(a.created_at >= q.created_at);

        let transcript: Vec<(SupportRole, String)> = db
            .get_support_messages(u)
            .unwrap()
            .into_iter()
            .map(|m| (m.role, m.text))
            .collect();
        assert_eq!(
            transcript,
            vec![
                (SupportRole::User, "where is my match?".to_string()),
                (SupportRole::Assistant, "Check the chats tab.".to_string()),
                (SupportRole::User, "thanks".to_string()),
                (SupportRole::Assistant, "You're welcome!".to_string()),
            ]
        );
    }

    #[test]
    fn transcripts_are_per_user() {
        let db = Database::open_in_memory().unwrap();
        let u = user(&db, "u");
        let v = user(&db, "v");

        db.append_support_turn(u, "hello", Utc::now(), "hi").unwrap();

        assert_eq!(db.get_support_messages(u).unwrap().len(), 2);
        assert!(db.get_support_messages(v).unwrap().is_empty());
    }

    #[test]
    fn failed_turn_writes_nothing() {
        let db = Database::open_in_memory().unwrap();

        assert!(db.append_support_turn(Uuid::new_v4(), "hello", Utc::now(), "hi").is_err());
        let count: i64 = db
            .with_conn(|conn| Ok(conn.query_row("SELECT COUNT(*) FROM support_messages", [], |r| r.get(0))?))
            .unwrap();
        assert_eq!(count, 0);
    }
}
