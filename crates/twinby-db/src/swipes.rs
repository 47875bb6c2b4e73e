use anyhow::{Result, bail};
use rusqlite::{Connection, OptionalExtension, Row, params};
use uuid::Uuid;

use twinby_types::models::SwipeDirection;

use crate::{Database, write_tx};
use crate::chats::ensure_chat;
use crate::columns::{now_timestamp, parsed_at, time_at, uuid_at};
use crate::models::SwipeRow;

/// What a swipe did to the ledger and, for right swipes, which chat the pair maps to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SwipeOutcome {
    pub is_new_record: bool,
    pub chat_id: Option<Uuid>,
}

impl Database {
    /// Records `actor`'s decision about `target` and, on a right swipe,
    /// materializes the pair's chat. Both writes commit together.
    pub fn record_swipe(
        &self,
        actor: Uuid,
        target: Uuid,
        direction: SwipeDirection,
    ) -> Result<SwipeOutcome> {
        if actor == target {
            bail!("user {} cannot swipe on themselves", actor);
        }

        self.with_conn_mut(|conn| {
            let tx = write_tx(conn)?;

            let is_new_record = upsert_swipe(&tx, actor, target, direction)?;
            let chat_id = match direction {
                SwipeDirection::Right => Some(ensure_chat(&tx, actor, target)?),
                SwipeDirection::Left => None,
            };

            tx.commit()?;
            Ok(SwipeOutcome { is_new_record, chat_id })
        })
    }

    pub fn get_swipe(&self, actor: Uuid, target: Uuid) -> Result<Option<SwipeRow>> {
        self.with_conn(|conn| {
            let row = conn
                .query_row(
                    "SELECT id, user_id, target_user_id, direction, created_at, updated_at
                     FROM swipes WHERE user_id = ?1 AND target_user_id = ?2",
                    [actor.to_string(), target.to_string()],
                    swipe_from_row,
                )
                .optional()?;
            Ok(row)
        })
    }

    pub fn count_swipes_by(&self, actor: Uuid) -> Result<u64> {
        self.with_conn(|conn| {
            let count: i64 = conn.query_row(
                "SELECT COUNT(*) FROM swipes WHERE user_id = ?1",
                [actor.to_string()],
                |row| row.get(0),
            )?;
            Ok(count.try_into()?)
        })
    }
}

/// Inserts the ledger row or overwrites its direction in place.
/// Returns true when a new row was created.
fn upsert_swipe(
    conn: &Connection,
    actor: Uuid,
    target: Uuid,
    direction: SwipeDirection,
) -> Result<bool> {
    let (actor, target) = (actor.to_string(), target.to_string());
    let now = now_timestamp();

    let existing: Option<String> = conn
        .query_row(
            "SELECT id FROM swipes WHERE user_id = ?1 AND target_user_id = ?2",
            [&actor, &target],
            |row| row.get(0),
        )
        .optional()?;

    if let Some(id) = existing {
        conn.execute(
            "UPDATE swipes SET direction = ?2, updated_at = ?3 WHERE id = ?1",
            params![id, direction.as_str(), now],
        )?;
        Ok(false)
    } else {
        conn.execute(
            "INSERT INTO swipes (id, user_id, target_user_id, direction, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?5)",
            params![Uuid::new_v4().to_string(), actor, target, direction.as_str(), now],
        )?;
        Ok(true)
    }
}

fn swipe_from_row(row: &Row<'_>) -> rusqlite::Result<SwipeRow> {
    Ok(SwipeRow {
        id: uuid_at(row, 0)?,
        user_id: uuid_at(row, 1)?,
        target_user_id: uuid_at(row, 2)?,
        direction: parsed_at(row, 3)?,
        created_at: time_at(row, 4)?,
        updated_at: time_at(row, 5)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::user;

    #[test]
    fn repeat_swipe_keeps_one_row() {
        let db = Database::open_in_memory().unwrap();
        let a = user(&db, "a");
        let b = user(&db, "b");

        let first = db.record_swipe(a, b, SwipeDirection::Left).unwrap();
        let second = db.record_swipe(a, b, SwipeDirection::Left).unwrap();

        assert!(first.is_new_record);
        assert!(!second.is_new_record);
        assert_eq!(db.count_swipes_by(a).unwrap(), 1);
        assert_eq!(db.get_swipe(a, b).unwrap().unwrap().direction, SwipeDirection::Left);
    }

    #[test]
    fn repeat_swipe_overwrites_direction() {
        let db = Database::open_in_memory().unwrap();
        let a = user(&db, "a");
        let b = user(&db, "b");

        db.record_swipe(a, b, SwipeDirection::Left).unwrap();
        let outcome = db.record_swipe(a, b, SwipeDirection::Right).unwrap();

        let row = db.get_swipe(a, b).unwrap().unwrap();
        assert_eq!(row.direction, SwipeDirection::Right);
        assert!(row.updated_at >= row.created_at);
        assert!(outcome.chat_id.is_some());
        assert_eq!(db.count_swipes_by(a).unwrap(), 1);
    }

    #[test]
    fn left_swipe_creates_no_chat() {
        let db = Database::open_in_memory().unwrap();
        let a = user(&db, "a");
        let b = user(&db, "b");

        let outcome = db.record_swipe(a, b, SwipeDirection::Left).unwrap();

        assert_eq!(outcome.chat_id, None);
        assert!(db.list_chats_for(a).unwrap().is_empty());
    }

    #[test]
    fn self_swipe_is_rejected() {
        let db = Database::open_in_memory().unwrap();
        let a = user(&db, "a");

        assert!(db.record_swipe(a, a, SwipeDirection::Right).is_err());
        assert_eq!(db.count_swipes_by(a).unwrap(), 0);
    }

    #[test]
    fn swipe_on_unknown_user_fails_without_side_effects() {
        let db = Database::open_in_memory().unwrap();
        let a = user(&db, "a");

        assert!(db.record_swipe(a, Uuid::new_v4(), SwipeDirection::Right).is_err());
        assert_eq!(db.count_swipes_by(a).unwrap(), 0);
    }
}
