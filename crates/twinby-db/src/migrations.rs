use anyhow::Result;
use rusqlite::Connection;
use tracing::info;

use twinby_types::models::INTERESTS;

pub fn run(conn: &Connection) -> Result<()> {
    conn.execute_batch("CREATE TABLE IF NOT EXISTS schema_version (version INTEGER NOT NULL);")?;

    let version: i64 =
        conn.query_row("SELECT COALESCE(MAX(version), 0) FROM schema_version", [], |r| r.get(0))?;

    if version < 1 {
        info!("Running migration v1 (initial schema)");
        conn.execute_batch(
            "
            CREATE TABLE users (
                id              TEXT PRIMARY KEY,
                login           TEXT NOT NULL UNIQUE,
                password_hash   TEXT NOT NULL,
                is_active       INTEGER NOT NULL DEFAULT 1,
                created_at      TEXT NOT NULL
            );

            CREATE TABLE profiles (
                user_id     TEXT PRIMARY KEY REFERENCES users(id) ON DELETE CASCADE,
                name        TEXT NOT NULL,
                gender      TEXT NOT NULL CHECK (gender IN ('male', 'female', 'other')),
                age         INTEGER NOT NULL CHECK (age BETWEEN 18 AND 99),
                about       TEXT NOT NULL,
                photo_path  TEXT NOT NULL
            );

            CREATE TABLE interests (
                key TEXT PRIMARY KEY
            );

            CREATE TABLE user_interests (
                user_id         TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                interest_key    TEXT NOT NULL REFERENCES interests(key),
                PRIMARY KEY (user_id, interest_key)
            );

            CREATE TABLE swipes (
                id              TEXT PRIMARY KEY,
                user_id         TEXT NOT NULL REFERENCES users(id),
                target_user_id  TEXT NOT NULL REFERENCES users(id),
                direction       TEXT NOT NULL CHECK (direction IN ('left', 'right')),
                created_at      TEXT NOT NULL,
                updated_at      TEXT NOT NULL,
                UNIQUE (user_id, target_user_id),
                CHECK (user_id <> target_user_id)
            );

            CREATE INDEX idx_swipes_target ON swipes(target_user_id);

            -- One row per unordered pair: user_a_id is always the smaller id.
            CREATE TABLE chats (
                id          TEXT PRIMARY KEY,
                user_a_id   TEXT NOT NULL REFERENCES users(id),
                user_b_id   TEXT NOT NULL REFERENCES users(id),
                created_at  TEXT NOT NULL,
                UNIQUE (user_a_id, user_b_id),
                CHECK (user_a_id < user_b_id)
            );

            CREATE INDEX idx_chats_user_b ON chats(user_b_id);

            CREATE TABLE messages (
                id          TEXT PRIMARY KEY,
                chat_id     TEXT NOT NULL REFERENCES chats(id),
                sender_id   TEXT NOT NULL REFERENCES users(id),
                text        TEXT NOT NULL CHECK (length(text) > 0),
                created_at  TEXT NOT NULL
            );

            CREATE INDEX idx_messages_chat ON messages(chat_id, created_at);

            CREATE TABLE support_messages (
                id          TEXT PRIMARY KEY,
                user_id     TEXT NOT NULL REFERENCES users(id),
                role        TEXT NOT NULL CHECK (role IN ('user', 'assistant')),
                text        TEXT NOT NULL,
                created_at  TEXT NOT NULL
            );

            CREATE INDEX idx_support_messages_user ON support_messages(user_id, created_at);

            INSERT INTO schema_version (version) VALUES (1);
            ",
        )?;
    }

    seed_interests(conn)?;

    info!("Database migrations complete");
    Ok(())
}

fn seed_interests(conn: &Connection) -> Result<()> {
    let mut stmt = conn.prepare("INSERT OR IGNORE INTO interests (key) VALUES (?1)")?;
    for key in INTERESTS {
        stmt.execute([key])?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn migrations_are_rerunnable_and_seed_interests() {
        let conn = Connection::open_in_memory().unwrap();
        run(&conn).unwrap();
        run(&conn).unwrap();

        let version: i64 = conn
            .query_row("SELECT MAX(version) FROM schema_version", [], |r| r.get(0))
            .unwrap();
        let interests: i64 = conn
            .query_row("SELECT COUNT(*) FROM interests", [], |r| r.get(0))
            .unwrap();

        assert_eq!(version, 1);
        assert_eq!(interests, INTERESTS.len() as i64);
    }
}
