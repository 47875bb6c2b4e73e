use std::collections::HashMap;

use anyhow::{Result, bail};
use rusqlite::{Connection, OptionalExtension, Row, params};
use uuid::Uuid;

use crate::columns::{now_timestamp, parsed_at, time_at, uuid_at};
use crate::models::{NewUser, ProfileRow, ProfileUpdate, UserRow};
use crate::{Database, is_unique_violation, write_tx};

/// Result of a registration attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CreateUser {
    Created(Uuid),
    LoginTaken,
}

const PROFILE_COLUMNS: &str = "p.user_id, p.name, p.gender, p.age, p.about, p.photo_path";

impl Database {
    // -- Users --

    /// Inserts the user, its profile and its interests in one transaction.
    pub fn create_user(&self, new: &NewUser) -> Result<CreateUser> {
        self.with_conn_mut(|conn| {
            let tx = write_tx(conn)?;

            if login_exists(&tx, &new.login)? {
                return Ok(CreateUser::LoginTaken);
            }

            let id = Uuid::new_v4();
            let uid = id.to_string();
            let inserted = tx.execute(
                "INSERT INTO users (id, login, password_hash, created_at) VALUES (?1, ?2, ?3, ?4)",
                params![uid, new.login, new.password_hash, now_timestamp()],
            );
            match inserted {
                Ok(_) => {}
                Err(e) if is_unique_violation(&e) => return Ok(CreateUser::LoginTaken),
                Err(e) => return Err(e.into()),
            }

            tx.execute(
                "INSERT INTO profiles (user_id, name, gender, age, about, photo_path)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![uid, new.name, new.gender.as_str(), new.age, new.about, new.photo_path],
            )?;
            replace_interests(&tx, &uid, &new.interests)?;

            tx.commit()?;
            Ok(CreateUser::Created(id))
        })
    }

    pub fn get_user_by_login(&self, login: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| {
            let row = conn
                .query_row(
                    "SELECT id, login, password_hash, is_active, created_at FROM users WHERE login = ?1",
                    [login],
                    user_from_row,
                )
                .optional()?;
            Ok(row)
        })
    }

    pub fn get_user_by_id(&self, id: Uuid) -> Result<Option<UserRow>> {
        self.with_conn(|conn| {
            let row = conn
                .query_row(
                    "SELECT id, login, password_hash, is_active, created_at FROM users WHERE id = ?1",
                    [id.to_string()],
                    user_from_row,
                )
                .optional()?;
            Ok(row)
        })
    }

    /// Returns false when no such user exists.
    pub fn set_user_active(&self, id: Uuid, active: bool) -> Result<bool> {
        self.with_conn_mut(|conn| {
            let changed = conn.execute(
                "UPDATE users SET is_active = ?2 WHERE id = ?1",
                params![id.to_string(), active],
            )?;
            Ok(changed > 0)
        })
    }

    // -- Profiles --

    pub fn get_profile(&self, user_id: Uuid) -> Result<Option<ProfileRow>> {
        self.with_conn(|conn| query_profile(conn, &user_id.to_string()))
    }

    /// Applies the given fields and returns the profile as stored afterwards,
    /// or `None` when the user has no profile.
    pub fn update_profile(&self, user_id: Uuid, update: &ProfileUpdate) -> Result<Option<ProfileRow>> {
        self.with_conn_mut(|conn| {
            let tx = write_tx(conn)?;
            let uid = user_id.to_string();

            let changed = tx.execute(
                "UPDATE profiles SET
                    name = COALESCE(?2, name),
                    gender = COALESCE(?3, gender),
                    age = COALESCE(?4, age),
                    about = COALESCE(?5, about),
                    photo_path = COALESCE(?6, photo_path)
                 WHERE user_id = ?1",
                params![
                    uid,
                    update.name,
                    update.gender.map(|g| g.as_str()),
                    update.age,
                    update.about,
                    update.photo_path,
                ],
            )?;
            if changed == 0 {
                return Ok(None);
            }

            if let Some(interests) = &update.interests {
                replace_interests(&tx, &uid, interests)?;
            }

            let profile = query_profile(&tx, &uid)?;
            tx.commit()?;
            Ok(profile)
        })
    }

    // -- Interests --

    pub fn get_interests(&self, user_id: Uuid) -> Result<Vec<String>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT interest_key FROM user_interests WHERE user_id = ?1 ORDER BY interest_key",
            )?;
            let keys = stmt
                .query_map([user_id.to_string()], |row| row.get(0))?
                .collect::<std::result::Result<Vec<String>, _>>()?;
            Ok(keys)
        })
    }

    /// Batch-fetch interests for a set of users. Users without interests are absent from the map.
    pub fn get_interests_for_users(&self, user_ids: &[Uuid]) -> Result<HashMap<Uuid, Vec<String>>> {
        if user_ids.is_empty() {
            return Ok(HashMap::new());
        }

        self.with_conn(|conn| {
            let placeholders: Vec<String> = (1..=user_ids.len()).map(|i| format!("?{}", i)).collect();
            let sql = format!(
                "SELECT user_id, interest_key FROM user_interests
                 WHERE user_id IN ({}) ORDER BY interest_key",
                placeholders.join(", ")
            );

            let ids: Vec<String> = user_ids.iter().map(Uuid::to_string).collect();
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map(rusqlite::params_from_iter(ids.iter()), |row| {
                    Ok((uuid_at(row, 0)?, row.get::<_, String>(1)?))
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            let mut by_user: HashMap<Uuid, Vec<String>> = HashMap::new();
            for (user_id, key) in rows {
                by_user.entry(user_id).or_default().push(key);
            }
            Ok(by_user)
        })
    }

    // -- Feed --

    /// Active users with a profile that `user_id` has not swiped on yet,
    /// newest accounts first.
    pub fn list_feed_candidates(&self, user_id: Uuid, limit: u32) -> Result<Vec<ProfileRow>> {
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT {PROFILE_COLUMNS}
                 FROM users u
                 JOIN profiles p ON p.user_id = u.id
                 WHERE u.id <> ?1
                   AND u.is_active = 1
                   AND u.id NOT IN (SELECT target_user_id FROM swipes WHERE user_id = ?1)
                 ORDER BY u.created_at DESC, u.id DESC
                 LIMIT ?2"
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map(params![user_id.to_string(), limit], profile_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }
}

fn login_exists(conn: &Connection, login: &str) -> Result<bool> {
    let found = conn
        .query_row("SELECT 1 FROM users WHERE login = ?1", [login], |_| Ok(()))
        .optional()?;
    Ok(found.is_some())
}

fn replace_interests(conn: &Connection, user_id: &str, interests: &[String]) -> Result<()> {
    if interests.is_empty() {
        bail!("a profile needs at least one interest");
    }

    conn.execute("DELETE FROM user_interests WHERE user_id = ?1", [user_id])?;
    let mut stmt = conn.prepare(
        "INSERT OR IGNORE INTO user_interests (user_id, interest_key) VALUES (?1, ?2)",
    )?;
    for key in interests {
        stmt.execute([user_id, key.as_str()])?;
    }
    Ok(())
}

fn query_profile(conn: &Connection, user_id: &str) -> Result<Option<ProfileRow>> {
    let sql = format!("SELECT {PROFILE_COLUMNS} FROM profiles p WHERE p.user_id = ?1");
    let row = conn.query_row(&sql, [user_id], profile_from_row).optional()?;
    Ok(row)
}

fn user_from_row(row: &Row<'_>) -> rusqlite::Result<UserRow> {
    Ok(UserRow {
        id: uuid_at(row, 0)?,
        login: row.get(1)?,
        password_hash: row.get(2)?,
        is_active: row.get(3)?,
        created_at: time_at(row, 4)?,
    })
}

fn profile_from_row(row: &Row<'_>) -> rusqlite::Result<ProfileRow> {
    Ok(ProfileRow {
        user_id: uuid_at(row, 0)?,
        name: row.get(1)?,
        gender: parsed_at(row, 2)?,
        age: row.get(3)?,
        about: row.get(4)?,
        photo_path: row.get(5)?,
    })
}
