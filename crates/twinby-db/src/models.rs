//! Database row types. Distinct from twinby-types API models to keep the DB
//! layer independent of the wire format; columns are already parsed into ids,
//! timestamps and enums.

use chrono::{DateTime, Utc};
use uuid::Uuid;

use twinby_types::models::{Gender, SupportRole, SwipeDirection};

#[derive(Debug, Clone)]
pub struct UserRow {
    pub id: Uuid,
    pub login: String,
    pub password_hash: String,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct ProfileRow {
    pub user_id: Uuid,
    pub name: String,
    pub gender: Gender,
    pub age: u8,
    pub about: String,
    pub photo_path: String,
}

/// Everything registration writes in one transaction.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub login: String,
    pub password_hash: String,
    pub name: String,
    pub gender: Gender,
    pub age: u8,
    pub about: String,
    pub photo_path: String,
    pub interests: Vec<String>,
}

/// Partial profile update; `None` leaves the column untouched.
#[derive(Debug, Clone, Default)]
pub struct ProfileUpdate {
    pub name: Option<String>,
    pub gender: Option<Gender>,
    pub age: Option<u8>,
    pub about: Option<String>,
    pub photo_path: Option<String>,
    /// Replaces the whole interest set when present.
    pub interests: Option<Vec<String>>,
}

#[derive(Debug, Clone)]
pub struct SwipeRow {
    pub id: Uuid,
    pub user_id: Uuid,
    pub target_user_id: Uuid,
    pub direction: SwipeDirection,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatRow {
    pub id: Uuid,
    pub user_a_id: Uuid,
    pub user_b_id: Uuid,
    pub created_at: DateTime<Utc>,
}

impl ChatRow {
    pub fn has_participant(&self, user_id: Uuid) -> bool {
        self.user_a_id == user_id || self.user_b_id == user_id
    }
}

/// One entry of a user's chat list, with the counterpart's profile resolved.
#[derive(Debug, Clone)]
pub struct ChatSummaryRow {
    pub chat_id: Uuid,
    pub other_user_id: Uuid,
    pub other_name: String,
    pub other_photo_path: String,
    pub last_message: Option<String>,
    pub last_message_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct MessageRow {
    pub id: Uuid,
    pub chat_id: Uuid,
    pub sender_id: Uuid,
    pub text: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct SupportMessageRow {
    pub id: Uuid,
    pub user_id: Uuid,
    pub role: SupportRole,
    pub text: String,
    pub created_at: DateTime<Utc>,
}
