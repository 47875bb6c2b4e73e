use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::{Gender, SupportRole};

// -- JWT Claims --

/// Claims carried by access tokens. `sub` is the user id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: Uuid,
    pub exp: usize,
}

// -- Auth --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoginRequest {
    pub login: String,
    pub password: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub token_type: String,
}

impl TokenResponse {
    pub fn bearer(access_token: String) -> Self {
        Self { access_token, token_type: "bearer".to_string() }
    }
}

// -- Profiles / feed --

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProfilePublic {
    pub user_id: Uuid,
    pub name: String,
    pub gender: Gender,
    pub age: u8,
    pub about: String,
    pub photo_url: String,
    pub interests: Vec<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct FeedResponse {
    pub users: Vec<ProfilePublic>,
}

// -- Swipes --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SwipeRequest {
    pub target_user_id: Uuid,
    /// "left" | "right"; validated by the handler.
    pub direction: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SwipeResponse {
    pub created_chat_id: Option<Uuid>,
}

// -- Chats --

#[derive(Debug, Serialize, Deserialize)]
pub struct ChatListItem {
    pub chat_id: Uuid,
    pub other_user_id: Uuid,
    pub other_name: String,
    pub other_photo_url: String,
    pub last_message: Option<String>,
    pub last_message_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SendMessageRequest {
    pub text: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct MessageItem {
    pub id: Uuid,
    pub chat_id: Uuid,
    pub sender_id: Uuid,
    pub text: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AttachmentResponse {
    pub url: String,
    pub name: String,
    pub mime: Option<String>,
}

// -- Support --

#[derive(Debug, Serialize, Deserialize)]
pub struct SupportMessageItem {
    pub id: Uuid,
    pub role: SupportRole,
    pub text: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SendSupportMessageRequest {
    pub text: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SendSupportMessageResponse {
    pub user_message: SupportMessageItem,
    pub assistant_message: SupportMessageItem,
}
