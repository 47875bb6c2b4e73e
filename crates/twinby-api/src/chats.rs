use axum::{
    Extension, Json,
    extract::{Multipart, Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use axum_extra::extract::WithRejection;
use tracing::{debug, info};
use uuid::Uuid;

use twinby_db::models::{ChatRow, MessageRow};
use twinby_types::api::{AttachmentResponse, ChatListItem, MessageItem, SendMessageRequest};

use crate::error::ApiError;
use crate::middleware::AuthUser;
use crate::{AppState, blocking};

fn message_item(row: MessageRow) -> MessageItem {
    MessageItem {
        id: row.id,
        chat_id: row.chat_id,
        sender_id: row.sender_id,
        text: row.text,
        created_at: row.created_at,
    }
}

/// Loads the chat and checks that `user_id` is one of its two participants.
async fn participant_chat(state: &AppState, chat_id: Uuid, user_id: Uuid) -> Result<ChatRow, ApiError> {
    let chat = blocking(state, move |db| db.get_chat(chat_id))
        .await?
        .ok_or_else(|| ApiError::NotFound("Chat not found".to_string()))?;

    if !chat.has_participant(user_id) {
        debug!("User {} denied access to chat {}", user_id, chat_id);
        return Err(ApiError::NotAuthorized("Not a participant of this chat".to_string()));
    }
    Ok(chat)
}

pub async fn list_messages(state: &AppState, chat_id: Uuid, requester: Uuid) -> Result<Vec<MessageRow>, ApiError> {
    participant_chat(state, chat_id, requester).await?;
    blocking(state, move |db| db.get_messages(chat_id)).await
}

pub async fn post_message(
    state: &AppState,
    chat_id: Uuid,
    sender: Uuid,
    text: &str,
) -> Result<MessageRow, ApiError> {
    participant_chat(state, chat_id, sender).await?;

    let text = text.trim().to_string();
    if text.is_empty() {
        return Err(ApiError::invalid("Empty message"));
    }

    blocking(state, move |db| db.insert_message(chat_id, sender, &text)).await
}

/// GET /chats
pub async fn list_chats(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
) -> Result<Json<Vec<ChatListItem>>, ApiError> {
    let user_id = user.id;
    let chats = blocking(&state, move |db| db.list_chats_for(user_id)).await?;

    let items = chats
        .into_iter()
        .map(|c| ChatListItem {
            chat_id: c.chat_id,
            other_user_id: c.other_user_id,
            other_name: c.other_name,
            other_photo_url: state.photos.public_url(&c.other_photo_path),
            last_message: c.last_message,
            last_message_at: c.last_message_at,
        })
        .collect();

    Ok(Json(items))
}

/// GET /chats/{chat_id}/messages
pub async fn get_messages(
    State(state): State<AppState>,
    WithRejection(Path(chat_id), _): WithRejection<Path<Uuid>, ApiError>,
    Extension(user): Extension<AuthUser>,
) -> Result<Json<Vec<MessageItem>>, ApiError> {
    let rows = list_messages(&state, chat_id, user.id).await?;
    Ok(Json(rows.into_iter().map(message_item).collect()))
}

/// POST /chats/{chat_id}/messages
pub async fn send_message(
    State(state): State<AppState>,
    WithRejection(Path(chat_id), _): WithRejection<Path<Uuid>, ApiError>,
    Extension(user): Extension<AuthUser>,
    WithRejection(Json(req), _): WithRejection<Json<SendMessageRequest>, ApiError>,
) -> Result<impl IntoResponse, ApiError> {
    let row = post_message(&state, chat_id, user.id, &req.text).await?;
    Ok((StatusCode::CREATED, Json(message_item(row))))
}

/// POST /chats/{chat_id}/attachments: stores the `file` field and hands back
/// its public URL. Posting a message that references it is up to the client.
pub async fn upload_attachment(
    State(state): State<AppState>,
    WithRejection(Path(chat_id), _): WithRejection<Path<Uuid>, ApiError>,
    Extension(user): Extension<AuthUser>,
    WithRejection(mut multipart, _): WithRejection<Multipart, ApiError>,
) -> Result<impl IntoResponse, ApiError> {
    participant_chat(&state, chat_id, user.id).await?;

    while let Some(field) = multipart.next_field().await? {
        if field.name() != Some("file") {
            continue;
        }

        let name = field.file_name().unwrap_or("attachment").to_string();
        let data = field.bytes().await?;
        if data.is_empty() {
            return Err(ApiError::invalid("Empty file"));
        }

        let stored = state.photos.save_attachment(Some(&name), &data).await?;
        let mime = mime_guess::from_path(&name).first().map(|m| m.essence_str().to_string());
        info!("User {} attached {} ({} bytes) to chat {}", user.id, name, data.len(), chat_id);

        return Ok((
            StatusCode::CREATED,
            Json(AttachmentResponse {
                url: state.photos.public_url(&stored),
                name,
                mime,
            }),
        ));
    }

    Err(ApiError::invalid("Missing field 'file'"))
}
