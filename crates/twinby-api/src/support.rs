use axum::{Extension, Json, extract::State};
use axum_extra::extract::WithRejection;
use chrono::Utc;
use tracing::info;
use uuid::Uuid;

use twinby_db::models::SupportMessageRow;
use twinby_types::api::{SendSupportMessageRequest, SendSupportMessageResponse, SupportMessageItem};

use crate::assistant::answer_or_fallback;
use crate::error::ApiError;
use crate::middleware::AuthUser;
use crate::{AppState, blocking};

fn support_item(row: SupportMessageRow) -> SupportMessageItem {
    SupportMessageItem {
        id: row.id,
        role: row.role,
        text: row.text,
        created_at: row.created_at,
    }
}

/// One support exchange: the user's question and the assistant's reply,
/// persisted together. The reply falls back to a canned text on any upstream failure.
pub async fn post_support_turn(
    state: &AppState,
    user_id: Uuid,
    text: &str,
) -> Result<(SupportMessageRow, SupportMessageRow), ApiError> {
    let question = text.trim().to_string();
    if question.is_empty() {
        return Err(ApiError::invalid("Empty message"));
    }

    let asked_at = Utc::now();
    let reply = answer_or_fallback(state.assistant.as_ref(), &question, state.config.gigachat.timeout).await;

    let turn = blocking(state, move |db| db.append_support_turn(user_id, &question, asked_at, &reply)).await?;
    info!("Support turn recorded for user {}", user_id);
    Ok(turn)
}

/// GET /support/messages
pub async fn get_messages(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
) -> Result<Json<Vec<SupportMessageItem>>, ApiError> {
    let user_id = user.id;
    let rows = blocking(&state, move |db| db.get_support_messages(user_id)).await?;
    Ok(Json(rows.into_iter().map(support_item).collect()))
}

/// POST /support/messages
pub async fn send_message(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    WithRejection(Json(req), _): WithRejection<Json<SendSupportMessageRequest>, ApiError>,
) -> Result<Json<SendSupportMessageResponse>, ApiError> {
    let (user_message, assistant_message) = post_support_turn(&state, user.id, &req.text).await?;
    Ok(Json(SendSupportMessageResponse {
        user_message: support_item(user_message),
        assistant_message: support_item(assistant_message),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::Ordering;

    use twinby_types::models::SupportRole;

    use crate::assistant::EMPTY_REPLY;
    use crate::test_support::{CannedAssistant, app_with, user};

    #[tokio::test]
    async fn turn_stores_question_then_answer() {
        let assistant = Arc::new(CannedAssistant::replying("Open the chats tab."));
        let app = app_with(None, assistant.clone()).await;
        let u = user(&app.state, "u");

        let (question, answer) = post_support_turn(&app.state, u, "  where are my matches? ").await.unwrap();

        assert_eq!(question.role, SupportRole::User);
        assert_eq!(question.text, "where are my matches?");
        assert_eq!(answer.role, SupportRole::Assistant);
        assert_eq!(answer.text, "Open the chats tab.");
        assert!(answer.created_at >= question.created_at);
        assert_eq!(assistant.calls.load(Ordering::SeqCst), 1);
        assert_eq!(app.state.db.get_support_messages(u).unwrap().len(), 2);
    }

    #[tokio::test]
    async fn failing_assistant_still_yields_two_rows() {
        let app = app_with(None, Arc::new(CannedAssistant::failing())).await;
        let u = user(&app.state, "u");

        let (_, answer) = post_support_turn(&app.state, u, "hello?").await.unwrap();

        assert_eq!(answer.text, EMPTY_REPLY);
        let transcript = app.state.db.get_support_messages(u).unwrap();
        assert_eq!(transcript.len(), 2);
        assert_eq!(transcript[1].text, EMPTY_REPLY);
    }

    #[tokio::test]
    async fn blank_question_is_rejected_without_asking() {
        let assistant = Arc::new(CannedAssistant::replying("unused"));
        let app = app_with(None, assistant.clone()).await;
        let u = user(&app.state, "u");

        let err = post_support_turn(&app.state, u, "   ").await.unwrap_err();

        assert!(matches!(err, ApiError::InvalidInput(_)));
        assert_eq!(assistant.calls.load(Ordering::SeqCst), 0);
        assert!(app.state.db.get_support_messages(u).unwrap().is_empty());
    }
}
