use axum::{Extension, Json, extract::State};
use axum_extra::extract::WithRejection;
use tracing::info;
use uuid::Uuid;

use twinby_db::SwipeOutcome;
use twinby_types::api::{SwipeRequest, SwipeResponse};
use twinby_types::models::SwipeDirection;

use crate::error::ApiError;
use crate::middleware::AuthUser;
use crate::{AppState, blocking};

/// Records a swipe. A right swipe returns the pair's chat id right away,
/// whether or not the other side has swiped back yet.
pub async fn record_swipe(
    state: &AppState,
    actor: Uuid,
    target: Uuid,
    direction: SwipeDirection,
) -> Result<SwipeOutcome, ApiError> {
    if actor == target {
        return Err(ApiError::invalid("Cannot swipe self"));
    }

    let outcome = blocking(state, move |db| {
        if db.get_user_by_id(target)?.is_none() {
            return Ok(None);
        }
        db.record_swipe(actor, target, direction).map(Some)
    })
    .await?
    .ok_or_else(|| ApiError::NotFound("User not found".to_string()))?;

    if let Some(chat_id) = outcome.chat_id {
        info!("User {} swiped right on {}, chat {}", actor, target, chat_id);
    }
    Ok(outcome)
}

pub async fn swipe(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    WithRejection(Json(req), _): WithRejection<Json<SwipeRequest>, ApiError>,
) -> Result<Json<SwipeResponse>, ApiError> {
    let direction: SwipeDirection = req
        .direction
        .parse()
        .map_err(|_| ApiError::invalid("Invalid direction"))?;

    let outcome = record_swipe(&state, user.id, req.target_user_id, direction).await?;
    Ok(Json(SwipeResponse {
        created_chat_id: outcome.chat_id,
    }))
}
