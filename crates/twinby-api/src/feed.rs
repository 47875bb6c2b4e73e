use std::collections::HashMap;

use axum::{
    Extension, Json,
    extract::{Query, State},
};
use axum_extra::extract::WithRejection;
use serde::Deserialize;
use tracing::{debug, warn};
use uuid::Uuid;

use twinby_db::models::ProfileRow;
use twinby_types::api::{FeedResponse, ProfilePublic};

use crate::error::{ApiError, UpstreamError};
use crate::middleware::AuthUser;
use crate::profile::profile_public;
use crate::ranking::{Ranker, merge_ranked};
use crate::{AppState, blocking};

pub const DEFAULT_FEED_LIMIT: u32 = 20;
pub const MAX_FEED_LIMIT: u32 = 100;
/// Candidates fetched per returned slot, giving the ranker room to reorder.
const OVERSAMPLE: u32 = 3;

#[derive(Debug, Deserialize)]
pub struct FeedQuery {
    pub limit: Option<u32>,
}

pub async fn get_feed(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    WithRejection(Query(query), _): WithRejection<Query<FeedQuery>, ApiError>,
) -> Result<Json<FeedResponse>, ApiError> {
    let limit = query
        .limit
        .unwrap_or(DEFAULT_FEED_LIMIT)
        .clamp(1, MAX_FEED_LIMIT);
    let users = compose_feed(&state, user.id, limit).await?;
    Ok(Json(FeedResponse { users }))
}

/// Candidates `user_id` has not decided on yet, best first.
pub async fn compose_feed(state: &AppState, user_id: Uuid, limit: u32) -> Result<Vec<ProfilePublic>, ApiError> {
    let fetch = limit.saturating_mul(OVERSAMPLE);
    let candidates = blocking(state, move |db| db.list_feed_candidates(user_id, fetch)).await?;

    let ordered = match &state.ranker {
        Some(ranker) if !candidates.is_empty() => {
            rank_or_keep(ranker.as_ref(), user_id, candidates, state.config.ranking_timeout).await
        }
        _ => candidates,
    };

    let page: Vec<ProfileRow> = ordered.into_iter().take(limit as usize).collect();
    let ids: Vec<Uuid> = page.iter().map(|p| p.user_id).collect();
    let mut interests = blocking(state, move |db| db.get_interests_for_users(&ids)).await?;

    Ok(page
        .into_iter()
        .map(|profile| {
            let keys = interests.remove(&profile.user_id).unwrap_or_default();
            profile_public(profile, keys, &state.photos)
        })
        .collect())
}

/// Reorders by the ranker's verdict, or keeps the default order when it fails.
async fn rank_or_keep(
    ranker: &dyn Ranker,
    user_id: Uuid,
    candidates: Vec<ProfileRow>,
    timeout: std::time::Duration,
) -> Vec<ProfileRow> {
    let original: Vec<Uuid> = candidates.iter().map(|p| p.user_id).collect();

    let ranked = match tokio::time::timeout(timeout, ranker.rank(user_id, &original)).await {
        Ok(result) => result,
        Err(_) => Err(UpstreamError::Timeout(timeout)),
    };
    let ranked = match ranked {
        Ok(ranked) => ranked,
        Err(e) => {
            warn!("Ranking failed for user {}, keeping default order: {}", user_id, e);
            return candidates;
        }
    };

    let order = merge_ranked(&original, &ranked);
    debug!("Applied ranking to {} feed candidates for {}", order.len(), user_id);

    let mut by_id: HashMap<Uuid, ProfileRow> =
        candidates.into_iter().map(|p| (p.user_id, p)).collect();
    order.into_iter().filter_map(|id| by_id.remove(&id)).collect()
}
