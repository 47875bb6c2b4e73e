use std::collections::HashSet;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client as HttpClient;
use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

use crate::error::UpstreamError;

/// External service that reorders feed candidates for a user.
#[async_trait]
pub trait Ranker: Send + Sync {
    async fn rank(&self, user_id: Uuid, candidate_ids: &[Uuid]) -> Result<Vec<Uuid>, UpstreamError>;
}

#[derive(Debug, Serialize)]
struct RankRequest<'a> {
    user_id: Uuid,
    candidate_ids: &'a [Uuid],
}

#[derive(Debug, Deserialize)]
struct RankResponse {
    #[serde(default)]
    ranked_candidate_ids: Vec<Uuid>,
}

/// HTTP ranking client: `POST {base_url}/rank`.
pub struct RankingClient {
    client: HttpClient,
    base_url: String,
}

impl RankingClient {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, UpstreamError> {
        let client = HttpClient::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl Ranker for RankingClient {
    async fn rank(&self, user_id: Uuid, candidate_ids: &[Uuid]) -> Result<Vec<Uuid>, UpstreamError> {
        let response = self
            .client
            .post(format!("{}/rank", self.base_url))
            .json(&RankRequest { user_id, candidate_ids })
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(UpstreamError::Status(response.status()));
        }

        let body: RankResponse = response
            .json()
            .await
            .map_err(|e| UpstreamError::Malformed(e.to_string()))?;

        debug!(
            "Ranking service ordered {} of {} candidates for {}",
            body.ranked_candidate_ids.len(),
            candidate_ids.len(),
            user_id
        );
        Ok(body.ranked_candidate_ids)
    }
}

/// Applies a ranking to the original candidate order.
///
/// Ids the ranker invented are dropped, repeats count once, and candidates the
/// ranker left out follow in their original relative order. An empty ranking
/// leaves the order untouched.
pub fn merge_ranked(original: &[Uuid], ranked: &[Uuid]) -> Vec<Uuid> {
    let known: HashSet<Uuid> = original.iter().copied().collect();
    let mut placed = HashSet::with_capacity(original.len());
    let mut merged = Vec::with_capacity(original.len());

    for id in ranked {
        if known.contains(id) && placed.insert(*id) {
            merged.push(*id);
        }
    }
    for id in original {
        if placed.insert(*id) {
            merged.push(*id);
        }
    }

    merged
}
