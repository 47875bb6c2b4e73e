use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use reqwest::{Client as HttpClient, header};
use serde::Deserialize;
use serde_json::{Value, json};
use tokio::sync::Mutex;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::config::GigaChatConfig;
use crate::error::UpstreamError;

pub const UNAVAILABLE_REPLY: &str =
    "Support is unavailable right now: the assistant is not configured on the server.";
pub const UPSTREAM_FAILED_REPLY: &str =
    "Could not get an answer from the support assistant. Please try again later.";
pub const EMPTY_REPLY: &str = "Could not put together an answer. Please try again.";

const SYSTEM_PROMPT: &str = "You are the support service of a dating app. \
Answer briefly, kindly and to the point. \
If you are missing details, ask a clarifying question.";

/// Refresh the access token this long before it expires.
const TOKEN_REFRESH_MARGIN_SECS: i64 = 60;

/// Answering collaborator behind the support chat.
#[async_trait]
pub trait Assistant: Send + Sync {
    async fn ask(&self, text: &str) -> Result<String, UpstreamError>;
}

/// Asks the assistant and turns every failure into a reply the user can read.
pub async fn answer_or_fallback(assistant: &dyn Assistant, text: &str, timeout: Duration) -> String {
    let outcome = match tokio::time::timeout(timeout, assistant.ask(text)).await {
        Ok(outcome) => outcome,
        Err(_) => Err(UpstreamError::Timeout(timeout)),
    };

    match outcome {
        Ok(reply) => reply,
        Err(e) => {
            warn!("Support assistant failed, using fallback reply: {}", e);
            fallback_reply(&e).to_string()
        }
    }
}

pub fn fallback_reply(error: &UpstreamError) -> &'static str {
    match error {
        UpstreamError::NotConfigured => UNAVAILABLE_REPLY,
        UpstreamError::Malformed(_) => EMPTY_REPLY,
        UpstreamError::Transport(_) | UpstreamError::Status(_) | UpstreamError::Timeout(_) => {
            UPSTREAM_FAILED_REPLY
        }
    }
}

/// Pulls the answer text out of a completion body.
///
/// Recognized shapes: a bare JSON string, or an object carrying
/// `choices[0].message.content`. Blank text counts as no answer.
pub fn parse_completion(body: &Value) -> Option<String> {
    let text = match body {
        Value::String(text) => text.as_str(),
        Value::Object(_) => body.pointer("/choices/0/message/content")?.as_str()?,
        _ => return None,
    };
    let text = text.trim();
    (!text.is_empty()).then(|| text.to_string())
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    /// Expiry as unix milliseconds.
    #[serde(default)]
    expires_at: Option<i64>,
}

struct CachedToken {
    value: String,
    expires_at: Option<DateTime<Utc>>,
}

impl CachedToken {
    fn is_fresh(&self, now: DateTime<Utc>) -> bool {
        match self.expires_at {
            Some(at) => now + chrono::Duration::seconds(TOKEN_REFRESH_MARGIN_SECS) < at,
            None => false,
        }
    }
}

/// GigaChat client: OAuth token exchange, then chat completions.
pub struct GigaChatAssistant {
    client: HttpClient,
    config: GigaChatConfig,
    token: Mutex<Option<CachedToken>>,
}

impl GigaChatAssistant {
    pub fn new(config: GigaChatConfig) -> Result<Self, UpstreamError> {
        let client = HttpClient::builder()
            .timeout(config.timeout)
            .danger_accept_invalid_certs(!config.verify_ssl)
            .build()?;

        Ok(Self {
            client,
            config,
            token: Mutex::new(None),
        })
    }

    async fn access_token(&self, credentials: &str) -> Result<String, UpstreamError> {
        let mut cached = self.token.lock().await;
        if let Some(token) = cached.as_ref().filter(|t| t.is_fresh(Utc::now())) {
            return Ok(token.value.clone());
        }

        let response = self
            .client
            .post(&self.config.auth_url)
            .header(header::AUTHORIZATION, format!("Basic {}", credentials))
            .header("RqUID", Uuid::new_v4().to_string())
            .header(header::ACCEPT, "application/json")
            .form(&[("scope", self.config.scope.as_str())])
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(UpstreamError::Status(response.status()));
        }

        let body: TokenResponse = response
            .json()
            .await
            .map_err(|e| UpstreamError::Malformed(e.to_string()))?;
        debug!("Obtained GigaChat access token");

        let value = body.access_token.clone();
        *cached = Some(CachedToken {
            value: body.access_token,
            expires_at: body
                .expires_at
                .and_then(|ms| Utc.timestamp_millis_opt(ms).single()),
        });
        Ok(value)
    }
}

#[async_trait]
impl Assistant for GigaChatAssistant {
    async fn ask(&self, text: &str) -> Result<String, UpstreamError> {
        let credentials = self
            .config
            .credentials
            .as_deref()
            .ok_or(UpstreamError::NotConfigured)?;
        let token = self.access_token(credentials).await?;

        let request = json!({
            "model": self.config.model,
            "messages": [
                { "role": "system", "content": SYSTEM_PROMPT },
                { "role": "user", "content": text },
            ],
        });

        let response = self
            .client
            .post(format!("{}/chat/completions", self.config.api_url))
            .bearer_auth(token)
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(UpstreamError::Status(response.status()));
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| UpstreamError::Malformed(e.to_string()))?;

        parse_completion(&body)
            .ok_or_else(|| UpstreamError::Malformed("no answer text in completion".to_string()))
    }
}
