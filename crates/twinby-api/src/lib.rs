pub mod assistant;
pub mod auth;
pub mod chats;
pub mod config;
pub mod error;
pub mod feed;
pub mod middleware;
pub mod photos;
pub mod profile;
pub mod ranking;
pub mod support;
pub mod swipes;

use std::sync::Arc;

use axum::{
    Router,
    extract::DefaultBodyLimit,
    routing::{get, post},
};
use tower_http::services::ServeDir;
use tracing::{error, info};

use twinby_db::Database;

use crate::assistant::{Assistant, GigaChatAssistant};
use crate::config::Config;
use crate::error::ApiError;
use crate::middleware::require_auth;
use crate::photos::PhotoStore;
use crate::ranking::{Ranker, RankingClient};

/// Request bodies (multipart uploads included) are capped at 10 MiB.
pub const MAX_UPLOAD_BYTES: usize = 10 * 1024 * 1024;

pub type AppState = Arc<AppStateInner>;

pub struct AppStateInner {
    pub db: Database,
    pub config: Config,
    pub photos: PhotoStore,
    /// `None` when no ranking service is configured; the feed keeps its default order.
    pub ranker: Option<Arc<dyn Ranker>>,
    pub assistant: Arc<dyn Assistant>,
}

/// Opens storage and builds the upstream clients described by `config`.
pub async fn build_state(config: Config) -> anyhow::Result<AppState> {
    let db = Database::open(&config.db_path)?;

    let photos = PhotoStore::new(config.upload_dir.clone(), config.public_base_url.clone()).await?;
    photos.ensure_default_avatar().await?;

    let ranker: Option<Arc<dyn Ranker>> = match &config.ranking_url {
        Some(url) => {
            info!("Ranking service enabled at {}", url);
            Some(Arc::new(RankingClient::new(url, config.ranking_timeout)?))
        }
        None => {
            info!("No ranking service configured, feed uses default order");
            None
        }
    };

    if config.gigachat.credentials.is_none() {
        info!("GigaChat credentials not set, support replies will use the fallback text");
    }
    let assistant: Arc<dyn Assistant> = Arc::new(GigaChatAssistant::new(config.gigachat.clone())?);

    Ok(Arc::new(AppStateInner {
        db,
        config,
        photos,
        ranker,
        assistant,
    }))
}

pub fn router(state: AppState) -> Router {
    let public_routes = Router::new()
        .route("/auth/register", post(auth::register))
        .route("/auth/login", post(auth::login))
        .route("/health", get(health));

    let protected_routes = Router::new()
        .route("/me", get(profile::get_me).put(profile::update_me))
        .route("/feed", get(feed::get_feed))
        .route("/swipe", post(swipes::swipe))
        .route("/chats", get(chats::list_chats))
        .route("/chats/{chat_id}/messages", get(chats::get_messages).post(chats::send_message))
        .route("/chats/{chat_id}/attachments", post(chats::upload_attachment))
        .route("/support/messages", get(support::get_messages).post(support::send_message))
        .route_layer(axum::middleware::from_fn_with_state(state.clone(), require_auth));

    Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .nest_service("/static", ServeDir::new(state.photos.dir()))
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
        .with_state(state)
}

async fn health() -> &'static str {
    "OK"
}

/// Runs a storage call off the async runtime.
pub(crate) async fn blocking<F, T>(state: &AppState, f: F) -> Result<T, ApiError>
where
    F: FnOnce(&Database) -> anyhow::Result<T> + Send + 'static,
    T: Send + 'static,
{
    let state = state.clone();
    tokio::task::spawn_blocking(move || f(&state.db))
        .await
        .map_err(|e| {
            error!("spawn_blocking join error: {}", e);
            ApiError::Internal(anyhow::anyhow!("storage task failed"))
        })?
        .map_err(ApiError::from)
}


#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode, header};
    use http_body_util::BodyExt;
    use serde_json::{Value, json};
    use tower::ServiceExt;

    use crate::auth::{create_token, hash_password};
    use crate::test_support::{app, user_with_hash};

    async fn send(router: &Router, req: Request<Body>) -> (StatusCode, Value) {
        let response = router.clone().oneshot(req).await.unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        (status, serde_json::from_slice(&bytes).unwrap_or(Value::Null))
    }

    fn request(method: &str, uri: &str, token: Option<&str>, body: Option<Value>) -> Request<Body> {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }
        match body {
            Some(body) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        }
    }

    fn multipart(uri: &str, fields: &[(&str, &str)], photo: Option<(&str, &[u8])>) -> Request<Body> {
        let boundary = "twinby-test-boundary";
        let mut body = Vec::new();
        for (name, value) in fields {
            body.extend_from_slice(
                format!("--{boundary}\r\nContent-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}\r\n")
                    .as_bytes(),
            );
        }
        if let Some((file_name, data)) = photo {
            body.extend_from_slice(
                format!(
                    "--{boundary}\r\nContent-Disposition: form-data; name=\"photo\"; filename=\"{file_name}\"\r\nContent-Type: application/octet-stream\r\n\r\n"
                )
                .as_bytes(),
            );
            body.extend_from_slice(data);
            body.extend_from_slice(b"\r\n");
        }
        body.extend_from_slice(format!("--{boundary}--\r\n").as_bytes());

        Request::builder()
            .method("POST")
            .uri(uri)
            .header(header::CONTENT_TYPE, format!("multipart/form-data; boundary={boundary}"))
            .body(Body::from(body))
            .unwrap()
    }

    async fn login(router: &Router, login: &str) -> String {
        let (status, body) = send(
            router,
            request("POST", "/auth/login", None, Some(json!({ "login": login, "password": "password1" }))),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["token_type"], "bearer");
        body["access_token"].as_str().unwrap().to_string()
    }

    #[tokio::test]
    async fn health_is_public() {
        let app = app().await;
        let response = router(app.state.clone())
            .oneshot(request("GET", "/health", None, None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn protected_routes_need_a_valid_token() {
        let app = app().await;
        let router = router(app.state.clone());

        let (status, body) = send(&router, request("GET", "/chats", None, None)).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["error"]["code"], "UNAUTHENTICATED");

        let (status, _) = send(&router, request("GET", "/me", Some("not.a.jwt"), None)).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn deactivated_user_is_locked_out() {
        let app = app().await;
        let id = user_with_hash(&app.state, "gone", "unused");
        let token = create_token("test-secret", id, 60).unwrap();
        app.state.db.set_user_active(id, false).unwrap();

        let (status, _) = send(&router(app.state.clone()), request("GET", "/me", Some(&token), None)).await;

        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn wrong_password_is_unauthenticated() {
        let app = app().await;
        user_with_hash(&app.state, "ann", &hash_password("password1").unwrap());

        let (status, body) = send(
            &router(app.state.clone()),
            request("POST", "/auth/login", None, Some(json!({ "login": "ann", "password": "nope-nope" }))),
        )
        .await;

        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["error"]["message"], "Invalid credentials");
    }

    #[tokio::test]
    async fn match_and_message_over_http() {
        let app = app().await;
        let hash = hash_password("password1").unwrap();
        let a = user_with_hash(&app.state, "ann", &hash);
        let b = user_with_hash(&app.state, "bob", &hash);
        user_with_hash(&app.state, "eve", &hash);
        let router = router(app.state.clone());
        let (ann, bob, eve) = (login(&router, "ann").await, login(&router, "bob").await, login(&router, "eve").await);

        let (status, body) = send(
            &router,
            request("POST", "/swipe", Some(&ann), Some(json!({ "target_user_id": b, "direction": "right" }))),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let chat_id = body["created_chat_id"].as_str().unwrap().to_string();

        let (_, body) = send(
            &router,
            request("POST", "/swipe", Some(&bob), Some(json!({ "target_user_id": a, "direction": "right" }))),
        )
        .await;
        assert_eq!(body["created_chat_id"], chat_id.as_str());

        let (_, chats) = send(&router, request("GET", "/chats", Some(&bob), None)).await;
        assert_eq!(chats.as_array().unwrap().len(), 1);
        assert_eq!(chats[0]["other_name"], "ann name");
        assert_eq!(chats[0]["last_message"], Value::Null);

        let uri = format!("/chats/{chat_id}/messages");
        let (status, message) =
            send(&router, request("POST", &uri, Some(&ann), Some(json!({ "text": " hi bob " })))).await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(message["text"], "hi bob");

        let (_, messages) = send(&router, request("GET", &uri, Some(&bob), None)).await;
        assert_eq!(messages[0]["sender_id"], a.to_string());

        let (status, body) = send(&router, request("GET", &uri, Some(&eve), None)).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(body["error"]["code"], "NOT_AUTHORIZED");

        let (status, _) =
            send(&router, request("POST", &uri, Some(&ann), Some(json!({ "text": "   " })))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn unknown_swipe_direction_is_invalid() {
        let app = app().await;
        let hash = hash_password("password1").unwrap();
        user_with_hash(&app.state, "ann", &hash);
        let b = user_with_hash(&app.state, "bob", &hash);
        let router = router(app.state.clone());
        let token = login(&router, "ann").await;

        let (status, body) = send(
            &router,
            request("POST", "/swipe", Some(&token), Some(json!({ "target_user_id": b, "direction": "up" }))),
        )
        .await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"]["code"], "INVALID_INPUT");
    }

    #[tokio::test]
    async fn malformed_requests_get_the_error_envelope() {
        let app = app().await;
        let hash = hash_password("password1").unwrap();
        let a = user_with_hash(&app.state, "ann", &hash);
        let b = user_with_hash(&app.state, "bob", &hash);
        let router = router(app.state.clone());
        let token = login(&router, "ann").await;

        let cases = [
            request("POST", "/swipe", Some(&token), Some(json!({ "target_user_id": b, "direction": 5 }))),
            request("POST", "/swipe", Some(&token), Some(json!({ "target_user_id": "nope", "direction": "right" }))),
            request("GET", "/chats/not-a-uuid/messages", Some(&token), None),
            request("GET", "/feed?limit=-1", Some(&token), None),
            request("POST", "/support/messages", Some(&token), Some(json!({ "message": "hi" }))),
            request("POST", "/auth/register", None, Some(json!({ "login": "json-user" }))),
        ];

        for req in cases {
            let uri = req.uri().to_string();
            let (status, body) = send(&router, req).await;
            assert_eq!(status, StatusCode::BAD_REQUEST, "{uri}");
            assert_eq!(body["error"]["code"], "INVALID_INPUT", "{uri}");
            assert!(body["error"]["message"].is_string(), "{uri}");
        }
        assert_eq!(app.state.db.count_swipes_by(a).unwrap(), 0);
    }

    #[tokio::test]
    async fn register_serves_photo_and_rejects_reused_login() {
        let app = app().await;
        let router = router(app.state.clone());
        let fields = [
            ("login", "newbie"),
            ("password", "password1"),
            ("name", "Newbie"),
            ("gender", "other"),
            ("age", "21"),
            ("about", "just arrived"),
            ("interests", "coding, art,coding"),
        ];

        let (status, body) =
            send(&router, multipart("/auth/register", &fields, Some(("me.PNG", &b"fake png bytes"[..])))).await;
        assert_eq!(status, StatusCode::CREATED);
        let token = body["access_token"].as_str().unwrap().to_string();

        let (status, me) = send(&router, request("GET", "/me", Some(&token), None)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(me["name"], "Newbie");
        assert_eq!(me["gender"], "other");
        assert_eq!(me["interests"], json!(["art", "coding"]));
        let photo_url = me["photo_url"].as_str().unwrap();
        assert!(photo_url.ends_with(".png"));

        let static_path = photo_url.trim_start_matches("http://localhost:8080");
        let response = router
            .clone()
            .oneshot(request("GET", static_path, None, None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let (status, body) =
            send(&router, multipart("/auth/register", &fields, Some(("me.jpg", &b"other bytes"[..])))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"]["message"], "Login already used");
    }

    #[tokio::test]
    async fn register_requires_a_photo() {
        let app = app().await;
        let fields = [
            ("login", "nophoto"),
            ("password", "password1"),
            ("name", "No Photo"),
            ("gender", "male"),
            ("age", "30"),
            ("about", ""),
            ("interests", "music"),
        ];

        let (status, body) = send(&router(app.state.clone()), multipart("/auth/register", &fields, None)).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"]["message"], "Missing field 'photo'");
    }
}
