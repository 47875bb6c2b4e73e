use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use axum_extra::{
    TypedHeader,
    headers::{Authorization, authorization::Bearer},
    typed_header::TypedHeaderRejection,
};
use tracing::debug;
use uuid::Uuid;

use crate::auth::decode_token;
use crate::error::ApiError;
use crate::{AppState, blocking};

/// The authenticated caller, inserted into request extensions by [`require_auth`].
#[derive(Debug, Clone, Copy)]
pub struct AuthUser {
    pub id: Uuid,
}

/// Validates the bearer token and rejects unknown or deactivated users.
pub async fn require_auth(
    State(state): State<AppState>,
    bearer: Result<TypedHeader<Authorization<Bearer>>, TypedHeaderRejection>,
    mut req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let TypedHeader(Authorization(bearer)) =
        bearer.map_err(|_| ApiError::Unauthenticated("Not authenticated".to_string()))?;

    let claims = decode_token(&state.config.jwt_secret, bearer.token()).map_err(|e| {
        debug!("Rejected token: {}", e);
        ApiError::Unauthenticated("Invalid token".to_string())
    })?;

    let user_id = claims.sub;
    let user = blocking(&state, move |db| db.get_user_by_id(user_id)).await?;
    match user {
        Some(user) if user.is_active => {}
        Some(_) => return Err(ApiError::Unauthenticated("Inactive user".to_string())),
        None => return Err(ApiError::Unauthenticated("User not found".to_string())),
    }

    req.extensions_mut().insert(AuthUser { id: user_id });
    Ok(next.run(req).await)
}
