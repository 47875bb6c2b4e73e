use argon2::{
    Argon2, PasswordHash, PasswordHasher, PasswordVerifier,
    password_hash::{SaltString, rand_core::OsRng},
};
use axum::{
    Json,
    extract::{Multipart, State},
    http::StatusCode,
    response::IntoResponse,
};
use axum_extra::extract::WithRejection;
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode};
use tracing::{info, warn};
use uuid::Uuid;

use twinby_db::CreateUser;
use twinby_db::models::NewUser;
use twinby_types::api::{Claims, LoginRequest, TokenResponse};

use crate::error::ApiError;
use crate::profile::{ProfileForm, parse_age, parse_gender, parse_interests, parse_name, validate_login, validate_password};
use crate::{AppState, blocking};

fn required(value: Option<String>, field: &str) -> Result<String, ApiError> {
    value.ok_or_else(|| ApiError::invalid(format!("Missing field '{}'", field)))
}

/// POST /auth/register: multipart profile plus photo; returns a token.
pub async fn register(
    State(state): State<AppState>,
    WithRejection(multipart, _): WithRejection<Multipart, ApiError>,
) -> Result<impl IntoResponse, ApiError> {
    let form = ProfileForm::read(multipart).await?;

    let login = validate_login(&required(form.login, "login")?)?;
    let password = required(form.password, "password")?;
    validate_password(&password)?;
    let name = parse_name(&required(form.name, "name")?)?;
    let gender = parse_gender(&required(form.gender, "gender")?)?;
    let age = parse_age(&required(form.age, "age")?)?;
    let about = required(form.about, "about")?.trim().to_string();
    let interests = parse_interests(&required(form.interests, "interests")?)?;
    let photo = form
        .photo
        .ok_or_else(|| ApiError::invalid("Missing field 'photo'"))?;

    // Cheap early exit before the photo hits the disk; the insert re-checks.
    let taken_login = login.clone();
    if blocking(&state, move |db| db.get_user_by_login(&taken_login))
        .await?
        .is_some()
    {
        return Err(ApiError::invalid("Login already used"));
    }

    let photo_path = state
        .photos
        .save_photo(photo.file_name.as_deref(), &photo.data)
        .await?;

    let new_user = NewUser {
        login,
        password_hash: String::new(),
        name,
        gender,
        age,
        about,
        photo_path: photo_path.clone(),
        interests,
    };
    let created = blocking(&state, move |db| {
        let new_user = NewUser {
            password_hash: hash_password(&password)?,
            ..new_user
        };
        db.create_user(&new_user)
    })
    .await;

    let user_id = match created {
        Ok(CreateUser::Created(id)) => id,
        Ok(CreateUser::LoginTaken) => {
            state.photos.discard(&photo_path).await;
            return Err(ApiError::invalid("Login already used"));
        }
        Err(e) => {
            state.photos.discard(&photo_path).await;
            return Err(e);
        }
    };
    info!("Registered user {}", user_id);

    let token = create_token(&state.config.jwt_secret, user_id, state.config.jwt_expires_min)?;
    Ok((StatusCode::CREATED, Json(TokenResponse::bearer(token))))
}

/// POST /auth/login
pub async fn login(
    State(state): State<AppState>,
    WithRejection(Json(req), _): WithRejection<Json<LoginRequest>, ApiError>,
) -> Result<Json<TokenResponse>, ApiError> {
    let user_id = blocking(&state, move |db| {
        let Some(user) = db.get_user_by_login(req.login.trim())? else {
            return Ok(None);
        };
        Ok(verify_password(&req.password, &user.password_hash).then_some(user.id))
    })
    .await?
    .ok_or_else(|| ApiError::Unauthenticated("Invalid credentials".to_string()))?;

    let token = create_token(&state.config.jwt_secret, user_id, state.config.jwt_expires_min)?;
    Ok(Json(TokenResponse::bearer(token)))
}

pub fn hash_password(password: &str) -> anyhow::Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| anyhow::anyhow!("password hashing failed: {}", e))?;
    Ok(hash.to_string())
}

pub fn verify_password(password: &str, stored_hash: &str) -> bool {
    let parsed = match PasswordHash::new(stored_hash) {
        Ok(parsed) => parsed,
        Err(e) => {
            warn!("Unparseable password hash in storage: {}", e);
            return false;
        }
    };
    Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .is_ok()
}

pub fn create_token(secret: &str, user_id: Uuid, expires_min: i64) -> anyhow::Result<String> {
    let lifetime = chrono::Duration::try_minutes(expires_min)
        .ok_or_else(|| anyhow::anyhow!("token lifetime of {} minutes is out of range", expires_min))?;
    let exp = chrono::Utc::now()
        .checked_add_signed(lifetime)
        .ok_or_else(|| anyhow::anyhow!("token expiry overflows"))?
        .timestamp();

    let claims = Claims {
        sub: user_id,
        exp: usize::try_from(exp)?,
    };

    let token = encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )?;

    Ok(token)
}

pub fn decode_token(secret: &str, token: &str) -> jsonwebtoken::errors::Result<Claims> {
    let data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )?;
    Ok(data.claims)
}
