use axum::{
    Extension, Json,
    body::Bytes,
    extract::{Multipart, State},
};
use axum_extra::extract::WithRejection;
use tracing::{debug, info};
use uuid::Uuid;

use twinby_db::models::{ProfileRow, ProfileUpdate};
use twinby_types::api::ProfilePublic;
use twinby_types::models::{Gender, is_known_interest};

use crate::error::ApiError;
use crate::middleware::AuthUser;
use crate::photos::PhotoStore;
use crate::{AppState, blocking};

pub(crate) struct UploadedFile {
    pub file_name: Option<String>,
    pub data: Bytes,
}

/// Raw multipart fields shared by registration and profile edits.
#[derive(Default)]
pub(crate) struct ProfileForm {
    pub login: Option<String>,
    pub password: Option<String>,
    pub name: Option<String>,
    pub gender: Option<String>,
    pub age: Option<String>,
    pub about: Option<String>,
    pub interests: Option<String>,
    pub photo: Option<UploadedFile>,
}

impl ProfileForm {
    pub async fn read(mut multipart: Multipart) -> Result<Self, ApiError> {
        let mut form = ProfileForm::default();

        while let Some(field) = multipart.next_field().await? {
            let field_name = field.name().unwrap_or_default().to_string();
            match field_name.as_str() {
                "photo" => {
                    let file_name = field.file_name().map(str::to_string);
                    let data = field.bytes().await?;
                    if data.is_empty() {
                        return Err(ApiError::invalid("Empty file"));
                    }
                    form.photo = Some(UploadedFile { file_name, data });
                }
                "login" => form.login = Some(field.text().await?),
                "password" => form.password = Some(field.text().await?),
                "name" => form.name = Some(field.text().await?),
                "gender" => form.gender = Some(field.text().await?),
                "age" => form.age = Some(field.text().await?),
                "about" => form.about = Some(field.text().await?),
                "interests" => form.interests = Some(field.text().await?),
                other => debug!("Ignoring unknown form field '{}'", other),
            }
        }

        Ok(form)
    }
}

pub(crate) fn validate_login(raw: &str) -> Result<String, ApiError> {
    let login = raw.trim();
    let len = login.chars().count();
    if !(3..=64).contains(&len) {
        return Err(ApiError::invalid("Login must be 3 to 64 characters"));
    }
    Ok(login.to_string())
}

pub(crate) fn validate_password(raw: &str) -> Result<(), ApiError> {
    let len = raw.chars().count();
    if !(6..=128).contains(&len) {
        return Err(ApiError::invalid("Password must be 6 to 128 characters"));
    }
    Ok(())
}

pub(crate) fn parse_name(raw: &str) -> Result<String, ApiError> {
    let name = raw.trim();
    let len = name.chars().count();
    if !(1..=64).contains(&len) {
        return Err(ApiError::invalid("Name must be 1 to 64 characters"));
    }
    Ok(name.to_string())
}

pub(crate) fn parse_gender(raw: &str) -> Result<Gender, ApiError> {
    raw.trim().parse().map_err(|_| ApiError::invalid("Invalid gender"))
}

pub(crate) fn parse_age(raw: &str) -> Result<u8, ApiError> {
    match raw.trim().parse::<u8>() {
        Ok(age) if (18..=99).contains(&age) => Ok(age),
        _ => Err(ApiError::invalid("Age must be between 18 and 99")),
    }
}

/// Comma-separated interest keys. At least one is required, all must be known,
/// and repeats collapse while keeping first-seen order.
pub(crate) fn parse_interests(raw: &str) -> Result<Vec<String>, ApiError> {
    let mut keys: Vec<String> = Vec::new();
    for key in raw.split(',').map(str::trim).filter(|k| !k.is_empty()) {
        if !is_known_interest(key) {
            return Err(ApiError::invalid("Unknown interest in list"));
        }
        if !keys.iter().any(|k| k == key) {
            keys.push(key.to_string());
        }
    }

    if keys.is_empty() {
        return Err(ApiError::invalid("Interests required"));
    }
    Ok(keys)
}

pub(crate) fn profile_public(profile: ProfileRow, interests: Vec<String>, photos: &PhotoStore) -> ProfilePublic {
    ProfilePublic {
        photo_url: photos.public_url(&profile.photo_path),
        user_id: profile.user_id,
        name: profile.name,
        gender: profile.gender,
        age: profile.age,
        about: profile.about,
        interests,
    }
}

async fn load_public_profile(state: &AppState, user_id: Uuid) -> Result<ProfilePublic, ApiError> {
    let (profile, interests) = blocking(state, move |db| {
        let profile = db.get_profile(user_id)?;
        let interests = db.get_interests(user_id)?;
        Ok((profile, interests))
    })
    .await?;

    let profile = profile.ok_or_else(|| ApiError::NotFound("Profile not found".to_string()))?;
    Ok(profile_public(profile, interests, &state.photos))
}

pub async fn get_me(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
) -> Result<Json<ProfilePublic>, ApiError> {
    Ok(Json(load_public_profile(&state, user.id).await?))
}

/// PUT /me: every field optional; `interests` replaces the set, `photo` the picture.
pub async fn update_me(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    WithRejection(multipart, _): WithRejection<Multipart, ApiError>,
) -> Result<Json<ProfilePublic>, ApiError> {
    let form = ProfileForm::read(multipart).await?;
    let profile = apply_profile_update(&state, user.id, form).await?;
    Ok(Json(profile))
}

/// Validates the edited fields, stores a new photo if one was sent and writes
/// the update. The new photo is removed again when the update does not land.
pub(crate) async fn apply_profile_update(
    state: &AppState,
    user_id: Uuid,
    form: ProfileForm,
) -> Result<ProfilePublic, ApiError> {
    let mut update = ProfileUpdate {
        name: form.name.as_deref().map(parse_name).transpose()?,
        gender: form.gender.as_deref().map(parse_gender).transpose()?,
        age: form.age.as_deref().map(parse_age).transpose()?,
        about: form.about.map(|about| about.trim().to_string()),
        photo_path: None,
        interests: form.interests.as_deref().map(parse_interests).transpose()?,
    };

    if let Some(photo) = &form.photo {
        update.photo_path = Some(
            state
                .photos
                .save_photo(photo.file_name.as_deref(), &photo.data)
                .await?,
        );
    }

    let new_photo = update.photo_path.clone();
    let updated = blocking(state, move |db| db.update_profile(user_id, &update))
        .await
        .and_then(|row| row.ok_or_else(|| ApiError::NotFound("Profile not found".to_string())));
    if let Err(e) = updated {
        if let Some(path) = &new_photo {
            state.photos.discard(path).await;
        }
        return Err(e);
    }
    info!("User {} updated their profile", user_id);

    load_public_profile(state, user_id).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{app, user};

    #[test]
    fn login_and_password_bounds() {
        assert_eq!(validate_login("  alice ").unwrap(), "alice");
        assert!(validate_login("al").is_err());
        assert!(validate_login(&"x".repeat(65)).is_err());

        assert!(validate_password("secret").is_ok());
        assert!(validate_password("short").is_err());
        assert!(validate_password(&"p".repeat(129)).is_err());
    }

    #[test]
    fn name_gender_age() {
        assert_eq!(parse_name(" Ann ").unwrap(), "Ann");
        assert!(parse_name("   ").is_err());
        assert!(parse_name(&"n".repeat(65)).is_err());

        assert_eq!(parse_gender("female").unwrap(), Gender::Female);
        assert!(parse_gender("robot").is_err());

        assert_eq!(parse_age("18").unwrap(), 18);
        assert_eq!(parse_age(" 99 ").unwrap(), 99);
        assert!(parse_age("17").is_err());
        assert!(parse_age("100").is_err());
        assert!(parse_age("old").is_err());
    }

    #[test]
    fn interests_are_validated_and_deduplicated() {
        assert_eq!(
            parse_interests("music, coding,music,,travel").unwrap(),
            vec!["music", "coding", "travel"]
        );
        assert!(matches!(parse_interests(" , "), Err(ApiError::InvalidInput(m)) if m == "Interests required"));
        assert!(matches!(parse_interests("music,knitting"), Err(ApiError::InvalidInput(m)) if m == "Unknown interest in list"));
    }

    #[tokio::test]
    async fn own_profile_uses_public_photo_url() {
        let app = app().await;
        let id = user(&app.state, "ann");

        let me = load_public_profile(&app.state, id).await.unwrap();

        assert_eq!(me.user_id, id);
        assert_eq!(me.name, "ann name");
        assert_eq!(me.photo_url, "http://localhost:8080/static/ann.jpg");
        assert_eq!(me.interests, vec!["music", "travel"]);
    }

    fn photo_form() -> ProfileForm {
        ProfileForm {
            name: Some("Ann B.".to_string()),
            photo: Some(UploadedFile {
                file_name: Some("new.png".to_string()),
                data: Bytes::from_static(b"png bytes"),
            }),
            ..ProfileForm::default()
        }
    }

    fn stored_files(state: &AppState) -> Vec<String> {
        std::fs::read_dir(state.photos.dir())
            .unwrap()
            .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
            .filter(|name| name != crate::photos::DEFAULT_AVATAR_NAME)
            .collect()
    }

    #[tokio::test]
    async fn profile_update_replaces_photo_and_name() {
        let app = app().await;
        let id = user(&app.state, "ann");

        let me = apply_profile_update(&app.state, id, photo_form()).await.unwrap();

        assert_eq!(me.name, "Ann B.");
        let files = stored_files(&app.state);
        assert_eq!(files.len(), 1);
        assert!(files[0].ends_with(".png"));
        assert!(me.photo_url.ends_with(&files[0]));
    }

    #[tokio::test]
    async fn failed_profile_update_removes_new_photo() {
        let app = app().await;

        let err = apply_profile_update(&app.state, Uuid::new_v4(), photo_form())
            .await
            .unwrap_err();

        assert!(matches!(err, ApiError::NotFound(_)));
        assert!(stored_files(&app.state).is_empty());
    }

    #[tokio::test]
    async fn unknown_profile_is_not_found() {
        let app = app().await;
        let err = load_public_profile(&app.state, Uuid::new_v4()).await.unwrap_err();
        assert!(matches!(err, ApiError::NotFound(_)));
    }
}
