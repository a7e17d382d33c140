use axum::{
    extract::{DefaultBodyLimit, Multipart, Path, State},
    routing::{get, post},
    Json, Router,
};
use tracing::{info, instrument};
use uuid::Uuid;

use crate::auth::extractors::CurrentUser;
use crate::auth::services::normalize_username;
use crate::error::ApiError;
use crate::resume::dto::{
    AvatarResponse, PublicProfileResponse, PublicProfileUser, ResumeResponse, SaveResumeRequest,
    SavedResumeResponse,
};
use crate::resume::repo;
use crate::state::AppState;
use crate::storage::public_object_url;

const MAX_RESUME_BYTES: usize = 1024 * 1024;
const MAX_AVATAR_BYTES: usize = 5 * 1024 * 1024;

pub fn routes() -> Router<AppState> {
    let resume = Router::new()
        .route("/resume", get(get_resume).put(save_resume))
        .layer(DefaultBodyLimit::max(MAX_RESUME_BYTES + 16 * 1024));
    let avatar = Router::new()
        .route("/user/avatar", post(upload_avatar))
        .layer(DefaultBodyLimit::max(MAX_AVATAR_BYTES + 16 * 1024));
    let public = Router::new().route("/public/:username", get(public_profile));

    resume.merge(avatar).merge(public)
}

#[instrument(skip(state, user))]
async fn get_resume(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
) -> Result<Json<ResumeResponse>, ApiError> {
    let response = match repo::get(&state.db, user.id).await? {
        Some(record) => ResumeResponse {
            resume: Some(record.resume_json),
            avatar_url: record.avatar_url,
            template_id: record.template_id,
            updated_at: Some(record.updated_at),
        },
        None => ResumeResponse {
            resume: None,
            avatar_url: String::new(),
            template_id: "classic".into(),
            updated_at: None,
        },
    };
    Ok(Json(response))
}

#[instrument(skip(state, user, payload))]
async fn save_resume(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Json(payload): Json<SaveResumeRequest>,
) -> Result<Json<SavedResumeResponse>, ApiError> {
    let serialized = serde_json::to_vec(&payload.resume)
        .map_err(|e| ApiError::Validation(format!("resume is not serializable: {e}")))?;
    if serialized.len() > MAX_RESUME_BYTES {
        return Err(ApiError::Validation("resume payload too large".into()));
    }

    let updated_at = repo::upsert(
        &state.db,
        user.id,
        &payload.resume,
        payload.avatar_url.as_deref(),
        payload.template_id.as_deref(),
    )
    .await?;

    info!(user_id = %user.id, bytes = serialized.len(), "resume saved");
    Ok(Json(SavedResumeResponse { updated_at }))
}

#[instrument(skip(state))]
async fn public_profile(
    State(state): State<AppState>,
    Path(username): Path<String>,
) -> Result<Json<PublicProfileResponse>, ApiError> {
    let username = normalize_username(&username);
    let user = crate::auth::repo::User::find_by_username(&state.db, &username)
        .await?
        .ok_or_else(|| ApiError::NotFound("profile not found".into()))?;

    let response = match repo::get(&state.db, user.id).await? {
        Some(record) => PublicProfileResponse {
            user: PublicProfileUser {
                username: user.username,
            },
            resume: Some(record.resume_json),
            avatar_url: record.avatar_url,
            template_id: record.template_id,
        },
        None => PublicProfileResponse {
            user: PublicProfileUser {
                username: user.username,
            },
            resume: None,
            avatar_url: String::new(),
            template_id: "classic".into(),
        },
    };
    Ok(Json(response))
}

fn ext_from_mime(ct: &str) -> Option<&'static str> {
    match ct {
        "image/jpeg" | "image/jpg" => Some("jpg"),
        "image/png" => Some("png"),
        "image/webp" => Some("webp"),
        "image/gif" => Some("gif"),
        "image/avif" => Some("avif"),
        _ => None,
    }
}

/// Multipart upload of a single `file` field. Only image types on the
/// allowlist are accepted; the stored URL is written back to the profile.
#[instrument(skip(state, user, multipart))]
async fn upload_avatar(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    mut multipart: Multipart,
) -> Result<Json<AvatarResponse>, ApiError> {
    let mut upload: Option<(bytes::Bytes, &'static str, &'static str)> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::Validation(format!("malformed multipart body: {e}")))?
    {
        if field.name() != Some("file") {
            continue;
        }
        let content_type = field.content_type().unwrap_or_default().to_string();
        let Some(ext) = ext_from_mime(&content_type) else {
            return Err(ApiError::Validation(
                "unsupported image type; expected jpeg, png, webp, gif or avif".into(),
            ));
        };
        let mime: &'static str = match ext {
            "jpg" => "image/jpeg",
            "png" => "image/png",
            "webp" => "image/webp",
            "gif" => "image/gif",
            _ => "image/avif",
        };
        let data = field
            .bytes()
            .await
            .map_err(|e| ApiError::Validation(format!("failed to read upload: {e}")))?;
        upload = Some((data, mime, ext));
        break;
    }

    let Some((data, content_type, ext)) = upload else {
        return Err(ApiError::Validation("file field is required".into()));
    };
    if data.is_empty() {
        return Err(ApiError::Validation("uploaded file is empty".into()));
    }
    if data.len() > MAX_AVATAR_BYTES {
        return Err(ApiError::Validation("avatar exceeds the 5 MiB limit".into()));
    }

    let key = format!("avatars/{}/{}.{ext}", user.id, Uuid::new_v4());
    state
        .storage
        .put_object(&key, data, content_type)
        .await
        .map_err(ApiError::Infra)?;

    let url = public_object_url(&state.config.storage, &key);
    repo::set_avatar_url(&state.db, user.id, &url).await?;

    info!(user_id = %user.id, %key, "avatar uploaded");
    Ok(Json(AvatarResponse { url }))
}
