use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

#[derive(Debug, Deserialize)]
pub struct SaveResumeRequest {
    pub resume: serde_json::Value,
    #[serde(default)]
    pub avatar_url: Option<String>,
    #[serde(default)]
    pub template_id: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ResumeResponse {
    pub resume: Option<serde_json::Value>,
    pub avatar_url: String,
    pub template_id: String,
    pub updated_at: Option<OffsetDateTime>,
}

#[derive(Debug, Serialize)]
pub struct SavedResumeResponse {
    pub updated_at: OffsetDateTime,
}

#[derive(Debug, Serialize)]
pub struct PublicProfileUser {
    pub username: String,
}

#[derive(Debug, Serialize)]
pub struct PublicProfileResponse {
    pub user: PublicProfileUser,
    pub resume: Option<serde_json::Value>,
    pub avatar_url: String,
    pub template_id: String,
}

#[derive(Debug, Serialize)]
pub struct AvatarResponse {
    pub url: String,
}
