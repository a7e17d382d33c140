use sqlx::{FromRow, PgPool};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::error::ApiError;

/// One resume record per user, last write wins.
#[derive(Debug, Clone, FromRow)]
pub struct Resume {
    pub user_id: Uuid,
    pub resume_json: serde_json::Value,
    pub avatar_url: String,
    pub template_id: String,
    pub updated_at: OffsetDateTime,
}

pub async fn get(db: &PgPool, user_id: Uuid) -> Result<Option<Resume>, ApiError> {
    let resume = sqlx::query_as::<_, Resume>(
        r#"
        SELECT user_id, resume_json, avatar_url, template_id, updated_at
        FROM resumes
        WHERE user_id = $1
        "#,
    )
    .bind(user_id)
    .fetch_optional(db)
    .await?;
    Ok(resume)
}

/// Upsert the resume record. Omitted avatar/template fields keep their
/// stored values.
pub async fn upsert(
    db: &PgPool,
    user_id: Uuid,
    resume_json: &serde_json::Value,
    avatar_url: Option<&str>,
    template_id: Option<&str>,
) -> Result<OffsetDateTime, ApiError> {
    let (updated_at,): (OffsetDateTime,) = sqlx::query_as(
        r#"
        INSERT INTO resumes (user_id, resume_json, avatar_url, template_id, updated_at)
        VALUES ($1, $2, COALESCE($3, ''), COALESCE($4, 'classic'), now())
        ON CONFLICT (user_id) DO UPDATE SET
            resume_json = EXCLUDED.resume_json,
            avatar_url = COALESCE($3, resumes.avatar_url),
            template_id = COALESCE($4, resumes.template_id),
            updated_at = now()
        RETURNING updated_at
        "#,
    )
    .bind(user_id)
    .bind(resume_json)
    .bind(avatar_url)
    .bind(template_id)
    .fetch_one(db)
    .await?;
    Ok(updated_at)
}

/// Point the user's profile at a freshly uploaded avatar, creating an empty
/// resume record when none exists yet.
pub async fn set_avatar_url(db: &PgPool, user_id: Uuid, url: &str) -> Result<(), ApiError> {
    sqlx::query(
        r#"
        INSERT INTO resumes (user_id, resume_json, avatar_url, updated_at)
        VALUES ($1, '{}'::jsonb, $2, now())
        ON CONFLICT (user_id) DO UPDATE SET
            avatar_url = $2,
            updated_at = now()
        "#,
    )
    .bind(user_id)
    .bind(url)
    .execute(db)
    .await?;
    Ok(())
}
