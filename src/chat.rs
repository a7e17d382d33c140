use axum::{extract::State, routing::post, Json, Router};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use tracing::{info, instrument};

use crate::auth::extractors::CurrentUser;
use crate::error::ApiError;
use crate::state::AppState;

const MAX_PROMPT_CHARS: usize = 4000;

#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    pub prompt: String,
}

#[derive(Debug, Serialize)]
pub struct ChatResponse {
    pub text: String,
}

pub fn routes() -> Router<AppState> {
    Router::new().route("/chat", post(chat))
}

/// Rephrase proxy for the editor. Per-user daily quota; the window lives in
/// the counter key so the limit is consistent across replicas.
#[instrument(skip(state, user, payload))]
async fn chat(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Json(payload): Json<ChatRequest>,
) -> Result<Json<ChatResponse>, ApiError> {
    let prompt = payload.prompt.trim();
    if prompt.is_empty() {
        return Err(ApiError::Validation("prompt must not be empty".into()));
    }
    if prompt.chars().count() > MAX_PROMPT_CHARS {
        return Err(ApiError::Validation("prompt is too long".into()));
    }

    let day = OffsetDateTime::now_utc().date();
    let count = state
        .limiter
        .increment(&format!("chat:{}:{day}", user.id))
        .await?;
    if count > state.config.chat_daily_limit {
        return Err(ApiError::RateLimited);
    }

    let text = state.llm.complete(prompt).await?;
    info!(user_id = %user.id, used = count, "completion served");
    Ok(Json(ChatResponse { text }))
}
