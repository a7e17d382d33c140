use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use tracing::error;

/// Application error taxonomy, mapped onto HTTP statuses by `IntoResponse`.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("{0}")]
    Validation(String),
    #[error("{0}")]
    Conflict(String),
    #[error("{0}")]
    Auth(String),
    #[error("{0}")]
    NotFound(String),
    #[error("too many requests")]
    RateLimited,
    #[error("{0}")]
    Upstream(String),
    #[error(transparent)]
    Infra(#[from] anyhow::Error),
}

impl ApiError {
    /// The one login failure message, shared between "no such account" and
    /// "wrong password" so the two cases are indistinguishable.
    pub fn invalid_credentials() -> Self {
        Self::Auth("invalid credentials".into())
    }

    fn status(&self) -> StatusCode {
        match self {
            Self::Validation(_) => StatusCode::BAD_REQUEST,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::Auth(_) => StatusCode::UNAUTHORIZED,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            Self::Upstream(_) => StatusCode::BAD_GATEWAY,
            Self::Infra(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = match &self {
            Self::Infra(e) => {
                error!(error = %e, "internal error");
                "internal server error".to_string()
            }
            Self::Upstream(e) => {
                error!(error = %e, "upstream error");
                "upstream service failed".to_string()
            }
            other => other.to_string(),
        };
        (status, Json(json!({ "error": message }))).into_response()
    }
}

/// Postgres unique-constraint violation (SQLSTATE 23505). Duplicate-insert
/// races must surface as the same conflict a sequential duplicate would.
pub fn is_unique_violation(e: &sqlx::Error) -> bool {
    e.as_database_error()
        .and_then(|db| db.code())
        .map(|code| code == "23505")
        .unwrap_or(false)
}

impl From<sqlx::Error> for ApiError {
    fn from(e: sqlx::Error) -> Self {
        Self::Infra(e.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_mapping() {
        assert_eq!(
            ApiError::Validation("bad".into()).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ApiError::Conflict("dup".into()).status(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            ApiError::Auth("no".into()).status(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            ApiError::NotFound("gone".into()).status(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(ApiError::RateLimited.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(
            ApiError::Upstream("down".into()).status(),
            StatusCode::BAD_GATEWAY
        );
    }

    #[test]
    fn invalid_credentials_message_is_uniform() {
        let a = ApiError::invalid_credentials();
        let b = ApiError::invalid_credentials();
        assert_eq!(a.to_string(), b.to_string());
        assert_eq!(a.to_string(), "invalid credentials");
    }
}
