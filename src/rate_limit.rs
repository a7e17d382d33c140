use async_trait::async_trait;
use sqlx::PgPool;

use crate::error::ApiError;

/// Injectable counter store. Callers embed the window in the key
/// (e.g. `chat:{user_id}:{date}`), so one increment per request is the
/// whole protocol and behavior stays deterministic across replicas.
#[async_trait]
pub trait RateLimiter: Send + Sync {
    /// Increment the counter for `key` and return the running count.
    async fn increment(&self, key: &str) -> Result<i64, ApiError>;
}

pub struct PgRateLimiter {
    db: PgPool,
}

impl PgRateLimiter {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

#[async_trait]
impl RateLimiter for PgRateLimiter {
    async fn increment(&self, key: &str) -> Result<i64, ApiError> {
        let (count,): (i64,) = sqlx::query_as(
            r#"
            INSERT INTO rate_limits (key, count, window_start)
            VALUES ($1, 1, now())
            ON CONFLICT (key) DO UPDATE SET count = rate_limits.count + 1
            RETURNING count
            "#,
        )
        .bind(key)
        .fetch_one(&self.db)
        .await?;
        Ok(count)
    }
}
