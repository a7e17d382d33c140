use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct OAuthConfig {
    pub github_client_id: Option<String>,
    pub github_client_secret: Option<String>,
    pub google_client_id: Option<String>,
    pub google_client_secret: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    pub endpoint: String,
    pub bucket: String,
    pub access_key: String,
    pub secret_key: String,
    pub region: String,
    /// Base URL for serving stored objects; falls back to path-style
    /// `{endpoint}/{bucket}` when unset.
    pub public_base_url: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LlmConfig {
    pub api_key: Option<String>,
    pub base_url: String,
    pub model: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MapConfig {
    pub key: Option<String>,
    pub secret_key: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub database_url: String,
    /// Origin the browser-facing app is served from; OAuth redirects land here.
    pub public_base_url: String,
    pub cookie_secure: bool,
    pub session_ttl_days: i64,
    pub chat_daily_limit: i64,
    pub oauth: OAuthConfig,
    pub storage: StorageConfig,
    pub llm: LlmConfig,
    pub map: MapConfig,
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let database_url = std::env::var("DATABASE_URL")?;
        let public_base_url =
            std::env::var("PUBLIC_BASE_URL").unwrap_or_else(|_| "http://localhost:3000".into());
        let cookie_secure = std::env::var("APP_ENV")
            .map(|v| v == "production")
            .unwrap_or(false);
        let session_ttl_days = std::env::var("SESSION_TTL_DAYS")
            .ok()
            .and_then(|v| v.parse::<i64>().ok())
            .unwrap_or(30);
        let chat_daily_limit = std::env::var("CHAT_DAILY_LIMIT")
            .ok()
            .and_then(|v| v.parse::<i64>().ok())
            .unwrap_or(30);

        let oauth = OAuthConfig {
            github_client_id: std::env::var("GITHUB_CLIENT_ID").ok(),
            github_client_secret: std::env::var("GITHUB_CLIENT_SECRET").ok(),
            google_client_id: std::env::var("GOOGLE_CLIENT_ID").ok(),
            google_client_secret: std::env::var("GOOGLE_CLIENT_SECRET").ok(),
        };

        let storage = StorageConfig {
            endpoint: std::env::var("S3_ENDPOINT")
                .unwrap_or_else(|_| "http://localhost:9000".into()),
            bucket: std::env::var("S3_BUCKET").unwrap_or_else(|_| "resumio-avatars".into()),
            access_key: std::env::var("S3_ACCESS_KEY").unwrap_or_default(),
            secret_key: std::env::var("S3_SECRET_KEY").unwrap_or_default(),
            region: std::env::var("S3_REGION").unwrap_or_else(|_| "us-east-1".into()),
            public_base_url: std::env::var("AVATAR_PUBLIC_BASE_URL").ok(),
        };

        let llm = LlmConfig {
            api_key: std::env::var("LLM_API_KEY").ok(),
            base_url: std::env::var("LLM_BASE_URL")
                .unwrap_or_else(|_| "https://api.deepseek.com".into()),
            model: std::env::var("LLM_MODEL").unwrap_or_else(|_| "deepseek-chat".into()),
        };

        let map = MapConfig {
            key: std::env::var("MAP_API_KEY").ok(),
            secret_key: std::env::var("MAP_SECRET_KEY").ok(),
        };

        Ok(Self {
            database_url,
            public_base_url,
            cookie_secure,
            session_ttl_days,
            chat_daily_limit,
            oauth,
            storage,
            llm,
            map,
        })
    }
}
