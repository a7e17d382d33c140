use std::fmt;

use anyhow::anyhow;
use lazy_static::lazy_static;
use rand::rngs::OsRng;
use rand::RngCore;
use regex::Regex;
use reqwest::header::{ACCEPT, USER_AGENT};
use reqwest::Url;
use serde::Deserialize;
use sqlx::PgPool;
use tracing::{debug, info};

use crate::auth::repo::{self, User};
use crate::auth::services::{
    is_reserved_username, is_valid_username, normalize_email, normalize_username,
    PLACEHOLDER_EMAIL_DOMAIN, SessionGrant,
};
use crate::auth::session;
use crate::config::AppConfig;
use crate::error::ApiError;
use crate::state::AppState;

const USERNAME_MAX_LEN: usize = 24;
const SUFFIX_ATTEMPTS: u32 = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OAuthProvider {
    Github,
    Google,
}

impl OAuthProvider {
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "github" => Some(Self::Github),
            "google" => Some(Self::Google),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Github => "github",
            Self::Google => "google",
        }
    }

    /// GitHub handles drift when users rename upstream; the local username
    /// follows on every login. Google hints are derived from the email and
    /// are left alone after account creation.
    fn syncs_username(&self) -> bool {
        matches!(self, Self::Github)
    }
}

impl fmt::Display for OAuthProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identity fields extracted from a provider profile.
#[derive(Debug, Clone)]
pub struct OAuthProfile {
    pub provider_user_id: String,
    pub email: String,
    pub username_hint: String,
}

struct ProviderCredentials<'a> {
    client_id: &'a str,
    client_secret: &'a str,
}

fn provider_credentials<'a>(
    config: &'a AppConfig,
    provider: OAuthProvider,
) -> Result<ProviderCredentials<'a>, ApiError> {
    let (id, secret) = match provider {
        OAuthProvider::Github => (
            config.oauth.github_client_id.as_deref(),
            config.oauth.github_client_secret.as_deref(),
        ),
        OAuthProvider::Google => (
            config.oauth.google_client_id.as_deref(),
            config.oauth.google_client_secret.as_deref(),
        ),
    };
    match (id, secret) {
        (Some(client_id), Some(client_secret)) => Ok(ProviderCredentials {
            client_id,
            client_secret,
        }),
        _ => Err(ApiError::Infra(anyhow!(
            "{provider} oauth is not configured"
        ))),
    }
}

pub fn redirect_uri(config: &AppConfig, provider: OAuthProvider) -> String {
    format!(
        "{}/auth/oauth/{provider}/callback",
        config.public_base_url.trim_end_matches('/')
    )
}

/// Provider authorize URL carrying the anti-CSRF state.
pub fn authorize_url(
    config: &AppConfig,
    provider: OAuthProvider,
    state: &str,
) -> Result<String, ApiError> {
    let creds = provider_credentials(config, provider)?;
    let redirect = redirect_uri(config, provider);

    let url = match provider {
        OAuthProvider::Github => Url::parse_with_params(
            "https://github.com/login/oauth/authorize",
            &[
                ("client_id", creds.client_id),
                ("redirect_uri", redirect.as_str()),
                ("response_type", "code"),
                ("state", state),
                ("scope", "read:user user:email"),
            ],
        ),
        OAuthProvider::Google => Url::parse_with_params(
            "https://accounts.google.com/o/oauth2/v2/auth",
            &[
                ("client_id", creds.client_id),
                ("redirect_uri", redirect.as_str()),
                ("response_type", "code"),
                ("state", state),
                ("scope", "openid email profile"),
                ("access_type", "online"),
                ("prompt", "select_account"),
            ],
        ),
    }
    .map_err(|e| ApiError::Infra(anyhow!("bad authorize url: {e}")))?;

    Ok(url.to_string())
}

fn upstream(e: reqwest::Error) -> ApiError {
    ApiError::Upstream(e.to_string())
}

async fn github_profile(state: &AppState, code: &str) -> Result<OAuthProfile, ApiError> {
    let creds = provider_credentials(&state.config, OAuthProvider::Github)?;
    let redirect = redirect_uri(&state.config, OAuthProvider::Github);

    #[derive(Deserialize, Default)]
    struct TokenResponse {
        access_token: Option<String>,
    }

    let token: TokenResponse = state
        .http
        .post("https://github.com/login/oauth/access_token")
        .header(ACCEPT, "application/json")
        .form(&[
            ("client_id", creds.client_id),
            ("client_secret", creds.client_secret),
            ("code", code),
            ("redirect_uri", redirect.as_str()),
        ])
        .send()
        .await
        .map_err(upstream)?
        .json()
        .await
        .map_err(upstream)?;

    let access_token = token
        .access_token
        .ok_or_else(|| ApiError::Upstream("github token exchange failed".into()))?;

    #[derive(Deserialize)]
    struct GithubUser {
        id: i64,
        login: Option<String>,
        email: Option<String>,
    }

    let user: GithubUser = state
        .http
        .get("https://api.github.com/user")
        .bearer_auth(&access_token)
        .header(ACCEPT, "application/vnd.github+json")
        .header(USER_AGENT, "resumio-auth")
        .send()
        .await
        .map_err(upstream)?
        .json()
        .await
        .map_err(upstream)?;

    // The profile email is often private; fall back through the emails
    // endpoint preferring primary+verified, then verified, then anything.
    let mut email = user.email.unwrap_or_default();
    if email.is_empty() {
        #[derive(Deserialize)]
        struct GithubEmail {
            email: String,
            #[serde(default)]
            primary: bool,
            #[serde(default)]
            verified: bool,
        }

        let emails: Vec<GithubEmail> = state
            .http
            .get("https://api.github.com/user/emails")
            .bearer_auth(&access_token)
            .header(ACCEPT, "application/vnd.github+json")
            .header(USER_AGENT, "resumio-auth")
            .send()
            .await
            .map_err(upstream)?
            .json()
            .await
            .unwrap_or_default();

        email = emails
            .iter()
            .find(|e| e.primary && e.verified)
            .or_else(|| emails.iter().find(|e| e.verified))
            .or_else(|| emails.first())
            .map(|e| e.email.clone())
            .unwrap_or_default();
    }
    if email.is_empty() {
        email = format!("github_{}@{PLACEHOLDER_EMAIL_DOMAIN}", user.id);
    }

    let username_hint = user
        .login
        .filter(|l| !l.is_empty())
        .unwrap_or_else(|| format!("github_{}", user.id));

    Ok(OAuthProfile {
        provider_user_id: user.id.to_string(),
        email: normalize_email(&email),
        username_hint,
    })
}

async fn google_profile(state: &AppState, code: &str) -> Result<OAuthProfile, ApiError> {
    let creds = provider_credentials(&state.config, OAuthProvider::Google)?;
    let redirect = redirect_uri(&state.config, OAuthProvider::Google);

    #[derive(Deserialize, Default)]
    struct TokenResponse {
        access_token: Option<String>,
    }

    let token: TokenResponse = state
        .http
        .post("https://oauth2.googleapis.com/token")
        .form(&[
            ("code", code),
            ("client_id", creds.client_id),
            ("client_secret", creds.client_secret),
            ("redirect_uri", redirect.as_str()),
            ("grant_type", "authorization_code"),
        ])
        .send()
        .await
        .map_err(upstream)?
        .json()
        .await
        .map_err(upstream)?;

    let access_token = token
        .access_token
        .ok_or_else(|| ApiError::Upstream("google token exchange failed".into()))?;

    #[derive(Deserialize)]
    struct GoogleUser {
        sub: String,
        email: Option<String>,
        name: Option<String>,
    }

    let user: GoogleUser = state
        .http
        .get("https://www.googleapis.com/oauth2/v3/userinfo")
        .bearer_auth(&access_token)
        .send()
        .await
        .map_err(upstream)?
        .json()
        .await
        .map_err(upstream)?;

    let email = match user.email.as_deref().map(str::trim) {
        Some(raw) if !raw.is_empty() => normalize_email(raw),
        _ => format!("google_{}@{PLACEHOLDER_EMAIL_DOMAIN}", user.sub),
    };

    let username_hint = user
        .email
        .as_deref()
        .and_then(|e| e.split('@').next())
        .filter(|local| !local.is_empty())
        .map(str::to_string)
        .or(user.name)
        .filter(|n| !n.is_empty())
        .unwrap_or_else(|| {
            format!("google_{}", user.sub.chars().take(10).collect::<String>())
        });

    Ok(OAuthProfile {
        provider_user_id: user.sub,
        email,
        username_hint,
    })
}

/// Exchange an authorization code for the provider's profile.
pub async fn exchange_code(
    state: &AppState,
    provider: OAuthProvider,
    code: &str,
) -> Result<OAuthProfile, ApiError> {
    match provider {
        OAuthProvider::Github => github_profile(state, code).await,
        OAuthProvider::Google => google_profile(state, code).await,
    }
}

lazy_static! {
    static ref INVALID_USERNAME_RUN: Regex = Regex::new(r"[^a-z0-9_-]+").unwrap();
}

fn random_handle() -> String {
    let mut bytes = [0u8; 4];
    OsRng.fill_bytes(&mut bytes);
    format!("user_{}", hex::encode(bytes))
}

fn sanitize_username_base(raw: &str) -> String {
    let normalized = normalize_username(raw);
    let replaced = INVALID_USERNAME_RUN.replace_all(&normalized, "-");
    let trimmed = replaced.trim_matches(|c| c == '-' || c == '_');

    if trimmed.len() >= 3 {
        trimmed.chars().take(USERNAME_MAX_LEN).collect()
    } else {
        random_handle()
    }
}

/// Resolve a provider's username hint to a free local username: the
/// sanitized base, then numeric suffixes, then random fallback handles.
async fn ensure_unique_username(
    db: &PgPool,
    hint: &str,
    exclude_user_id: Option<uuid::Uuid>,
) -> Result<String, ApiError> {
    let base = sanitize_username_base(hint);

    for index in 0..SUFFIX_ATTEMPTS {
        let suffix = if index == 0 {
            String::new()
        } else {
            format!("_{}", index + 1)
        };
        let keep = USERNAME_MAX_LEN.saturating_sub(suffix.len()).max(3);
        let candidate = format!("{}{}", &base[..base.len().min(keep)], suffix);

        if !is_valid_username(&candidate) || is_reserved_username(&candidate) {
            continue;
        }
        if !User::username_taken(db, &candidate, exclude_user_id).await? {
            return Ok(candidate);
        }
    }

    loop {
        let fallback = random_handle();
        if !User::username_taken(db, &fallback, exclude_user_id).await? {
            return Ok(fallback);
        }
    }
}

async fn sync_username(
    db: &PgPool,
    user: User,
    profile: &OAuthProfile,
) -> Result<User, ApiError> {
    let preferred = ensure_unique_username(db, &profile.username_hint, Some(user.id)).await?;
    if preferred == user.username {
        return Ok(user);
    }

    User::update_username(db, user.id, &preferred).await?;
    debug!(user_id = %user.id, from = %user.username, to = %preferred, "username re-synced");
    Ok(User {
        username: preferred,
        ..user
    })
}

/// Map a provider identity to a local account: existing link first, then
/// email match (linking as a side effect), then a fresh account with a
/// collision-resolved username and a sentinel password hash.
async fn find_or_create_user(
    db: &PgPool,
    provider: OAuthProvider,
    profile: &OAuthProfile,
) -> Result<User, ApiError> {
    if let Some(user) =
        repo::find_linked_user(db, provider.as_str(), &profile.provider_user_id).await?
    {
        return if provider.syncs_username() {
            sync_username(db, user, profile).await
        } else {
            Ok(user)
        };
    }

    if let Some(user) = User::find_by_email(db, &profile.email).await? {
        let user = if provider.syncs_username() {
            sync_username(db, user, profile).await?
        } else {
            user
        };
        repo::link_account(db, provider.as_str(), &profile.provider_user_id, user.id).await?;
        info!(user_id = %user.id, %provider, "provider identity linked to existing account");
        return Ok(user);
    }

    let username = ensure_unique_username(db, &profile.username_hint, None).await?;
    let user = User::create(
        db,
        &username,
        &profile.email,
        &format!("oauth:{provider}"),
    )
    .await?;
    repo::link_account(db, provider.as_str(), &profile.provider_user_id, user.id).await?;
    info!(user_id = %user.id, %provider, "account created from provider identity");
    Ok(user)
}

/// Run the post-state-check half of the callback: code exchange, account
/// resolution, session issuance.
pub async fn complete(
    state: &AppState,
    provider: OAuthProvider,
    code: &str,
) -> Result<SessionGrant, ApiError> {
    let profile = exchange_code(state, provider, code).await?;
    let user = find_or_create_user(&state.db, provider, &profile).await?;
    let session = session::create(&state.db, user.id, state.config.session_ttl_days).await?;

    Ok(SessionGrant {
        user,
        token: session.token,
        expires_at: session.expires_at,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provider_parse_round_trips() {
        assert_eq!(OAuthProvider::parse("github"), Some(OAuthProvider::Github));
        assert_eq!(OAuthProvider::parse("google"), Some(OAuthProvider::Google));
        assert_eq!(OAuthProvider::parse("facebook"), None);
        assert_eq!(OAuthProvider::Github.to_string(), "github");
    }

    #[test]
    fn sanitize_lowercases_and_replaces_invalid_runs() {
        assert_eq!(sanitize_username_base("Bob Smith"), "bob-smith");
        assert_eq!(sanitize_username_base("Jane..Doe!!x"), "jane-doe-x");
        assert_eq!(sanitize_username_base("already_fine-1"), "already_fine-1");
    }

    #[test]
    fn sanitize_trims_edge_separators() {
        assert_eq!(sanitize_username_base("--bob--"), "bob");
        assert_eq!(sanitize_username_base("__bob__"), "bob");
    }

    #[test]
    fn sanitize_truncates_to_max_length() {
        let long = "a".repeat(40);
        assert_eq!(sanitize_username_base(&long).len(), USERNAME_MAX_LEN);
    }

    #[test]
    fn sanitize_falls_back_to_random_handle_when_too_short() {
        let handle = sanitize_username_base("!!");
        assert!(handle.starts_with("user_"));
        assert_eq!(handle.len(), "user_".len() + 8);
        assert!(is_valid_username(&handle));
    }

    #[test]
    fn random_handles_are_valid_usernames() {
        let handle = random_handle();
        assert!(is_valid_username(&handle));
        assert_ne!(random_handle(), random_handle());
    }

    #[tokio::test]
    async fn authorize_url_embeds_state_and_redirect() {
        let state = crate::state::AppState::fake();
        let url = authorize_url(&state.config, OAuthProvider::Github, "csrf123").unwrap();
        assert!(url.starts_with("https://github.com/login/oauth/authorize?"));
        assert!(url.contains("state=csrf123"));
        assert!(url.contains("client_id=test-client"));
        assert!(url.contains(
            "redirect_uri=http%3A%2F%2Flocalhost%3A3000%2Fauth%2Foauth%2Fgithub%2Fcallback"
        ));
        assert!(url.contains("scope=read%3Auser+user%3Aemail"));
    }

    #[tokio::test]
    async fn authorize_url_requires_configured_provider() {
        let state = crate::state::AppState::fake();
        let err = authorize_url(&state.config, OAuthProvider::Google, "s").unwrap_err();
        assert!(matches!(err, ApiError::Infra(_)));
    }
}
