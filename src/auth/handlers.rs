use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Redirect, Response},
    routing::{get, post},
    Json, Router,
};
use axum_extra::extract::CookieJar;
use serde::Deserialize;
use serde_json::json;
use tracing::{instrument, warn};
use uuid::Uuid;

use crate::auth::cookie::{
    clear_oauth_state_cookie, clear_session_cookie, oauth_state_cookie, oauth_state_cookie_name,
    session_cookie, SESSION_COOKIE,
};
use crate::auth::dto::{AuthResponse, LoginRequest, MeResponse, RegisterRequest};
use crate::auth::extractors::MaybeUser;
use crate::auth::oauth::{self, OAuthProvider};
use crate::auth::services::{self, SessionGrant};
use crate::auth::session;
use crate::error::ApiError;
use crate::state::AppState;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/auth/register", post(register))
        .route("/auth/login", post(login))
        .route("/auth/logout", post(logout))
        .route("/auth/me", get(me))
        .route("/auth/oauth/:provider/start", get(oauth_start))
        .route("/auth/oauth/:provider/callback", get(oauth_callback))
}

fn grant_cookie(state: &AppState, grant: &SessionGrant) -> axum_extra::extract::cookie::Cookie<'static> {
    session_cookie(
        grant.token.clone(),
        grant.expires_at,
        state.config.cookie_secure,
    )
}

#[instrument(skip(state, jar, payload))]
async fn register(
    State(state): State<AppState>,
    jar: CookieJar,
    Json(payload): Json<RegisterRequest>,
) -> Result<(StatusCode, CookieJar, Json<AuthResponse>), ApiError> {
    let grant = services::register(&state, payload).await?;
    let jar = jar.add(grant_cookie(&state, &grant));
    Ok((
        StatusCode::CREATED,
        jar,
        Json(AuthResponse {
            user: grant.user.into(),
        }),
    ))
}

#[instrument(skip(state, jar, payload))]
async fn login(
    State(state): State<AppState>,
    jar: CookieJar,
    Json(payload): Json<LoginRequest>,
) -> Result<(CookieJar, Json<AuthResponse>), ApiError> {
    let grant = services::login(&state, payload).await?;
    let jar = jar.add(grant_cookie(&state, &grant));
    Ok((
        jar,
        Json(AuthResponse {
            user: grant.user.into(),
        }),
    ))
}

/// Best-effort session deletion; the cookie is cleared regardless, so a
/// second logout with a stale cookie succeeds the same way.
#[instrument(skip(state, jar))]
async fn logout(
    State(state): State<AppState>,
    jar: CookieJar,
) -> (CookieJar, Json<serde_json::Value>) {
    if let Some(cookie) = jar.get(SESSION_COOKIE) {
        if let Err(e) = session::revoke(&state.db, cookie.value()).await {
            warn!(error = %e, "session revoke failed");
        }
    }
    let jar = jar.add(clear_session_cookie(state.config.cookie_secure));
    (jar, Json(json!({ "ok": true })))
}

/// Silent identity probe: unauthenticated requests get `{"user": null}`
/// rather than 401, so UI code can check without forcing a redirect.
#[instrument(skip_all)]
async fn me(MaybeUser(user): MaybeUser) -> Json<MeResponse> {
    Json(MeResponse {
        user: user.map(Into::into),
    })
}

#[instrument(skip(state, jar))]
async fn oauth_start(
    State(state): State<AppState>,
    Path(provider): Path<String>,
    jar: CookieJar,
) -> Result<(CookieJar, Redirect), ApiError> {
    let provider = OAuthProvider::parse(&provider)
        .ok_or_else(|| ApiError::NotFound("unsupported provider".into()))?;

    let csrf_state = Uuid::new_v4().to_string();
    let authorize_url = oauth::authorize_url(&state.config, provider, &csrf_state)?;

    let jar = jar.add(oauth_state_cookie(
        provider,
        csrf_state,
        state.config.cookie_secure,
    ));
    Ok((jar, Redirect::to(&authorize_url)))
}

#[derive(Debug, Deserialize)]
struct CallbackQuery {
    #[serde(default)]
    code: String,
    #[serde(default)]
    state: String,
}

/// Terminal failure: back to the home page with an opaque error flag and
/// the state cookie cleared. Provider error text never reaches the user.
fn redirect_home(
    jar: CookieJar,
    provider: OAuthProvider,
    base_url: &str,
    error: &str,
) -> Response {
    let jar = jar.add(clear_oauth_state_cookie(provider));
    let url = format!("{}/?error={error}", base_url.trim_end_matches('/'));
    (jar, Redirect::to(&url)).into_response()
}

#[instrument(skip(state, jar, query))]
async fn oauth_callback(
    State(state): State<AppState>,
    Path(provider): Path<String>,
    jar: CookieJar,
    Query(query): Query<CallbackQuery>,
) -> Response {
    let Some(provider) = OAuthProvider::parse(&provider) else {
        return ApiError::NotFound("unsupported provider".into()).into_response();
    };
    let base_url = state.config.public_base_url.clone();

    if query.code.is_empty() || query.state.is_empty() {
        return redirect_home(jar, provider, &base_url, "oauth_missing_code");
    }

    let stored_state = jar
        .get(&oauth_state_cookie_name(provider))
        .map(|c| c.value().to_string());
    if stored_state.as_deref() != Some(query.state.as_str()) {
        warn!(%provider, "oauth state mismatch");
        return redirect_home(jar, provider, &base_url, "oauth_state_mismatch");
    }

    match oauth::complete(&state, provider, &query.code).await {
        Ok(grant) => {
            let target = format!(
                "{}/{}",
                base_url.trim_end_matches('/'),
                grant.user.username
            );
            let jar = jar
                .add(clear_oauth_state_cookie(provider))
                .add(grant_cookie(&state, &grant));
            (jar, Redirect::to(&target)).into_response()
        }
        Err(e) => {
            warn!(error = %e, %provider, "oauth flow failed");
            redirect_home(jar, provider, &base_url, "oauth_failed")
        }
    }
}
