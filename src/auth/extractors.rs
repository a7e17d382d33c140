use axum::{extract::FromRequestParts, http::request::Parts};
use axum_extra::extract::CookieJar;
use tracing::warn;

use crate::auth::cookie::SESSION_COOKIE;
use crate::auth::repo::User;
use crate::auth::session;
use crate::error::ApiError;
use crate::state::AppState;

/// Identity resolved from the session cookie, or None. Never rejects;
/// callers decide whether anonymous means 401 or a public view. The store
/// is not consulted when no cookie is present.
pub struct MaybeUser(pub Option<User>);

/// Identity required; rejects with 401 when the session cookie is missing,
/// malformed or expired.
pub struct CurrentUser(pub User);

#[axum::async_trait]
impl FromRequestParts<AppState> for MaybeUser {
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let jar = CookieJar::from_headers(&parts.headers);
        let Some(cookie) = jar.get(SESSION_COOKIE) else {
            return Ok(MaybeUser(None));
        };

        match session::resolve(&state.db, cookie.value()).await {
            Ok(user) => Ok(MaybeUser(user)),
            Err(e) => {
                warn!(error = %e, "session resolution failed");
                Ok(MaybeUser(None))
            }
        }
    }
}

#[axum::async_trait]
impl FromRequestParts<AppState> for CurrentUser {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let user = MaybeUser::from_request_parts(parts, state)
            .await
            .map(|MaybeUser(user)| user)
            .unwrap_or(None);
        user.map(CurrentUser)
            .ok_or_else(|| ApiError::Auth("authentication required".into()))
    }
}
