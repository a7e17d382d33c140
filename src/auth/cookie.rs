use axum_extra::extract::cookie::{Cookie, SameSite};
use time::{Duration, OffsetDateTime};

use crate::auth::oauth::OAuthProvider;

pub const SESSION_COOKIE: &str = "session";

const STATE_COOKIE_TTL_MINUTES: i64 = 10;

/// Session cookie with an absolute `Expires` matching the server-side
/// session row, so cookie lifetime tracks session lifetime exactly.
pub fn session_cookie(token: String, expires_at: OffsetDateTime, secure: bool) -> Cookie<'static> {
    Cookie::build((SESSION_COOKIE, token))
        .http_only(true)
        .same_site(SameSite::Lax)
        .secure(secure)
        .path("/")
        .expires(expires_at)
        .build()
}

pub fn clear_session_cookie(secure: bool) -> Cookie<'static> {
    Cookie::build((SESSION_COOKIE, ""))
        .http_only(true)
        .same_site(SameSite::Lax)
        .secure(secure)
        .path("/")
        .expires(OffsetDateTime::UNIX_EPOCH)
        .build()
}

pub fn oauth_state_cookie_name(provider: OAuthProvider) -> String {
    format!("oauth_state_{provider}")
}

/// Short-lived anti-CSRF state cookie, scoped to one provider.
pub fn oauth_state_cookie(
    provider: OAuthProvider,
    state: String,
    secure: bool,
) -> Cookie<'static> {
    Cookie::build((oauth_state_cookie_name(provider), state))
        .http_only(true)
        .same_site(SameSite::Lax)
        .secure(secure)
        .path("/")
        .max_age(Duration::minutes(STATE_COOKIE_TTL_MINUTES))
        .build()
}

pub fn clear_oauth_state_cookie(provider: OAuthProvider) -> Cookie<'static> {
    Cookie::build((oauth_state_cookie_name(provider), ""))
        .path("/")
        .expires(OffsetDateTime::UNIX_EPOCH)
        .build()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_cookie_attributes() {
        let expires_at = OffsetDateTime::now_utc() + Duration::days(30);
        let cookie = session_cookie("tok123".into(), expires_at, true);
        let rendered = cookie.to_string();

        assert!(rendered.starts_with("session=tok123"));
        assert!(rendered.contains("HttpOnly"));
        assert!(rendered.contains("SameSite=Lax"));
        assert!(rendered.contains("Secure"));
        assert!(rendered.contains("Path=/"));
        assert!(rendered.contains("Expires="));
    }

    #[test]
    fn session_cookie_secure_only_in_production() {
        let expires_at = OffsetDateTime::now_utc() + Duration::days(30);
        let rendered = session_cookie("tok".into(), expires_at, false).to_string();
        assert!(!rendered.contains("Secure"));
    }

    #[test]
    fn clearing_expires_in_the_past() {
        let cookie = clear_session_cookie(false);
        assert_eq!(cookie.value(), "");
        let rendered = cookie.to_string();
        assert!(rendered.contains("Expires="));
        assert!(rendered.contains("1970"));
    }

    #[test]
    fn state_cookie_is_provider_scoped_and_short_lived() {
        let cookie = oauth_state_cookie(OAuthProvider::Github, "abc".into(), false);
        assert_eq!(cookie.name(), "oauth_state_github");
        let rendered = cookie.to_string();
        assert!(rendered.contains("Max-Age=600"));
        assert!(rendered.contains("HttpOnly"));
    }
}
