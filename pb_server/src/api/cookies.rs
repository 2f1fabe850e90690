//! Session cookies: `sessionId` and `refreshToken`.

use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use phonebook::auth::{Session, SessionId};
use time::Duration;

/// Cookie name for the session id.
pub const SESSION_COOKIE: &str = "sessionId";
/// Cookie name for the refresh token.
pub const REFRESH_COOKIE: &str = "refreshToken";

/// Cookie lifetime, matching the refresh token.
pub const COOKIE_MAX_AGE: Duration = Duration::days(30);

fn build(name: &'static str, value: String, max_age: Duration, secure: bool) -> Cookie<'static> {
    Cookie::build((name, value))
        .http_only(true)
        .secure(secure)
        .same_site(SameSite::Lax)
        .path("/")
        .max_age(max_age)
        .build()
}

/// Add both session cookies for a freshly issued session.
pub fn with_session(jar: CookieJar, session: &Session, secure: bool) -> CookieJar {
    jar.add(build(
        SESSION_COOKIE,
        session.id.to_string(),
        COOKIE_MAX_AGE,
        secure,
    ))
    .add(build(
        REFRESH_COOKIE,
        session.refresh_token.clone(),
        COOKIE_MAX_AGE,
        secure,
    ))
}

/// Expire both session cookies.
pub fn cleared(jar: CookieJar, secure: bool) -> CookieJar {
    jar.add(build(SESSION_COOKIE, String::new(), Duration::ZERO, secure))
        .add(build(REFRESH_COOKIE, String::new(), Duration::ZERO, secure))
}

/// Session id from the cookie, if present and well-formed.
pub fn session_id(jar: &CookieJar) -> Option<SessionId> {
    jar.get(SESSION_COOKIE)
        .and_then(|c| c.value().parse().ok())
}

/// Refresh token from the cookie, if present.
pub fn refresh_token(jar: &CookieJar) -> Option<String> {
    jar.get(REFRESH_COOKIE)
        .map(|c| c.value().to_string())
        .filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use uuid::Uuid;

    fn session() -> Session {
        Session {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            access_token: "access".to_string(),
            refresh_token: "refresh".to_string(),
            access_token_valid_until: Utc::now(),
            refresh_token_valid_until: Utc::now(),
        }
    }

    #[test]
    fn test_session_cookies_roundtrip() {
        let session = session();
        let jar = with_session(CookieJar::new(), &session, true);

        assert_eq!(session_id(&jar), Some(session.id));
        assert_eq!(refresh_token(&jar).as_deref(), Some("refresh"));

        let cookie = jar.get(SESSION_COOKIE).unwrap();
        assert_eq!(cookie.max_age(), Some(COOKIE_MAX_AGE));
        assert_eq!(cookie.secure(), Some(true));
        assert_eq!(cookie.http_only(), Some(true));
    }

    #[test]
    fn test_cleared_cookies_expire() {
        let jar = cleared(with_session(CookieJar::new(), &session(), false), false);

        assert_eq!(session_id(&jar), None);
        assert_eq!(refresh_token(&jar), None);
        assert_eq!(
            jar.get(REFRESH_COOKIE).unwrap().max_age(),
            Some(Duration::ZERO)
        );
    }

    #[test]
    fn test_malformed_session_id_is_ignored() {
        let jar = CookieJar::new().add(Cookie::new(SESSION_COOKIE, "not-a-uuid"));
        assert_eq!(session_id(&jar), None);
    }
}
