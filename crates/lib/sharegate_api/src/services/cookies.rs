//! Cookie service: set/clear the httpOnly share-token cookie.
//!
//! The cookie carries the same bearer token as the `Authorization` header and
//! is accepted interchangeably by the protected endpoints.

use axum_extra::extract::cookie::{Cookie, SameSite};
use time::Duration;

/// Cookie name for the share token.
pub const SHARE_COOKIE: &str = "share_token";

/// Build a httpOnly cookie for the share token.
pub fn share_cookie(token: &str, max_age_secs: i64, secure: bool) -> Cookie<'static> {
    Cookie::build((SHARE_COOKIE.to_string(), token.to_string()))
        .http_only(true)
        .secure(secure)
        .same_site(SameSite::Lax)
        .path("/".to_string())
        .max_age(Duration::seconds(max_age_secs))
        .build()
}

/// Build an expired cookie to clear the share token.
pub fn clear_share_cookie(secure: bool) -> Cookie<'static> {
    Cookie::build((SHARE_COOKIE.to_string(), String::new()))
        .http_only(true)
        .secure(secure)
        .same_site(SameSite::Lax)
        .path("/".to_string())
        .max_age(Duration::ZERO)
        .build()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn share_cookie_is_http_only() {
        let c = share_cookie("tok", 60, true);
        assert_eq!(c.name(), SHARE_COOKIE);
        assert_eq!(c.value(), "tok");
        assert_eq!(c.http_only(), Some(true));
        assert_eq!(c.secure(), Some(true));
        assert_eq!(c.max_age(), Some(Duration::seconds(60)));
    }

    #[test]
    fn clear_cookie_expires_immediately() {
        let c = clear_share_cookie(false);
        assert_eq!(c.value(), "");
        assert_eq!(c.max_age(), Some(Duration::ZERO));
        assert!(c.to_string().contains("Max-Age=0"));
    }
}
