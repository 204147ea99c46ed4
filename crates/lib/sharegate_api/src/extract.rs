//! Request-derived values: caller IP, presented token, referer entry URL.

use std::convert::Infallible;
use std::net::SocketAddr;

use axum::extract::{ConnectInfo, FromRequestParts};
use axum::http::header::{AUTHORIZATION, REFERER};
use axum::http::{HeaderMap, request::Parts};
use axum_extra::extract::cookie::CookieJar;
use url::Url;

use crate::AppState;
use crate::services::cookies::SHARE_COOKIE;

/// Caller identity used for rate limiting and dedup keys.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientIp(pub String);

impl FromRequestParts<AppState> for ClientIp {
    type Rejection = Infallible;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let socket = parts
            .extensions
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| *addr);
        Ok(ClientIp(client_ip(
            &parts.headers,
            socket,
            state.config.trust_proxy_headers,
        )))
    }
}

/// Resolve the caller IP. Proxy headers are only honoured when the server
/// sits behind a trusted reverse proxy.
pub fn client_ip(headers: &HeaderMap, socket: Option<SocketAddr>, trust_proxy: bool) -> String {
    if trust_proxy {
        let forwarded = headers
            .get("x-forwarded-for")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.split(',').next())
            .map(str::trim)
            .filter(|v| !v.is_empty());
        if let Some(ip) = forwarded {
            return ip.to_string();
        }
        if let Some(ip) = headers
            .get("x-real-ip")
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
        {
            return ip.to_string();
        }
    }
    socket
        .map(|addr| addr.ip().to_string())
        .unwrap_or_else(|| "unknown".to_string())
}

/// Token from `Authorization: Bearer <token>`, else from the share cookie.
pub fn presented_token(headers: &HeaderMap) -> Option<String> {
    let bearer = headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty());
    if let Some(token) = bearer {
        return Some(token.to_string());
    }
    CookieJar::from_headers(headers)
        .get(SHARE_COOKIE)
        .map(|c| c.value().to_string())
        .filter(|t| !t.is_empty())
}

/// The request `Referer` reduced to a workflow entry URL: the `token` query
/// parameter and any fragment are removed.
pub fn referer_entry_url(headers: &HeaderMap) -> Option<String> {
    let raw = headers.get(REFERER)?.to_str().ok()?;
    strip_token_param(raw)
}

pub fn strip_token_param(raw: &str) -> Option<String> {
    let mut url = Url::parse(raw).ok()?;
    let kept: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(k, _)| k != "token")
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();
    if kept.is_empty() {
        url.set_query(None);
    } else {
        url.query_pairs_mut().clear().extend_pairs(kept);
    }
    url.set_fragment(None);
    Some(url.to_string())
}

#[cfg(test)]
mod tests {
    use axum::http::HeaderValue;

    use super::*;

    #[test]
    fn forwarded_for_wins_only_when_trusted() {
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", HeaderValue::from_static("203.0.113.7, 10.0.0.1"));
        let socket: SocketAddr = "192.0.2.1:5555".parse().unwrap();

        assert_eq!(client_ip(&headers, Some(socket), true), "203.0.113.7");
        assert_eq!(client_ip(&headers, Some(socket), false), "192.0.2.1");
        assert_eq!(client_ip(&HeaderMap::new(), None, true), "unknown");
    }

    #[test]
    fn bearer_header_then_cookie() {
        let mut headers = HeaderMap::new();
        headers.insert("cookie", HeaderValue::from_static("share_token=from-cookie"));
        assert_eq!(presented_token(&headers).as_deref(), Some("from-cookie"));

        headers.insert(AUTHORIZATION, HeaderValue::from_static("Bearer from-header"));
        assert_eq!(presented_token(&headers).as_deref(), Some("from-header"));
    }

    #[test]
    fn token_param_is_stripped_from_referer() {
        assert_eq!(
            strip_token_param("https://chat.example.com/share/abc?token=xyz").as_deref(),
            Some("https://chat.example.com/share/abc")
        );
        assert_eq!(
            strip_token_param("https://chat.example.com/share/abc?lang=en&token=xyz#top")
                .as_deref(),
            Some("https://chat.example.com/share/abc?lang=en")
        );
        assert_eq!(strip_token_param("not a url"), None);
    }
}
