//! Share-cookie housekeeping for every response.

use axum::{
    extract::{Request, State},
    http::{HeaderValue, StatusCode, header},
    middleware::Next,
    response::Response,
};

use crate::AppState;
use crate::services::cookies::clear_share_cookie;

/// Axum middleware: any 401 also expires the share cookie, with the same
/// `Secure` flag the cookie was set with.
pub async fn clear_cookie_on_unauthorized(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Response {
    let mut response = next.run(request).await;
    if response.status() == StatusCode::UNAUTHORIZED
        && let Ok(value) =
            HeaderValue::from_str(&clear_share_cookie(state.config.secure_cookies).to_string())
    {
        response.headers_mut().append(header::SET_COOKIE, value);
    }
    response
}
