//! Share-auth request handlers.

use axum::Json;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Extension, Query, State};
use axum::http::HeaderMap;
use axum_extra::extract::cookie::CookieJar;

use crate::AppState;
use crate::error::{AppError, AppResult};
use crate::extract::{ClientIp, presented_token, referer_entry_url};
use crate::middleware::auth::AuthenticatedUser;
use crate::models::{
    FinishRequest, FinishResponse, InfoResponse, InitRequest, InitResponse, LogoutResponse,
    RecordsQuery, RecordsResponse, RefreshResponse, StartRequest, StartResponse, TokenRequest,
};
use crate::services::cookies::{clear_share_cookie, share_cookie};
use crate::services::share_auth;

/// Token from the body when given, else from the Bearer header or cookie.
fn body_or_presented(body_token: Option<&str>, headers: &HeaderMap) -> Option<String> {
    body_token
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .or_else(|| presented_token(headers))
}

/// `POST /api/share-auth/init`: credentials or an existing token in, share
/// token out (body and cookie).
pub async fn init_handler(
    State(state): State<AppState>,
    ClientIp(ip): ClientIp,
    headers: HeaderMap,
    jar: CookieJar,
    body: Result<Json<InitRequest>, JsonRejection>,
) -> AppResult<(CookieJar, Json<InitResponse>)> {
    let Json(body) = body?;
    let referer = referer_entry_url(&headers);
    let resp = share_auth::init(&state, &ip, referer.as_deref(), &body).await?;
    let jar = jar.add(share_cookie(
        &resp.auth_token,
        state.tokens.ttl_secs(),
        state.config.secure_cookies,
    ));
    Ok((jar, Json(resp)))
}

/// `POST /api/share-auth/start`: pre-flight check before a chat turn.
pub async fn start_handler(
    State(state): State<AppState>,
    ClientIp(ip): ClientIp,
    headers: HeaderMap,
    body: Result<Json<StartRequest>, JsonRejection>,
) -> AppResult<Json<StartResponse>> {
    let Json(body) = body?;
    let token = body_or_presented(body.token.as_deref(), &headers);
    let resp = share_auth::start(&state, &ip, token.as_deref(), &body).await?;
    Ok(Json(resp))
}

/// `POST /api/share-auth/finish`: bill a completed chat turn.
pub async fn finish_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Result<Json<FinishRequest>, JsonRejection>,
) -> AppResult<Json<FinishResponse>> {
    let Json(body) = body?;
    let token = body_or_presented(body.token.as_deref(), &headers);
    let resp = share_auth::finish(&state, token.as_deref(), body.response_data).await?;
    Ok(Json(resp))
}

/// `POST /api/share-auth/refresh`: rotate a share token.
pub async fn refresh_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    jar: CookieJar,
    body: Result<Json<TokenRequest>, JsonRejection>,
) -> AppResult<(CookieJar, Json<RefreshResponse>)> {
    let Json(body) = body?;
    let token = body_or_presented(body.token.as_deref(), &headers);
    let fresh = share_auth::refresh(&state, token.as_deref()).await?;
    let jar = jar.add(share_cookie(
        &fresh,
        state.tokens.ttl_secs(),
        state.config.secure_cookies,
    ));
    Ok((
        jar,
        Json(RefreshResponse {
            success: true,
            auth_token: fresh,
        }),
    ))
}

/// `POST /api/share-auth/logout`: revoke the token and clear the cookie.
///
/// The cookie is cleared even when the token cannot be revoked.
pub async fn logout_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    jar: CookieJar,
    body: Result<Json<TokenRequest>, JsonRejection>,
) -> (CookieJar, AppResult<Json<LogoutResponse>>) {
    let jar = jar.add(clear_share_cookie(state.config.secure_cookies));
    let result = body.map_err(AppError::from).and_then(|Json(body)| {
        let token = body_or_presented(body.token.as_deref(), &headers);
        share_auth::logout(&state, token.as_deref())
    });
    (jar, result.map(|()| Json(LogoutResponse { success: true })))
}

/// `GET /api/share-auth/info`: the caller's account. Requires auth.
pub async fn info_handler(
    Extension(AuthenticatedUser(identity)): Extension<AuthenticatedUser>,
) -> Json<InfoResponse> {
    Json(InfoResponse {
        success: true,
        data: share_auth::info(&identity),
    })
}

/// `GET /api/share-auth/records`: the caller's recent consumption records.
pub async fn records_handler(
    State(state): State<AppState>,
    Extension(AuthenticatedUser(identity)): Extension<AuthenticatedUser>,
    Query(query): Query<RecordsQuery>,
) -> AppResult<Json<RecordsResponse>> {
    let data = share_auth::records(&state, &identity, query.limit).await?;
    Ok(Json(RecordsResponse {
        success: true,
        data,
    }))
}
