//! Authentication middleware: Bearer-or-cookie share token, active user.

use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};

use crate::AppState;
use crate::error::AppError;
use crate::extract::presented_token;
use crate::services::share_auth::{ShareIdentity, authenticate_token};

/// Key used to store the resolved [`ShareIdentity`] in request extensions.
#[derive(Debug, Clone)]
pub struct AuthenticatedUser(pub ShareIdentity);

/// Axum middleware: takes the token from `Authorization: Bearer <token>` or
/// the share cookie, resolves it to an active user and injects
/// `AuthenticatedUser` into request extensions.
pub async fn require_auth(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let token = presented_token(request.headers())
        .ok_or_else(|| AppError::Unauthorized("Missing token".into()))?;

    let identity = authenticate_token(&state, &token, None).await?;
    request.extensions_mut().insert(AuthenticatedUser(identity));

    Ok(next.run(request).await)
}
