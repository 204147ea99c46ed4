//! Application error types.
//!
//! Every failure leaves the API as `{success: false, message, code}` with an
//! operation-appropriate status. 401s set `clearToken` so clients drop any
//! stored token; the router's cookie layer expires the share cookie.

use axum::{
    Json,
    extract::rejection::JsonRejection,
    http::{HeaderMap, HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use sharegate_core::auth::TokenError;
use sharegate_core::directory::StoreError;
use thiserror::Error;

use crate::models::ErrorResponse;

/// Convenience alias for handler return types.
pub type AppResult<T> = Result<T, AppError>;

/// Message used for every authentication failure, whatever the cause.
pub const AUTH_FAILED: &str = "Authentication failed";

/// Application-level errors with HTTP status mapping.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Account disabled")]
    UserDisabled,

    #[error("Insufficient balance: {balance}")]
    InsufficientBalance { balance: f64 },

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Input contains sensitive content")]
    SensitiveContent,

    #[error("Rate limited, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("Internal server error")]
    Internal(String),
}

impl AppError {
    /// Generic authentication failure.
    pub fn auth_failed() -> Self {
        AppError::Unauthorized(AUTH_FAILED.into())
    }

    fn status_and_code(&self) -> (StatusCode, &'static str) {
        match self {
            AppError::Validation(_) => (StatusCode::BAD_REQUEST, "validation_error"),
            AppError::Unauthorized(_) => (StatusCode::UNAUTHORIZED, "unauthorized"),
            AppError::UserDisabled => (StatusCode::UNAUTHORIZED, "user_disabled"),
            AppError::InsufficientBalance { .. } => {
                (StatusCode::PAYMENT_REQUIRED, "insufficient_balance")
            }
            AppError::Forbidden(_) => (StatusCode::FORBIDDEN, "forbidden"),
            AppError::SensitiveContent => (StatusCode::UNPROCESSABLE_ENTITY, "sensitive_content"),
            AppError::RateLimited { .. } => (StatusCode::TOO_MANY_REQUESTS, "rate_limited"),
            AppError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "internal_error"),
        }
    }

    fn public_message(&self) -> String {
        match self {
            AppError::Validation(m) | AppError::Unauthorized(m) | AppError::Forbidden(m) => {
                m.clone()
            }
            AppError::UserDisabled => "Account is disabled".into(),
            AppError::InsufficientBalance { .. } => "Insufficient balance".into(),
            AppError::SensitiveContent => "Input contains sensitive content".into(),
            AppError::RateLimited { .. } => "Too many requests, please retry later".into(),
            AppError::Internal(_) => "Internal server error".into(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code) = self.status_and_code();
        let clear_token = status == StatusCode::UNAUTHORIZED;

        let mut headers = HeaderMap::new();
        if let AppError::RateLimited { retry_after_secs } = &self {
            headers.insert(header::RETRY_AFTER, HeaderValue::from(*retry_after_secs));
        }

        let body = Json(ErrorResponse {
            success: false,
            message: self.public_message(),
            code: code.to_string(),
            clear_token: clear_token.then_some(true),
        });
        (status, headers, body).into_response()
    }
}

impl From<StoreError> for AppError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::UserNotFound(_) => AppError::auth_failed(),
            StoreError::Db(e) => AppError::Internal(e.to_string()),
            StoreError::Internal(msg) => AppError::Internal(msg),
        }
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        AppError::Validation(rejection.body_text())
    }
}

impl From<TokenError> for AppError {
    fn from(e: TokenError) -> Self {
        match e {
            TokenError::Signing(msg) => AppError::Internal(msg),
            _ => AppError::auth_failed(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_errors_collapse_to_one_message() {
        for e in [
            TokenError::MalformedToken,
            TokenError::Expired,
            TokenError::Revoked,
            TokenError::InvalidSignature,
            TokenError::ScopeMismatch,
        ] {
            let app: AppError = e.into();
            assert_eq!(app.public_message(), AUTH_FAILED);
            assert_eq!(app.status_and_code().0, StatusCode::UNAUTHORIZED);
        }
    }

    #[test]
    fn internal_details_are_not_exposed() {
        let app = AppError::Internal("connection refused at 10.0.0.5".into());
        assert_eq!(app.public_message(), "Internal server error");
    }

    #[test]
    fn rate_limit_sets_retry_after() {
        let resp = AppError::UserDisabled.into_response();
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
        assert!(resp.headers().get(header::RETRY_AFTER).is_none());

        let resp = AppError::RateLimited {
            retry_after_secs: 7,
        }
        .into_response();
        assert_eq!(resp.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(resp.headers().get(header::RETRY_AFTER).unwrap(), "7");
        assert!(resp.headers().get(header::SET_COOKIE).is_none());
    }
}
