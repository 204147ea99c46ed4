//! Share-token authentication.
//!
//! Provides the token service (issue, validate, revoke, refresh), password
//! hashing, and signing-secret resolution shared by `sharegate_api` and the
//! server binary.

pub mod password;
pub mod secret;
pub mod tokens;

use thiserror::Error;

/// Reasons a share token is rejected.
///
/// The variants are for logs and tests only. Callers at the HTTP boundary
/// collapse all of them into one generic authentication failure.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TokenError {
    #[error("token is not a three-segment JWT")]
    MalformedToken,

    #[error("signature, issuer or audience mismatch")]
    InvalidSignature,

    #[error("token expired")]
    Expired,

    #[error("token revoked")]
    Revoked,

    #[error("token scope does not match the requested share")]
    ScopeMismatch,

    #[error("authentication failed: {0}")]
    AuthFailed(String),

    #[error("token signing failed: {0}")]
    Signing(String),
}
