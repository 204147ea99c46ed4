//! Identity domain models.

use serde::{Deserialize, Serialize};

/// Account status. Inactive users are rejected at every protected entry point.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UserStatus {
    Active,
    Inactive,
}

impl UserStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            UserStatus::Active => "active",
            UserStatus::Inactive => "inactive",
        }
    }

    /// Parse the stored column value. Anything unknown is treated as inactive.
    pub fn from_db(value: &str) -> Self {
        match value {
            "active" => UserStatus::Active,
            _ => UserStatus::Inactive,
        }
    }
}

/// Domain user.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub username: String,
    /// Current balance. May be negative after a `finish` debit.
    pub balance: f64,
    pub status: UserStatus,
    pub is_admin: bool,
}

impl User {
    pub fn is_active(&self) -> bool {
        self.status == UserStatus::Active
    }
}

/// JWT claims embedded in share tokens.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenClaims {
    /// Subject: user ID (standard JWT `sub` claim).
    pub sub: String,
    /// Username captured at issuance time.
    pub name: String,
    /// Optional share scope binding the token to one workflow's share context.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
    /// Capability strings (e.g. `["read", "chat"]`).
    #[serde(default)]
    pub perms: Vec<String>,
    /// Issued at (unix timestamp).
    pub iat: i64,
    /// Expiry (unix timestamp).
    pub exp: i64,
    /// Unique token id, used for revocation.
    pub jti: String,
    pub iss: String,
    pub aud: String,
}
