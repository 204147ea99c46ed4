//! User directory and workflow registry.
//!
//! These are the capability surfaces the share-auth protocol consumes. The
//! backing store is abstracted: [`crate::pg::PgStore`] and
//! [`crate::memory::MemoryStore`] both implement them.

use async_trait::async_trait;
use sha2::{Digest, Sha256};
use thiserror::Error;

use crate::models::auth::{User, UserStatus};
use crate::models::workflow::WorkflowHandle;

/// Backing-store errors.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("User not found: {0}")]
    UserNotFound(String),

    #[error("Database error: {0}")]
    Db(#[from] sqlx::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Identity lookups and the two non-billing balance/status mutations.
#[async_trait]
pub trait UserDirectory: Send + Sync {
    /// Resolve a legacy opaque token.
    async fn find_user_by_token(&self, token: &str) -> Result<Option<User>, StoreError>;

    async fn find_user_by_id(&self, id: &str) -> Result<Option<User>, StoreError>;

    /// Credential check against the stored password hash.
    async fn authenticate(&self, username: &str, password: &str)
    -> Result<Option<User>, StoreError>;

    /// Set an absolute balance (admin recharge path).
    async fn update_balance(&self, id: &str, new_balance: f64) -> Result<(), StoreError>;

    async fn set_status(&self, id: &str, status: UserStatus) -> Result<(), StoreError>;
}

/// Workflow lookups.
#[async_trait]
pub trait WorkflowRegistry: Send + Sync {
    async fn find_workflow_by_name(&self, name: &str)
    -> Result<Option<WorkflowHandle>, StoreError>;

    /// Reverse lookup by the workflow's token-less public entry URL.
    async fn find_workflow_by_entry_url(
        &self,
        url: &str,
    ) -> Result<Option<WorkflowHandle>, StoreError>;
}

/// SHA-256 hash of a legacy opaque token, as stored by the directory.
pub fn legacy_token_hash(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn legacy_token_hash_is_hex_sha256() {
        let h = legacy_token_hash("abc");
        assert_eq!(
            h,
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }
}
