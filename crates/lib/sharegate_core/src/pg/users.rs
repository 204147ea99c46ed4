//! `users` table queries.

use sqlx::PgPool;

use super::parse_id;
use crate::auth::password::verify_password;
use crate::directory::{StoreError, legacy_token_hash};
use crate::models::auth::{User, UserStatus};

/// (id, username, balance, status, is_admin)
type UserRow = (String, String, f64, String, bool);

fn into_user((id, username, balance, status, is_admin): UserRow) -> User {
    User {
        id,
        username,
        balance,
        status: UserStatus::from_db(&status),
        is_admin,
    }
}

/// Fetch a user by ID.
pub async fn find_user_by_id(pool: &PgPool, id: &str) -> Result<Option<User>, StoreError> {
    let Some(uuid) = parse_id(id) else {
        return Ok(None);
    };
    let row = sqlx::query_as::<_, UserRow>(
        "SELECT id::text, username, balance, status, is_admin FROM users WHERE id = $1",
    )
    .bind(uuid)
    .fetch_optional(pool)
    .await?;
    Ok(row.map(into_user))
}

/// Fetch a user by the SHA-256 hash of a legacy opaque token.
pub async fn find_user_by_legacy_token(
    pool: &PgPool,
    token: &str,
) -> Result<Option<User>, StoreError> {
    let row = sqlx::query_as::<_, UserRow>(
        "SELECT id::text, username, balance, status, is_admin \
         FROM users WHERE legacy_token_hash = $1",
    )
    .bind(legacy_token_hash(token))
    .fetch_optional(pool)
    .await?;
    Ok(row.map(into_user))
}

/// Look up a user by username and verify the password against the stored
/// bcrypt hash.
pub async fn authenticate(
    pool: &PgPool,
    username: &str,
    password: &str,
) -> Result<Option<User>, StoreError> {
    let row = sqlx::query_as::<_, (String, String, f64, String, bool, String)>(
        "SELECT id::text, username, balance, status, is_admin, password_hash \
         FROM users WHERE username = $1",
    )
    .bind(username)
    .fetch_optional(pool)
    .await?;

    let Some((id, username, balance, status, is_admin, password_hash)) = row else {
        return Ok(None);
    };
    if !verify_password(password, &password_hash) {
        return Ok(None);
    }
    Ok(Some(into_user((id, username, balance, status, is_admin))))
}

/// Create a user with an already-hashed password. Returns the new ID.
pub async fn create_user(
    pool: &PgPool,
    username: &str,
    password_hash: &str,
    balance: f64,
) -> Result<String, StoreError> {
    let id = sqlx::query_scalar::<_, String>(
        "INSERT INTO users (username, password_hash, balance) \
         VALUES ($1, $2, $3) RETURNING id::text",
    )
    .bind(username)
    .bind(password_hash)
    .bind(balance)
    .fetch_one(pool)
    .await?;
    Ok(id)
}

/// Set an absolute balance.
pub async fn update_balance(pool: &PgPool, id: &str, new_balance: f64) -> Result<(), StoreError> {
    let uuid = parse_id(id).ok_or_else(|| StoreError::UserNotFound(id.to_string()))?;
    let result = sqlx::query("UPDATE users SET balance = $2, updated_at = now() WHERE id = $1")
        .bind(uuid)
        .bind(new_balance)
        .execute(pool)
        .await?;
    if result.rows_affected() == 0 {
        return Err(StoreError::UserNotFound(id.to_string()));
    }
    Ok(())
}

/// Activate or deactivate a user.
pub async fn set_status(pool: &PgPool, id: &str, status: UserStatus) -> Result<(), StoreError> {
    let uuid = parse_id(id).ok_or_else(|| StoreError::UserNotFound(id.to_string()))?;
    let result = sqlx::query("UPDATE users SET status = $2, updated_at = now() WHERE id = $1")
        .bind(uuid)
        .bind(status.as_str())
        .execute(pool)
        .await?;
    if result.rows_affected() == 0 {
        return Err(StoreError::UserNotFound(id.to_string()));
    }
    Ok(())
}
