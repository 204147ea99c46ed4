//! `consumption_records` ledger and the transactional debit.

use chrono::{DateTime, Utc};
use sqlx::PgPool;
use tracing::debug;

use super::parse_id;
use crate::directory::StoreError;
use crate::models::billing::{ConsumptionRecord, DebitOutcome, DebitRequest};
use crate::uuid::uuidv7;

/// Debit a user's balance and append a consumption record in one
/// transaction.
///
/// The balance is decremented in place (`balance = balance - $1`), so the
/// row lock taken by the UPDATE serializes concurrent debits for the same
/// user. Any error before commit drops the transaction, rolling back both
/// writes.
pub async fn debit(pool: &PgPool, request: &DebitRequest) -> Result<DebitOutcome, StoreError> {
    let user_id = parse_id(&request.user_id)
        .ok_or_else(|| StoreError::UserNotFound(request.user_id.clone()))?;

    let mut tx = pool.begin().await?;

    let new_balance = sqlx::query_scalar::<_, f64>(
        "UPDATE users SET balance = balance - $1, updated_at = now() \
         WHERE id = $2 RETURNING balance",
    )
    .bind(request.cost)
    .bind(user_id)
    .fetch_optional(&mut *tx)
    .await?
    .ok_or_else(|| StoreError::UserNotFound(request.user_id.clone()))?;

    let record_id = uuidv7();
    sqlx::query(
        r#"
        INSERT INTO consumption_records
            (id, user_id, username, tokens_used, points_used, cost, response_data)
        VALUES ($1, $2, $3, $4, $5, $6, $7)
        "#,
    )
    .bind(record_id)
    .bind(user_id)
    .bind(&request.username)
    .bind(request.tokens_used)
    .bind(request.points_used)
    .bind(request.cost)
    .bind(&request.response_data)
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;

    debug!(user_id = %request.user_id, cost = request.cost, new_balance, "debit committed");
    Ok(DebitOutcome {
        new_balance,
        record_id: record_id.to_string(),
    })
}

type RecordRow = (
    String,
    String,
    String,
    i64,
    f64,
    f64,
    serde_json::Value,
    DateTime<Utc>,
);

/// Most recent consumption records for a user, newest first.
pub async fn records_for_user(
    pool: &PgPool,
    user_id: &str,
    limit: i64,
) -> Result<Vec<ConsumptionRecord>, StoreError> {
    let Some(uuid) = parse_id(user_id) else {
        return Ok(Vec::new());
    };
    let rows = sqlx::query_as::<_, RecordRow>(
        "SELECT id::text, user_id::text, username, tokens_used, points_used, cost, \
                response_data, created_at \
         FROM consumption_records \
         WHERE user_id = $1 \
         ORDER BY created_at DESC, id DESC \
         LIMIT $2",
    )
    .bind(uuid)
    .bind(limit)
    .fetch_all(pool)
    .await?;

    Ok(rows
        .into_iter()
        .map(
            |(id, user_id, username, tokens_used, points_used, cost, response_data, created_at)| {
                ConsumptionRecord {
                    id,
                    user_id,
                    username,
                    tokens_used,
                    points_used,
                    cost,
                    response_data,
                    created_at,
                }
            },
        )
        .collect())
}
