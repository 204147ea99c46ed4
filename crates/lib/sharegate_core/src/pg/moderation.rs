//! `sensitive_words` dictionary lookup.

use sqlx::PgPool;

use crate::directory::StoreError;

/// Whether `text` contains any dictionary word (case-insensitive substring).
pub async fn contains_sensitive_word(pool: &PgPool, text: &str) -> Result<bool, StoreError> {
    if text.is_empty() {
        return Ok(false);
    }
    let hit = sqlx::query_scalar::<_, bool>(
        "SELECT EXISTS(\
           SELECT 1 FROM sensitive_words \
           WHERE word <> '' AND position(lower(word) in lower($1)) > 0\
         )",
    )
    .bind(text)
    .fetch_one(pool)
    .await?;
    Ok(hit)
}
