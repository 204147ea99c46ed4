//! `workflows` table queries.

use sqlx::PgPool;

use crate::directory::StoreError;
use crate::models::workflow::WorkflowHandle;

type WorkflowRow = (String, String, Option<String>, f64);

fn into_handle((id, name, no_login_entry_url, point_multiplier): WorkflowRow) -> WorkflowHandle {
    WorkflowHandle {
        id,
        name,
        no_login_entry_url,
        point_multiplier,
    }
}

/// Fetch a workflow by its unique name.
pub async fn find_by_name(pool: &PgPool, name: &str) -> Result<Option<WorkflowHandle>, StoreError> {
    let row = sqlx::query_as::<_, WorkflowRow>(
        "SELECT id::text, name, no_login_entry_url, point_multiplier \
         FROM workflows WHERE name = $1",
    )
    .bind(name)
    .fetch_optional(pool)
    .await?;
    Ok(row.map(into_handle))
}

/// Fetch a workflow by its token-less entry URL (exact match).
pub async fn find_by_entry_url(
    pool: &PgPool,
    url: &str,
) -> Result<Option<WorkflowHandle>, StoreError> {
    let row = sqlx::query_as::<_, WorkflowRow>(
        "SELECT id::text, name, no_login_entry_url, point_multiplier \
         FROM workflows WHERE no_login_entry_url = $1 \
         ORDER BY created_at LIMIT 1",
    )
    .bind(url)
    .fetch_optional(pool)
    .await?;
    Ok(row.map(into_handle))
}
