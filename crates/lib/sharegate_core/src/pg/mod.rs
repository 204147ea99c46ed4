//! PostgreSQL implementation of the collaborator traits.
//!
//! Queries are free functions over `&PgPool`, grouped by table; [`PgStore`]
//! wires them to the trait surfaces.

pub mod ledger;
pub mod moderation;
pub mod users;
pub mod workflows;

use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use crate::billing::BillingLedger;
use crate::directory::{StoreError, UserDirectory, WorkflowRegistry};
use crate::models::auth::{User, UserStatus};
use crate::models::billing::{ConsumptionRecord, DebitOutcome, DebitRequest};
use crate::models::workflow::WorkflowHandle;
use crate::moderation::ModerationGate;

/// Parse a textual id. Ids that are not UUIDs cannot exist in the store.
pub(crate) fn parse_id(id: &str) -> Option<Uuid> {
    Uuid::parse_str(id).ok()
}

/// PostgreSQL-backed store.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl UserDirectory for PgStore {
    async fn find_user_by_token(&self, token: &str) -> Result<Option<User>, StoreError> {
        users::find_user_by_legacy_token(&self.pool, token).await
    }

    async fn find_user_by_id(&self, id: &str) -> Result<Option<User>, StoreError> {
        users::find_user_by_id(&self.pool, id).await
    }

    async fn authenticate(
        &self,
        username: &str,
        password: &str,
    ) -> Result<Option<User>, StoreError> {
        users::authenticate(&self.pool, username, password).await
    }

    async fn update_balance(&self, id: &str, new_balance: f64) -> Result<(), StoreError> {
        users::update_balance(&self.pool, id, new_balance).await
    }

    async fn set_status(&self, id: &str, status: UserStatus) -> Result<(), StoreError> {
        users::set_status(&self.pool, id, status).await
    }
}

#[async_trait]
impl WorkflowRegistry for PgStore {
    async fn find_workflow_by_name(
        &self,
        name: &str,
    ) -> Result<Option<WorkflowHandle>, StoreError> {
        workflows::find_by_name(&self.pool, name).await
    }

    async fn find_workflow_by_entry_url(
        &self,
        url: &str,
    ) -> Result<Option<WorkflowHandle>, StoreError> {
        workflows::find_by_entry_url(&self.pool, url).await
    }
}

#[async_trait]
impl BillingLedger for PgStore {
    async fn debit(&self, request: DebitRequest) -> Result<DebitOutcome, StoreError> {
        ledger::debit(&self.pool, &request).await
    }

    async fn records_for_user(
        &self,
        user_id: &str,
        limit: i64,
    ) -> Result<Vec<ConsumptionRecord>, StoreError> {
        ledger::records_for_user(&self.pool, user_id, limit).await
    }
}

#[async_trait]
impl ModerationGate for PgStore {
    async fn contains_sensitive_word(&self, text: &str) -> Result<bool, StoreError> {
        moderation::contains_sensitive_word(&self.pool, text).await
    }
}
