//! In-process store implementing the directory, registry and ledger traits.
//!
//! Used for local runs (`--storage memory`) and tests. Users live in a
//! `DashMap`; a debit holds the user's entry guard while it appends the
//! record and writes the new balance, so concurrent debits for one user are
//! serialized and debits for different users only contend on shard locks.

use std::sync::Mutex;

use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use uuid::Uuid;

use crate::auth::password::{hash_password, verify_password};
use crate::billing::BillingLedger;
use crate::directory::{StoreError, UserDirectory, WorkflowRegistry, legacy_token_hash};
use crate::models::auth::{User, UserStatus};
use crate::models::billing::{ConsumptionRecord, DebitOutcome, DebitRequest};
use crate::models::workflow::WorkflowHandle;
use crate::uuid::uuidv7;

#[derive(Debug, Clone)]
struct StoredUser {
    user: User,
    password_hash: String,
    legacy_token_hash: Option<String>,
}

/// Concurrency-safe in-memory store.
#[derive(Debug, Default)]
pub struct MemoryStore {
    users: DashMap<String, StoredUser>,
    workflows: DashMap<String, WorkflowHandle>,
    records: Mutex<Vec<ConsumptionRecord>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an active, non-admin user. Returns the new ID.
    pub fn add_user(
        &self,
        username: &str,
        password: &str,
        balance: f64,
    ) -> Result<String, StoreError> {
        if self.users.iter().any(|u| u.user.username == username) {
            return Err(StoreError::Internal(format!(
                "username '{username}' already exists"
            )));
        }
        let id = Uuid::new_v4().to_string();
        let stored = StoredUser {
            user: User {
                id: id.clone(),
                username: username.to_string(),
                balance,
                status: UserStatus::Active,
                is_admin: false,
            },
            password_hash: hash_password(password)?,
            legacy_token_hash: None,
        };
        self.users.insert(id.clone(), stored);
        Ok(id)
    }

    /// Attach a legacy opaque token to a user.
    pub fn set_legacy_token(&self, id: &str, token: &str) -> Result<(), StoreError> {
        let mut entry = self
            .users
            .get_mut(id)
            .ok_or_else(|| StoreError::UserNotFound(id.to_string()))?;
        entry.legacy_token_hash = Some(legacy_token_hash(token));
        Ok(())
    }

    /// Register a workflow. Returns the new ID.
    pub fn add_workflow(&self, name: &str, entry_url: Option<&str>, point_multiplier: f64) -> String {
        let id = Uuid::new_v4().to_string();
        self.workflows.insert(
            id.clone(),
            WorkflowHandle {
                id: id.clone(),
                name: name.to_string(),
                no_login_entry_url: entry_url.map(str::to_string),
                point_multiplier,
            },
        );
        id
    }

    /// Snapshot of every consumption record, oldest first.
    pub fn records(&self) -> Vec<ConsumptionRecord> {
        self.records
            .lock()
            .map(|records| records.clone())
            .unwrap_or_default()
    }

    pub fn record_count(&self) -> usize {
        self.records.lock().map(|r| r.len()).unwrap_or(0)
    }

    fn snapshot(&self, id: &str) -> Option<User> {
        self.users.get(id).map(|u| u.user.clone())
    }
}

#[async_trait]
impl UserDirectory for MemoryStore {
    async fn find_user_by_token(&self, token: &str) -> Result<Option<User>, StoreError> {
        let hash = legacy_token_hash(token);
        Ok(self
            .users
            .iter()
            .find(|u| u.legacy_token_hash.as_deref() == Some(hash.as_str()))
            .map(|u| u.user.clone()))
    }

    async fn find_user_by_id(&self, id: &str) -> Result<Option<User>, StoreError> {
        Ok(self.snapshot(id))
    }

    async fn authenticate(
        &self,
        username: &str,
        password: &str,
    ) -> Result<Option<User>, StoreError> {
        let candidate = self
            .users
            .iter()
            .find(|u| u.user.username == username)
            .map(|u| (u.user.clone(), u.password_hash.clone()));
        Ok(candidate.and_then(|(user, hash)| verify_password(password, &hash).then_some(user)))
    }

    async fn update_balance(&self, id: &str, new_balance: f64) -> Result<(), StoreError> {
        let mut entry = self
            .users
            .get_mut(id)
            .ok_or_else(|| StoreError::UserNotFound(id.to_string()))?;
        entry.user.balance = new_balance;
        Ok(())
    }

    async fn set_status(&self, id: &str, status: UserStatus) -> Result<(), StoreError> {
        let mut entry = self
            .users
            .get_mut(id)
            .ok_or_else(|| StoreError::UserNotFound(id.to_string()))?;
        entry.user.status = status;
        Ok(())
    }
}

#[async_trait]
impl WorkflowRegistry for MemoryStore {
    async fn find_workflow_by_name(
        &self,
        name: &str,
    ) -> Result<Option<WorkflowHandle>, StoreError> {
        Ok(self
            .workflows
            .iter()
            .find(|w| w.name == name)
            .map(|w| w.value().clone()))
    }

    async fn find_workflow_by_entry_url(
        &self,
        url: &str,
    ) -> Result<Option<WorkflowHandle>, StoreError> {
        Ok(self
            .workflows
            .iter()
            .find(|w| w.no_login_entry_url.as_deref() == Some(url))
            .map(|w| w.value().clone()))
    }
}

#[async_trait]
impl BillingLedger for MemoryStore {
    async fn debit(&self, request: DebitRequest) -> Result<DebitOutcome, StoreError> {
        let mut entry = self
            .users
            .get_mut(&request.user_id)
            .ok_or_else(|| StoreError::UserNotFound(request.user_id.clone()))?;

        let new_balance = entry.user.balance - request.cost;
        let record = ConsumptionRecord {
            id: uuidv7().to_string(),
            user_id: request.user_id,
            username: request.username,
            tokens_used: request.tokens_used,
            points_used: request.points_used,
            cost: request.cost,
            response_data: request.response_data,
            created_at: Utc::now(),
        };
        let record_id = record.id.clone();

        // Record first: if the append fails the balance is never touched.
        self.records
            .lock()
            .map_err(|_| StoreError::Internal("ledger lock poisoned".into()))?
            .push(record);
        entry.user.balance = new_balance;

        Ok(DebitOutcome {
            new_balance,
            record_id,
        })
    }

    async fn records_for_user(
        &self,
        user_id: &str,
        limit: i64,
    ) -> Result<Vec<ConsumptionRecord>, StoreError> {
        let records = self
            .records
            .lock()
            .map_err(|_| StoreError::Internal("ledger lock poisoned".into()))?;
        let limit = usize::try_from(limit).unwrap_or(0);
        Ok(records
            .iter()
            .rev()
            .filter(|r| r.user_id == user_id)
            .take(limit)
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use serde_json::json;

    use super::*;

    fn debit_of(user_id: &str, cost: f64) -> DebitRequest {
        DebitRequest {
            user_id: user_id.to_string(),
            username: "alice".to_string(),
            tokens_used: 100,
            points_used: cost,
            cost,
            response_data: json!({"totalPoints": cost}),
        }
    }

    #[tokio::test]
    async fn authenticate_compares_hashes() {
        let store = MemoryStore::new();
        let id = store.add_user("alice", "correct horse", 10.0).unwrap();

        let user = store.authenticate("alice", "correct horse").await.unwrap();
        assert_eq!(user.map(|u| u.id), Some(id));
        assert!(store.authenticate("alice", "wrong").await.unwrap().is_none());
        assert!(store.authenticate("bob", "correct horse").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn duplicate_usernames_are_rejected() {
        let store = MemoryStore::new();
        store.add_user("alice", "pw", 0.0).unwrap();
        assert!(store.add_user("alice", "pw2", 0.0).is_err());
    }

    #[tokio::test]
    async fn legacy_tokens_resolve_by_hash() {
        let store = MemoryStore::new();
        let id = store.add_user("alice", "pw", 1.0).unwrap();
        store.set_legacy_token(&id, "legacy-abc").unwrap();

        let found = store.find_user_by_token("legacy-abc").await.unwrap();
        assert_eq!(found.map(|u| u.id), Some(id));
        assert!(store.find_user_by_token("legacy-xyz").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn debit_may_drive_balance_negative() {
        let store = MemoryStore::new();
        let id = store.add_user("alice", "pw", 0.5).unwrap();
        let outcome = store.debit(debit_of(&id, 2.0)).await.unwrap();
        assert_eq!(outcome.new_balance, -1.5);
        assert_eq!(store.record_count(), 1);
    }

    #[tokio::test]
    async fn debit_for_unknown_user_writes_nothing() {
        let store = MemoryStore::new();
        let err = store.debit(debit_of("nope", 1.0)).await.unwrap_err();
        assert!(matches!(err, StoreError::UserNotFound(_)));
        assert_eq!(store.record_count(), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_debits_lose_no_updates() {
        let store = Arc::new(MemoryStore::new());
        let id = store.add_user("alice", "pw", 100.0).unwrap();

        let handles: Vec<_> = (0..64)
            .map(|_| {
                let store = Arc::clone(&store);
                let id = id.clone();
                tokio::spawn(async move { store.debit(debit_of(&id, 0.25)).await })
            })
            .collect();
        for h in handles {
            h.await.unwrap().unwrap();
        }

        let user = store.find_user_by_id(&id).await.unwrap().unwrap();
        assert_eq!(user.balance, 100.0 - 64.0 * 0.25);
        assert_eq!(store.record_count(), 64);
    }

    #[tokio::test]
    async fn records_are_listed_newest_first_per_user() {
        let store = MemoryStore::new();
        let alice = store.add_user("alice", "pw", 10.0).unwrap();
        let bob = store.add_user("bob", "pw", 10.0).unwrap();
        store.debit(debit_of(&alice, 1.0)).await.unwrap();
        store.debit(debit_of(&bob, 5.0)).await.unwrap();
        store.debit(debit_of(&alice, 2.0)).await.unwrap();

        let records = store.records_for_user(&alice, 10).await.unwrap();
        let costs: Vec<f64> = records.iter().map(|r| r.cost).collect();
        assert_eq!(costs, vec![2.0, 1.0]);
        assert_eq!(store.records_for_user(&alice, 1).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn workflows_resolve_by_name_and_entry_url() {
        let store = MemoryStore::new();
        let id = store.add_workflow("writer", Some("https://chat.example.com/share/abc"), 1.5);

        let by_name = store.find_workflow_by_name("writer").await.unwrap().unwrap();
        assert_eq!(by_name.id, id);
        let by_url = store
            .find_workflow_by_entry_url("https://chat.example.com/share/abc")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(by_url.point_multiplier, 1.5);
        assert!(store.find_workflow_by_name("other").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn status_and_balance_updates_apply() {
        let store = MemoryStore::new();
        let id = store.add_user("alice", "pw", 1.0).unwrap();
        store.update_balance(&id, 42.0).await.unwrap();
        store.set_status(&id, UserStatus::Inactive).await.unwrap();

        let user = store.find_user_by_id(&id).await.unwrap().unwrap();
        assert_eq!(user.balance, 42.0);
        assert!(!user.is_active());
        assert!(store.set_status("missing", UserStatus::Active).await.is_err());
    }
}
