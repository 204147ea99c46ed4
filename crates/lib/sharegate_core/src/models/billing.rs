//! Billing ledger models.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Immutable ledger entry written by each successful debit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsumptionRecord {
    pub id: String,
    pub user_id: String,
    /// Denormalized at write time.
    pub username: String,
    pub tokens_used: i64,
    pub points_used: f64,
    pub cost: f64,
    /// Raw usage payload as reported by the workflow engine.
    pub response_data: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

/// Input to [`BillingLedger::debit`](crate::billing::BillingLedger::debit).
#[derive(Debug, Clone)]
pub struct DebitRequest {
    pub user_id: String,
    pub username: String,
    pub tokens_used: i64,
    pub points_used: f64,
    pub cost: f64,
    pub response_data: serde_json::Value,
}

/// Result of a committed debit.
#[derive(Debug, Clone, PartialEq)]
pub struct DebitOutcome {
    pub new_balance: f64,
    pub record_id: String,
}
