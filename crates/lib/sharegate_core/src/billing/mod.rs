//! Metered billing: usage extraction, the cost rule, and the ledger seam.

pub mod usage;

use async_trait::async_trait;

pub use usage::{Usage, UsageReport};

use crate::directory::StoreError;
use crate::models::billing::{ConsumptionRecord, DebitOutcome, DebitRequest};

/// Points charged per 1000 tokens when the engine reports no points.
pub const TOKEN_FALLBACK_RATE_PER_1K: f64 = 0.5;

/// Cost of one turn: the reported points, or a flat token rate when the
/// engine reported tokens but zero points.
///
/// The workflow point multiplier is deliberately not applied here.
pub fn compute_cost(usage: &Usage) -> f64 {
    if usage.points == 0.0 && usage.tokens > 0 {
        usage.tokens as f64 / 1000.0 * TOKEN_FALLBACK_RATE_PER_1K
    } else {
        usage.points
    }
}

/// Append-only ledger with an atomic balance debit.
///
/// `debit` decrements the balance and appends a [`ConsumptionRecord`] as one
/// unit: both commit or neither does. It never refuses on insufficient
/// balance; the balance may go negative.
#[async_trait]
pub trait BillingLedger: Send + Sync {
    async fn debit(&self, request: DebitRequest) -> Result<DebitOutcome, StoreError>;

    /// Most recent records for a user, newest first.
    async fn records_for_user(
        &self,
        user_id: &str,
        limit: i64,
    ) -> Result<Vec<ConsumptionRecord>, StoreError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cost_is_points_when_reported() {
        let cost = compute_cost(&Usage {
            tokens: 5_000,
            points: 3.25,
        });
        assert_eq!(cost, 3.25);
    }

    #[test]
    fn cost_falls_back_to_token_rate() {
        let cost = compute_cost(&Usage {
            tokens: 2_000,
            points: 0.0,
        });
        assert_eq!(cost, 1.0);
    }

    #[test]
    fn nothing_reported_costs_nothing() {
        assert_eq!(compute_cost(&Usage::default()), 0.0);
    }

    #[test]
    fn saturated_tokens_still_cost_a_finite_amount() {
        let cost = compute_cost(&Usage {
            tokens: i64::MAX,
            points: 0.0,
        });
        assert!(cost.is_finite() && cost > 0.0);
    }
}
