//! # sharegate_core
//!
//! Core domain logic for Sharegate: share tokens, rate limiting, request
//! deduplication, and the metered billing ledger.

pub mod auth;
pub mod billing;
pub mod dedup;
pub mod directory;
pub mod memory;
pub mod migrate;
pub mod models;
pub mod moderation;
pub mod pg;
pub mod rate_limit;
pub mod uuid;

/// Returns the crate version.
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_is_not_empty() {
        assert!(!version().is_empty());
    }
}
