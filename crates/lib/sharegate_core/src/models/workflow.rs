//! Workflow handle resolved from the registry.

use serde::{Deserialize, Serialize};

/// A chat workflow as seen by the billing core.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowHandle {
    pub id: String,
    pub name: String,
    /// Token-less public entry URL, matched against the request `Referer`.
    pub no_login_entry_url: Option<String>,
    /// Billing coefficient surfaced for display. Not applied by `finish`.
    pub point_multiplier: f64,
}
