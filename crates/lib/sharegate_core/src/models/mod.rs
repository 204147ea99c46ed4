//! Domain models shared by the stores, the ledger and the HTTP surface.

pub mod auth;
pub mod billing;
pub mod workflow;
