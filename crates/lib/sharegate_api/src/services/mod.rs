//! Protocol orchestration and cookie helpers.

pub mod cookies;
pub mod share_auth;
