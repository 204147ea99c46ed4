//! Signing-secret resolution.

use std::path::PathBuf;

use rand::distr::Alphanumeric;
use rand::{Rng, rng};
use tracing::{info, warn};

/// Resolve the share-token signing secret:
/// env var `SHARE_TOKEN_SECRET` → `JWT_SECRET` → persisted file.
///
/// The persisted file is generated on first use so the server works
/// unconfigured. Real deployments must set the env var.
pub fn resolve_share_secret() -> String {
    for var in ["SHARE_TOKEN_SECRET", "JWT_SECRET"] {
        if let Ok(secret) = std::env::var(var)
            && !secret.is_empty()
        {
            return secret;
        }
    }
    let secret_path = secret_path();
    if let Ok(existing) = std::fs::read_to_string(&secret_path) {
        let trimmed = existing.trim();
        if !trimmed.is_empty() {
            return trimmed.to_string();
        }
    }
    let secret: String = rng()
        .sample_iter(&Alphanumeric)
        .take(64)
        .map(char::from)
        .collect();
    if let Some(parent) = secret_path.parent()
        && let Err(e) = std::fs::create_dir_all(parent)
    {
        warn!(error = %e, "could not create secret directory; secret will not survive restart");
    }
    if let Err(e) = std::fs::write(&secret_path, &secret) {
        warn!(error = %e, "could not persist generated share-token secret");
    }
    info!(path = %secret_path.display(), "generated new share-token secret; set SHARE_TOKEN_SECRET in production");
    secret
}

/// Path to the persisted secret file.
fn secret_path() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("sharegate")
        .join("share-token-secret")
}
