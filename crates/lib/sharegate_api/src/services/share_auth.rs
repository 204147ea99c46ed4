//! Share-auth protocol: `init` → `start` → `finish`, plus refresh/logout and
//! the account views behind the auth middleware.
//!
//! Every call re-validates the token and re-reads the user; nothing about a
//! session is held server-side beyond the dedup cache, the limiter buckets
//! and the revocation set on [`AppState`].

use serde_json::Value;
use sharegate_core::auth::TokenError;
use sharegate_core::auth::tokens::looks_like_jwt;
use sharegate_core::billing::compute_cost;
use sharegate_core::billing::usage::UsageReport;
use sharegate_core::dedup::{DedupKey, identity_marker};
use sharegate_core::directory::StoreError;
use sharegate_core::models::auth::User;
use sharegate_core::models::billing::DebitRequest;
use sharegate_core::models::workflow::WorkflowHandle;
use sharegate_core::rate_limit::RateLimitDecision;
use tracing::{debug, error, info, warn};

use crate::AppState;
use crate::error::{AppError, AppResult};
use crate::models::{
    FinishData, FinishResponse, InfoData, InitData, InitRequest, InitResponse, RecordView,
    StartData, StartRequest, StartResponse, WorkflowInfo,
};

/// Permission required to start and bill a chat turn.
pub const CHAT_PERMISSION: &str = "chat";

/// Default and maximum page sizes for the records view.
pub const DEFAULT_RECORDS_LIMIT: i64 = 20;
pub const MAX_RECORDS_LIMIT: i64 = 100;

/// Permissions granted to every token issued by `init`.
pub fn default_permissions() -> Vec<String> {
    vec!["read".to_string(), CHAT_PERMISSION.to_string()]
}

/// An authenticated, active caller.
#[derive(Debug, Clone)]
pub struct ShareIdentity {
    /// Freshly loaded from the directory.
    pub user: User,
    pub permissions: Vec<String>,
    pub scope_id: Option<String>,
    /// `None` for legacy opaque tokens.
    pub jti: Option<String>,
}

impl ShareIdentity {
    pub fn has_permission(&self, permission: &str) -> bool {
        self.permissions.iter().any(|p| p == permission)
    }
}

// ---------------------------------------------------------------------------
// Token resolution
// ---------------------------------------------------------------------------

/// Resolve a presented token to an active user.
///
/// JWT-shaped tokens are validated by the token service; anything else is
/// tried as a legacy opaque token. Every failure surfaces as the same
/// generic 401 except a disabled account, which is reported as such.
pub async fn authenticate_token(
    state: &AppState,
    token: &str,
    expected_scope: Option<&str>,
) -> AppResult<ShareIdentity> {
    let (user, permissions, scope_id, jti) = match state.tokens.validate(token, expected_scope) {
        Ok(validated) => {
            let user = state
                .users
                .find_user_by_id(&validated.subject_id)
                .await?
                .ok_or_else(|| {
                    debug!(user_id = %validated.subject_id, "token subject no longer exists");
                    AppError::auth_failed()
                })?;
            (
                user,
                validated.permissions,
                validated.scope_id,
                Some(validated.jti),
            )
        }
        Err(TokenError::MalformedToken) => {
            let user = state.users.find_user_by_token(token).await?.ok_or_else(|| {
                debug!("token is neither a share token nor a known legacy token");
                AppError::auth_failed()
            })?;
            (user, default_permissions(), None, None)
        }
        Err(e) => {
            debug!(error = %e, "share token rejected");
            return Err(e.into());
        }
    };

    if !user.is_active() {
        info!(user_id = %user.id, "rejecting disabled account");
        return Err(AppError::UserDisabled);
    }

    Ok(ShareIdentity {
        user,
        permissions,
        scope_id,
        jti,
    })
}

fn require_token(token: Option<&str>) -> AppResult<&str> {
    token
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .ok_or_else(|| AppError::Unauthorized("Missing token".into()))
}

fn enforce_rate_limit(state: &AppState, key: &str, max_requests: u32) -> AppResult<()> {
    match state
        .limiter
        .check(key, max_requests, state.config.rate_limits.window)
    {
        RateLimitDecision::Allowed { .. } => Ok(()),
        RateLimitDecision::Limited { retry_after } => {
            warn!(key, retry_after_ms = retry_after.as_millis() as u64, "rate limited");
            Err(AppError::RateLimited {
                retry_after_secs: retry_after.as_secs().max(1),
            })
        }
    }
}

/// Workflow lookups only feed display fields; a registry failure is logged
/// and treated as "no workflow".
fn informational(
    lookup: Result<Option<WorkflowHandle>, StoreError>,
    what: &str,
) -> Option<WorkflowHandle> {
    lookup.unwrap_or_else(|e| {
        warn!(error = %e, lookup = what, "workflow lookup failed");
        None
    })
}

// ---------------------------------------------------------------------------
// init
// ---------------------------------------------------------------------------

/// Establish identity and hand back a share token.
///
/// `referer_url` is the caller's `Referer` with any `token` parameter
/// already stripped; it picks the workflow whose multiplier is reported.
pub async fn init(
    state: &AppState,
    caller_ip: &str,
    referer_url: Option<&str>,
    req: &InitRequest,
) -> AppResult<InitResponse> {
    let token = req.token.as_deref().map(str::trim).filter(|t| !t.is_empty());
    let username = req.username.as_deref().map(str::trim).filter(|u| !u.is_empty());
    let password = req.password.as_deref().filter(|p| !p.is_empty());

    let marker = match (token, username, password) {
        (Some(t), _, _) => identity_marker(&["token", t]),
        (None, Some(u), Some(p)) => identity_marker(&["password", u, p]),
        _ => return Err(AppError::Validation("Missing username/password or token".into())),
    };
    let key = DedupKey::current("init", caller_ip, &marker);
    if let Some(cached) = state.init_dedup.get(&key) {
        debug!(key = key.as_str(), "init served from dedup cache");
        return Ok(cached);
    }

    enforce_rate_limit(
        state,
        &format!("init:{caller_ip}"),
        state.config.rate_limits.init_max,
    )?;

    let scope = req.share_id.as_deref().filter(|s| !s.is_empty());
    let (user, auth_token) = match token {
        Some(t) => {
            let identity = authenticate_token(state, t, None).await?;
            let auth_token = match identity.jti {
                Some(_) => t.to_string(),
                // Legacy opaque token: upgrade to a signed share token.
                None => state.tokens.issue(
                    &identity.user.id,
                    &identity.user.username,
                    scope,
                    &default_permissions(),
                )?,
            };
            (identity.user, auth_token)
        }
        None => {
            let (Some(u), Some(p)) = (username, password) else {
                return Err(AppError::Validation("Missing username/password or token".into()));
            };
            let user = state.users.authenticate(u, p).await?.ok_or_else(|| {
                debug!(username = u, "credential check failed");
                AppError::auth_failed()
            })?;
            if !user.is_active() {
                info!(user_id = %user.id, "rejecting disabled account at init");
                return Err(AppError::UserDisabled);
            }
            let auth_token =
                state
                    .tokens
                    .issue(&user.id, &user.username, scope, &default_permissions())?;
            (user, auth_token)
        }
    };

    let workflow = match referer_url {
        Some(url) => informational(
            state.workflows.find_workflow_by_entry_url(url).await,
            "entry_url",
        ),
        None => None,
    };

    info!(user_id = %user.id, username = %user.username, "share session initialised");
    let response = InitResponse {
        success: true,
        auth_token,
        data: InitData {
            user_id: user.id.clone(),
            uid: user.id,
            username: user.username,
            point_multiplier: workflow.as_ref().map(|w| w.point_multiplier),
            workflow_info: workflow.map(|w| WorkflowInfo {
                id: w.id,
                name: w.name,
            }),
        },
        message: None,
    };
    Ok(state.init_dedup.insert(key, response))
}

// ---------------------------------------------------------------------------
// start
// ---------------------------------------------------------------------------

/// Pre-flight check before a chat turn. Mutates nothing.
pub async fn start(
    state: &AppState,
    caller_ip: &str,
    token: Option<&str>,
    req: &StartRequest,
) -> AppResult<StartResponse> {
    let token = require_token(token)?;
    let share_id = req.share_id.as_deref().filter(|s| !s.is_empty());

    let marker = identity_marker(&[share_id.unwrap_or(""), token]);
    let key = DedupKey::current("start", caller_ip, &marker);
    if let Some(cached) = state.start_dedup.get(&key) {
        debug!(key = key.as_str(), "start served from dedup cache");
        return Ok(cached);
    }

    enforce_rate_limit(
        state,
        &format!("start:{caller_ip}"),
        state.config.rate_limits.start_max,
    )?;

    let identity = authenticate_token(state, token, share_id).await?;
    if !identity.has_permission(CHAT_PERMISSION) {
        return Err(AppError::Forbidden("Token does not allow chat".into()));
    }

    let balance = identity.user.balance;
    if balance <= 0.0 {
        info!(user_id = %identity.user.id, balance, "start refused: no balance");
        return Err(AppError::InsufficientBalance { balance });
    }

    if let Some(question) = req.question.as_deref().filter(|q| !q.is_empty())
        && state.moderation.contains_sensitive_word(question).await?
    {
        info!(user_id = %identity.user.id, "start refused: sensitive content");
        return Err(AppError::SensitiveContent);
    }

    let workflow = match req.app_name.as_deref().filter(|n| !n.is_empty()) {
        Some(name) => informational(state.workflows.find_workflow_by_name(name).await, "name"),
        None => None,
    };

    let response = StartResponse {
        success: true,
        data: StartData {
            balance,
            workflow_id: workflow.as_ref().map(|w| w.id.clone()),
            point_multiplier: workflow.map(|w| w.point_multiplier),
        },
    };
    Ok(state.start_dedup.insert(key, response))
}

// ---------------------------------------------------------------------------
// finish
// ---------------------------------------------------------------------------

/// Bill a completed chat turn.
///
/// No balance check: the turn already happened and is billed even if that
/// drives the balance negative. A ledger failure is reported once and never
/// retried here.
pub async fn finish(
    state: &AppState,
    token: Option<&str>,
    response_data: Option<Value>,
) -> AppResult<FinishResponse> {
    let token = require_token(token)?;
    let identity = authenticate_token(state, token, None).await?;
    if !identity.has_permission(CHAT_PERMISSION) {
        return Err(AppError::Forbidden("Token does not allow chat".into()));
    }

    let response_data = response_data.unwrap_or(Value::Null);
    let usage = UsageReport::parse(&response_data).totals();
    let cost = compute_cost(&usage);
    if !usage.is_finite() || !cost.is_finite() {
        warn!(user_id = %identity.user.id, "rejected non-finite usage");
        return Err(AppError::Validation(
            "responseData usage totals are out of range".into(),
        ));
    }

    let user = identity.user;
    let outcome = state
        .ledger
        .debit(DebitRequest {
            user_id: user.id.clone(),
            username: user.username.clone(),
            tokens_used: usage.tokens,
            points_used: usage.points,
            cost,
            response_data,
        })
        .await
        .map_err(|e| {
            error!(
                user_id = %user.id,
                username = %user.username,
                tokens = usage.tokens,
                points = usage.points,
                cost,
                error = %e,
                "billing debit failed"
            );
            AppError::Internal(e.to_string())
        })?;

    info!(
        user_id = %user.id,
        record_id = %outcome.record_id,
        tokens = usage.tokens,
        points = usage.points,
        cost,
        balance = outcome.new_balance,
        "chat turn billed"
    );
    Ok(FinishResponse {
        success: true,
        data: FinishData {
            cost,
            balance: outcome.new_balance,
            tokens: usage.tokens,
            points: usage.points,
        },
    })
}

// ---------------------------------------------------------------------------
// refresh / logout
// ---------------------------------------------------------------------------

/// Rotate a share token. The old token is revoked.
pub async fn refresh(state: &AppState, token: Option<&str>) -> AppResult<String> {
    let token = require_token(token)?;
    let fresh = state.tokens.refresh(token).map_err(|e| {
        debug!(error = %e, "refresh rejected");
        AppError::from(e)
    })?;

    // The subject must still exist and be active.
    if let Err(e) = authenticate_token(state, &fresh, None).await {
        if let Err(revoke_err) = state.tokens.revoke(&fresh) {
            warn!(error = %revoke_err, "failed to revoke rotated token");
        }
        return Err(e);
    }
    Ok(fresh)
}

/// Revoke the presented token if there is one.
///
/// Only signed share tokens can be revoked. A legacy opaque token is
/// rejected, since it would keep working after a successful logout. A
/// JWT whose signature does not verify is ignored and nothing is recorded.
pub fn logout(state: &AppState, token: Option<&str>) -> AppResult<()> {
    let Some(token) = token.map(str::trim).filter(|t| !t.is_empty()) else {
        return Ok(());
    };
    if !looks_like_jwt(token) {
        debug!("logout with legacy token");
        return Err(AppError::Validation(
            "Legacy share tokens cannot be revoked".into(),
        ));
    }
    if let Err(e) = state.tokens.revoke(token) {
        debug!(error = %e, "logout with unverifiable token");
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// info / records
// ---------------------------------------------------------------------------

pub fn info(identity: &ShareIdentity) -> InfoData {
    InfoData {
        user_id: identity.user.id.clone(),
        username: identity.user.username.clone(),
        balance: identity.user.balance,
        status: identity.user.status.as_str().to_string(),
        permissions: identity.permissions.clone(),
        scope_id: identity.scope_id.clone(),
    }
}

/// Most recent consumption records for the caller, newest first.
pub async fn records(
    state: &AppState,
    identity: &ShareIdentity,
    limit: Option<i64>,
) -> AppResult<Vec<RecordView>> {
    let limit = limit
        .unwrap_or(DEFAULT_RECORDS_LIMIT)
        .clamp(1, MAX_RECORDS_LIMIT);
    let records = state
        .ledger
        .records_for_user(&identity.user.id, limit)
        .await?;
    Ok(records
        .into_iter()
        .map(|r| RecordView {
            id: r.id,
            tokens_used: r.tokens_used,
            points_used: r.points_used,
            cost: r.cost,
            response_data: r.response_data,
            created_at: r.created_at.to_rfc3339(),
        })
        .collect())
}
