//! # sharegate_api
//!
//! HTTP API library for Sharegate: the share-auth init/start/finish protocol
//! and the token-protected account endpoints built on it.

pub mod config;
pub mod error;
pub mod extract;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod services;

use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::Router;
use axum::routing::{get, post};
use chrono::Utc;
use sharegate_core::auth::tokens::TokenService;
use sharegate_core::billing::BillingLedger;
use sharegate_core::dedup::DedupCache;
use sharegate_core::directory::{UserDirectory, WorkflowRegistry};
use sharegate_core::moderation::ModerationGate;
use sharegate_core::rate_limit::RateLimiter;
use tokio_util::sync::CancellationToken;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::debug;

use crate::config::ApiConfig;
use crate::handlers::{health, share_auth};
use crate::models::{InitResponse, StartResponse};

pub const ROUTE_HEALTH: &str = "/api/health";
pub const ROUTE_INIT: &str = "/api/share-auth/init";
pub const ROUTE_START: &str = "/api/share-auth/start";
pub const ROUTE_FINISH: &str = "/api/share-auth/finish";
pub const ROUTE_REFRESH: &str = "/api/share-auth/refresh";
pub const ROUTE_LOGOUT: &str = "/api/share-auth/logout";
pub const ROUTE_INFO: &str = "/api/share-auth/info";
pub const ROUTE_RECORDS: &str = "/api/share-auth/records";

/// Shared application state passed to all handlers.
///
/// Every piece of process-scoped mutable state (limiter buckets, dedup
/// entries, revocations) lives here, so each router gets its own.
#[derive(Clone)]
pub struct AppState {
    pub config: ApiConfig,
    pub tokens: Arc<TokenService>,
    pub limiter: Arc<RateLimiter>,
    pub init_dedup: Arc<DedupCache<InitResponse>>,
    pub start_dedup: Arc<DedupCache<StartResponse>>,
    pub users: Arc<dyn UserDirectory>,
    pub workflows: Arc<dyn WorkflowRegistry>,
    pub moderation: Arc<dyn ModerationGate>,
    pub ledger: Arc<dyn BillingLedger>,
}

impl AppState {
    pub fn new(
        config: ApiConfig,
        users: Arc<dyn UserDirectory>,
        workflows: Arc<dyn WorkflowRegistry>,
        moderation: Arc<dyn ModerationGate>,
        ledger: Arc<dyn BillingLedger>,
    ) -> Self {
        let tokens = Arc::new(TokenService::new(&config.tokens));
        let dedup_window = config.dedup_window;
        Self {
            config,
            tokens,
            limiter: Arc::new(RateLimiter::new()),
            init_dedup: Arc::new(DedupCache::new(dedup_window)),
            start_dedup: Arc::new(DedupCache::new(dedup_window)),
            users,
            workflows,
            moderation,
            ledger,
        }
    }

    /// Drop expired limiter buckets, dedup entries and stale revocations.
    pub fn sweep(&self) {
        let now = Instant::now();
        let buckets = self.limiter.sweep(now);
        let init = self.init_dedup.sweep(now);
        let start = self.start_dedup.sweep(now);
        let revocations = self.tokens.sweep_revocations(Utc::now().timestamp());
        debug!(buckets, init, start, revocations, "swept expired state");
    }
}

/// Run embedded database migrations.
///
/// Delegates to `sharegate_core::migrate::migrate()` which owns the migration files.
pub async fn migrate(pool: &sqlx::PgPool) -> Result<(), sqlx::migrate::MigrateError> {
    sharegate_core::migrate::migrate(pool).await
}

/// Builds the Axum router with all routes and shared state.
pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    // Public routes: each handler validates its own token.
    let public = Router::new()
        .route(ROUTE_HEALTH, get(health::health_handler))
        .route(ROUTE_INIT, post(share_auth::init_handler))
        .route(ROUTE_START, post(share_auth::start_handler))
        .route(ROUTE_FINISH, post(share_auth::finish_handler))
        .route(ROUTE_REFRESH, post(share_auth::refresh_handler))
        .route(ROUTE_LOGOUT, post(share_auth::logout_handler));

    // Bearer-or-cookie protected routes.
    let protected = Router::new()
        .route(ROUTE_INFO, get(share_auth::info_handler))
        .route(ROUTE_RECORDS, get(share_auth::records_handler))
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            middleware::auth::require_auth,
        ));

    Router::new()
        .merge(public)
        .merge(protected)
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            middleware::session::clear_cookie_on_unauthorized,
        ))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// Shortest sweep period; `tokio::time::interval` rejects zero.
const MIN_CLEANUP_INTERVAL: Duration = Duration::from_secs(1);

/// Periodically sweep expired in-memory state until `cancel` fires.
pub fn spawn_cleanup_task(
    state: AppState,
    period: Duration,
    cancel: CancellationToken,
) -> tokio::task::JoinHandle<()> {
    let period = period.max(MIN_CLEANUP_INTERVAL);
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(period);
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = interval.tick() => state.sweep(),
            }
        }
        debug!("cleanup task stopped");
    })
}
