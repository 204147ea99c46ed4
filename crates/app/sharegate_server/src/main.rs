//! Sharegate API server binary.
//!
//! Serves the share-auth protocol over PostgreSQL, or over an in-process
//! store for local runs.

use std::net::SocketAddr;
use std::sync::Arc;

use clap::{Parser, ValueEnum};
use sharegate_api::AppState;
use sharegate_api::config::ApiConfig;
use sharegate_core::memory::MemoryStore;
use sharegate_core::moderation::WordListGate;
use sharegate_core::pg::PgStore;
use sqlx::postgres::PgPoolOptions;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum Storage {
    Postgres,
    Memory,
}

/// CLI arguments for the API server.
#[derive(Parser, Debug)]
#[command(name = "sharegate_server", about = "Sharegate share-auth API server")]
struct Args {
    /// Port to listen on. Overrides the port in `BIND_ADDR`.
    #[arg(long)]
    port: Option<u16>,

    /// PostgreSQL connection URL.
    #[arg(
        long,
        env = "DATABASE_URL",
        default_value = "postgres://localhost:5432/sharegate"
    )]
    database_url: String,

    /// Maximum number of database connections in the pool.
    #[arg(long, default_value_t = 5)]
    max_connections: u32,

    /// Backing store for users, workflows and the ledger.
    #[arg(long, env = "SHAREGATE_STORAGE", value_enum, default_value_t = Storage::Postgres)]
    storage: Storage,

    /// Comma-separated sensitive words (memory storage only).
    #[arg(long, env = "SENSITIVE_WORDS", default_value = "")]
    sensitive_words: String,

    /// Seed a user as `username:password:balance` (memory storage only).
    #[arg(long, env = "SEED_USER")]
    seed_user: Option<String>,
}

fn bind_addr(config: &ApiConfig, port: Option<u16>) -> String {
    match port {
        Some(port) => {
            let host = config
                .bind_addr
                .rsplit_once(':')
                .map(|(host, _)| host)
                .unwrap_or("127.0.0.1");
            format!("{host}:{port}")
        }
        None => config.bind_addr.clone(),
    }
}

fn seed(store: &MemoryStore, entry: &str) -> Result<(), Box<dyn std::error::Error>> {
    let mut parts = entry.splitn(3, ':');
    let (Some(username), Some(password), Some(balance)) = (parts.next(), parts.next(), parts.next())
    else {
        return Err("SEED_USER must be username:password:balance".into());
    };
    let id = store.add_user(username, password, balance.trim().parse::<f64>()?)?;
    info!(user_id = %id, username, "seeded user");
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                tracing_subscriber::EnvFilter::new("info,sharegate_api=debug,sharegate_core=debug")
            }),
        )
        .init();

    let args = Args::parse();

    let mut config = ApiConfig::from_env();
    config.bind_addr = bind_addr(&config, args.port);
    config.pg_connection_url = args.database_url.clone();

    info!(storage = ?args.storage, bind_addr = %config.bind_addr, "starting sharegate_server");

    let state = match args.storage {
        Storage::Postgres => {
            info!(max_connections = args.max_connections, "configuring connection pool");
            let pool = PgPoolOptions::new()
                .max_connections(args.max_connections)
                .acquire_timeout(std::time::Duration::from_secs(30))
                .connect(&args.database_url)
                .await?;

            info!("running database migrations");
            sharegate_api::migrate(&pool).await?;

            let store = Arc::new(PgStore::new(pool));
            AppState::new(
                config.clone(),
                store.clone(),
                store.clone(),
                store.clone(),
                store,
            )
        }
        Storage::Memory => {
            warn!("memory storage: balances and records are lost on exit");
            let store = Arc::new(MemoryStore::new());
            if let Some(entry) = args.seed_user.as_deref() {
                seed(&store, entry)?;
            }
            let gate = WordListGate::from_csv(&args.sensitive_words)?;
            info!(words = gate.len(), "loaded sensitive word list");
            AppState::new(
                config.clone(),
                store.clone(),
                store.clone(),
                Arc::new(gate),
                store,
            )
        }
    };

    let cancel = CancellationToken::new();
    let cleanup = sharegate_api::spawn_cleanup_task(
        state.clone(),
        config.cleanup_interval,
        cancel.clone(),
    );

    let app = sharegate_api::router(state);
    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;
    info!(addr = %listener.local_addr()?, "REST API listening");

    let shutdown = cancel.clone();
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(async move {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => info!("ctrl-c received, shutting down"),
            _ = shutdown.cancelled() => {}
        }
    })
    .await?;

    cancel.cancel();
    let _ = cleanup.await;
    Ok(())
}
