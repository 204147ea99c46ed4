//! API server configuration.

use std::str::FromStr;
use std::time::Duration;

use sharegate_core::auth::secret::resolve_share_secret;
use sharegate_core::auth::tokens::{
    DEFAULT_AUDIENCE, DEFAULT_ISSUER, DEFAULT_TTL_SECS, TokenSettings,
};
use sharegate_core::dedup::DEFAULT_DEDUP_WINDOW;
use sharegate_core::rate_limit::DEFAULT_WINDOW;
use tracing::warn;

/// Default period of the background sweep, in seconds.
pub const DEFAULT_CLEANUP_INTERVAL_SECS: u64 = 60;

/// Per-operation request limits.
#[derive(Clone, Debug)]
pub struct RateLimitConfig {
    pub window: Duration,
    pub init_max: u32,
    pub start_max: u32,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            window: DEFAULT_WINDOW,
            init_max: 5,
            start_max: 8,
        }
    }
}

/// Configuration for the API server.
#[derive(Clone, Debug)]
pub struct ApiConfig {
    /// Address to bind the HTTP listener (e.g. "127.0.0.1:3100").
    pub bind_addr: String,
    /// PostgreSQL connection URL.
    pub pg_connection_url: String,
    /// Share-token signing and claim settings.
    pub tokens: TokenSettings,
    pub rate_limits: RateLimitConfig,
    /// Window inside which duplicate init/start calls get the cached response.
    pub dedup_window: Duration,
    /// Interval of the background sweep over limiter/dedup/revocation state.
    pub cleanup_interval: Duration,
    /// Mark the share-token cookie `Secure`.
    pub secure_cookies: bool,
    /// Take the caller IP from `X-Forwarded-For` / `X-Real-IP`.
    pub trust_proxy_headers: bool,
}

impl ApiConfig {
    /// Reads configuration from environment variables with sensible defaults.
    ///
    /// | Variable                 | Default                                   |
    /// |--------------------------|-------------------------------------------|
    /// | `BIND_ADDR`              | `127.0.0.1:3100`                          |
    /// | `DATABASE_URL`           | `postgres://localhost:5432/sharegate`     |
    /// | `SHARE_TOKEN_SECRET` / `JWT_SECRET` | generated & persisted to file  |
    /// | `SHARE_TOKEN_ISSUER`     | `sharegate`                               |
    /// | `SHARE_TOKEN_AUDIENCE`   | `sharegate-share`                         |
    /// | `SHARE_TOKEN_TTL_SECS`   | `7200`                                    |
    /// | `RATE_LIMIT_WINDOW_MS`   | `10000`                                   |
    /// | `INIT_RATE_LIMIT_MAX`    | `5`                                       |
    /// | `START_RATE_LIMIT_MAX`   | `8`                                       |
    /// | `DEDUP_WINDOW_MS`        | `5000`                                    |
    /// | `CLEANUP_INTERVAL_SECS`  | `60`                                      |
    /// | `SECURE_COOKIES`         | `false`                                   |
    /// | `TRUST_PROXY_HEADERS`    | `false`                                   |
    pub fn from_env() -> Self {
        let defaults = RateLimitConfig::default();
        Self {
            bind_addr: std::env::var("BIND_ADDR").unwrap_or_else(|_| "127.0.0.1:3100".into()),
            pg_connection_url: std::env::var("DATABASE_URL")
                .unwrap_or_else(|_| "postgres://localhost:5432/sharegate".into()),
            tokens: TokenSettings {
                secret: resolve_share_secret(),
                issuer: std::env::var("SHARE_TOKEN_ISSUER")
                    .unwrap_or_else(|_| DEFAULT_ISSUER.into()),
                audience: std::env::var("SHARE_TOKEN_AUDIENCE")
                    .unwrap_or_else(|_| DEFAULT_AUDIENCE.into()),
                ttl_secs: env_positive("SHARE_TOKEN_TTL_SECS", DEFAULT_TTL_SECS),
            },
            rate_limits: RateLimitConfig {
                window: Duration::from_millis(env_parse(
                    "RATE_LIMIT_WINDOW_MS",
                    defaults.window.as_millis() as u64,
                )),
                init_max: env_parse("INIT_RATE_LIMIT_MAX", defaults.init_max),
                start_max: env_parse("START_RATE_LIMIT_MAX", defaults.start_max),
            },
            dedup_window: Duration::from_millis(env_parse(
                "DEDUP_WINDOW_MS",
                DEFAULT_DEDUP_WINDOW.as_millis() as u64,
            )),
            cleanup_interval: Duration::from_secs(env_positive(
                "CLEANUP_INTERVAL_SECS",
                DEFAULT_CLEANUP_INTERVAL_SECS,
            )),
            secure_cookies: env_parse("SECURE_COOKIES", false),
            trust_proxy_headers: env_parse("TRUST_PROXY_HEADERS", false),
        }
    }

    /// Defaults with an explicit secret and no environment lookups.
    pub fn with_secret(secret: impl Into<String>) -> Self {
        Self {
            bind_addr: "127.0.0.1:0".into(),
            pg_connection_url: String::new(),
            tokens: TokenSettings::with_secret(secret),
            rate_limits: RateLimitConfig::default(),
            dedup_window: DEFAULT_DEDUP_WINDOW,
            cleanup_interval: Duration::from_secs(DEFAULT_CLEANUP_INTERVAL_SECS),
            secure_cookies: false,
            trust_proxy_headers: false,
        }
    }
}

/// Parse an env var, falling back to `default` when unset or unparseable.
fn env_parse<T: FromStr + Copy + std::fmt::Debug>(key: &str, default: T) -> T {
    match std::env::var(key) {
        Ok(raw) => raw.trim().parse().unwrap_or_else(|_| {
            warn!(key, value = %raw, ?default, "unparseable config value, using default");
            default
        }),
        Err(_) => default,
    }
}

/// [`env_parse`] for values that must be strictly positive.
fn env_positive<T>(key: &str, default: T) -> T
where
    T: FromStr + Copy + Default + PartialOrd + std::fmt::Debug,
{
    positive_or_default(key, env_parse(key, default), default)
}

fn positive_or_default<T>(key: &str, value: T, default: T) -> T
where
    T: Copy + Default + PartialOrd + std::fmt::Debug,
{
    if value > T::default() {
        value
    } else {
        warn!(key, ?value, ?default, "config value must be positive, using default");
        default
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn with_secret_uses_documented_defaults() {
        let config = ApiConfig::with_secret("s");
        assert_eq!(config.tokens.ttl_secs, 7200);
        assert_eq!(config.tokens.issuer, "sharegate");
        assert_eq!(config.rate_limits.init_max, 5);
        assert_eq!(config.rate_limits.start_max, 8);
        assert_eq!(config.rate_limits.window, Duration::from_secs(10));
        assert_eq!(config.dedup_window, Duration::from_secs(5));
    }

    #[test]
    fn env_parse_falls_back_on_garbage() {
        assert_eq!(env_parse("SHAREGATE_TEST_UNSET_KEY", 42u32), 42);
    }

    #[test]
    fn zero_and_negative_durations_fall_back() {
        assert_eq!(positive_or_default("CLEANUP_INTERVAL_SECS", 0u64, 60), 60);
        assert_eq!(positive_or_default("CLEANUP_INTERVAL_SECS", 5u64, 60), 5);
        assert_eq!(positive_or_default("SHARE_TOKEN_TTL_SECS", 0i64, 7200), 7200);
        assert_eq!(positive_or_default("SHARE_TOKEN_TTL_SECS", -30i64, 7200), 7200);
        assert_eq!(env_positive("SHAREGATE_TEST_UNSET_KEY", 7200i64), 7200);
    }
}
