//! Configuration shapes recognized by the pool, drivers, and retry runner.
//!
//! Loading these from a config file or environment is explicitly out of
//! scope (spec.md §1); callers construct them directly or via `serde`.

use serde::{Deserialize, Serialize};

/// Options governing a [`crate::pool::Pool`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct PoolConfig {
    pub min_size: usize,
    pub max_size: usize,
    pub acquire_timeout_ms: u64,
    pub max_idle_time_ms: u64,
    pub max_lifetime_ms: u64,
    pub transaction_timeout_ms: u64,
    /// `0` disables the background keep-alive loop.
    pub keepalive_interval_ms: u64,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            min_size: 1,
            max_size: 10,
            acquire_timeout_ms: 5_000,
            max_idle_time_ms: 10 * 60_000,
            max_lifetime_ms: 30 * 60_000,
            transaction_timeout_ms: 60_000,
            keepalive_interval_ms: 30_000,
        }
    }
}

/// Options governing [`crate::error::with_retry`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct RetryConfig {
    pub max_retries: u32,
    pub initial_delay_ms: u64,
    pub max_delay_ms: u64,
    pub backoff_multiplier: f64,
    pub retry_only_retryable: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay_ms: 50,
            max_delay_ms: 2_000,
            backoff_multiplier: 2.0,
            retry_only_retryable: true,
        }
    }
}

/// Connection options for a network-backed dialect (MySQL / PostgreSQL).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct NetworkConnectOptions {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    pub database: String,
    #[serde(default)]
    pub pool: PoolConfig,
}

/// Connection options for SQLite: a filesystem path, or `":memory:"`.
///
/// WAL mode and `synchronous = NORMAL` are applied when the connection
/// opens (spec.md §4.1, §6).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct SqliteConnectOptions {
    pub path: String,
    #[serde(default)]
    pub pool: PoolConfig,
}

impl SqliteConnectOptions {
    pub fn memory() -> Self {
        Self {
            path: ":memory:".to_string(),
            pool: PoolConfig {
                // An in-memory SQLite database is a single logical connection;
                // pool concurrency above 1 would silently fragment the dataset.
                min_size: 1,
                max_size: 1,
                ..PoolConfig::default()
            },
        }
    }

    pub fn is_memory(&self) -> bool {
        self.path == ":memory:"
    }
}
