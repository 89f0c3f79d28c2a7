// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration model structs for Courier.
//!
//! All structs use `#[serde(deny_unknown_fields)]` to reject unrecognized
//! config keys at startup, providing actionable error messages.

use std::time::Duration;

use courier_core::RetryPolicy;
use serde::{Deserialize, Serialize};

/// Top-level Courier configuration.
///
/// Loaded from TOML files following XDG hierarchy, with environment variable overrides.
/// All sections are optional and default to sensible values.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct CourierConfig {
    /// Logging settings.
    #[serde(default)]
    pub log: LogConfig,

    /// Storage backend settings.
    #[serde(default)]
    pub storage: StorageConfig,

    /// Outbox publisher settings.
    #[serde(default)]
    pub outbox: OutboxConfig,

    /// Inbox processor settings.
    #[serde(default)]
    pub inbox: InboxConfig,

    /// Retention sweeper settings.
    #[serde(default)]
    pub retention: RetentionConfig,

    /// Where published outbox records are delivered.
    #[serde(default)]
    pub sink: SinkConfig,
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct LogConfig {
    /// Logging level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Storage backend configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct StorageConfig {
    /// Path to the SQLite database file.
    #[serde(default = "default_database_path")]
    pub database_path: String,

    /// Enable WAL (Write-Ahead Logging) mode for SQLite.
    #[serde(default = "default_true")]
    pub wal_mode: bool,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
            wal_mode: true,
        }
    }
}

fn default_database_path() -> String {
    dirs::data_dir()
        .map(|p| p.join("courier").join("courier.db"))
        .unwrap_or_else(|| std::path::PathBuf::from("courier.db"))
        .to_string_lossy()
        .into_owned()
}

fn default_true() -> bool {
    true
}

/// Outbox publisher configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct OutboxConfig {
    /// Run the publisher loop.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Milliseconds between publisher passes.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Maximum records dispatched per pass.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Failed attempts before a record is discarded.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// How long a single dispatch may take before it counts as failed.
    #[serde(default = "default_timeout_ms")]
    pub dispatch_timeout_ms: u64,

    /// Age after which a record stuck in `publishing` is considered abandoned.
    #[serde(default = "default_stale_after_secs")]
    pub stale_after_secs: u64,

    /// Delay before the first retry; doubled on every further failure.
    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,

    /// Cap for the retry delay.
    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,
}

impl Default for OutboxConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            poll_interval_ms: default_poll_interval_ms(),
            batch_size: default_batch_size(),
            max_retries: default_max_retries(),
            dispatch_timeout_ms: default_timeout_ms(),
            stale_after_secs: default_stale_after_secs(),
            initial_backoff_ms: default_initial_backoff_ms(),
            max_backoff_ms: default_max_backoff_ms(),
        }
    }
}

impl OutboxConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn dispatch_timeout(&self) -> Duration {
        Duration::from_millis(self.dispatch_timeout_ms)
    }

    pub fn stale_after(&self) -> Duration {
        Duration::from_secs(self.stale_after_secs)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.max_retries,
            initial_backoff: Duration::from_millis(self.initial_backoff_ms),
            max_backoff: Duration::from_millis(self.max_backoff_ms),
        }
    }
}

/// Inbox processor configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct InboxConfig {
    /// Run the inbox processor loop.
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// How long a single action invocation may take.
    #[serde(default = "default_timeout_ms")]
    pub handler_timeout_ms: u64,

    /// Age after which a record stuck in `processing` is considered abandoned.
    #[serde(default = "default_stale_after_secs")]
    pub stale_after_secs: u64,

    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,

    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,

    /// URL inbound messages are forwarded to by the host binary.
    /// When unset, `courier serve` does not run the processor.
    #[serde(default)]
    pub forward_url: Option<String>,
}

impl Default for InboxConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            poll_interval_ms: default_poll_interval_ms(),
            batch_size: default_batch_size(),
            max_retries: default_max_retries(),
            handler_timeout_ms: default_timeout_ms(),
            stale_after_secs: default_stale_after_secs(),
            initial_backoff_ms: default_initial_backoff_ms(),
            max_backoff_ms: default_max_backoff_ms(),
            forward_url: None,
        }
    }
}

impl InboxConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn handler_timeout(&self) -> Duration {
        Duration::from_millis(self.handler_timeout_ms)
    }

    pub fn stale_after(&self) -> Duration {
        Duration::from_secs(self.stale_after_secs)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.max_retries,
            initial_backoff: Duration::from_millis(self.initial_backoff_ms),
            max_backoff: Duration::from_millis(self.max_backoff_ms),
        }
    }
}

fn default_poll_interval_ms() -> u64 {
    1000
}

fn default_batch_size() -> usize {
    50
}

fn default_max_retries() -> u32 {
    5
}

fn default_timeout_ms() -> u64 {
    30_000
}

fn default_stale_after_secs() -> u64 {
    300
}

fn default_initial_backoff_ms() -> u64 {
    1000
}

fn default_max_backoff_ms() -> u64 {
    60_000
}

/// Retention sweeper configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct RetentionConfig {
    /// Seconds between sweeps.
    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,

    /// How long published/discarded outbox records are kept.
    #[serde(default = "default_retention_secs")]
    pub outbox_retention_secs: u64,

    /// How long processed/discarded inbox records are kept.
    ///
    /// This is also the deduplication horizon: a redelivery older than
    /// this is no longer recognized as a duplicate.
    #[serde(default = "default_retention_secs")]
    pub inbox_retention_secs: u64,
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            sweep_interval_secs: default_sweep_interval_secs(),
            outbox_retention_secs: default_retention_secs(),
            inbox_retention_secs: default_retention_secs(),
        }
    }
}

impl RetentionConfig {
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }

    pub fn outbox_retention(&self) -> Duration {
        Duration::from_secs(self.outbox_retention_secs)
    }

    pub fn inbox_retention(&self) -> Duration {
        Duration::from_secs(self.inbox_retention_secs)
    }
}

fn default_sweep_interval_secs() -> u64 {
    3600
}

fn default_retention_secs() -> u64 {
    7 * 24 * 3600
}

/// Kind of dispatch sink the host binary wires up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SinkKind {
    /// Log every envelope and report success.
    #[default]
    Log,
    /// POST every envelope as JSON to `{webhook_url}/{destination}`.
    Webhook,
}

/// Dispatch sink configuration.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct SinkConfig {
    #[serde(default)]
    pub kind: SinkKind,

    /// Base URL for the webhook sink.
    #[serde(default)]
    pub webhook_url: Option<String>,

    /// Bearer token sent with webhook requests.
    #[serde(default)]
    pub auth_token: Option<String>,
}
