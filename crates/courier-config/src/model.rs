// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration model structs.
//!
//! All structs use `#[serde(deny_unknown_fields)]` to reject unrecognized
//! config keys at startup.

use serde::{Deserialize, Serialize};

/// Top-level Courier configuration. Every section defaults.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct CourierConfig {
    /// Process-level settings.
    #[serde(default)]
    pub daemon: DaemonConfig,

    /// Storage backend settings.
    #[serde(default)]
    pub storage: StorageConfig,

    /// Dispatch loop, retry, and throttling policy.
    #[serde(default)]
    pub dispatch: DispatchConfig,

    /// Default quota limits for accounts without a quota row.
    #[serde(default)]
    pub quota: QuotaConfig,

    /// External automation channel bridge.
    #[serde(default)]
    pub channel: ChannelConfig,
}

/// Process-level configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct DaemonConfig {
    /// Logging level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
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
        .unwrap_or_else(|| "courier.db".into())
        .to_string_lossy()
        .into_owned()
}

fn default_true() -> bool {
    true
}

/// Dispatch loop policy.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct DispatchConfig {
    /// Messages selected per `process_queued` call.
    #[serde(default = "default_max_batch")]
    pub max_batch: usize,

    /// Automatic retry cap: failed messages are re-queued while `failed_attempts < max_attempts`.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Lower bound of the randomized delay between consecutive sends.
    #[serde(default = "default_min_delay_ms")]
    pub min_delay_ms: u64,

    /// Upper bound of the randomized delay between consecutive sends.
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,

    /// Delay before re-sending a message the channel answered `Waiting` for.
    #[serde(default = "default_waiting_retry_delay_ms")]
    pub waiting_retry_delay_ms: u64,

    /// How many `Waiting` answers are tolerated before the message goes back to the queue.
    #[serde(default = "default_max_waiting_retries")]
    pub max_waiting_retries: u32,

    /// Probe channel health while throttling between sends.
    #[serde(default)]
    pub probe_between_sends: bool,

    /// How long an account stays paused in memory after a `PendingNET`.
    #[serde(default = "default_network_pause_secs")]
    pub network_pause_secs: u64,

    /// Worker tick interval.
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            max_batch: default_max_batch(),
            max_attempts: default_max_attempts(),
            min_delay_ms: default_min_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            waiting_retry_delay_ms: default_waiting_retry_delay_ms(),
            max_waiting_retries: default_max_waiting_retries(),
            probe_between_sends: false,
            network_pause_secs: default_network_pause_secs(),
            poll_interval_secs: default_poll_interval_secs(),
        }
    }
}

fn default_max_batch() -> usize {
    50
}

fn default_max_attempts() -> u32 {
    3
}

fn default_min_delay_ms() -> u64 {
    3_000
}

fn default_max_delay_ms() -> u64 {
    7_000
}

fn default_waiting_retry_delay_ms() -> u64 {
    1_500
}

fn default_max_waiting_retries() -> u32 {
    3
}

fn default_network_pause_secs() -> u64 {
    30
}

fn default_poll_interval_secs() -> u64 {
    5
}

/// Default quota limits. `-1` means unlimited.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct QuotaConfig {
    #[serde(default = "default_unlimited")]
    pub default_message_limit: i64,

    #[serde(default = "default_unlimited")]
    pub default_queue_limit: i64,

    /// Consumed share (percent) above which quota counts as low.
    #[serde(default = "default_low_quota_percent")]
    pub low_quota_percent: u8,
}

impl Default for QuotaConfig {
    fn default() -> Self {
        Self {
            default_message_limit: default_unlimited(),
            default_queue_limit: default_unlimited(),
            low_quota_percent: default_low_quota_percent(),
        }
    }
}

fn default_unlimited() -> i64 {
    -1
}

fn default_low_quota_percent() -> u8 {
    80
}

/// HTTP bridge to the automation driver.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ChannelConfig {
    /// Base URL of the automation driver.
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Per-request timeout.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_base_url() -> String {
    "http://127.0.0.1:3100".to_string()
}

fn default_timeout_secs() -> u64 {
    60
}
