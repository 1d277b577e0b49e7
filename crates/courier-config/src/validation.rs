// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Post-deserialization validation for configuration values.

use tracing::warn;

use crate::diagnostic::ConfigError;
use crate::model::CourierConfig;

/// Validate a deserialized configuration for semantic correctness.
///
/// Collects every error instead of failing fast. An inverted throttle
/// window is only warned about; the throttle clamps it at runtime.
pub fn validate_config(config: &CourierConfig) -> Result<(), Vec<ConfigError>> {
    let mut errors = Vec::new();

    if config.storage.database_path.trim().is_empty() {
        errors.push(ConfigError::Validation {
            message: "storage.database_path must not be empty".to_string(),
        });
    }

    let dispatch = &config.dispatch;
    if dispatch.max_batch == 0 {
        errors.push(ConfigError::Validation {
            message: "dispatch.max_batch must be at least 1".to_string(),
        });
    }
    if dispatch.max_attempts == 0 {
        errors.push(ConfigError::Validation {
            message: "dispatch.max_attempts must be at least 1".to_string(),
        });
    }
    if dispatch.poll_interval_secs == 0 {
        errors.push(ConfigError::Validation {
            message: "dispatch.poll_interval_secs must be at least 1".to_string(),
        });
    }
    if dispatch.min_delay_ms > dispatch.max_delay_ms {
        warn!(
            min_delay_ms = dispatch.min_delay_ms,
            max_delay_ms = dispatch.max_delay_ms,
            "dispatch delay window is inverted; bounds will be swapped"
        );
    }

    let quota = &config.quota;
    for (key, value) in [
        ("quota.default_message_limit", quota.default_message_limit),
        ("quota.default_queue_limit", quota.default_queue_limit),
    ] {
        if value < -1 {
            errors.push(ConfigError::Validation {
                message: format!("{key} must be -1 (unlimited) or non-negative, got {value}"),
            });
        }
    }
    if quota.low_quota_percent == 0 || quota.low_quota_percent > 100 {
        errors.push(ConfigError::Validation {
            message: format!(
                "quota.low_quota_percent must be between 1 and 100, got {}",
                quota.low_quota_percent
            ),
        });
    }

    if config.channel.base_url.trim().is_empty() {
        errors.push(ConfigError::Validation {
            message: "channel.base_url must not be empty".to_string(),
        });
    } else if !config.channel.base_url.starts_with("http://")
        && !config.channel.base_url.starts_with("https://")
    {
        errors.push(ConfigError::Validation {
            message: format!(
                "channel.base_url `{}` must start with http:// or https://",
                config.channel.base_url
            ),
        });
    }
    if config.channel.timeout_secs == 0 {
        errors.push(ConfigError::Validation {
            message: "channel.timeout_secs must be at least 1".to_string(),
        });
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
