// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Core library for the Courier dispatch engine.
//!
//! This crate provides the error type, the domain types shared by storage and
//! dispatch (messages, dispatch sessions, channel sessions, quotas, pause
//! state, send outcomes), and the adapter traits at the seams where external
//! collaborators plug in.

pub mod error;
pub mod traits;
pub mod types;

// Re-export key items at crate root for ergonomic imports.
pub use error::CourierError;
pub use types::{
    AdapterType, ConnectionStatus, FailureKind, HealthStatus, MessageStatus, Outcome,
    PauseReason, PauseScope, PauseState, Probe, SessionStatus,
};

pub use traits::{ChannelSender, PluginAdapter, QuotaChecker, StorageAdapter};

/// Current UTC time in the ISO 8601 millisecond format used for every stored timestamp.
pub fn now_timestamp() -> String {
    chrono::Utc::now()
        .format("%Y-%m-%dT%H:%M:%S%.3fZ")
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn courier_error_has_all_variants() {
        let _config = CourierError::Config("test".into());
        let _storage = CourierError::Storage {
            source: Box::new(std::io::Error::other("test")),
        };
        let _channel = CourierError::Channel {
            message: "test".into(),
            source: None,
        };
        let _validation = CourierError::Validation("test".into());
        let _not_found = CourierError::NotFound {
            entity: "message",
            id: "1".into(),
        };
        let _quota = CourierError::QuotaExceeded {
            account: "acc".into(),
            requested: 2,
            remaining: 1,
        };
        let _resume = CourierError::NotResumable {
            scope: PauseScope::Global,
            reason: "pending".into(),
        };
        let _transition = CourierError::InvalidTransition {
            id: "1".into(),
            from: "sent".into(),
            to: "queued".into(),
        };
        let _timeout = CourierError::Timeout {
            duration: std::time::Duration::from_secs(30),
        };
        let _internal = CourierError::Internal("test".into());
    }

    #[test]
    fn timestamps_sort_lexicographically() {
        let a = now_timestamp();
        let b = now_timestamp();
        assert!(a <= b);
        assert!(a.ends_with('Z'));
        assert_eq!(a.len(), "2026-01-01T00:00:00.000Z".len());
    }

    #[test]
    fn all_trait_modules_are_exported() {
        fn _assert_plugin_adapter<T: PluginAdapter>() {}
        fn _assert_channel_sender<T: ChannelSender>() {}
        fn _assert_storage_adapter<T: StorageAdapter>() {}
        fn _assert_quota_checker<T: QuotaChecker>() {}
    }
}
