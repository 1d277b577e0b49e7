// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Storage adapter trait for the persistence store the dispatch core reads and writes.

use async_trait::async_trait;

use crate::error::CourierError;
use crate::traits::adapter::PluginAdapter;
use crate::types::{
    AccountProgress, ChannelSession, ConnectionStatus, DispatchSession, FailureKind, Message,
    NewSession, PauseState, Quota, SessionProgress,
};

/// Adapter for the persistence backend.
///
/// Every operation that changes a message's `status` or `is_deleted` flag
/// recomputes the counters of the affected dispatch sessions inside the same
/// unit of work, so counters never drift from the message rows.
#[async_trait]
pub trait StorageAdapter: PluginAdapter {
    /// Initializes the storage backend (migrations, connection).
    async fn initialize(&self) -> Result<(), CourierError>;

    /// Closes the storage backend, flushing pending writes.
    async fn close(&self) -> Result<(), CourierError>;

    // --- Channel sessions ---

    /// Creates the channel session of an account, or returns the existing one.
    async fn register_channel(&self, account_id: &str) -> Result<ChannelSession, CourierError>;

    async fn get_channel(&self, account_id: &str) -> Result<Option<ChannelSession>, CourierError>;

    async fn list_channels(&self) -> Result<Vec<ChannelSession>, CourierError>;

    async fn set_channel_pause(
        &self,
        account_id: &str,
        pause: &PauseState,
    ) -> Result<(), CourierError>;

    async fn set_connection_status(
        &self,
        account_id: &str,
        status: ConnectionStatus,
    ) -> Result<(), CourierError>;

    // --- Dispatch sessions ---

    /// Admits a session and its messages as `queued`, atomically checking quota.
    async fn start_session(&self, new: &NewSession) -> Result<DispatchSession, CourierError>;

    async fn get_session(&self, id: &str) -> Result<Option<DispatchSession>, CourierError>;

    /// Sessions of an account, oldest first.
    async fn list_sessions(&self, account_id: &str) -> Result<Vec<DispatchSession>, CourierError>;

    async fn set_session_pause(&self, id: &str, pause: &PauseState) -> Result<(), CourierError>;

    async fn cancel_session(&self, id: &str) -> Result<(), CourierError>;

    // --- Messages ---

    async fn get_message(&self, id: i64) -> Result<Option<Message>, CourierError>;

    /// Messages of a session in creation order, deleted ones included.
    async fn list_messages(&self, session_id: &str) -> Result<Vec<Message>, CourierError>;

    /// Up to `max_batch` queued, unpaused, undeleted messages whose session and
    /// channel are not paused, oldest session first, then creation order.
    async fn eligible_messages(&self, max_batch: usize) -> Result<Vec<Message>, CourierError>;

    /// Moves an eligible message `queued -> sending`, incrementing `attempts`
    /// and stamping `last_attempt_at`. Returns `None` if it is no longer eligible.
    async fn claim_message(&self, id: i64) -> Result<Option<Message>, CourierError>;

    /// `sending -> sent`, consuming one message allowance.
    async fn mark_sent(&self, id: i64, provider_id: &str) -> Result<(), CourierError>;

    /// `sending -> failed`, incrementing `failed_attempts`.
    async fn mark_failed(&self, id: i64, kind: FailureKind, detail: &str)
    -> Result<(), CourierError>;

    /// `sending -> queued`, keeping `attempts` and `failed_attempts`.
    async fn requeue(&self, id: i64, detail: Option<&str>) -> Result<(), CourierError>;

    /// `queued -> failed` for batch items the channel was never called for.
    /// Rows that are no longer queued are left alone. Returns the rows changed.
    async fn fail_unattempted(
        &self,
        ids: &[i64],
        kind: FailureKind,
        detail: &str,
    ) -> Result<usize, CourierError>;

    /// `failed -> queued` for up to `max_batch` failed messages with
    /// `failed_attempts < max_attempts` outside cancelled sessions.
    async fn requeue_failed(
        &self,
        max_attempts: u32,
        max_batch: usize,
    ) -> Result<usize, CourierError>;

    /// Operator-initiated `failed -> queued`, ignoring the attempt cap.
    async fn retry_message(&self, id: i64) -> Result<(), CourierError>;

    async fn set_message_pause(&self, id: i64, pause: &PauseState) -> Result<(), CourierError>;

    async fn soft_delete_message(&self, id: i64) -> Result<(), CourierError>;

    // --- Quota ---

    /// Quota of an account; accounts without a row get the configured defaults.
    async fn get_quota(&self, account_id: &str) -> Result<Quota, CourierError>;

    async fn set_quota_limits(
        &self,
        account_id: &str,
        message_limit: i64,
        queue_limit: i64,
    ) -> Result<(), CourierError>;

    // --- Read models ---

    async fn session_progress(&self, id: &str) -> Result<Option<SessionProgress>, CourierError>;

    async fn account_progress(&self, account_id: &str) -> Result<AccountProgress, CourierError>;
}
