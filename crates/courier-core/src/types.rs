// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Domain types shared by the storage, dispatch, and channel crates.

use std::fmt;

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Health status reported by adapter health checks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HealthStatus {
    /// Adapter is fully operational.
    Healthy,
    /// Adapter is operational but experiencing issues.
    Degraded(String),
    /// Adapter is not operational.
    Unhealthy(String),
}

/// Identifies the kind of adapter behind a trait object.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
pub enum AdapterType {
    Channel,
    Storage,
}

// --- Status enums ---

/// Lifecycle of one outbound message: `queued -> sending -> {sent | failed}`.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum MessageStatus {
    Queued,
    Sending,
    Sent,
    Failed,
}

impl MessageStatus {
    /// `queued` and `sending` count towards a session's `ongoing` counter.
    pub fn is_ongoing(self) -> bool {
        matches!(self, Self::Queued | Self::Sending)
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Sent | Self::Failed)
    }
}

/// Status of a dispatch session (one run of sending to a queue's recipients).
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    Active,
    Paused,
    Completed,
    Cancelled,
}

impl SessionStatus {
    /// Completed and cancelled sessions never change status again.
    pub fn is_closed(self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled)
    }
}

/// Authentication state of an account's channel session.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum ConnectionStatus {
    Connected,
    /// Waiting for re-authentication (e.g. a QR scan).
    Pending,
    Disconnected,
}

/// Why a message ended up `failed`.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// The channel accepted the request and rejected the message.
    Provider,
    /// The channel was unreachable (`PendingNET`).
    Network,
    /// The channel requires re-authentication (`PendingQR`).
    Auth,
    /// The adapter itself errored out.
    Fatal,
    /// A health probe between sends reported an interruption.
    Interrupted,
}

// --- Pause state ---

/// The three independent pause scopes.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum PauseScope {
    Global,
    Session,
    Message,
}

/// Reason code attached to a pause, surfaced to operators.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum PauseReason {
    /// Paused by an operator.
    Manual,
    /// The channel asked for re-authentication.
    AuthRequired,
    /// The channel was unreachable.
    NetworkLost,
    /// An out-of-band channel probe is running.
    ChannelCheck,
    /// The account ran out of message allowance.
    QuotaExhausted,
    /// Free-form reason supplied by a caller.
    Other(String),
}

impl PauseReason {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Manual => "manual",
            Self::AuthRequired => "auth_required",
            Self::NetworkLost => "network_lost",
            Self::ChannelCheck => "channel_check",
            Self::QuotaExhausted => "quota_exhausted",
            Self::Other(reason) => reason,
        }
    }

    pub fn parse(code: &str) -> Self {
        match code {
            "manual" => Self::Manual,
            "auth_required" => Self::AuthRequired,
            "network_lost" => Self::NetworkLost,
            "channel_check" => Self::ChannelCheck,
            "quota_exhausted" => Self::QuotaExhausted,
            other => Self::Other(other.to_string()),
        }
    }
}

impl fmt::Display for PauseReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<String> for PauseReason {
    fn from(code: String) -> Self {
        Self::parse(&code)
    }
}

impl From<PauseReason> for String {
    fn from(reason: PauseReason) -> Self {
        reason.as_str().to_string()
    }
}

/// Pause state of a single scope.
///
/// Stored as four columns (`is_paused`, `pause_reason`, `paused_at`,
/// `paused_by`) and lifted into this enum on read.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum PauseState {
    NotPaused,
    Paused {
        reason: PauseReason,
        at: String,
        by: Option<String>,
    },
}

impl PauseState {
    /// A pause stamped with the current time.
    pub fn paused(reason: PauseReason, by: Option<&str>) -> Self {
        Self::Paused {
            reason,
            at: crate::now_timestamp(),
            by: by.map(str::to_string),
        }
    }

    pub fn is_paused(&self) -> bool {
        matches!(self, Self::Paused { .. })
    }

    pub fn reason(&self) -> Option<&PauseReason> {
        match self {
            Self::Paused { reason, .. } => Some(reason),
            Self::NotPaused => None,
        }
    }

    /// Build from the stored column set. A paused row without a reason reads as `manual`.
    pub fn from_columns(
        is_paused: bool,
        reason: Option<String>,
        at: Option<String>,
        by: Option<String>,
    ) -> Self {
        if !is_paused {
            return Self::NotPaused;
        }
        Self::Paused {
            reason: reason
                .map(PauseReason::from)
                .unwrap_or(PauseReason::Manual),
            at: at.unwrap_or_default(),
            by,
        }
    }

    /// Split into `(is_paused, reason, at, by)` column values.
    pub fn to_columns(&self) -> (bool, Option<String>, Option<String>, Option<String>) {
        match self {
            Self::NotPaused => (false, None, None, None),
            Self::Paused { reason, at, by } => (
                true,
                Some(reason.as_str().to_string()),
                Some(at.clone()),
                by.clone(),
            ),
        }
    }
}

// --- Channel boundary ---

/// Classified result of one channel operation (send or probe).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// Delivered; carries the provider's message id.
    Success { provider_id: String },
    /// Rejected by the channel. Retried up to the attempt cap.
    Failure(String),
    /// The channel needs re-authentication.
    PendingQr(String),
    /// The channel is unreachable.
    PendingNet(String),
    /// The channel is still busy with the previous action.
    Waiting(String),
}

impl Outcome {
    /// `PendingQR` and `PendingNET` stop the whole batch for the account.
    pub fn is_interruption(&self) -> bool {
        matches!(self, Self::PendingQr(_) | Self::PendingNet(_))
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Success { .. } => "Success",
            Self::Failure(_) => "Failure",
            Self::PendingQr(_) => "PendingQR",
            Self::PendingNet(_) => "PendingNET",
            Self::Waiting(_) => "Waiting",
        }
    }

    pub fn detail(&self) -> &str {
        match self {
            Self::Success { provider_id } => provider_id,
            Self::Failure(d) | Self::PendingQr(d) | Self::PendingNet(d) | Self::Waiting(d) => d,
        }
    }

    /// `"<label>: <detail>"`, the form stored in `error_message`.
    pub fn error_text(&self) -> String {
        if self.detail().is_empty() {
            self.label().to_string()
        } else {
            format!("{}: {}", self.label(), self.detail())
        }
    }
}

/// An out-of-band check run against the channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Probe {
    /// Is the channel still authenticated and reachable?
    Health,
    /// Is this phone number reachable on the channel?
    Reachability { phone: String, country_code: String },
}

// --- Rows ---

/// Recipient identity of one message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Recipient {
    pub name: String,
    pub phone: String,
    pub country_code: String,
}

impl Recipient {
    /// Reject recipients the channel could never deliver to.
    pub fn validate(&self) -> Result<(), crate::CourierError> {
        let phone = self.phone.trim();
        if phone.is_empty() {
            return Err(crate::CourierError::Validation(format!(
                "recipient `{}` has an empty phone number",
                self.name
            )));
        }
        if !phone.chars().all(|c| c.is_ascii_digit()) {
            return Err(crate::CourierError::Validation(format!(
                "recipient `{}` phone `{phone}` must contain digits only",
                self.name
            )));
        }
        let cc = self.country_code.trim().trim_start_matches('+');
        if cc.is_empty() || !cc.chars().all(|c| c.is_ascii_digit()) {
            return Err(crate::CourierError::Validation(format!(
                "recipient `{}` has an invalid country code `{}`",
                self.name, self.country_code
            )));
        }
        Ok(())
    }
}

/// One outbound notification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// Autoincrement id; ascending id is creation order.
    pub id: i64,
    pub queue_id: String,
    pub session_id: String,
    pub account_id: String,
    pub recipient: Recipient,
    /// Fully rendered content. Immutable once stored.
    pub content: String,
    pub status: MessageStatus,
    pub pause: PauseState,
    pub is_deleted: bool,
    /// Every claim for sending, whatever the outcome.
    pub attempts: u32,
    /// Attempts that ended `failed`. The automatic retry cap applies to these.
    pub failed_attempts: u32,
    pub last_attempt_at: Option<String>,
    pub sent_at: Option<String>,
    pub provider_id: Option<String>,
    pub error_message: Option<String>,
    pub failure_kind: Option<FailureKind>,
    pub created_at: String,
}

/// A message to admit into a new dispatch session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewMessage {
    pub recipient: Recipient,
    pub content: String,
}

impl NewMessage {
    pub fn validate(&self) -> Result<(), crate::CourierError> {
        self.recipient.validate()?;
        if self.content.trim().is_empty() {
            return Err(crate::CourierError::Validation(format!(
                "message for `{}` has empty content",
                self.recipient.name
            )));
        }
        Ok(())
    }
}

/// Request to start a dispatch session for a queue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewSession {
    pub account_id: String,
    pub queue_id: String,
    pub messages: Vec<NewMessage>,
}

/// Materialized counters of a dispatch session.
///
/// Always recomputed from the message rows; deleted messages are excluded
/// from every counter.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionCounters {
    pub total: i64,
    pub sent: i64,
    pub failed: i64,
    pub ongoing: i64,
}

impl std::ops::AddAssign for SessionCounters {
    fn add_assign(&mut self, rhs: Self) {
        self.total += rhs.total;
        self.sent += rhs.sent;
        self.failed += rhs.failed;
        self.ongoing += rhs.ongoing;
    }
}

/// One dispatch run over a queue's recipients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispatchSession {
    pub id: String,
    pub queue_id: String,
    pub account_id: String,
    pub status: SessionStatus,
    pub pause: PauseState,
    pub counters: SessionCounters,
    pub start_time: String,
    pub last_updated: String,
    pub end_time: Option<String>,
}

/// The single shared automation channel of an account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelSession {
    pub id: String,
    pub account_id: String,
    pub connection: ConnectionStatus,
    pub pause: PauseState,
    pub created_at: String,
    pub updated_at: String,
}

impl ChannelSession {
    /// Paused, connected, and not in the middle of a channel check.
    pub fn is_resumable(&self) -> bool {
        match &self.pause {
            PauseState::NotPaused => false,
            PauseState::Paused { reason, .. } => {
                self.connection == ConnectionStatus::Connected
                    && *reason != PauseReason::ChannelCheck
            }
        }
    }
}

/// A limit/consumed pair. A limit of `-1` means unlimited.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Allowance {
    pub limit: i64,
    pub consumed: i64,
}

impl Allowance {
    pub const UNLIMITED: i64 = -1;

    pub fn is_unlimited(&self) -> bool {
        self.limit == Self::UNLIMITED
    }

    /// Remaining allowance, `-1` when unlimited, never negative otherwise.
    pub fn remaining(&self) -> i64 {
        if self.is_unlimited() {
            Self::UNLIMITED
        } else {
            (self.limit - self.consumed).max(0)
        }
    }

    /// Consumed share of the limit in percent; 0 when unlimited.
    pub fn percentage(&self) -> f64 {
        if self.is_unlimited() {
            0.0
        } else if self.limit == 0 {
            100.0
        } else {
            self.consumed as f64 / self.limit as f64 * 100.0
        }
    }

    pub fn is_low(&self, threshold_percent: u8) -> bool {
        !self.is_unlimited() && self.percentage() > f64::from(threshold_percent)
    }

    /// Whether `n` more units fit.
    pub fn admits(&self, n: i64) -> bool {
        self.is_unlimited() || self.remaining() >= n
    }
}

/// Per-account message and queue allowances.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Quota {
    pub account_id: String,
    pub messages: Allowance,
    pub queues: Allowance,
}

// --- Read models ---

/// Progress of one dispatch session, as shown by listing endpoints.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionProgress {
    pub session_id: String,
    pub queue_id: String,
    pub status: SessionStatus,
    #[serde(flatten)]
    pub counters: SessionCounters,
    pub pause_reason: Option<String>,
    pub start_time: String,
    pub end_time: Option<String>,
}

impl From<&DispatchSession> for SessionProgress {
    fn from(session: &DispatchSession) -> Self {
        Self {
            session_id: session.id.clone(),
            queue_id: session.queue_id.clone(),
            status: session.status,
            counters: session.counters,
            pause_reason: session.pause.reason().map(|r| r.to_string()),
            start_time: session.start_time.clone(),
            end_time: session.end_time.clone(),
        }
    }
}

/// Aggregate progress of an account across all of its sessions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccountProgress {
    pub account_id: String,
    pub channel: Option<ChannelSession>,
    pub totals: SessionCounters,
    pub sessions: Vec<SessionProgress>,
    pub quota: Quota,
}
