// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The dispatch loop: batch selection, sending, retry, and throttling.
//!
//! Accounts are processed concurrently, each one strictly sequentially
//! while holding its channel lock for the duration of every item.
//! Interruptions (`PendingQR`, `PendingNET`) end an account's batch and fail
//! its untouched items without calling the channel again.

use std::sync::Arc;
use std::time::Duration;

use courier_config::model::{DispatchConfig, QuotaConfig};
use courier_core::types::{Allowance, DispatchSession, Message, NewSession, PauseReason, PauseScope};
use courier_core::{
    ChannelSender, CourierError, FailureKind, MessageStatus, Outcome, Probe, QuotaChecker,
    SessionStatus, StorageAdapter,
};
use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::condition::{plan_messages, Candidate, TemplateSet};
use crate::pause::{Blocker, PauseCoordinator};
use crate::throttle::DelayWindow;

/// Counts from one `process_queued` run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DispatchReport {
    /// Messages in the eligible batch.
    pub selected: usize,
    pub sent: usize,
    /// Channel was called and the message ended up `failed`.
    pub failed: usize,
    /// Sent back to `queued` (`PendingQR`, exhausted `Waiting`).
    pub requeued: usize,
    /// Failed without a channel call after an interruption.
    pub short_circuited: usize,
    /// Left `queued`: blocked by a pause, out of quota, or no longer eligible.
    pub not_attempted: usize,
    /// Accounts whose batch stopped on an interruption.
    pub interrupted_accounts: usize,
    /// Accounts whose batch aborted on a storage error.
    pub errored_accounts: usize,
}

impl DispatchReport {
    pub fn is_noop(&self) -> bool {
        self.selected == 0
    }

    fn merge(&mut self, other: DispatchReport) {
        self.selected += other.selected;
        self.sent += other.sent;
        self.failed += other.failed;
        self.requeued += other.requeued;
        self.short_circuited += other.short_circuited;
        self.not_attempted += other.not_attempted;
        self.interrupted_accounts += other.interrupted_accounts;
        self.errored_accounts += other.errored_accounts;
    }
}

/// Whether a single message would be picked up by the next batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "eligibility", rename_all = "snake_case")]
pub enum Eligibility {
    Eligible,
    Blocked { scope: PauseScope, reason: PauseReason },
    NotQueued { status: MessageStatus },
    Deleted,
    SessionCancelled,
}

impl Eligibility {
    pub fn is_eligible(&self) -> bool {
        matches!(self, Self::Eligible)
    }
}

impl From<Blocker> for Eligibility {
    fn from(blocker: Blocker) -> Self {
        Self::Blocked {
            scope: blocker.scope,
            reason: blocker.reason,
        }
    }
}

pub struct DispatchEngine {
    storage: Arc<dyn StorageAdapter>,
    quota: Arc<dyn QuotaChecker>,
    sender: Arc<dyn ChannelSender>,
    coordinator: Arc<PauseCoordinator>,
    config: DispatchConfig,
    low_quota_percent: u8,
    throttle: DelayWindow,
}

impl DispatchEngine {
    pub fn new(
        storage: Arc<dyn StorageAdapter>,
        quota: Arc<dyn QuotaChecker>,
        sender: Arc<dyn ChannelSender>,
        config: DispatchConfig,
        quota_config: &QuotaConfig,
    ) -> Self {
        let coordinator = Arc::new(PauseCoordinator::new(
            Arc::clone(&storage),
            Duration::from_secs(config.network_pause_secs),
        ));
        let throttle = DelayWindow::new(config.min_delay_ms, config.max_delay_ms);
        Self {
            storage,
            quota,
            sender,
            coordinator,
            config,
            low_quota_percent: quota_config.low_quota_percent,
            throttle,
        }
    }

    pub fn coordinator(&self) -> &Arc<PauseCoordinator> {
        &self.coordinator
    }

    pub fn config(&self) -> &DispatchConfig {
        &self.config
    }

    // --- Admission ---

    /// Queue a new session after checking the account's remaining allowance.
    pub async fn admit(&self, new: &NewSession) -> Result<DispatchSession, CourierError> {
        for message in &new.messages {
            message.validate()?;
        }
        let requested = new.messages.len() as i64;
        let remaining = self.quota.remaining(&new.account_id).await?;
        if remaining != Allowance::UNLIMITED && remaining < requested {
            return Err(CourierError::QuotaExceeded {
                account: new.account_id.clone(),
                requested,
                remaining,
            });
        }
        self.storage.start_session(new).await
    }

    /// Select recipients and render their messages, then admit them.
    pub async fn admit_planned(
        &self,
        account_id: &str,
        queue_id: &str,
        candidates: &[Candidate],
        cqp: Option<i64>,
        templates: &TemplateSet,
    ) -> Result<DispatchSession, CourierError> {
        let messages = plan_messages(candidates, cqp, templates);
        debug!(
            account = account_id,
            queue = queue_id,
            candidates = candidates.len(),
            planned = messages.len(),
            "planned messages"
        );
        self.admit(&NewSession {
            account_id: account_id.to_string(),
            queue_id: queue_id.to_string(),
            messages,
        })
        .await
    }

    // --- Dispatch ---

    /// Automatic retry: re-queue failed messages below the attempt cap.
    pub async fn retry_failed(&self, max_batch: usize) -> Result<usize, CourierError> {
        self.storage
            .requeue_failed(self.config.max_attempts, max_batch)
            .await
    }

    /// Send up to `max_batch` eligible messages.
    ///
    /// With nothing eligible this touches no rows.
    pub async fn process_queued(&self, max_batch: usize) -> Result<DispatchReport, CourierError> {
        let batch = self.storage.eligible_messages(max_batch).await?;
        if batch.is_empty() {
            return Ok(DispatchReport::default());
        }

        let mut by_account: Vec<(String, Vec<Message>)> = Vec::new();
        for message in batch {
            match by_account.iter_mut().find(|(account, _)| *account == message.account_id) {
                Some((_, items)) => items.push(message),
                None => by_account.push((message.account_id.clone(), vec![message])),
            }
        }

        let runs = by_account
            .into_iter()
            .map(|(account, items)| async move {
                let selected = items.len();
                match self.dispatch_account(&account, items).await {
                    Ok(report) => report,
                    Err(e) => {
                        error!(account = %account, error = %e, "account batch aborted");
                        DispatchReport {
                            selected,
                            errored_accounts: 1,
                            ..DispatchReport::default()
                        }
                    }
                }
            });

        let mut report = DispatchReport::default();
        for account_report in futures::future::join_all(runs).await {
            report.merge(account_report);
        }
        info!(
            selected = report.selected,
            sent = report.sent,
            failed = report.failed,
            requeued = report.requeued,
            short_circuited = report.short_circuited,
            not_attempted = report.not_attempted,
            "dispatch batch finished"
        );
        Ok(report)
    }

    async fn dispatch_account(
        &self,
        account: &str,
        items: Vec<Message>,
    ) -> Result<DispatchReport, CourierError> {
        let mut report = DispatchReport {
            selected: items.len(),
            ..DispatchReport::default()
        };
        let ids: Vec<i64> = items.iter().map(|m| m.id).collect();
        let mut attempted_any = false;

        for (idx, item) in items.iter().enumerate() {
            if attempted_any {
                self.throttle.wait().await;
                if self.config.probe_between_sends {
                    if let Some(outcome) = self.probe_between_sends(account).await? {
                        let detail = outcome.error_text();
                        report.short_circuited += self
                            .storage
                            .fail_unattempted(&ids[idx..], FailureKind::Interrupted, &detail)
                            .await?;
                        report.interrupted_accounts = 1;
                        warn!(account, outcome = outcome.label(), "health probe interrupted the batch");
                        break;
                    }
                }
            }

            if let Some(blocker) = self.coordinator.global_blocker(account).await? {
                report.not_attempted += items.len() - idx;
                info!(account, reason = %blocker.reason, "account paused, stopping batch");
                break;
            }

            let remaining = self.quota.remaining(account).await?;
            if remaining == 0 {
                report.not_attempted += items.len() - idx;
                warn!(account, "message quota exhausted, stopping batch");
                break;
            }

            let _channel = self.coordinator.lock_channel(account).await;
            let Some(message) = self.storage.claim_message(item.id).await? else {
                debug!(account, message = item.id, "message no longer eligible");
                report.not_attempted += 1;
                continue;
            };
            attempted_any = true;
            debug!(
                account,
                message = message.id,
                attempt = message.attempts,
                "sending message"
            );

            let result = self.send_with_waiting(&message).await;
            let rest = &ids[idx + 1..];
            match result {
                Ok(Outcome::Success { provider_id }) => {
                    self.storage.mark_sent(message.id, &provider_id).await?;
                    report.sent += 1;
                    debug!(account, message = message.id, outcome = "Success", "message sent");
                    self.warn_if_quota_low(account).await?;
                }
                Ok(outcome @ Outcome::Failure(_)) => {
                    self.storage
                        .mark_failed(message.id, FailureKind::Provider, &outcome.error_text())
                        .await?;
                    report.failed += 1;
                    debug!(account, message = message.id, outcome = outcome.label(), "message failed");
                }
                Ok(outcome @ Outcome::Waiting(_)) => {
                    let detail = outcome.error_text();
                    self.storage.requeue(message.id, Some(detail.as_str())).await?;
                    report.requeued += 1;
                    debug!(account, message = message.id, "channel still busy, message requeued");
                }
                Ok(outcome @ Outcome::PendingQr(_)) => {
                    let detail = outcome.error_text();
                    self.storage.requeue(message.id, Some(detail.as_str())).await?;
                    report.requeued += 1;
                    self.coordinator.handle_interruption(account, &outcome).await?;
                    report.short_circuited += self
                        .storage
                        .fail_unattempted(rest, FailureKind::Auth, &detail)
                        .await?;
                    report.interrupted_accounts = 1;
                    break;
                }
                Ok(outcome @ Outcome::PendingNet(_)) => {
                    let detail = outcome.error_text();
                    self.storage
                        .mark_failed(message.id, FailureKind::Network, &detail)
                        .await?;
                    report.failed += 1;
                    self.coordinator.handle_interruption(account, &outcome).await?;
                    report.short_circuited += self
                        .storage
                        .fail_unattempted(rest, FailureKind::Network, &detail)
                        .await?;
                    report.interrupted_accounts = 1;
                    break;
                }
                Err(e) => {
                    warn!(account, message = message.id, error = %e, "channel adapter error");
                    let detail = Outcome::Failure(e.to_string()).error_text();
                    self.storage
                        .mark_failed(message.id, FailureKind::Fatal, &detail)
                        .await?;
                    report.failed += 1;
                }
            }
        }

        info!(
            account,
            sent = report.sent,
            failed = report.failed,
            short_circuited = report.short_circuited,
            "account batch finished"
        );
        Ok(report)
    }

    /// Send once, re-sending the same attempt while the channel answers `Waiting`.
    async fn send_with_waiting(&self, message: &Message) -> Result<Outcome, CourierError> {
        let mut waits = 0;
        loop {
            let outcome = self
                .sender
                .send(&message.account_id, &message.recipient, &message.content)
                .await?;
            match outcome {
                Outcome::Waiting(_) if waits < self.config.max_waiting_retries => {
                    waits += 1;
                    debug!(message = message.id, waits, "channel busy, retrying same message");
                    tokio::time::sleep(Duration::from_millis(self.config.waiting_retry_delay_ms))
                        .await;
                }
                other => return Ok(other),
            }
        }
    }

    /// `Some(outcome)` when the probe reports an interruption.
    async fn probe_between_sends(&self, account: &str) -> Result<Option<Outcome>, CourierError> {
        match self
            .coordinator
            .run_probe(account, self.sender.as_ref(), &Probe::Health)
            .await
        {
            Ok(outcome) if outcome.is_interruption() => Ok(Some(outcome)),
            Ok(_) => Ok(None),
            Err(e @ CourierError::Storage { .. }) => Err(e),
            Err(e) => {
                warn!(account, error = %e, "health probe failed, continuing batch");
                Ok(None)
            }
        }
    }

    async fn warn_if_quota_low(&self, account: &str) -> Result<(), CourierError> {
        let quota = self.storage.get_quota(account).await?;
        if quota.messages.is_low(self.low_quota_percent) {
            warn!(
                account,
                consumed = quota.messages.consumed,
                limit = quota.messages.limit,
                percentage = quota.messages.percentage(),
                "message quota running low"
            );
        }
        Ok(())
    }

    // --- Inspection and probes ---

    /// Why a message would or would not be picked up by the next batch.
    pub async fn eligibility(&self, message_id: i64) -> Result<Eligibility, CourierError> {
        let message = self
            .storage
            .get_message(message_id)
            .await?
            .ok_or_else(|| CourierError::NotFound {
                entity: "message",
                id: message_id.to_string(),
            })?;
        if message.is_deleted {
            return Ok(Eligibility::Deleted);
        }
        if message.status != MessageStatus::Queued {
            return Ok(Eligibility::NotQueued {
                status: message.status,
            });
        }
        if let Some(session) = self.storage.get_session(&message.session_id).await? {
            if session.status == SessionStatus::Cancelled {
                return Ok(Eligibility::SessionCancelled);
            }
        }
        if let Some(blocker) = self.coordinator.blocker_for(&message).await? {
            return Ok(blocker.into());
        }
        if self.quota.remaining(&message.account_id).await? == 0 {
            return Ok(Eligibility::Blocked {
                scope: PauseScope::Global,
                reason: PauseReason::QuotaExhausted,
            });
        }
        Ok(Eligibility::Eligible)
    }

    /// Run a coordinated probe against an account's channel.
    pub async fn probe(&self, account_id: &str, probe: &Probe) -> Result<Outcome, CourierError> {
        self.coordinator
            .run_probe(account_id, self.sender.as_ref(), probe)
            .await
    }
}
