// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Scripted channel sender for deterministic testing.
//!
//! `ScriptedChannel` implements `ChannelSender` by replaying outcomes queued
//! with [`ScriptedChannel::push_send`] and [`ScriptedChannel::push_probe`].
//! Once a script runs dry, sends succeed with a fresh provider id and probes
//! report a healthy channel. Every call is captured for assertions.
//!
//! [`ScriptedChannel::hold_next_send`] keeps the next send in flight until
//! the test releases it, for checking what else may run meanwhile.

use std::collections::VecDeque;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{Mutex, Notify};

use courier_core::types::{AdapterType, HealthStatus, Recipient};
use courier_core::{ChannelSender, CourierError, Outcome, PluginAdapter, Probe};

/// One captured `send` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentCall {
    pub account_id: String,
    pub phone: String,
    pub content: String,
}

type Scripted = Result<Outcome, String>;

/// A send held in flight by [`ScriptedChannel::hold_next_send`].
#[derive(Debug, Default)]
pub struct SendGate {
    entered: Notify,
    release: Notify,
}

impl SendGate {
    /// Resolves once the held send has reached the channel.
    pub async fn entered(&self) {
        self.entered.notified().await;
    }

    /// Let the held send return.
    pub fn release(&self) {
        self.release.notify_one();
    }
}

/// A channel sender that answers from a script.
#[derive(Clone, Default)]
pub struct ScriptedChannel {
    sends: Arc<Mutex<VecDeque<Scripted>>>,
    probes: Arc<Mutex<VecDeque<Scripted>>>,
    calls: Arc<Mutex<Vec<SentCall>>>,
    probe_calls: Arc<Mutex<Vec<String>>>,
    gate: Arc<Mutex<Option<Arc<SendGate>>>>,
}

impl ScriptedChannel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue the outcome of the next unscripted `send`.
    pub async fn push_send(&self, outcome: Outcome) {
        self.sends.lock().await.push_back(Ok(outcome));
    }

    /// Queue several send outcomes in order.
    pub async fn push_sends(&self, outcomes: impl IntoIterator<Item = Outcome>) {
        self.sends.lock().await.extend(outcomes.into_iter().map(Ok));
    }

    /// Make the next `send` fail as a broken adapter.
    pub async fn push_send_error(&self, message: &str) {
        self.sends.lock().await.push_back(Err(message.to_string()));
    }

    /// Queue the outcome of the next `probe`.
    pub async fn push_probe(&self, outcome: Outcome) {
        self.probes.lock().await.push_back(Ok(outcome));
    }

    /// Block the next `send` after it is recorded, until the gate is released.
    pub async fn hold_next_send(&self) -> Arc<SendGate> {
        let gate = Arc::new(SendGate::default());
        *self.gate.lock().await = Some(Arc::clone(&gate));
        gate
    }

    /// All captured `send` calls, in order.
    pub async fn calls(&self) -> Vec<SentCall> {
        self.calls.lock().await.clone()
    }

    pub async fn send_count(&self) -> usize {
        self.calls.lock().await.len()
    }

    pub async fn probe_count(&self) -> usize {
        self.probe_calls.lock().await.len()
    }
}

fn replay(next: Option<Scripted>, fallback: Outcome) -> Result<Outcome, CourierError> {
    match next {
        Some(Ok(outcome)) => Ok(outcome),
        Some(Err(message)) => Err(CourierError::Channel {
            message,
            source: None,
        }),
        None => Ok(fallback),
    }
}

#[async_trait]
impl PluginAdapter for ScriptedChannel {
    fn name(&self) -> &str {
        "scripted-channel"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Channel
    }

    async fn health_check(&self) -> Result<HealthStatus, CourierError> {
        Ok(HealthStatus::Healthy)
    }

    async fn shutdown(&self) -> Result<(), CourierError> {
        Ok(())
    }
}

#[async_trait]
impl ChannelSender for ScriptedChannel {
    async fn send(
        &self,
        account_id: &str,
        recipient: &Recipient,
        content: &str,
    ) -> Result<Outcome, CourierError> {
        self.calls.lock().await.push(SentCall {
            account_id: account_id.to_string(),
            phone: recipient.phone.clone(),
            content: content.to_string(),
        });
        let gate = self.gate.lock().await.take();
        if let Some(gate) = gate {
            gate.entered.notify_one();
            gate.release.notified().await;
        }
        let next = self.sends.lock().await.pop_front();
        replay(
            next,
            Outcome::Success {
                provider_id: format!("scripted-{}", uuid::Uuid::new_v4()),
            },
        )
    }

    async fn probe(&self, account_id: &str, _probe: &Probe) -> Result<Outcome, CourierError> {
        self.probe_calls.lock().await.push(account_id.to_string());
        let next = self.probes.lock().await.pop_front();
        replay(
            next,
            Outcome::Success {
                provider_id: String::new(),
            },
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ana() -> Recipient {
        Recipient {
            name: "Ana".into(),
            phone: "5551234".into(),
            country_code: "1".into(),
        }
    }

    #[tokio::test]
    async fn replays_script_then_succeeds() {
        let channel = ScriptedChannel::new();
        channel
            .push_send(Outcome::PendingNet("socket closed".into()))
            .await;
        channel.push_send_error("driver crashed").await;

        let first = channel.send("acc", &ana(), "hi").await.unwrap();
        assert_eq!(first, Outcome::PendingNet("socket closed".into()));
        assert!(matches!(
            channel.send("acc", &ana(), "hi").await,
            Err(CourierError::Channel { .. })
        ));
        let third = channel.send("acc", &ana(), "hi").await.unwrap();
        assert!(matches!(third, Outcome::Success { .. }));

        let calls = channel.calls().await;
        assert_eq!(calls.len(), 3);
        assert_eq!(calls[0].phone, "5551234");
    }

    #[tokio::test]
    async fn held_send_returns_after_release() {
        let channel = ScriptedChannel::new();
        let gate = channel.hold_next_send().await;
        let task = tokio::spawn({
            let channel = channel.clone();
            async move { channel.send("acc", &ana(), "hi").await }
        });

        gate.entered().await;
        assert_eq!(channel.send_count().await, 1);
        assert!(!task.is_finished());

        gate.release();
        assert!(matches!(task.await.unwrap(), Ok(Outcome::Success { .. })));
        // Only the next send is held.
        channel.send("acc", &ana(), "again").await.unwrap();
    }

    #[tokio::test]
    async fn probes_default_to_healthy() {
        let channel = ScriptedChannel::new();
        let outcome = channel.probe("acc", &Probe::Health).await.unwrap();
        assert!(!outcome.is_interruption());
        assert_eq!(channel.probe_count().await, 1);
        assert_eq!(channel.send_count().await, 0);
    }
}
