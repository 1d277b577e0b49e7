// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Pause/resume coordination across the global, session, and message scopes.
//!
//! Persisted pause state lives in storage. The coordinator adds two pieces of
//! in-memory state: a per-account channel lock (the channel is
//! single-concurrency, so every send and probe holds it) and a short-lived
//! network pause set after `PendingNET`, which is never persisted.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use courier_core::types::{ChannelSession, Message, PauseReason, PauseScope, PauseState};
use courier_core::{ChannelSender, ConnectionStatus, CourierError, Outcome, Probe, StorageAdapter};
use serde::Serialize;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Actor recorded on pauses the engine sets on its own.
pub const DISPATCHER: &str = "dispatcher";

/// Which scope is holding a message back, and why.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Blocker {
    pub scope: PauseScope,
    pub reason: PauseReason,
}

impl Blocker {
    fn new(scope: PauseScope, reason: PauseReason) -> Self {
        Self { scope, reason }
    }
}

pub struct PauseCoordinator {
    storage: Arc<dyn StorageAdapter>,
    network_pause: Duration,
    channel_locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
    network_paused_until: Mutex<HashMap<String, Instant>>,
}

impl PauseCoordinator {
    pub fn new(storage: Arc<dyn StorageAdapter>, network_pause: Duration) -> Self {
        Self {
            storage,
            network_pause,
            channel_locks: Mutex::new(HashMap::new()),
            network_paused_until: Mutex::new(HashMap::new()),
        }
    }

    /// Wait for the account's channel to be free and hold it until the guard drops.
    pub async fn lock_channel(&self, account_id: &str) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.channel_locks.lock().await;
            Arc::clone(locks.entry(account_id.to_string()).or_default())
        };
        lock.lock_owned().await
    }

    async fn require_channel(&self, account_id: &str) -> Result<ChannelSession, CourierError> {
        self.storage
            .get_channel(account_id)
            .await?
            .ok_or_else(|| CourierError::NotFound {
                entity: "channel session",
                id: account_id.to_string(),
            })
    }

    // --- Global scope ---

    pub async fn pause_global(
        &self,
        account_id: &str,
        reason: PauseReason,
        by: Option<&str>,
    ) -> Result<(), CourierError> {
        self.storage
            .set_channel_pause(account_id, &PauseState::paused(reason.clone(), by))
            .await?;
        info!(account = account_id, reason = %reason, "global pause set");
        Ok(())
    }

    /// Resume the account's channel. Only a resumable channel may be resumed.
    ///
    /// Paused sessions and messages stay paused.
    pub async fn resume_global(&self, account_id: &str) -> Result<(), CourierError> {
        let channel = self.require_channel(account_id).await?;
        if !channel.pause.is_paused() {
            self.clear_network_pause(account_id).await;
            return Ok(());
        }
        if !channel.is_resumable() {
            let reason = match (&channel.pause, channel.connection) {
                (_, ConnectionStatus::Pending) => "channel is waiting for re-authentication".to_string(),
                (_, ConnectionStatus::Disconnected) => "channel is disconnected".to_string(),
                (PauseState::Paused { reason, .. }, _) => format!("{reason} is still in progress"),
                (PauseState::NotPaused, _) => "channel is not paused".to_string(),
            };
            return Err(CourierError::NotResumable {
                scope: PauseScope::Global,
                reason,
            });
        }
        self.storage
            .set_channel_pause(account_id, &PauseState::NotPaused)
            .await?;
        self.clear_network_pause(account_id).await;
        info!(account = account_id, "global pause cleared");
        Ok(())
    }

    /// Record a completed re-authentication. Does not resume.
    pub async fn mark_authenticated(&self, account_id: &str) -> Result<(), CourierError> {
        self.storage
            .set_connection_status(account_id, ConnectionStatus::Connected)
            .await?;
        info!(account = account_id, "channel re-authenticated");
        Ok(())
    }

    // --- Session scope ---

    pub async fn pause_session(
        &self,
        session_id: &str,
        reason: PauseReason,
        by: Option<&str>,
    ) -> Result<(), CourierError> {
        self.storage
            .set_session_pause(session_id, &PauseState::paused(reason.clone(), by))
            .await?;
        info!(session = session_id, reason = %reason, "session paused");
        Ok(())
    }

    /// Does not lift a global pause on the session's account.
    pub async fn resume_session(&self, session_id: &str) -> Result<(), CourierError> {
        self.storage
            .set_session_pause(session_id, &PauseState::NotPaused)
            .await?;
        info!(session = session_id, "session resumed");
        Ok(())
    }

    // --- Message scope ---

    /// A message already `sending` finishes its current attempt; the pause
    /// applies from the next one.
    pub async fn pause_message(
        &self,
        message_id: i64,
        reason: PauseReason,
        by: Option<&str>,
    ) -> Result<(), CourierError> {
        self.storage
            .set_message_pause(message_id, &PauseState::paused(reason.clone(), by))
            .await?;
        debug!(message = message_id, reason = %reason, "message paused");
        Ok(())
    }

    pub async fn resume_message(&self, message_id: i64) -> Result<(), CourierError> {
        self.storage
            .set_message_pause(message_id, &PauseState::NotPaused)
            .await?;
        debug!(message = message_id, "message resumed");
        Ok(())
    }

    // --- Transient network pause ---

    pub async fn pause_network(&self, account_id: &str) {
        let until = Instant::now() + self.network_pause;
        self.network_paused_until
            .lock()
            .await
            .insert(account_id.to_string(), until);
        warn!(
            account = account_id,
            pause_secs = self.network_pause.as_secs(),
            "channel unreachable, pausing account in memory"
        );
    }

    /// Whether the in-memory network pause is active. Expired entries are dropped.
    pub async fn network_paused(&self, account_id: &str) -> bool {
        let mut paused = self.network_paused_until.lock().await;
        let expired = match paused.get(account_id) {
            Some(until) => Instant::now() >= *until,
            None => return false,
        };
        if expired {
            paused.remove(account_id);
            debug!(account = account_id, "network pause expired");
        }
        !expired
    }

    pub async fn clear_network_pause(&self, account_id: &str) {
        self.network_paused_until.lock().await.remove(account_id);
    }

    // --- Effective pause ---

    /// What blocks every message of an account, if anything.
    pub async fn global_blocker(&self, account_id: &str) -> Result<Option<Blocker>, CourierError> {
        if self.network_paused(account_id).await {
            return Ok(Some(Blocker::new(PauseScope::Global, PauseReason::NetworkLost)));
        }
        Ok(match self.storage.get_channel(account_id).await? {
            None => Some(Blocker::new(
                PauseScope::Global,
                PauseReason::Other("channel not registered".into()),
            )),
            Some(channel) => channel
                .pause
                .reason()
                .map(|reason| Blocker::new(PauseScope::Global, reason.clone())),
        })
    }

    /// The outermost scope pausing `message`, checked global, session, message.
    pub async fn blocker_for(&self, message: &Message) -> Result<Option<Blocker>, CourierError> {
        if let Some(blocker) = self.global_blocker(&message.account_id).await? {
            return Ok(Some(blocker));
        }
        if let Some(session) = self.storage.get_session(&message.session_id).await? {
            if let Some(reason) = session.pause.reason() {
                return Ok(Some(Blocker::new(PauseScope::Session, reason.clone())));
            }
        }
        Ok(message
            .pause
            .reason()
            .map(|reason| Blocker::new(PauseScope::Message, reason.clone())))
    }

    /// Global pause OR session pause OR message pause.
    pub async fn effective_pause(&self, message: &Message) -> Result<bool, CourierError> {
        Ok(self.blocker_for(message).await?.is_some())
    }

    // --- Interruptions and probes ---

    /// Apply the account-wide effect of an interrupting outcome.
    ///
    /// `PendingQR` persists an auth pause and a pending connection.
    /// `PendingNET` only pauses in memory.
    pub async fn handle_interruption(
        &self,
        account_id: &str,
        outcome: &Outcome,
    ) -> Result<(), CourierError> {
        match outcome {
            Outcome::PendingQr(detail) => {
                self.storage
                    .set_channel_pause(
                        account_id,
                        &PauseState::paused(PauseReason::AuthRequired, Some(DISPATCHER)),
                    )
                    .await?;
                self.storage
                    .set_connection_status(account_id, ConnectionStatus::Pending)
                    .await?;
                warn!(account = account_id, detail = %detail, "channel requires re-authentication");
            }
            Outcome::PendingNet(_) => self.pause_network(account_id).await,
            _ => {}
        }
        Ok(())
    }

    /// Run an out-of-band probe without overlapping any send.
    ///
    /// Waits for the in-flight item, forces a `channel_check` pause for the
    /// duration of the probe, then restores whatever pause state was there
    /// before. An interrupting result is applied after the restore.
    pub async fn run_probe(
        &self,
        account_id: &str,
        sender: &dyn ChannelSender,
        probe: &Probe,
    ) -> Result<Outcome, CourierError> {
        let _guard = self.lock_channel(account_id).await;
        let saved = self.require_channel(account_id).await?.pause;

        self.storage
            .set_channel_pause(
                account_id,
                &PauseState::paused(PauseReason::ChannelCheck, Some(DISPATCHER)),
            )
            .await?;
        debug!(account = account_id, ?probe, "channel probe started");
        let result = sender.probe(account_id, probe).await;
        self.storage.set_channel_pause(account_id, &saved).await?;

        let outcome = result?;
        debug!(account = account_id, outcome = outcome.label(), "channel probe finished");
        if outcome.is_interruption() {
            self.handle_interruption(account_id, &outcome).await?;
        }
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use courier_config::model::{QuotaConfig, StorageConfig};
    use courier_core::types::{NewMessage, NewSession, Recipient};
    use courier_core::{AdapterType, HealthStatus, PluginAdapter};
    use courier_storage::SqliteStorage;

    struct FixedProbe(Outcome);

    #[async_trait::async_trait]
    impl PluginAdapter for FixedProbe {
        fn name(&self) -> &str {
            "fixed"
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

    #[async_trait::async_trait]
    impl ChannelSender for FixedProbe {
        async fn send(&self, _: &str, _: &Recipient, _: &str) -> Result<Outcome, CourierError> {
            Ok(self.0.clone())
        }
        async fn probe(&self, _: &str, _: &Probe) -> Result<Outcome, CourierError> {
            Ok(self.0.clone())
        }
    }

    async fn setup() -> (Arc<SqliteStorage>, PauseCoordinator, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let storage = Arc::new(SqliteStorage::new(
            StorageConfig {
                database_path: dir.path().join("pause.db").to_string_lossy().into_owned(),
                wal_mode: true,
            },
            QuotaConfig::default(),
        ));
        storage.initialize().await.unwrap();
        storage.register_channel("acc").await.unwrap();
        let coordinator = PauseCoordinator::new(storage.clone(), Duration::from_secs(30));
        (storage, coordinator, dir)
    }

    async fn one_message(storage: &SqliteStorage) -> Message {
        let session = storage
            .start_session(&NewSession {
                account_id: "acc".into(),
                queue_id: "q".into(),
                messages: vec![NewMessage {
                    recipient: Recipient {
                        name: "Ana".into(),
                        phone: "5550000".into(),
                        country_code: "1".into(),
                    },
                    content: "hello".into(),
                }],
            })
            .await
            .unwrap();
        storage.list_messages(&session.id).await.unwrap().remove(0)
    }

    #[tokio::test]
    async fn effective_pause_is_monotone_across_scopes() {
        let (storage, coordinator, _dir) = setup().await;
        let message = one_message(&storage).await;
        assert!(!coordinator.effective_pause(&message).await.unwrap());

        coordinator
            .pause_global("acc", PauseReason::Manual, Some("ops"))
            .await
            .unwrap();
        coordinator
            .pause_session(&message.session_id, PauseReason::Manual, None)
            .await
            .unwrap();

        // Resuming the session leaves the global pause in control.
        coordinator.resume_session(&message.session_id).await.unwrap();
        let blocker = coordinator.blocker_for(&message).await.unwrap().unwrap();
        assert_eq!(blocker.scope, PauseScope::Global);

        // Resuming global does not resume a paused session.
        coordinator
            .pause_session(&message.session_id, PauseReason::Manual, None)
            .await
            .unwrap();
        coordinator.resume_global("acc").await.unwrap();
        let blocker = coordinator.blocker_for(&message).await.unwrap().unwrap();
        assert_eq!(blocker.scope, PauseScope::Session);

        coordinator.resume_session(&message.session_id).await.unwrap();
        coordinator
            .pause_message(message.id, PauseReason::Other("check number".into()), None)
            .await
            .unwrap();
        let message = storage.get_message(message.id).await.unwrap().unwrap();
        let blocker = coordinator.blocker_for(&message).await.unwrap().unwrap();
        assert_eq!(blocker.scope, PauseScope::Message);
        assert_eq!(blocker.reason, PauseReason::Other("check number".into()));

        coordinator.resume_message(message.id).await.unwrap();
        let message = storage.get_message(message.id).await.unwrap().unwrap();
        assert!(!coordinator.effective_pause(&message).await.unwrap());
    }

    #[tokio::test]
    async fn pending_connection_is_not_resumable() {
        let (storage, coordinator, _dir) = setup().await;
        coordinator
            .handle_interruption("acc", &Outcome::PendingQr("scan".into()))
            .await
            .unwrap();
        let channel = storage.get_channel("acc").await.unwrap().unwrap();
        assert_eq!(channel.connection, ConnectionStatus::Pending);
        assert_eq!(channel.pause.reason(), Some(&PauseReason::AuthRequired));

        let err = coordinator.resume_global("acc").await.unwrap_err();
        assert!(matches!(
            err,
            CourierError::NotResumable {
                scope: PauseScope::Global,
                ..
            }
        ));

        coordinator.mark_authenticated("acc").await.unwrap();
        coordinator.resume_global("acc").await.unwrap();
        assert!(coordinator.global_blocker("acc").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn network_pause_is_memory_only_and_expires() {
        let (storage, coordinator, _dir) = setup().await;
        tokio::time::pause();
        coordinator
            .handle_interruption("acc", &Outcome::PendingNet("offline".into()))
            .await
            .unwrap();
        let channel = storage.get_channel("acc").await.unwrap().unwrap();
        assert_eq!(channel.pause, PauseState::NotPaused);
        assert_eq!(channel.connection, ConnectionStatus::Connected);
        assert_eq!(
            coordinator.global_blocker("acc").await.unwrap().unwrap().reason,
            PauseReason::NetworkLost
        );

        tokio::time::advance(Duration::from_secs(31)).await;
        assert!(!coordinator.network_paused("acc").await);
    }

    #[tokio::test]
    async fn probe_restores_previous_pause() {
        let (storage, coordinator, _dir) = setup().await;
        let healthy = FixedProbe(Outcome::Success {
            provider_id: String::new(),
        });

        coordinator.run_probe("acc", &healthy, &Probe::Health).await.unwrap();
        let channel = storage.get_channel("acc").await.unwrap().unwrap();
        assert_eq!(channel.pause, PauseState::NotPaused);

        coordinator
            .pause_global("acc", PauseReason::Manual, Some("ops"))
            .await
            .unwrap();
        let before = storage.get_channel("acc").await.unwrap().unwrap().pause;
        coordinator.run_probe("acc", &healthy, &Probe::Health).await.unwrap();
        let after = storage.get_channel("acc").await.unwrap().unwrap().pause;
        assert_eq!(before, after);
    }

    #[tokio::test]
    async fn probe_reporting_auth_loss_pauses_channel() {
        let (storage, coordinator, _dir) = setup().await;
        let logged_out = FixedProbe(Outcome::PendingQr("logged out".into()));
        let outcome = coordinator
            .run_probe("acc", &logged_out, &Probe::Health)
            .await
            .unwrap();
        assert!(outcome.is_interruption());
        let channel = storage.get_channel("acc").await.unwrap().unwrap();
        assert_eq!(channel.pause.reason(), Some(&PauseReason::AuthRequired));
        assert!(!channel.is_resumable());
    }

    #[tokio::test]
    async fn unregistered_account_is_blocked() {
        let (_storage, coordinator, _dir) = setup().await;
        let blocker = coordinator.global_blocker("ghost").await.unwrap().unwrap();
        assert_eq!(blocker.scope, PauseScope::Global);
        assert!(coordinator.resume_global("ghost").await.is_err());
    }
}
