// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! SQLite implementation of the StorageAdapter and QuotaChecker traits.

use async_trait::async_trait;
use tokio::sync::OnceCell;
use tracing::debug;

use courier_config::model::{QuotaConfig, StorageConfig};
use courier_core::types::{
    AccountProgress, ChannelSession, DispatchSession, Message, NewSession, Quota, SessionProgress,
};
use courier_core::{
    AdapterType, ConnectionStatus, CourierError, FailureKind, HealthStatus, PauseState,
    PluginAdapter, QuotaChecker, StorageAdapter,
};

use crate::database::{Database, TxError};
use crate::queries;

/// SQLite-backed storage adapter.
///
/// The database is opened by [`StorageAdapter::initialize`]; every other
/// call before that fails with a storage error. Quota defaults apply to
/// accounts that have no quota row yet.
pub struct SqliteStorage {
    config: StorageConfig,
    quota_defaults: QuotaConfig,
    db: OnceCell<Database>,
}

impl SqliteStorage {
    pub fn new(config: StorageConfig, quota_defaults: QuotaConfig) -> Self {
        Self {
            config,
            quota_defaults,
            db: OnceCell::new(),
        }
    }

    /// Returns the underlying Database, or an error if not initialized.
    fn db(&self) -> Result<&Database, CourierError> {
        self.db.get().ok_or_else(|| CourierError::Storage {
            source: "storage not initialized -- call initialize() first".into(),
        })
    }
}

#[async_trait]
impl PluginAdapter for SqliteStorage {
    fn name(&self) -> &str {
        "sqlite"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Storage
    }

    async fn health_check(&self) -> Result<HealthStatus, CourierError> {
        let db = self.db()?;
        db.connection()
            .call(|conn| -> Result<(), TxError> {
                conn.execute_batch("SELECT 1;")?;
                Ok(())
            })
            .await
            .map_err(crate::database::map_tr_err)?;
        Ok(HealthStatus::Healthy)
    }

    async fn shutdown(&self) -> Result<(), CourierError> {
        if let Some(db) = self.db.get() {
            db.checkpoint().await?;
            debug!("shutdown: WAL checkpoint complete");
        }
        Ok(())
    }
}

#[async_trait]
impl StorageAdapter for SqliteStorage {
    async fn initialize(&self) -> Result<(), CourierError> {
        let path = self.config.database_path.clone();
        let db = Database::open_with(&path, self.config.wal_mode).await?;
        self.db.set(db).map_err(|_| CourierError::Storage {
            source: "storage already initialized".into(),
        })?;
        debug!(path = %self.config.database_path, "SQLite storage initialized");
        Ok(())
    }

    async fn close(&self) -> Result<(), CourierError> {
        self.db()?.checkpoint().await?;
        debug!("WAL checkpoint complete");
        Ok(())
    }

    // --- Channel sessions ---

    async fn register_channel(&self, account_id: &str) -> Result<ChannelSession, CourierError> {
        queries::channels::register_channel(self.db()?, account_id).await
    }

    async fn get_channel(&self, account_id: &str) -> Result<Option<ChannelSession>, CourierError> {
        queries::channels::get_channel(self.db()?, account_id).await
    }

    async fn list_channels(&self) -> Result<Vec<ChannelSession>, CourierError> {
        queries::channels::list_channels(self.db()?).await
    }

    async fn set_channel_pause(
        &self,
        account_id: &str,
        pause: &PauseState,
    ) -> Result<(), CourierError> {
        queries::channels::set_channel_pause(self.db()?, account_id, pause).await
    }

    async fn set_connection_status(
        &self,
        account_id: &str,
        status: ConnectionStatus,
    ) -> Result<(), CourierError> {
        queries::channels::set_connection_status(self.db()?, account_id, status).await
    }

    // --- Dispatch sessions ---

    async fn start_session(&self, new: &NewSession) -> Result<DispatchSession, CourierError> {
        queries::sessions::start_session(self.db()?, new, &self.quota_defaults).await
    }

    async fn get_session(&self, id: &str) -> Result<Option<DispatchSession>, CourierError> {
        queries::sessions::get_session(self.db()?, id).await
    }

    async fn list_sessions(&self, account_id: &str) -> Result<Vec<DispatchSession>, CourierError> {
        queries::sessions::list_sessions(self.db()?, account_id).await
    }

    async fn set_session_pause(&self, id: &str, pause: &PauseState) -> Result<(), CourierError> {
        queries::sessions::set_session_pause(self.db()?, id, pause).await
    }

    async fn cancel_session(&self, id: &str) -> Result<(), CourierError> {
        queries::sessions::cancel_session(self.db()?, id).await
    }

    // --- Messages ---

    async fn get_message(&self, id: i64) -> Result<Option<Message>, CourierError> {
        queries::messages::get_message(self.db()?, id).await
    }

    async fn list_messages(&self, session_id: &str) -> Result<Vec<Message>, CourierError> {
        queries::messages::list_messages(self.db()?, session_id).await
    }

    async fn eligible_messages(&self, max_batch: usize) -> Result<Vec<Message>, CourierError> {
        queries::messages::eligible_messages(self.db()?, max_batch).await
    }

    async fn claim_message(&self, id: i64) -> Result<Option<Message>, CourierError> {
        queries::messages::claim_message(self.db()?, id).await
    }

    async fn mark_sent(&self, id: i64, provider_id: &str) -> Result<(), CourierError> {
        queries::messages::mark_sent(self.db()?, id, provider_id, &self.quota_defaults).await
    }

    async fn mark_failed(
        &self,
        id: i64,
        kind: FailureKind,
        detail: &str,
    ) -> Result<(), CourierError> {
        queries::messages::mark_failed(self.db()?, id, kind, detail).await
    }

    async fn requeue(&self, id: i64, detail: Option<&str>) -> Result<(), CourierError> {
        queries::messages::requeue(self.db()?, id, detail).await
    }

    async fn fail_unattempted(
        &self,
        ids: &[i64],
        kind: FailureKind,
        detail: &str,
    ) -> Result<usize, CourierError> {
        queries::messages::fail_unattempted(self.db()?, ids, kind, detail).await
    }

    async fn requeue_failed(
        &self,
        max_attempts: u32,
        max_batch: usize,
    ) -> Result<usize, CourierError> {
        queries::messages::requeue_failed(self.db()?, max_attempts, max_batch).await
    }

    async fn retry_message(&self, id: i64) -> Result<(), CourierError> {
        queries::messages::retry_message(self.db()?, id).await
    }

    async fn set_message_pause(&self, id: i64, pause: &PauseState) -> Result<(), CourierError> {
        queries::messages::set_message_pause(self.db()?, id, pause).await
    }

    async fn soft_delete_message(&self, id: i64) -> Result<(), CourierError> {
        queries::messages::soft_delete_message(self.db()?, id).await
    }

    // --- Quota ---

    async fn get_quota(&self, account_id: &str) -> Result<Quota, CourierError> {
        queries::quota::get_quota(self.db()?, account_id, &self.quota_defaults).await
    }

    async fn set_quota_limits(
        &self,
        account_id: &str,
        message_limit: i64,
        queue_limit: i64,
    ) -> Result<(), CourierError> {
        queries::quota::set_quota_limits(self.db()?, account_id, message_limit, queue_limit).await
    }

    // --- Read models ---

    async fn session_progress(&self, id: &str) -> Result<Option<SessionProgress>, CourierError> {
        queries::sessions::session_progress(self.db()?, id).await
    }

    async fn account_progress(&self, account_id: &str) -> Result<AccountProgress, CourierError> {
        queries::sessions::account_progress(self.db()?, account_id, &self.quota_defaults).await
    }
}

#[async_trait]
impl QuotaChecker for SqliteStorage {
    async fn remaining(&self, account_id: &str) -> Result<i64, CourierError> {
        Ok(self.get_quota(account_id).await?.messages.remaining())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use courier_core::types::{NewMessage, Recipient};

    fn storage_at(dir: &tempfile::TempDir, quota: QuotaConfig) -> SqliteStorage {
        let config = StorageConfig {
            database_path: dir.path().join("adapter.db").to_string_lossy().into_owned(),
            wal_mode: true,
        };
        SqliteStorage::new(config, quota)
    }

    fn one_message(account: &str) -> NewSession {
        NewSession {
            account_id: account.into(),
            queue_id: "q".into(),
            messages: vec![NewMessage {
                recipient: Recipient {
                    name: "Ana".into(),
                    phone: "5551234".into(),
                    country_code: "20".into(),
                },
                content: "hi Ana".into(),
            }],
        }
    }

    #[tokio::test]
    async fn calls_before_initialize_fail() {
        let dir = tempfile::tempdir().unwrap();
        let storage = storage_at(&dir, QuotaConfig::default());
        assert!(matches!(
            storage.list_channels().await,
            Err(CourierError::Storage { .. })
        ));
        storage.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn double_initialize_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let storage = storage_at(&dir, QuotaConfig::default());
        storage.initialize().await.unwrap();
        assert!(storage.initialize().await.is_err());
        assert_eq!(storage.health_check().await.unwrap(), HealthStatus::Healthy);
        storage.close().await.unwrap();
    }

    #[tokio::test]
    async fn remaining_tracks_sends() {
        let dir = tempfile::tempdir().unwrap();
        let storage = storage_at(
            &dir,
            QuotaConfig {
                default_message_limit: 5,
                ..QuotaConfig::default()
            },
        );
        storage.initialize().await.unwrap();
        storage.register_channel("acc").await.unwrap();
        assert_eq!(storage.remaining("acc").await.unwrap(), 5);

        let session = storage.start_session(&one_message("acc")).await.unwrap();
        let message = storage.list_messages(&session.id).await.unwrap()[0].clone();
        storage.claim_message(message.id).await.unwrap().unwrap();
        storage.mark_sent(message.id, "wamid-1").await.unwrap();
        assert_eq!(storage.remaining("acc").await.unwrap(), 4);

        storage.set_quota_limits("acc", -1, -1).await.unwrap();
        assert_eq!(storage.remaining("acc").await.unwrap(), -1);

        let progress = storage.account_progress("acc").await.unwrap();
        assert_eq!(progress.totals.sent, 1);
        assert!(progress.channel.is_some());
        assert_eq!(progress.sessions[0].status, courier_core::SessionStatus::Completed);
    }
}
