// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Test harness for end-to-end dispatch testing.
//!
//! `TestHarness` assembles SQLite storage in a temp directory, a
//! [`ScriptedChannel`], and a [`DispatchEngine`] with zero throttling delay,
//! so a test only has to script outcomes and queue sessions.

use std::sync::Arc;

use courier_config::model::{DispatchConfig, QuotaConfig, StorageConfig};
use courier_core::types::{DispatchSession, Message, NewMessage, NewSession, Recipient};
use courier_core::{CourierError, StorageAdapter};
use courier_dispatch::DispatchEngine;
use courier_storage::SqliteStorage;

use crate::scripted_channel::ScriptedChannel;

/// Builder for creating test environments with configurable options.
pub struct TestHarnessBuilder {
    dispatch: DispatchConfig,
    quota: QuotaConfig,
    accounts: Vec<String>,
}

impl TestHarnessBuilder {
    fn new() -> Self {
        Self {
            dispatch: DispatchConfig {
                min_delay_ms: 0,
                max_delay_ms: 0,
                waiting_retry_delay_ms: 0,
                ..DispatchConfig::default()
            },
            quota: QuotaConfig::default(),
            accounts: vec!["acc".to_string()],
        }
    }

    /// Replace the dispatch policy. Delays are kept as given.
    pub fn with_dispatch(mut self, dispatch: DispatchConfig) -> Self {
        self.dispatch = dispatch;
        self
    }

    pub fn with_quota(mut self, quota: QuotaConfig) -> Self {
        self.quota = quota;
        self
    }

    /// Register these accounts' channels instead of the default `acc`.
    pub fn with_accounts(mut self, accounts: &[&str]) -> Self {
        self.accounts = accounts.iter().map(|a| a.to_string()).collect();
        self
    }

    pub fn probe_between_sends(mut self) -> Self {
        self.dispatch.probe_between_sends = true;
        self
    }

    /// Build the harness, opening storage and registering every account's channel.
    pub async fn build(self) -> Result<TestHarness, CourierError> {
        let temp_dir =
            tempfile::TempDir::new().map_err(|e| CourierError::Storage { source: e.into() })?;
        let storage_config = StorageConfig {
            database_path: temp_dir
                .path()
                .join("test.db")
                .to_string_lossy()
                .into_owned(),
            wal_mode: true,
        };

        let storage = Arc::new(SqliteStorage::new(storage_config, self.quota.clone()));
        storage.initialize().await?;
        for account in &self.accounts {
            storage.register_channel(account).await?;
        }

        let channel = ScriptedChannel::new();
        let engine = Arc::new(DispatchEngine::new(
            storage.clone(),
            storage.clone(),
            Arc::new(channel.clone()),
            self.dispatch,
            &self.quota,
        ));

        Ok(TestHarness {
            storage,
            channel,
            engine,
            _temp_dir: temp_dir,
        })
    }
}

/// Storage, scripted channel, and engine for one test.
///
/// The temp directory is removed when the harness is dropped.
pub struct TestHarness {
    pub storage: Arc<SqliteStorage>,
    pub channel: ScriptedChannel,
    pub engine: Arc<DispatchEngine>,
    _temp_dir: tempfile::TempDir,
}

impl TestHarness {
    pub fn builder() -> TestHarnessBuilder {
        TestHarnessBuilder::new()
    }

    /// Default harness: one account `acc`, unlimited quota, no delays.
    pub async fn new() -> Result<Self, CourierError> {
        Self::builder().build().await
    }

    /// `n` messages to distinct recipients, numbered from zero.
    pub fn new_session(account_id: &str, queue_id: &str, n: usize) -> NewSession {
        NewSession {
            account_id: account_id.to_string(),
            queue_id: queue_id.to_string(),
            messages: (0..n)
                .map(|i| NewMessage {
                    recipient: Recipient {
                        name: format!("patient {i}"),
                        phone: format!("55501{i:02}"),
                        country_code: "1".to_string(),
                    },
                    content: format!("your turn is coming #{i}"),
                })
                .collect(),
        }
    }

    /// Admit a session of `n` messages through the engine.
    pub async fn queue(
        &self,
        account_id: &str,
        queue_id: &str,
        n: usize,
    ) -> Result<DispatchSession, CourierError> {
        self.engine
            .admit(&Self::new_session(account_id, queue_id, n))
            .await
    }

    pub async fn messages(&self, session_id: &str) -> Result<Vec<Message>, CourierError> {
        self.storage.list_messages(session_id).await
    }

    pub async fn session(&self, session_id: &str) -> Result<DispatchSession, CourierError> {
        self.storage
            .get_session(session_id)
            .await?
            .ok_or_else(|| CourierError::NotFound {
                entity: "dispatch session",
                id: session_id.to_string(),
            })
    }
}
