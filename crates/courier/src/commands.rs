// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Operator commands: status, retry, pause, resume, probe.
//!
//! Each command opens the configured database, does one thing, and prints
//! JSON to stdout. In-memory state of a running `serve` process (network
//! pauses) is not visible here.

use std::sync::Arc;

use clap::Subcommand;
use courier_channel::HttpChannelSender;
use courier_config::model::CourierConfig;
use courier_core::{CourierError, Outcome, PauseReason, Probe, StorageAdapter};
use courier_dispatch::DispatchEngine;
use courier_storage::SqliteStorage;
use serde::Serialize;

/// Who the CLI records as the author of a pause.
const OPERATOR: &str = "cli";

/// Target of `pause` / `resume`. `--reason` is ignored on resume.
#[derive(Subcommand, Debug)]
pub enum ScopeArg {
    /// Every message of an account.
    Global {
        #[arg(long)]
        account: String,
        #[arg(long)]
        reason: Option<String>,
    },
    /// One dispatch session.
    Session {
        #[arg(long)]
        id: String,
        #[arg(long)]
        reason: Option<String>,
    },
    /// One message.
    Message {
        #[arg(long)]
        id: i64,
        #[arg(long)]
        reason: Option<String>,
    },
}

pub(crate) async fn open_storage(config: &CourierConfig) -> Result<Arc<SqliteStorage>, CourierError> {
    let storage = SqliteStorage::new(config.storage.clone(), config.quota.clone());
    storage.initialize().await?;
    Ok(Arc::new(storage))
}

pub(crate) fn build_engine(
    config: &CourierConfig,
    storage: Arc<SqliteStorage>,
) -> Result<DispatchEngine, CourierError> {
    let sender = Arc::new(HttpChannelSender::new(&config.channel)?);
    Ok(DispatchEngine::new(
        storage.clone(),
        storage,
        sender,
        config.dispatch.clone(),
        &config.quota,
    ))
}

fn print_json<T: Serialize>(value: &T) -> Result<(), CourierError> {
    let rendered = serde_json::to_string_pretty(value)
        .map_err(|e| CourierError::Internal(format!("failed to render JSON: {e}")))?;
    println!("{rendered}");
    Ok(())
}

fn reason_or_manual(reason: Option<String>) -> PauseReason {
    reason.map_or(PauseReason::Manual, |r| PauseReason::parse(r.trim()))
}

pub async fn run_status(config: &CourierConfig, account: &str) -> Result<(), CourierError> {
    let storage = open_storage(config).await?;
    let progress = storage.account_progress(account).await?;
    storage.close().await?;
    print_json(&progress)
}

#[derive(Debug, Serialize)]
struct RetryReport {
    requeued: usize,
}

pub async fn run_retry(
    config: &CourierConfig,
    batch: Option<usize>,
    message: Option<i64>,
) -> Result<(), CourierError> {
    let storage = open_storage(config).await?;
    let requeued = match message {
        Some(id) => {
            storage.retry_message(id).await?;
            1
        }
        None => {
            let engine = build_engine(config, storage.clone())?;
            engine
                .retry_failed(batch.unwrap_or(config.dispatch.max_batch))
                .await?
        }
    };
    storage.close().await?;
    print_json(&RetryReport { requeued })
}

#[derive(Debug, Serialize)]
struct ScopeReport<'a> {
    action: &'a str,
    scope: &'a str,
    target: String,
}

pub async fn run_pause(config: &CourierConfig, scope: ScopeArg) -> Result<(), CourierError> {
    let storage = open_storage(config).await?;
    let engine = build_engine(config, storage.clone())?;
    let coordinator = engine.coordinator();
    let report = match scope {
        ScopeArg::Global { account, reason } => {
            coordinator
                .pause_global(&account, reason_or_manual(reason), Some(OPERATOR))
                .await?;
            ScopeReport {
                action: "paused",
                scope: "global",
                target: account,
            }
        }
        ScopeArg::Session { id, reason } => {
            coordinator
                .pause_session(&id, reason_or_manual(reason), Some(OPERATOR))
                .await?;
            ScopeReport {
                action: "paused",
                scope: "session",
                target: id,
            }
        }
        ScopeArg::Message { id, reason } => {
            coordinator
                .pause_message(id, reason_or_manual(reason), Some(OPERATOR))
                .await?;
            ScopeReport {
                action: "paused",
                scope: "message",
                target: id.to_string(),
            }
        }
    };
    storage.close().await?;
    print_json(&report)
}

pub async fn run_resume(config: &CourierConfig, scope: ScopeArg) -> Result<(), CourierError> {
    let storage = open_storage(config).await?;
    let engine = build_engine(config, storage.clone())?;
    let coordinator = engine.coordinator();
    let report = match scope {
        ScopeArg::Global { account, .. } => {
            coordinator.resume_global(&account).await?;
            ScopeReport {
                action: "resumed",
                scope: "global",
                target: account,
            }
        }
        ScopeArg::Session { id, .. } => {
            coordinator.resume_session(&id).await?;
            ScopeReport {
                action: "resumed",
                scope: "session",
                target: id,
            }
        }
        ScopeArg::Message { id, .. } => {
            coordinator.resume_message(id).await?;
            ScopeReport {
                action: "resumed",
                scope: "message",
                target: id.to_string(),
            }
        }
    };
    storage.close().await?;
    print_json(&report)
}

#[derive(Debug, Serialize)]
struct ProbeReport {
    outcome: &'static str,
    detail: String,
}

impl From<&Outcome> for ProbeReport {
    fn from(outcome: &Outcome) -> Self {
        Self {
            outcome: outcome.label(),
            detail: outcome.detail().to_string(),
        }
    }
}

pub async fn run_probe(
    config: &CourierConfig,
    account: &str,
    phone: Option<String>,
    country_code: Option<String>,
) -> Result<(), CourierError> {
    let probe = match (phone, country_code) {
        (Some(phone), Some(country_code)) => Probe::Reachability {
            phone,
            country_code,
        },
        _ => Probe::Health,
    };
    let storage = open_storage(config).await?;
    let engine = build_engine(config, storage.clone())?;
    let outcome = engine.probe(account, &probe).await?;
    storage.close().await?;
    print_json(&ProbeReport::from(&outcome))
}
