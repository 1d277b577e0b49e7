// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `courier serve` command implementation.
//!
//! Opens storage, connects the HTTP bridge to the automation driver, and
//! runs the dispatch worker until SIGINT or SIGTERM. A pass in flight
//! finishes before the database is checkpointed and closed.

use std::sync::Arc;

use courier_config::model::CourierConfig;
use courier_core::{CourierError, HealthStatus, PluginAdapter, StorageAdapter};
use courier_channel::HttpChannelSender;
use courier_dispatch::{DispatchEngine, DispatchWorker};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::commands::open_storage;

pub async fn run_serve(config: CourierConfig) -> Result<(), CourierError> {
    init_tracing(&config.daemon.log_level);
    info!("starting courier serve");

    let storage = open_storage(&config).await?;
    let driver = Arc::new(HttpChannelSender::new(&config.channel)?);
    match driver.health_check().await? {
        HealthStatus::Healthy => debug!("automation driver healthy"),
        status => warn!(?status, "automation driver not healthy, sends will be classified"),
    }
    let engine = Arc::new(DispatchEngine::new(
        storage.clone(),
        storage.clone(),
        driver,
        config.dispatch.clone(),
        &config.quota,
    ));

    let channels = storage.list_channels().await?;
    info!(
        channels = channels.len(),
        driver = %config.channel.base_url,
        "channel sessions loaded"
    );
    for channel in &channels {
        if let Some(reason) = channel.pause.reason() {
            info!(account = %channel.account_id, reason = %reason, "account starts paused");
        }
    }

    let cancel = install_signal_handler();
    DispatchWorker::new(engine).run(cancel).await;

    storage.close().await?;
    info!("courier stopped");
    Ok(())
}

/// Cancel the returned token on SIGINT or SIGTERM.
fn install_signal_handler() -> CancellationToken {
    let token = CancellationToken::new();
    let trigger = token.clone();

    tokio::spawn(async move {
        let ctrl_c = tokio::signal::ctrl_c();

        #[cfg(unix)]
        {
            use tokio::signal::unix::{signal, SignalKind};
            match signal(SignalKind::terminate()) {
                Ok(mut sigterm) => {
                    tokio::select! {
                        _ = ctrl_c => info!("received SIGINT (Ctrl+C), initiating shutdown"),
                        _ = sigterm.recv() => info!("received SIGTERM, initiating shutdown"),
                    }
                }
                Err(e) => {
                    warn!(error = %e, "SIGTERM handler unavailable, waiting for Ctrl+C only");
                    let _ = ctrl_c.await;
                    info!("received SIGINT (Ctrl+C), initiating shutdown");
                }
            }
        }

        #[cfg(not(unix))]
        {
            let _ = ctrl_c.await;
            info!("received Ctrl+C, initiating shutdown");
        }

        trigger.cancel();
    });

    token
}

fn init_tracing(log_level: &str) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("courier={log_level},warn")));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();
}
