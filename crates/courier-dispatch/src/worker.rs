// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Periodic driver for the dispatch engine.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::engine::{DispatchEngine, DispatchReport};

/// Runs retry and dispatch passes on a fixed interval until cancelled.
pub struct DispatchWorker {
    engine: Arc<DispatchEngine>,
    poll_interval: Duration,
    max_batch: usize,
}

impl DispatchWorker {
    pub fn new(engine: Arc<DispatchEngine>) -> Self {
        let config = engine.config();
        let poll_interval = Duration::from_secs(config.poll_interval_secs.max(1));
        let max_batch = config.max_batch;
        Self {
            engine,
            poll_interval,
            max_batch,
        }
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    /// One retry pass followed by one dispatch pass.
    pub async fn run_once(&self) -> Result<DispatchReport, courier_core::CourierError> {
        let requeued = self.engine.retry_failed(self.max_batch).await?;
        if requeued > 0 {
            debug!(requeued, "failed messages requeued for retry");
        }
        self.engine.process_queued(self.max_batch).await
    }

    /// Tick until `cancel` fires. A pass in flight finishes before returning.
    pub async fn run(&self, cancel: CancellationToken) {
        let mut ticker = tokio::time::interval(self.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!(
            poll_interval_ms = self.poll_interval.as_millis() as u64,
            max_batch = self.max_batch,
            "dispatch worker started"
        );

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    info!("dispatch worker stopping");
                    break;
                }
                _ = ticker.tick() => {
                    match self.run_once().await {
                        Ok(report) if report.is_noop() => {}
                        Ok(report) => debug!(?report, "dispatch pass complete"),
                        Err(e) => error!(error = %e, "dispatch pass failed"),
                    }
                }
            }
        }
    }
}
