// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! HTTP client for the automation driver.
//!
//! One [`HttpChannelSender`] serves every account; the account id is part of
//! the request path. The dispatch core serializes calls per account, so the
//! client does no locking of its own.

use std::time::Duration;

use async_trait::async_trait;
use courier_config::model::ChannelConfig;
use courier_core::types::{AdapterType, HealthStatus, Recipient};
use courier_core::{ChannelSender, CourierError, Outcome, PluginAdapter, Probe};
use reqwest::StatusCode;
use serde::Serialize;
use tracing::{debug, warn};

use crate::classify::{classify_error, classify_transport};
use crate::types::{DriverReply, SendRequest};

#[derive(Debug, Clone)]
pub struct HttpChannelSender {
    client: reqwest::Client,
    base_url: String,
}

impl HttpChannelSender {
    pub fn new(config: &ChannelConfig) -> Result<Self, CourierError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| CourierError::Channel {
                message: format!("failed to build HTTP client: {e}"),
                source: Some(Box::new(e)),
            })?;
        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
        })
    }

    fn account_url(&self, account_id: &str, action: &str) -> String {
        format!("{}/accounts/{account_id}/{action}", self.base_url)
    }

    async fn post<B: Serialize + ?Sized>(
        &self,
        url: &str,
        body: &B,
    ) -> Result<Outcome, CourierError> {
        let response = match self.client.post(url).json(body).send().await {
            Ok(response) => response,
            Err(e) => {
                warn!(url, error = %e, "driver unreachable");
                return Ok(classify_transport(&e));
            }
        };

        let status = response.status();
        let text = match response.text().await {
            Ok(text) => text,
            Err(e) => return Ok(classify_transport(&e)),
        };
        debug!(url, status = %status, "driver replied");

        let reply = serde_json::from_str::<DriverReply>(&text);
        if !status.is_success() {
            if let Ok(DriverReply {
                error: Some(error), ..
            }) = &reply
            {
                return Ok(classify_error(error));
            }
            return Ok(classify_status(status, &text));
        }

        let reply = reply.map_err(|e| CourierError::Channel {
            message: format!("failed to parse driver reply: {e}"),
            source: Some(Box::new(e)),
        })?;
        Ok(outcome_from_reply(reply))
    }
}

fn outcome_from_reply(reply: DriverReply) -> Outcome {
    if reply.ok {
        Outcome::Success {
            provider_id: reply.id.unwrap_or_default(),
        }
    } else {
        classify_error(
            reply
                .error
                .as_deref()
                .unwrap_or("driver reported a failure without detail"),
        )
    }
}

fn classify_status(status: StatusCode, body: &str) -> Outcome {
    let detail = format!("driver returned {status}: {}", body.trim());
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Outcome::PendingQr(detail),
        StatusCode::BAD_GATEWAY | StatusCode::SERVICE_UNAVAILABLE | StatusCode::GATEWAY_TIMEOUT => {
            Outcome::PendingNet(detail)
        }
        StatusCode::TOO_MANY_REQUESTS => Outcome::Waiting(detail),
        _ => Outcome::Failure(detail),
    }
}

#[async_trait]
impl PluginAdapter for HttpChannelSender {
    fn name(&self) -> &str {
        "http-driver"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Channel
    }

    async fn health_check(&self) -> Result<HealthStatus, CourierError> {
        let url = format!("{}/health", self.base_url);
        match self.client.get(&url).send().await {
            Ok(response) if response.status().is_success() => Ok(HealthStatus::Healthy),
            Ok(response) => Ok(HealthStatus::Degraded(format!(
                "driver health returned {}",
                response.status()
            ))),
            Err(e) => Ok(HealthStatus::Unhealthy(e.to_string())),
        }
    }

    async fn shutdown(&self) -> Result<(), CourierError> {
        Ok(())
    }
}

#[async_trait]
impl ChannelSender for HttpChannelSender {
    async fn send(
        &self,
        account_id: &str,
        recipient: &Recipient,
        content: &str,
    ) -> Result<Outcome, CourierError> {
        let body = SendRequest {
            name: &recipient.name,
            phone: &recipient.phone,
            country_code: &recipient.country_code,
            content,
        };
        self.post(&self.account_url(account_id, "send"), &body).await
    }

    async fn probe(&self, account_id: &str, probe: &Probe) -> Result<Outcome, CourierError> {
        self.post(&self.account_url(account_id, "probe"), probe).await
    }
}
