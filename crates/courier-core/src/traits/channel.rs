// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Channel sender trait: the boundary to the external automation channel.

use async_trait::async_trait;

use crate::error::CourierError;
use crate::traits::adapter::PluginAdapter;
use crate::types::{Outcome, Probe, Recipient};

/// Sends messages and runs probes over an account's automation channel.
///
/// Implementations return an already classified [`Outcome`]; the dispatch
/// core never inspects error text. An `Err` means the adapter itself broke
/// and is recorded as a fatal failure of that one message.
///
/// The channel is single-concurrency per account. Callers serialize access;
/// implementations do not need to lock.
#[async_trait]
pub trait ChannelSender: PluginAdapter {
    /// Sends `content` to `recipient` through the channel of `account_id`.
    async fn send(
        &self,
        account_id: &str,
        recipient: &Recipient,
        content: &str,
    ) -> Result<Outcome, CourierError>;

    /// Runs an out-of-band check against the channel of `account_id`.
    async fn probe(&self, account_id: &str, probe: &Probe) -> Result<Outcome, CourierError>;
}
