// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Quota checker consulted before messages are admitted or sent.

use async_trait::async_trait;

use crate::error::CourierError;

#[async_trait]
pub trait QuotaChecker: Send + Sync + 'static {
    /// Remaining message allowance for the account; `-1` means unlimited.
    async fn remaining(&self, account_id: &str) -> Result<i64, CourierError>;
}
