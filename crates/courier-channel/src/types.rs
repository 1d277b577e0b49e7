// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Wire types of the automation driver API.

use serde::{Deserialize, Serialize};

/// Body of `POST /accounts/{account}/send`.
#[derive(Debug, Clone, Serialize)]
pub struct SendRequest<'a> {
    pub name: &'a str,
    pub phone: &'a str,
    pub country_code: &'a str,
    pub content: &'a str,
}

/// Reply to both `send` and `probe`.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct DriverReply {
    pub ok: bool,
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
}
