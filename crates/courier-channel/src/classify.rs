// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Text-to-outcome translation at the driver edge.
//!
//! The automation driver reports problems as free text. Everything past this
//! module works with [`Outcome`] only.

use courier_core::Outcome;

const AUTH_MARKERS: &[&str] = &[
    "pendingqr",
    "qr code",
    "scan the qr",
    "not logged in",
    "logged out",
    "session expired",
    "unauthorized",
];

const NETWORK_MARKERS: &[&str] = &[
    "pendingnet",
    "net::err",
    "network",
    "econnreset",
    "econnrefused",
    "etimedout",
    "socket hang up",
    "disconnected",
    "timed out",
    "timeout",
];

const WAITING_MARKERS: &[&str] = &["waiting", "still processing", "busy"];

/// Classify a driver error message.
///
/// Auth wins over network: a driver that lost its login usually reports the
/// dropped connection too.
pub fn classify_error(text: &str) -> Outcome {
    let lowered = text.to_ascii_lowercase();
    let detail = strip_label(text).to_string();
    if contains_any(&lowered, AUTH_MARKERS) {
        Outcome::PendingQr(detail)
    } else if contains_any(&lowered, NETWORK_MARKERS) {
        Outcome::PendingNet(detail)
    } else if contains_any(&lowered, WAITING_MARKERS) {
        Outcome::Waiting(detail)
    } else {
        Outcome::Failure(detail)
    }
}

/// A request that never got an answer from the driver.
pub fn classify_transport(error: &reqwest::Error) -> Outcome {
    if error.is_connect() || error.is_timeout() || error.is_request() {
        Outcome::PendingNet(error.to_string())
    } else {
        Outcome::Failure(error.to_string())
    }
}

fn contains_any(haystack: &str, needles: &[&str]) -> bool {
    needles.iter().any(|needle| haystack.contains(needle))
}

/// Drop a leading `PendingQR:`-style label the driver may already have added.
fn strip_label(text: &str) -> &str {
    for label in ["PendingQR", "PendingNET", "Waiting", "Failure"] {
        if let Some(rest) = text.strip_prefix(label) {
            return rest.trim_start_matches(':').trim();
        }
    }
    text.trim()
}
