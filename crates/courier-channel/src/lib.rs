// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Channel bridge for Courier.
//!
//! [`HttpChannelSender`] talks JSON over HTTP to the external automation
//! driver that owns each account's session. The driver only reports errors
//! as text; [`classify`] is the one place that text becomes an [`Outcome`].
//!
//! [`Outcome`]: courier_core::Outcome

pub mod classify;
pub mod client;
pub mod types;

pub use classify::{classify_error, classify_transport};
pub use client::HttpChannelSender;
