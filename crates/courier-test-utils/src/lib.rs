// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Test utilities for Courier integration tests.
//!
//! Provides a scripted channel and a harness that wires it to a temp SQLite
//! database and a zero-delay dispatch engine.
//!
//! # Components
//!
//! - [`ScriptedChannel`] - Channel sender that replays queued outcomes and records calls
//! - [`SendGate`] - Holds one scripted send in flight until released
//! - [`TestHarness`] - Storage, channel, and engine assembled for one test

pub mod harness;
pub mod scripted_channel;

pub use harness::{TestHarness, TestHarnessBuilder};
pub use scripted_channel::{ScriptedChannel, SendGate, SentCall};
