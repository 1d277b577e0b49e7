// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Dispatch core for Courier.
//!
//! - [`condition`]: queue-position conditions, recipient selection, and
//!   template planning.
//! - [`pause`]: the pause/resume coordinator across global, session, and
//!   message scopes, plus coordinated channel probes.
//! - [`engine`]: the dispatch loop with retry, interruption short-circuit,
//!   and throttling.
//! - [`worker`]: a cancellable periodic driver for the engine.

pub mod condition;
pub mod engine;
pub mod pause;
pub mod throttle;
pub mod worker;

pub use condition::{Candidate, Condition, Operator, Template, TemplateSet};
pub use engine::{DispatchEngine, DispatchReport, Eligibility};
pub use pause::{Blocker, PauseCoordinator};
pub use throttle::DelayWindow;
pub use worker::DispatchWorker;
