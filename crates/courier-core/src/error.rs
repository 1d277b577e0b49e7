// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Error types for the Courier dispatch engine.

use thiserror::Error;

use crate::types::PauseScope;

/// The primary error type used across all Courier adapter traits and core operations.
#[derive(Debug, Error)]
pub enum CourierError {
    /// Configuration errors (invalid TOML, missing required fields, type mismatches).
    #[error("configuration error: {0}")]
    Config(String),

    /// Storage backend errors (database connection, query failure, migration).
    #[error("storage error: {source}")]
    Storage {
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// Channel adapter errors that escaped classification (transport bugs, bad replies).
    #[error("channel error: {message}")]
    Channel {
        message: String,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Malformed input rejected before it reaches the dispatch core.
    #[error("validation error: {0}")]
    Validation(String),

    /// A referenced row does not exist.
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    /// The account's message allowance cannot admit the requested messages.
    #[error("quota exceeded for account {account}: requested {requested}, remaining {remaining}")]
    QuotaExceeded {
        account: String,
        requested: i64,
        remaining: i64,
    },

    /// A resume was requested on a scope that cannot be resumed yet.
    #[error("{scope} pause is not resumable: {reason}")]
    NotResumable { scope: PauseScope, reason: String },

    /// A status change that the message or session state machine forbids.
    #[error("invalid transition for {id}: {from} -> {to}")]
    InvalidTransition { id: String, from: String, to: String },

    /// Operation timed out.
    #[error("operation timed out after {duration:?}")]
    Timeout { duration: std::time::Duration },

    /// Internal or unexpected errors.
    #[error("internal error: {0}")]
    Internal(String),
}
