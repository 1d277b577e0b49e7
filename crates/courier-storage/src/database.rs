// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Database connection management with PRAGMA setup, WAL mode, and lifecycle.
//!
//! All writes are serialized through tokio-rusqlite's single background thread.
//! Query modules accept `&Database` and call through `connection().call()`.
//! Do NOT create additional Connection instances for writes.

use std::path::Path;

use courier_core::CourierError;
use thiserror::Error;
use tracing::debug;

use crate::migrations;

/// Error raised inside a `call()` closure: either SQLite itself, or a domain
/// rule checked against the rows just read (missing row, forbidden transition).
#[derive(Debug, Error)]
pub(crate) enum TxError {
    #[error(transparent)]
    Sqlite(#[from] rusqlite::Error),
    #[error(transparent)]
    Domain(#[from] CourierError),
}

/// Convert a tokio-rusqlite error into a `CourierError`, unwrapping domain errors.
pub(crate) fn map_tr_err(e: tokio_rusqlite::Error<TxError>) -> CourierError {
    match e {
        tokio_rusqlite::Error::Error(TxError::Domain(err)) => err,
        tokio_rusqlite::Error::Error(TxError::Sqlite(err)) => CourierError::Storage {
            source: Box::new(err),
        },
        other => CourierError::Storage {
            source: Box::new(other),
        },
    }
}

fn storage_err<E>(e: E) -> CourierError
where
    E: std::error::Error + Send + Sync + 'static,
{
    CourierError::Storage {
        source: Box::new(e),
    }
}

/// Handle to the single writer connection.
pub struct Database {
    conn: tokio_rusqlite::Connection,
}

impl Database {
    /// Open (creating if needed) the database at `path` in WAL mode and migrate it.
    pub async fn open(path: &str) -> Result<Self, CourierError> {
        Self::open_with(path, true).await
    }

    /// Open the database, choosing the journal mode.
    ///
    /// Migrations run on a short-lived blocking connection before the
    /// long-lived writer is opened.
    pub async fn open_with(path: &str, wal_mode: bool) -> Result<Self, CourierError> {
        if let Some(parent) = Path::new(path).parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(storage_err)?;
            }
        }

        let setup_path = path.to_string();
        tokio::task::spawn_blocking(move || -> Result<(), CourierError> {
            let mut conn = rusqlite::Connection::open(&setup_path).map_err(storage_err)?;
            let journal = if wal_mode { "WAL" } else { "DELETE" };
            let mode: String = conn
                .pragma_update_and_check(None, "journal_mode", journal, |row| row.get(0))
                .map_err(storage_err)?;
            debug!(journal_mode = %mode, "journal mode set");
            migrations::run_migrations(&mut conn)
        })
        .await
        .map_err(|e| CourierError::Internal(format!("database setup task failed: {e}")))??;

        let conn = tokio_rusqlite::Connection::open(path)
            .await
            .map_err(storage_err)?;
        let db = Self { conn };
        db.connection()
            .call(|conn| -> Result<(), TxError> {
                conn.execute_batch(
                    "PRAGMA foreign_keys = ON;
                     PRAGMA busy_timeout = 5000;
                     PRAGMA synchronous = NORMAL;",
                )?;
                Ok(())
            })
            .await
            .map_err(map_tr_err)?;

        debug!(path, wal_mode, "database opened");
        Ok(db)
    }

    /// The single writer connection.
    pub fn connection(&self) -> &tokio_rusqlite::Connection {
        &self.conn
    }

    /// Checkpoint the WAL and close the connection.
    pub async fn close(self) -> Result<(), CourierError> {
        self.checkpoint().await?;
        self.conn.close().await.map_err(storage_err)
    }

    /// Fold the WAL back into the main database file.
    pub async fn checkpoint(&self) -> Result<(), CourierError> {
        self.conn
            .call(|conn| -> Result<(), TxError> {
                conn.execute_batch("PRAGMA wal_checkpoint(TRUNCATE);")?;
                Ok(())
            })
            .await
            .map_err(map_tr_err)
    }
}
