// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Typed query modules.
//!
//! Each module exposes free async functions taking `&Database`. Closures run
//! on the writer thread and return `Result<_, TxError>` so domain checks made
//! against freshly read rows surface as `CourierError` unchanged.

pub mod channels;
pub mod messages;
pub mod quota;
pub mod sessions;

use std::str::FromStr;

use courier_core::types::{PauseState, SessionCounters};
use rusqlite::types::Type;
use rusqlite::Row;

/// Parse a text column into a strum-backed enum.
pub(crate) fn parse_column<T>(idx: usize, value: &str) -> rusqlite::Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    T::from_str(value)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

/// Read the four pause columns starting at `start`.
pub(crate) fn pause_from_row(row: &Row<'_>, start: usize) -> rusqlite::Result<PauseState> {
    Ok(PauseState::from_columns(
        row.get(start)?,
        row.get(start + 1)?,
        row.get(start + 2)?,
        row.get(start + 3)?,
    ))
}

/// Read `total, sent, failed, ongoing` starting at `start`.
pub(crate) fn counters_from_row(row: &Row<'_>, start: usize) -> rusqlite::Result<SessionCounters> {
    Ok(SessionCounters {
        total: row.get(start)?,
        sent: row.get(start + 1)?,
        failed: row.get(start + 2)?,
        ongoing: row.get(start + 3)?,
    })
}

/// Map "no rows" to `None`.
pub(crate) fn optional<T>(result: rusqlite::Result<T>) -> rusqlite::Result<Option<T>> {
    match result {
        Ok(value) => Ok(Some(value)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e),
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use courier_core::types::{NewMessage, NewSession, Recipient};
    use tempfile::TempDir;

    use crate::database::Database;

    pub async fn setup_db() -> (Database, TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("test.db");
        let db = Database::open(path.to_str().unwrap()).await.unwrap();
        (db, dir)
    }

    pub fn new_session(account: &str, queue: &str, n: usize) -> NewSession {
        NewSession {
            account_id: account.to_string(),
            queue_id: queue.to_string(),
            messages: (0..n)
                .map(|i| NewMessage {
                    recipient: Recipient {
                        name: format!("Recipient {i}"),
                        phone: format!("55500{i:02}"),
                        country_code: "+1".to_string(),
                    },
                    content: format!("hello #{i}"),
                })
                .collect(),
        }
    }
}
