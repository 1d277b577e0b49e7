// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Counter aggregator.
//!
//! Runs as the last step of every transaction that changes a message's
//! `status` or `is_deleted` flag. Counters are always a fresh count over the
//! current message rows, never an incremental patch, and this module only
//! ever writes `dispatch_sessions`. It never writes message rows.

use std::collections::BTreeSet;
use std::str::FromStr;

use courier_core::types::SessionCounters;
use courier_core::{MessageStatus, SessionStatus};
use rusqlite::{params, Connection};
use tracing::{info, warn};

/// Tally `(status, is_deleted, count)` groups into session counters.
///
/// Deleted messages are excluded from every counter.
pub fn tally<I>(groups: I) -> SessionCounters
where
    I: IntoIterator<Item = (MessageStatus, bool, i64)>,
{
    let mut counters = SessionCounters::default();
    for (status, deleted, count) in groups {
        if deleted {
            continue;
        }
        counters.total += count;
        match status {
            MessageStatus::Queued | MessageStatus::Sending => counters.ongoing += count,
            MessageStatus::Sent => counters.sent += count,
            MessageStatus::Failed => counters.failed += count,
        }
    }
    counters
}

/// Whether a session in `status` with `counters` enters `completed` now.
///
/// Closed sessions never transition again, so completion happens once.
pub fn should_complete(status: SessionStatus, counters: &SessionCounters) -> bool {
    !status.is_closed() && counters.ongoing == 0 && counters.sent + counters.failed == counters.total
}

/// Result of recomputing one session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Recomputed {
    pub session_id: String,
    pub counters: SessionCounters,
    pub completed: bool,
}

/// Recompute counters (and completion) for each distinct session id.
///
/// Must be called with the same connection, inside the same transaction,
/// as the message write it follows.
pub(crate) fn recompute<S: AsRef<str>>(
    conn: &Connection,
    session_ids: &[S],
) -> rusqlite::Result<Vec<Recomputed>> {
    let distinct: BTreeSet<&str> = session_ids.iter().map(AsRef::as_ref).collect();
    let mut results = Vec::with_capacity(distinct.len());

    let mut groups_stmt = conn.prepare_cached(
        "SELECT status, is_deleted, COUNT(*) FROM messages
         WHERE session_id = ?1 GROUP BY status, is_deleted",
    )?;
    let mut status_stmt =
        conn.prepare_cached("SELECT status FROM dispatch_sessions WHERE id = ?1")?;

    for session_id in distinct {
        let groups = groups_stmt
            .query_map(params![session_id], |row| {
                let status: String = row.get(0)?;
                let deleted: bool = row.get(1)?;
                let count: i64 = row.get(2)?;
                Ok((status, deleted, count))
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        let counters = tally(groups.into_iter().filter_map(|(status, deleted, count)| {
            match MessageStatus::from_str(&status) {
                Ok(status) => Some((status, deleted, count)),
                Err(_) => {
                    warn!(session = session_id, status = %status, "ignoring unknown message status");
                    None
                }
            }
        }));

        let current: String = match status_stmt.query_row(params![session_id], |row| row.get(0)) {
            Ok(status) => status,
            Err(rusqlite::Error::QueryReturnedNoRows) => continue,
            Err(e) => return Err(e),
        };
        let current = SessionStatus::from_str(&current).unwrap_or(SessionStatus::Active);
        let completed = should_complete(current, &counters);

        if completed {
            conn.execute(
                "UPDATE dispatch_sessions
                 SET total = ?1, sent = ?2, failed = ?3, ongoing = ?4,
                     status = 'completed', is_paused = 0,
                     last_updated = strftime('%Y-%m-%dT%H:%M:%fZ', 'now'),
                     end_time = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')
                 WHERE id = ?5",
                params![
                    counters.total,
                    counters.sent,
                    counters.failed,
                    counters.ongoing,
                    session_id
                ],
            )?;
            info!(
                session = session_id,
                sent = counters.sent,
                failed = counters.failed,
                "dispatch session completed"
            );
        } else {
            conn.execute(
                "UPDATE dispatch_sessions
                 SET total = ?1, sent = ?2, failed = ?3, ongoing = ?4,
                     last_updated = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')
                 WHERE id = ?5",
                params![
                    counters.total,
                    counters.sent,
                    counters.failed,
                    counters.ongoing,
                    session_id
                ],
            )?;
        }

        results.push(Recomputed {
            session_id: session_id.to_string(),
            counters,
            completed,
        });
    }

    Ok(results)
}
