// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Dispatch session operations and the progress read models.

use courier_config::model::QuotaConfig;
use courier_core::types::{
    AccountProgress, DispatchSession, NewSession, PauseState, SessionCounters, SessionProgress,
};
use courier_core::{CourierError, SessionStatus};
use rusqlite::{params, Connection, Row};
use tracing::{debug, info};

use crate::counters;
use crate::database::{map_tr_err, Database, TxError};
use crate::queries::channels::fetch_channel;
use crate::queries::quota::{consume_queue, fetch_quota};
use crate::queries::{counters_from_row, optional, parse_column, pause_from_row};

const SESSION_COLUMNS: &str = "id, queue_id, account_id, status, is_paused, pause_reason, \
     paused_at, paused_by, total, sent, failed, ongoing, start_time, last_updated, end_time";

fn session_from_row(row: &Row<'_>) -> rusqlite::Result<DispatchSession> {
    let status: String = row.get(3)?;
    Ok(DispatchSession {
        id: row.get(0)?,
        queue_id: row.get(1)?,
        account_id: row.get(2)?,
        status: parse_column(3, &status)?,
        pause: pause_from_row(row, 4)?,
        counters: counters_from_row(row, 8)?,
        start_time: row.get(12)?,
        last_updated: row.get(13)?,
        end_time: row.get(14)?,
    })
}

pub(crate) fn fetch_session(conn: &Connection, id: &str) -> rusqlite::Result<Option<DispatchSession>> {
    let sql = format!("SELECT {SESSION_COLUMNS} FROM dispatch_sessions WHERE id = ?1");
    optional(conn.query_row(&sql, params![id], session_from_row))
}

fn fetch_sessions(conn: &Connection, account_id: &str) -> rusqlite::Result<Vec<DispatchSession>> {
    let sql = format!(
        "SELECT {SESSION_COLUMNS} FROM dispatch_sessions
         WHERE account_id = ?1 ORDER BY start_time, rowid"
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(params![account_id], session_from_row)?;
    rows.collect()
}

fn require_session(conn: &Connection, id: &str) -> Result<DispatchSession, TxError> {
    fetch_session(conn, id)?.ok_or_else(|| {
        CourierError::NotFound {
            entity: "dispatch session",
            id: id.to_string(),
        }
        .into()
    })
}

fn validate_new_session(new: &NewSession) -> Result<(), CourierError> {
    if new.account_id.trim().is_empty() {
        return Err(CourierError::Validation("account id must not be empty".into()));
    }
    if new.queue_id.trim().is_empty() {
        return Err(CourierError::Validation("queue id must not be empty".into()));
    }
    if new.messages.is_empty() {
        return Err(CourierError::Validation(format!(
            "queue `{}` has no messages to dispatch",
            new.queue_id
        )));
    }
    for message in &new.messages {
        message.validate()?;
    }
    Ok(())
}

/// Admit a dispatch session with all of its messages in one transaction.
///
/// Fails with `QuotaExceeded` when the account's remaining message allowance
/// is below the number of messages, or when a queue dispatched for the first
/// time finds no queue allowance left.
pub async fn start_session(
    db: &Database,
    new: &NewSession,
    defaults: &QuotaConfig,
) -> Result<DispatchSession, CourierError> {
    validate_new_session(new)?;
    let new = new.clone();
    let defaults = defaults.clone();
    let id = uuid::Uuid::new_v4().to_string();

    db.connection()
        .call(move |conn| -> Result<DispatchSession, TxError> {
            let tx = conn.transaction()?;

            let quota = fetch_quota(&tx, &new.account_id, &defaults)?;
            let requested = new.messages.len() as i64;
            if !quota.messages.admits(requested) {
                return Err(CourierError::QuotaExceeded {
                    account: new.account_id.clone(),
                    requested,
                    remaining: quota.messages.remaining(),
                }
                .into());
            }

            let seen: bool = tx.query_row(
                "SELECT EXISTS(SELECT 1 FROM dispatch_sessions WHERE account_id = ?1 AND queue_id = ?2)",
                params![new.account_id, new.queue_id],
                |row| row.get(0),
            )?;
            if !seen {
                if !quota.queues.admits(1) {
                    return Err(CourierError::QuotaExceeded {
                        account: new.account_id.clone(),
                        requested: 1,
                        remaining: quota.queues.remaining(),
                    }
                    .into());
                }
                consume_queue(&tx, &new.account_id, &defaults)?;
            }

            let now = courier_core::now_timestamp();
            tx.execute(
                "INSERT INTO dispatch_sessions (id, queue_id, account_id, status, start_time, last_updated)
                 VALUES (?1, ?2, ?3, 'active', ?4, ?4)",
                params![id, new.queue_id, new.account_id, now],
            )?;
            {
                let mut insert = tx.prepare(
                    "INSERT INTO messages (queue_id, session_id, account_id, recipient_name,
                         recipient_phone, country_code, content)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                )?;
                for message in &new.messages {
                    insert.execute(params![
                        new.queue_id,
                        id,
                        new.account_id,
                        message.recipient.name,
                        message.recipient.phone.trim(),
                        message.recipient.country_code.trim(),
                        message.content,
                    ])?;
                }
            }
            counters::recompute(&tx, &[id.as_str()])?;
            let session = require_session(&tx, &id)?;
            tx.commit()?;

            info!(
                session = %session.id,
                account = %session.account_id,
                queue = %session.queue_id,
                total = session.counters.total,
                "dispatch session started"
            );
            Ok(session)
        })
        .await
        .map_err(map_tr_err)
}

pub async fn get_session(db: &Database, id: &str) -> Result<Option<DispatchSession>, CourierError> {
    let id = id.to_string();
    db.connection()
        .call(move |conn| -> Result<_, TxError> { Ok(fetch_session(conn, &id)?) })
        .await
        .map_err(map_tr_err)
}

/// Sessions of an account, oldest first.
pub async fn list_sessions(db: &Database, account_id: &str) -> Result<Vec<DispatchSession>, CourierError> {
    let account_id = account_id.to_string();
    db.connection()
        .call(move |conn| -> Result<_, TxError> { Ok(fetch_sessions(conn, &account_id)?) })
        .await
        .map_err(map_tr_err)
}

/// Pause (`status = paused`) or resume (`status = active`) a session.
///
/// A completed session keeps its status and only carries the pause flag.
/// Pausing it requires live (retried) messages. Cancelled sessions reject both.
pub async fn set_session_pause(db: &Database, id: &str, pause: &PauseState) -> Result<(), CourierError> {
    let id = id.to_string();
    let pause = pause.clone();
    db.connection()
        .call(move |conn| -> Result<(), TxError> {
            let tx = conn.transaction()?;
            let session = require_session(&tx, &id)?;
            let target = match session.status {
                SessionStatus::Completed
                    if !pause.is_paused() || session.counters.ongoing > 0 =>
                {
                    SessionStatus::Completed
                }
                SessionStatus::Completed | SessionStatus::Cancelled => {
                    let to = if pause.is_paused() { "paused" } else { "active" };
                    return Err(CourierError::InvalidTransition {
                        id,
                        from: session.status.to_string(),
                        to: to.to_string(),
                    }
                    .into());
                }
                SessionStatus::Active | SessionStatus::Paused if pause.is_paused() => {
                    SessionStatus::Paused
                }
                SessionStatus::Active | SessionStatus::Paused => SessionStatus::Active,
            };
            let (is_paused, reason, at, by) = pause.to_columns();
            tx.execute(
                "UPDATE dispatch_sessions
                 SET status = ?1, is_paused = ?2, pause_reason = ?3, paused_at = ?4, paused_by = ?5,
                     last_updated = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')
                 WHERE id = ?6",
                params![target.to_string(), is_paused, reason, at, by, id],
            )?;
            tx.commit()?;
            debug!(session = %id, status = %target, "session pause updated");
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

/// Cancel a session. Its queued messages stay queued but are never selected again.
pub async fn cancel_session(db: &Database, id: &str) -> Result<(), CourierError> {
    let id = id.to_string();
    db.connection()
        .call(move |conn| -> Result<(), TxError> {
            let tx = conn.transaction()?;
            let session = require_session(&tx, &id)?;
            match session.status {
                SessionStatus::Cancelled => return Ok(()),
                SessionStatus::Completed => {
                    return Err(CourierError::InvalidTransition {
                        id,
                        from: session.status.to_string(),
                        to: SessionStatus::Cancelled.to_string(),
                    }
                    .into());
                }
                SessionStatus::Active | SessionStatus::Paused => {}
            }
            tx.execute(
                "UPDATE dispatch_sessions
                 SET status = 'cancelled',
                     last_updated = strftime('%Y-%m-%dT%H:%M:%fZ', 'now'),
                     end_time = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')
                 WHERE id = ?1",
                params![id],
            )?;
            tx.commit()?;
            info!(session = %id, "dispatch session cancelled");
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

pub async fn session_progress(db: &Database, id: &str) -> Result<Option<SessionProgress>, CourierError> {
    Ok(get_session(db, id).await?.as_ref().map(SessionProgress::from))
}

/// Aggregate progress of an account: channel state, every session, totals, quota.
pub async fn account_progress(
    db: &Database,
    account_id: &str,
    defaults: &QuotaConfig,
) -> Result<AccountProgress, CourierError> {
    let account_id = account_id.to_string();
    let defaults = defaults.clone();
    db.connection()
        .call(move |conn| -> Result<AccountProgress, TxError> {
            let channel = fetch_channel(conn, &account_id)?;
            let sessions = fetch_sessions(conn, &account_id)?;
            let quota = fetch_quota(conn, &account_id, &defaults)?;
            let mut totals = SessionCounters::default();
            for session in &sessions {
                totals += session.counters;
            }
            Ok(AccountProgress {
                account_id,
                channel,
                totals,
                sessions: sessions.iter().map(SessionProgress::from).collect(),
                quota,
            })
        })
        .await
        .map_err(map_tr_err)
}
