// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Message reads and status transitions.
//!
//! Every write that changes `status` or `is_deleted` ends with
//! [`counters::recompute`] for the touched sessions before the commit.

use courier_config::model::QuotaConfig;
use courier_core::types::{FailureKind, Message, PauseState, Recipient};
use courier_core::{CourierError, MessageStatus};
use rusqlite::{params, Connection, Row};
use tracing::{debug, info};

use crate::counters;
use crate::database::{map_tr_err, Database, TxError};
use crate::queries::quota::consume_messages;
use crate::queries::{optional, parse_column, pause_from_row};

const MESSAGE_COLUMNS: &str = "m.id, m.queue_id, m.session_id, m.account_id, m.recipient_name, \
     m.recipient_phone, m.country_code, m.content, m.status, m.is_paused, m.pause_reason, \
     m.paused_at, m.paused_by, m.is_deleted, m.attempts, m.last_attempt_at, m.sent_at, \
     m.provider_id, m.error_message, m.failure_kind, m.created_at, m.failed_attempts";

fn message_from_row(row: &Row<'_>) -> rusqlite::Result<Message> {
    let status: String = row.get(8)?;
    let failure_kind: Option<String> = row.get(19)?;
    Ok(Message {
        id: row.get(0)?,
        queue_id: row.get(1)?,
        session_id: row.get(2)?,
        account_id: row.get(3)?,
        recipient: Recipient {
            name: row.get(4)?,
            phone: row.get(5)?,
            country_code: row.get(6)?,
        },
        content: row.get(7)?,
        status: parse_column(8, &status)?,
        pause: pause_from_row(row, 9)?,
        is_deleted: row.get(13)?,
        attempts: row.get(14)?,
        last_attempt_at: row.get(15)?,
        sent_at: row.get(16)?,
        provider_id: row.get(17)?,
        error_message: row.get(18)?,
        failure_kind: failure_kind
            .as_deref()
            .map(|kind| parse_column::<FailureKind>(19, kind))
            .transpose()?,
        created_at: row.get(20)?,
        failed_attempts: row.get(21)?,
    })
}

pub(crate) fn fetch_message(conn: &Connection, id: i64) -> rusqlite::Result<Option<Message>> {
    let sql = format!("SELECT {MESSAGE_COLUMNS} FROM messages m WHERE m.id = ?1");
    optional(conn.query_row(&sql, params![id], message_from_row))
}

fn require_message(conn: &Connection, id: i64) -> Result<Message, TxError> {
    fetch_message(conn, id)?.ok_or_else(|| {
        CourierError::NotFound {
            entity: "message",
            id: id.to_string(),
        }
        .into()
    })
}

fn invalid_transition(id: i64, from: MessageStatus, to: MessageStatus) -> TxError {
    CourierError::InvalidTransition {
        id: id.to_string(),
        from: from.to_string(),
        to: to.to_string(),
    }
    .into()
}

/// Read a message that must currently be `sending` before moving it to `to`.
fn require_sending(conn: &Connection, id: i64, to: MessageStatus) -> Result<Message, TxError> {
    let message = require_message(conn, id)?;
    if message.status != MessageStatus::Sending {
        return Err(invalid_transition(id, message.status, to));
    }
    Ok(message)
}

pub async fn get_message(db: &Database, id: i64) -> Result<Option<Message>, CourierError> {
    db.connection()
        .call(move |conn| -> Result<_, TxError> { Ok(fetch_message(conn, id)?) })
        .await
        .map_err(map_tr_err)
}

/// Messages of a session in creation order, deleted ones included.
pub async fn list_messages(db: &Database, session_id: &str) -> Result<Vec<Message>, CourierError> {
    let session_id = session_id.to_string();
    db.connection()
        .call(move |conn| -> Result<_, TxError> {
            let sql = format!("SELECT {MESSAGE_COLUMNS} FROM messages m WHERE m.session_id = ?1 ORDER BY m.id");
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt.query_map(params![session_id], message_from_row)?;
            Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
        })
        .await
        .map_err(map_tr_err)
}

/// The eligible batch: queued, unpaused, undeleted messages whose session is
/// neither paused nor cancelled and whose account channel is not paused.
///
/// Oldest session first, then creation order.
pub async fn eligible_messages(db: &Database, max_batch: usize) -> Result<Vec<Message>, CourierError> {
    let limit = i64::try_from(max_batch).unwrap_or(i64::MAX);
    db.connection()
        .call(move |conn| -> Result<_, TxError> {
            let sql = format!(
                "SELECT {MESSAGE_COLUMNS}
                 FROM messages m
                 JOIN dispatch_sessions s ON s.id = m.session_id
                 JOIN channel_sessions c ON c.account_id = m.account_id
                 WHERE m.status = 'queued' AND m.is_paused = 0 AND m.is_deleted = 0
                   AND s.is_paused = 0 AND s.status <> 'cancelled'
                   AND c.is_paused = 0
                 ORDER BY s.start_time, s.rowid, m.id
                 LIMIT ?1"
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt.query_map(params![limit], message_from_row)?;
            Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
        })
        .await
        .map_err(map_tr_err)
}

/// `queued -> sending` if the message is still eligible. Increments `attempts`.
pub async fn claim_message(db: &Database, id: i64) -> Result<Option<Message>, CourierError> {
    db.connection()
        .call(move |conn| -> Result<Option<Message>, TxError> {
            let tx = conn.transaction()?;
            let changed = tx.execute(
                "UPDATE messages
                 SET status = 'sending', attempts = attempts + 1,
                     last_attempt_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')
                 WHERE id = ?1 AND status = 'queued' AND is_paused = 0 AND is_deleted = 0
                   AND EXISTS (SELECT 1 FROM dispatch_sessions s
                               WHERE s.id = messages.session_id
                                 AND s.is_paused = 0 AND s.status <> 'cancelled')
                   AND EXISTS (SELECT 1 FROM channel_sessions c
                               WHERE c.account_id = messages.account_id AND c.is_paused = 0)",
                params![id],
            )?;
            if changed == 0 {
                return Ok(None);
            }
            let message = require_message(&tx, id)?;
            counters::recompute(&tx, &[message.session_id.as_str()])?;
            tx.commit()?;
            debug!(message = id, attempts = message.attempts, "message claimed");
            Ok(Some(message))
        })
        .await
        .map_err(map_tr_err)
}

/// `sending -> sent`. Consumes one message allowance in the same transaction.
pub async fn mark_sent(
    db: &Database,
    id: i64,
    provider_id: &str,
    defaults: &QuotaConfig,
) -> Result<(), CourierError> {
    let provider_id = provider_id.to_string();
    let defaults = defaults.clone();
    db.connection()
        .call(move |conn| -> Result<(), TxError> {
            let tx = conn.transaction()?;
            let message = require_sending(&tx, id, MessageStatus::Sent)?;
            tx.execute(
                "UPDATE messages
                 SET status = 'sent', provider_id = ?1,
                     sent_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now'),
                     error_message = NULL, failure_kind = NULL
                 WHERE id = ?2",
                params![provider_id, id],
            )?;
            consume_messages(&tx, &message.account_id, 1, &defaults)?;
            counters::recompute(&tx, &[message.session_id.as_str()])?;
            tx.commit()?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

/// `sending -> failed`, recording why. Counts towards the retry cap.
pub async fn mark_failed(
    db: &Database,
    id: i64,
    kind: FailureKind,
    detail: &str,
) -> Result<(), CourierError> {
    let detail = detail.to_string();
    db.connection()
        .call(move |conn| -> Result<(), TxError> {
            let tx = conn.transaction()?;
            let message = require_sending(&tx, id, MessageStatus::Failed)?;
            tx.execute(
                "UPDATE messages
                 SET status = 'failed', error_message = ?1, failure_kind = ?2,
                     failed_attempts = failed_attempts + 1
                 WHERE id = ?3",
                params![detail, kind.to_string(), id],
            )?;
            counters::recompute(&tx, &[message.session_id.as_str()])?;
            tx.commit()?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

/// `sending -> queued`, keeping both attempt counters. `detail` replaces `error_message` when given.
pub async fn requeue(db: &Database, id: i64, detail: Option<&str>) -> Result<(), CourierError> {
    let detail = detail.map(str::to_string);
    db.connection()
        .call(move |conn| -> Result<(), TxError> {
            let tx = conn.transaction()?;
            let message = require_sending(&tx, id, MessageStatus::Queued)?;
            tx.execute(
                "UPDATE messages SET status = 'queued', error_message = COALESCE(?1, error_message)
                 WHERE id = ?2",
                params![detail, id],
            )?;
            counters::recompute(&tx, &[message.session_id.as_str()])?;
            tx.commit()?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

/// `queued -> failed` without an attempt, for batch items the channel never saw.
///
/// Rows that already moved on are left alone. Returns how many rows changed.
pub async fn fail_unattempted(
    db: &Database,
    ids: &[i64],
    kind: FailureKind,
    detail: &str,
) -> Result<usize, CourierError> {
    if ids.is_empty() {
        return Ok(0);
    }
    let ids = ids.to_vec();
    let detail = detail.to_string();
    db.connection()
        .call(move |conn| -> Result<usize, TxError> {
            let tx = conn.transaction()?;
            let mut touched = Vec::new();
            {
                let mut update = tx.prepare(
                    "UPDATE messages SET status = 'failed', error_message = ?1, failure_kind = ?2
                     WHERE id = ?3 AND status = 'queued'
                     RETURNING session_id",
                )?;
                for id in &ids {
                    let session: Option<String> = optional(update.query_row(
                        params![detail, kind.to_string(), id],
                        |row| row.get(0),
                    ))?;
                    if let Some(session) = session {
                        touched.push(session);
                    }
                }
            }
            counters::recompute(&tx, &touched)?;
            tx.commit()?;
            if !touched.is_empty() {
                info!(count = touched.len(), kind = %kind, "failed unattempted batch items");
            }
            Ok(touched.len())
        })
        .await
        .map_err(map_tr_err)
}

/// Automatic retry: `failed -> queued` for messages whose failed attempts
/// are below the cap. Claims that ended `Waiting` or `PendingQR` do not count.
///
/// Deleted messages and messages of cancelled sessions are never requeued.
/// A completed session stays completed.
pub async fn requeue_failed(
    db: &Database,
    max_attempts: u32,
    max_batch: usize,
) -> Result<usize, CourierError> {
    let limit = i64::try_from(max_batch).unwrap_or(i64::MAX);
    db.connection()
        .call(move |conn| -> Result<usize, TxError> {
            let tx = conn.transaction()?;
            let rows: Vec<(i64, String)> = {
                let mut select = tx.prepare(
                    "SELECT m.id, m.session_id
                     FROM messages m
                     JOIN dispatch_sessions s ON s.id = m.session_id
                     WHERE m.status = 'failed' AND m.is_deleted = 0 AND m.failed_attempts < ?1
                       AND s.status <> 'cancelled'
                     ORDER BY m.id
                     LIMIT ?2",
                )?;
                let mapped = select.query_map(params![max_attempts, limit], |row| {
                    Ok((row.get(0)?, row.get(1)?))
                })?;
                mapped.collect::<rusqlite::Result<Vec<_>>>()?
            };
            {
                let mut update =
                    tx.prepare("UPDATE messages SET status = 'queued' WHERE id = ?1")?;
                for (id, _) in &rows {
                    update.execute(params![id])?;
                }
            }
            let touched: Vec<&str> = rows.iter().map(|(_, session)| session.as_str()).collect();
            counters::recompute(&tx, &touched)?;
            tx.commit()?;
            if !rows.is_empty() {
                info!(count = rows.len(), max_attempts, "requeued failed messages");
            }
            Ok(rows.len())
        })
        .await
        .map_err(map_tr_err)
}

/// Operator retry: `failed -> queued` regardless of the attempt cap.
pub async fn retry_message(db: &Database, id: i64) -> Result<(), CourierError> {
    db.connection()
        .call(move |conn| -> Result<(), TxError> {
            let tx = conn.transaction()?;
            let message = require_message(&tx, id)?;
            if message.status != MessageStatus::Failed || message.is_deleted {
                return Err(invalid_transition(id, message.status, MessageStatus::Queued));
            }
            tx.execute("UPDATE messages SET status = 'queued' WHERE id = ?1", params![id])?;
            counters::recompute(&tx, &[message.session_id.as_str()])?;
            tx.commit()?;
            info!(message = id, attempts = message.attempts, "message retried by operator");
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

/// Set or clear the message-scope pause. Sent messages are immutable.
pub async fn set_message_pause(db: &Database, id: i64, pause: &PauseState) -> Result<(), CourierError> {
    let (is_paused, reason, at, by) = pause.to_columns();
    db.connection()
        .call(move |conn| -> Result<(), TxError> {
            let tx = conn.transaction()?;
            let message = require_message(&tx, id)?;
            if message.status == MessageStatus::Sent {
                return Err(CourierError::InvalidTransition {
                    id: id.to_string(),
                    from: message.status.to_string(),
                    to: if is_paused { "paused" } else { "unpaused" }.to_string(),
                }
                .into());
            }
            tx.execute(
                "UPDATE messages SET is_paused = ?1, pause_reason = ?2, paused_at = ?3, paused_by = ?4
                 WHERE id = ?5",
                params![is_paused, reason, at, by, id],
            )?;
            tx.commit()?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

/// Soft delete. The row stays but leaves every counter and the eligible batch.
pub async fn soft_delete_message(db: &Database, id: i64) -> Result<(), CourierError> {
    db.connection()
        .call(move |conn| -> Result<(), TxError> {
            let tx = conn.transaction()?;
            let message = require_message(&tx, id)?;
            if message.is_deleted {
                return Ok(());
            }
            tx.execute("UPDATE messages SET is_deleted = 1 WHERE id = ?1", params![id])?;
            counters::recompute(&tx, &[message.session_id.as_str()])?;
            tx.commit()?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}
