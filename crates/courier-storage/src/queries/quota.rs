// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Per-account quota rows. Accounts without a row use the configured defaults.

use courier_config::model::QuotaConfig;
use courier_core::types::{Allowance, Quota};
use courier_core::CourierError;
use rusqlite::{params, Connection};
use tracing::debug;

use crate::database::{map_tr_err, Database, TxError};
use crate::queries::optional;

pub(crate) fn fetch_quota(
    conn: &Connection,
    account_id: &str,
    defaults: &QuotaConfig,
) -> rusqlite::Result<Quota> {
    let row = optional(conn.query_row(
        "SELECT message_limit, messages_consumed, queue_limit, queues_consumed
         FROM quotas WHERE account_id = ?1",
        params![account_id],
        |row| {
            Ok((
                Allowance {
                    limit: row.get(0)?,
                    consumed: row.get(1)?,
                },
                Allowance {
                    limit: row.get(2)?,
                    consumed: row.get(3)?,
                },
            ))
        },
    ))?;
    let (messages, queues) = row.unwrap_or((
        Allowance {
            limit: defaults.default_message_limit,
            consumed: 0,
        },
        Allowance {
            limit: defaults.default_queue_limit,
            consumed: 0,
        },
    ));
    Ok(Quota {
        account_id: account_id.to_string(),
        messages,
        queues,
    })
}

fn ensure_row(conn: &Connection, account_id: &str, defaults: &QuotaConfig) -> rusqlite::Result<()> {
    conn.execute(
        "INSERT OR IGNORE INTO quotas (account_id, message_limit, queue_limit)
         VALUES (?1, ?2, ?3)",
        params![
            account_id,
            defaults.default_message_limit,
            defaults.default_queue_limit
        ],
    )?;
    Ok(())
}

/// Consume `n` message allowances. Must run inside the caller's transaction.
pub(crate) fn consume_messages(
    conn: &Connection,
    account_id: &str,
    n: i64,
    defaults: &QuotaConfig,
) -> rusqlite::Result<()> {
    ensure_row(conn, account_id, defaults)?;
    conn.execute(
        "UPDATE quotas SET messages_consumed = messages_consumed + ?1,
             updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')
         WHERE account_id = ?2",
        params![n, account_id],
    )?;
    Ok(())
}

/// Consume one queue allowance. Must run inside the caller's transaction.
pub(crate) fn consume_queue(
    conn: &Connection,
    account_id: &str,
    defaults: &QuotaConfig,
) -> rusqlite::Result<()> {
    ensure_row(conn, account_id, defaults)?;
    conn.execute(
        "UPDATE quotas SET queues_consumed = queues_consumed + 1,
             updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')
         WHERE account_id = ?1",
        params![account_id],
    )?;
    Ok(())
}

pub async fn get_quota(
    db: &Database,
    account_id: &str,
    defaults: &QuotaConfig,
) -> Result<Quota, CourierError> {
    let account_id = account_id.to_string();
    let defaults = defaults.clone();
    db.connection()
        .call(move |conn| -> Result<_, TxError> { Ok(fetch_quota(conn, &account_id, &defaults)?) })
        .await
        .map_err(map_tr_err)
}

/// Set both limits, keeping what was already consumed. `-1` means unlimited.
pub async fn set_quota_limits(
    db: &Database,
    account_id: &str,
    message_limit: i64,
    queue_limit: i64,
) -> Result<(), CourierError> {
    for (what, limit) in [("message", message_limit), ("queue", queue_limit)] {
        if limit < Allowance::UNLIMITED {
            return Err(CourierError::Validation(format!(
                "{what} limit must be -1 (unlimited) or non-negative, got {limit}"
            )));
        }
    }
    let account_id = account_id.to_string();
    db.connection()
        .call(move |conn| -> Result<(), TxError> {
            conn.execute(
                "INSERT INTO quotas (account_id, message_limit, queue_limit)
                 VALUES (?1, ?2, ?3)
                 ON CONFLICT(account_id) DO UPDATE SET
                     message_limit = excluded.message_limit,
                     queue_limit = excluded.queue_limit,
                     updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')",
                params![account_id, message_limit, queue_limit],
            )?;
            debug!(account = %account_id, message_limit, queue_limit, "quota limits updated");
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}
