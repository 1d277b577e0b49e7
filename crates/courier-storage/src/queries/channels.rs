// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Channel session operations (one automation channel per account).

use courier_core::types::{ChannelSession, ConnectionStatus, PauseState};
use courier_core::CourierError;
use rusqlite::{params, Connection, Row};

use crate::database::{map_tr_err, Database, TxError};
use crate::queries::{optional, parse_column, pause_from_row};

const CHANNEL_COLUMNS: &str = "id, account_id, connection_status, is_paused, pause_reason, \
     paused_at, paused_by, created_at, updated_at";

fn channel_from_row(row: &Row<'_>) -> rusqlite::Result<ChannelSession> {
    let connection: String = row.get(2)?;
    Ok(ChannelSession {
        id: row.get(0)?,
        account_id: row.get(1)?,
        connection: parse_column(2, &connection)?,
        pause: pause_from_row(row, 3)?,
        created_at: row.get(7)?,
        updated_at: row.get(8)?,
    })
}

pub(crate) fn fetch_channel(
    conn: &Connection,
    account_id: &str,
) -> rusqlite::Result<Option<ChannelSession>> {
    let sql = format!("SELECT {CHANNEL_COLUMNS} FROM channel_sessions WHERE account_id = ?1");
    optional(conn.query_row(&sql, params![account_id], channel_from_row))
}

fn not_found(account_id: &str) -> TxError {
    CourierError::NotFound {
        entity: "channel session",
        id: account_id.to_string(),
    }
    .into()
}

/// Create the channel session of an account if missing and return it.
pub async fn register_channel(db: &Database, account_id: &str) -> Result<ChannelSession, CourierError> {
    let account_id = account_id.to_string();
    let id = uuid::Uuid::new_v4().to_string();
    db.connection()
        .call(move |conn| -> Result<ChannelSession, TxError> {
            conn.execute(
                "INSERT OR IGNORE INTO channel_sessions (id, account_id) VALUES (?1, ?2)",
                params![id, account_id],
            )?;
            fetch_channel(conn, &account_id)?.ok_or_else(|| not_found(&account_id))
        })
        .await
        .map_err(map_tr_err)
}

pub async fn get_channel(db: &Database, account_id: &str) -> Result<Option<ChannelSession>, CourierError> {
    let account_id = account_id.to_string();
    db.connection()
        .call(move |conn| -> Result<_, TxError> { Ok(fetch_channel(conn, &account_id)?) })
        .await
        .map_err(map_tr_err)
}

pub async fn list_channels(db: &Database) -> Result<Vec<ChannelSession>, CourierError> {
    db.connection()
        .call(|conn| -> Result<_, TxError> {
            let sql = format!("SELECT {CHANNEL_COLUMNS} FROM channel_sessions ORDER BY account_id");
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt.query_map([], channel_from_row)?;
            Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
        })
        .await
        .map_err(map_tr_err)
}

/// Overwrite the global pause of an account.
pub async fn set_channel_pause(
    db: &Database,
    account_id: &str,
    pause: &PauseState,
) -> Result<(), CourierError> {
    let account_id = account_id.to_string();
    let (is_paused, reason, at, by) = pause.to_columns();
    db.connection()
        .call(move |conn| -> Result<(), TxError> {
            let changed = conn.execute(
                "UPDATE channel_sessions
                 SET is_paused = ?1, pause_reason = ?2, paused_at = ?3, paused_by = ?4,
                     updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')
                 WHERE account_id = ?5",
                params![is_paused, reason, at, by, account_id],
            )?;
            if changed == 0 {
                return Err(not_found(&account_id));
            }
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

pub async fn set_connection_status(
    db: &Database,
    account_id: &str,
    status: ConnectionStatus,
) -> Result<(), CourierError> {
    let account_id = account_id.to_string();
    db.connection()
        .call(move |conn| -> Result<(), TxError> {
            let changed = conn.execute(
                "UPDATE channel_sessions
                 SET connection_status = ?1,
                     updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')
                 WHERE account_id = ?2",
                params![status.to_string(), account_id],
            )?;
            if changed == 0 {
                return Err(not_found(&account_id));
            }
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}
