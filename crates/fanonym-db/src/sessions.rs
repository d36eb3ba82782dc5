use anyhow::Result;
use rusqlite::{Connection, Row};

use crate::OptionalExt;
use crate::models::SessionRow;

const SESSION_COLUMNS: &str = "id, sender_id, creator_id, credits_paid, duration_hours, status,
    is_accepted, credits_transferred, extension_count, created_at, accepted_at, expires_at,
    request_key";

pub fn insert(conn: &Connection, row: &SessionRow) -> Result<()> {
    conn.execute(
        "INSERT INTO chat_sessions (id, sender_id, creator_id, credits_paid, duration_hours, status,
             is_accepted, credits_transferred, extension_count, created_at, accepted_at, expires_at,
             request_key)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
        rusqlite::params![
            row.id,
            row.sender_id,
            row.creator_id,
            row.credits_paid,
            row.duration_hours,
            row.status,
            row.is_accepted,
            row.credits_transferred,
            row.extension_count,
            row.created_at,
            row.accepted_at,
            row.expires_at,
            row.request_key
        ],
    )?;
    Ok(())
}

pub fn get(conn: &Connection, id: &str) -> Result<Option<SessionRow>> {
    let sql = format!("SELECT {SESSION_COLUMNS} FROM chat_sessions WHERE id = ?1");
    conn.query_row(&sql, [id], map_session).optional()
}

/// The session a sender opened with `request_key`, if any.
pub fn get_by_request_key(
    conn: &Connection,
    sender_id: &str,
    request_key: &str,
) -> Result<Option<SessionRow>> {
    let sql = format!(
        "SELECT {SESSION_COLUMNS} FROM chat_sessions WHERE sender_id = ?1 AND request_key = ?2"
    );
    conn.query_row(&sql, [sender_id, request_key], map_session).optional()
}

/// Sessions the account takes part in, as sender or creator, newest first.
pub fn list_for_account(conn: &Connection, account_id: &str) -> Result<Vec<SessionRow>> {
    let sql = format!(
        "SELECT {SESSION_COLUMNS} FROM chat_sessions
         WHERE sender_id = ?1 OR creator_id = ?1
         ORDER BY created_at DESC"
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map([account_id], map_session)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// `pending_accept -> active`. Matches only an unaccepted session whose
/// escrow has not been released; returns the number of rows changed (0 or 1).
pub fn mark_accepted(conn: &Connection, id: &str, accepted_at: &str, expires_at: &str) -> Result<usize> {
    let n = conn.execute(
        "UPDATE chat_sessions
         SET status = 'active', is_accepted = 1, credits_transferred = 1,
             accepted_at = ?2, expires_at = ?3
         WHERE id = ?1 AND status = 'pending_accept' AND is_accepted = 0
           AND credits_transferred = 0",
        (id, accepted_at, expires_at),
    )?;
    Ok(n)
}

/// Push an active session's expiry forward. `extension_count` acts as the
/// row version: the update only lands if nobody extended in between.
pub fn extend(
    conn: &Connection,
    id: &str,
    expected_extension_count: i64,
    add_credits: i64,
    add_hours: i64,
    expires_at: &str,
) -> Result<usize> {
    let n = conn.execute(
        "UPDATE chat_sessions
         SET credits_paid = credits_paid + ?3,
             duration_hours = duration_hours + ?4,
             expires_at = ?5,
             extension_count = extension_count + 1
         WHERE id = ?1 AND status = 'active' AND extension_count = ?2",
        rusqlite::params![id, expected_extension_count, add_credits, add_hours, expires_at],
    )?;
    Ok(n)
}

pub fn mark_deleted(conn: &Connection, id: &str, from_status: &str) -> Result<usize> {
    let n = conn.execute(
        "UPDATE chat_sessions SET status = 'deleted' WHERE id = ?1 AND status = ?2",
        (id, from_status),
    )?;
    Ok(n)
}

fn map_session(row: &Row<'_>) -> rusqlite::Result<SessionRow> {
    Ok(SessionRow {
        id: row.get(0)?,
        sender_id: row.get(1)?,
        creator_id: row.get(2)?,
        credits_paid: row.get(3)?,
        duration_hours: row.get(4)?,
        status: row.get(5)?,
        is_accepted: row.get(6)?,
        credits_transferred: row.get(7)?,
        extension_count: row.get(8)?,
        created_at: row.get(9)?,
        accepted_at: row.get(10)?,
        expires_at: row.get(11)?,
        request_key: row.get(12)?,
    })
}
