use anyhow::Result;
use rusqlite::{Connection, Row};

use crate::OptionalExt;
use crate::models::{EntryRow, OperationRow};

// -- Operations (idempotency records) --

pub fn get(conn: &Connection, op_id: &str) -> Result<Option<OperationRow>> {
    conn.query_row(
        "SELECT op_id, kind, sender_id, creator_id, amount, created_at
         FROM ledger_operations WHERE op_id = ?1",
        [op_id],
        map_operation,
    )
    .optional()
}

pub fn insert(conn: &Connection, row: &OperationRow) -> Result<()> {
    conn.execute(
        "INSERT INTO ledger_operations (op_id, kind, sender_id, creator_id, amount, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        rusqlite::params![
            row.op_id,
            row.kind,
            row.sender_id,
            row.creator_id,
            row.amount,
            row.created_at
        ],
    )?;
    Ok(())
}

fn map_operation(row: &Row<'_>) -> rusqlite::Result<OperationRow> {
    Ok(OperationRow {
        op_id: row.get(0)?,
        kind: row.get(1)?,
        sender_id: row.get(2)?,
        creator_id: row.get(3)?,
        amount: row.get(4)?,
        created_at: row.get(5)?,
    })
}

// -- Entries (balance journal) --

pub fn insert_entry(conn: &Connection, entry: &EntryRow) -> Result<()> {
    conn.execute(
        "INSERT INTO ledger_entries (op_id, owner_id, kind, delta, balance_after, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        rusqlite::params![
            entry.op_id,
            entry.owner_id,
            entry.kind,
            entry.delta,
            entry.balance_after,
            entry.created_at
        ],
    )?;
    Ok(())
}

/// Newest first.
pub fn entries_for_owner(conn: &Connection, owner_id: &str, limit: u32) -> Result<Vec<EntryRow>> {
    let mut stmt = conn.prepare(
        "SELECT op_id, owner_id, kind, delta, balance_after, created_at
         FROM ledger_entries
         WHERE owner_id = ?1
         ORDER BY id DESC
         LIMIT ?2",
    )?;

    let rows = stmt
        .query_map(rusqlite::params![owner_id, limit], |row| {
            Ok(EntryRow {
                op_id: row.get(0)?,
                owner_id: row.get(1)?,
                kind: row.get(2)?,
                delta: row.get(3)?,
                balance_after: row.get(4)?,
                created_at: row.get(5)?,
            })
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    Ok(rows)
}
