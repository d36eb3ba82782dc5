use anyhow::Result;
use rusqlite::{Connection, Row};

use crate::OptionalExt;
use crate::models::WithdrawalRow;

const WITHDRAWAL_COLUMNS: &str = "id, creator_id, amount, bank_name, account_number, account_holder,
    gross_idr, platform_fee_idr, transfer_fee_idr, net_idr, status, note, created_at, resolved_at";

pub fn insert(conn: &Connection, row: &WithdrawalRow) -> Result<()> {
    conn.execute(
        "INSERT INTO withdrawals (id, creator_id, amount, bank_name, account_number, account_holder,
             gross_idr, platform_fee_idr, transfer_fee_idr, net_idr, status, note, created_at, resolved_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)",
        rusqlite::params![
            row.id,
            row.creator_id,
            row.amount,
            row.bank_name,
            row.account_number,
            row.account_holder,
            row.gross_idr,
            row.platform_fee_idr,
            row.transfer_fee_idr,
            row.net_idr,
            row.status,
            row.note,
            row.created_at,
            row.resolved_at
        ],
    )?;
    Ok(())
}

pub fn get(conn: &Connection, id: &str) -> Result<Option<WithdrawalRow>> {
    let sql = format!("SELECT {WITHDRAWAL_COLUMNS} FROM withdrawals WHERE id = ?1");
    conn.query_row(&sql, [id], map_withdrawal).optional()
}

pub fn list_for_creator(conn: &Connection, creator_id: &str) -> Result<Vec<WithdrawalRow>> {
    let sql = format!(
        "SELECT {WITHDRAWAL_COLUMNS} FROM withdrawals WHERE creator_id = ?1 ORDER BY created_at DESC"
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map([creator_id], map_withdrawal)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// Oldest first, the order an operator works through them.
pub fn list_pending(conn: &Connection) -> Result<Vec<WithdrawalRow>> {
    let sql = format!(
        "SELECT {WITHDRAWAL_COLUMNS} FROM withdrawals WHERE status = 'pending' ORDER BY created_at"
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map([], map_withdrawal)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// `pending -> status`. Returns 0 if the request was already resolved.
pub fn resolve(
    conn: &Connection,
    id: &str,
    status: &str,
    note: Option<&str>,
    resolved_at: &str,
) -> Result<usize> {
    let n = conn.execute(
        "UPDATE withdrawals SET status = ?2, note = ?3, resolved_at = ?4
         WHERE id = ?1 AND status = 'pending'",
        rusqlite::params![id, status, note, resolved_at],
    )?;
    Ok(n)
}

fn map_withdrawal(row: &Row<'_>) -> rusqlite::Result<WithdrawalRow> {
    Ok(WithdrawalRow {
        id: row.get(0)?,
        creator_id: row.get(1)?,
        amount: row.get(2)?,
        bank_name: row.get(3)?,
        account_number: row.get(4)?,
        account_holder: row.get(5)?,
        gross_idr: row.get(6)?,
        platform_fee_idr: row.get(7)?,
        transfer_fee_idr: row.get(8)?,
        net_idr: row.get(9)?,
        status: row.get(10)?,
        note: row.get(11)?,
        created_at: row.get(12)?,
        resolved_at: row.get(13)?,
    })
}
