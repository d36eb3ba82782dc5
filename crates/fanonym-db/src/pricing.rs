use anyhow::Result;
use rusqlite::{Connection, Row};

use crate::OptionalExt;
use crate::models::PricingOptionRow;

pub fn get(conn: &Connection, id: &str) -> Result<Option<PricingOptionRow>> {
    conn.query_row(
        "SELECT id, creator_id, duration_hours, price_credits FROM pricing_options WHERE id = ?1",
        [id],
        map_option,
    )
    .optional()
}

pub fn list_for_creator(conn: &Connection, creator_id: &str) -> Result<Vec<PricingOptionRow>> {
    let mut stmt = conn.prepare(
        "SELECT id, creator_id, duration_hours, price_credits
         FROM pricing_options
         WHERE creator_id = ?1
         ORDER BY duration_hours",
    )?;
    let rows = stmt
        .query_map([creator_id], map_option)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// Insert or reprice the creator's option for `duration_hours`. An existing
/// option keeps its id so sessions can still be extended with it.
pub fn upsert(conn: &Connection, row: &PricingOptionRow) -> Result<()> {
    conn.execute(
        "INSERT INTO pricing_options (id, creator_id, duration_hours, price_credits)
         VALUES (?1, ?2, ?3, ?4)
         ON CONFLICT (creator_id, duration_hours)
         DO UPDATE SET price_credits = excluded.price_credits",
        rusqlite::params![row.id, row.creator_id, row.duration_hours, row.price_credits],
    )?;
    Ok(())
}

/// Remove every option of the creator whose duration is not in `keep`.
pub fn delete_other_durations(conn: &Connection, creator_id: &str, keep: &[i64]) -> Result<usize> {
    if keep.is_empty() {
        let n = conn.execute("DELETE FROM pricing_options WHERE creator_id = ?1", [creator_id])?;
        return Ok(n);
    }

    let placeholders: Vec<String> = (2..=keep.len() + 1).map(|i| format!("?{}", i)).collect();
    let sql = format!(
        "DELETE FROM pricing_options WHERE creator_id = ?1 AND duration_hours NOT IN ({})",
        placeholders.join(", ")
    );

    let mut params: Vec<&dyn rusqlite::types::ToSql> = Vec::with_capacity(keep.len() + 1);
    params.push(&creator_id);
    params.extend(keep.iter().map(|d| d as &dyn rusqlite::types::ToSql));

    let n = conn.execute(&sql, params.as_slice())?;
    Ok(n)
}

fn map_option(row: &Row<'_>) -> rusqlite::Result<PricingOptionRow> {
    Ok(PricingOptionRow {
        id: row.get(0)?,
        creator_id: row.get(1)?,
        duration_hours: row.get(2)?,
        price_credits: row.get(3)?,
    })
}
