use anyhow::Result;
use rusqlite::Connection;

use crate::OptionalExt;

/// Current balance; an account with no row holds zero.
pub fn get(conn: &Connection, owner_id: &str, kind: &str) -> Result<i64> {
    let amount = conn
        .query_row(
            "SELECT amount FROM balances WHERE owner_id = ?1 AND kind = ?2",
            (owner_id, kind),
            |row| row.get(0),
        )
        .optional()?;

    Ok(amount.unwrap_or(0))
}

pub fn list(conn: &Connection, owner_id: &str) -> Result<Vec<(String, i64)>> {
    let mut stmt = conn.prepare("SELECT kind, amount FROM balances WHERE owner_id = ?1")?;
    let rows = stmt
        .query_map([owner_id], |row| Ok((row.get(0)?, row.get(1)?)))?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// Subtract `amount` in a single conditional statement. Returns the new
/// balance, or `None` when the balance is missing or too low, in which case
/// nothing was written.
pub fn debit(
    conn: &Connection,
    owner_id: &str,
    kind: &str,
    amount: i64,
    now: &str,
) -> Result<Option<i64>> {
    conn.query_row(
        "UPDATE balances SET amount = amount - ?3, updated_at = ?4
         WHERE owner_id = ?1 AND kind = ?2 AND amount >= ?3
         RETURNING amount",
        rusqlite::params![owner_id, kind, amount, now],
        |row| row.get(0),
    )
    .optional()
}

/// Add `amount`, creating the balance row on first credit. Returns the new balance.
pub fn credit(conn: &Connection, owner_id: &str, kind: &str, amount: i64, now: &str) -> Result<i64> {
    let balance = conn.query_row(
        "INSERT INTO balances (owner_id, kind, amount, updated_at) VALUES (?1, ?2, ?3, ?4)
         ON CONFLICT (owner_id, kind)
         DO UPDATE SET amount = amount + excluded.amount, updated_at = excluded.updated_at
         RETURNING amount",
        rusqlite::params![owner_id, kind, amount, now],
        |row| row.get(0),
    )?;
    Ok(balance)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::migrations;

    const NOW: &str = "2026-01-01T00:00:00Z";

    fn conn() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        migrations::run(&conn).unwrap();
        conn
    }

    #[test]
    fn debit_never_goes_negative() {
        let conn = conn();
        assert_eq!(credit(&conn, "a", "sender_credit", 5, NOW).unwrap(), 5);

        assert_eq!(debit(&conn, "a", "sender_credit", 10, NOW).unwrap(), None);
        assert_eq!(get(&conn, "a", "sender_credit").unwrap(), 5);

        assert_eq!(debit(&conn, "a", "sender_credit", 5, NOW).unwrap(), Some(0));
    }

    #[test]
    fn debit_of_missing_row_is_refused() {
        let conn = conn();
        assert_eq!(debit(&conn, "ghost", "creator_earning", 1, NOW).unwrap(), None);
        assert_eq!(get(&conn, "ghost", "creator_earning").unwrap(), 0);
    }

    #[test]
    fn kinds_are_independent() {
        let conn = conn();
        credit(&conn, "a", "sender_credit", 3, NOW).unwrap();
        credit(&conn, "a", "creator_earning", 7, NOW).unwrap();
        credit(&conn, "a", "creator_earning", 1, NOW).unwrap();

        let mut all = list(&conn, "a").unwrap();
        all.sort();
        assert_eq!(
            all,
            vec![("creator_earning".to_string(), 8), ("sender_credit".to_string(), 3)]
        );
    }
}
