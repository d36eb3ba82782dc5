use anyhow::Result;
use rusqlite::Connection;
use tracing::info;

pub fn run(conn: &Connection) -> Result<()> {
    conn.execute_batch("CREATE TABLE IF NOT EXISTS schema_version (version INTEGER NOT NULL);")?;

    let version: i64 = conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM schema_version",
        [],
        |r| r.get(0),
    )?;

    if version < 1 {
        info!("Ledger DB: running migration v1 (initial schema)");
        conn.execute_batch(
            "
            CREATE TABLE balances (
                owner_id    TEXT NOT NULL,
                kind        TEXT NOT NULL CHECK (kind IN ('sender_credit', 'creator_earning')),
                amount      INTEGER NOT NULL DEFAULT 0 CHECK (amount >= 0),
                updated_at  TEXT NOT NULL,
                PRIMARY KEY (owner_id, kind)
            );

            CREATE TABLE pricing_options (
                id              TEXT PRIMARY KEY,
                creator_id      TEXT NOT NULL,
                duration_hours  INTEGER NOT NULL CHECK (duration_hours BETWEEN 1 AND 8760),
                price_credits   INTEGER NOT NULL CHECK (price_credits > 0),
                UNIQUE (creator_id, duration_hours)
            );

            CREATE TABLE chat_sessions (
                id                   TEXT PRIMARY KEY,
                sender_id            TEXT NOT NULL,
                creator_id           TEXT NOT NULL,
                credits_paid         INTEGER NOT NULL CHECK (credits_paid >= 0),
                duration_hours       INTEGER NOT NULL CHECK (duration_hours > 0),
                status               TEXT NOT NULL
                                     CHECK (status IN ('pending_accept', 'active', 'deleted')),
                is_accepted          INTEGER NOT NULL DEFAULT 0,
                credits_transferred  INTEGER NOT NULL DEFAULT 0,
                extension_count      INTEGER NOT NULL DEFAULT 0,
                created_at           TEXT NOT NULL,
                accepted_at          TEXT,
                expires_at           TEXT,
                request_key          TEXT NOT NULL,
                UNIQUE (sender_id, request_key)
            );

            CREATE INDEX idx_sessions_sender ON chat_sessions(sender_id, created_at);
            CREATE INDEX idx_sessions_creator ON chat_sessions(creator_id, created_at);

            CREATE TABLE withdrawals (
                id                TEXT PRIMARY KEY,
                creator_id        TEXT NOT NULL,
                amount            INTEGER NOT NULL CHECK (amount > 0),
                bank_name         TEXT NOT NULL,
                account_number    TEXT NOT NULL,
                account_holder    TEXT NOT NULL,
                gross_idr         INTEGER NOT NULL,
                platform_fee_idr  INTEGER NOT NULL,
                transfer_fee_idr  INTEGER NOT NULL,
                net_idr           INTEGER NOT NULL,
                status            TEXT NOT NULL DEFAULT 'pending'
                                  CHECK (status IN ('pending', 'completed', 'rejected')),
                note              TEXT,
                created_at        TEXT NOT NULL,
                resolved_at       TEXT
            );

            CREATE INDEX idx_withdrawals_creator ON withdrawals(creator_id, created_at);

            -- One row per applied chargeable event; the primary key is the
            -- idempotency guard.
            CREATE TABLE ledger_operations (
                op_id       TEXT PRIMARY KEY,
                kind        TEXT NOT NULL,
                sender_id   TEXT,
                creator_id  TEXT,
                amount      INTEGER NOT NULL,
                created_at  TEXT NOT NULL
            );

            CREATE TABLE ledger_entries (
                id             INTEGER PRIMARY KEY AUTOINCREMENT,
                op_id          TEXT NOT NULL,
                owner_id       TEXT NOT NULL,
                kind           TEXT NOT NULL,
                delta          INTEGER NOT NULL,
                balance_after  INTEGER NOT NULL,
                created_at     TEXT NOT NULL
            );

            CREATE INDEX idx_entries_owner ON ledger_entries(owner_id, id);

            INSERT INTO schema_version (version) VALUES (1);
            ",
        )?;
    }

    info!("Database migrations complete");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn migrations_are_rerunnable() {
        let conn = Connection::open_in_memory().unwrap();
        run(&conn).unwrap();
        run(&conn).unwrap();

        let version: i64 = conn
            .query_row("SELECT MAX(version) FROM schema_version", [], |r| r.get(0))
            .unwrap();
        assert_eq!(version, 1);
    }
}
