//! Balance records. The only code that writes the `balances` table; every
//! write also appends a journal entry under the operation id that caused it.

use rusqlite::Connection;

use fanonym_db::balances;
use fanonym_db::models::EntryRow;
use fanonym_db::operations;
use fanonym_types::models::{AccountId, BalanceKind, Balances, LedgerEntry};

use crate::error::{LedgerError, Result};
use crate::{Ledger, fmt_ts, from_db_amount, parse_id, parse_ts, to_db_amount};

/// Take `amount` from the balance, failing with `InsufficientFunds` (and
/// writing nothing) if it would go negative. Check and write are one statement.
pub(crate) fn debit(
    conn: &Connection,
    op_id: &str,
    owner: AccountId,
    kind: BalanceKind,
    amount: u64,
    now: &str,
) -> Result<u64> {
    let delta = to_db_amount(amount)?;
    let owner_id = owner.to_string();

    match balances::debit(conn, &owner_id, kind.as_str(), delta, now)? {
        Some(after) => {
            journal(conn, op_id, &owner_id, kind, -delta, after, now)?;
            from_db_amount(after)
        }
        None => {
            let available = from_db_amount(balances::get(conn, &owner_id, kind.as_str())?)?;
            Err(LedgerError::InsufficientFunds {
                needed: amount,
                available,
            })
        }
    }
}

pub(crate) fn credit(
    conn: &Connection,
    op_id: &str,
    owner: AccountId,
    kind: BalanceKind,
    amount: u64,
    now: &str,
) -> Result<u64> {
    let delta = to_db_amount(amount)?;
    let owner_id = owner.to_string();

    let after = balances::credit(conn, &owner_id, kind.as_str(), delta, now)?;
    journal(conn, op_id, &owner_id, kind, delta, after, now)?;
    from_db_amount(after)
}

fn journal(
    conn: &Connection,
    op_id: &str,
    owner_id: &str,
    kind: BalanceKind,
    delta: i64,
    balance_after: i64,
    now: &str,
) -> Result<()> {
    operations::insert_entry(
        conn,
        &EntryRow {
            op_id: op_id.to_string(),
            owner_id: owner_id.to_string(),
            kind: kind.as_str().to_string(),
            delta,
            balance_after,
            created_at: now.to_string(),
        },
    )?;
    Ok(())
}

impl Ledger {
    pub fn get_balance(&self, account: AccountId, kind: BalanceKind) -> Result<u64> {
        let amount = self
            .db
            .with_conn(|conn| balances::get(conn, &account.to_string(), kind.as_str()))?;
        from_db_amount(amount)
    }

    pub fn balances(&self, account: AccountId) -> Result<Balances> {
        let rows = self
            .db
            .with_conn(|conn| balances::list(conn, &account.to_string()))?;

        let mut out = Balances::default();
        for (kind, amount) in rows {
            match BalanceKind::parse(&kind) {
                Some(BalanceKind::SenderCredit) => out.sender_credit = from_db_amount(amount)?,
                Some(BalanceKind::CreatorEarning) => out.creator_earning = from_db_amount(amount)?,
                None => return Err(LedgerError::corrupt("balance kind", kind)),
            }
        }
        Ok(out)
    }

    /// Apply a signed adjustment to one balance as its own transaction.
    /// Negative deltas fail with `InsufficientFunds` rather than overdraw.
    pub fn adjust_balance(
        &self,
        op_id: &str,
        account: AccountId,
        kind: BalanceKind,
        delta: i64,
    ) -> Result<u64> {
        self.retry_once("adjust_balance", || {
            let now = fmt_ts(self.now());
            self.db.with_tx(|tx| {
                if delta < 0 {
                    debit(tx, op_id, account, kind, delta.unsigned_abs(), &now)
                } else if delta > 0 {
                    credit(tx, op_id, account, kind, delta.unsigned_abs(), &now)
                } else {
                    from_db_amount(balances::get(tx, &account.to_string(), kind.as_str())?)
                }
            })
        })
    }

    /// Most recent balance changes of an account, newest first.
    pub fn history(&self, account: AccountId, limit: u32) -> Result<Vec<LedgerEntry>> {
        let rows = self
            .db
            .with_conn(|conn| operations::entries_for_owner(conn, &account.to_string(), limit))?;

        rows.into_iter()
            .map(|row| {
                Ok(LedgerEntry {
                    op_id: row.op_id,
                    owner_id: parse_id(&row.owner_id)?,
                    kind: BalanceKind::parse(&row.kind)
                        .ok_or_else(|| LedgerError::corrupt("balance kind", &row.kind))?,
                    delta: row.delta,
                    balance_after: from_db_amount(row.balance_after)?,
                    created_at: parse_ts(&row.created_at)?,
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil;
    use uuid::Uuid;

    #[test]
    fn adjust_refuses_to_overdraw() {
        let (ledger, _) = testutil::ledger();
        let a = Uuid::new_v4();

        assert_eq!(ledger.adjust_balance("op-1", a, BalanceKind::SenderCredit, 5).unwrap(), 5);

        let err = ledger
            .adjust_balance("op-2", a, BalanceKind::SenderCredit, -10)
            .unwrap_err();
        assert!(matches!(
            err,
            LedgerError::InsufficientFunds {
                needed: 10,
                available: 5
            }
        ));
        assert_eq!(ledger.get_balance(a, BalanceKind::SenderCredit).unwrap(), 5);

        assert_eq!(ledger.adjust_balance("op-3", a, BalanceKind::SenderCredit, -5).unwrap(), 0);
    }

    #[test]
    fn missing_account_reads_as_zero() {
        let (ledger, _) = testutil::ledger();
        let a = Uuid::new_v4();
        assert_eq!(ledger.get_balance(a, BalanceKind::CreatorEarning).unwrap(), 0);
        assert_eq!(ledger.balances(a).unwrap(), Balances::default());
    }

    #[test]
    fn history_journals_every_change_newest_first() {
        let (ledger, _) = testutil::ledger();
        let a = Uuid::new_v4();

        ledger.adjust_balance("op-1", a, BalanceKind::SenderCredit, 7).unwrap();
        ledger.adjust_balance("op-2", a, BalanceKind::SenderCredit, -3).unwrap();
        let _ = ledger.adjust_balance("op-3", a, BalanceKind::SenderCredit, -100);

        let history = ledger.history(a, 10).unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].op_id, "op-2");
        assert_eq!(history[0].delta, -3);
        assert_eq!(history[0].balance_after, 4);
        assert_eq!(history[1].balance_after, 7);
    }
}
