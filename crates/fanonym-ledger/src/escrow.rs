//! Moving credits between accounts, exactly once per operation id.

use chrono::{DateTime, Utc};
use rusqlite::Connection;
use tracing::{debug, info};

use fanonym_db::models::OperationRow;
use fanonym_db::operations;
use fanonym_types::models::{AccountId, BalanceKind, OperationKind, SessionCharge};

use crate::error::{LedgerError, Result};
use crate::store;
use crate::{Ledger, fmt_ts, from_db_amount, parse_id, parse_ts, to_db_amount};

/// A fund movement about to be applied, keyed by its idempotency id.
pub(crate) struct Operation<'a> {
    pub op_id: &'a str,
    pub kind: OperationKind,
    pub sender_id: Option<AccountId>,
    pub creator_id: Option<AccountId>,
    pub amount: u64,
}

impl Operation<'_> {
    fn record(&self, conn: &Connection, now: &str) -> Result<()> {
        operations::insert(
            conn,
            &OperationRow {
                op_id: self.op_id.to_string(),
                kind: self.kind.as_str().to_string(),
                sender_id: self.sender_id.map(|id| id.to_string()),
                creator_id: self.creator_id.map(|id| id.to_string()),
                amount: to_db_amount(self.amount)?,
                created_at: now.to_string(),
            },
        )?;
        Ok(())
    }

    /// Whether a stored operation describes the same movement as `self`.
    pub(crate) fn matches(&self, row: &OperationRow) -> bool {
        row.kind == self.kind.as_str()
            && row.sender_id == self.sender_id.map(|id| id.to_string())
            && row.creator_id == self.creator_id.map(|id| id.to_string())
            && to_db_amount(self.amount).is_ok_and(|amount| amount == row.amount)
    }
}

pub(crate) fn find(conn: &Connection, op_id: &str) -> Result<Option<OperationRow>> {
    Ok(operations::get(conn, op_id)?)
}

/// Take funds out of `from` into escrow and record the operation. Held
/// credits belong to no balance until released.
pub(crate) fn hold(
    conn: &Connection,
    op: &Operation<'_>,
    from: (AccountId, BalanceKind),
    now: &str,
) -> Result<u64> {
    let after = store::debit(conn, op.op_id, from.0, from.1, op.amount, now)?;
    op.record(conn, now)?;
    Ok(after)
}

/// Pay escrowed funds out to `to` and record the operation.
pub(crate) fn release(
    conn: &Connection,
    op: &Operation<'_>,
    to: (AccountId, BalanceKind),
    now: &str,
) -> Result<u64> {
    let after = store::credit(conn, op.op_id, to.0, to.1, op.amount, now)?;
    op.record(conn, now)?;
    Ok(after)
}

/// Move `amount` from the sender's credits to the creator's earnings.
/// Debit, credit and the idempotency record commit together or not at all.
pub(crate) fn charge(
    conn: &Connection,
    op_id: &str,
    kind: OperationKind,
    sender_id: AccountId,
    creator_id: AccountId,
    amount: u64,
    now: DateTime<Utc>,
) -> Result<SessionCharge> {
    if amount == 0 {
        return Err(LedgerError::invalid("charge amount must be positive"));
    }
    if sender_id == creator_id {
        return Err(LedgerError::invalid("sender and creator must be different accounts"));
    }

    let op = Operation {
        op_id,
        kind,
        sender_id: Some(sender_id),
        creator_id: Some(creator_id),
        amount,
    };

    if let Some(existing) = find(conn, op_id)? {
        if !op.matches(&existing) {
            return Err(LedgerError::invalid(format!(
                "operation id {} was already used for a different charge",
                op_id
            )));
        }
        debug!("Charge {} already applied, replaying", op_id);
        return Ok(SessionCharge {
            op_id: existing.op_id,
            kind,
            sender_id,
            creator_id,
            amount,
            replayed: true,
            created_at: parse_ts(&existing.created_at)?,
        });
    }

    let ts = fmt_ts(now);
    store::debit(conn, op_id, sender_id, BalanceKind::SenderCredit, amount, &ts)?;
    store::credit(conn, op_id, creator_id, BalanceKind::CreatorEarning, amount, &ts)?;
    op.record(conn, &ts)?;

    Ok(SessionCharge {
        op_id: op_id.to_string(),
        kind,
        sender_id,
        creator_id,
        amount,
        replayed: false,
        created_at: now,
    })
}

impl Ledger {
    /// Charge a sender for a chargeable event. Retrying with the same
    /// `op_id` returns the first charge with `replayed = true`.
    pub fn charge_for_session(
        &self,
        op_id: &str,
        kind: OperationKind,
        sender_id: AccountId,
        creator_id: AccountId,
        amount: u64,
    ) -> Result<SessionCharge> {
        let applied = self.retry_once("charge_for_session", || {
            let now = self.now();
            self.db
                .with_tx(|tx| charge(tx, op_id, kind, sender_id, creator_id, amount, now))
        })?;

        if !applied.replayed {
            info!(
                "Charged {} credits from {} to {} ({})",
                amount,
                sender_id,
                creator_id,
                kind.as_str()
            );
        }
        Ok(applied)
    }

    /// Credit a sender's balance once an external payment has settled.
    /// Returns the resulting balance and whether the grant was a replay.
    pub fn grant_credits(&self, op_id: &str, account: AccountId, amount: u64) -> Result<(u64, bool)> {
        if amount == 0 {
            return Err(LedgerError::invalid("grant amount must be positive"));
        }

        let op = Operation {
            op_id,
            kind: OperationKind::CreditGrant,
            sender_id: Some(account),
            creator_id: None,
            amount,
        };

        self.retry_once("grant_credits", || {
            let now = fmt_ts(self.now());
            self.db.with_tx(|tx| {
                if let Some(existing) = find(tx, op_id)? {
                    if !op.matches(&existing) {
                        return Err(LedgerError::invalid(format!(
                            "operation id {} was already used for a different grant",
                            op_id
                        )));
                    }
                    let balance = fanonym_db::balances::get(
                        tx,
                        &account.to_string(),
                        BalanceKind::SenderCredit.as_str(),
                    )?;
                    return Ok((from_db_amount(balance)?, true));
                }

                let balance = release(tx, &op, (account, BalanceKind::SenderCredit), &now)?;
                Ok((balance, false))
            })
        })
    }

    /// Look up an applied operation, for callers that want to know whether a
    /// retried request already went through.
    pub fn operation(&self, op_id: &str) -> Result<Option<(OperationKind, u64, AccountId)>> {
        let row = self.db.with_conn(|conn| operations::get(conn, op_id))?;
        row.map(|row| -> Result<(OperationKind, u64, AccountId)> {
            let kind = OperationKind::parse(&row.kind)
                .ok_or_else(|| LedgerError::corrupt("operation kind", &row.kind))?;
            let account = row
                .sender_id
                .as_deref()
                .or(row.creator_id.as_deref())
                .ok_or_else(|| LedgerError::corrupt("operation", &row.op_id))?;
            Ok((kind, from_db_amount(row.amount)?, parse_id(account)?))
        })
        .transpose()
    }
}
