use rusqlite::Connection;
use tracing::info;
use uuid::Uuid;

use fanonym_db::models::WithdrawalRow;
use fanonym_db::withdrawals;
use fanonym_types::models::{
    AccountId, BalanceKind, BankDetails, OperationKind, PayoutQuote, WithdrawalOutcome,
    WithdrawalRequest, WithdrawalStatus,
};

use crate::error::{LedgerError, Result};
use crate::escrow::{self, Operation};
use crate::fees;
use crate::{Ledger, fmt_ts, from_db_amount, parse_id, parse_opt_ts, parse_ts, to_db_amount};

fn withdrawal_from_row(row: WithdrawalRow) -> Result<WithdrawalRequest> {
    Ok(WithdrawalRequest {
        id: parse_id(&row.id)?,
        creator_id: parse_id(&row.creator_id)?,
        amount: from_db_amount(row.amount)?,
        quote: PayoutQuote {
            credits: from_db_amount(row.amount)?,
            gross_idr: from_db_amount(row.gross_idr)?,
            platform_fee_idr: from_db_amount(row.platform_fee_idr)?,
            transfer_fee_idr: from_db_amount(row.transfer_fee_idr)?,
            net_idr: from_db_amount(row.net_idr)?,
        },
        status: WithdrawalStatus::parse(&row.status)
            .ok_or_else(|| LedgerError::corrupt("withdrawal status", &row.status))?,
        created_at: parse_ts(&row.created_at)?,
        resolved_at: parse_opt_ts(row.resolved_at.as_deref())?,
        bank: BankDetails {
            bank_name: row.bank_name,
            account_number: row.account_number,
            account_holder: row.account_holder,
        },
        note: row.note,
    })
}

fn load(conn: &Connection, id: Uuid) -> Result<WithdrawalRequest> {
    let row = withdrawals::get(conn, &id.to_string())?.ok_or(LedgerError::NotFound("withdrawal"))?;
    withdrawal_from_row(row)
}

fn validate_bank(bank: &BankDetails) -> Result<()> {
    for (field, value) in [
        ("bank name", &bank.bank_name),
        ("account number", &bank.account_number),
        ("account holder", &bank.account_holder),
    ] {
        if value.trim().is_empty() {
            return Err(LedgerError::invalid(format!("{} is required", field)));
        }
    }
    Ok(())
}

impl Ledger {
    /// Price a payout without touching any balance.
    pub fn quote_withdrawal(&self, amount: u64) -> Result<PayoutQuote> {
        fees::quote(amount)
    }

    /// Hold `amount` of the creator's earnings and open a pending payout.
    pub fn request_withdrawal(
        &self,
        creator_id: AccountId,
        amount: u64,
        bank: BankDetails,
    ) -> Result<WithdrawalRequest> {
        if amount == 0 {
            return Err(LedgerError::invalid("withdrawal amount must be positive"));
        }
        validate_bank(&bank)?;

        let quote = fees::quote(amount)?;
        if quote.net_idr == 0 {
            return Err(LedgerError::invalid("payout does not cover the transfer fee"));
        }

        let id = Uuid::new_v4();
        let op_id = format!("withdrawal:{}:hold", id);

        let request = self.retry_once("request_withdrawal", || {
            let ts = fmt_ts(self.now());
            self.db.with_tx(|tx| {
                let op = Operation {
                    op_id: &op_id,
                    kind: OperationKind::WithdrawalHold,
                    sender_id: None,
                    creator_id: Some(creator_id),
                    amount,
                };
                escrow::hold(tx, &op, (creator_id, BalanceKind::CreatorEarning), &ts)?;

                withdrawals::insert(
                    tx,
                    &WithdrawalRow {
                        id: id.to_string(),
                        creator_id: creator_id.to_string(),
                        amount: to_db_amount(amount)?,
                        bank_name: bank.bank_name.trim().to_string(),
                        account_number: bank.account_number.trim().to_string(),
                        account_holder: bank.account_holder.trim().to_string(),
                        gross_idr: to_db_amount(quote.gross_idr)?,
                        platform_fee_idr: to_db_amount(quote.platform_fee_idr)?,
                        transfer_fee_idr: to_db_amount(quote.transfer_fee_idr)?,
                        net_idr: to_db_amount(quote.net_idr)?,
                        status: WithdrawalStatus::Pending.as_str().to_string(),
                        note: None,
                        created_at: ts.clone(),
                        resolved_at: None,
                    },
                )?;

                load(tx, id)
            })
        })?;

        info!(
            "Withdrawal {} requested by {}: {} credits, {} IDR net",
            id, creator_id, amount, quote.net_idr
        );
        Ok(request)
    }

    /// Close a pending payout. `Completed` keeps the hold; `Rejected` returns
    /// exactly the held amount to the creator's earnings.
    pub fn resolve_withdrawal(
        &self,
        id: Uuid,
        outcome: WithdrawalOutcome,
        note: Option<String>,
    ) -> Result<WithdrawalRequest> {
        let status = WithdrawalStatus::from(outcome);

        let request = self.retry_once("resolve_withdrawal", || {
            let ts = fmt_ts(self.now());
            self.db.with_tx(|tx| {
                let current = load(tx, id)?;
                let changed =
                    withdrawals::resolve(tx, &id.to_string(), status.as_str(), note.as_deref(), &ts)?;
                if changed == 0 {
                    return Err(LedgerError::InvalidStateTransition {
                        entity: "withdrawal",
                        from: current.status.as_str().to_string(),
                        action: "resolve",
                    });
                }

                if status == WithdrawalStatus::Rejected {
                    let op_id = format!("withdrawal:{}:refund", id);
                    let op = Operation {
                        op_id: &op_id,
                        kind: OperationKind::WithdrawalRefund,
                        sender_id: None,
                        creator_id: Some(current.creator_id),
                        amount: current.amount,
                    };
                    escrow::release(tx, &op, (current.creator_id, BalanceKind::CreatorEarning), &ts)?;
                }

                load(tx, id)
            })
        })?;

        info!("Withdrawal {} resolved as {}", id, status.as_str());
        Ok(request)
    }

    pub fn get_withdrawal(&self, id: Uuid) -> Result<WithdrawalRequest> {
        let row = self
            .db
            .with_conn(|conn| withdrawals::get(conn, &id.to_string()))?
            .ok_or(LedgerError::NotFound("withdrawal"))?;
        withdrawal_from_row(row)
    }

    /// A creator's payouts, newest first.
    pub fn list_withdrawals(&self, creator_id: AccountId) -> Result<Vec<WithdrawalRequest>> {
        let rows = self
            .db
            .with_conn(|conn| withdrawals::list_for_creator(conn, &creator_id.to_string()))?;
        rows.into_iter().map(withdrawal_from_row).collect()
    }

    /// Every unresolved payout, oldest first.
    pub fn pending_withdrawals(&self) -> Result<Vec<WithdrawalRequest>> {
        let rows = self.db.with_conn(|conn| withdrawals::list_pending(conn))?;
        rows.into_iter().map(withdrawal_from_row).collect()
    }
}
