//! The payout fee schedule. These are the only definitions of the platform's
//! conversion rate and fees; everything that prices a payout goes through
//! [`quote`].

use fanonym_types::models::PayoutQuote;

use crate::error::{LedgerError, Result};

/// IDR value of one kredit.
pub const KREDIT_TO_IDR: u64 = 10_000;

/// Share of the gross payout the platform keeps, in percent.
pub const PLATFORM_FEE_PERCENT: u64 = 20;

/// Flat bank transfer fee charged on small payouts.
pub const TRANSFER_FEE_IDR: u64 = 30_000;

/// Payouts at or above this amount (after the platform fee) transfer free.
pub const FREE_TRANSFER_MIN_IDR: u64 = 1_000_000;

/// Price a payout of `credits`.
pub fn quote(credits: u64) -> Result<PayoutQuote> {
    let gross_idr = credits
        .checked_mul(KREDIT_TO_IDR)
        .ok_or_else(|| LedgerError::invalid("amount too large"))?;

    let platform_fee_idr = platform_fee(gross_idr);
    let net_before_transfer = gross_idr - platform_fee_idr;
    let transfer_fee_idr = if net_before_transfer < FREE_TRANSFER_MIN_IDR {
        TRANSFER_FEE_IDR
    } else {
        0
    };

    Ok(PayoutQuote {
        credits,
        gross_idr,
        platform_fee_idr,
        transfer_fee_idr,
        net_idr: net_before_transfer.saturating_sub(transfer_fee_idr),
    })
}

/// round(gross * PLATFORM_FEE_PERCENT / 100) in integer arithmetic.
fn platform_fee(gross_idr: u64) -> u64 {
    let scaled = u128::from(gross_idr) * u128::from(PLATFORM_FEE_PERCENT);
    // Never exceeds gross_idr, so it fits back into u64.
    ((scaled + 50) / 100) as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hundred_credits_pay_transfer_fee() {
        let q = quote(100).unwrap();
        assert_eq!(q.gross_idr, 1_000_000);
        assert_eq!(q.platform_fee_idr, 200_000);
        assert_eq!(q.transfer_fee_idr, 30_000);
        assert_eq!(q.net_idr, 770_000);
    }

    #[test]
    fn threshold_is_measured_after_platform_fee() {
        // 125 credits: 1,250,000 gross, 250,000 fee, exactly 1,000,000 left.
        let q = quote(125).unwrap();
        assert_eq!(q.transfer_fee_idr, 0);
        assert_eq!(q.net_idr, 1_000_000);

        let q = quote(124).unwrap();
        assert_eq!(q.transfer_fee_idr, TRANSFER_FEE_IDR);
    }

    #[test]
    fn tiny_payouts_net_to_zero() {
        let q = quote(1).unwrap();
        assert_eq!(q.net_idr, 0);
        assert_eq!(quote(0).unwrap().net_idr, 0);
    }

    #[test]
    fn platform_fee_rounds_to_nearest() {
        assert_eq!(platform_fee(1), 0);
        assert_eq!(platform_fee(3), 1);
        assert_eq!(platform_fee(5), 1);
        assert_eq!(platform_fee(8), 2);
        assert_eq!(platform_fee(u64::MAX), u64::MAX / 5);
    }

    #[test]
    fn overflowing_amount_is_rejected() {
        assert!(matches!(quote(u64::MAX), Err(LedgerError::InvalidInput(_))));
    }
}
