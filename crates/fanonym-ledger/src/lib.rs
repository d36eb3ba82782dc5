//! Credit ledger, session escrow and payout processing for Fanonym.
//!
//! [`Ledger`] is the single source of truth for balances, chat sessions and
//! withdrawals. Every operation that moves credits runs as one `IMMEDIATE`
//! SQLite transaction: balance checks are conditional updates inside that
//! transaction, state transitions are conditional on the state they leave, and
//! each movement is recorded under a unique operation id so a retried request
//! never charges twice.

pub mod clock;
pub mod error;
pub mod escrow;
pub mod fees;
pub mod pricing;
pub mod sessions;
pub mod store;
pub mod withdrawals;

use std::sync::Arc;

use chrono::{DateTime, SecondsFormat, Utc};
use tracing::warn;
use uuid::Uuid;

use fanonym_db::Database;

pub use clock::{Clock, ManualClock, SystemClock};
pub use error::{LedgerError, Result};

#[derive(Clone)]
pub struct Ledger {
    db: Arc<Database>,
    clock: Arc<dyn Clock>,
}

impl Ledger {
    pub fn new(db: Arc<Database>) -> Self {
        Self::with_clock(db, Arc::new(SystemClock))
    }

    pub fn with_clock(db: Arc<Database>, clock: Arc<dyn Clock>) -> Self {
        Self { db, clock }
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// Run `f`, and run it once more if it lost a race to a concurrent writer.
    fn retry_once<T>(&self, op: &str, mut f: impl FnMut() -> Result<T>) -> Result<T> {
        match f() {
            Err(LedgerError::ConcurrencyConflict) => {
                warn!("{}: concurrency conflict, retrying once", op);
                f()
            }
            other => other,
        }
    }
}

// -- Row conversion helpers --

/// Timestamps are stored as fixed-width RFC 3339 UTC so they sort as text.
pub(crate) fn fmt_ts(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub(crate) fn parse_ts(s: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|_| LedgerError::corrupt("timestamp", s))
}

pub(crate) fn parse_opt_ts(s: Option<&str>) -> Result<Option<DateTime<Utc>>> {
    s.map(parse_ts).transpose()
}

pub(crate) fn parse_id(s: &str) -> Result<Uuid> {
    s.parse().map_err(|_| LedgerError::corrupt("id", s))
}

pub(crate) fn to_db_amount(amount: u64) -> Result<i64> {
    i64::try_from(amount).map_err(|_| LedgerError::invalid("amount too large"))
}

pub(crate) fn from_db_amount(amount: i64) -> Result<u64> {
    u64::try_from(amount).map_err(|_| LedgerError::corrupt("amount", amount))
}

#[cfg(test)]
pub(crate) mod testutil {
    use super::*;
    use chrono::TimeZone;
    use fanonym_types::api::PricingOptionInput;
    use fanonym_types::models::PricingOption;

    pub fn ledger() -> (Ledger, Arc<ManualClock>) {
        let db = Arc::new(Database::open_in_memory().unwrap());
        let start = Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap();
        let clock = Arc::new(ManualClock::new(start));
        (Ledger::with_clock(db, clock.clone()), clock)
    }

    pub fn fund(ledger: &Ledger, account: Uuid, amount: u64) {
        ledger
            .grant_credits(&format!("topup:{}", Uuid::new_v4()), account, amount)
            .unwrap();
    }

    pub fn priced(ledger: &Ledger, creator: Uuid, options: &[(u32, u64)]) -> Vec<PricingOption> {
        let inputs: Vec<PricingOptionInput> = options
            .iter()
            .map(|&(duration_hours, price_credits)| PricingOptionInput {
                duration_hours,
                price_credits,
            })
            .collect();
        ledger.set_pricing_options(creator, &inputs).unwrap()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timestamps_round_trip_and_sort_as_text() {
        let a = Utc::now();
        let b = a + chrono::Duration::milliseconds(5);
        assert_eq!(parse_ts(&fmt_ts(a)).unwrap().timestamp_micros(), a.timestamp_micros());
        assert!(fmt_ts(a) < fmt_ts(b));
    }

    #[test]
    fn retry_once_retries_exactly_once() {
        let (ledger, _) = testutil::ledger();
        let mut calls = 0;
        let result: Result<()> = ledger.retry_once("test", || {
            calls += 1;
            Err(LedgerError::ConcurrencyConflict)
        });
        assert!(matches!(result, Err(LedgerError::ConcurrencyConflict)));
        assert_eq!(calls, 2);
    }

    #[test]
    fn negative_db_amount_is_corruption() {
        assert!(matches!(from_db_amount(-1), Err(LedgerError::Storage(_))));
        assert!(matches!(to_db_amount(u64::MAX), Err(LedgerError::InvalidInput(_))));
    }
}
