use std::collections::HashSet;

use tracing::info;
use uuid::Uuid;

use fanonym_db::models::PricingOptionRow;
use fanonym_db::pricing;
use fanonym_types::api::PricingOptionInput;
use fanonym_types::models::{AccountId, PricingOption};

use crate::error::{LedgerError, Result};
use crate::{Ledger, from_db_amount, parse_id, to_db_amount};

/// Upper bound on one creator's price list.
pub const MAX_PRICING_OPTIONS: usize = 12;

/// Longest duration a single option may sell: one year.
pub const MAX_DURATION_HOURS: u32 = 24 * 365;

pub(crate) fn option_from_row(row: PricingOptionRow) -> Result<PricingOption> {
    Ok(PricingOption {
        id: parse_id(&row.id)?,
        creator_id: parse_id(&row.creator_id)?,
        duration_hours: u32::try_from(row.duration_hours)
            .map_err(|_| LedgerError::corrupt("duration", row.duration_hours))?,
        price_credits: from_db_amount(row.price_credits)?,
    })
}

fn validate(options: &[PricingOptionInput]) -> Result<()> {
    if options.len() > MAX_PRICING_OPTIONS {
        return Err(LedgerError::invalid(format!(
            "at most {} pricing options allowed",
            MAX_PRICING_OPTIONS
        )));
    }

    let mut seen = HashSet::new();
    for option in options {
        if option.duration_hours == 0 {
            return Err(LedgerError::invalid("duration must be at least one hour"));
        }
        if option.duration_hours > MAX_DURATION_HOURS {
            return Err(LedgerError::invalid(format!(
                "duration must be at most {} hours",
                MAX_DURATION_HOURS
            )));
        }
        if option.price_credits == 0 {
            return Err(LedgerError::invalid("price must be at least one credit"));
        }
        to_db_amount(option.price_credits)?;
        if !seen.insert(option.duration_hours) {
            return Err(LedgerError::invalid(format!(
                "duplicate pricing option for {} hours",
                option.duration_hours
            )));
        }
    }
    Ok(())
}

impl Ledger {
    /// Replace a creator's price list. Durations that survive keep their
    /// option id; the rest are removed.
    pub fn set_pricing_options(
        &self,
        creator_id: AccountId,
        options: &[PricingOptionInput],
    ) -> Result<Vec<PricingOption>> {
        validate(options)?;

        let creator = creator_id.to_string();
        let durations: Vec<i64> = options.iter().map(|o| i64::from(o.duration_hours)).collect();

        let rows = self.retry_once("set_pricing_options", || {
            self.db.with_tx(|tx| -> Result<Vec<PricingOptionRow>> {
                pricing::delete_other_durations(tx, &creator, &durations)?;
                for option in options {
                    pricing::upsert(
                        tx,
                        &PricingOptionRow {
                            id: Uuid::new_v4().to_string(),
                            creator_id: creator.clone(),
                            duration_hours: i64::from(option.duration_hours),
                            price_credits: to_db_amount(option.price_credits)?,
                        },
                    )?;
                }
                Ok(pricing::list_for_creator(tx, &creator)?)
            })
        })?;

        info!("Creator {} now has {} pricing options", creator_id, rows.len());
        rows.into_iter().map(option_from_row).collect()
    }

    /// Ordered by duration.
    pub fn list_pricing_options(&self, creator_id: AccountId) -> Result<Vec<PricingOption>> {
        let rows = self
            .db
            .with_conn(|conn| pricing::list_for_creator(conn, &creator_id.to_string()))?;
        rows.into_iter().map(option_from_row).collect()
    }

    pub fn get_pricing_option(&self, id: Uuid) -> Result<PricingOption> {
        let row = self
            .db
            .with_conn(|conn| pricing::get(conn, &id.to_string()))?
            .ok_or(LedgerError::NotFound("pricing option"))?;
        option_from_row(row)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil;

    fn input(duration_hours: u32, price_credits: u64) -> PricingOptionInput {
        PricingOptionInput {
            duration_hours,
            price_credits,
        }
    }

    #[test]
    fn replacing_keeps_ids_of_surviving_durations() {
        let (ledger, _) = testutil::ledger();
        let creator = Uuid::new_v4();

        let first = ledger
            .set_pricing_options(creator, &[input(1, 10), input(24, 100)])
            .unwrap();
        let second = ledger
            .set_pricing_options(creator, &[input(24, 120), input(72, 300)])
            .unwrap();

        assert_eq!(second.len(), 2);
        assert_eq!(second[0].duration_hours, 24);
        assert_eq!(second[0].id, first[1].id);
        assert_eq!(second[0].price_credits, 120);
        assert_eq!(second[1].duration_hours, 72);

        assert!(matches!(
            ledger.get_pricing_option(first[0].id),
            Err(LedgerError::NotFound(_))
        ));
    }

    #[test]
    fn rejects_bad_options() {
        let (ledger, _) = testutil::ledger();
        let creator = Uuid::new_v4();

        for bad in [
            vec![input(0, 10)],
            vec![input(1, 0)],
            vec![input(1, 10), input(1, 20)],
            vec![input(1, u64::MAX)],
            vec![input(MAX_DURATION_HOURS + 1, 10)],
            vec![input(u32::MAX, 10)],
        ] {
            assert!(matches!(
                ledger.set_pricing_options(creator, &bad),
                Err(LedgerError::InvalidInput(_))
            ));
        }
        assert!(ledger.list_pricing_options(creator).unwrap().is_empty());

        // Still usable after the rejections.
        let kept = ledger
            .set_pricing_options(creator, &[input(MAX_DURATION_HOURS, 10)])
            .unwrap();
        assert_eq!(kept[0].duration_hours, MAX_DURATION_HOURS);
    }

    #[test]
    fn empty_list_clears_prices() {
        let (ledger, _) = testutil::ledger();
        let creator = Uuid::new_v4();

        testutil::priced(&ledger, creator, &[(1, 10)]);
        ledger.set_pricing_options(creator, &[]).unwrap();
        assert!(ledger.list_pricing_options(creator).unwrap().is_empty());
    }
}
