//! Whole-ledger verification.

use crate::balance::Balance;
use crate::error::{StockError, StockResult};
use crate::record::StockRecord;

/// Check that an ordered ledger satisfies the chain and balance invariants.
///
/// - positions strictly increase (ties on `record_date` broken by sequence)
/// - every opening equals the predecessor's closing (zero for the first)
/// - every closing equals opening ± quantity × unit_price
pub fn verify_chain(ledger: &[StockRecord]) -> StockResult<()> {
    let mut previous: Option<&StockRecord> = None;

    for rec in ledger {
        let expected_opening = match previous {
            Some(p) => {
                if p.position() >= rec.position() {
                    return Err(StockError::stale_chain(format!(
                        "record {} is not ordered after {}",
                        rec.id, p.id
                    )));
                }
                if p.key() != rec.key() {
                    return Err(StockError::stale_chain(format!(
                        "record {} belongs to ledger {}, expected {}",
                        rec.id,
                        rec.key(),
                        p.key()
                    )));
                }
                p.closing
            }
            None => Balance::ZERO,
        };

        if rec.opening != expected_opening {
            return Err(StockError::stale_chain(format!(
                "record {} opens at {:?}, predecessor closed at {:?}",
                rec.id, rec.opening, expected_opening
            )));
        }

        let expected_closing = rec.opening.after(rec.record_type, rec.quantity, rec.unit_price)?;
        if rec.closing != expected_closing {
            return Err(StockError::stale_chain(format!(
                "record {} closes at {:?}, expected {:?}",
                rec.id, rec.closing, expected_closing
            )));
        }

        previous = Some(rec);
    }

    Ok(())
}
