//! Running-balance arithmetic.

use serde::{Deserialize, Serialize};

use shelfwise_core::{DomainError, DomainResult};

use crate::record::{LedgerPosition, RecordType, StockRecord};

/// Quantity and valuation at one point of a ledger.
///
/// `amount` is in the smallest currency unit (e.g. cents).
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Balance {
    pub quantity: i64,
    pub amount: i64,
}

impl Balance {
    pub const ZERO: Balance = Balance { quantity: 0, amount: 0 };

    pub fn new(quantity: i64, amount: i64) -> Self {
        Self { quantity, amount }
    }

    /// Closing balance after one movement of `quantity` units at `unit_price`.
    pub fn after(self, record_type: RecordType, quantity: i64, unit_price: i64) -> DomainResult<Balance> {
        let value = quantity
            .checked_mul(unit_price)
            .ok_or_else(|| DomainError::validation("movement value overflows"))?;

        let next = match record_type {
            RecordType::Add => self
                .quantity
                .checked_add(quantity)
                .zip(self.amount.checked_add(value)),
            RecordType::Remove => self
                .quantity
                .checked_sub(quantity)
                .zip(self.amount.checked_sub(value)),
        };

        next.map(|(quantity, amount)| Balance { quantity, amount })
            .ok_or_else(|| DomainError::validation("balance overflows"))
    }
}

/// Unit price of the nearest addition strictly before `position`.
///
/// `ledger` must be ordered by position. Removals are valued at this price
/// when they carry none of their own.
pub fn latest_receipt_price(ledger: &[StockRecord], position: LedgerPosition) -> Option<i64> {
    ledger
        .iter()
        .rev()
        .filter(|r| r.position() < position)
        .find(|r| r.record_type == RecordType::Add)
        .map(|r| r.unit_price)
}
