use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use shelfwise_core::{DomainError, DomainResult, Entity, ItemId, LocationId, RecordId, SourceId, TenantId};

use crate::balance::Balance;
use crate::error::{StockError, StockResult};

/// Which of the two independent ledgers a record belongs to.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LedgerKind {
    Warehouse,
    Inventory,
}

impl LedgerKind {
    pub fn as_str(self) -> &'static str {
        match self {
            LedgerKind::Warehouse => "warehouse",
            LedgerKind::Inventory => "inventory",
        }
    }
}

impl core::fmt::Display for LedgerKind {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordType {
    Add,
    Remove,
}

impl RecordType {
    pub fn as_str(self) -> &'static str {
        match self {
            RecordType::Add => "add",
            RecordType::Remove => "remove",
        }
    }
}

impl core::fmt::Display for RecordType {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why stock left a ledger. Each reason carries a negative-stock policy,
/// configured in the engine.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RemovalReason {
    Sales,
    PurchaseReturn,
    /// Warehouse stock moved into an inventory location.
    Inventory,
    /// Internal transfer between locations of the same ledger kind.
    Transfer,
    Damaged,
    Expired,
    Adjustment,
}

impl RemovalReason {
    pub fn as_str(self) -> &'static str {
        match self {
            RemovalReason::Sales => "sales",
            RemovalReason::PurchaseReturn => "purchase_return",
            RemovalReason::Inventory => "inventory",
            RemovalReason::Transfer => "transfer",
            RemovalReason::Damaged => "damaged",
            RemovalReason::Expired => "expired",
            RemovalReason::Adjustment => "adjustment",
        }
    }
}

impl core::fmt::Display for RemovalReason {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Business flow that produced a record.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    Sale,
    Purchase,
    Return,
    Transfer,
    Manual,
}

/// Where a record's unit price came from.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PriceSource {
    /// Supplied by the caller; never re-derived.
    Explicit,
    /// Removal priced at the nearest preceding receipt; re-derived whenever
    /// the record's predecessors change.
    LatestReceipt,
}

/// Identity of one running balance: (tenant, ledger, location, item).
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct LedgerKey {
    pub tenant_id: TenantId,
    pub kind: LedgerKind,
    pub location_id: LocationId,
    pub item_id: ItemId,
}

impl LedgerKey {
    pub fn new(tenant_id: TenantId, kind: LedgerKind, location_id: LocationId, item_id: ItemId) -> Self {
        Self {
            tenant_id,
            kind,
            location_id,
            item_id,
        }
    }
}

impl core::fmt::Display for LedgerKey {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}/{}/{}/{}", self.tenant_id, self.kind, self.location_id, self.item_id)
    }
}

/// Total order of records within one ledger.
///
/// Field order matters: the derived `Ord` compares `record_date` first and
/// breaks ties with `insertion_sequence`.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct LedgerPosition {
    pub record_date: DateTime<Utc>,
    pub insertion_sequence: u64,
}

/// How a warehouse-to-inventory removal splits between shelf and back room.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferSplit {
    /// Units going on display downstream.
    pub quantity_leaving_warehouse: i64,
    pub quantity_remaining_in_warehouse: i64,
}

impl TransferSplit {
    /// Build a split of `total_removed` units.
    ///
    /// `remaining`, when given, must agree with `total_removed - leaving`.
    pub fn new(total_removed: i64, leaving: i64, remaining: Option<i64>) -> DomainResult<Self> {
        if leaving < 0 {
            return Err(DomainError::validation("quantity_leaving_warehouse cannot be negative"));
        }
        if leaving > total_removed {
            return Err(DomainError::validation(format!(
                "quantity_leaving_warehouse ({leaving}) exceeds quantity removed ({total_removed})"
            )));
        }
        let computed = total_removed - leaving;
        if let Some(r) = remaining {
            if r != computed {
                return Err(DomainError::validation(format!(
                    "quantity_remaining_in_warehouse must be {computed}, got {r}"
                )));
            }
        }
        Ok(Self {
            quantity_leaving_warehouse: leaving,
            quantity_remaining_in_warehouse: computed,
        })
    }

    /// Everything removed leaves the warehouse.
    pub fn all_leaving(total_removed: i64) -> Self {
        Self {
            quantity_leaving_warehouse: total_removed,
            quantity_remaining_in_warehouse: 0,
        }
    }
}

/// Request to append a record to a ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewRecord {
    pub tenant_id: TenantId,
    pub ledger_kind: LedgerKind,
    pub location_id: LocationId,
    pub item_id: ItemId,
    /// Business date; may be backdated.
    pub record_date: DateTime<Utc>,
    pub record_type: RecordType,
    pub quantity: i64,
    /// Required on additions. Removals without a price reuse the latest receipt price.
    pub unit_price: Option<i64>,
    pub removal_reason: Option<RemovalReason>,
    pub source_kind: SourceKind,
    /// Idempotency key; mandatory on removals.
    pub source_id: Option<SourceId>,
    /// Inventory location receiving a warehouse-to-inventory removal.
    pub destination_id: Option<LocationId>,
    pub quantity_leaving_warehouse: Option<i64>,
}

impl NewRecord {
    pub fn key(&self) -> LedgerKey {
        LedgerKey::new(self.tenant_id, self.ledger_kind, self.location_id, self.item_id)
    }

    /// A warehouse removal whose stock lands in an inventory ledger.
    pub fn feeds_inventory(&self) -> bool {
        self.ledger_kind == LedgerKind::Warehouse
            && self.record_type == RecordType::Remove
            && self.removal_reason == Some(RemovalReason::Inventory)
    }

    /// Reject malformed requests before anything is read or staged.
    pub fn validate(&self) -> StockResult<()> {
        if self.quantity < 0 {
            return Err(StockError::validation("quantity cannot be negative"));
        }
        if matches!(self.unit_price, Some(p) if p < 0) {
            return Err(StockError::validation("unit_price cannot be negative"));
        }

        match self.record_type {
            RecordType::Add => {
                if self.removal_reason.is_some() {
                    return Err(StockError::validation("removal_reason is only valid on removals"));
                }
                if self.unit_price.is_none() {
                    return Err(StockError::validation("additions must carry a unit_price"));
                }
            }
            RecordType::Remove => {
                if self.removal_reason.is_none() {
                    return Err(StockError::validation("removals require a removal_reason"));
                }
                if self.source_id.is_none() {
                    return Err(StockError::validation("removals require a removal_source_id"));
                }
            }
        }

        if self.destination_id.is_some() && !self.feeds_inventory() {
            return Err(StockError::validation(
                "destination_id is only valid on warehouse removals to inventory",
            ));
        }

        if self.quantity_leaving_warehouse.is_some() && !carries_split(self.ledger_kind, self.record_type, self.removal_reason) {
            return Err(StockError::validation(
                "quantity_leaving_warehouse is only valid on warehouse-to-inventory movements",
            ));
        }

        Ok(())
    }
}

/// Correction applied to an existing record through `Update`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Revision {
    pub quantity: i64,
    /// `None` keeps the record's current price and price source.
    pub unit_price: Option<i64>,
    /// `None` keeps the current leaving quantity (re-checked against the new total).
    pub quantity_leaving_warehouse: Option<i64>,
}

impl Revision {
    pub fn quantity(quantity: i64) -> Self {
        Self {
            quantity,
            unit_price: None,
            quantity_leaving_warehouse: None,
        }
    }

    pub fn with_unit_price(mut self, unit_price: i64) -> Self {
        self.unit_price = Some(unit_price);
        self
    }

    pub fn with_leaving(mut self, leaving: i64) -> Self {
        self.quantity_leaving_warehouse = Some(leaving);
        self
    }
}

fn carries_split(kind: LedgerKind, record_type: RecordType, reason: Option<RemovalReason>) -> bool {
    match (kind, record_type) {
        (LedgerKind::Warehouse, RecordType::Remove) => reason == Some(RemovalReason::Inventory),
        (LedgerKind::Inventory, RecordType::Add) => true,
        _ => false,
    }
}

/// One entry in one ledger.
///
/// Append-only: only `opening`/`closing` (and a receipt-derived
/// `unit_price`) change after the record is first written, apart from
/// explicit revisions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockRecord {
    pub id: RecordId,
    pub tenant_id: TenantId,
    pub ledger_kind: LedgerKind,
    pub location_id: LocationId,
    pub item_id: ItemId,
    pub record_date: DateTime<Utc>,
    pub record_type: RecordType,
    pub removal_reason: Option<RemovalReason>,
    pub source_kind: SourceKind,
    pub quantity: i64,
    pub unit_price: i64,
    pub price_source: PriceSource,
    pub opening: Balance,
    pub closing: Balance,
    pub addition_source_id: Option<SourceId>,
    pub removal_source_id: Option<SourceId>,
    pub insertion_sequence: u64,
    pub destination_id: Option<LocationId>,
    pub transfer_split: Option<TransferSplit>,
    pub created_at: DateTime<Utc>,
}

impl Entity for StockRecord {
    type Id = RecordId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}

impl StockRecord {
    /// Materialize a validated request at `opening`.
    ///
    /// `receipt_price` is the unit price of the nearest preceding addition,
    /// used when a removal carries no price of its own.
    pub fn from_new(
        new: &NewRecord,
        id: RecordId,
        insertion_sequence: u64,
        opening: Balance,
        receipt_price: Option<i64>,
        destination_id: Option<LocationId>,
        created_at: DateTime<Utc>,
    ) -> StockResult<Self> {
        new.validate()?;

        let (unit_price, price_source) = match new.unit_price {
            Some(p) => (p, PriceSource::Explicit),
            None => (receipt_price.unwrap_or(0), PriceSource::LatestReceipt),
        };

        let (addition_source_id, removal_source_id) = match new.record_type {
            RecordType::Add => (new.source_id, None),
            RecordType::Remove => (None, new.source_id),
        };

        let transfer_split = if new.feeds_inventory() {
            let leaving = new.quantity_leaving_warehouse.unwrap_or(new.quantity);
            Some(TransferSplit::new(new.quantity, leaving, None)?)
        } else {
            match new.quantity_leaving_warehouse {
                Some(leaving) => Some(TransferSplit::new(new.quantity, leaving, None)?),
                None => None,
            }
        };

        let closing = opening.after(new.record_type, new.quantity, unit_price)?;

        Ok(Self {
            id,
            tenant_id: new.tenant_id,
            ledger_kind: new.ledger_kind,
            location_id: new.location_id,
            item_id: new.item_id,
            record_date: new.record_date,
            record_type: new.record_type,
            removal_reason: new.removal_reason,
            source_kind: new.source_kind,
            quantity: new.quantity,
            unit_price,
            price_source,
            opening,
            closing,
            addition_source_id,
            removal_source_id,
            insertion_sequence,
            destination_id,
            transfer_split,
            created_at,
        })
    }

    pub fn key(&self) -> LedgerKey {
        LedgerKey::new(self.tenant_id, self.ledger_kind, self.location_id, self.item_id)
    }

    pub fn position(&self) -> LedgerPosition {
        LedgerPosition {
            record_date: self.record_date,
            insertion_sequence: self.insertion_sequence,
        }
    }

    /// The idempotency key matching this record's type.
    pub fn source_id(&self) -> Option<SourceId> {
        match self.record_type {
            RecordType::Add => self.addition_source_id,
            RecordType::Remove => self.removal_source_id,
        }
    }

    /// `+quantity` for additions, `-quantity` for removals.
    pub fn signed_quantity(&self) -> i64 {
        match self.record_type {
            RecordType::Add => self.quantity,
            RecordType::Remove => -self.quantity,
        }
    }

    pub fn feeds_inventory(&self) -> bool {
        self.ledger_kind == LedgerKind::Warehouse
            && self.record_type == RecordType::Remove
            && self.removal_reason == Some(RemovalReason::Inventory)
    }

    /// Re-derive this record's balances from a new opening.
    ///
    /// Receipt-priced removals pick up `receipt_price` (zero when no
    /// addition precedes them).
    pub fn rebalance(&mut self, opening: Balance, receipt_price: Option<i64>) -> StockResult<()> {
        if self.price_source == PriceSource::LatestReceipt {
            self.unit_price = receipt_price.unwrap_or(0);
        }
        self.opening = opening;
        self.closing = opening.after(self.record_type, self.quantity, self.unit_price)?;
        Ok(())
    }

    /// Apply a correction, keeping the existing opening.
    pub fn revise(&mut self, revision: &Revision, receipt_price: Option<i64>) -> StockResult<()> {
        if revision.quantity < 0 {
            return Err(StockError::validation("quantity cannot be negative"));
        }
        if matches!(revision.unit_price, Some(p) if p < 0) {
            return Err(StockError::validation("unit_price cannot be negative"));
        }
        if revision.quantity_leaving_warehouse.is_some()
            && !carries_split(self.ledger_kind, self.record_type, self.removal_reason)
        {
            return Err(StockError::validation(
                "quantity_leaving_warehouse is only valid on warehouse-to-inventory movements",
            ));
        }

        let leaving = revision
            .quantity_leaving_warehouse
            .or(self.transfer_split.map(|s| s.quantity_leaving_warehouse));
        self.transfer_split = match leaving {
            Some(l) => Some(TransferSplit::new(revision.quantity, l, None)?),
            None => None,
        };

        self.quantity = revision.quantity;
        if let Some(p) = revision.unit_price {
            self.unit_price = p;
            self.price_source = PriceSource::Explicit;
        }

        let opening = self.opening;
        self.rebalance(opening, receipt_price)
    }
}
