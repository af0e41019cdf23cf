use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use shelfwise_core::{ItemId, LocationId, RecordId, SourceId, TenantId};
use shelfwise_events::Event;

use crate::balance::Balance;
use crate::record::{LedgerKind, RecordType, StockRecord};

/// Event: a record was appended to a ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordPosted {
    pub tenant_id: TenantId,
    pub record_id: RecordId,
    pub ledger_kind: LedgerKind,
    pub location_id: LocationId,
    pub item_id: ItemId,
    pub record_type: RecordType,
    pub quantity: i64,
    pub unit_price: i64,
    pub source_id: Option<SourceId>,
    pub closing: Balance,
    pub occurred_at: DateTime<Utc>,
}

/// Event: an existing record's quantity or price was corrected.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordRevised {
    pub tenant_id: TenantId,
    pub record_id: RecordId,
    pub quantity: i64,
    pub unit_price: i64,
    pub closing: Balance,
    pub occurred_at: DateTime<Utc>,
}

/// Event: a later record's balances moved because of an earlier write.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BalanceRecomputed {
    pub tenant_id: TenantId,
    pub record_id: RecordId,
    pub opening: Balance,
    pub closing: Balance,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum StockEvent {
    RecordPosted(RecordPosted),
    RecordRevised(RecordRevised),
    BalanceRecomputed(BalanceRecomputed),
}

impl StockEvent {
    pub fn posted(rec: &StockRecord, occurred_at: DateTime<Utc>) -> Self {
        StockEvent::RecordPosted(RecordPosted {
            tenant_id: rec.tenant_id,
            record_id: rec.id,
            ledger_kind: rec.ledger_kind,
            location_id: rec.location_id,
            item_id: rec.item_id,
            record_type: rec.record_type,
            quantity: rec.quantity,
            unit_price: rec.unit_price,
            source_id: rec.source_id(),
            closing: rec.closing,
            occurred_at,
        })
    }

    pub fn revised(rec: &StockRecord, occurred_at: DateTime<Utc>) -> Self {
        StockEvent::RecordRevised(RecordRevised {
            tenant_id: rec.tenant_id,
            record_id: rec.id,
            quantity: rec.quantity,
            unit_price: rec.unit_price,
            closing: rec.closing,
            occurred_at,
        })
    }

    pub fn recomputed(rec: &StockRecord, occurred_at: DateTime<Utc>) -> Self {
        StockEvent::BalanceRecomputed(BalanceRecomputed {
            tenant_id: rec.tenant_id,
            record_id: rec.id,
            opening: rec.opening,
            closing: rec.closing,
            occurred_at,
        })
    }

    pub fn record_id(&self) -> RecordId {
        match self {
            StockEvent::RecordPosted(e) => e.record_id,
            StockEvent::RecordRevised(e) => e.record_id,
            StockEvent::BalanceRecomputed(e) => e.record_id,
        }
    }
}

impl Event for StockEvent {
    fn event_type(&self) -> &'static str {
        match self {
            StockEvent::RecordPosted(_) => "stock.record.posted",
            StockEvent::RecordRevised(_) => "stock.record.revised",
            StockEvent::BalanceRecomputed(_) => "stock.record.balance_recomputed",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            StockEvent::RecordPosted(e) => e.occurred_at,
            StockEvent::RecordRevised(e) => e.occurred_at,
            StockEvent::BalanceRecomputed(e) => e.occurred_at,
        }
    }
}
