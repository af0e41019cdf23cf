//! Business-event pipeline for stock writes.
//!
//! ```text
//! request
//!   ↓
//! 1. Plan and take ledger locks (the record's ledger, plus the inventory
//!    ledgers its warehouse ledger feeds)
//!   ↓
//! 2. Create/Update inside a UnitOfWork
//!   ↓
//! 3. Settle follow-ups (cascade, propagation, cascade of the propagated record)
//!   ↓
//! 4. Commit the batch atomically
//!   ↓
//! 5. Sync touched AVAILABLE records into the catalog (soft failures logged)
//!   ↓
//! 6. Publish stock and catalog events
//! ```
//!
//! Any failure before step 4 leaves the store untouched.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value as JsonValue;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use shelfwise_catalog::{CatalogAuditLog, CatalogEvent, CatalogItem, Pricing};
use shelfwise_core::{ItemId, LocationId, RecordId, SourceId, TenantId};
use shelfwise_events::{Event, EventBus, EventEnvelope};
use shelfwise_ledger::{
    Balance, LedgerKey, LedgerKind, NewRecord, RecordType, Revision, StockError, StockEvent, StockRecord,
};

use crate::config::EngineConfig;
use crate::error::{EngineError, EngineResult};
use crate::ledger_store::LedgerStore;
use crate::locks::KeyLocks;
use crate::projector::{CatalogProjector, ItemLocks};
use crate::read_model::{AuditLogStore, TenantStore};
use crate::unit_of_work::{Change, Committed, UnitOfWork};
use crate::writer::RecordWriter;

/// Envelope type published by the engine.
pub type StockEnvelope = EventEnvelope<JsonValue>;

const MAX_LOCK_ATTEMPTS: usize = 16;

/// Result of a committed stock write.
#[derive(Debug)]
pub struct WriteOutcome {
    /// The created or revised record, as committed.
    pub record: StockRecord,
    /// Every record the business event wrote, including cascades and propagation.
    pub committed: Vec<(StockRecord, Change)>,
    pub catalog_events: Vec<CatalogEvent>,
    /// Projection failures swallowed after commit (e.g. `NotProjected`).
    pub projection_errors: Vec<EngineError>,
}

pub struct StockEngine<S, I, A, B> {
    store: S,
    items: I,
    audit: A,
    bus: B,
    config: EngineConfig,
    ledger_locks: KeyLocks<LedgerKey>,
    item_locks: ItemLocks,
}

impl<S, I, A, B> StockEngine<S, I, A, B> {
    pub fn new(store: S, items: I, audit: A, bus: B, config: EngineConfig) -> Self {
        Self {
            store,
            items,
            audit,
            bus,
            config,
            ledger_locks: KeyLocks::new(),
            item_locks: ItemLocks::new(),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn bus(&self) -> &B {
        &self.bus
    }
}

impl<S, I, A, B> StockEngine<S, I, A, B>
where
    S: LedgerStore,
    I: TenantStore<ItemId, CatalogItem>,
    A: AuditLogStore,
    B: EventBus<StockEnvelope>,
{
    fn projector(&self) -> CatalogProjector<'_, S, I, A> {
        CatalogProjector::new(&self.store, &self.items, &self.audit, &self.config, &self.item_locks)
    }

    /// Post a new record (a sale, receipt, return or transfer leg).
    #[instrument(
        skip(self, new),
        fields(
            tenant_id = %new.tenant_id,
            ledger_kind = %new.ledger_kind,
            location_id = %new.location_id,
            item_id = %new.item_id,
            record_type = %new.record_type
        ),
        err
    )]
    pub fn create(&self, new: NewRecord) -> EngineResult<WriteOutcome> {
        new.validate()?;
        let extra_destination = if new.feeds_inventory() {
            self.config.resolve_destination(new.tenant_id, new.destination_id)
        } else {
            None
        };
        self.run(new.tenant_id, new.key(), extra_destination, |writer, uow, now| {
            writer.create(uow, &new, now)
        })
    }

    /// Correct an existing record's quantity, price or split.
    #[instrument(skip(self, revision), fields(tenant_id = %tenant_id, record_id = %id), err)]
    pub fn update(&self, tenant_id: TenantId, id: RecordId, revision: Revision) -> EngineResult<WriteOutcome> {
        let rec = self.store.get(tenant_id, id)?.ok_or(StockError::NotFound(id))?;
        self.run(tenant_id, rec.key(), None, |writer, uow, _| writer.update(uow, id, &revision))
    }

    /// Correct the record a source event produced.
    #[instrument(skip(self, revision), fields(tenant_id = %tenant_id, source_id = %source_id), err)]
    pub fn update_by_source(
        &self,
        tenant_id: TenantId,
        kind: LedgerKind,
        record_type: RecordType,
        source_id: SourceId,
        revision: Revision,
    ) -> EngineResult<WriteOutcome> {
        let rec = self
            .store
            .find_by_source(tenant_id, kind, record_type, source_id)?
            .ok_or_else(|| StockError::validation(format!("no {kind} {record_type} recorded for source {source_id}")))?;
        self.run(tenant_id, rec.key(), None, |writer, uow, _| {
            writer.update_by_source(uow, kind, record_type, source_id, &revision)
        })
    }

    /// Current closing balance of a ledger.
    pub fn balance(&self, tenant_id: TenantId, key: &LedgerKey) -> EngineResult<Balance> {
        Ok(self
            .records(tenant_id, key)?
            .last()
            .map_or(Balance::ZERO, |r| r.closing))
    }

    /// The ordered ledger.
    pub fn records(&self, tenant_id: TenantId, key: &LedgerKey) -> EngineResult<Vec<StockRecord>> {
        if key.tenant_id != tenant_id {
            return Err(StockError::validation("ledger belongs to another tenant").into());
        }
        Ok(self.store.load_ledger(key)?)
    }

    /// Check ordering, chain and balance invariants of a stored ledger.
    pub fn verify_chain(&self, tenant_id: TenantId, key: &LedgerKey) -> EngineResult<()> {
        let ledger = self.records(tenant_id, key)?;
        shelfwise_ledger::verify_chain(&ledger).inspect_err(|e| {
            error!(ledger = %key, error = %e, "ledger chain is broken");
        })?;
        Ok(())
    }

    pub fn merchandise(&self, tenant_id: TenantId, item_id: ItemId, pricing: Pricing) -> EngineResult<CatalogItem> {
        let (item, events) = self.projector().merchandise(tenant_id, item_id, pricing, Utc::now())?;
        self.publish_catalog(&events);
        Ok(item)
    }

    pub fn reprice(
        &self,
        tenant_id: TenantId,
        item_id: ItemId,
        discount_amount: i64,
        threshold_price: i64,
    ) -> EngineResult<CatalogItem> {
        let (item, event) = self
            .projector()
            .reprice(tenant_id, item_id, discount_amount, threshold_price, Utc::now())?;
        self.publish_catalog(std::slice::from_ref(&event));
        Ok(item)
    }

    /// Catch an item's projection up with its ledgers.
    pub fn resync_item(&self, tenant_id: TenantId, item_id: ItemId) -> EngineResult<CatalogItem> {
        let projector = self.projector();
        let events = projector.resync_item(tenant_id, item_id, Utc::now())?;
        self.publish_catalog(&events);
        projector
            .item(tenant_id, item_id)?
            .ok_or_else(|| StockError::NotProjected { item_id }.into())
    }

    pub fn catalog_item(&self, tenant_id: TenantId, item_id: ItemId) -> EngineResult<Option<CatalogItem>> {
        self.projector().item(tenant_id, item_id)
    }

    /// Every merchandised item of a tenant.
    pub fn catalog(&self, tenant_id: TenantId) -> EngineResult<Vec<CatalogItem>> {
        Ok(self.items.list(tenant_id)?)
    }

    pub fn audit_trail(&self, tenant_id: TenantId, item_id: ItemId) -> EngineResult<Vec<CatalogAuditLog>> {
        self.projector().audit_trail(tenant_id, item_id)
    }

    /// Ledgers one write to `primary` may touch.
    fn lock_plan(&self, primary: LedgerKey, extra_destination: Option<LocationId>) -> EngineResult<BTreeSet<LedgerKey>> {
        let mut plan = BTreeSet::from([primary]);
        if primary.kind != LedgerKind::Warehouse {
            return Ok(plan);
        }

        let inventory = |location_id| LedgerKey::new(primary.tenant_id, LedgerKind::Inventory, location_id, primary.item_id);
        for rec in self.store.load_ledger(&primary)? {
            if let Some(destination) = rec.destination_id.filter(|_| rec.feeds_inventory()) {
                plan.insert(inventory(destination));
            }
        }
        if let Some(destination) = extra_destination {
            plan.insert(inventory(destination));
        }
        Ok(plan)
    }

    fn run<F>(
        &self,
        tenant_id: TenantId,
        primary: LedgerKey,
        extra_destination: Option<LocationId>,
        op: F,
    ) -> EngineResult<WriteOutcome>
    where
        F: Fn(&RecordWriter<'_>, &mut UnitOfWork<'_, S>, DateTime<Utc>) -> EngineResult<StockRecord>,
    {
        for _ in 0..MAX_LOCK_ATTEMPTS {
            let plan = self.lock_plan(primary, extra_destination)?;
            let lease = self.ledger_locks.acquire(plan.iter().copied())?;

            // A concurrent writer may have linked a new destination meanwhile.
            let current = self.lock_plan(primary, extra_destination)?;
            if !lease.covers(&current) {
                drop(lease);
                continue;
            }

            let now = Utc::now();
            let writer = RecordWriter::new(&self.config);
            let mut uow = UnitOfWork::new(&self.store, tenant_id, plan);
            let written = op(&writer, &mut uow, now)
                .and_then(|rec| writer.settle(&mut uow, now).map(|_| rec))
                .inspect_err(|e| log_write_failure(primary, e))?;
            let committed = uow.commit().inspect_err(|e| log_write_failure(primary, e))?;

            let record = committed.find(written.id).cloned().unwrap_or(written);
            info!(
                record_id = %record.id,
                ledger = %primary,
                closing_quantity = record.closing.quantity,
                written = committed.records.len(),
                "stock write committed"
            );

            let outcome = self.after_commit(tenant_id, record, committed, now);
            drop(lease);
            return Ok(outcome);
        }

        let err: EngineError = StockError::stale_chain(format!(
            "could not lock the ledgers of {primary} after {MAX_LOCK_ATTEMPTS} attempts"
        ))
        .into();
        log_write_failure(primary, &err);
        Err(err)
    }

    fn after_commit(&self, tenant_id: TenantId, record: StockRecord, committed: Committed, now: DateTime<Utc>) -> WriteOutcome {
        for (rec, change) in &committed.records {
            let event = match change {
                Change::Posted => StockEvent::posted(rec, now),
                Change::Revised => StockEvent::revised(rec, now),
                Change::Recomputed => StockEvent::recomputed(rec, now),
            };
            self.publish(tenant_id, *rec.id.as_uuid(), "stock.record", rec.insertion_sequence, &event);
        }

        let projector = self.projector();
        let mut by_item: BTreeMap<ItemId, Vec<StockRecord>> = BTreeMap::new();
        // An unchanged revision commits nothing of its own but is still synced.
        let unchanged = committed.find(record.id).is_none().then_some(&record);
        for rec in committed.records.iter().map(|(r, _)| r).chain(unchanged) {
            if projector.projects(rec) {
                by_item.entry(rec.item_id).or_default().push(rec.clone());
            }
        }

        let mut catalog_events = Vec::new();
        let mut projection_errors = Vec::new();
        for (item_id, records) in by_item {
            match projector.sync_item(tenant_id, item_id, &records, now) {
                Ok(events) => catalog_events.extend(events),
                Err(e) => {
                    warn!(tenant_id = %tenant_id, item_id = %item_id, error = %e, "catalog sync skipped");
                    projection_errors.push(e);
                }
            }
        }
        self.publish_catalog(&catalog_events);

        WriteOutcome {
            record,
            committed: committed.records,
            catalog_events,
            projection_errors,
        }
    }

    fn publish_catalog(&self, events: &[CatalogEvent]) {
        for event in events {
            self.publish(event.tenant_id(), *event.catalog_item_id().as_uuid(), "catalog.item", 0, event);
        }
    }

    /// Publish after commit. Failures are logged; the write already happened.
    fn publish<E: Event + Serialize>(&self, tenant_id: TenantId, stream_id: Uuid, stream_type: &str, sequence: u64, event: &E) {
        let payload = match serde_json::to_value(event) {
            Ok(v) => v,
            Err(e) => {
                warn!(event_type = event.event_type(), error = %e, "failed to serialize event");
                return;
            }
        };
        let envelope = EventEnvelope::new(
            Uuid::now_v7(),
            tenant_id,
            stream_id,
            stream_type,
            event.event_type(),
            sequence,
            payload,
        );
        if let Err(e) = self.bus.publish(envelope) {
            warn!(event_type = event.event_type(), error = ?e, "event publication failed");
        }
    }
}

fn log_write_failure(ledger: LedgerKey, err: &EngineError) {
    match err.as_stock() {
        Some(StockError::StaleChain(msg)) => error!(ledger = %ledger, reason = %msg, "stale chain; write aborted"),
        Some(_) => {}
        None => error!(ledger = %ledger, error = %err, "storage failure; write aborted"),
    }
}
