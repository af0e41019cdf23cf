//! Catalog projection of AVAILABLE inventory.
//!
//! Every change to a catalog item's quantity is an audit row attributed to
//! the ledger record behind it. A record's rows always sum to its current
//! signed quantity, so an item's rows sum to its projected quantity.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use shelfwise_catalog::{
    AuditPlan, AuditType, CatalogAuditLog, CatalogEvent, CatalogItem, Pricing, plan_audit, reconstruct_quantity,
};
use shelfwise_core::{AuditId, CatalogItemId, ItemId, TenantId};
use shelfwise_ledger::{LedgerKind, LedgerPosition, RecordType, StockError, StockRecord};

use crate::config::EngineConfig;
use crate::error::EngineResult;
use crate::ledger_store::LedgerStore;
use crate::locks::KeyLocks;
use crate::read_model::{AuditLogStore, TenantStore};

/// Per-item serialization of projection writes.
pub type ItemLocks = KeyLocks<(TenantId, ItemId)>;

pub struct CatalogProjector<'a, S: ?Sized, I: ?Sized, A: ?Sized> {
    ledgers: &'a S,
    items: &'a I,
    audit: &'a A,
    config: &'a EngineConfig,
    locks: &'a ItemLocks,
}

impl<'a, S, I, A> CatalogProjector<'a, S, I, A>
where
    S: LedgerStore + ?Sized,
    I: TenantStore<ItemId, CatalogItem> + ?Sized,
    A: AuditLogStore + ?Sized,
{
    pub fn new(ledgers: &'a S, items: &'a I, audit: &'a A, config: &'a EngineConfig, locks: &'a ItemLocks) -> Self {
        Self {
            ledgers,
            items,
            audit,
            config,
            locks,
        }
    }

    /// Whether `rec` feeds the catalog at all.
    pub fn projects(&self, rec: &StockRecord) -> bool {
        rec.ledger_kind == LedgerKind::Inventory && self.config.is_available(rec.tenant_id, rec.location_id)
    }

    pub fn item(&self, tenant_id: TenantId, item_ref: ItemId) -> EngineResult<Option<CatalogItem>> {
        Ok(self.items.get(tenant_id, &item_ref)?)
    }

    /// Bring one record into the projection.
    pub fn sync(&self, rec: &StockRecord, now: DateTime<Utc>) -> EngineResult<Vec<CatalogEvent>> {
        self.sync_item(rec.tenant_id, rec.item_id, std::slice::from_ref(rec), now)
    }

    /// Bring several records of one item into the projection, then check the
    /// result against the ledgers and catch up on drift.
    ///
    /// Records outside AVAILABLE inventory are ignored. A missing catalog
    /// item is `NotProjected`.
    pub fn sync_item(
        &self,
        tenant_id: TenantId,
        item_ref: ItemId,
        records: &[StockRecord],
        now: DateTime<Utc>,
    ) -> EngineResult<Vec<CatalogEvent>> {
        let relevant: Vec<&StockRecord> = records
            .iter()
            .filter(|r| r.tenant_id == tenant_id && r.item_id == item_ref && self.projects(r))
            .collect();
        if relevant.is_empty() {
            return Ok(Vec::new());
        }

        let _lease = self.locks.acquire([(tenant_id, item_ref)])?;
        let mut item = self
            .items
            .get(tenant_id, &item_ref)?
            .ok_or(StockError::NotProjected { item_id: item_ref })?;
        self.restore_from_trail(&mut item, now)?;

        let mut events = Vec::new();
        for snapshot in relevant {
            // The ledger may have moved since the caller's snapshot.
            let current = self.ledgers.get(tenant_id, snapshot.id)?.unwrap_or_else(|| snapshot.clone());
            self.apply_record(&mut item, &current, false, true, now, &mut events)?;
        }

        let truth = self.ledger_truth(tenant_id, item_ref)?;
        if truth != item.quantity() {
            warn!(
                tenant_id = %tenant_id,
                item_id = %item_ref,
                projected = item.quantity(),
                ledger = truth,
                "catalog drifted from ledger; resyncing item"
            );
            self.catch_up(&mut item, now, &mut events)?;
        }

        self.items.upsert(tenant_id, item_ref, item)?;
        Ok(events)
    }

    /// Create the catalog entry for an item, adopting stock already on
    /// AVAILABLE ledgers one audit row per record.
    pub fn merchandise(
        &self,
        tenant_id: TenantId,
        item_ref: ItemId,
        pricing: Pricing,
        now: DateTime<Utc>,
    ) -> EngineResult<(CatalogItem, Vec<CatalogEvent>)> {
        let _lease = self.locks.acquire([(tenant_id, item_ref)])?;
        if self.items.get(tenant_id, &item_ref)?.is_some() {
            return Err(StockError::validation(format!("item {item_ref} is already merchandised")).into());
        }

        let mut item = CatalogItem::new(CatalogItemId::new(), tenant_id, item_ref, pricing, now)?;
        let mut events = vec![CatalogEvent::merchandised(&item)];

        let records = self.available_records(tenant_id, item_ref)?;
        if records.is_empty() {
            let price = item.marked_price();
            let row = item.apply_audit(AuditId::new(), AuditType::Create, None, 0, None, price, None, now)?;
            self.append(row, &mut events)?;
        } else {
            for (i, rec) in records.values().enumerate() {
                self.apply_record(&mut item, rec, i == 0, false, now, &mut events)?;
            }
        }

        info!(
            tenant_id = %tenant_id,
            item_id = %item_ref,
            catalog_item_id = %item.id_typed(),
            quantity = item.quantity(),
            adopted = records.len(),
            "item merchandised"
        );
        self.items.upsert(tenant_id, item_ref, item.clone())?;
        Ok((item, events))
    }

    /// Change discount and threshold. The marked price follows receipts.
    pub fn reprice(
        &self,
        tenant_id: TenantId,
        item_ref: ItemId,
        discount_amount: i64,
        threshold_price: i64,
        now: DateTime<Utc>,
    ) -> EngineResult<(CatalogItem, CatalogEvent)> {
        let _lease = self.locks.acquire([(tenant_id, item_ref)])?;
        let mut item = self
            .items
            .get(tenant_id, &item_ref)?
            .ok_or(StockError::NotProjected { item_id: item_ref })?;
        item.reprice(discount_amount, threshold_price, now)?;
        self.items.upsert(tenant_id, item_ref, item.clone())?;
        let event = CatalogEvent::repriced(&item);
        Ok((item, event))
    }

    /// Sync every AVAILABLE record of the item, correcting any leftover drift.
    pub fn resync_item(&self, tenant_id: TenantId, item_ref: ItemId, now: DateTime<Utc>) -> EngineResult<Vec<CatalogEvent>> {
        let _lease = self.locks.acquire([(tenant_id, item_ref)])?;
        let mut item = self
            .items
            .get(tenant_id, &item_ref)?
            .ok_or(StockError::NotProjected { item_id: item_ref })?;
        self.restore_from_trail(&mut item, now)?;
        let mut events = Vec::new();
        self.catch_up(&mut item, now, &mut events)?;
        self.items.upsert(tenant_id, item_ref, item)?;
        Ok(events)
    }

    /// Audit rows of the item, oldest first.
    pub fn audit_trail(&self, tenant_id: TenantId, item_ref: ItemId) -> EngineResult<Vec<CatalogAuditLog>> {
        let item = self
            .items
            .get(tenant_id, &item_ref)?
            .ok_or(StockError::NotProjected { item_id: item_ref })?;
        Ok(self.audit.for_item(tenant_id, item.id_typed())?)
    }

    /// Sum of the latest closings across the item's AVAILABLE ledgers.
    pub fn ledger_truth(&self, tenant_id: TenantId, item_ref: ItemId) -> EngineResult<i64> {
        let mut total: i64 = 0;
        for key in self.ledgers.ledger_keys(tenant_id, LedgerKind::Inventory, item_ref)? {
            if !self.config.is_available(tenant_id, key.location_id) {
                continue;
            }
            if let Some(last) = self.ledgers.load_ledger(&key)?.last() {
                total = total
                    .checked_add(last.closing.quantity)
                    .ok_or_else(|| StockError::validation("projected quantity overflows"))?;
            }
        }
        Ok(total)
    }

    /// AVAILABLE records of the item, ordered by business date across locations.
    fn available_records(
        &self,
        tenant_id: TenantId,
        item_ref: ItemId,
    ) -> EngineResult<BTreeMap<LedgerPosition, StockRecord>> {
        let mut out = BTreeMap::new();
        for key in self.ledgers.ledger_keys(tenant_id, LedgerKind::Inventory, item_ref)? {
            if !self.config.is_available(tenant_id, key.location_id) {
                continue;
            }
            for rec in self.ledgers.load_ledger(&key)? {
                out.insert(rec.position(), rec);
            }
        }
        Ok(out)
    }

    /// Price of the chronologically latest receipt on AVAILABLE ledgers.
    fn latest_receipt(&self, tenant_id: TenantId, item_ref: ItemId) -> EngineResult<Option<i64>> {
        Ok(self
            .available_records(tenant_id, item_ref)?
            .values()
            .rev()
            .find(|r| r.record_type == RecordType::Add)
            .map(|r| r.unit_price))
    }

    fn apply_record(
        &self,
        item: &mut CatalogItem,
        rec: &StockRecord,
        first_for_item: bool,
        refresh_price: bool,
        now: DateTime<Utc>,
        events: &mut Vec<CatalogEvent>,
    ) -> EngineResult<()> {
        let price_before = item.marked_price();
        if refresh_price && rec.record_type == RecordType::Add {
            if let Some(latest) = self.latest_receipt(item.tenant_id(), item.item_ref())? {
                if let Err(e) = item.refresh_marked_price(latest, now) {
                    warn!(
                        item_id = %item.item_ref(),
                        receipt_price = latest,
                        error = %e,
                        "receipt price breaks pricing rules; keeping marked price"
                    );
                }
            }
        }

        let prior = self.audit.latest_for_source(item.tenant_id(), item.id_typed(), rec.id)?;
        let signed = rec.signed_quantity();
        let (audit_type, quantity_recorded) = match plan_audit(prior.as_ref(), first_for_item, signed, rec.unit_price)? {
            AuditPlan::Append {
                audit_type,
                quantity_recorded,
            } => (audit_type, quantity_recorded),
            AuditPlan::Unchanged if item.marked_price() != price_before => (AuditType::Update, 0),
            AuditPlan::Unchanged => {
                debug!(record_id = %rec.id, "record already projected");
                return Ok(());
            }
        };

        let row = item.apply_audit(
            AuditId::new(),
            audit_type,
            Some(rec.id),
            quantity_recorded,
            Some(signed),
            price_before,
            Some(rec.unit_price),
            now,
        )?;
        self.append(row, events)
    }

    /// Audit rows are appended before the item is stored, so a failed upsert
    /// leaves the stored quantity behind its rows. The rows win.
    fn restore_from_trail(&self, item: &mut CatalogItem, now: DateTime<Utc>) -> EngineResult<()> {
        let rows = self.audit.for_item(item.tenant_id(), item.id_typed())?;
        let audited = reconstruct_quantity(&rows)?;
        let stored = item.quantity();
        if item.restore_quantity(audited, now) {
            warn!(
                catalog_item_id = %item.id_typed(),
                stored,
                audited,
                "stored catalog quantity disagrees with its audit rows; restoring"
            );
        }
        Ok(())
    }

    fn catch_up(&self, item: &mut CatalogItem, now: DateTime<Utc>, events: &mut Vec<CatalogEvent>) -> EngineResult<()> {
        let tenant_id = item.tenant_id();
        let item_ref = item.item_ref();
        let records = self.available_records(tenant_id, item_ref)?;
        for rec in records.values() {
            self.apply_record(item, rec, false, false, now, events)?;
        }

        let truth = self.ledger_truth(tenant_id, item_ref)?;
        let gap = truth
            .checked_sub(item.quantity())
            .ok_or_else(|| StockError::validation("catalog correction overflows"))?;
        if gap != 0 {
            warn!(
                tenant_id = %tenant_id,
                item_id = %item_ref,
                gap,
                "appending correction row after resync"
            );
            let price = item.marked_price();
            let row = item.apply_audit(AuditId::new(), AuditType::Update, None, gap, None, price, None, now)?;
            self.append(row, events)?;
        }
        Ok(())
    }

    fn append(&self, row: CatalogAuditLog, events: &mut Vec<CatalogEvent>) -> EngineResult<()> {
        debug!(
            catalog_item_id = %row.catalog_item_id,
            audit_type = ?row.audit_type,
            quantity_recorded = row.quantity_recorded,
            quantity_after = row.quantity_after,
            "audit row appended"
        );
        events.push(CatalogEvent::adjusted(&row));
        self.audit.append(row)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LocationKind;
    use crate::error::{EngineError, LedgerStoreError};
    use crate::ledger_store::InMemoryLedgerStore;
    use crate::read_model::{InMemoryAuditLogStore, InMemoryTenantStore};
    use crate::unit_of_work::UnitOfWork;
    use crate::writer::RecordWriter;
    use chrono::TimeZone;
    use shelfwise_core::{LocationId, SourceId};
    use shelfwise_ledger::{LedgerKey, NewRecord, RemovalReason, Revision, SourceKind};
    use std::sync::atomic::{AtomicBool, Ordering};

    /// Item store whose writes can be switched off.
    struct FlakyItems<'a> {
        inner: &'a InMemoryTenantStore<ItemId, CatalogItem>,
        failing: AtomicBool,
    }

    impl TenantStore<ItemId, CatalogItem> for FlakyItems<'_> {
        fn get(&self, tenant_id: TenantId, key: &ItemId) -> Result<Option<CatalogItem>, LedgerStoreError> {
            self.inner.get(tenant_id, key)
        }

        fn upsert(&self, tenant_id: TenantId, key: ItemId, value: CatalogItem) -> Result<(), LedgerStoreError> {
            if self.failing.load(Ordering::SeqCst) {
                return Err(LedgerStoreError::Backend("catalog write refused".to_string()));
            }
            self.inner.upsert(tenant_id, key, value)
        }

        fn list(&self, tenant_id: TenantId) -> Result<Vec<CatalogItem>, LedgerStoreError> {
            self.inner.list(tenant_id)
        }
    }

    struct World {
        ledgers: InMemoryLedgerStore,
        items: InMemoryTenantStore<ItemId, CatalogItem>,
        audit: InMemoryAuditLogStore,
        config: EngineConfig,
        locks: ItemLocks,
        key: LedgerKey,
    }

    impl World {
        fn new() -> Self {
            let tenant = TenantId::new();
            let shelf = LocationId::new();
            Self {
                ledgers: InMemoryLedgerStore::new(),
                items: InMemoryTenantStore::new(),
                audit: InMemoryAuditLogStore::new(),
                config: EngineConfig::default().with_location(tenant, shelf, LocationKind::available()),
                locks: ItemLocks::new(),
                key: LedgerKey::new(tenant, LedgerKind::Inventory, shelf, ItemId::new()),
            }
        }

        fn projector(&self) -> CatalogProjector<'_, InMemoryLedgerStore, InMemoryTenantStore<ItemId, CatalogItem>, InMemoryAuditLogStore> {
            CatalogProjector::new(&self.ledgers, &self.items, &self.audit, &self.config, &self.locks)
        }

        fn at(&self, d: u32) -> DateTime<Utc> {
            Utc.with_ymd_and_hms(2024, 10, d, 12, 0, 0).unwrap()
        }

        fn post(&self, d: u32, record_type: RecordType, qty: i64, price: Option<i64>) -> StockRecord {
            let new = NewRecord {
                tenant_id: self.key.tenant_id,
                ledger_kind: LedgerKind::Inventory,
                location_id: self.key.location_id,
                item_id: self.key.item_id,
                record_date: self.at(d),
                record_type,
                quantity: qty,
                unit_price: price,
                removal_reason: (record_type == RecordType::Remove).then_some(RemovalReason::Sales),
                source_kind: SourceKind::Manual,
                source_id: Some(SourceId::new()),
                destination_id: None,
                quantity_leaving_warehouse: None,
            };
            let writer = RecordWriter::new(&self.config);
            let mut uow = UnitOfWork::new(&self.ledgers, self.key.tenant_id, [self.key]);
            let rec = writer.create(&mut uow, &new, self.at(d)).unwrap();
            writer.settle(&mut uow, self.at(d)).unwrap();
            uow.commit().unwrap().find(rec.id).cloned().unwrap()
        }

        fn revise(&self, rec: &StockRecord, revision: Revision) -> StockRecord {
            let writer = RecordWriter::new(&self.config);
            let mut uow = UnitOfWork::new(&self.ledgers, self.key.tenant_id, [self.key]);
            writer.update(&mut uow, rec.id, &revision).unwrap();
            writer.settle(&mut uow, self.at(20)).unwrap();
            uow.commit().unwrap();
            self.ledgers.get(self.key.tenant_id, rec.id).unwrap().unwrap()
        }

        fn item(&self) -> CatalogItem {
            self.items.get(self.key.tenant_id, &self.key.item_id).unwrap().unwrap()
        }

        fn rows(&self) -> Vec<CatalogAuditLog> {
            self.projector().audit_trail(self.key.tenant_id, self.key.item_id).unwrap()
        }
    }

    #[test]
    fn unmerchandised_item_is_not_projected() {
        let w = World::new();
        let rec = w.post(1, RecordType::Add, 5, Some(100));
        let err = w.projector().sync(&rec, w.at(1)).unwrap_err();
        assert!(matches!(err, EngineError::Stock(StockError::NotProjected { .. })));
    }

    #[test]
    fn merchandise_adopts_existing_stock_with_a_create_row() {
        let w = World::new();
        w.post(1, RecordType::Add, 5, Some(100));
        w.post(2, RecordType::Add, 3, Some(120));

        let (item, events) = w
            .projector()
            .merchandise(w.key.tenant_id, w.key.item_id, Pricing::marked(150), w.at(3))
            .unwrap();
        assert_eq!(item.quantity(), 8);
        assert_eq!(item.marked_price(), 150);
        assert_eq!(events.len(), 3);

        let rows = w.rows();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].audit_type, AuditType::Create);
        assert_eq!(rows[1].audit_type, AuditType::Update);
        assert_eq!(reconstruct_quantity(&rows).unwrap(), 8);
    }

    #[test]
    fn merchandise_without_stock_writes_one_empty_create_row() {
        let w = World::new();
        let (item, _) = w
            .projector()
            .merchandise(w.key.tenant_id, w.key.item_id, Pricing::marked(90), w.at(1))
            .unwrap();
        assert_eq!(item.quantity(), 0);
        let rows = w.rows();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].audit_type, AuditType::Create);
        assert_eq!(rows[0].source_record_id, None);
    }

    #[test]
    fn merchandising_twice_is_rejected() {
        let w = World::new();
        let p = w.projector();
        p.merchandise(w.key.tenant_id, w.key.item_id, Pricing::marked(90), w.at(1)).unwrap();
        let err = p
            .merchandise(w.key.tenant_id, w.key.item_id, Pricing::marked(90), w.at(1))
            .unwrap_err();
        assert!(matches!(err, EngineError::Stock(StockError::Validation(_))));
    }

    #[test]
    fn repeated_sync_of_an_unchanged_record_writes_nothing() {
        let w = World::new();
        w.projector()
            .merchandise(w.key.tenant_id, w.key.item_id, Pricing::marked(100), w.at(1))
            .unwrap();
        let rec = w.post(2, RecordType::Add, 5, Some(100));

        w.projector().sync(&rec, w.at(2)).unwrap();
        let before = w.rows().len();
        let events = w.projector().sync(&rec, w.at(2)).unwrap();
        assert!(events.is_empty());
        assert_eq!(w.rows().len(), before);
        assert_eq!(w.item().quantity(), 5);
    }

    #[test]
    fn edits_write_only_the_incremental_difference() {
        let w = World::new();
        w.projector()
            .merchandise(w.key.tenant_id, w.key.item_id, Pricing::marked(100), w.at(1))
            .unwrap();
        let rec = w.post(2, RecordType::Add, 5, Some(100));
        w.projector().sync(&rec, w.at(2)).unwrap();

        let revised = w.revise(&rec, Revision::quantity(8));
        w.projector().sync(&revised, w.at(3)).unwrap();

        let rows = w.rows();
        let last = rows.last().unwrap();
        assert_eq!(last.quantity_recorded, 3);
        assert_eq!(last.source_quantity, Some(8));
        assert_eq!(w.item().quantity(), 8);
        assert_eq!(reconstruct_quantity(&rows).unwrap(), 8);
    }

    #[test]
    fn receipts_refresh_the_marked_price() {
        let w = World::new();
        w.projector()
            .merchandise(w.key.tenant_id, w.key.item_id, Pricing::marked(100), w.at(1))
            .unwrap();
        let rec = w.post(2, RecordType::Add, 5, Some(130));
        w.projector().sync(&rec, w.at(2)).unwrap();
        assert_eq!(w.item().marked_price(), 130);
        let last = w.rows().last().cloned().unwrap();
        assert_eq!((last.price_before, last.price_after), (100, 130));

        // A backdated receipt does not displace the newer price.
        let older = w.post(1, RecordType::Add, 1, Some(90));
        w.projector().sync(&older, w.at(3)).unwrap();
        assert_eq!(w.item().marked_price(), 130);
    }

    #[test]
    fn price_breaking_the_threshold_is_not_adopted() {
        let w = World::new();
        w.projector()
            .merchandise(w.key.tenant_id, w.key.item_id, Pricing::new(200, 0, 180).unwrap(), w.at(1))
            .unwrap();
        let rec = w.post(2, RecordType::Add, 5, Some(150));
        w.projector().sync(&rec, w.at(2)).unwrap();
        assert_eq!(w.item().marked_price(), 200);
        assert_eq!(w.item().quantity(), 5);
    }

    #[test]
    fn drift_is_repaired_from_the_ledger() {
        let w = World::new();
        w.projector()
            .merchandise(w.key.tenant_id, w.key.item_id, Pricing::marked(100), w.at(1))
            .unwrap();
        // Posted but never synced.
        w.post(2, RecordType::Add, 4, Some(100));
        let later = w.post(3, RecordType::Add, 2, Some(100));

        w.projector().sync(&later, w.at(3)).unwrap();
        assert_eq!(w.item().quantity(), 6);
        assert_eq!(reconstruct_quantity(&w.rows()).unwrap(), 6);
    }

    #[test]
    fn reprice_validates_against_marked_price() {
        let w = World::new();
        let p = w.projector();
        p.merchandise(w.key.tenant_id, w.key.item_id, Pricing::marked(100), w.at(1)).unwrap();
        let (item, _) = p.reprice(w.key.tenant_id, w.key.item_id, 10, 80, w.at(2)).unwrap();
        assert_eq!(item.selling_price(), 90);

        let err = p.reprice(w.key.tenant_id, w.key.item_id, 10, 95, w.at(2)).unwrap_err();
        assert!(matches!(err, EngineError::Stock(StockError::Validation(_))));
    }

    #[test]
    fn records_outside_available_inventory_are_ignored() {
        let w = World::new();
        let mut rec = w.post(1, RecordType::Add, 5, Some(100));
        rec.location_id = LocationId::new();
        let events = w.projector().sync(&rec, w.at(1)).unwrap();
        assert!(events.is_empty());
    }

    #[test]
    fn rows_left_by_a_failed_item_write_are_not_counted_twice() {
        let w = World::new();
        w.projector()
            .merchandise(w.key.tenant_id, w.key.item_id, Pricing::marked(100), w.at(1))
            .unwrap();
        let rec = w.post(2, RecordType::Add, 5, Some(100));

        let flaky = FlakyItems {
            inner: &w.items,
            failing: AtomicBool::new(true),
        };
        let projector = CatalogProjector::new(&w.ledgers, &flaky, &w.audit, &w.config, &w.locks);
        let err = projector.sync(&rec, w.at(2)).unwrap_err();
        assert!(matches!(err, EngineError::Store(LedgerStoreError::Backend(_))));
        // The row landed, the item did not.
        assert_eq!(w.item().quantity(), 0);
        assert_eq!(reconstruct_quantity(&w.rows()).unwrap(), 5);

        flaky.failing.store(false, Ordering::SeqCst);
        projector.sync(&rec, w.at(3)).unwrap();
        assert_eq!(w.item().quantity(), 5);
        assert_eq!(reconstruct_quantity(&w.rows()).unwrap(), 5);
        assert_eq!(projector.ledger_truth(w.key.tenant_id, w.key.item_id).unwrap(), 5);
    }

    #[test]
    fn resync_restores_the_item_from_its_rows() {
        let w = World::new();
        w.projector()
            .merchandise(w.key.tenant_id, w.key.item_id, Pricing::marked(100), w.at(1))
            .unwrap();
        let rec = w.post(2, RecordType::Add, 4, Some(100));

        let flaky = FlakyItems {
            inner: &w.items,
            failing: AtomicBool::new(true),
        };
        let projector = CatalogProjector::new(&w.ledgers, &flaky, &w.audit, &w.config, &w.locks);
        assert!(projector.sync(&rec, w.at(2)).is_err());
        w.post(3, RecordType::Remove, 1, None);

        flaky.failing.store(false, Ordering::SeqCst);
        projector.resync_item(w.key.tenant_id, w.key.item_id, w.at(4)).unwrap();
        assert_eq!(w.item().quantity(), 3);
        assert_eq!(reconstruct_quantity(&w.rows()).unwrap(), 3);
    }
}
