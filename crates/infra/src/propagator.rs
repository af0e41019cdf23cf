//! Warehouse-to-inventory linking.
//!
//! A warehouse removal with reason `inventory` lands as exactly one inventory
//! addition, keyed by the warehouse record's id as its source. Re-propagating
//! updates that addition instead of creating another.

use chrono::{DateTime, Utc};
use tracing::{debug, info};

use shelfwise_core::{RecordId, SourceId};
use shelfwise_ledger::{LedgerKind, NewRecord, RecordType, Revision, SourceKind, StockError, StockRecord};

use crate::error::EngineResult;
use crate::ledger_store::LedgerStore;
use crate::unit_of_work::UnitOfWork;
use crate::writer::RecordWriter;

pub struct CrossLedgerPropagator<'c> {
    writer: RecordWriter<'c>,
}

impl<'c> CrossLedgerPropagator<'c> {
    pub fn new(writer: RecordWriter<'c>) -> Self {
        Self { writer }
    }

    /// Create or update the inventory addition mirroring `warehouse_id`.
    ///
    /// Returns the inventory record, or `None` when the warehouse record does
    /// not feed inventory.
    pub fn propagate<S: LedgerStore + ?Sized>(
        &self,
        uow: &mut UnitOfWork<'_, S>,
        warehouse_id: RecordId,
        now: DateTime<Utc>,
    ) -> EngineResult<Option<StockRecord>> {
        let wh = uow.get(warehouse_id)?.ok_or(StockError::NotFound(warehouse_id))?;
        if !wh.feeds_inventory() {
            return Ok(None);
        }

        let source_id = SourceId::from(wh.id);
        let leaving = wh
            .transfer_split
            .map_or(wh.quantity, |s| s.quantity_leaving_warehouse);

        let linked = uow.find_by_source(LedgerKind::Inventory, RecordType::Add, source_id)?;
        let inventory = match linked {
            Some(existing) => {
                let revision = Revision {
                    quantity: wh.quantity,
                    unit_price: Some(wh.unit_price),
                    quantity_leaving_warehouse: Some(leaving),
                };
                debug!(warehouse_record = %wh.id, inventory_record = %existing.id, "updating linked inventory record");
                self.writer.update(uow, existing.id, &revision)?
            }
            None => {
                let destination_id = wh.destination_id.ok_or_else(|| {
                    StockError::validation(format!("warehouse record {} has no destination", wh.id))
                })?;
                let new = NewRecord {
                    tenant_id: wh.tenant_id,
                    ledger_kind: LedgerKind::Inventory,
                    location_id: destination_id,
                    item_id: wh.item_id,
                    record_date: wh.record_date,
                    record_type: RecordType::Add,
                    quantity: wh.quantity,
                    unit_price: Some(wh.unit_price),
                    removal_reason: None,
                    source_kind: SourceKind::Transfer,
                    source_id: Some(source_id),
                    destination_id: None,
                    quantity_leaving_warehouse: Some(leaving),
                };
                let created = self.writer.create(uow, &new, now)?;
                info!(
                    warehouse_record = %wh.id,
                    inventory_record = %created.id,
                    location_id = %destination_id,
                    quantity = created.quantity,
                    "warehouse removal landed in inventory"
                );
                created
            }
        };

        Ok(Some(inventory))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{EngineConfig, LocationKind};
    use crate::ledger_store::InMemoryLedgerStore;
    use chrono::TimeZone;
    use shelfwise_core::{ItemId, LocationId, TenantId};
    use shelfwise_ledger::{LedgerKey, RemovalReason, TransferSplit};

    struct Setup {
        store: InMemoryLedgerStore,
        config: EngineConfig,
        warehouse: LedgerKey,
        inventory: LedgerKey,
    }

    fn setup() -> Setup {
        let tenant = TenantId::new();
        let item = ItemId::new();
        let wh_loc = LocationId::new();
        let shelf = LocationId::new();
        Setup {
            store: InMemoryLedgerStore::new(),
            config: EngineConfig::default()
                .with_location(tenant, wh_loc, LocationKind::Warehouse)
                .with_location(tenant, shelf, LocationKind::available())
                .with_default_destination(tenant, shelf),
            warehouse: LedgerKey::new(tenant, LedgerKind::Warehouse, wh_loc, item),
            inventory: LedgerKey::new(tenant, LedgerKind::Inventory, shelf, item),
        }
    }

    fn at(d: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 9, d, 7, 0, 0).unwrap()
    }

    fn wh_new(s: &Setup, record_type: RecordType, qty: i64) -> NewRecord {
        NewRecord {
            tenant_id: s.warehouse.tenant_id,
            ledger_kind: LedgerKind::Warehouse,
            location_id: s.warehouse.location_id,
            item_id: s.warehouse.item_id,
            record_date: at(1),
            record_type,
            quantity: qty,
            unit_price: (record_type == RecordType::Add).then_some(40),
            removal_reason: (record_type == RecordType::Remove).then_some(RemovalReason::Inventory),
            source_kind: SourceKind::Transfer,
            source_id: Some(SourceId::new()),
            destination_id: None,
            quantity_leaving_warehouse: None,
        }
    }

    #[test]
    fn removal_lands_once_and_updates_on_repropagation() {
        let s = setup();
        let writer = RecordWriter::new(&s.config);
        let mut uow = UnitOfWork::new(&s.store, s.warehouse.tenant_id, [s.warehouse, s.inventory]);

        writer.create(&mut uow, &wh_new(&s, RecordType::Add, 20), at(1)).unwrap();
        let mut removal = wh_new(&s, RecordType::Remove, 10);
        removal.quantity_leaving_warehouse = Some(4);
        let wh = writer.create(&mut uow, &removal, at(1)).unwrap();
        writer.settle(&mut uow, at(1)).unwrap();

        let linked = uow
            .find_by_source(LedgerKind::Inventory, RecordType::Add, SourceId::from(wh.id))
            .unwrap()
            .unwrap();
        assert_eq!(linked.location_id, s.inventory.location_id);
        assert_eq!(linked.quantity, 10);
        assert_eq!(linked.unit_price, 40);
        assert_eq!(linked.transfer_split, Some(TransferSplit::new(10, 4, Some(6)).unwrap()));

        let propagator = CrossLedgerPropagator::new(writer);
        let again = propagator.propagate(&mut uow, wh.id, at(1)).unwrap().unwrap();
        assert_eq!(again.id, linked.id);
        assert_eq!(uow.ledger(&s.inventory).unwrap().len(), 1);
    }

    #[test]
    fn non_inventory_removals_are_ignored() {
        let s = setup();
        let writer = RecordWriter::new(&s.config);
        let mut uow = UnitOfWork::new(&s.store, s.warehouse.tenant_id, [s.warehouse]);
        let receipt = writer.create(&mut uow, &wh_new(&s, RecordType::Add, 5), at(1)).unwrap();

        let out = CrossLedgerPropagator::new(writer).propagate(&mut uow, receipt.id, at(1)).unwrap();
        assert!(out.is_none());
    }
}
