//! Forward recomputation of a ledger after a write.

use tracing::debug;

use shelfwise_core::RecordId;
use shelfwise_ledger::{RecordType, StockError};

use crate::config::EngineConfig;
use crate::error::EngineResult;
use crate::ledger_store::LedgerStore;
use crate::unit_of_work::{Change, FollowUp, UnitOfWork};
use crate::writer::check_negative;

pub struct CascadeRecomputer<'c> {
    config: &'c EngineConfig,
}

impl<'c> CascadeRecomputer<'c> {
    pub fn new(config: &'c EngineConfig) -> Self {
        Self { config }
    }

    /// Re-derive opening, closing and receipt prices of every record after
    /// `start_id`, in order. Only records that actually move are staged.
    ///
    /// Returns how many records were restaged.
    pub fn recompute_forward<S: LedgerStore + ?Sized>(
        &self,
        uow: &mut UnitOfWork<'_, S>,
        start_id: RecordId,
    ) -> EngineResult<usize> {
        let start = uow.get(start_id)?.ok_or(StockError::NotFound(start_id))?;
        let key = start.key();
        let later = uow.all_after(&key, start.position(), Some(start.id))?;

        let mut opening = start.closing;
        let mut receipt_price = match start.record_type {
            RecordType::Add => Some(start.unit_price),
            RecordType::Remove => uow.latest_receipt_price(&key, start.position())?,
        };
        let mut restaged = 0;

        for mut rec in later {
            let before = rec.clone();
            rec.rebalance(opening, receipt_price)?;
            opening = rec.closing;
            if rec.record_type == RecordType::Add {
                receipt_price = Some(rec.unit_price);
            }

            if rec == before {
                continue;
            }
            check_negative(self.config, &rec)?;

            debug!(
                record_id = %rec.id,
                ledger = %key,
                opening_quantity = rec.opening.quantity,
                closing_quantity = rec.closing.quantity,
                "balance recomputed"
            );

            let repropagate = rec.feeds_inventory() && rec.unit_price != before.unit_price;
            let id = rec.id;
            uow.stage(rec, Change::Recomputed)?;
            if repropagate {
                uow.schedule(FollowUp::Propagate(id));
            }
            restaged += 1;
        }

        Ok(restaged)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::EngineError;
    use crate::ledger_store::InMemoryLedgerStore;
    use crate::writer::RecordWriter;
    use chrono::{DateTime, TimeZone, Utc};
    use shelfwise_core::{ItemId, LocationId, SourceId, TenantId};
    use shelfwise_ledger::{
        Balance, LedgerKey, LedgerKind, NewRecord, PriceSource, RemovalReason, Revision, SourceKind, verify_chain,
    };

    fn day(d: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 8, d, 9, 30, 0).unwrap()
    }

    fn add(key: LedgerKey, d: u32, qty: i64, price: i64) -> NewRecord {
        NewRecord {
            tenant_id: key.tenant_id,
            ledger_kind: key.kind,
            location_id: key.location_id,
            item_id: key.item_id,
            record_date: day(d),
            record_type: RecordType::Add,
            quantity: qty,
            unit_price: Some(price),
            removal_reason: None,
            source_kind: SourceKind::Purchase,
            source_id: Some(SourceId::new()),
            destination_id: None,
            quantity_leaving_warehouse: None,
        }
    }

    fn sale(key: LedgerKey, d: u32, qty: i64) -> NewRecord {
        NewRecord {
            record_type: RecordType::Remove,
            unit_price: None,
            removal_reason: Some(RemovalReason::Sales),
            source_kind: SourceKind::Sale,
            ..add(key, d, qty, 0)
        }
    }

    struct Ledger {
        store: InMemoryLedgerStore,
        config: EngineConfig,
        key: LedgerKey,
    }

    impl Ledger {
        fn new() -> Self {
            Self {
                store: InMemoryLedgerStore::new(),
                config: EngineConfig::default(),
                key: LedgerKey::new(TenantId::new(), LedgerKind::Inventory, LocationId::new(), ItemId::new()),
            }
        }

        fn write(&self, new: NewRecord) -> Result<RecordId, EngineError> {
            let writer = RecordWriter::new(&self.config);
            let mut uow = UnitOfWork::new(&self.store, self.key.tenant_id, [self.key]);
            let rec = writer.create(&mut uow, &new, new.record_date)?;
            writer.settle(&mut uow, new.record_date)?;
            uow.commit()?;
            Ok(rec.id)
        }

        fn revise(&self, id: RecordId, revision: Revision) -> Result<(), EngineError> {
            let writer = RecordWriter::new(&self.config);
            let mut uow = UnitOfWork::new(&self.store, self.key.tenant_id, [self.key]);
            writer.update(&mut uow, id, &revision)?;
            writer.settle(&mut uow, day(28))?;
            uow.commit()?;
            Ok(())
        }

        fn closings(&self) -> Vec<i64> {
            self.store
                .load_ledger(&self.key)
                .unwrap()
                .iter()
                .map(|r| r.closing.quantity)
                .collect()
        }
    }

    #[test]
    fn backdated_insert_shifts_every_later_record() {
        let l = Ledger::new();
        l.write(add(l.key, 1, 15, 100)).unwrap();
        l.write(add(l.key, 3, 5, 100)).unwrap();
        assert_eq!(l.closings(), vec![15, 20]);

        l.write(add(l.key, 2, 10, 100)).unwrap();
        assert_eq!(l.closings(), vec![15, 25, 30]);
        verify_chain(&l.store.load_ledger(&l.key).unwrap()).unwrap();
    }

    #[test]
    fn backdated_receipt_reprices_later_receipt_priced_removals() {
        let l = Ledger::new();
        l.write(add(l.key, 1, 10, 100)).unwrap();
        let removal = l.write(sale(l.key, 5, 4)).unwrap();

        l.write(add(l.key, 3, 10, 250)).unwrap();
        let rec = l.store.get(l.key.tenant_id, removal).unwrap().unwrap();
        assert_eq!(rec.price_source, PriceSource::LatestReceipt);
        assert_eq!(rec.unit_price, 250);
        assert_eq!(rec.opening, Balance::new(20, 3500));
        assert_eq!(rec.closing, Balance::new(16, 2500));
    }

    #[test]
    fn shrinking_a_receipt_cannot_overdraw_a_later_sale() {
        let l = Ledger::new();
        let receipt = l.write(add(l.key, 1, 10, 100)).unwrap();
        l.write(sale(l.key, 2, 8)).unwrap();

        let err = l.revise(receipt, Revision::quantity(5)).unwrap_err();
        assert!(matches!(err, EngineError::Stock(StockError::InsufficientStock { .. })));
        assert_eq!(l.closings(), vec![10, 2]);
    }

    #[test]
    fn revising_the_last_record_restages_nothing_else() {
        let l = Ledger::new();
        l.write(add(l.key, 1, 10, 100)).unwrap();
        let last = l.write(add(l.key, 2, 1, 100)).unwrap();

        let writer = RecordWriter::new(&l.config);
        let mut uow = UnitOfWork::new(&l.store, l.key.tenant_id, [l.key]);
        writer.update(&mut uow, last, &Revision::quantity(4)).unwrap();
        let restaged = CascadeRecomputer::new(&l.config).recompute_forward(&mut uow, last).unwrap();
        assert_eq!(restaged, 0);
    }
}
