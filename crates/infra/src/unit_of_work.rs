//! Staged writes over a `LedgerStore`.
//!
//! A business event (write, cascade, propagation, cascade of the propagated
//! record) runs inside one `UnitOfWork`. Reads see staged records layered
//! over the store; nothing reaches the store until `commit`, and dropping the
//! unit discards everything.

use std::collections::{BTreeSet, HashMap, VecDeque};

use shelfwise_core::{RecordId, SourceId, TenantId};
use shelfwise_ledger::{
    LedgerKey, LedgerKind, LedgerPosition, RecordType, StockError, StockRecord, latest_receipt_price,
};

use crate::error::EngineResult;
use crate::ledger_store::LedgerStore;

/// Deferred ledger step, drained iteratively by the writer.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum FollowUp {
    /// Re-derive every record after this one in its ledger.
    Cascade(RecordId),
    /// Mirror a warehouse-to-inventory removal into its inventory ledger.
    Propagate(RecordId),
}

/// How a staged record changed. Ordered weakest first.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub enum Change {
    Recomputed,
    Revised,
    Posted,
}

/// Records written by a committed unit, in staging order.
#[derive(Debug, Clone, Default)]
pub struct Committed {
    pub records: Vec<(StockRecord, Change)>,
}

impl Committed {
    pub fn find(&self, id: RecordId) -> Option<&StockRecord> {
        self.records.iter().map(|(r, _)| r).find(|r| r.id == id)
    }
}

pub struct UnitOfWork<'s, S: LedgerStore + ?Sized> {
    store: &'s S,
    tenant_id: TenantId,
    locked: BTreeSet<LedgerKey>,
    staged: HashMap<RecordId, StockRecord>,
    changes: HashMap<RecordId, Change>,
    order: Vec<RecordId>,
    pending: VecDeque<FollowUp>,
}

impl<'s, S: LedgerStore + ?Sized> UnitOfWork<'s, S> {
    /// Open a unit that may write only to `locked` ledgers.
    pub fn new(store: &'s S, tenant_id: TenantId, locked: impl IntoIterator<Item = LedgerKey>) -> Self {
        Self {
            store,
            tenant_id,
            locked: locked.into_iter().collect(),
            staged: HashMap::new(),
            changes: HashMap::new(),
            order: Vec::new(),
            pending: VecDeque::new(),
        }
    }

    pub fn tenant_id(&self) -> TenantId {
        self.tenant_id
    }

    pub fn get(&self, id: RecordId) -> EngineResult<Option<StockRecord>> {
        if let Some(rec) = self.staged.get(&id) {
            return Ok(Some(rec.clone()));
        }
        Ok(self.store.get(self.tenant_id, id)?)
    }

    fn has_staged_in(&self, key: &LedgerKey) -> bool {
        self.staged.values().any(|r| r.key() == *key)
    }

    /// The ledger as it will read after commit, ascending.
    pub fn ledger(&self, key: &LedgerKey) -> EngineResult<Vec<StockRecord>> {
        let mut merged: Vec<StockRecord> = self
            .store
            .load_ledger(key)?
            .into_iter()
            .filter(|r| !self.staged.contains_key(&r.id))
            .collect();
        merged.extend(self.staged.values().filter(|r| r.key() == *key).cloned());
        merged.sort_by_key(StockRecord::position);

        if let Some(pair) = merged.windows(2).find(|w| w[0].position() == w[1].position()) {
            return Err(StockError::stale_chain(format!(
                "records {} and {} share a position in ledger {key}",
                pair[0].id, pair[1].id
            ))
            .into());
        }
        Ok(merged)
    }

    pub fn latest_before(
        &self,
        key: &LedgerKey,
        before: LedgerPosition,
        exclude: Option<RecordId>,
    ) -> EngineResult<Option<StockRecord>> {
        if !self.has_staged_in(key) {
            return Ok(self.store.latest_before(key, before, exclude)?);
        }
        Ok(self
            .ledger(key)?
            .into_iter()
            .rev()
            .find(|r| r.position() < before && Some(r.id) != exclude))
    }

    pub fn all_after(
        &self,
        key: &LedgerKey,
        after: LedgerPosition,
        exclude: Option<RecordId>,
    ) -> EngineResult<Vec<StockRecord>> {
        if !self.has_staged_in(key) {
            return Ok(self.store.all_after(key, after, exclude)?);
        }
        Ok(self
            .ledger(key)?
            .into_iter()
            .filter(|r| r.position() > after && Some(r.id) != exclude)
            .collect())
    }

    /// Price of the nearest addition strictly before `position`.
    pub fn latest_receipt_price(&self, key: &LedgerKey, position: LedgerPosition) -> EngineResult<Option<i64>> {
        Ok(latest_receipt_price(&self.ledger(key)?, position))
    }

    pub fn find_by_source(
        &self,
        kind: LedgerKind,
        record_type: RecordType,
        source_id: SourceId,
    ) -> EngineResult<Option<StockRecord>> {
        let staged = self.staged.values().find(|r| {
            r.ledger_kind == kind && r.record_type == record_type && r.source_id() == Some(source_id)
        });
        if let Some(rec) = staged {
            return Ok(Some(rec.clone()));
        }
        Ok(self
            .store
            .find_by_source(self.tenant_id, kind, record_type, source_id)?
            .map(|r| self.staged.get(&r.id).cloned().unwrap_or(r)))
    }

    pub fn next_sequence(&self) -> EngineResult<u64> {
        Ok(self.store.next_sequence()?)
    }

    /// Stage a record write. The record's ledger must be locked by this unit.
    pub fn stage(&mut self, rec: StockRecord, change: Change) -> EngineResult<()> {
        if rec.tenant_id != self.tenant_id {
            return Err(StockError::validation(format!(
                "record {} belongs to tenant {}, unit is scoped to {}",
                rec.id, rec.tenant_id, self.tenant_id
            ))
            .into());
        }
        if !self.locked.contains(&rec.key()) {
            return Err(StockError::stale_chain(format!("ledger {} is not locked by this write", rec.key())).into());
        }

        let id = rec.id;
        if self.staged.insert(id, rec).is_none() {
            self.order.push(id);
        }
        let strongest = self.changes.get(&id).map_or(change, |c| (*c).max(change));
        self.changes.insert(id, strongest);
        Ok(())
    }

    pub fn schedule(&mut self, step: FollowUp) {
        if !self.pending.contains(&step) {
            self.pending.push_back(step);
        }
    }

    pub fn next_follow_up(&mut self) -> Option<FollowUp> {
        self.pending.pop_front()
    }

    /// Write every staged record in one atomic batch.
    pub fn commit(self) -> EngineResult<Committed> {
        if !self.pending.is_empty() {
            return Err(StockError::stale_chain("unit committed with unsettled follow-ups").into());
        }

        let mut batch = Vec::with_capacity(self.order.len());
        let mut records = Vec::with_capacity(self.order.len());
        for id in &self.order {
            if let Some(rec) = self.staged.get(id) {
                batch.push(rec.clone());
                records.push((rec.clone(), self.changes.get(id).copied().unwrap_or(Change::Recomputed)));
            }
        }

        if !batch.is_empty() {
            self.store.commit(&batch)?;
        }
        Ok(Committed { records })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::EngineError;
    use crate::ledger_store::InMemoryLedgerStore;
    use chrono::{DateTime, TimeZone, Utc};
    use shelfwise_core::{ItemId, LocationId};
    use shelfwise_ledger::{Balance, NewRecord, SourceKind};

    fn day(d: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, d, 8, 0, 0).unwrap()
    }

    fn record(store: &InMemoryLedgerStore, key: LedgerKey, date: DateTime<Utc>, qty: i64) -> StockRecord {
        let new = NewRecord {
            tenant_id: key.tenant_id,
            ledger_kind: key.kind,
            location_id: key.location_id,
            item_id: key.item_id,
            record_date: date,
            record_type: RecordType::Add,
            quantity: qty,
            unit_price: Some(100),
            removal_reason: None,
            source_kind: SourceKind::Purchase,
            source_id: Some(SourceId::new()),
            destination_id: None,
            quantity_leaving_warehouse: None,
        };
        let seq = store.next_sequence().unwrap();
        StockRecord::from_new(&new, RecordId::new(), seq, Balance::ZERO, None, None, date).unwrap()
    }

    fn key(tenant_id: TenantId) -> LedgerKey {
        LedgerKey::new(tenant_id, LedgerKind::Inventory, LocationId::new(), ItemId::new())
    }

    #[test]
    fn reads_merge_staged_records_over_the_store() {
        let store = InMemoryLedgerStore::new();
        let tenant = TenantId::new();
        let k = key(tenant);
        let committed = record(&store, k, day(1), 5);
        store.commit(&[committed.clone()]).unwrap();

        let mut uow = UnitOfWork::new(&store, tenant, [k]);
        let staged = record(&store, k, day(3), 2);
        uow.stage(staged.clone(), Change::Posted).unwrap();

        let ids: Vec<_> = uow.ledger(&k).unwrap().into_iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![committed.id, staged.id]);
        assert_eq!(uow.latest_before(&k, staged.position(), None).unwrap().unwrap().id, committed.id);
        assert_eq!(
            uow.find_by_source(LedgerKind::Inventory, RecordType::Add, staged.source_id().unwrap())
                .unwrap()
                .unwrap()
                .id,
            staged.id
        );
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn dropping_a_unit_leaves_the_store_untouched() {
        let store = InMemoryLedgerStore::new();
        let tenant = TenantId::new();
        let k = key(tenant);
        {
            let mut uow = UnitOfWork::new(&store, tenant, [k]);
            uow.stage(record(&store, k, day(1), 5), Change::Posted).unwrap();
        }
        assert!(store.is_empty());
    }

    #[test]
    fn staging_outside_locked_ledgers_is_rejected() {
        let store = InMemoryLedgerStore::new();
        let tenant = TenantId::new();
        let mut uow = UnitOfWork::new(&store, tenant, [key(tenant)]);
        let err = uow.stage(record(&store, key(tenant), day(1), 1), Change::Posted).unwrap_err();
        assert!(matches!(err, EngineError::Stock(StockError::StaleChain(_))));
    }

    #[test]
    fn restaging_keeps_the_strongest_change() {
        let store = InMemoryLedgerStore::new();
        let tenant = TenantId::new();
        let k = key(tenant);
        let mut uow = UnitOfWork::new(&store, tenant, [k]);
        let mut rec = record(&store, k, day(1), 5);
        uow.stage(rec.clone(), Change::Posted).unwrap();
        rec.closing = Balance::new(7, 700);
        uow.stage(rec.clone(), Change::Recomputed).unwrap();

        let committed = uow.commit().unwrap();
        assert_eq!(committed.records.len(), 1);
        assert_eq!(committed.records[0].1, Change::Posted);
        assert_eq!(committed.records[0].0.closing, Balance::new(7, 700));
    }

    #[test]
    fn follow_ups_are_deduplicated_and_fifo() {
        let store = InMemoryLedgerStore::new();
        let mut uow = UnitOfWork::new(&store, TenantId::new(), []);
        let a = RecordId::new();
        let b = RecordId::new();
        uow.schedule(FollowUp::Cascade(a));
        uow.schedule(FollowUp::Propagate(b));
        uow.schedule(FollowUp::Cascade(a));
        assert_eq!(uow.next_follow_up(), Some(FollowUp::Cascade(a)));
        assert_eq!(uow.next_follow_up(), Some(FollowUp::Propagate(b)));
        assert_eq!(uow.next_follow_up(), None);
    }
}
