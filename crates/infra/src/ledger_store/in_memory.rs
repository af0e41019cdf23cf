use std::collections::{BTreeMap, HashMap, HashSet};
use std::ops::Bound;
use std::sync::RwLock;
use std::sync::atomic::{AtomicU64, Ordering};

use shelfwise_core::{ItemId, RecordId, SourceId, TenantId};
use shelfwise_ledger::{LedgerKey, LedgerKind, LedgerPosition, RecordType, StockRecord};

use super::r#trait::LedgerStore;
use crate::error::LedgerStoreError;

/// Unique index on (tenant, ledger kind, record type, source id).
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
struct SourceKey {
    tenant_id: TenantId,
    kind: LedgerKind,
    record_type: RecordType,
    source_id: SourceId,
}

impl SourceKey {
    fn of(rec: &StockRecord) -> Option<Self> {
        rec.source_id().map(|source_id| Self {
            tenant_id: rec.tenant_id,
            kind: rec.ledger_kind,
            record_type: rec.record_type,
            source_id,
        })
    }
}

#[derive(Debug, Default)]
struct Tables {
    records: HashMap<RecordId, StockRecord>,
    ledgers: HashMap<LedgerKey, BTreeMap<LedgerPosition, RecordId>>,
    sources: HashMap<SourceKey, RecordId>,
}

impl Tables {
    fn check(&self, batch: &[StockRecord]) -> Result<(), LedgerStoreError> {
        let mut batch_sources: HashSet<SourceKey> = HashSet::new();
        let mut batch_positions: HashSet<(LedgerKey, LedgerPosition)> = HashSet::new();

        for rec in batch {
            if let Some(existing) = self.records.get(&rec.id) {
                if existing.tenant_id != rec.tenant_id
                    || existing.key() != rec.key()
                    || existing.position() != rec.position()
                    || existing.record_type != rec.record_type
                    || existing.source_id() != rec.source_id()
                {
                    return Err(LedgerStoreError::ImmutableField(rec.id));
                }
                continue;
            }

            if let Some(source) = SourceKey::of(rec) {
                let taken = self.sources.get(&source).is_some_and(|id| *id != rec.id);
                if taken || !batch_sources.insert(source) {
                    return Err(LedgerStoreError::DuplicateSource {
                        ledger_kind: source.kind,
                        record_type: source.record_type,
                        source_id: source.source_id,
                    });
                }
            }

            let occupied = self
                .ledgers
                .get(&rec.key())
                .and_then(|l| l.get(&rec.position()))
                .is_some_and(|id| *id != rec.id);
            if occupied || !batch_positions.insert((rec.key(), rec.position())) {
                return Err(LedgerStoreError::PositionConflict(rec.id));
            }
        }

        Ok(())
    }

    fn apply(&mut self, batch: &[StockRecord]) {
        for rec in batch {
            self.ledgers
                .entry(rec.key())
                .or_default()
                .insert(rec.position(), rec.id);
            if let Some(source) = SourceKey::of(rec) {
                self.sources.insert(source, rec.id);
            }
            self.records.insert(rec.id, rec.clone());
        }
    }

    fn resolve(&self, ids: impl Iterator<Item = RecordId>) -> Vec<StockRecord> {
        ids.filter_map(|id| self.records.get(&id).cloned()).collect()
    }
}

/// In-memory ledger store.
///
/// Intended for tests/dev. Per-ledger `BTreeMap` indexes make range queries
/// logarithmic.
#[derive(Debug, Default)]
pub struct InMemoryLedgerStore {
    tables: RwLock<Tables>,
    sequence: AtomicU64,
}

impl InMemoryLedgerStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored records across all tenants.
    pub fn len(&self) -> usize {
        self.tables.read().map(|t| t.records.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl LedgerStore for InMemoryLedgerStore {
    fn get(&self, tenant_id: TenantId, id: RecordId) -> Result<Option<StockRecord>, LedgerStoreError> {
        let tables = self
            .tables
            .read()
            .map_err(|_| LedgerStoreError::Poisoned("ledger tables"))?;
        Ok(tables
            .records
            .get(&id)
            .filter(|r| r.tenant_id == tenant_id)
            .cloned())
    }

    fn load_ledger(&self, key: &LedgerKey) -> Result<Vec<StockRecord>, LedgerStoreError> {
        let tables = self
            .tables
            .read()
            .map_err(|_| LedgerStoreError::Poisoned("ledger tables"))?;
        Ok(match tables.ledgers.get(key) {
            Some(ledger) => tables.resolve(ledger.values().copied()),
            None => Vec::new(),
        })
    }

    fn find_by_source(
        &self,
        tenant_id: TenantId,
        kind: LedgerKind,
        record_type: RecordType,
        source_id: SourceId,
    ) -> Result<Option<StockRecord>, LedgerStoreError> {
        let tables = self
            .tables
            .read()
            .map_err(|_| LedgerStoreError::Poisoned("ledger tables"))?;
        let key = SourceKey {
            tenant_id,
            kind,
            record_type,
            source_id,
        };
        Ok(tables
            .sources
            .get(&key)
            .and_then(|id| tables.records.get(id))
            .cloned())
    }

    fn ledger_keys(
        &self,
        tenant_id: TenantId,
        kind: LedgerKind,
        item_id: ItemId,
    ) -> Result<Vec<LedgerKey>, LedgerStoreError> {
        let tables = self
            .tables
            .read()
            .map_err(|_| LedgerStoreError::Poisoned("ledger tables"))?;
        let mut keys: Vec<LedgerKey> = tables
            .ledgers
            .keys()
            .filter(|k| k.tenant_id == tenant_id && k.kind == kind && k.item_id == item_id)
            .copied()
            .collect();
        keys.sort();
        Ok(keys)
    }

    fn next_sequence(&self) -> Result<u64, LedgerStoreError> {
        Ok(self.sequence.fetch_add(1, Ordering::SeqCst) + 1)
    }

    fn commit(&self, batch: &[StockRecord]) -> Result<(), LedgerStoreError> {
        let mut tables = self
            .tables
            .write()
            .map_err(|_| LedgerStoreError::Poisoned("ledger tables"))?;
        tables.check(batch)?;
        tables.apply(batch);
        Ok(())
    }

    fn latest_before(
        &self,
        key: &LedgerKey,
        before: LedgerPosition,
        exclude: Option<RecordId>,
    ) -> Result<Option<StockRecord>, LedgerStoreError> {
        let tables = self
            .tables
            .read()
            .map_err(|_| LedgerStoreError::Poisoned("ledger tables"))?;
        let Some(ledger) = tables.ledgers.get(key) else {
            return Ok(None);
        };
        Ok(ledger
            .range(..before)
            .rev()
            .map(|(_, id)| *id)
            .find(|id| Some(*id) != exclude)
            .and_then(|id| tables.records.get(&id).cloned()))
    }

    fn all_after(
        &self,
        key: &LedgerKey,
        after: LedgerPosition,
        exclude: Option<RecordId>,
    ) -> Result<Vec<StockRecord>, LedgerStoreError> {
        let tables = self
            .tables
            .read()
            .map_err(|_| LedgerStoreError::Poisoned("ledger tables"))?;
        let Some(ledger) = tables.ledgers.get(key) else {
            return Ok(Vec::new());
        };
        let ids = ledger
            .range((Bound::Excluded(after), Bound::Unbounded))
            .map(|(_, id)| *id)
            .filter(|id| Some(*id) != exclude);
        Ok(tables.resolve(ids))
    }
}
