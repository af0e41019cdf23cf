use std::sync::Arc;

use shelfwise_core::{ItemId, RecordId, SourceId, TenantId};
use shelfwise_ledger::{LedgerKey, LedgerKind, LedgerPosition, RecordType, StockRecord};

use crate::error::LedgerStoreError;

/// Append-mostly, tenant-scoped ledger storage.
///
/// Implementations must:
/// - return ledgers ascending by `LedgerPosition`
/// - hand out strictly increasing insertion sequences
/// - apply a `commit` batch atomically, rejecting the whole batch on a unique
///   source collision, a position collision or a changed identity field
pub trait LedgerStore: Send + Sync {
    fn get(&self, tenant_id: TenantId, id: RecordId) -> Result<Option<StockRecord>, LedgerStoreError>;

    /// Every record of one ledger, ascending.
    fn load_ledger(&self, key: &LedgerKey) -> Result<Vec<StockRecord>, LedgerStoreError>;

    /// The record materialized from `source_id` for (kind, record_type), if any.
    fn find_by_source(
        &self,
        tenant_id: TenantId,
        kind: LedgerKind,
        record_type: RecordType,
        source_id: SourceId,
    ) -> Result<Option<StockRecord>, LedgerStoreError>;

    /// Ledgers of `kind` holding `item_id`, one per location.
    fn ledger_keys(
        &self,
        tenant_id: TenantId,
        kind: LedgerKind,
        item_id: ItemId,
    ) -> Result<Vec<LedgerKey>, LedgerStoreError>;

    /// Next insertion sequence (tie-break for equal record dates).
    fn next_sequence(&self) -> Result<u64, LedgerStoreError>;

    /// Insert new records and overwrite existing ones, all or nothing.
    fn commit(&self, batch: &[StockRecord]) -> Result<(), LedgerStoreError>;

    /// Last record strictly before `before`, skipping `exclude`.
    fn latest_before(
        &self,
        key: &LedgerKey,
        before: LedgerPosition,
        exclude: Option<RecordId>,
    ) -> Result<Option<StockRecord>, LedgerStoreError> {
        Ok(self
            .load_ledger(key)?
            .into_iter()
            .rev()
            .find(|r| r.position() < before && Some(r.id) != exclude))
    }

    /// Records strictly after `after`, ascending, skipping `exclude`.
    fn all_after(
        &self,
        key: &LedgerKey,
        after: LedgerPosition,
        exclude: Option<RecordId>,
    ) -> Result<Vec<StockRecord>, LedgerStoreError> {
        Ok(self
            .load_ledger(key)?
            .into_iter()
            .filter(|r| r.position() > after && Some(r.id) != exclude)
            .collect())
    }
}

impl<S> LedgerStore for Arc<S>
where
    S: LedgerStore + ?Sized,
{
    fn get(&self, tenant_id: TenantId, id: RecordId) -> Result<Option<StockRecord>, LedgerStoreError> {
        (**self).get(tenant_id, id)
    }

    fn load_ledger(&self, key: &LedgerKey) -> Result<Vec<StockRecord>, LedgerStoreError> {
        (**self).load_ledger(key)
    }

    fn find_by_source(
        &self,
        tenant_id: TenantId,
        kind: LedgerKind,
        record_type: RecordType,
        source_id: SourceId,
    ) -> Result<Option<StockRecord>, LedgerStoreError> {
        (**self).find_by_source(tenant_id, kind, record_type, source_id)
    }

    fn ledger_keys(
        &self,
        tenant_id: TenantId,
        kind: LedgerKind,
        item_id: ItemId,
    ) -> Result<Vec<LedgerKey>, LedgerStoreError> {
        (**self).ledger_keys(tenant_id, kind, item_id)
    }

    fn next_sequence(&self) -> Result<u64, LedgerStoreError> {
        (**self).next_sequence()
    }

    fn commit(&self, batch: &[StockRecord]) -> Result<(), LedgerStoreError> {
        (**self).commit(batch)
    }

    fn latest_before(
        &self,
        key: &LedgerKey,
        before: LedgerPosition,
        exclude: Option<RecordId>,
    ) -> Result<Option<StockRecord>, LedgerStoreError> {
        (**self).latest_before(key, before, exclude)
    }

    fn all_after(
        &self,
        key: &LedgerKey,
        after: LedgerPosition,
        exclude: Option<RecordId>,
    ) -> Result<Vec<StockRecord>, LedgerStoreError> {
        (**self).all_after(key, after, exclude)
    }
}
