//! Source-id idempotency.
//!
//! A source event (sale line, receipt, warehouse record) materializes at most
//! once per (ledger kind, record type). Replays surface `DuplicateSource` so
//! callers switch to Update instead of double-counting stock.

use shelfwise_core::SourceId;
use shelfwise_ledger::{LedgerKind, NewRecord, RecordType, StockError, StockRecord};

use crate::error::EngineResult;
use crate::ledger_store::LedgerStore;
use crate::unit_of_work::UnitOfWork;

pub struct IdempotencyGuard;

impl IdempotencyGuard {
    /// Reject a create whose source was already recorded.
    pub fn ensure_unused<S: LedgerStore + ?Sized>(uow: &UnitOfWork<'_, S>, new: &NewRecord) -> EngineResult<()> {
        let Some(source_id) = new.source_id else {
            return Ok(());
        };
        if let Some(existing) = uow.find_by_source(new.ledger_kind, new.record_type, source_id)? {
            tracing::debug!(
                record_id = %existing.id,
                source_id = %source_id,
                "source already materialized"
            );
            return Err(StockError::DuplicateSource {
                ledger_kind: new.ledger_kind,
                record_type: new.record_type,
                source_id,
            }
            .into());
        }
        Ok(())
    }

    /// The record a source event produced, for Update.
    pub fn locate<S: LedgerStore + ?Sized>(
        uow: &UnitOfWork<'_, S>,
        kind: LedgerKind,
        record_type: RecordType,
        source_id: SourceId,
    ) -> EngineResult<StockRecord> {
        uow.find_by_source(kind, record_type, source_id)?.ok_or_else(|| {
            StockError::validation(format!("no {kind} {record_type} recorded for source {source_id}")).into()
        })
    }
}
