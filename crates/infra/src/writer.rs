//! Create/Update of ledger records inside a unit of work.

use chrono::{DateTime, Utc};
use tracing::{debug, error};

use shelfwise_core::{RecordId, SourceId};
use shelfwise_ledger::{
    Balance, LedgerKind, LedgerPosition, NewRecord, RecordType, Revision, StockError, StockRecord,
};

use crate::cascade::CascadeRecomputer;
use crate::config::{EngineConfig, LocationKind};
use crate::error::EngineResult;
use crate::idempotency::IdempotencyGuard;
use crate::ledger_store::LedgerStore;
use crate::propagator::CrossLedgerPropagator;
use crate::unit_of_work::{Change, FollowUp, UnitOfWork};

/// Reject a removal that closes below zero when its reason forbids it.
pub(crate) fn check_negative(config: &EngineConfig, rec: &StockRecord) -> Result<(), StockError> {
    let Some(reason) = rec.removal_reason else {
        return Ok(());
    };
    if rec.record_type == RecordType::Remove && rec.closing.quantity < 0 && !config.allows_negative(reason) {
        return Err(StockError::InsufficientStock {
            record_id: rec.id,
            reason,
            available: rec.opening.quantity,
            requested: rec.quantity,
        });
    }
    Ok(())
}

#[derive(Debug, Clone, Copy)]
pub struct RecordWriter<'c> {
    config: &'c EngineConfig,
}

impl<'c> RecordWriter<'c> {
    pub fn new(config: &'c EngineConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &'c EngineConfig {
        self.config
    }

    /// Stage a new record at its position and schedule its follow-ups.
    pub fn create<S: LedgerStore + ?Sized>(
        &self,
        uow: &mut UnitOfWork<'_, S>,
        new: &NewRecord,
        now: DateTime<Utc>,
    ) -> EngineResult<StockRecord> {
        new.validate()?;
        if new.tenant_id != uow.tenant_id() {
            return Err(StockError::validation("record tenant does not match the write").into());
        }
        IdempotencyGuard::ensure_unused(uow, new)?;

        if let Some(kind) = self.config.location_kind(new.tenant_id, new.location_id) {
            if kind.ledger_kind() != new.ledger_kind {
                return Err(StockError::validation(format!(
                    "location {} is not a {} location",
                    new.location_id, new.ledger_kind
                ))
                .into());
            }
        }

        let destination_id = if new.feeds_inventory() {
            let destination = self
                .config
                .resolve_destination(new.tenant_id, new.destination_id)
                .ok_or_else(|| StockError::validation("warehouse-to-inventory removal needs a destination"))?;
            if matches!(
                self.config.location_kind(new.tenant_id, destination),
                Some(LocationKind::Warehouse)
            ) {
                return Err(StockError::validation(format!(
                    "destination {destination} is not an inventory location"
                ))
                .into());
            }
            Some(destination)
        } else {
            None
        };

        let key = new.key();
        let insertion_sequence = uow.next_sequence()?;
        let position = LedgerPosition {
            record_date: new.record_date,
            insertion_sequence,
        };
        let opening = uow
            .latest_before(&key, position, None)?
            .map_or(Balance::ZERO, |prev| prev.closing);
        let receipt_price = uow.latest_receipt_price(&key, position)?;

        let rec = StockRecord::from_new(
            new,
            RecordId::new(),
            insertion_sequence,
            opening,
            receipt_price,
            destination_id,
            now,
        )?;
        check_negative(self.config, &rec)?;

        debug!(
            record_id = %rec.id,
            ledger = %key,
            record_type = %rec.record_type,
            quantity = rec.quantity,
            closing_quantity = rec.closing.quantity,
            "record staged"
        );

        uow.stage(rec.clone(), Change::Posted)?;
        uow.schedule(FollowUp::Cascade(rec.id));
        if rec.feeds_inventory() {
            uow.schedule(FollowUp::Propagate(rec.id));
        }
        Ok(rec)
    }

    /// Revise an existing record in place; its position never moves.
    ///
    /// Follow-ups run even when the revision changes nothing, so a correction
    /// also repairs the records after it.
    pub fn update<S: LedgerStore + ?Sized>(
        &self,
        uow: &mut UnitOfWork<'_, S>,
        id: RecordId,
        revision: &Revision,
    ) -> EngineResult<StockRecord> {
        let mut rec = uow.get(id)?.ok_or(StockError::NotFound(id))?;
        let before = rec.clone();
        let receipt_price = uow.latest_receipt_price(&rec.key(), rec.position())?;
        rec.revise(revision, receipt_price)?;
        check_negative(self.config, &rec)?;

        if rec == before {
            debug!(record_id = %id, "revision changes nothing");
        } else {
            debug!(
                record_id = %id,
                ledger = %rec.key(),
                quantity = rec.quantity,
                unit_price = rec.unit_price,
                "record revised"
            );
            uow.stage(rec.clone(), Change::Revised)?;
        }
        uow.schedule(FollowUp::Cascade(rec.id));
        if rec.feeds_inventory() {
            uow.schedule(FollowUp::Propagate(rec.id));
        }
        Ok(rec)
    }

    /// Revise the record a source event produced.
    pub fn update_by_source<S: LedgerStore + ?Sized>(
        &self,
        uow: &mut UnitOfWork<'_, S>,
        kind: LedgerKind,
        record_type: RecordType,
        source_id: SourceId,
        revision: &Revision,
    ) -> EngineResult<StockRecord> {
        let rec = IdempotencyGuard::locate(uow, kind, record_type, source_id)?;
        self.update(uow, rec.id, revision)
    }

    /// Drain the follow-up worklist: cascades and cross-ledger propagation.
    pub fn settle<S: LedgerStore + ?Sized>(&self, uow: &mut UnitOfWork<'_, S>, now: DateTime<Utc>) -> EngineResult<()> {
        let limit = self.config.max_follow_up_steps;
        let mut steps = 0usize;

        while let Some(step) = uow.next_follow_up() {
            steps += 1;
            if steps > limit {
                error!(limit, "follow-up limit exceeded; aborting write");
                return Err(StockError::stale_chain(format!("follow-up limit of {limit} steps exceeded")).into());
            }

            match step {
                FollowUp::Cascade(id) => {
                    CascadeRecomputer::new(self.config).recompute_forward(uow, id)?;
                }
                FollowUp::Propagate(id) => {
                    CrossLedgerPropagator::new(*self).propagate(uow, id, now)?;
                }
            }
        }

        debug!(steps, "follow-ups settled");
        Ok(())
    }
}
