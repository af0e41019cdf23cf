//! Ledger error model.

use thiserror::Error;

use shelfwise_core::{DomainError, ItemId, RecordId, SourceId};

use crate::record::{LedgerKind, RecordType, RemovalReason};

pub type StockResult<T> = Result<T, StockError>;

/// Failures of a ledger write or a catalog sync.
///
/// Everything except `NotProjected` aborts the enclosing business event.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StockError {
    /// Malformed request; nothing was persisted.
    #[error("validation failed: {0}")]
    Validation(String),

    /// The source event was already materialized in this ledger; use Update.
    #[error("source {source_id} already recorded as {ledger_kind} {record_type}")]
    DuplicateSource {
        ledger_kind: LedgerKind,
        record_type: RecordType,
        source_id: SourceId,
    },

    /// A removal would drive stock negative under a non-negative policy.
    #[error("insufficient stock for {reason} removal {record_id}: {available} available, {requested} requested")]
    InsufficientStock {
        record_id: RecordId,
        reason: RemovalReason,
        available: i64,
        requested: i64,
    },

    /// No catalog entry exists yet for the item. Non-fatal.
    #[error("item {item_id} is not merchandised")]
    NotProjected { item_id: ItemId },

    /// Ledger ordering could not be established; invariant violation.
    #[error("stale chain: {0}")]
    StaleChain(String),

    #[error("record not found: {0}")]
    NotFound(RecordId),
}

impl StockError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn stale_chain(msg: impl Into<String>) -> Self {
        Self::StaleChain(msg.into())
    }
}

impl From<DomainError> for StockError {
    fn from(value: DomainError) -> Self {
        match value {
            DomainError::Validation(msg)
            | DomainError::InvalidId(msg)
            | DomainError::Conflict(msg) => StockError::Validation(msg),
            DomainError::InvariantViolation(msg) => StockError::StaleChain(msg),
            DomainError::NotFound => StockError::Validation("referenced entity not found".to_string()),
        }
    }
}
