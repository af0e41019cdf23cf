//! Infrastructure error model and its mapping onto ledger errors.

use thiserror::Error;

use shelfwise_core::{RecordId, SourceId};
use shelfwise_ledger::{LedgerKind, RecordType, StockError};

/// Storage-level failure.
///
/// These are **infrastructure errors** (locks, constraints, backends) as
/// opposed to domain errors (validation, policies).
#[derive(Debug, Error)]
pub enum LedgerStoreError {
    /// Unique index on (ledger_kind, record_type, source_id) rejected a write.
    #[error("unique source constraint violated: {ledger_kind} {record_type} {source_id}")]
    DuplicateSource {
        ledger_kind: LedgerKind,
        record_type: RecordType,
        source_id: SourceId,
    },

    /// Two records claimed the same (record_date, insertion_sequence).
    #[error("position conflict for record {0}")]
    PositionConflict(RecordId),

    /// A record changed ledger, date or sequence after it was first written.
    #[error("immutable field changed on record {0}")]
    ImmutableField(RecordId),

    #[error("lock poisoned: {0}")]
    Poisoned(&'static str),

    #[error("storage backend failure: {0}")]
    Backend(String),
}

/// Error returned by engine operations.
///
/// Wraps ledger-level failures (which abort the business event) and storage
/// failures; `From` impls let `?` flow through every layer.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Stock(#[from] StockError),

    #[error(transparent)]
    Store(LedgerStoreError),
}

impl EngineError {
    /// The ledger-level error, if this is one.
    pub fn as_stock(&self) -> Option<&StockError> {
        match self {
            EngineError::Stock(e) => Some(e),
            EngineError::Store(_) => None,
        }
    }
}

impl From<LedgerStoreError> for EngineError {
    fn from(value: LedgerStoreError) -> Self {
        match value {
            LedgerStoreError::DuplicateSource {
                ledger_kind,
                record_type,
                source_id,
            } => EngineError::Stock(StockError::DuplicateSource {
                ledger_kind,
                record_type,
                source_id,
            }),
            LedgerStoreError::PositionConflict(id) => {
                EngineError::Stock(StockError::stale_chain(format!("position conflict for record {id}")))
            }
            other => EngineError::Store(other),
        }
    }
}

impl From<shelfwise_core::DomainError> for EngineError {
    fn from(value: shelfwise_core::DomainError) -> Self {
        EngineError::Stock(value.into())
    }
}

pub type EngineResult<T> = Result<T, EngineError>;
