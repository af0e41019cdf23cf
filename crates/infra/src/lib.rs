//! Infrastructure layer: ledger storage, transactional writes, catalog
//! projection and configuration.

pub mod cascade;
pub mod config;
pub mod engine;
pub mod error;
pub mod idempotency;
pub mod ledger_store;
pub mod locks;
pub mod projector;
pub mod propagator;
pub mod read_model;
pub mod unit_of_work;
pub mod writer;


pub use cascade::CascadeRecomputer;
pub use config::{ConfigError, EngineConfig, InventoryType, LocationKind};
pub use engine::{StockEngine, StockEnvelope, WriteOutcome};
pub use error::{EngineError, EngineResult, LedgerStoreError};
pub use idempotency::IdempotencyGuard;
pub use ledger_store::{InMemoryLedgerStore, LedgerStore};
#[cfg(feature = "postgres")]
pub use ledger_store::PostgresLedgerStore;
pub use locks::{KeyLease, KeyLocks};
pub use projector::CatalogProjector;
pub use propagator::CrossLedgerPropagator;
pub use read_model::{AuditLogStore, InMemoryAuditLogStore, InMemoryTenantStore, TenantStore};
#[cfg(feature = "postgres")]
pub use read_model::{PostgresAuditLogStore, PostgresCatalogStore};
pub use unit_of_work::{Change, Committed, FollowUp, UnitOfWork};
pub use writer::RecordWriter;
