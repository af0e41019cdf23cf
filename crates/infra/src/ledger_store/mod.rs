//! Ordered, tenant-scoped storage of ledger records.
//!
//! Records of one (tenant, ledger kind, location, item) form a ledger, totally
//! ordered by `(record_date, insertion_sequence)`. Stores enforce the unique
//! source index and the immutability of a record's identity fields; only
//! balances and revisions change after the first write.

pub mod in_memory;
#[cfg(feature = "postgres")]
pub mod postgres;
pub mod r#trait;

pub use in_memory::InMemoryLedgerStore;
#[cfg(feature = "postgres")]
pub use postgres::PostgresLedgerStore;
pub use r#trait::LedgerStore;
