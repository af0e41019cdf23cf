//! Stock ledger domain (pure).
//!
//! Business rules for the warehouse and inventory ledgers: record shapes,
//! running-balance arithmetic, receipt-price reuse for removals and chain
//! verification. No IO, no storage, no locking.

pub mod balance;
pub mod chain;
pub mod error;
pub mod event;
pub mod record;

pub use balance::{Balance, latest_receipt_price};
pub use chain::verify_chain;
pub use error::{StockError, StockResult};
pub use event::{BalanceRecomputed, RecordPosted, RecordRevised, StockEvent};
pub use record::{
    LedgerKey, LedgerKind, LedgerPosition, NewRecord, PriceSource, RecordType, RemovalReason,
    Revision, SourceKind, StockRecord, TransferSplit,
};
