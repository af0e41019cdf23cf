//! Catalog projection domain (pure).
//!
//! The catalog is a read-optimized view of the inventory ledger: quantity and
//! price per merchandised item, plus an append-only audit trail whose rows sum
//! to the projected quantity.

pub mod audit;
pub mod event;
pub mod item;

pub use audit::{AuditPlan, AuditType, CatalogAuditLog, plan_audit, reconstruct_quantity};
pub use event::{CatalogEvent, ItemMerchandised, ItemRepriced, QuantityAdjusted};
pub use item::{CatalogItem, Pricing};
