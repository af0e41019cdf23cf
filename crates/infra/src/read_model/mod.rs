//! Tenant-isolated storage for the catalog projection.
//!
//! Catalog items and their audit rows are derived data: the inventory
//! ledger stays the source of truth and `CatalogProjector::resync_item`
//! can always catch a projection up.

pub mod audit_log;
#[cfg(feature = "postgres")]
pub mod postgres;
pub mod tenant_store;

pub use audit_log::{AuditLogStore, InMemoryAuditLogStore};
#[cfg(feature = "postgres")]
pub use postgres::{PostgresAuditLogStore, PostgresCatalogStore};
pub use tenant_store::{InMemoryTenantStore, TenantStore};
