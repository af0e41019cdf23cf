use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use shelfwise_catalog::CatalogAuditLog;
use shelfwise_core::{CatalogItemId, RecordId, TenantId};

use crate::error::LedgerStoreError;

/// Append-only audit rows of the catalog projection.
pub trait AuditLogStore: Send + Sync {
    fn append(&self, row: CatalogAuditLog) -> Result<(), LedgerStoreError>;

    /// Every row of one catalog item, in append order.
    fn for_item(&self, tenant_id: TenantId, catalog_item_id: CatalogItemId) -> Result<Vec<CatalogAuditLog>, LedgerStoreError>;

    /// Latest row attributed to `record_id`.
    fn latest_for_source(
        &self,
        tenant_id: TenantId,
        catalog_item_id: CatalogItemId,
        record_id: RecordId,
    ) -> Result<Option<CatalogAuditLog>, LedgerStoreError> {
        Ok(self
            .for_item(tenant_id, catalog_item_id)?
            .into_iter()
            .rev()
            .find(|r| r.source_record_id == Some(record_id)))
    }
}

impl<S> AuditLogStore for Arc<S>
where
    S: AuditLogStore + ?Sized,
{
    fn append(&self, row: CatalogAuditLog) -> Result<(), LedgerStoreError> {
        (**self).append(row)
    }

    fn for_item(&self, tenant_id: TenantId, catalog_item_id: CatalogItemId) -> Result<Vec<CatalogAuditLog>, LedgerStoreError> {
        (**self).for_item(tenant_id, catalog_item_id)
    }

    fn latest_for_source(
        &self,
        tenant_id: TenantId,
        catalog_item_id: CatalogItemId,
        record_id: RecordId,
    ) -> Result<Option<CatalogAuditLog>, LedgerStoreError> {
        (**self).latest_for_source(tenant_id, catalog_item_id, record_id)
    }
}

#[derive(Debug, Default)]
pub struct InMemoryAuditLogStore {
    rows: RwLock<HashMap<(TenantId, CatalogItemId), Vec<CatalogAuditLog>>>,
}

impl InMemoryAuditLogStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl AuditLogStore for InMemoryAuditLogStore {
    fn append(&self, row: CatalogAuditLog) -> Result<(), LedgerStoreError> {
        let mut rows = self
            .rows
            .write()
            .map_err(|_| LedgerStoreError::Poisoned("audit log"))?;
        rows.entry((row.tenant_id, row.catalog_item_id)).or_default().push(row);
        Ok(())
    }

    fn for_item(&self, tenant_id: TenantId, catalog_item_id: CatalogItemId) -> Result<Vec<CatalogAuditLog>, LedgerStoreError> {
        let rows = self
            .rows
            .read()
            .map_err(|_| LedgerStoreError::Poisoned("audit log"))?;
        Ok(rows.get(&(tenant_id, catalog_item_id)).cloned().unwrap_or_default())
    }
}
