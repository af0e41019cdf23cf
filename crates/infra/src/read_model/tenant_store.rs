use std::collections::HashMap;
use std::hash::Hash;
use std::sync::{Arc, RwLock};

use shelfwise_core::TenantId;

use crate::error::LedgerStoreError;

/// Tenant-isolated key/value store for projected entities.
///
/// Catalog items are stored under their item reference, so the projector can
/// find an item's entry from any ledger record.
pub trait TenantStore<K, V>: Send + Sync {
    fn get(&self, tenant_id: TenantId, key: &K) -> Result<Option<V>, LedgerStoreError>;
    fn upsert(&self, tenant_id: TenantId, key: K, value: V) -> Result<(), LedgerStoreError>;
    fn list(&self, tenant_id: TenantId) -> Result<Vec<V>, LedgerStoreError>;
}

impl<K, V, S> TenantStore<K, V> for Arc<S>
where
    S: TenantStore<K, V> + ?Sized,
{
    fn get(&self, tenant_id: TenantId, key: &K) -> Result<Option<V>, LedgerStoreError> {
        (**self).get(tenant_id, key)
    }

    fn upsert(&self, tenant_id: TenantId, key: K, value: V) -> Result<(), LedgerStoreError> {
        (**self).upsert(tenant_id, key, value)
    }

    fn list(&self, tenant_id: TenantId) -> Result<Vec<V>, LedgerStoreError> {
        (**self).list(tenant_id)
    }
}

/// In-memory tenant-isolated store for tests/dev.
#[derive(Debug)]
pub struct InMemoryTenantStore<K, V> {
    inner: RwLock<HashMap<(TenantId, K), V>>,
}

impl<K, V> InMemoryTenantStore<K, V> {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(HashMap::new()),
        }
    }
}

impl<K, V> Default for InMemoryTenantStore<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V> TenantStore<K, V> for InMemoryTenantStore<K, V>
where
    K: Clone + Eq + Hash + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    fn get(&self, tenant_id: TenantId, key: &K) -> Result<Option<V>, LedgerStoreError> {
        let map = self
            .inner
            .read()
            .map_err(|_| LedgerStoreError::Poisoned("tenant store"))?;
        Ok(map.get(&(tenant_id, key.clone())).cloned())
    }

    fn upsert(&self, tenant_id: TenantId, key: K, value: V) -> Result<(), LedgerStoreError> {
        let mut map = self
            .inner
            .write()
            .map_err(|_| LedgerStoreError::Poisoned("tenant store"))?;
        map.insert((tenant_id, key), value);
        Ok(())
    }

    fn list(&self, tenant_id: TenantId) -> Result<Vec<V>, LedgerStoreError> {
        let map = self
            .inner
            .read()
            .map_err(|_| LedgerStoreError::Poisoned("tenant store"))?;
        Ok(map
            .iter()
            .filter(|((t, _), _)| *t == tenant_id)
            .map(|(_, v)| v.clone())
            .collect())
    }
}
