//! Postgres-backed catalog projection.
//!
//! Catalog items are keyed by `(tenant_id, item_ref)`, mirroring
//! `InMemoryTenantStore`. Audit rows are append-only and read back in insertion
//! order through a `BIGSERIAL` column, so reconstruction does not depend on
//! clock resolution.
//!
//! Every query carries `tenant_id`, so one tenant can never read another's
//! projection.

use std::sync::Arc;

use sqlx::{PgPool, Row};
use tracing::instrument;

use shelfwise_catalog::{CatalogAuditLog, CatalogItem};
use shelfwise_core::{CatalogItemId, ItemId, RecordId, TenantId};

use super::{AuditLogStore, TenantStore};
use crate::error::LedgerStoreError;
use crate::ledger_store::postgres::runtime;

/// DDL for the catalog tables. Idempotent.
pub const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS catalog_items (
    tenant_id       UUID        NOT NULL,
    item_ref        UUID        NOT NULL,
    catalog_item_id UUID        NOT NULL,
    quantity        BIGINT      NOT NULL,
    updated_at      TIMESTAMPTZ NOT NULL,
    body            JSONB       NOT NULL,
    PRIMARY KEY (tenant_id, item_ref),
    CONSTRAINT catalog_items_catalog_item_key UNIQUE (tenant_id, catalog_item_id)
);

CREATE TABLE IF NOT EXISTS catalog_audit_log (
    id                UUID PRIMARY KEY,
    seq               BIGSERIAL   NOT NULL,
    tenant_id         UUID        NOT NULL,
    catalog_item_id   UUID        NOT NULL,
    source_record_id  UUID,
    quantity_recorded BIGINT      NOT NULL,
    created_at        TIMESTAMPTZ NOT NULL,
    body              JSONB       NOT NULL
);

CREATE INDEX IF NOT EXISTS catalog_audit_log_item_idx
    ON catalog_audit_log (tenant_id, catalog_item_id, created_at);

CREATE INDEX IF NOT EXISTS catalog_audit_log_source_idx
    ON catalog_audit_log (tenant_id, source_record_id)
    WHERE source_record_id IS NOT NULL;
"#;

async fn migrate(pool: &PgPool) -> Result<(), LedgerStoreError> {
    sqlx::raw_sql(SCHEMA)
        .execute(pool)
        .await
        .map_err(|e| map_sqlx_error("migrate_catalog", e))?;
    Ok(())
}

/// Catalog items, one row per merchandised item.
#[derive(Debug, Clone)]
pub struct PostgresCatalogStore {
    pool: Arc<PgPool>,
}

impl PostgresCatalogStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool: Arc::new(pool) }
    }

    /// Create the catalog tables and indexes if missing.
    pub async fn migrate(&self) -> Result<(), LedgerStoreError> {
        migrate(&self.pool).await
    }

    pub async fn get_async(&self, tenant_id: TenantId, item_ref: ItemId) -> Result<Option<CatalogItem>, LedgerStoreError> {
        let row = sqlx::query("SELECT body FROM catalog_items WHERE tenant_id = $1 AND item_ref = $2")
            .bind(tenant_id.as_uuid())
            .bind(item_ref.as_uuid())
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("get_catalog_item", e))?;
        row.as_ref().map(decode_body).transpose()
    }

    #[instrument(skip(self, item), fields(tenant_id = %tenant_id, item_id = %item_ref), err)]
    pub async fn upsert_async(
        &self,
        tenant_id: TenantId,
        item_ref: ItemId,
        item: &CatalogItem,
    ) -> Result<(), LedgerStoreError> {
        if item.tenant_id() != tenant_id || item.item_ref() != item_ref {
            return Err(LedgerStoreError::Backend(format!(
                "catalog item {} is stored under another tenant or item",
                item.id_typed()
            )));
        }
        let body = encode_body(item)?;

        sqlx::query(
            r#"
            INSERT INTO catalog_items (tenant_id, item_ref, catalog_item_id, quantity, updated_at, body)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (tenant_id, item_ref) DO UPDATE
            SET quantity = EXCLUDED.quantity,
                updated_at = EXCLUDED.updated_at,
                body = EXCLUDED.body
            "#,
        )
        .bind(tenant_id.as_uuid())
        .bind(item_ref.as_uuid())
        .bind(item.id_typed().as_uuid())
        .bind(item.quantity())
        .bind(item.updated_at())
        .bind(body)
        .execute(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("upsert_catalog_item", e))?;
        Ok(())
    }

    pub async fn list_async(&self, tenant_id: TenantId) -> Result<Vec<CatalogItem>, LedgerStoreError> {
        let rows = sqlx::query("SELECT body FROM catalog_items WHERE tenant_id = $1 ORDER BY item_ref")
            .bind(tenant_id.as_uuid())
            .fetch_all(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("list_catalog_items", e))?;
        rows.iter().map(decode_body).collect()
    }
}

impl TenantStore<ItemId, CatalogItem> for PostgresCatalogStore {
    fn get(&self, tenant_id: TenantId, key: &ItemId) -> Result<Option<CatalogItem>, LedgerStoreError> {
        runtime()?.block_on(self.get_async(tenant_id, *key))
    }

    fn upsert(&self, tenant_id: TenantId, key: ItemId, value: CatalogItem) -> Result<(), LedgerStoreError> {
        runtime()?.block_on(self.upsert_async(tenant_id, key, &value))
    }

    fn list(&self, tenant_id: TenantId) -> Result<Vec<CatalogItem>, LedgerStoreError> {
        runtime()?.block_on(self.list_async(tenant_id))
    }
}

/// Append-only audit rows of the catalog projection.
#[derive(Debug, Clone)]
pub struct PostgresAuditLogStore {
    pool: Arc<PgPool>,
}

impl PostgresAuditLogStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool: Arc::new(pool) }
    }

    /// Create the catalog tables and indexes if missing.
    pub async fn migrate(&self) -> Result<(), LedgerStoreError> {
        migrate(&self.pool).await
    }

    #[instrument(skip(self, row), fields(catalog_item_id = %row.catalog_item_id, audit_id = %row.id), err)]
    pub async fn append_async(&self, row: &CatalogAuditLog) -> Result<(), LedgerStoreError> {
        let body = encode_body(row)?;
        sqlx::query(
            r#"
            INSERT INTO catalog_audit_log (
                id, tenant_id, catalog_item_id, source_record_id, quantity_recorded, created_at, body
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(row.id.as_uuid())
        .bind(row.tenant_id.as_uuid())
        .bind(row.catalog_item_id.as_uuid())
        .bind(row.source_record_id.map(|id| *id.as_uuid()))
        .bind(row.quantity_recorded)
        .bind(row.created_at)
        .bind(body)
        .execute(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("append_audit_row", e))?;
        Ok(())
    }

    pub async fn for_item_async(
        &self,
        tenant_id: TenantId,
        catalog_item_id: CatalogItemId,
    ) -> Result<Vec<CatalogAuditLog>, LedgerStoreError> {
        let rows = sqlx::query(
            r#"
            SELECT body FROM catalog_audit_log
            WHERE tenant_id = $1 AND catalog_item_id = $2
            ORDER BY seq ASC
            "#,
        )
        .bind(tenant_id.as_uuid())
        .bind(catalog_item_id.as_uuid())
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("audit_rows_for_item", e))?;
        rows.iter().map(decode_body).collect()
    }

    pub async fn latest_for_source_async(
        &self,
        tenant_id: TenantId,
        catalog_item_id: CatalogItemId,
        record_id: RecordId,
    ) -> Result<Option<CatalogAuditLog>, LedgerStoreError> {
        let row = sqlx::query(
            r#"
            SELECT body FROM catalog_audit_log
            WHERE tenant_id = $1 AND source_record_id = $2 AND catalog_item_id = $3
            ORDER BY seq DESC
            LIMIT 1
            "#,
        )
        .bind(tenant_id.as_uuid())
        .bind(record_id.as_uuid())
        .bind(catalog_item_id.as_uuid())
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("latest_audit_row_for_source", e))?;
        row.as_ref().map(decode_body).transpose()
    }
}

impl AuditLogStore for PostgresAuditLogStore {
    fn append(&self, row: CatalogAuditLog) -> Result<(), LedgerStoreError> {
        runtime()?.block_on(self.append_async(&row))
    }

    fn for_item(&self, tenant_id: TenantId, catalog_item_id: CatalogItemId) -> Result<Vec<CatalogAuditLog>, LedgerStoreError> {
        runtime()?.block_on(self.for_item_async(tenant_id, catalog_item_id))
    }

    fn latest_for_source(
        &self,
        tenant_id: TenantId,
        catalog_item_id: CatalogItemId,
        record_id: RecordId,
    ) -> Result<Option<CatalogAuditLog>, LedgerStoreError> {
        runtime()?.block_on(self.latest_for_source_async(tenant_id, catalog_item_id, record_id))
    }
}

fn encode_body<T: serde::Serialize>(value: &T) -> Result<serde_json::Value, LedgerStoreError> {
    serde_json::to_value(value).map_err(|e| LedgerStoreError::Backend(format!("failed to encode catalog body: {e}")))
}

fn decode_body<T: serde::de::DeserializeOwned>(row: &sqlx::postgres::PgRow) -> Result<T, LedgerStoreError> {
    let body: serde_json::Value = row
        .try_get("body")
        .map_err(|e| map_sqlx_error("decode_catalog_body", e))?;
    serde_json::from_value(body).map_err(|e| LedgerStoreError::Backend(format!("failed to decode catalog body: {e}")))
}

fn map_sqlx_error(operation: &str, err: sqlx::Error) -> LedgerStoreError {
    match &err {
        sqlx::Error::Database(db_err) => {
            LedgerStoreError::Backend(format!("database error in {operation}: {}", db_err.message()))
        }
        _ => LedgerStoreError::Backend(format!("sqlx error in {operation}: {err}")),
    }
}
