//! Postgres-backed ledger store.
//!
//! Ordering and lookup columns are stored alongside a JSONB copy of the full
//! record. Uniqueness is enforced by the database:
//!
//! | Constraint | LedgerStoreError |
//! |------------|------------------|
//! | `stock_records_source_key` | `DuplicateSource` |
//! | `stock_records_position_key` | `PositionConflict` |
//! | anything else | `Backend` |

use std::sync::Arc;

use sqlx::{PgPool, Postgres, Row, Transaction};
use tracing::instrument;

use shelfwise_core::{ItemId, LocationId, RecordId, SourceId, TenantId};
use shelfwise_ledger::{LedgerKey, LedgerKind, LedgerPosition, RecordType, StockRecord};

use super::r#trait::LedgerStore;
use crate::error::LedgerStoreError;

/// DDL for the ledger table. Idempotent.
pub const SCHEMA: &str = r#"
CREATE SEQUENCE IF NOT EXISTS stock_record_insertion_seq;

CREATE TABLE IF NOT EXISTS stock_records (
    id                 UUID PRIMARY KEY,
    tenant_id          UUID        NOT NULL,
    ledger_kind        TEXT        NOT NULL,
    location_id        UUID        NOT NULL,
    item_id            UUID        NOT NULL,
    record_date        TIMESTAMPTZ NOT NULL,
    insertion_sequence BIGINT      NOT NULL,
    record_type        TEXT        NOT NULL,
    source_id          UUID,
    body               JSONB       NOT NULL,
    CONSTRAINT stock_records_position_key
        UNIQUE (tenant_id, ledger_kind, location_id, item_id, record_date, insertion_sequence)
);

CREATE UNIQUE INDEX IF NOT EXISTS stock_records_source_key
    ON stock_records (tenant_id, ledger_kind, record_type, source_id)
    WHERE source_id IS NOT NULL;

CREATE INDEX IF NOT EXISTS stock_records_item_idx
    ON stock_records (tenant_id, ledger_kind, item_id);
"#;

#[derive(Debug, Clone)]
pub struct PostgresLedgerStore {
    pool: Arc<PgPool>,
}

impl PostgresLedgerStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool: Arc::new(pool) }
    }

    /// Create the table, indexes and sequence if missing.
    pub async fn migrate(&self) -> Result<(), LedgerStoreError> {
        sqlx::raw_sql(SCHEMA)
            .execute(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("migrate", e, None))?;
        Ok(())
    }

    #[instrument(skip(self), fields(ledger = %key), err)]
    pub async fn load_ledger_async(&self, key: &LedgerKey) -> Result<Vec<StockRecord>, LedgerStoreError> {
        let rows = sqlx::query(
            r#"
            SELECT body FROM stock_records
            WHERE tenant_id = $1 AND ledger_kind = $2 AND location_id = $3 AND item_id = $4
            ORDER BY record_date ASC, insertion_sequence ASC
            "#,
        )
        .bind(key.tenant_id.as_uuid())
        .bind(key.kind.as_str())
        .bind(key.location_id.as_uuid())
        .bind(key.item_id.as_uuid())
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("load_ledger", e, None))?;

        rows.iter().map(decode_body).collect()
    }

    pub async fn get_async(&self, tenant_id: TenantId, id: RecordId) -> Result<Option<StockRecord>, LedgerStoreError> {
        let row = sqlx::query("SELECT body FROM stock_records WHERE tenant_id = $1 AND id = $2")
            .bind(tenant_id.as_uuid())
            .bind(id.as_uuid())
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("get", e, None))?;
        row.as_ref().map(decode_body).transpose()
    }

    pub async fn find_by_source_async(
        &self,
        tenant_id: TenantId,
        kind: LedgerKind,
        record_type: RecordType,
        source_id: SourceId,
    ) -> Result<Option<StockRecord>, LedgerStoreError> {
        let row = sqlx::query(
            r#"
            SELECT body FROM stock_records
            WHERE tenant_id = $1 AND ledger_kind = $2 AND record_type = $3 AND source_id = $4
            "#,
        )
        .bind(tenant_id.as_uuid())
        .bind(kind.as_str())
        .bind(record_type.as_str())
        .bind(source_id.as_uuid())
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("find_by_source", e, None))?;
        row.as_ref().map(decode_body).transpose()
    }

    pub async fn ledger_keys_async(
        &self,
        tenant_id: TenantId,
        kind: LedgerKind,
        item_id: ItemId,
    ) -> Result<Vec<LedgerKey>, LedgerStoreError> {
        let rows = sqlx::query(
            r#"
            SELECT DISTINCT location_id FROM stock_records
            WHERE tenant_id = $1 AND ledger_kind = $2 AND item_id = $3
            "#,
        )
        .bind(tenant_id.as_uuid())
        .bind(kind.as_str())
        .bind(item_id.as_uuid())
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("ledger_keys", e, None))?;

        let mut keys = Vec::with_capacity(rows.len());
        for row in rows {
            let location: uuid::Uuid = row
                .try_get("location_id")
                .map_err(|e| map_sqlx_error("ledger_keys", e, None))?;
            keys.push(LedgerKey::new(tenant_id, kind, LocationId::from_uuid(location), item_id));
        }
        keys.sort();
        Ok(keys)
    }

    pub async fn next_sequence_async(&self) -> Result<u64, LedgerStoreError> {
        let row = sqlx::query("SELECT nextval('stock_record_insertion_seq') AS seq")
            .fetch_one(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("next_sequence", e, None))?;
        let seq: i64 = row
            .try_get("seq")
            .map_err(|e| map_sqlx_error("next_sequence", e, None))?;
        Ok(seq as u64)
    }

    /// Write the batch in one transaction.
    #[instrument(skip(self, batch), fields(batch_len = batch.len()), err)]
    pub async fn commit_async(&self, batch: &[StockRecord]) -> Result<(), LedgerStoreError> {
        if batch.is_empty() {
            return Ok(());
        }

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin_transaction", e, None))?;

        for rec in batch {
            if let Some(existing) = load_for_update(&mut tx, rec).await? {
                if existing.key() != rec.key()
                    || existing.position() != rec.position()
                    || existing.record_type != rec.record_type
                    || existing.source_id() != rec.source_id()
                {
                    tx.rollback()
                        .await
                        .map_err(|e| map_sqlx_error("rollback", e, None))?;
                    return Err(LedgerStoreError::ImmutableField(rec.id));
                }
            }
            upsert(&mut tx, rec).await?;
        }

        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("commit_transaction", e, None))?;
        Ok(())
    }
}

async fn load_for_update(
    tx: &mut Transaction<'_, Postgres>,
    rec: &StockRecord,
) -> Result<Option<StockRecord>, LedgerStoreError> {
    let row = sqlx::query("SELECT body FROM stock_records WHERE tenant_id = $1 AND id = $2 FOR UPDATE")
        .bind(rec.tenant_id.as_uuid())
        .bind(rec.id.as_uuid())
        .fetch_optional(&mut **tx)
        .await
        .map_err(|e| map_sqlx_error("load_for_update", e, Some(rec)))?;
    row.as_ref().map(decode_body).transpose()
}

async fn upsert(tx: &mut Transaction<'_, Postgres>, rec: &StockRecord) -> Result<(), LedgerStoreError> {
    let body = serde_json::to_value(rec).map_err(|e| LedgerStoreError::Backend(format!("encode record {}: {e}", rec.id)))?;

    sqlx::query(
        r#"
        INSERT INTO stock_records (
            id, tenant_id, ledger_kind, location_id, item_id,
            record_date, insertion_sequence, record_type, source_id, body
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
        ON CONFLICT (id) DO UPDATE SET body = EXCLUDED.body
        "#,
    )
    .bind(rec.id.as_uuid())
    .bind(rec.tenant_id.as_uuid())
    .bind(rec.ledger_kind.as_str())
    .bind(rec.location_id.as_uuid())
    .bind(rec.item_id.as_uuid())
    .bind(rec.record_date)
    .bind(rec.insertion_sequence as i64)
    .bind(rec.record_type.as_str())
    .bind(rec.source_id().map(|s| *s.as_uuid()))
    .bind(body)
    .execute(&mut **tx)
    .await
    .map_err(|e| map_sqlx_error("upsert_record", e, Some(rec)))?;
    Ok(())
}

fn decode_body(row: &sqlx::postgres::PgRow) -> Result<StockRecord, LedgerStoreError> {
    let body: serde_json::Value = row
        .try_get("body")
        .map_err(|e| map_sqlx_error("decode_body", e, None))?;
    serde_json::from_value(body).map_err(|e| LedgerStoreError::Backend(format!("failed to decode record body: {e}")))
}

/// Map SQLx errors to `LedgerStoreError`, naming the offending record when known.
fn map_sqlx_error(operation: &str, err: sqlx::Error, rec: Option<&StockRecord>) -> LedgerStoreError {
    if let sqlx::Error::Database(db_err) = &err {
        if db_err.code().as_deref() == Some("23505") {
            if let Some(rec) = rec {
                match db_err.constraint() {
                    Some("stock_records_source_key") => {
                        if let Some(source_id) = rec.source_id() {
                            return LedgerStoreError::DuplicateSource {
                                ledger_kind: rec.ledger_kind,
                                record_type: rec.record_type,
                                source_id,
                            };
                        }
                    }
                    Some("stock_records_position_key") => return LedgerStoreError::PositionConflict(rec.id),
                    _ => {}
                }
            }
        }
        return LedgerStoreError::Backend(format!("database error in {operation}: {}", db_err.message()));
    }
    LedgerStoreError::Backend(format!("sqlx error in {operation}: {err}"))
}

/// Handle of the runtime the synchronous store traits block on.
pub(crate) fn runtime() -> Result<tokio::runtime::Handle, LedgerStoreError> {
    tokio::runtime::Handle::try_current()
        .map_err(|_| LedgerStoreError::Backend("postgres stores require a tokio runtime context".to_string()))
}

// The LedgerStore trait is synchronous; bridge onto the current runtime.
impl LedgerStore for PostgresLedgerStore {
    fn get(&self, tenant_id: TenantId, id: RecordId) -> Result<Option<StockRecord>, LedgerStoreError> {
        runtime()?.block_on(self.get_async(tenant_id, id))
    }

    fn load_ledger(&self, key: &LedgerKey) -> Result<Vec<StockRecord>, LedgerStoreError> {
        runtime()?.block_on(self.load_ledger_async(key))
    }

    fn find_by_source(
        &self,
        tenant_id: TenantId,
        kind: LedgerKind,
        record_type: RecordType,
        source_id: SourceId,
    ) -> Result<Option<StockRecord>, LedgerStoreError> {
        runtime()?.block_on(self.find_by_source_async(tenant_id, kind, record_type, source_id))
    }

    fn ledger_keys(
        &self,
        tenant_id: TenantId,
        kind: LedgerKind,
        item_id: ItemId,
    ) -> Result<Vec<LedgerKey>, LedgerStoreError> {
        runtime()?.block_on(self.ledger_keys_async(tenant_id, kind, item_id))
    }

    fn next_sequence(&self) -> Result<u64, LedgerStoreError> {
        runtime()?.block_on(self.next_sequence_async())
    }

    fn commit(&self, batch: &[StockRecord]) -> Result<(), LedgerStoreError> {
        runtime()?.block_on(self.commit_async(batch))
    }

    fn latest_before(
        &self,
        key: &LedgerKey,
        before: LedgerPosition,
        exclude: Option<RecordId>,
    ) -> Result<Option<StockRecord>, LedgerStoreError> {
        let exclude = exclude.map(|id| *id.as_uuid());
        runtime()?.block_on(async {
            let row = sqlx::query(
                r#"
                SELECT body FROM stock_records
                WHERE tenant_id = $1 AND ledger_kind = $2 AND location_id = $3 AND item_id = $4
                  AND (record_date, insertion_sequence) < ($5, $6)
                  AND ($7::uuid IS NULL OR id <> $7)
                ORDER BY record_date DESC, insertion_sequence DESC
                LIMIT 1
                "#,
            )
            .bind(key.tenant_id.as_uuid())
            .bind(key.kind.as_str())
            .bind(key.location_id.as_uuid())
            .bind(key.item_id.as_uuid())
            .bind(before.record_date)
            .bind(before.insertion_sequence as i64)
            .bind(exclude)
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("latest_before", e, None))?;
            row.as_ref().map(decode_body).transpose()
        })
    }

    fn all_after(
        &self,
        key: &LedgerKey,
        after: LedgerPosition,
        exclude: Option<RecordId>,
    ) -> Result<Vec<StockRecord>, LedgerStoreError> {
        let exclude = exclude.map(|id| *id.as_uuid());
        runtime()?.block_on(async {
            let rows = sqlx::query(
                r#"
                SELECT body FROM stock_records
                WHERE tenant_id = $1 AND ledger_kind = $2 AND location_id = $3 AND item_id = $4
                  AND (record_date, insertion_sequence) > ($5, $6)
                  AND ($7::uuid IS NULL OR id <> $7)
                ORDER BY record_date ASC, insertion_sequence ASC
                "#,
            )
            .bind(key.tenant_id.as_uuid())
            .bind(key.kind.as_str())
            .bind(key.location_id.as_uuid())
            .bind(key.item_id.as_uuid())
            .bind(after.record_date)
            .bind(after.insertion_sequence as i64)
            .bind(exclude)
            .fetch_all(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("all_after", e, None))?;
            rows.iter().map(decode_body).collect()
        })
    }
}
