//! Append-only audit trail of the catalog projection.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use shelfwise_core::{AuditId, CatalogItemId, DomainError, DomainResult, Entity, RecordId, TenantId};

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditType {
    /// First row ever written for a catalog item.
    Create,
    Update,
}

/// One change applied to a catalog item's projected quantity or price.
///
/// Rows are additive: summing `quantity_recorded` over an item's rows gives
/// its current quantity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogAuditLog {
    pub id: AuditId,
    pub tenant_id: TenantId,
    pub catalog_item_id: CatalogItemId,
    /// Ledger record behind the change; `None` for creation and reconciliation rows.
    pub source_record_id: Option<RecordId>,
    pub audit_type: AuditType,
    pub quantity_before: i64,
    pub quantity_recorded: i64,
    pub quantity_after: i64,
    /// Signed contribution of the source record as of this row.
    pub source_quantity: Option<i64>,
    pub price_before: i64,
    /// Unit price of the source record as of this row.
    pub price_recorded: Option<i64>,
    pub price_after: i64,
    pub created_at: DateTime<Utc>,
}

impl Entity for CatalogAuditLog {
    type Id = AuditId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}

/// What a sync should write for one ledger record.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum AuditPlan {
    /// The latest row for the record already matches it.
    Unchanged,
    Append {
        audit_type: AuditType,
        quantity_recorded: i64,
    },
}

/// Decide the audit row for a record currently contributing `signed_quantity`
/// at `unit_price`.
///
/// `prior` is the latest row already written for the same record. A new row
/// carries only the difference from that row, so a record's rows always sum
/// to its current contribution.
pub fn plan_audit(
    prior: Option<&CatalogAuditLog>,
    first_for_item: bool,
    signed_quantity: i64,
    unit_price: i64,
) -> DomainResult<AuditPlan> {
    let audit_type = if first_for_item {
        AuditType::Create
    } else {
        AuditType::Update
    };

    let recorded = match prior {
        None => 0,
        Some(row) => {
            let recorded = row.source_quantity.unwrap_or(0);
            if recorded == signed_quantity && row.price_recorded == Some(unit_price) {
                return Ok(AuditPlan::Unchanged);
            }
            recorded
        }
    };
    let quantity_recorded = signed_quantity
        .checked_sub(recorded)
        .ok_or_else(|| DomainError::validation("audited quantity change overflows"))?;
    Ok(AuditPlan::Append {
        audit_type,
        quantity_recorded,
    })
}

/// Quantity implied by a set of audit rows.
pub fn reconstruct_quantity<'a>(rows: impl IntoIterator<Item = &'a CatalogAuditLog>) -> DomainResult<i64> {
    rows.into_iter()
        .try_fold(0i64, |sum, r| sum.checked_add(r.quantity_recorded))
        .ok_or_else(|| DomainError::validation("audited quantity overflows"))
}
