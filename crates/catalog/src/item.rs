use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use shelfwise_core::{AuditId, CatalogItemId, DomainError, DomainResult, Entity, ItemId, RecordId, TenantId};

use crate::audit::{AuditType, CatalogAuditLog};

/// Merchandising prices in the smallest currency unit (e.g. cents).
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pricing {
    pub marked_price: i64,
    pub discount_amount: i64,
    /// Lowest price a cashier may sell at.
    pub threshold_price: i64,
}

impl Pricing {
    pub fn new(marked_price: i64, discount_amount: i64, threshold_price: i64) -> DomainResult<Self> {
        let pricing = Self {
            marked_price,
            discount_amount,
            threshold_price,
        };
        pricing.validate()?;
        Ok(pricing)
    }

    /// Marked price with no discount and no floor.
    pub fn marked(marked_price: i64) -> Self {
        Self {
            marked_price,
            discount_amount: 0,
            threshold_price: 0,
        }
    }

    pub fn selling_price(&self) -> i64 {
        self.marked_price - self.discount_amount
    }

    pub fn validate(&self) -> DomainResult<()> {
        if self.marked_price < 0 || self.discount_amount < 0 || self.threshold_price < 0 {
            return Err(DomainError::validation("prices cannot be negative"));
        }
        if self.discount_amount > self.marked_price {
            return Err(DomainError::validation(format!(
                "discount {} exceeds marked price {}",
                self.discount_amount, self.marked_price
            )));
        }
        if self.threshold_price > self.selling_price() {
            return Err(DomainError::validation(format!(
                "threshold price {} exceeds selling price {}",
                self.threshold_price,
                self.selling_price()
            )));
        }
        Ok(())
    }
}

/// Projection of one item's AVAILABLE inventory, as shown to merchandising
/// and checkout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogItem {
    id: CatalogItemId,
    tenant_id: TenantId,
    item_ref: ItemId,
    pricing: Pricing,
    quantity: i64,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl Entity for CatalogItem {
    type Id = CatalogItemId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}

impl CatalogItem {
    /// New entry with zero quantity; stock is adopted through audited rows.
    pub fn new(
        id: CatalogItemId,
        tenant_id: TenantId,
        item_ref: ItemId,
        pricing: Pricing,
        now: DateTime<Utc>,
    ) -> DomainResult<Self> {
        pricing.validate()?;
        Ok(Self {
            id,
            tenant_id,
            item_ref,
            pricing,
            quantity: 0,
            created_at: now,
            updated_at: now,
        })
    }

    pub fn id_typed(&self) -> CatalogItemId {
        self.id
    }

    pub fn tenant_id(&self) -> TenantId {
        self.tenant_id
    }

    pub fn item_ref(&self) -> ItemId {
        self.item_ref
    }

    pub fn quantity(&self) -> i64 {
        self.quantity
    }

    pub fn pricing(&self) -> Pricing {
        self.pricing
    }

    pub fn marked_price(&self) -> i64 {
        self.pricing.marked_price
    }

    pub fn discount_amount(&self) -> i64 {
        self.pricing.discount_amount
    }

    pub fn selling_price(&self) -> i64 {
        self.pricing.selling_price()
    }

    pub fn threshold_price(&self) -> i64 {
        self.pricing.threshold_price
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    /// Adopt a newly discovered receipt price, keeping discount and threshold.
    ///
    /// Leaves the item untouched when the new price would break a pricing rule.
    pub fn refresh_marked_price(&mut self, marked_price: i64, now: DateTime<Utc>) -> DomainResult<()> {
        let next = Pricing {
            marked_price,
            ..self.pricing
        };
        next.validate()?;
        if next != self.pricing {
            self.pricing = next;
            self.updated_at = now;
        }
        Ok(())
    }

    pub fn reprice(&mut self, discount_amount: i64, threshold_price: i64, now: DateTime<Utc>) -> DomainResult<()> {
        let next = Pricing {
            discount_amount,
            threshold_price,
            ..self.pricing
        };
        next.validate()?;
        self.pricing = next;
        self.updated_at = now;
        Ok(())
    }

    /// Apply an audited quantity change and return the row describing it.
    ///
    /// `price_before` is the marked price before any refresh made for the same
    /// ledger record.
    #[allow(clippy::too_many_arguments)]
    pub fn apply_audit(
        &mut self,
        audit_id: AuditId,
        audit_type: AuditType,
        source_record_id: Option<RecordId>,
        quantity_recorded: i64,
        source_quantity: Option<i64>,
        price_before: i64,
        price_recorded: Option<i64>,
        now: DateTime<Utc>,
    ) -> DomainResult<CatalogAuditLog> {
        let quantity_before = self.quantity;
        self.quantity = quantity_before
            .checked_add(quantity_recorded)
            .ok_or_else(|| DomainError::validation(format!("catalog quantity of item {} overflows", self.item_ref)))?;
        self.updated_at = now;

        Ok(CatalogAuditLog {
            id: audit_id,
            tenant_id: self.tenant_id,
            catalog_item_id: self.id,
            source_record_id,
            audit_type,
            quantity_before,
            quantity_recorded,
            quantity_after: self.quantity,
            source_quantity,
            price_before,
            price_recorded,
            price_after: self.pricing.marked_price,
            created_at: now,
        })
    }

    /// Reset the projected quantity to what the audit trail sums to.
    ///
    /// Returns whether anything changed.
    pub fn restore_quantity(&mut self, audited: i64, now: DateTime<Utc>) -> bool {
        if self.quantity == audited {
            return false;
        }
        self.quantity = audited;
        self.updated_at = now;
        true
    }
}
