use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use shelfwise_core::{AuditId, CatalogItemId, ItemId, RecordId, TenantId};
use shelfwise_events::Event;

use crate::audit::CatalogAuditLog;
use crate::item::{CatalogItem, Pricing};

/// Event: an item entered the catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemMerchandised {
    pub tenant_id: TenantId,
    pub catalog_item_id: CatalogItemId,
    pub item_ref: ItemId,
    pub pricing: Pricing,
    pub quantity: i64,
    pub occurred_at: DateTime<Utc>,
}

/// Event: an audit row changed the projected quantity or price.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuantityAdjusted {
    pub tenant_id: TenantId,
    pub catalog_item_id: CatalogItemId,
    pub audit_id: AuditId,
    pub source_record_id: Option<RecordId>,
    pub quantity_recorded: i64,
    pub quantity_after: i64,
    pub price_after: i64,
    pub occurred_at: DateTime<Utc>,
}

/// Event: discount or threshold changed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemRepriced {
    pub tenant_id: TenantId,
    pub catalog_item_id: CatalogItemId,
    pub pricing: Pricing,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum CatalogEvent {
    ItemMerchandised(ItemMerchandised),
    QuantityAdjusted(QuantityAdjusted),
    ItemRepriced(ItemRepriced),
}

impl CatalogEvent {
    pub fn merchandised(item: &CatalogItem) -> Self {
        CatalogEvent::ItemMerchandised(ItemMerchandised {
            tenant_id: item.tenant_id(),
            catalog_item_id: item.id_typed(),
            item_ref: item.item_ref(),
            pricing: item.pricing(),
            quantity: item.quantity(),
            occurred_at: item.created_at(),
        })
    }

    pub fn adjusted(row: &CatalogAuditLog) -> Self {
        CatalogEvent::QuantityAdjusted(QuantityAdjusted {
            tenant_id: row.tenant_id,
            catalog_item_id: row.catalog_item_id,
            audit_id: row.id,
            source_record_id: row.source_record_id,
            quantity_recorded: row.quantity_recorded,
            quantity_after: row.quantity_after,
            price_after: row.price_after,
            occurred_at: row.created_at,
        })
    }

    pub fn repriced(item: &CatalogItem) -> Self {
        CatalogEvent::ItemRepriced(ItemRepriced {
            tenant_id: item.tenant_id(),
            catalog_item_id: item.id_typed(),
            pricing: item.pricing(),
            occurred_at: item.updated_at(),
        })
    }

    pub fn tenant_id(&self) -> TenantId {
        match self {
            CatalogEvent::ItemMerchandised(e) => e.tenant_id,
            CatalogEvent::QuantityAdjusted(e) => e.tenant_id,
            CatalogEvent::ItemRepriced(e) => e.tenant_id,
        }
    }

    pub fn catalog_item_id(&self) -> CatalogItemId {
        match self {
            CatalogEvent::ItemMerchandised(e) => e.catalog_item_id,
            CatalogEvent::QuantityAdjusted(e) => e.catalog_item_id,
            CatalogEvent::ItemRepriced(e) => e.catalog_item_id,
        }
    }
}

impl Event for CatalogEvent {
    fn event_type(&self) -> &'static str {
        match self {
            CatalogEvent::ItemMerchandised(_) => "catalog.item.merchandised",
            CatalogEvent::QuantityAdjusted(_) => "catalog.item.quantity_adjusted",
            CatalogEvent::ItemRepriced(_) => "catalog.item.repriced",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            CatalogEvent::ItemMerchandised(e) => e.occurred_at,
            CatalogEvent::QuantityAdjusted(e) => e.occurred_at,
            CatalogEvent::ItemRepriced(e) => e.occurred_at,
        }
    }
}
