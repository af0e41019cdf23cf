//! Engine configuration.
//!
//! Which locations are AVAILABLE inventory, where warehouse removals land by
//! default and which removal reasons may drive stock negative are explicit
//! parameters handed to the engine, never process-wide state.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use shelfwise_core::{LocationId, TenantId};
use shelfwise_ledger::{LedgerKind, RemovalReason};

/// Environment variable holding the JSON configuration.
pub const CONFIG_ENV_VAR: &str = "SHELFWISE_ENGINE_CONFIG";

const DEFAULT_MAX_FOLLOW_UP_STEPS: usize = 10_000;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InventoryType {
    /// Sellable stock; the catalog mirrors it.
    Available,
    WorkingStock,
    Damaged,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LocationKind {
    Warehouse,
    Inventory { inventory_type: InventoryType },
}

impl LocationKind {
    pub fn available() -> Self {
        LocationKind::Inventory {
            inventory_type: InventoryType::Available,
        }
    }

    pub fn ledger_kind(self) -> LedgerKind {
        match self {
            LocationKind::Warehouse => LedgerKind::Warehouse,
            LocationKind::Inventory { .. } => LedgerKind::Inventory,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocationEntry {
    pub tenant_id: TenantId,
    pub location_id: LocationId,
    pub kind: LocationKind,
}

/// Inventory location receiving a tenant's warehouse removals when the
/// request names none.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DefaultDestination {
    pub tenant_id: TenantId,
    pub location_id: LocationId,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid engine configuration: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("location {location_id} registered twice for tenant {tenant_id}")]
    DuplicateLocation { tenant_id: TenantId, location_id: LocationId },

    #[error("default destination {0} is not a registered inventory location")]
    BadDestination(LocationId),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub locations: Vec<LocationEntry>,
    pub default_destinations: Vec<DefaultDestination>,
    /// Removal reasons allowed to close below zero.
    pub negative_stock: Vec<RemovalReason>,
    /// Upper bound on cascade/propagation steps within one business event.
    pub max_follow_up_steps: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            locations: Vec::new(),
            default_destinations: Vec::new(),
            negative_stock: vec![RemovalReason::Transfer],
            max_follow_up_steps: DEFAULT_MAX_FOLLOW_UP_STEPS,
        }
    }
}

impl EngineConfig {
    /// Parse and validate a JSON configuration.
    pub fn from_json(raw: &str) -> Result<Self, ConfigError> {
        let config: EngineConfig = serde_json::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Read the configuration from `SHELFWISE_ENGINE_CONFIG`.
    ///
    /// Falls back to defaults when the variable is unset; a malformed value
    /// is an error.
    pub fn from_env() -> Result<Self, ConfigError> {
        match std::env::var(CONFIG_ENV_VAR) {
            Ok(raw) => Self::from_json(&raw),
            Err(_) => {
                tracing::warn!("{CONFIG_ENV_VAR} not set; using default engine configuration");
                Ok(Self::default())
            }
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        for (i, entry) in self.locations.iter().enumerate() {
            let duplicate = self.locations[..i]
                .iter()
                .any(|e| e.tenant_id == entry.tenant_id && e.location_id == entry.location_id);
            if duplicate {
                return Err(ConfigError::DuplicateLocation {
                    tenant_id: entry.tenant_id,
                    location_id: entry.location_id,
                });
            }
        }
        for dest in &self.default_destinations {
            match self.location_kind(dest.tenant_id, dest.location_id) {
                Some(LocationKind::Inventory { .. }) => {}
                _ => return Err(ConfigError::BadDestination(dest.location_id)),
            }
        }
        Ok(())
    }

    pub fn with_location(mut self, tenant_id: TenantId, location_id: LocationId, kind: LocationKind) -> Self {
        self.locations.push(LocationEntry {
            tenant_id,
            location_id,
            kind,
        });
        self
    }

    pub fn with_default_destination(mut self, tenant_id: TenantId, location_id: LocationId) -> Self {
        self.default_destinations.push(DefaultDestination { tenant_id, location_id });
        self
    }

    pub fn with_negative_stock(mut self, reasons: impl IntoIterator<Item = RemovalReason>) -> Self {
        self.negative_stock = reasons.into_iter().collect();
        self
    }

    pub fn location_kind(&self, tenant_id: TenantId, location_id: LocationId) -> Option<LocationKind> {
        self.locations
            .iter()
            .find(|e| e.tenant_id == tenant_id && e.location_id == location_id)
            .map(|e| e.kind)
    }

    /// Whether records at this location feed the catalog projection.
    pub fn is_available(&self, tenant_id: TenantId, location_id: LocationId) -> bool {
        self.location_kind(tenant_id, location_id) == Some(LocationKind::available())
    }

    pub fn default_destination(&self, tenant_id: TenantId) -> Option<LocationId> {
        self.default_destinations
            .iter()
            .find(|d| d.tenant_id == tenant_id)
            .map(|d| d.location_id)
    }

    /// The inventory location a warehouse-to-inventory removal lands in.
    pub fn resolve_destination(&self, tenant_id: TenantId, requested: Option<LocationId>) -> Option<LocationId> {
        requested.or_else(|| self.default_destination(tenant_id))
    }

    pub fn allows_negative(&self, reason: RemovalReason) -> bool {
        self.negative_stock.contains(&reason)
    }
}
