//! Cloud catalog and telemetry sink contracts
//!
//! The persisted device catalog and the upstream publish channel are
//! external collaborators. The core reads controller/point rows, performs
//! conditional updates keyed by address, and fires telemetry records at the
//! sink without waiting on delivery.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::types::{ObjectId, TelemetryRecord};
use crate::error::Result;

/// A controller row as persisted in the catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ControllerRecord {
    pub address: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub device_instance: Option<u32>,
    #[serde(default)]
    pub sensors_registered: bool,
}

/// Partial-field update for a controller row.
///
/// `None` fields are left untouched by the catalog.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ControllerUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub device_instance: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sensors_registered: Option<bool>,
}

impl ControllerUpdate {
    /// Update written after a successful identity resolution. Clears the
    /// registration flag: a freshly named controller needs re-enumeration.
    pub fn identity(name: impl Into<String>, device_instance: u32) -> Self {
        Self {
            name: Some(name.into()),
            device_instance: Some(device_instance),
            sensors_registered: Some(false),
        }
    }

    /// Update that marks controller onboarding as converged.
    pub fn sensors_registered() -> Self {
        Self {
            sensors_registered: Some(true),
            ..Self::default()
        }
    }
}

/// A point row as persisted in the catalog.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogPoint {
    /// Owning controller address
    pub address: String,
    pub object: ObjectId,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub units: Option<String>,
    /// Persisted acquisition mode string ("polling" / "cov")
    pub mode: String,
    pub enabled: bool,
    /// Row category; "adapter" rows describe the gateway itself and are
    /// never telemetry sources
    pub device_type: String,
}

impl CatalogPoint {
    /// Whether this row belongs in the live point registry.
    pub fn is_active_sensor(&self) -> bool {
        self.enabled && self.device_type != "adapter"
    }
}

/// Read/write access to the persisted device catalog.
#[async_trait]
pub trait CloudCatalog: Send + Sync {
    /// Full controller list.
    async fn fetch_controllers(&self) -> Result<Vec<ControllerRecord>>;

    /// Full point list.
    async fn fetch_points(&self) -> Result<Vec<CatalogPoint>>;

    /// Conditional update keyed by controller address. Returns the number
    /// of rows affected; callers treat anything other than exactly 1 as a
    /// conflict and leave local state stale for the next sweep.
    async fn update_controller(&self, address: &str, changes: ControllerUpdate) -> Result<u64>;
}

/// The upstream telemetry publish channel.
///
/// Fire-and-forget: failures are logged by the caller, never propagated.
#[async_trait]
pub trait TelemetrySink: Send + Sync {
    async fn publish(&self, record: TelemetryRecord) -> Result<()>;
}
