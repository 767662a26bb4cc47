//! Core data model: controllers, points, values, acquisition modes
//!
//! Identity rules: controllers are keyed by network address, points by the
//! (controller address, object identifier) pair. A controller with no
//! resolved name is "unregistered" and is never treated as a telemetry
//! source.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// BACnet object category.
///
/// Serialized in the protocol's own camelCase spelling so catalog rows and
/// telemetry records match what the field devices report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ObjectKind {
    AnalogInput,
    AnalogOutput,
    AnalogValue,
    BinaryInput,
    BinaryOutput,
    BinaryValue,
    MultiStateInput,
    MultiStateValue,
    Device,
    TrendLog,
    Program,
}

impl ObjectKind {
    /// Whether objects of this kind are telemetry sources.
    ///
    /// Trend logs, the device object itself and program objects show up in
    /// a controller's object list but are never onboarded as points.
    pub fn is_telemetry(&self) -> bool {
        !matches!(
            self,
            ObjectKind::Device | ObjectKind::TrendLog | ObjectKind::Program
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ObjectKind::AnalogInput => "analogInput",
            ObjectKind::AnalogOutput => "analogOutput",
            ObjectKind::AnalogValue => "analogValue",
            ObjectKind::BinaryInput => "binaryInput",
            ObjectKind::BinaryOutput => "binaryOutput",
            ObjectKind::BinaryValue => "binaryValue",
            ObjectKind::MultiStateInput => "multiStateInput",
            ObjectKind::MultiStateValue => "multiStateValue",
            ObjectKind::Device => "device",
            ObjectKind::TrendLog => "trendLog",
            ObjectKind::Program => "program",
        }
    }
}

impl fmt::Display for ObjectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Protocol object identifier: category plus instance number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ObjectId {
    pub kind: ObjectKind,
    pub instance: u32,
}

impl ObjectId {
    pub fn new(kind: ObjectKind, instance: u32) -> Self {
        Self { kind, instance }
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind, self.instance)
    }
}

/// Point identity: (controller address, object identifier).
pub type PointKey = (String, ObjectId);

/// A decoded present value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PointValue {
    Real(f64),
    Unsigned(u64),
    Signed(i64),
    Boolean(bool),
    /// Enumerated state index, as binary and multi-state objects report
    /// their present value
    Enumerated(u32),
    Text(String),
    Null,
}

impl fmt::Display for PointValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PointValue::Real(v) => write!(f, "{}", v),
            PointValue::Unsigned(v) => write!(f, "{}", v),
            PointValue::Signed(v) => write!(f, "{}", v),
            PointValue::Boolean(v) => write!(f, "{}", v),
            PointValue::Enumerated(v) => write!(f, "{}", v),
            PointValue::Text(v) => f.write_str(v),
            PointValue::Null => f.write_str("null"),
        }
    }
}

/// How a point's value is acquired.
///
/// Decided exactly once per discovery, from the resolved object name. A
/// point that ends up `Unresolved` after onboarding is dormant: never
/// polled, never subscribed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AcquisitionMode {
    #[serde(rename = "unresolved")]
    Unresolved,
    #[serde(rename = "polling")]
    Poll,
    #[serde(rename = "cov")]
    Subscribe,
}

impl AcquisitionMode {
    /// Classify a resolved point name against the subscribe-marker naming
    /// convention. Pure: same name and marker always give the same mode.
    pub fn classify(name: &str, subscribe_marker: &str) -> AcquisitionMode {
        if name.contains(subscribe_marker) {
            AcquisitionMode::Subscribe
        } else {
            AcquisitionMode::Poll
        }
    }

    /// Parse the catalog's persisted mode string. Unknown strings map to
    /// `Unresolved` rather than an error; such points stay dormant until an
    /// operator fixes the row.
    pub fn from_catalog(s: &str) -> AcquisitionMode {
        match s {
            "polling" => AcquisitionMode::Poll,
            "cov" => AcquisitionMode::Subscribe,
            _ => AcquisitionMode::Unresolved,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            AcquisitionMode::Unresolved => "unresolved",
            AcquisitionMode::Poll => "polling",
            AcquisitionMode::Subscribe => "cov",
        }
    }
}

/// A field controller as tracked in memory.
///
/// Owned by the catalog; the core resolves identity fields and flips the
/// onboarding flag but never deletes entries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Controller {
    /// Network address, the unique key
    pub address: String,
    /// Display name; absent or empty until identity resolution
    pub name: Option<String>,
    /// Protocol device instance number; absent until identity resolution
    pub device_instance: Option<u32>,
    /// Set once a point-list sweep found nothing new to onboard
    pub sensors_registered: bool,
}

impl Controller {
    /// An unregistered controller must not be treated as a telemetry source.
    pub fn is_registered(&self) -> bool {
        self.name.as_deref().is_some_and(|n| !n.is_empty())
    }
}

/// A sensor point and its live state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SensorPoint {
    /// Owning controller address
    pub address: String,
    /// Protocol object identifier
    pub object: ObjectId,
    /// Resolved object name; `None` while the point is a placeholder
    pub name: Option<String>,
    pub description: Option<String>,
    pub units: Option<String>,
    /// Last known value
    pub value: Option<PointValue>,
    /// When the last value was observed
    pub observed_at: Option<DateTime<Utc>>,
    pub mode: AcquisitionMode,
}

impl SensorPoint {
    /// Placeholder entry for a freshly discovered, not-yet-onboarded point.
    pub fn placeholder(address: impl Into<String>, object: ObjectId) -> Self {
        Self {
            address: address.into(),
            object,
            name: None,
            description: None,
            units: None,
            value: None,
            observed_at: None,
            mode: AcquisitionMode::Unresolved,
        }
    }

    pub fn key(&self) -> PointKey {
        (self.address.clone(), self.object)
    }
}

/// One upstream telemetry message.
///
/// Serializes to a JSON map carrying at least `timestamp`, `name` and
/// `value`; `meta` is flattened in for the richer onboarding records.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TelemetryRecord {
    pub timestamp: DateTime<Utc>,
    pub name: String,
    pub value: PointValue,
    #[serde(flatten, skip_serializing_if = "serde_json::Map::is_empty", default)]
    pub meta: serde_json::Map<String, serde_json::Value>,
}

impl TelemetryRecord {
    pub fn new(name: impl Into<String>, value: PointValue) -> Self {
        Self {
            timestamp: Utc::now(),
            name: name.into(),
            value,
            meta: serde_json::Map::new(),
        }
    }

    pub fn with_meta(mut self, key: &str, value: serde_json::Value) -> Self {
        self.meta.insert(key.to_string(), value);
        self
    }
}
