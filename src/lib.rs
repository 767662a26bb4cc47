//! BACnet-to-Cloud Telemetry Gateway Core (`bacsrv`)
//!
//! Discovers controllers and their sensor points on a building-automation
//! network, classifies every point into a push-subscription or a periodic
//! polling acquisition strategy, keeps that state synchronized with a cloud
//! device catalog and forwards every observed value upstream.
//!
//! The field transport, the persisted catalog and the upstream publisher
//! are external collaborators consumed through traits; this crate owns the
//! registries, the work queues, and the ordering, rate-limiting and
//! failure-tolerance decisions between them.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────┐      ┌─────────────────┐      ┌─────────────────┐
//! │  CloudCatalog   │─────►│ DeviceManager   │─────►│ ProtocolBridge  │
//! │  (controllers,  │      │ (discovery,     │      │ (who-is, reads, │
//! │   points)       │      │  enumeration)   │      │  subscriptions) │
//! └─────────────────┘      └────────┬────────┘      └────────▲────────┘
//!                                   │ intake                 │
//!                          ┌────────▼────────┐               │
//!                          │ SensorManager   │───────────────┘
//!                          │ (onboard, poll, │
//!                          │  subscribe)     │──────► TelemetrySink
//!                          └─────────────────┘
//! ```
//!
//! # Resilience model
//!
//! No error is fatal: transport failures are logged and dropped, retries
//! happen only through the periodic sweeps, and registry lookups that miss
//! because a catalog refresh raced an in-flight completion are silent
//! no-ops.
//!
//! # Quick start
//!
//! ```ignore
//! use std::sync::Arc;
//! use bacsrv::{bootstrap, Gateway, GatewayConfig};
//!
//! #[tokio::main]
//! async fn main() -> bacsrv::Result<()> {
//!     let config = GatewayConfig::from_file("config/bacsrv.yaml")?;
//!     let _log_guard = bootstrap::init_logging(&config.logging)?;
//!
//!     // bridge, catalog and sink are supplied by the embedding service.
//!     let mut gateway = Gateway::new(config, bridge, catalog, sink);
//!     gateway.start();
//!
//!     tokio::signal::ctrl_c().await.ok();
//!     gateway.shutdown().await;
//!     Ok(())
//! }
//! ```

pub mod bootstrap;
pub mod config;
pub mod core;
pub mod error;
pub mod runtime;

pub use config::GatewayConfig;
pub use core::cloud::{CatalogPoint, CloudCatalog, ControllerRecord, ControllerUpdate, TelemetrySink};
pub use core::devices::DeviceManager;
pub use core::sensors::SensorManager;
pub use core::transport::{
    CovNotification, IdentityAnnouncement, PropertyBundle, PropertyId, ProtocolBridge, Request,
    Response,
};
pub use core::types::{
    AcquisitionMode, Controller, ObjectId, ObjectKind, PointKey, PointValue, SensorPoint,
    TelemetryRecord,
};
pub use error::{GatewayError, Result};
pub use runtime::Gateway;
