//! Error handling for the telemetry gateway core
//!
//! One error type for the whole crate. Lookup misses on the registries are
//! deliberately not represented here: they are expected races and handled as
//! silent no-ops at the call sites.

use thiserror::Error;

/// Gateway error type
#[derive(Error, Debug, Clone)]
pub enum GatewayError {
    /// Configuration loading or validation errors
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Request failed at the protocol bridge
    #[error("Transport error: {0}")]
    TransportError(String),

    /// Response variant did not match the issued request
    #[error("Unexpected response: {0}")]
    UnexpectedResponse(String),

    /// Cloud catalog fetch/update failures
    #[error("Catalog error: {0}")]
    CatalogError(String),

    /// Conditional catalog update did not affect exactly one row
    #[error("Persistence conflict: {0}")]
    PersistenceConflict(String),

    /// Telemetry sink publish failures
    #[error("Publish error: {0}")]
    PublishError(String),

    /// Internal errors
    #[error("Internal error: {0}")]
    InternalError(String),
}

/// Result type alias for the gateway
pub type Result<T> = std::result::Result<T, GatewayError>;

impl GatewayError {
    pub fn config(msg: impl Into<String>) -> Self {
        GatewayError::ConfigError(msg.into())
    }

    pub fn transport(msg: impl Into<String>) -> Self {
        GatewayError::TransportError(msg.into())
    }

    pub fn unexpected_response(msg: impl Into<String>) -> Self {
        GatewayError::UnexpectedResponse(msg.into())
    }

    pub fn catalog(msg: impl Into<String>) -> Self {
        GatewayError::CatalogError(msg.into())
    }

    pub fn persistence_conflict(msg: impl Into<String>) -> Self {
        GatewayError::PersistenceConflict(msg.into())
    }

    pub fn publish(msg: impl Into<String>) -> Self {
        GatewayError::PublishError(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        GatewayError::InternalError(msg.into())
    }
}
