//! Gateway configuration
//!
//! Loaded with figment from an optional YAML file plus `BACSRV_`-prefixed
//! environment overrides. Every field has a default so an empty file is a
//! valid configuration.

use std::path::{Path, PathBuf};
use std::time::Duration;

use figment::providers::{Env, Format, Yaml};
use figment::Figment;
use serde::{Deserialize, Serialize};

use crate::core::queue::DrainPolicy;
use crate::error::{GatewayError, Result};

/// Environment variable prefix for overrides, e.g.
/// `BACSRV_TELEMETRY__SUBSCRIBE_MARKER`.
pub const ENV_PREFIX: &str = "BACSRV_";

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Console log level filter (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Log directory; file logging is disabled when unset
    #[serde(default)]
    pub dir: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            dir: None,
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Controller discovery and onboarding sweep intervals.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscoveryConfig {
    /// Catalog reconcile interval in seconds
    #[serde(default = "default_refresh_secs")]
    pub refresh_secs: u64,
    /// Straggler re-enumeration sweep interval in seconds
    #[serde(default = "default_sweep_secs")]
    pub sweep_secs: u64,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            refresh_secs: default_refresh_secs(),
            sweep_secs: default_sweep_secs(),
        }
    }
}

fn default_refresh_secs() -> u64 {
    120
}

fn default_sweep_secs() -> u64 {
    600
}

/// Adaptive drain loop settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DrainConfig {
    /// Tick length in milliseconds while a backlog exists
    #[serde(default = "default_busy_ms")]
    pub busy_ms: u64,
    /// Tick length in milliseconds when idle
    #[serde(default = "default_idle_ms")]
    pub idle_ms: u64,
    /// Entries dispatched per tick
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
}

impl Default for DrainConfig {
    fn default() -> Self {
        Self {
            busy_ms: default_busy_ms(),
            idle_ms: default_idle_ms(),
            batch_size: default_batch_size(),
        }
    }
}

impl DrainConfig {
    pub fn policy(&self) -> DrainPolicy {
        DrainPolicy::new(
            Duration::from_millis(self.busy_ms),
            Duration::from_millis(self.idle_ms),
            self.batch_size,
        )
    }
}

fn default_busy_ms() -> u64 {
    400
}

fn default_idle_ms() -> u64 {
    10_000
}

fn default_batch_size() -> usize {
    1
}

/// Telemetry engine settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelemetryConfig {
    /// Point catalog reconcile interval in seconds
    #[serde(default = "default_catalog_refresh_secs")]
    pub catalog_refresh_secs: u64,
    /// Poll scheduling interval in seconds
    #[serde(default = "default_poll_schedule_secs")]
    pub poll_schedule_secs: u64,
    /// Name substring that marks a point for change-of-value subscription
    #[serde(default = "default_subscribe_marker")]
    pub subscribe_marker: String,
    /// Subscription lease lifetime in seconds
    #[serde(default = "default_cov_lifetime_secs")]
    pub cov_lifetime_secs: u64,
    /// Unconditional re-subscription sweep interval; must stay below the
    /// lease lifetime so leases renew before expiry
    #[serde(default = "default_resubscribe_secs")]
    pub resubscribe_secs: u64,
    /// Subscriber process identifier carried in subscription requests
    #[serde(default = "default_process_id")]
    pub process_id: u32,
    #[serde(default)]
    pub onboarding: DrainConfig,
    #[serde(default)]
    pub polling: DrainConfig,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            catalog_refresh_secs: default_catalog_refresh_secs(),
            poll_schedule_secs: default_poll_schedule_secs(),
            subscribe_marker: default_subscribe_marker(),
            cov_lifetime_secs: default_cov_lifetime_secs(),
            resubscribe_secs: default_resubscribe_secs(),
            process_id: default_process_id(),
            onboarding: DrainConfig::default(),
            polling: DrainConfig::default(),
        }
    }
}

fn default_catalog_refresh_secs() -> u64 {
    45
}

fn default_poll_schedule_secs() -> u64 {
    120
}

fn default_subscribe_marker() -> String {
    "ZN-T".to_string()
}

fn default_cov_lifetime_secs() -> u64 {
    240
}

fn default_resubscribe_secs() -> u64 {
    120
}

fn default_process_id() -> u32 {
    2367
}

/// Top-level gateway configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub discovery: DiscoveryConfig,
    #[serde(default)]
    pub telemetry: TelemetryConfig,
}

impl GatewayConfig {
    /// Load from a YAML file with environment overrides, then validate.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let config: GatewayConfig = Figment::new()
            .merge(Yaml::file(path.as_ref()))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .extract()
            .map_err(|e| GatewayError::config(format!("failed to load config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Environment-only configuration (defaults plus `BACSRV_` overrides).
    pub fn from_env() -> Result<Self> {
        let config: GatewayConfig = Figment::new()
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .extract()
            .map_err(|e| GatewayError::config(format!("failed to load config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.discovery.refresh_secs == 0 || self.discovery.sweep_secs == 0 {
            return Err(GatewayError::config("discovery intervals must be non-zero"));
        }
        if self.telemetry.catalog_refresh_secs == 0 || self.telemetry.poll_schedule_secs == 0 {
            return Err(GatewayError::config("telemetry intervals must be non-zero"));
        }
        if self.telemetry.subscribe_marker.is_empty() {
            return Err(GatewayError::config(
                "subscribe_marker must be non-empty; an empty marker would subscribe every point",
            ));
        }
        if self.telemetry.resubscribe_secs >= self.telemetry.cov_lifetime_secs {
            return Err(GatewayError::config(format!(
                "resubscribe_secs ({}) must be below cov_lifetime_secs ({}) so leases renew before expiry",
                self.telemetry.resubscribe_secs, self.telemetry.cov_lifetime_secs
            )));
        }
        for (name, drain) in [
            ("onboarding", &self.telemetry.onboarding),
            ("polling", &self.telemetry.polling),
        ] {
            if drain.batch_size == 0 {
                return Err(GatewayError::config(format!(
                    "{} batch_size must be at least 1",
                    name
                )));
            }
            if drain.busy_ms == 0 {
                return Err(GatewayError::config(format!(
                    "{} busy_ms must be non-zero",
                    name
                )));
            }
        }
        Ok(())
    }

    pub fn controller_refresh_interval(&self) -> Duration {
        Duration::from_secs(self.discovery.refresh_secs)
    }

    pub fn straggler_sweep_interval(&self) -> Duration {
        Duration::from_secs(self.discovery.sweep_secs)
    }

    pub fn catalog_refresh_interval(&self) -> Duration {
        Duration::from_secs(self.telemetry.catalog_refresh_secs)
    }

    pub fn poll_schedule_interval(&self) -> Duration {
        Duration::from_secs(self.telemetry.poll_schedule_secs)
    }

    pub fn resubscribe_interval(&self) -> Duration {
        Duration::from_secs(self.telemetry.resubscribe_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = GatewayConfig::default();
        assert_eq!(config.discovery.refresh_secs, 120);
        assert_eq!(config.discovery.sweep_secs, 600);
        assert_eq!(config.telemetry.subscribe_marker, "ZN-T");
        assert_eq!(config.telemetry.cov_lifetime_secs, 240);
        assert_eq!(config.telemetry.onboarding.batch_size, 1);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_load_from_yaml_file() {
        let mut file = tempfile::NamedTempFile::with_suffix(".yaml").unwrap();
        write!(
            file,
            "telemetry:\n  subscribe_marker: \"RM-T\"\n  catalog_refresh_secs: 30\ndiscovery:\n  refresh_secs: 60\n"
        )
        .unwrap();

        let config = GatewayConfig::from_file(file.path()).unwrap();
        assert_eq!(config.telemetry.subscribe_marker, "RM-T");
        assert_eq!(config.telemetry.catalog_refresh_secs, 30);
        assert_eq!(config.discovery.refresh_secs, 60);
        // Untouched fields keep their defaults.
        assert_eq!(config.discovery.sweep_secs, 600);
    }

    #[test]
    fn test_resubscribe_must_precede_lease_expiry() {
        let mut config = GatewayConfig::default();
        config.telemetry.resubscribe_secs = 240;
        config.telemetry.cov_lifetime_secs = 240;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_empty_marker_rejected() {
        let mut config = GatewayConfig::default();
        config.telemetry.subscribe_marker.clear();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_zero_batch_rejected() {
        let mut config = GatewayConfig::default();
        config.telemetry.polling.batch_size = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_drain_config_to_policy() {
        let drain = DrainConfig {
            busy_ms: 250,
            idle_ms: 5000,
            batch_size: 4,
        };
        let policy = drain.policy();
        assert_eq!(policy.busy_interval, Duration::from_millis(250));
        assert_eq!(policy.idle_interval, Duration::from_millis(5000));
        assert_eq!(policy.batch_size, 4);
    }
}
