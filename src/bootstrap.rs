//! Logging initialization
//!
//! The embedding service calls [`init_logging`] once at startup. Console
//! output honors `RUST_LOG` when set, falling back to the configured level;
//! when a log directory is configured, a non-blocking daily-rolled file
//! layer is added and its guard returned. The guard must be kept alive for
//! the lifetime of the process or buffered lines are lost.

use tracing::Level;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

use crate::config::LoggingConfig;
use crate::error::{GatewayError, Result};

const LOG_FILE_PREFIX: &str = "bacsrv.log";

/// Parse a configured level string (trace, debug, info, warn, error).
pub fn parse_log_level(level: &str) -> Result<Level> {
    match level.to_ascii_lowercase().as_str() {
        "trace" => Ok(Level::TRACE),
        "debug" => Ok(Level::DEBUG),
        "info" => Ok(Level::INFO),
        "warn" => Ok(Level::WARN),
        "error" => Ok(Level::ERROR),
        other => Err(GatewayError::config(format!(
            "invalid log level '{}'",
            other
        ))),
    }
}

/// Initialize the global tracing subscriber from the logging config.
///
/// Returns the file appender guard when file logging is enabled.
pub fn init_logging(config: &LoggingConfig) -> Result<Option<WorkerGuard>> {
    let level = parse_log_level(&config.level)?;
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level.to_string().to_ascii_lowercase()));

    let console_layer = fmt::layer().with_target(false);

    match &config.dir {
        Some(dir) => {
            std::fs::create_dir_all(dir).map_err(|e| {
                GatewayError::config(format!(
                    "failed to create log directory {}: {}",
                    dir.display(),
                    e
                ))
            })?;
            let appender = tracing_appender::rolling::daily(dir, LOG_FILE_PREFIX);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let file_layer = fmt::layer()
                .with_target(false)
                .with_ansi(false)
                .with_writer(writer);

            tracing_subscriber::registry()
                .with(filter)
                .with(console_layer)
                .with(file_layer)
                .try_init()
                .map_err(|e| GatewayError::internal(format!("failed to init logging: {}", e)))?;
            Ok(Some(guard))
        },
        None => {
            tracing_subscriber::registry()
                .with(filter)
                .with(console_layer)
                .try_init()
                .map_err(|e| GatewayError::internal(format!("failed to init logging: {}", e)))?;
            Ok(None)
        },
    }
}
