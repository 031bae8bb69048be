//! SpaceCommand Common Library
//!
//! Shared types and utilities for the SpaceCommand sensor server:
//!
//! - [`message`] - Inbound sensor messages (`SensorMessage`, `MeasurementValue`)
//! - [`status`] - Snapshot types for dashboards and status APIs
//! - [`serialization`] - JSON/CBOR encoding and decoding
//! - [`config`] - Configuration loading (JSON5 format)
//! - [`session`] - Zenoh session management
//! - [`keyexpr`] - Key expression builders and parsers
//! - [`error`] - Error types

pub mod config;
pub mod error;
pub mod keyexpr;
pub mod message;
pub mod serialization;
pub mod session;
pub mod status;

// Re-export commonly used types at the crate root
pub use config::{
    LOG_LEVELS, LogFormat, LoggingConfig, ZenohConfig, ZenohMode, load_config, parse_config,
};
pub use error::{Error, Result};
pub use keyexpr::{KEY_PREFIX, KeyExprBuilder};
pub use message::{
    ChannelData, HeartbeatMessage, MeasurementMessage, MeasurementValue, SensorMessage, Timestamp,
    current_timestamp,
};
pub use serialization::{Format, decode, decode_auto, decode_message, encode};
pub use session::connect;
pub use status::{
    ChannelSnapshot, MeasurementRecord, OfflineRecord, RegistrySummary, SensedSnapshot,
    SensedValue, SensorSnapshot, SensorStatus,
};

/// Initialize tracing with the given configuration.
///
/// `RUST_LOG` takes precedence over the configured level.
///
/// # Example
///
/// ```ignore
/// use spacecommand_common::{LoggingConfig, LogFormat, init_tracing};
///
/// let config = LoggingConfig {
///     level: "info".to_string(),
///     format: LogFormat::Json,
/// };
/// init_tracing(&config)?;
/// ```
pub fn init_tracing(config: &LoggingConfig) -> Result<()> {
    use tracing_subscriber::{EnvFilter, fmt, prelude::*};

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));

    let result = match config.format {
        LogFormat::Text => tracing_subscriber::registry()
            .with(fmt::layer())
            .with(filter)
            .try_init(),
        LogFormat::Json => tracing_subscriber::registry()
            .with(fmt::layer().json())
            .with(filter)
            .try_init(),
    };

    result.map_err(|e| Error::Config(format!("Failed to initialize tracing: {}", e)))
}
