//! Server configuration.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use spacecommand_common::{Format, KEY_PREFIX, KeyExprBuilder, LoggingConfig, ZenohConfig};
use spacecommand_registry::DEFAULT_EVENT_CAPACITY;

use crate::error::{Result, ServerError};

/// Complete server configuration.
///
/// ```json5
/// {
///     zenoh: { mode: "peer" },
///     logging: { level: "info", format: "text" },
///     catalog: { path: "catalog.json5" },
///     ingest: { key_expr: "spacecommand/sensors/**" },
///     liveness: { sweep_interval_secs: 60 },
///     events: { publish: true, key_prefix: "spacecommand", format: "json" },
/// }
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Zenoh connection settings.
    #[serde(default)]
    pub zenoh: ZenohConfig,

    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Sensor catalog location.
    pub catalog: CatalogConfig,

    /// Inbound sensor traffic.
    #[serde(default)]
    pub ingest: IngestConfig,

    /// Liveness sweep settings.
    #[serde(default)]
    pub liveness: LivenessConfig,

    /// Outbound events and status.
    #[serde(default)]
    pub events: EventsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogConfig {
    /// Path to the JSON5 catalog. Relative paths are resolved against the
    /// directory of the configuration file.
    pub path: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestConfig {
    /// Key expression sensor nodes publish on.
    #[serde(default = "default_ingest_key_expr")]
    pub key_expr: String,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            key_expr: default_ingest_key_expr(),
        }
    }
}

fn default_ingest_key_expr() -> String {
    KeyExprBuilder::new().sensors_wildcard()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LivenessConfig {
    /// Seconds between offline checks (default: 60).
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_secs: u64,
}

impl Default for LivenessConfig {
    fn default() -> Self {
        Self {
            sweep_interval_secs: default_sweep_interval(),
        }
    }
}

impl LivenessConfig {
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }
}

fn default_sweep_interval() -> u64 {
    60
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventsConfig {
    /// Publish measurement and offline events to Zenoh (default: true).
    #[serde(default = "default_true")]
    pub publish: bool,

    /// Publish a sensor's status snapshot whenever it changes (default: true).
    #[serde(default = "default_true")]
    pub publish_snapshots: bool,

    /// Key expression prefix for events and status (default: "spacecommand").
    #[serde(default = "default_key_prefix")]
    pub key_prefix: String,

    /// Payload format for events (default: json).
    #[serde(default)]
    pub format: Format,

    /// Events buffered per observer before the oldest are dropped.
    #[serde(default = "default_capacity")]
    pub capacity: usize,
}

impl Default for EventsConfig {
    fn default() -> Self {
        Self {
            publish: true,
            publish_snapshots: true,
            key_prefix: default_key_prefix(),
            format: Format::default(),
            capacity: default_capacity(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_key_prefix() -> String {
    KEY_PREFIX.to_string()
}

fn default_capacity() -> usize {
    DEFAULT_EVENT_CAPACITY
}

impl ServerConfig {
    /// Load configuration from a JSON5 file and validate it.
    ///
    /// A relative catalog path is resolved against the directory holding the
    /// configuration file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        if !path.exists() {
            return Err(ServerError::ConfigNotFound {
                path: path.display().to_string(),
            });
        }

        let content = std::fs::read_to_string(path)?;
        let mut config = Self::parse(&content)?;

        if config.catalog.path.is_relative() {
            if let Some(dir) = path.parent() {
                config.catalog.path = dir.join(&config.catalog.path);
            }
        }

        Ok(config)
    }

    /// Parse configuration text and validate it.
    pub fn parse(content: &str) -> Result<Self> {
        let config: Self = json5::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        self.logging
            .validate()
            .map_err(|e| ServerError::validation(e.to_string()))?;
        if self.catalog.path.as_os_str().is_empty() {
            return Err(ServerError::validation("catalog.path must not be empty"));
        }
        if self.ingest.key_expr.trim().is_empty() {
            return Err(ServerError::validation("ingest.key_expr must not be empty"));
        }
        if self.liveness.sweep_interval_secs == 0 {
            return Err(ServerError::validation(
                "liveness.sweep_interval_secs must be > 0",
            ));
        }
        if self.events.key_prefix.trim().is_empty() {
            return Err(ServerError::validation("events.key_prefix must not be empty"));
        }
        if self.events.capacity == 0 {
            return Err(ServerError::validation("events.capacity must be > 0"));
        }
        Ok(())
    }

    /// Key expression builder for outbound events and status.
    pub fn key_builder(&self) -> KeyExprBuilder {
        KeyExprBuilder::with_prefix(&self.events.key_prefix)
    }
}
