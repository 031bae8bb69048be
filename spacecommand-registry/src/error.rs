//! Error types for the registry.

use std::path::PathBuf;

use thiserror::Error;

/// Result type alias using [`RegistryError`].
pub type Result<T> = std::result::Result<T, RegistryError>;

/// Misuse of the registry build phase.
///
/// These indicate a broken catalog or a build-order violation. Callers are
/// expected to treat them as fatal.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    /// `prepare_runtime_models` was called a second time.
    #[error("Runtime models have already been prepared")]
    AlreadyPrepared,

    /// A build-phase operation was attempted after preparation.
    #[error("Registry is sealed: {operation} is only allowed before runtime models are prepared")]
    Sealed { operation: &'static str },

    /// A sensor references a sensor detail that was never added.
    #[error("Unknown sensor detail: {0}")]
    UnknownSensorDetail(String),

    /// A sensor ID that is not in the registry.
    #[error("Unknown sensor: {0}")]
    UnknownSensor(String),

    /// A sensed entity ID that is not in the registry.
    #[error("Unknown sensed entity: {0}")]
    UnknownSensedEntity(String),

    /// A channel association naming a channel its sensor detail does not define.
    #[error("Sensor {sensor_id} has no channel {channel_id} in sensor detail {detail_id}")]
    UnknownChannel {
        sensor_id: String,
        channel_id: String,
        detail_id: String,
    },
}

/// Errors raised while loading a catalog document.
#[derive(Error, Debug)]
pub enum CatalogError {
    /// The catalog file could not be read.
    #[error("Failed to read catalog '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The catalog document is not valid JSON5 or does not match the schema.
    #[error("Failed to parse catalog: {0}")]
    Parse(String),

    /// The registry refused the catalog.
    #[error(transparent)]
    Registry(#[from] RegistryError),
}

impl From<json5::Error> for CatalogError {
    fn from(err: json5::Error) -> Self {
        Self::Parse(err.to_string())
    }
}

/// Errors reported for a single inbound message.
///
/// None of these stop ingestion; the offending message is dropped.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum IngestError {
    /// The payload is not a valid sensor message.
    #[error("Failed to decode sensor message: {0}")]
    Decode(String),

    /// The message names a sensor the registry does not know.
    #[error("Message for unknown sensor with sensor ID {sensor_id}")]
    UnknownSensor { sensor_id: String },
}

impl From<spacecommand_common::Error> for IngestError {
    fn from(err: spacecommand_common::Error) -> Self {
        Self::Decode(err.to_string())
    }
}
