//! SpaceCommand Sensor Server
//!
//! Connects the sensor registry to Zenoh.
//!
//! # Overview
//!
//! - [`ServerConfig`] loads and validates the JSON5 configuration
//! - [`ServerRunner`] manages the lifecycle (startup, signal handling, ordered shutdown)
//! - [`TransportSubscriber`] feeds inbound sensor messages to the dispatcher
//! - [`EventForwarder`] publishes measurement, offline and snapshot events
//! - [`StatusPublisher`] reports server status on `<prefix>/@/status`
//!
//! # Example
//!
//! ```ignore
//! use spacecommand_server::{ServerArgs, ServerConfig, ServerRunner};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let args = ServerArgs::parse();
//!     let config = ServerConfig::load(&args.config)?;
//!
//!     ServerRunner::new(config, Some(&args)).await?.run().await?;
//!     Ok(())
//! }
//! ```

mod args;
mod config;
mod error;
mod forwarder;
mod publisher;
mod runner;
mod status;
mod subscriber;

pub use args::{DEFAULT_CONFIG, ServerArgs};
pub use config::{CatalogConfig, EventsConfig, IngestConfig, LivenessConfig, ServerConfig};
pub use error::{Result, ServerError};
pub use forwarder::{EventForwarder, ForwarderHandle, SnapshotTracker};
pub use publisher::{PublishStats, Publisher};
pub use runner::{SERVER_NAME, ServerRunner, build_registry};
pub use status::{ServerStatus, StatusPublisher, status_metadata};
pub use subscriber::{TransportSubscriber, ingest_sample};

// Re-export commonly used types from the shared crates
pub use spacecommand_common::{Format, KeyExprBuilder, LoggingConfig, ZenohConfig};
pub use spacecommand_registry::{Dispatcher, EntityRegistry};
