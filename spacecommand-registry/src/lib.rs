//! SpaceCommand sensor registry.
//!
//! Keeps a live model of every known sensor and the things it senses:
//!
//! - [`description`] - Static sensor, channel and sensed entity descriptions
//! - [`loader`] - JSON5 catalog loading with per-entry issue reporting
//! - [`registry`] - The [`EntityRegistry`] owning descriptions and active models
//! - [`sensor`] / [`sensed`] - Active models holding current state
//! - [`binding`] - Channel bindings between the two
//! - [`liveness`] - The online/offline state machine
//! - [`dispatcher`] - Routing of inbound messages into the models
//! - [`sweep`] - Background liveness checks
//! - [`events`] - Event streams for observers
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use spacecommand_registry::{Dispatcher, EntityRegistry, LivenessSweep, load_catalog};
//!
//! let mut registry = EntityRegistry::new();
//! load_catalog("catalog.json5", &mut registry)?;
//! registry.prepare_runtime_models(chrono::Utc::now())?;
//!
//! let registry = Arc::new(registry);
//! let dispatcher = Dispatcher::new(registry.clone());
//! let sweep = LivenessSweep::new(registry.clone()).start(std::time::Duration::from_secs(60));
//!
//! dispatcher.ingest(payload, chrono::Utc::now())?;
//! ```

pub mod binding;
pub mod description;
pub mod dispatcher;
pub mod error;
pub mod events;
pub mod liveness;
pub mod loader;
pub mod registry;
pub mod sensed;
pub mod sensor;
pub mod sweep;

pub use binding::ChannelBinding;
pub use description::{
    ChannelDetail, PhysicalLocationDescription, SensedEntityDescription, SensorDescription,
    SensorDetail, time_limit_from_secs, time_limit_secs,
};
pub use dispatcher::{Dispatcher, DispatcherStats, IngestReport};
pub use error::{CatalogError, IngestError, RegistryError, Result};
pub use events::{
    DEFAULT_EVENT_CAPACITY, EventChannel, EventStream, MeasurementEvent, SensedValueEvent,
    SensorOfflineEvent, SensorValueEvent,
};
pub use liveness::Liveness;
pub use loader::{
    CatalogDocument, ChannelSelection, LoadIssue, LoadIssueKind, LoadReport, apply_document,
    load_catalog, read_catalog,
};
pub use registry::EntityRegistry;
pub use sensed::{SensedActiveModel, SensedKind};
pub use sensor::SensorActiveModel;
pub use sweep::{LivenessSweep, SweepHandle};
