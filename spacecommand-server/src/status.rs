//! Server status reporting.

use serde::{Deserialize, Serialize};
use spacecommand_common::RegistrySummary;
use spacecommand_registry::DispatcherStats;

use crate::Result;
use crate::publisher::Publisher;

/// Server status as published on `<prefix>/@/status`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerStatus {
    /// Server name.
    pub server: String,
    /// Server version.
    pub version: String,
    /// "running", "offline" or "error".
    pub status: String,
    /// Additional metadata.
    #[serde(flatten)]
    pub metadata: serde_json::Value,
}

impl ServerStatus {
    /// Status published once the server is serving.
    pub fn running(server: impl Into<String>, version: impl Into<String>) -> Self {
        Self::with_status(server, version, "running")
    }

    /// Status published on clean shutdown.
    pub fn offline(server: impl Into<String>, version: impl Into<String>) -> Self {
        Self::with_status(server, version, "offline")
    }

    /// Status carrying an error message under `error`.
    pub fn error(
        server: impl Into<String>,
        version: impl Into<String>,
        error: impl Into<String>,
    ) -> Self {
        Self::with_status(server, version, "error")
            .with_metadata(serde_json::json!({ "error": error.into() }))
    }

    fn with_status(server: impl Into<String>, version: impl Into<String>, status: &str) -> Self {
        Self {
            server: server.into(),
            version: version.into(),
            status: status.to_string(),
            metadata: serde_json::Value::Null,
        }
    }

    /// Replace the metadata. Object fields are flattened into the status.
    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = metadata;
        self
    }

    /// Publish this status as JSON.
    pub async fn publish(&self, publisher: &Publisher) -> Result<()> {
        let key = publisher.keys().status_key();
        publisher.publish_json(&key, self).await
    }
}

/// Status metadata describing the registry and ingestion counters.
pub fn status_metadata(summary: &RegistrySummary, stats: &DispatcherStats) -> serde_json::Value {
    serde_json::json!({
        "registry": summary,
        "ingest": stats,
    })
}

/// Publishes server status on startup and shutdown.
#[derive(Debug, Clone)]
pub struct StatusPublisher {
    publisher: Publisher,
    server_name: String,
    version: String,
}

impl StatusPublisher {
    /// Create a publisher reporting as `server_name` at `version`.
    pub fn new(
        publisher: Publisher,
        server_name: impl Into<String>,
        version: impl Into<String>,
    ) -> Self {
        Self {
            publisher,
            server_name: server_name.into(),
            version: version.into(),
        }
    }

    /// Publish "running" status with optional metadata.
    pub async fn publish_running(&self, metadata: Option<serde_json::Value>) -> Result<()> {
        let mut status = ServerStatus::running(&self.server_name, &self.version);
        if let Some(meta) = metadata {
            status = status.with_metadata(meta);
        }
        status.publish(&self.publisher).await
    }

    /// Publish "offline" status.
    pub async fn publish_offline(&self) -> Result<()> {
        ServerStatus::offline(&self.server_name, &self.version)
            .publish(&self.publisher)
            .await
    }

    /// Publish "error" status with the error message.
    pub async fn publish_error(&self, error: impl Into<String>) -> Result<()> {
        ServerStatus::error(&self.server_name, &self.version, error)
            .publish(&self.publisher)
            .await
    }
}
