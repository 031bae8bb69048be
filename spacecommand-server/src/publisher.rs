//! Publishing to Zenoh.

use std::sync::Arc;

use serde::Serialize;
use spacecommand_common::{Format, KeyExprBuilder, encode};

use crate::error::{Result, ServerError};

/// Publishes serialized values to Zenoh.
#[derive(Clone, Debug)]
pub struct Publisher {
    session: Arc<zenoh::Session>,
    keys: KeyExprBuilder,
    format: Format,
}

impl Publisher {
    pub fn new(session: Arc<zenoh::Session>, keys: KeyExprBuilder, format: Format) -> Self {
        Self {
            session,
            keys,
            format,
        }
    }

    /// Key expression builder for this publisher's prefix.
    pub fn keys(&self) -> &KeyExprBuilder {
        &self.keys
    }

    pub fn format(&self) -> Format {
        self.format
    }

    pub fn session(&self) -> &Arc<zenoh::Session> {
        &self.session
    }

    /// Publish a value encoded in the configured format.
    pub async fn publish<T: Serialize>(&self, key: &str, value: &T) -> Result<()> {
        let payload =
            encode(value, self.format).map_err(|e| ServerError::Serialization(e.to_string()))?;
        self.publish_raw(key, payload).await
    }

    /// Publish a value as JSON regardless of the configured format.
    pub async fn publish_json<T: Serialize>(&self, key: &str, value: &T) -> Result<()> {
        let payload = serde_json::to_vec(value)?;
        self.publish_raw(key, payload).await
    }

    /// Publish raw bytes.
    pub async fn publish_raw(&self, key: &str, payload: Vec<u8>) -> Result<()> {
        self.session
            .put(key, payload)
            .await
            .map_err(|e| ServerError::Publish {
                key: key.to_string(),
                message: e.to_string(),
            })?;

        Ok(())
    }
}

/// Running totals of publish attempts.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PublishStats {
    pub success: usize,
    pub failed: usize,
}

impl PublishStats {
    pub fn record(&mut self, result: &Result<()>) {
        match result {
            Ok(()) => self.success += 1,
            Err(_) => self.failed += 1,
        }
    }

    pub fn total(&self) -> usize {
        self.success + self.failed
    }

    /// Success rate as a percentage.
    pub fn success_rate(&self) -> f64 {
        if self.total() == 0 {
            100.0
        } else {
            (self.success as f64 / self.total() as f64) * 100.0
        }
    }
}
