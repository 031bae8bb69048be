//! Zenoh subscriber feeding sensor messages to the dispatcher.

use std::sync::Arc;

use spacecommand_common::{KeyExprBuilder, Timestamp, current_timestamp};
use spacecommand_registry::{Dispatcher, IngestReport};
use tokio::sync::watch;
use tracing::{debug, info, trace};
use zenoh::sample::SampleKind;

use crate::error::{Result, ServerError};

/// Receives sensor messages from Zenoh and hands them to the dispatcher.
pub struct TransportSubscriber {
    session: Arc<zenoh::Session>,
    dispatcher: Arc<Dispatcher>,
    key_expr: String,
    keys: Option<KeyExprBuilder>,
}

impl TransportSubscriber {
    /// Subscribe on `key_expr`. When it has the form `<prefix>/sensors/**`
    /// the sensor ID in each key is cross-checked against `<prefix>`.
    pub fn new(session: Arc<zenoh::Session>, dispatcher: Arc<Dispatcher>, key_expr: impl Into<String>) -> Self {
        let key_expr = key_expr.into();
        let keys = KeyExprBuilder::for_sensors_key_expr(&key_expr);
        if keys.is_none() {
            debug!(key_expr = %key_expr, "No sensor key prefix in key expression, skipping key cross-check");
        }
        Self {
            session,
            dispatcher,
            key_expr,
            keys,
        }
    }

    /// Key builder used to cross-check the sensor ID in the key.
    pub fn with_keys(mut self, keys: KeyExprBuilder) -> Self {
        self.keys = Some(keys);
        self
    }

    pub fn key_expr(&self) -> &str {
        &self.key_expr
    }

    pub fn keys(&self) -> Option<&KeyExprBuilder> {
        self.keys.as_ref()
    }

    /// Run until the shutdown signal is received or the session closes.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) -> Result<()> {
        info!(key_expr = %self.key_expr, "Subscribing to sensor messages");
        let subscriber = self
            .session
            .declare_subscriber(&self.key_expr)
            .await
            .map_err(|e| ServerError::ZenohSession(format!("Failed to create subscriber: {}", e)))?;

        loop {
            tokio::select! {
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        info!("Shutdown signal received, stopping subscriber");
                        break;
                    }
                }

                sample = subscriber.recv_async() => {
                    match sample {
                        Ok(sample) => {
                            if sample.kind() == SampleKind::Delete {
                                trace!(key = %sample.key_expr(), "Ignoring delete sample");
                                continue;
                            }
                            let payload = sample.payload().to_bytes();
                            ingest_sample(
                                &self.dispatcher,
                                self.keys.as_ref(),
                                sample.key_expr().as_str(),
                                &payload,
                                current_timestamp(),
                            );
                        }
                        Err(e) => {
                            debug!(error = %e, "Subscriber closed");
                            break;
                        }
                    }
                }
            }
        }

        if let Err(e) = subscriber.undeclare().await {
            debug!(error = %e, "Failed to undeclare subscriber");
        }
        Ok(())
    }
}

/// Apply one received payload. Failures are logged by the dispatcher and
/// never stop the subscriber.
///
/// With `keys`, a key whose sensor ID differs from the message is logged.
pub fn ingest_sample(
    dispatcher: &Dispatcher,
    keys: Option<&KeyExprBuilder>,
    key: &str,
    payload: &[u8],
    received_at: Timestamp,
) -> Option<IngestReport> {
    let report = dispatcher.ingest(payload, received_at).ok()?;

    if let Some(key_sensor) = keys.and_then(|keys| keys.parse_sensor_key(key)) {
        if key_sensor != report.sensor_id {
            debug!(key = %key, sensor = %report.sensor_id, "Sensor ID differs from key");
        }
    }
    trace!(key = %key, sensor = %report.sensor_id, applied = report.applied, "Message ingested");
    Some(report)
}
