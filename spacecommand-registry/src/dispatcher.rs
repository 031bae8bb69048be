//! Routing of inbound sensor messages into the active models.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};
use spacecommand_common::{MeasurementMessage, SensorMessage, Timestamp, decode_message};
use tracing::{trace, warn};

use crate::error::IngestError;
use crate::events::{DEFAULT_EVENT_CAPACITY, EventChannel, EventStream, MeasurementEvent};
use crate::registry::EntityRegistry;
use crate::sensor::SensorActiveModel;

/// What a single message changed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IngestReport {
    pub sensor_id: String,
    /// Channel values applied.
    pub applied: usize,
    /// Channel IDs in the message that the sensor does not have.
    pub unknown_channels: Vec<String>,
    /// Channel IDs whose value was missing or not a scalar.
    pub unusable_values: Vec<String>,
}

impl IngestReport {
    fn new(sensor_id: &str) -> Self {
        Self {
            sensor_id: sensor_id.to_string(),
            ..Self::default()
        }
    }

    /// Whether every channel in the message was applied.
    pub fn is_complete(&self) -> bool {
        self.unknown_channels.is_empty() && self.unusable_values.is_empty()
    }
}

#[derive(Debug, Default)]
struct IngestCounters {
    messages_received: AtomicU64,
    measurements: AtomicU64,
    heartbeats: AtomicU64,
    decode_errors: AtomicU64,
    unknown_sensors: AtomicU64,
    unknown_channels: AtomicU64,
    unusable_values: AtomicU64,
    values_applied: AtomicU64,
}

/// Snapshot of dispatcher statistics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispatcherStats {
    /// Raw payloads handed to [`Dispatcher::ingest`].
    pub messages_received: u64,
    pub measurements: u64,
    pub heartbeats: u64,
    pub decode_errors: u64,
    pub unknown_sensors: u64,
    pub unknown_channels: u64,
    #[serde(default)]
    pub unusable_values: u64,
    pub values_applied: u64,
}

/// Decodes inbound messages and applies them to the registry.
///
/// Safe to call from many tasks at once; messages for different sensors
/// never wait on each other.
#[derive(Debug)]
pub struct Dispatcher {
    registry: Arc<EntityRegistry>,
    measurements: EventChannel<MeasurementEvent>,
    counters: IngestCounters,
}

impl Dispatcher {
    pub fn new(registry: Arc<EntityRegistry>) -> Self {
        Self::with_event_capacity(registry, DEFAULT_EVENT_CAPACITY)
    }

    pub fn with_event_capacity(registry: Arc<EntityRegistry>, event_capacity: usize) -> Self {
        Self {
            registry,
            measurements: EventChannel::new("measurement", event_capacity),
            counters: IngestCounters::default(),
        }
    }

    pub fn registry(&self) -> &Arc<EntityRegistry> {
        &self.registry
    }

    /// Decode a raw JSON or CBOR payload and apply it.
    pub fn ingest(&self, raw: &[u8], received_at: Timestamp) -> Result<IngestReport, IngestError> {
        self.counters.messages_received.fetch_add(1, Ordering::Relaxed);

        let message = match decode_message(raw) {
            Ok(message) => message,
            Err(e) => {
                self.counters.decode_errors.fetch_add(1, Ordering::Relaxed);
                warn!(error = %e, bytes = raw.len(), "Dropping undecodable sensor message");
                return Err(e.into());
            }
        };

        self.process(&message, received_at)
    }

    /// Apply an already decoded message.
    pub fn process(&self, message: &SensorMessage, received_at: Timestamp) -> Result<IngestReport, IngestError> {
        trace!(kind = message.kind(), sensor = %message.sensor_id(), at = %received_at, "Sensor message");

        let sensor_id = message.sensor_id();
        let Some(sensor) = self.registry.sensor_active_model(sensor_id) else {
            self.counters.unknown_sensors.fetch_add(1, Ordering::Relaxed);
            warn!(sensor = %sensor_id, kind = message.kind(), "Message for unknown sensor");
            return Err(IngestError::UnknownSensor {
                sensor_id: sensor_id.to_string(),
            });
        };

        match message {
            SensorMessage::Measurement(measurement) => {
                Ok(self.process_measurement(&sensor, measurement, received_at))
            }
            SensorMessage::Heartbeat(_) => Ok(self.process_heartbeat(&sensor, received_at)),
        }
    }

    /// Apply each channel value of a measurement. Unknown channels and
    /// unusable values are skipped without affecting the others.
    pub fn process_measurement(
        &self,
        sensor: &Arc<SensorActiveModel>,
        message: &MeasurementMessage,
        received_at: Timestamp,
    ) -> IngestReport {
        self.counters.measurements.fetch_add(1, Ordering::Relaxed);
        let mut report = IngestReport::new(sensor.sensor_id());

        for (channel_id, data) in &message.data {
            let Some(binding) = sensor.active_channel(channel_id) else {
                self.counters.unknown_channels.fetch_add(1, Ordering::Relaxed);
                warn!(sensor = %sensor.sensor_id(), channel = %channel_id, "Measurement for unknown channel");
                report.unknown_channels.push(channel_id.clone());
                continue;
            };

            let Some(value) = data.value.as_ref() else {
                self.counters.unusable_values.fetch_add(1, Ordering::Relaxed);
                warn!(sensor = %sensor.sensor_id(), channel = %channel_id, "Unusable measurement value");
                report.unusable_values.push(channel_id.clone());
                continue;
            };

            if !binding.update_current_value(value.clone(), received_at) {
                continue;
            }
            self.counters.values_applied.fetch_add(1, Ordering::Relaxed);
            report.applied += 1;

            if let Some(sensed) = binding.sensed() {
                self.measurements.emit(MeasurementEvent {
                    sensor: sensor.clone(),
                    sensed,
                    binding,
                    value: value.clone(),
                    received_at,
                });
            }
        }

        report
    }

    /// Refresh the liveness of a sensor from a heartbeat.
    pub fn process_heartbeat(&self, sensor: &Arc<SensorActiveModel>, received_at: Timestamp) -> IngestReport {
        self.counters.heartbeats.fetch_add(1, Ordering::Relaxed);
        sensor.heartbeat_received(received_at);
        IngestReport::new(sensor.sensor_id())
    }

    /// Observe every measurement applied to a channel binding.
    pub fn subscribe_measurements(&self) -> EventStream<MeasurementEvent> {
        self.measurements.subscribe()
    }

    pub fn stats(&self) -> DispatcherStats {
        let c = &self.counters;
        DispatcherStats {
            messages_received: c.messages_received.load(Ordering::Relaxed),
            measurements: c.measurements.load(Ordering::Relaxed),
            heartbeats: c.heartbeats.load(Ordering::Relaxed),
            decode_errors: c.decode_errors.load(Ordering::Relaxed),
            unknown_sensors: c.unknown_sensors.load(Ordering::Relaxed),
            unknown_channels: c.unknown_channels.load(Ordering::Relaxed),
            unusable_values: c.unusable_values.load(Ordering::Relaxed),
            values_applied: c.values_applied.load(Ordering::Relaxed),
        }
    }

    /// Close the measurement event channel.
    pub fn close(&self) {
        self.measurements.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::description::{ChannelDetail, SensedEntityDescription, SensorDescription, SensorDetail};
    use chrono::{TimeDelta, TimeZone, Utc};
    use spacecommand_common::{Format, MeasurementValue, encode};

    fn t(secs: i64) -> Timestamp {
        Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
    }

    fn dispatcher() -> Dispatcher {
        let mut registry = EntityRegistry::new();
        let detail = registry
            .add_sensor_detail(
                SensorDetail::new("dht22", "DHT22", "")
                    .with_channel(ChannelDetail::new("temperature", "Temp", "", "temperature", "celsius"))
                    .with_channel(ChannelDetail::new("humidity", "Hum", "", "humidity", "percent"))
                    .with_update_time_limit(Some(TimeDelta::seconds(60))),
            )
            .unwrap();
        registry
            .add_sensor(SensorDescription::new("s1", "Sensor 1", "", detail, None, None))
            .unwrap();
        registry
            .add_sensed_entity(SensedEntityDescription::physical_location("bay", "Bay", ""))
            .unwrap();
        registry
            .register_sensor_association("s1", ["temperature", "humidity"], "bay")
            .unwrap();
        registry.prepare_runtime_models(t(0)).unwrap();
        Dispatcher::new(Arc::new(registry))
    }

    #[test]
    fn test_ingest_measurement() {
        let dispatcher = dispatcher();
        let mut events = dispatcher.subscribe_measurements();
        let raw = br#"{"messageType":"measurement","sensorId":"s1","data":{"temperature":{"value":21.5}}}"#;

        let report = dispatcher.ingest(raw, t(10)).unwrap();
        assert_eq!(report.applied, 1);
        assert!(report.is_complete());

        let sensor = dispatcher.registry().sensor_active_model("s1").unwrap();
        assert!(sensor.is_online());
        assert_eq!(sensor.last_value_time(), Some(t(10)));

        let event = events.try_recv().unwrap();
        assert_eq!(event.sensor.sensor_id(), "s1");
        assert_eq!(event.sensed.sensed_id(), "bay");
        assert_eq!(event.value, MeasurementValue::Number(21.5));
        assert_eq!(event.to_record().measurement_unit, "celsius");
    }

    #[test]
    fn test_ingest_cbor() {
        let dispatcher = dispatcher();
        let message = SensorMessage::measurement("s1").with_value("humidity", 40.0);
        let raw = encode(&message, Format::Cbor).unwrap();

        let report = dispatcher.ingest(&raw, t(1)).unwrap();
        assert_eq!(report.applied, 1);
    }

    #[test]
    fn test_unknown_sensor_is_reported() {
        let dispatcher = dispatcher();
        let message = SensorMessage::measurement("ghost").with_value("temperature", 1.0);

        let err = dispatcher.process(&message, t(1)).unwrap_err();
        assert_eq!(err, IngestError::UnknownSensor { sensor_id: "ghost".into() });

        let sensor = dispatcher.registry().sensor_active_model("s1").unwrap();
        assert!(!sensor.is_online());
        assert_eq!(dispatcher.stats().unknown_sensors, 1);
    }

    #[test]
    fn test_partial_channels() {
        let dispatcher = dispatcher();
        let message = SensorMessage::measurement("s1")
            .with_value("temperature", 20.0)
            .with_value("pressure", 1013.0);

        let report = dispatcher.process(&message, t(2)).unwrap();
        assert_eq!(report.applied, 1);
        assert_eq!(report.unknown_channels, vec!["pressure".to_string()]);

        let binding = dispatcher
            .registry()
            .sensor_active_model("s1")
            .unwrap()
            .active_channel("temperature")
            .unwrap();
        assert_eq!(binding.current_value(), Some(MeasurementValue::Number(20.0)));
    }

    #[test]
    fn test_unusable_value_skipped() {
        let dispatcher = dispatcher();
        let mut events = dispatcher.subscribe_measurements();

        let report = dispatcher
            .ingest(
                br#"{"messageType":"measurement","sensorId":"s1","data":{"temperature":{"value":21},"humidity":{"value":null}}}"#,
                t(3),
            )
            .unwrap();
        assert_eq!(report.applied, 1);
        assert_eq!(report.unusable_values, vec!["humidity".to_string()]);
        assert!(report.unknown_channels.is_empty());
        assert!(!report.is_complete());

        let sensor = dispatcher.registry().sensor_active_model("s1").unwrap();
        assert!(sensor.is_online());
        assert_eq!(
            sensor.active_channel("temperature").unwrap().current_value(),
            Some(MeasurementValue::Number(21.0))
        );
        assert!(sensor.active_channel("humidity").unwrap().current_value().is_none());

        let event = events.try_recv().unwrap();
        assert_eq!(event.binding.channel_id(), "temperature");
        assert!(events.try_recv().is_none());
        assert_eq!(dispatcher.stats().unusable_values, 1);
    }

    #[test]
    fn test_heartbeat() {
        let dispatcher = dispatcher();
        let mut events = dispatcher.subscribe_measurements();

        let report = dispatcher
            .ingest(br#"{"messageType":"heartbeat","sensorId":"s1"}"#, t(5))
            .unwrap();
        assert_eq!(report.applied, 0);
        assert!(events.try_recv().is_none());

        let sensor = dispatcher.registry().sensor_active_model("s1").unwrap();
        assert_eq!(sensor.last_heartbeat_time(), Some(t(5)));
        assert!(sensor.last_value_time().is_none());
    }

    #[test]
    fn test_decode_errors() {
        let dispatcher = dispatcher();

        for raw in [
            &br#"{"messageType":"reboot","sensorId":"s1"}"#[..],
            &br#"{"messageType":"measurement"}"#[..],
            &b"not json"[..],
            &b""[..],
        ] {
            assert!(matches!(dispatcher.ingest(raw, t(1)), Err(IngestError::Decode(_))));
        }

        let stats = dispatcher.stats();
        assert_eq!(stats.messages_received, 4);
        assert_eq!(stats.decode_errors, 4);
        assert_eq!(stats.measurements, 0);
    }

    #[test]
    fn test_stats() {
        let dispatcher = dispatcher();
        let message = SensorMessage::measurement("s1")
            .with_value("temperature", 20.0)
            .with_value("humidity", 50.0)
            .with_value("co2", 400.0);
        dispatcher.process(&message, t(1)).unwrap();
        dispatcher.process(&SensorMessage::heartbeat("s1"), t(2)).unwrap();

        let stats = dispatcher.stats();
        assert_eq!(stats.measurements, 1);
        assert_eq!(stats.heartbeats, 1);
        assert_eq!(stats.values_applied, 2);
        assert_eq!(stats.unknown_channels, 1);
        assert_eq!(stats.messages_received, 0);
    }

    #[test]
    fn test_close_terminates_measurements() {
        let dispatcher = dispatcher();
        let mut events = dispatcher.subscribe_measurements();
        dispatcher.close();
        assert!(events.is_terminated());
    }
}
