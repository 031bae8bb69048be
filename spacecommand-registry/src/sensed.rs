//! Runtime model of a sensed entity.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;
use spacecommand_common::{MeasurementValue, SensedSnapshot, SensedValue, Timestamp};
use tracing::{debug, warn};

use crate::binding::ChannelBinding;
use crate::description::SensedEntityDescription;
use crate::events::{EventChannel, EventStream, SensedValueEvent};

/// Kind of a sensed entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SensedKind {
    PhysicalLocation,
}

impl SensedKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SensedKind::PhysicalLocation => "physical_location",
        }
    }
}

impl fmt::Display for SensedKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Current values of everything measured at one sensed entity, keyed by
/// measurement type.
#[derive(Debug)]
pub struct SensedActiveModel {
    description: Arc<SensedEntityDescription>,
    kind: SensedKind,
    /// Measurement type to the binding currently feeding it.
    channels: RwLock<BTreeMap<String, Arc<ChannelBinding>>>,
    values: EventChannel<SensedValueEvent>,
}

impl SensedActiveModel {
    /// Build the active model matching the kind of the description.
    pub fn for_description(description: Arc<SensedEntityDescription>, event_capacity: usize) -> Self {
        let kind = match description.as_ref() {
            SensedEntityDescription::PhysicalLocation(_) => SensedKind::PhysicalLocation,
        };
        Self {
            description,
            kind,
            channels: RwLock::new(BTreeMap::new()),
            values: EventChannel::new("sensed_value", event_capacity),
        }
    }

    /// External ID from the catalog.
    pub fn sensed_id(&self) -> &str {
        self.description.external_id()
    }

    /// Display name.
    pub fn name(&self) -> &str {
        self.description.name()
    }

    /// Kind of entity, derived from the description.
    pub fn kind(&self) -> SensedKind {
        self.kind
    }

    /// Catalog description the model was built from.
    pub fn description(&self) -> &Arc<SensedEntityDescription> {
        &self.description
    }

    /// Attach a binding to the slot for its measurement type.
    ///
    /// Two channels with the same measurement type share one slot; the one
    /// registered last wins.
    pub(crate) fn register_active_channel(&self, binding: Arc<ChannelBinding>) {
        let measurement_type = binding.measurement_type().to_string();
        let previous = self
            .channels
            .write()
            .insert(measurement_type.clone(), binding.clone());

        if let Some(previous) = previous {
            warn!(
                sensed = %self.sensed_id(),
                measurement_type = %measurement_type,
                replaced_sensor = %previous.sensor_id(),
                replaced_channel = %previous.channel_id(),
                sensor = %binding.sensor_id(),
                channel = %binding.channel_id(),
                "Measurement slot already bound, replacing"
            );
        }
    }

    /// Binding currently feeding a measurement type.
    pub fn channel_for(&self, measurement_type: &str) -> Option<Arc<ChannelBinding>> {
        self.channels.read().get(measurement_type).cloned()
    }

    pub fn active_channels(&self) -> Vec<Arc<ChannelBinding>> {
        self.channels.read().values().cloned().collect()
    }

    /// A channel feeding this entity received a value.
    pub fn value_update_received(
        &self,
        binding: &Arc<ChannelBinding>,
        value: MeasurementValue,
        received_at: Timestamp,
    ) {
        self.values.emit(SensedValueEvent {
            sensed_id: self.sensed_id().to_string(),
            binding: binding.clone(),
            value,
            received_at,
        });

        if tracing::enabled!(tracing::Level::DEBUG) {
            self.show_values();
        }
    }

    /// Current value per measurement type, sorted by type.
    pub fn show_values(&self) -> Vec<SensedValue> {
        let values: Vec<SensedValue> = self
            .channels
            .read()
            .iter()
            .map(|(measurement_type, binding)| SensedValue {
                measurement_type: measurement_type.clone(),
                measurement_unit: binding.channel_detail().measurement_unit.clone(),
                sensor_id: binding.sensor_id().to_string(),
                channel_id: binding.channel_id().to_string(),
                value: binding.current_value(),
            })
            .collect();

        for value in &values {
            debug!(
                sensed = %self.sensed_id(),
                measurement_type = %value.measurement_type,
                unit = %value.measurement_unit,
                value = ?value.value,
                "Sensed value"
            );
        }
        values
    }

    pub fn subscribe_values(&self) -> EventStream<SensedValueEvent> {
        self.values.subscribe()
    }

    pub fn snapshot(&self) -> SensedSnapshot {
        SensedSnapshot {
            sensed_id: self.sensed_id().to_string(),
            name: self.name().to_string(),
            kind: self.kind.to_string(),
            values: self.show_values(),
        }
    }

    pub(crate) fn close_events(&self) {
        self.values.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::description::{ChannelDetail, SensorDescription, SensorDetail};
    use crate::events::DEFAULT_EVENT_CAPACITY;
    use crate::sensor::SensorActiveModel;
    use chrono::{TimeZone, Utc};

    fn t(secs: i64) -> Timestamp {
        Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
    }

    fn sensor(id: &str) -> Arc<SensorActiveModel> {
        let detail = Arc::new(
            SensorDetail::new("dht22", "DHT22", "")
                .with_channel(ChannelDetail::new("temp", "Temperature", "", "temperature", "celsius"))
                .with_channel(ChannelDetail::new("hum", "Humidity", "", "humidity", "percent")),
        );
        let description = SensorDescription::new(id, id, "", detail, None, None);
        Arc::new(SensorActiveModel::new(Arc::new(description), t(0), DEFAULT_EVENT_CAPACITY))
    }

    fn location() -> Arc<SensedActiveModel> {
        Arc::new(SensedActiveModel::for_description(
            Arc::new(SensedEntityDescription::physical_location("bay", "Main bay", "")),
            DEFAULT_EVENT_CAPACITY,
        ))
    }

    fn bind(sensor: &Arc<SensorActiveModel>, channel: &str, sensed: &Arc<SensedActiveModel>) -> Arc<ChannelBinding> {
        let detail = sensor.description().detail().channel_detail(channel).unwrap().clone();
        ChannelBinding::bind(channel, detail, sensor, sensed)
    }

    #[test]
    fn test_kind_from_description() {
        let sensed = location();
        assert_eq!(sensed.kind(), SensedKind::PhysicalLocation);
        assert_eq!(sensed.kind().to_string(), "physical_location");
        assert_eq!(sensed.name(), "Main bay");
    }

    #[test]
    fn test_slots_by_measurement_type() {
        let sensor = sensor("s1");
        let sensed = location();
        let temp = bind(&sensor, "temp", &sensed);
        let hum = bind(&sensor, "hum", &sensed);

        assert!(Arc::ptr_eq(&sensed.channel_for("temperature").unwrap(), &temp));
        assert!(Arc::ptr_eq(&sensed.channel_for("humidity").unwrap(), &hum));
        assert!(sensed.channel_for("pressure").is_none());
    }

    #[test]
    fn test_last_writer_wins() {
        let first = sensor("s1");
        let second = sensor("s2");
        let sensed = location();
        bind(&first, "temp", &sensed);
        let winner = bind(&second, "temp", &sensed);

        assert!(Arc::ptr_eq(&sensed.channel_for("temperature").unwrap(), &winner));
        assert_eq!(sensed.active_channels().len(), 1);
    }

    #[test]
    fn test_show_values() {
        let sensor = sensor("s1");
        let sensed = location();
        let temp = bind(&sensor, "temp", &sensed);
        bind(&sensor, "hum", &sensed);

        temp.update_current_value(MeasurementValue::Number(19.5), t(2));

        let values = sensed.show_values();
        assert_eq!(values.len(), 2);
        assert_eq!(values[0].measurement_type, "humidity");
        assert!(values[0].value.is_none());
        assert_eq!(values[1].measurement_type, "temperature");
        assert_eq!(values[1].value, Some(MeasurementValue::Number(19.5)));
        assert_eq!(values[1].sensor_id, "s1");

        let snapshot = sensed.snapshot();
        assert_eq!(snapshot.kind, "physical_location");
        assert_eq!(snapshot.values.len(), 2);
    }

    #[test]
    fn test_value_event_and_close() {
        let sensor = sensor("s1");
        let sensed = location();
        let temp = bind(&sensor, "temp", &sensed);
        let mut stream = sensed.subscribe_values();

        temp.update_current_value(MeasurementValue::Number(18.0), t(1));
        let event = stream.try_recv().unwrap();
        assert_eq!(event.binding.measurement_type(), "temperature");
        assert_eq!(event.received_at, t(1));

        sensed.close_events();
        assert!(stream.is_terminated());
    }
}
