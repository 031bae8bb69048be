//! Runtime model of one sensor.

use std::collections::BTreeMap;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use spacecommand_common::{MeasurementValue, SensorSnapshot, SensorStatus, Timestamp};
use tracing::{debug, info, warn};

use crate::binding::ChannelBinding;
use crate::description::{SensorDescription, time_limit_secs};
use crate::events::{EventChannel, EventStream, SensorOfflineEvent, SensorValueEvent};
use crate::liveness::Liveness;

/// Live state of a sensor: its channel bindings and liveness.
///
/// All liveness mutations and channel value writes for one sensor are
/// serialized by a per-sensor lock. Different sensors never contend.
#[derive(Debug)]
pub struct SensorActiveModel {
    description: Arc<SensorDescription>,
    liveness: Mutex<Liveness>,
    /// Channel ID to binding. Written only while the registry is built.
    channels: RwLock<BTreeMap<String, Arc<ChannelBinding>>>,
    values: EventChannel<SensorValueEvent>,
    offline: EventChannel<SensorOfflineEvent>,
}

impl SensorActiveModel {
    /// Create a sensor with no bindings, offline since `created_at`.
    pub fn new(description: Arc<SensorDescription>, created_at: Timestamp, event_capacity: usize) -> Self {
        let liveness = Liveness::new(
            created_at,
            description.update_time_limit(),
            description.heartbeat_time_limit(),
        );
        Self {
            description,
            liveness: Mutex::new(liveness),
            channels: RwLock::new(BTreeMap::new()),
            values: EventChannel::new("sensor_value", event_capacity),
            offline: EventChannel::new("sensor_offline", event_capacity),
        }
    }

    /// External ID from the catalog.
    pub fn sensor_id(&self) -> &str {
        &self.description.external_id
    }

    /// Display name.
    pub fn name(&self) -> &str {
        &self.description.name
    }

    /// Catalog description the model was built from.
    pub fn description(&self) -> &Arc<SensorDescription> {
        &self.description
    }

    pub(crate) fn register_active_channel(&self, binding: Arc<ChannelBinding>) {
        self.channels
            .write()
            .insert(binding.channel_id().to_string(), binding);
    }

    /// Binding for a channel of this sensor.
    pub fn active_channel(&self, channel_id: &str) -> Option<Arc<ChannelBinding>> {
        self.channels.read().get(channel_id).cloned()
    }

    /// All bindings, sorted by channel ID.
    pub fn active_channels(&self) -> Vec<Arc<ChannelBinding>> {
        self.channels.read().values().cloned().collect()
    }

    /// A value arrived on one of this sensor's channels.
    ///
    /// Marks the sensor online and clears any offline signal, then notifies
    /// observers and the sensed entity the channel feeds.
    pub fn value_update_received(
        &self,
        binding: &Arc<ChannelBinding>,
        value: MeasurementValue,
        received_at: Timestamp,
    ) {
        let was_online = {
            let mut liveness = self.liveness.lock();
            let was_online = liveness.is_online();
            binding.store_value(value.clone());
            liveness.record_value(received_at);
            was_online
        };

        if !was_online {
            info!(sensor = %self.sensor_id(), at = %received_at, "Sensor online");
        }

        self.values.emit(SensorValueEvent {
            sensor_id: self.sensor_id().to_string(),
            binding: binding.clone(),
            value: value.clone(),
            received_at,
        });

        if let Some(sensed) = binding.sensed() {
            sensed.value_update_received(binding, value, received_at);
        }
    }

    /// A heartbeat arrived for this sensor.
    pub fn heartbeat_received(&self, received_at: Timestamp) {
        let was_online = {
            let mut liveness = self.liveness.lock();
            let was_online = liveness.is_online();
            liveness.record_heartbeat(received_at);
            was_online
        };

        if was_online {
            debug!(sensor = %self.sensor_id(), at = %received_at, "Heartbeat");
        } else {
            info!(sensor = %self.sensor_id(), at = %received_at, "Sensor online from heartbeat");
        }
    }

    /// Run the liveness check as of `now`.
    ///
    /// Returns `true` when this call signaled the sensor offline.
    pub fn check_offline_transition(&self, now: Timestamp) -> bool {
        let event = {
            let mut liveness = self.liveness.lock();
            if !liveness.check_offline_transition(now) {
                return false;
            }
            SensorOfflineEvent {
                sensor_id: self.sensor_id().to_string(),
                name: self.name().to_string(),
                detected_at: now,
                last_value_time: liveness.last_value_time(),
                last_heartbeat_time: liveness.last_heartbeat_time(),
            }
        };

        warn!(sensor = %event.sensor_id, name = %event.name, at = %now, "Sensor offline");
        self.offline.emit(event);
        true
    }

    /// Whether a value or heartbeat arrived within the time limits.
    pub fn is_online(&self) -> bool {
        self.liveness.lock().is_online()
    }

    /// [`SensorStatus`] form of [`Self::is_online`].
    pub fn status(&self) -> SensorStatus {
        SensorStatus::from_online(self.is_online())
    }

    /// Whether an offline event was emitted since the sensor was last online.
    pub fn offline_signaled(&self) -> bool {
        self.liveness.lock().offline_signaled()
    }

    /// When the latest channel value arrived.
    pub fn last_value_time(&self) -> Option<Timestamp> {
        self.liveness.lock().last_value_time()
    }

    /// When the latest heartbeat arrived.
    pub fn last_heartbeat_time(&self) -> Option<Timestamp> {
        self.liveness.lock().last_heartbeat_time()
    }

    /// When the runtime models were prepared.
    pub fn created_at(&self) -> Timestamp {
        self.liveness.lock().created_at()
    }

    /// Observe every value applied to one of this sensor's channels.
    pub fn subscribe_values(&self) -> EventStream<SensorValueEvent> {
        self.values.subscribe()
    }

    /// Observe offline transitions. At most one event per offline period.
    pub fn subscribe_offline(&self) -> EventStream<SensorOfflineEvent> {
        self.offline.subscribe()
    }

    /// Consistent copy of the sensor state.
    pub fn snapshot(&self) -> SensorSnapshot {
        let liveness = self.liveness.lock().clone();
        let channels = self
            .active_channels()
            .iter()
            .map(|binding| binding.snapshot())
            .collect();

        SensorSnapshot {
            sensor_id: self.sensor_id().to_string(),
            name: self.name().to_string(),
            status: SensorStatus::from_online(liveness.is_online()),
            offline_signaled: liveness.offline_signaled(),
            last_value_time: liveness.last_value_time(),
            last_heartbeat_time: liveness.last_heartbeat_time(),
            update_time_limit_secs: liveness.update_time_limit().map(time_limit_secs),
            heartbeat_time_limit_secs: liveness.heartbeat_time_limit().map(time_limit_secs),
            channels,
        }
    }

    pub(crate) fn close_events(&self) {
        self.values.close();
        self.offline.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::description::{ChannelDetail, SensedEntityDescription, SensorDetail};
    use crate::events::DEFAULT_EVENT_CAPACITY;
    use crate::sensed::SensedActiveModel;
    use chrono::{TimeDelta, TimeZone, Utc};

    fn t(secs: i64) -> Timestamp {
        Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
    }

    fn sensor(update: Option<i64>, heartbeat: Option<i64>) -> Arc<SensorActiveModel> {
        let detail = Arc::new(
            SensorDetail::new("dht22", "DHT22", "")
                .with_channel(ChannelDetail::new("temperature", "Temperature", "", "temperature", "celsius"))
                .with_channel(ChannelDetail::new("humidity", "Humidity", "", "humidity", "percent"))
                .with_update_time_limit(update.map(TimeDelta::seconds))
                .with_heartbeat_time_limit(heartbeat.map(TimeDelta::seconds)),
        );
        let description = SensorDescription::new("s1", "Sensor 1", "", detail, None, None);
        Arc::new(SensorActiveModel::new(Arc::new(description), t(0), DEFAULT_EVENT_CAPACITY))
    }

    fn bind_all(sensor: &Arc<SensorActiveModel>) -> Arc<SensedActiveModel> {
        let sensed = Arc::new(SensedActiveModel::for_description(
            Arc::new(SensedEntityDescription::physical_location("bay", "Bay", "")),
            DEFAULT_EVENT_CAPACITY,
        ));
        let detail = sensor.description().detail().clone();
        for channel in detail.channels() {
            ChannelBinding::bind(channel.external_id.clone(), channel.clone(), sensor, &sensed);
        }
        sensed
    }

    #[test]
    fn test_offline_scenario() {
        let sensor = sensor(Some(60), None);
        let _sensed = bind_all(&sensor);
        let mut offline = sensor.subscribe_offline();

        assert!(!sensor.is_online());
        assert!(sensor.check_offline_transition(t(61)));
        assert!(!sensor.check_offline_transition(t(120)));

        let event = offline.try_recv().unwrap();
        assert_eq!(event.sensor_id, "s1");
        assert_eq!(event.detected_at, t(61));
        assert!(event.last_value_time.is_none());
        assert!(offline.try_recv().is_none());

        let binding = sensor.active_channel("temperature").unwrap();
        binding.update_current_value(MeasurementValue::Number(20.0), t(130));
        assert!(sensor.is_online());
        assert!(!sensor.offline_signaled());
        assert_eq!(sensor.last_value_time(), Some(t(130)));
    }

    #[test]
    fn test_value_event_emitted() {
        let sensor = sensor(Some(60), None);
        let sensed = bind_all(&sensor);
        let mut values = sensor.subscribe_values();
        let mut sensed_values = sensed.subscribe_values();

        let binding = sensor.active_channel("humidity").unwrap();
        binding.update_current_value(MeasurementValue::Number(40.0), t(3));

        let event = values.try_recv().unwrap();
        assert_eq!(event.binding.channel_id(), "humidity");
        assert_eq!(event.value, MeasurementValue::Number(40.0));
        assert_eq!(event.received_at, t(3));

        let event = sensed_values.try_recv().unwrap();
        assert_eq!(event.sensed_id, "bay");
    }

    #[test]
    fn test_heartbeat_only_updates_liveness() {
        let sensor = sensor(None, Some(30));
        let _sensed = bind_all(&sensor);
        let mut values = sensor.subscribe_values();

        sensor.heartbeat_received(t(10));
        assert!(sensor.is_online());
        assert_eq!(sensor.last_heartbeat_time(), Some(t(10)));
        assert!(sensor.last_value_time().is_none());
        assert!(values.try_recv().is_none());
        assert!(sensor.active_channels().iter().all(|b| b.current_value().is_none()));

        assert!(!sensor.check_offline_transition(t(40)));
        assert!(sensor.check_offline_transition(t(41)));
    }

    #[test]
    fn test_snapshot() {
        let sensor = sensor(Some(60), Some(30));
        let _sensed = bind_all(&sensor);
        sensor
            .active_channel("temperature")
            .unwrap()
            .update_current_value(MeasurementValue::Number(21.0), t(1));

        let snapshot = sensor.snapshot();
        assert_eq!(snapshot.status, SensorStatus::Online);
        assert_eq!(snapshot.update_time_limit_secs, Some(60.0));
        assert_eq!(snapshot.heartbeat_time_limit_secs, Some(30.0));
        assert_eq!(snapshot.channels.len(), 2);
        assert_eq!(snapshot.channels[0].channel_id, "humidity");
        assert!(snapshot.channels[0].current_value.is_none());
        assert_eq!(snapshot.channels[1].current_value, Some(MeasurementValue::Number(21.0)));
    }

    #[test]
    fn test_close_events_terminates_streams() {
        let sensor = sensor(Some(60), None);
        let mut values = sensor.subscribe_values();
        let mut offline = sensor.subscribe_offline();

        sensor.close_events();
        assert!(values.is_terminated());
        assert!(offline.is_terminated());
    }
}
