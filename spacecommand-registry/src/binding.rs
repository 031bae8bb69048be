//! The edge between a sensor channel and a sensed entity.

use std::fmt;
use std::sync::{Arc, Weak};

use parking_lot::RwLock;
use spacecommand_common::{ChannelSnapshot, MeasurementValue, Timestamp};

use crate::description::ChannelDetail;
use crate::sensed::SensedActiveModel;
use crate::sensor::SensorActiveModel;

/// Links one channel of a sensor to the measurement slot of a sensed entity
/// and holds the latest value seen on it.
///
/// Both endpoints are held weakly; the registry owns the active models and a
/// binding never outlives them in practice.
pub struct ChannelBinding {
    channel_id: String,
    channel_detail: Arc<ChannelDetail>,
    sensor_id: String,
    sensed_id: String,
    sensor: Weak<SensorActiveModel>,
    sensed: Weak<SensedActiveModel>,
    current_value: RwLock<Option<MeasurementValue>>,
}

impl ChannelBinding {
    /// Create a binding and register it with both of its endpoints.
    ///
    /// Only the registry builds the graph, while preparing runtime models.
    pub(crate) fn bind(
        channel_id: impl Into<String>,
        channel_detail: Arc<ChannelDetail>,
        sensor: &Arc<SensorActiveModel>,
        sensed: &Arc<SensedActiveModel>,
    ) -> Arc<Self> {
        let binding = Arc::new(Self {
            channel_id: channel_id.into(),
            channel_detail,
            sensor_id: sensor.sensor_id().to_string(),
            sensed_id: sensed.sensed_id().to_string(),
            sensor: Arc::downgrade(sensor),
            sensed: Arc::downgrade(sensed),
            current_value: RwLock::new(None),
        });

        sensor.register_active_channel(binding.clone());
        sensed.register_active_channel(binding.clone());
        binding
    }

    pub fn channel_id(&self) -> &str {
        &self.channel_id
    }

    pub fn channel_detail(&self) -> &Arc<ChannelDetail> {
        &self.channel_detail
    }

    pub fn measurement_type(&self) -> &str {
        &self.channel_detail.measurement_type
    }

    pub fn sensor_id(&self) -> &str {
        &self.sensor_id
    }

    pub fn sensed_id(&self) -> &str {
        &self.sensed_id
    }

    /// The owning sensor model, if the registry is still alive.
    pub fn sensor(&self) -> Option<Arc<SensorActiveModel>> {
        self.sensor.upgrade()
    }

    /// The target sensed model, if the registry is still alive.
    pub fn sensed(&self) -> Option<Arc<SensedActiveModel>> {
        self.sensed.upgrade()
    }

    /// Latest value received on this channel.
    pub fn current_value(&self) -> Option<MeasurementValue> {
        self.current_value.read().clone()
    }

    /// Apply a new value to this channel.
    ///
    /// The value is written under the owning sensor's lock together with the
    /// liveness update, after which both endpoints emit their value events.
    /// Returns `false` if the owning sensor no longer exists.
    pub fn update_current_value(self: &Arc<Self>, value: MeasurementValue, received_at: Timestamp) -> bool {
        match self.sensor() {
            Some(sensor) => {
                sensor.value_update_received(self, value, received_at);
                true
            }
            None => false,
        }
    }

    pub(crate) fn store_value(&self, value: MeasurementValue) {
        *self.current_value.write() = Some(value);
    }

    pub fn snapshot(&self) -> ChannelSnapshot {
        ChannelSnapshot {
            channel_id: self.channel_id.clone(),
            name: self.channel_detail.name.clone(),
            measurement_type: self.channel_detail.measurement_type.clone(),
            measurement_unit: self.channel_detail.measurement_unit.clone(),
            sensed_id: self.sensed_id.clone(),
            current_value: self.current_value(),
        }
    }
}

impl fmt::Debug for ChannelBinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChannelBinding")
            .field("channel_id", &self.channel_id)
            .field("sensor_id", &self.sensor_id)
            .field("sensed_id", &self.sensed_id)
            .field("measurement_type", &self.channel_detail.measurement_type)
            .field("current_value", &*self.current_value.read())
            .finish()
    }
}
