//! Static descriptions of sensors and the things they sense.
//!
//! Descriptions are loaded once at startup and never change afterwards,
//! apart from channel associations being attached to sensors during the
//! registry build phase.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::TimeDelta;

/// Convert a time limit in seconds into a [`TimeDelta`].
///
/// Returns `None` for values that cannot be a time limit (negative, NaN,
/// infinite), which disables the corresponding liveness check.
pub fn time_limit_from_secs(secs: f64) -> Option<TimeDelta> {
    if !secs.is_finite() || secs < 0.0 {
        return None;
    }
    TimeDelta::try_milliseconds((secs * 1000.0).round() as i64)
}

/// Convert a time limit back into seconds for display.
pub fn time_limit_secs(limit: TimeDelta) -> f64 {
    limit.num_milliseconds() as f64 / 1000.0
}

/// Detail of a single channel of a sensor type.
#[derive(Debug, Clone, PartialEq)]
pub struct ChannelDetail {
    pub external_id: String,
    pub name: String,
    pub description: String,
    /// What is measured, e.g. "temperature".
    pub measurement_type: String,
    /// Unit of the measurement, e.g. "celsius".
    pub measurement_unit: String,
}

impl ChannelDetail {
    pub fn new(
        external_id: impl Into<String>,
        name: impl Into<String>,
        description: impl Into<String>,
        measurement_type: impl Into<String>,
        measurement_unit: impl Into<String>,
    ) -> Self {
        Self {
            external_id: external_id.into(),
            name: name.into(),
            description: description.into(),
            measurement_type: measurement_type.into(),
            measurement_unit: measurement_unit.into(),
        }
    }
}

/// A type of sensor and all of its channels.
#[derive(Debug, Clone, PartialEq)]
pub struct SensorDetail {
    pub external_id: String,
    pub name: String,
    pub description: String,
    /// Channel external ID to channel detail.
    channels: BTreeMap<String, Arc<ChannelDetail>>,
    /// How long a sensor may go without a value update.
    update_time_limit: Option<TimeDelta>,
    /// How long a sensor may go without a heartbeat.
    heartbeat_time_limit: Option<TimeDelta>,
}

impl SensorDetail {
    pub fn new(
        external_id: impl Into<String>,
        name: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            external_id: external_id.into(),
            name: name.into(),
            description: description.into(),
            channels: BTreeMap::new(),
            update_time_limit: None,
            heartbeat_time_limit: None,
        }
    }

    /// Add a channel. A channel with the same ID is replaced.
    pub fn with_channel(mut self, channel: ChannelDetail) -> Self {
        self.channels
            .insert(channel.external_id.clone(), Arc::new(channel));
        self
    }

    /// Set the default value update time limit.
    pub fn with_update_time_limit(mut self, limit: Option<TimeDelta>) -> Self {
        self.update_time_limit = limit;
        self
    }

    /// Set the default heartbeat time limit.
    pub fn with_heartbeat_time_limit(mut self, limit: Option<TimeDelta>) -> Self {
        self.heartbeat_time_limit = limit;
        self
    }

    /// Get the detail for a specific channel.
    pub fn channel_detail(&self, channel_id: &str) -> Option<&Arc<ChannelDetail>> {
        self.channels.get(channel_id)
    }

    /// All channel IDs, in sorted order.
    pub fn channel_ids(&self) -> impl Iterator<Item = &str> {
        self.channels.keys().map(String::as_str)
    }

    pub fn channels(&self) -> impl Iterator<Item = &Arc<ChannelDetail>> {
        self.channels.values()
    }

    pub fn update_time_limit(&self) -> Option<TimeDelta> {
        self.update_time_limit
    }

    pub fn heartbeat_time_limit(&self) -> Option<TimeDelta> {
        self.heartbeat_time_limit
    }
}

/// A physical sensor installed somewhere.
#[derive(Debug, Clone, PartialEq)]
pub struct SensorDescription {
    pub external_id: String,
    pub name: String,
    pub description: String,
    detail: Arc<SensorDetail>,
    update_time_limit: Option<TimeDelta>,
    heartbeat_time_limit: Option<TimeDelta>,
    /// Channel ID to the external ID of the sensed entity it feeds.
    channel_associations: BTreeMap<String, String>,
}

impl SensorDescription {
    /// Create a sensor description.
    ///
    /// Time limits are resolved here, once: an explicit override wins,
    /// otherwise the value of the sensor detail is inherited.
    pub fn new(
        external_id: impl Into<String>,
        name: impl Into<String>,
        description: impl Into<String>,
        detail: Arc<SensorDetail>,
        update_time_limit: Option<TimeDelta>,
        heartbeat_time_limit: Option<TimeDelta>,
    ) -> Self {
        Self {
            external_id: external_id.into(),
            name: name.into(),
            description: description.into(),
            update_time_limit: update_time_limit.or(detail.update_time_limit()),
            heartbeat_time_limit: heartbeat_time_limit.or(detail.heartbeat_time_limit()),
            detail,
            channel_associations: BTreeMap::new(),
        }
    }

    pub fn detail(&self) -> &Arc<SensorDetail> {
        &self.detail
    }

    /// Effective value update time limit.
    pub fn update_time_limit(&self) -> Option<TimeDelta> {
        self.update_time_limit
    }

    /// Effective heartbeat time limit.
    pub fn heartbeat_time_limit(&self) -> Option<TimeDelta> {
        self.heartbeat_time_limit
    }

    /// Associate a channel with the sensed entity it measures.
    pub fn add_channel_association(&mut self, channel_id: impl Into<String>, sensed_id: impl Into<String>) {
        self.channel_associations
            .insert(channel_id.into(), sensed_id.into());
    }

    /// Channel ID to sensed entity ID, in channel order.
    pub fn channel_associations(&self) -> impl Iterator<Item = (&str, &str)> {
        self.channel_associations
            .iter()
            .map(|(channel, sensed)| (channel.as_str(), sensed.as_str()))
    }
}

/// Something that sensors measure.
#[derive(Debug, Clone, PartialEq)]
pub enum SensedEntityDescription {
    /// A room, bay or other area of the space.
    PhysicalLocation(PhysicalLocationDescription),
}

impl SensedEntityDescription {
    pub fn physical_location(
        external_id: impl Into<String>,
        name: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        SensedEntityDescription::PhysicalLocation(PhysicalLocationDescription {
            external_id: external_id.into(),
            name: name.into(),
            description: description.into(),
        })
    }

    pub fn external_id(&self) -> &str {
        match self {
            SensedEntityDescription::PhysicalLocation(p) => &p.external_id,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            SensedEntityDescription::PhysicalLocation(p) => &p.name,
        }
    }

    pub fn description(&self) -> &str {
        match self {
            SensedEntityDescription::PhysicalLocation(p) => &p.description,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PhysicalLocationDescription {
    pub external_id: String,
    pub name: String,
    pub description: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn detail() -> Arc<SensorDetail> {
        Arc::new(
            SensorDetail::new("esp8266.dht22", "DHT22 node", "")
                .with_channel(ChannelDetail::new("temperature", "Temp", "", "temperature", "celsius"))
                .with_channel(ChannelDetail::new("humidity", "Hum", "", "humidity", "percent"))
                .with_update_time_limit(time_limit_from_secs(60.0))
                .with_heartbeat_time_limit(time_limit_from_secs(30.0)),
        )
    }

    #[test]
    fn test_time_limit_from_secs() {
        assert_eq!(time_limit_from_secs(60.0), Some(TimeDelta::seconds(60)));
        assert_eq!(time_limit_from_secs(0.5), Some(TimeDelta::milliseconds(500)));
        assert_eq!(time_limit_from_secs(0.0), Some(TimeDelta::zero()));
        assert_eq!(time_limit_from_secs(-1.0), None);
        assert_eq!(time_limit_from_secs(f64::NAN), None);
        assert_eq!(time_limit_from_secs(f64::INFINITY), None);
        assert_eq!(time_limit_secs(TimeDelta::milliseconds(1500)), 1.5);
    }

    #[test]
    fn test_time_limits_inherited() {
        let sensor = SensorDescription::new("s1", "Sensor 1", "", detail(), None, None);
        assert_eq!(sensor.update_time_limit(), Some(TimeDelta::seconds(60)));
        assert_eq!(sensor.heartbeat_time_limit(), Some(TimeDelta::seconds(30)));
    }

    #[test]
    fn test_time_limits_overridden() {
        let sensor = SensorDescription::new(
            "s1",
            "Sensor 1",
            "",
            detail(),
            Some(TimeDelta::seconds(120)),
            None,
        );
        assert_eq!(sensor.update_time_limit(), Some(TimeDelta::seconds(120)));
        assert_eq!(sensor.heartbeat_time_limit(), Some(TimeDelta::seconds(30)));
    }

    #[test]
    fn test_channel_lookup() {
        let detail = detail();
        assert_eq!(
            detail.channel_ids().collect::<Vec<_>>(),
            vec!["humidity", "temperature"]
        );
        assert_eq!(
            detail.channel_detail("temperature").unwrap().measurement_unit,
            "celsius"
        );
        assert!(detail.channel_detail("pressure").is_none());
    }

    #[test]
    fn test_sensed_accessors() {
        let sensed = SensedEntityDescription::physical_location("bay.main", "Main bay", "The big room");
        assert_eq!(sensed.external_id(), "bay.main");
        assert_eq!(sensed.name(), "Main bay");
        assert_eq!(sensed.description(), "The big room");
    }
}
