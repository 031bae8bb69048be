//! Snapshot types for status pages and dashboards.
//!
//! These are plain serializable copies of the live registry state so a
//! consumer can render them without holding any lock on the active models.

use serde::{Deserialize, Serialize};

use crate::message::{MeasurementValue, Timestamp};

/// Sensor availability status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SensorStatus {
    /// The sensor has reported within its time limit.
    Online,
    /// The sensor has not proven itself yet, or has timed out.
    #[default]
    Offline,
}

impl SensorStatus {
    /// Build a status from an online flag.
    pub fn from_online(online: bool) -> Self {
        if online {
            SensorStatus::Online
        } else {
            SensorStatus::Offline
        }
    }
}

impl std::fmt::Display for SensorStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SensorStatus::Online => write!(f, "online"),
            SensorStatus::Offline => write!(f, "offline"),
        }
    }
}

/// Point-in-time view of one sensor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SensorSnapshot {
    /// Sensor external ID.
    pub sensor_id: String,
    /// Human readable name.
    pub name: String,
    /// Current status.
    pub status: SensorStatus,
    /// Whether the offline notification for this episode has been sent.
    pub offline_signaled: bool,
    /// Last time a value update was received.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_value_time: Option<Timestamp>,
    /// Last time a heartbeat was received.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_heartbeat_time: Option<Timestamp>,
    /// Value time limit in seconds, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub update_time_limit_secs: Option<f64>,
    /// Heartbeat time limit in seconds, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub heartbeat_time_limit_secs: Option<f64>,
    /// Bound channels, sorted by channel ID.
    pub channels: Vec<ChannelSnapshot>,
}

/// Point-in-time view of one channel binding.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelSnapshot {
    /// Channel external ID.
    pub channel_id: String,
    /// Channel name.
    pub name: String,
    /// What is measured, e.g. "temperature".
    pub measurement_type: String,
    /// Unit of the measurement, e.g. "celsius".
    pub measurement_unit: String,
    /// Sensed entity fed by this channel.
    pub sensed_id: String,
    /// Latest value, if one has been received.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_value: Option<MeasurementValue>,
}

/// Point-in-time view of a sensed entity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SensedSnapshot {
    /// Sensed entity external ID.
    pub sensed_id: String,
    /// Human readable name.
    pub name: String,
    /// Kind of sensed entity, e.g. "physical_location".
    pub kind: String,
    /// Current value per measurement type, sorted by type.
    pub values: Vec<SensedValue>,
}

/// Current value of one measurement type at a sensed entity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SensedValue {
    pub measurement_type: String,
    pub measurement_unit: String,
    /// Sensor feeding this slot.
    pub sensor_id: String,
    pub channel_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<MeasurementValue>,
}

/// Counts over the whole registry.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistrySummary {
    pub sensors_total: u64,
    pub sensors_online: u64,
    pub sensors_offline: u64,
    pub sensed_total: u64,
    pub channel_bindings: u64,
}

/// Serializable form of a measurement applied to a channel binding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MeasurementRecord {
    pub sensor_id: String,
    pub sensed_id: String,
    pub channel_id: String,
    pub measurement_type: String,
    pub measurement_unit: String,
    pub value: MeasurementValue,
    pub received_at: Timestamp,
}

/// Serializable form of a sensor going offline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OfflineRecord {
    pub sensor_id: String,
    pub name: String,
    /// Time of the sweep that detected the timeout.
    pub detected_at: Timestamp,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_value_time: Option<Timestamp>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_heartbeat_time: Option<Timestamp>,
}
