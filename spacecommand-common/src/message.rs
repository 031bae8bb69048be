use chrono::{DateTime, Utc};
use serde::de::IgnoredAny;
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;

/// Wall-clock instant used for every receive time and liveness reference.
pub type Timestamp = DateTime<Utc>;

/// Message sent by a sensor node.
///
/// On the wire this is an object discriminated by `messageType`:
///
/// ```json
/// {"messageType": "measurement", "sensorId": "sensor.esp8266.FE13DE",
///  "data": {"temperature": {"value": 21.5}}}
/// {"messageType": "heartbeat", "sensorId": "sensor.esp8266.FE13DE"}
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "messageType", rename_all = "lowercase")]
pub enum SensorMessage {
    /// One or more channel values.
    Measurement(MeasurementMessage),
    /// The node is alive but has nothing new to report.
    Heartbeat(HeartbeatMessage),
}

impl SensorMessage {
    /// Create a measurement message with no channel data yet.
    pub fn measurement(sensor_id: impl Into<String>) -> Self {
        SensorMessage::Measurement(MeasurementMessage {
            sensor_id: sensor_id.into(),
            data: BTreeMap::new(),
        })
    }

    /// Create a heartbeat message.
    pub fn heartbeat(sensor_id: impl Into<String>) -> Self {
        SensorMessage::Heartbeat(HeartbeatMessage {
            sensor_id: sensor_id.into(),
        })
    }

    /// Add a channel value. Has no effect on heartbeats.
    pub fn with_value(mut self, channel_id: impl Into<String>, value: impl Into<MeasurementValue>) -> Self {
        if let SensorMessage::Measurement(ref mut measurement) = self {
            measurement.data.insert(
                channel_id.into(),
                ChannelData {
                    value: Some(value.into()),
                },
            );
        }
        self
    }

    /// The ID of the sensor that sent the message.
    pub fn sensor_id(&self) -> &str {
        match self {
            SensorMessage::Measurement(m) => &m.sensor_id,
            SensorMessage::Heartbeat(h) => &h.sensor_id,
        }
    }

    /// The message type as it appears on the wire.
    pub fn kind(&self) -> &'static str {
        match self {
            SensorMessage::Measurement(_) => "measurement",
            SensorMessage::Heartbeat(_) => "heartbeat",
        }
    }
}

/// Body of a measurement message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MeasurementMessage {
    pub sensor_id: String,

    /// Channel ID to the data for that channel.
    pub data: BTreeMap<String, ChannelData>,
}

/// Body of a heartbeat message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HeartbeatMessage {
    pub sensor_id: String,
}

/// Data reported for a single channel.
///
/// A value that is missing, `null`, or not a boolean, number or string
/// decodes as `None` so one bad channel does not reject the whole message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelData {
    #[serde(default, deserialize_with = "lenient_value")]
    pub value: Option<MeasurementValue>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum LenientValue {
    Usable(MeasurementValue),
    Unusable(IgnoredAny),
}

fn lenient_value<'de, D>(deserializer: D) -> Result<Option<MeasurementValue>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match LenientValue::deserialize(deserializer)? {
        LenientValue::Usable(value) => Some(value),
        LenientValue::Unusable(_) => None,
    })
}

/// A measured value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MeasurementValue {
    /// Boolean reading, e.g. a door contact.
    Boolean(bool),

    /// Numeric reading, e.g. a temperature.
    Number(f64),

    /// Free-form text reading.
    Text(String),
}

impl MeasurementValue {
    /// Numeric view of the value, if it has one.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            MeasurementValue::Number(v) => Some(*v),
            MeasurementValue::Boolean(b) => Some(if *b { 1.0 } else { 0.0 }),
            MeasurementValue::Text(_) => None,
        }
    }
}

impl std::fmt::Display for MeasurementValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MeasurementValue::Boolean(b) => write!(f, "{}", b),
            MeasurementValue::Number(v) => write!(f, "{}", v),
            MeasurementValue::Text(s) => write!(f, "{}", s),
        }
    }
}

impl From<f64> for MeasurementValue {
    fn from(v: f64) -> Self {
        MeasurementValue::Number(v)
    }
}

impl From<i64> for MeasurementValue {
    fn from(v: i64) -> Self {
        MeasurementValue::Number(v as f64)
    }
}

impl From<bool> for MeasurementValue {
    fn from(v: bool) -> Self {
        MeasurementValue::Boolean(v)
    }
}

impl From<String> for MeasurementValue {
    fn from(v: String) -> Self {
        MeasurementValue::Text(v)
    }
}

impl From<&str> for MeasurementValue {
    fn from(v: &str) -> Self {
        MeasurementValue::Text(v.to_string())
    }
}

/// Get the current wall-clock time.
pub fn current_timestamp() -> Timestamp {
    Utc::now()
}
