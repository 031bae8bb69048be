//! Integration tests for spacecommand-common library.

use std::io::Write;

use serde::Deserialize;
use spacecommand_common::{
    Format, KeyExprBuilder, LogFormat, LoggingConfig, MeasurementValue, SensorMessage,
    SensorStatus, ZenohConfig, ZenohMode, decode_auto, decode_message, encode, load_config,
};

#[test]
fn test_sensor_message_workflow() {
    let message = SensorMessage::measurement("sensor.esp8266.FE13DE")
        .with_value("temperature", 21.5)
        .with_value("door", true)
        .with_value("note", "ok");

    let json_bytes = encode(&message, Format::Json).expect("JSON encode failed");
    let cbor_bytes = encode(&message, Format::Cbor).expect("CBOR encode failed");
    assert!(cbor_bytes.len() < json_bytes.len());

    let from_json = decode_message(&json_bytes).expect("JSON decode failed");
    let from_cbor = decode_message(&cbor_bytes).expect("CBOR decode failed");
    assert_eq!(from_json, message);
    assert_eq!(from_cbor, message);

    let SensorMessage::Measurement(measurement) = from_cbor else {
        panic!("expected a measurement");
    };
    assert_eq!(measurement.data["temperature"].value, Some(MeasurementValue::Number(21.5)));
    assert_eq!(measurement.data["door"].value, Some(MeasurementValue::Boolean(true)));
    assert_eq!(measurement.data["note"].value, Some(MeasurementValue::Text("ok".into())));
}

#[test]
fn test_node_payload_compatibility() {
    // As sent by the ESP8266 firmware.
    let payload = br#"
        {
            "messageType": "measurement",
            "sensorId": "sensor.esp8266.FE13DE",
            "data": {
                "temperature": { "value": 22 },
                "humidity": { "value": 41.3 }
            }
        }"#;

    let message = decode_message(payload).expect("decode failed");
    assert_eq!(message.kind(), "measurement");
    assert_eq!(message.sensor_id(), "sensor.esp8266.FE13DE");

    let heartbeat: SensorMessage =
        decode_auto(br#"{"messageType":"heartbeat","sensorId":"sensor.esp8266.FE13DE"}"#)
            .expect("decode failed");
    assert_eq!(heartbeat, SensorMessage::heartbeat("sensor.esp8266.FE13DE"));
}

#[test]
fn test_key_expressions_round_trip() {
    let keys = KeyExprBuilder::new();
    let key = keys.sensor_key("sensor.esp8266.FE13DE");
    assert_eq!(keys.parse_sensor_key(&key), Some("sensor.esp8266.FE13DE"));
    assert_eq!(keys.parse_sensor_key("spacecommand/events/offline/x"), None);

    let custom = KeyExprBuilder::with_prefix("lab/");
    assert_eq!(custom.sensor_key("s1"), "lab/sensors/s1");
    assert_eq!(custom.offline_event_key("s1"), "lab/events/offline/s1");
    assert_eq!(custom.sensor_status_key("s1"), "lab/@/sensors/s1/status");
}

#[derive(Debug, Deserialize)]
struct FileConfig {
    #[serde(default)]
    zenoh: ZenohConfig,
    #[serde(default)]
    logging: LoggingConfig,
}

#[test]
fn test_load_config_from_file() {
    let mut file = tempfile::NamedTempFile::new().expect("temp file");
    writeln!(
        file,
        r#"{{
            // Peer with a local router
            zenoh: {{ mode: "client", connect: ["tcp/localhost:7447"] }},
            logging: {{ level: "debug", format: "json" }},
        }}"#
    )
    .expect("write failed");

    let config: FileConfig = load_config(file.path()).expect("load failed");
    assert_eq!(config.zenoh.mode, ZenohMode::Client);
    assert_eq!(config.zenoh.connect, vec!["tcp/localhost:7447".to_string()]);
    assert_eq!(config.logging.level, "debug");
    assert_eq!(config.logging.format, LogFormat::Json);

    let overridden = config.logging.with_level_override(Some("trace"));
    assert_eq!(overridden.level, "trace");
    assert_eq!(overridden.format, LogFormat::Json);
}

#[test]
fn test_load_config_missing_file() {
    let result: spacecommand_common::Result<FileConfig> = load_config("/nonexistent/spacecommand.json5");
    assert!(matches!(result, Err(spacecommand_common::Error::Config(_))));
}

#[test]
fn test_status_serialization() {
    let json = serde_json::to_string(&SensorStatus::Online).expect("serialize failed");
    assert_eq!(json, "\"online\"");
}
