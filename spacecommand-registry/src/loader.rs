//! Catalog loading.
//!
//! The catalog is a JSON5 document with four sections, applied in order:
//! `sensorDetails`, `sensors`, `physicalLocations`, `sensorAssociations`.
//! Problems with single entries are collected in a [`LoadReport`] and the
//! entry is skipped; only an unreadable or unparsable document fails the
//! whole load.

use std::collections::HashSet;
use std::fmt;
use std::path::Path;

use chrono::TimeDelta;
use serde::Deserialize;
use serde_json::Value;
use tracing::{info, warn};

use crate::description::{
    ChannelDetail, SensedEntityDescription, SensorDescription, SensorDetail, time_limit_from_secs,
};
use crate::error::CatalogError;
use crate::registry::EntityRegistry;

/// Token meaning "every channel of the sensor detail".
pub const CHANNEL_IDS_WILDCARD: &str = "*";

/// Separator for explicit channel ID lists.
pub const CHANNEL_IDS_SEPARATOR: char = ':';

/// Serde model of a catalog document.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CatalogDocument {
    pub sensor_details: Vec<SensorDetailEntry>,
    pub sensors: Vec<SensorEntry>,
    pub physical_locations: Vec<PhysicalLocationEntry>,
    pub sensor_associations: Vec<SensorAssociationEntry>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SensorDetailEntry {
    pub external_id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub sensor_update_time_limit: Option<Value>,
    #[serde(default)]
    pub sensor_heartbeat_time_limit: Option<Value>,
    #[serde(default)]
    pub channels: Vec<ChannelEntry>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelEntry {
    pub external_id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub measurement_type: String,
    pub measurement_unit: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SensorEntry {
    pub external_id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub sensor_detail: String,
    #[serde(default)]
    pub sensor_update_time_limit: Option<Value>,
    #[serde(default)]
    pub sensor_heartbeat_time_limit: Option<Value>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PhysicalLocationEntry {
    pub external_id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SensorAssociationEntry {
    pub sensor_id: String,
    pub sensed_id: String,
    /// `*` or a `:`-separated list. Missing means `*`.
    #[serde(default)]
    pub channel_ids: Option<String>,
}

/// Which channels of a sensor an association covers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelSelection {
    All,
    Explicit(Vec<String>),
}

impl ChannelSelection {
    pub fn parse(field: Option<&str>) -> Self {
        match field.map(str::trim) {
            None | Some(CHANNEL_IDS_WILDCARD) => ChannelSelection::All,
            Some(list) => ChannelSelection::Explicit(
                list.split(CHANNEL_IDS_SEPARATOR)
                    .map(str::trim)
                    .filter(|id| !id.is_empty())
                    .map(str::to_string)
                    .collect(),
            ),
        }
    }
}

/// Why a catalog entry was skipped or adjusted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadIssueKind {
    UnknownSensorDetail,
    UnknownSensor,
    UnknownSensedEntity,
    UnknownChannel,
    DuplicateId,
    InvalidTimeLimit,
}

impl fmt::Display for LoadIssueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            LoadIssueKind::UnknownSensorDetail => "unknown sensor detail",
            LoadIssueKind::UnknownSensor => "unknown sensor",
            LoadIssueKind::UnknownSensedEntity => "unknown sensed entity",
            LoadIssueKind::UnknownChannel => "unknown channel",
            LoadIssueKind::DuplicateId => "duplicate id",
            LoadIssueKind::InvalidTimeLimit => "invalid time limit",
        };
        f.write_str(s)
    }
}

/// One problem found while applying a catalog.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadIssue {
    pub kind: LoadIssueKind,
    /// Catalog section the entry came from.
    pub section: &'static str,
    /// ID of the offending entry.
    pub entity_id: String,
    pub message: String,
}

impl fmt::Display for LoadIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} '{}': {} ({})", self.section, self.entity_id, self.message, self.kind)
    }
}

/// Outcome of applying a catalog.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoadReport {
    pub sensor_details: usize,
    pub sensors: usize,
    pub sensed_entities: usize,
    /// Channel associations registered, counted per channel.
    pub channel_associations: usize,
    pub issues: Vec<LoadIssue>,
}

impl LoadReport {
    pub fn is_clean(&self) -> bool {
        self.issues.is_empty()
    }

    pub fn issues_of(&self, kind: LoadIssueKind) -> impl Iterator<Item = &LoadIssue> {
        self.issues.iter().filter(move |issue| issue.kind == kind)
    }

    fn record(
        &mut self,
        kind: LoadIssueKind,
        section: &'static str,
        entity_id: &str,
        message: impl Into<String>,
    ) {
        let issue = LoadIssue {
            kind,
            section,
            entity_id: entity_id.to_string(),
            message: message.into(),
        };
        warn!(section, entity = %issue.entity_id, kind = %kind, "{}", issue.message);
        self.issues.push(issue);
    }
}

/// Read a catalog file into the registry.
pub fn load_catalog(path: impl AsRef<Path>, registry: &mut EntityRegistry) -> Result<LoadReport, CatalogError> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path).map_err(|source| CatalogError::Io {
        path: path.to_path_buf(),
        source,
    })?;

    info!(path = %path.display(), "Loading sensor catalog");
    read_catalog(&content, registry)
}

/// Parse catalog text into the registry.
pub fn read_catalog(content: &str, registry: &mut EntityRegistry) -> Result<LoadReport, CatalogError> {
    let document: CatalogDocument = json5::from_str(content)?;
    apply_document(&document, registry)
}

/// Apply a parsed catalog to the registry.
pub fn apply_document(
    document: &CatalogDocument,
    registry: &mut EntityRegistry,
) -> Result<LoadReport, CatalogError> {
    let mut report = LoadReport::default();

    read_sensor_details(&document.sensor_details, registry, &mut report)?;
    read_sensors(&document.sensors, registry, &mut report)?;
    read_physical_locations(&document.physical_locations, registry, &mut report)?;
    read_sensor_associations(&document.sensor_associations, registry, &mut report)?;

    info!(
        sensor_details = report.sensor_details,
        sensors = report.sensors,
        sensed = report.sensed_entities,
        channel_associations = report.channel_associations,
        issues = report.issues.len(),
        "Catalog applied"
    );
    Ok(report)
}

/// Parse a time limit in seconds.
///
/// `null` is the same as a missing value. Numbers and numeric strings are
/// accepted; anything else, or a negative number, is an error.
fn parse_time_limit(value: Option<&Value>) -> Result<Option<TimeDelta>, String> {
    let secs = match value {
        None | Some(Value::Null) => return Ok(None),
        Some(Value::Number(n)) => n.as_f64(),
        Some(Value::String(s)) => s.trim().parse::<f64>().ok(),
        Some(_) => None,
    };

    match secs.and_then(time_limit_from_secs) {
        Some(limit) => Ok(Some(limit)),
        None => Err(format!("not a time limit in seconds: {}", value.map_or(Value::Null, Clone::clone))),
    }
}

/// Parse a time limit, reporting and discarding a malformed one.
fn time_limit_or_report(
    value: Option<&Value>,
    field: &str,
    section: &'static str,
    entity_id: &str,
    report: &mut LoadReport,
) -> Option<TimeDelta> {
    match parse_time_limit(value) {
        Ok(limit) => limit,
        Err(message) => {
            report.record(
                LoadIssueKind::InvalidTimeLimit,
                section,
                entity_id,
                format!("{field} ignored, {message}"),
            );
            None
        }
    }
}

fn read_sensor_details(
    entries: &[SensorDetailEntry],
    registry: &mut EntityRegistry,
    report: &mut LoadReport,
) -> Result<(), CatalogError> {
    const SECTION: &str = "sensorDetails";

    for entry in entries {
        if registry.sensor_detail(&entry.external_id).is_some() {
            report.record(LoadIssueKind::DuplicateId, SECTION, &entry.external_id, "duplicate sensor detail skipped");
            continue;
        }

        let update = time_limit_or_report(
            entry.sensor_update_time_limit.as_ref(),
            "sensorUpdateTimeLimit",
            SECTION,
            &entry.external_id,
            report,
        );
        let heartbeat = time_limit_or_report(
            entry.sensor_heartbeat_time_limit.as_ref(),
            "sensorHeartbeatTimeLimit",
            SECTION,
            &entry.external_id,
            report,
        );

        let mut detail = SensorDetail::new(&entry.external_id, &entry.name, &entry.description)
            .with_update_time_limit(update)
            .with_heartbeat_time_limit(heartbeat);

        let mut seen = HashSet::new();
        for channel in &entry.channels {
            if !seen.insert(channel.external_id.as_str()) {
                report.record(
                    LoadIssueKind::DuplicateId,
                    SECTION,
                    &entry.external_id,
                    format!("duplicate channel {} skipped", channel.external_id),
                );
                continue;
            }
            detail = detail.with_channel(ChannelDetail::new(
                &channel.external_id,
                &channel.name,
                &channel.description,
                &channel.measurement_type,
                &channel.measurement_unit,
            ));
        }

        registry.add_sensor_detail(detail)?;
        report.sensor_details += 1;
    }
    Ok(())
}

fn read_sensors(
    entries: &[SensorEntry],
    registry: &mut EntityRegistry,
    report: &mut LoadReport,
) -> Result<(), CatalogError> {
    const SECTION: &str = "sensors";

    for entry in entries {
        if registry.sensor_description(&entry.external_id).is_some() {
            report.record(LoadIssueKind::DuplicateId, SECTION, &entry.external_id, "duplicate sensor skipped");
            continue;
        }

        let Some(detail) = registry.sensor_detail(&entry.sensor_detail) else {
            report.record(
                LoadIssueKind::UnknownSensorDetail,
                SECTION,
                &entry.external_id,
                format!("sensor references unknown sensor detail {}, skipped", entry.sensor_detail),
            );
            continue;
        };

        let update = time_limit_or_report(
            entry.sensor_update_time_limit.as_ref(),
            "sensorUpdateTimeLimit",
            SECTION,
            &entry.external_id,
            report,
        );
        let heartbeat = time_limit_or_report(
            entry.sensor_heartbeat_time_limit.as_ref(),
            "sensorHeartbeatTimeLimit",
            SECTION,
            &entry.external_id,
            report,
        );

        registry.add_sensor(SensorDescription::new(
            &entry.external_id,
            &entry.name,
            &entry.description,
            detail,
            update,
            heartbeat,
        ))?;
        report.sensors += 1;
    }
    Ok(())
}

fn read_physical_locations(
    entries: &[PhysicalLocationEntry],
    registry: &mut EntityRegistry,
    report: &mut LoadReport,
) -> Result<(), CatalogError> {
    const SECTION: &str = "physicalLocations";

    for entry in entries {
        if registry.sensed_description(&entry.external_id).is_some() {
            report.record(LoadIssueKind::DuplicateId, SECTION, &entry.external_id, "duplicate sensed entity skipped");
            continue;
        }

        registry.add_sensed_entity(SensedEntityDescription::physical_location(
            &entry.external_id,
            &entry.name,
            &entry.description,
        ))?;
        report.sensed_entities += 1;
    }
    Ok(())
}

fn read_sensor_associations(
    entries: &[SensorAssociationEntry],
    registry: &mut EntityRegistry,
    report: &mut LoadReport,
) -> Result<(), CatalogError> {
    const SECTION: &str = "sensorAssociations";

    for entry in entries {
        let Some(sensor) = registry.sensor_description(&entry.sensor_id) else {
            report.record(
                LoadIssueKind::UnknownSensor,
                SECTION,
                &entry.sensor_id,
                format!("association to {} references unknown sensor, skipped", entry.sensed_id),
            );
            continue;
        };
        if registry.sensed_description(&entry.sensed_id).is_none() {
            report.record(
                LoadIssueKind::UnknownSensedEntity,
                SECTION,
                &entry.sensor_id,
                format!("association references unknown sensed entity {}, skipped", entry.sensed_id),
            );
            continue;
        }

        let detail = sensor.detail();
        let channel_ids: Vec<String> = match ChannelSelection::parse(entry.channel_ids.as_deref()) {
            ChannelSelection::All => detail.channel_ids().map(str::to_string).collect(),
            ChannelSelection::Explicit(ids) => ids
                .into_iter()
                .filter(|id| {
                    let known = detail.channel_detail(id).is_some();
                    if !known {
                        report.record(
                            LoadIssueKind::UnknownChannel,
                            SECTION,
                            &entry.sensor_id,
                            format!(
                                "channel {} is not defined by sensor detail {}, dropped",
                                id, detail.external_id
                            ),
                        );
                    }
                    known
                })
                .collect(),
        };

        report.channel_associations += channel_ids.len();
        registry.register_sensor_association(&entry.sensor_id, channel_ids, &entry.sensed_id)?;
    }
    Ok(())
}
