//! The entity registry.
//!
//! A registry goes through two phases. During the build phase descriptions
//! and channel associations are added. [`EntityRegistry::prepare_runtime_models`]
//! then creates one active model per description and binds the channels,
//! after which the registry is sealed: its structure never changes again and
//! it is typically shared as `Arc<EntityRegistry>` between ingestion and the
//! liveness sweep.

use std::collections::BTreeMap;
use std::sync::Arc;

use spacecommand_common::{RegistrySummary, Timestamp};
use tracing::{debug, info};

use crate::binding::ChannelBinding;
use crate::description::{SensedEntityDescription, SensorDescription, SensorDetail};
use crate::error::{RegistryError, Result};
use crate::events::DEFAULT_EVENT_CAPACITY;
use crate::sensed::SensedActiveModel;
use crate::sensor::SensorActiveModel;

/// Owner of all descriptions and active models.
#[derive(Debug)]
pub struct EntityRegistry {
    sensor_details: BTreeMap<String, Arc<SensorDetail>>,
    sensors: BTreeMap<String, Arc<SensorDescription>>,
    sensed_entities: BTreeMap<String, Arc<SensedEntityDescription>>,
    sensor_models: BTreeMap<String, Arc<SensorActiveModel>>,
    sensed_models: BTreeMap<String, Arc<SensedActiveModel>>,
    binding_count: usize,
    prepared: bool,
    event_capacity: usize,
}

impl Default for EntityRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl EntityRegistry {
    pub fn new() -> Self {
        Self::with_event_capacity(DEFAULT_EVENT_CAPACITY)
    }

    /// Create a registry whose active models buffer up to `event_capacity`
    /// events per observer.
    pub fn with_event_capacity(event_capacity: usize) -> Self {
        Self {
            sensor_details: BTreeMap::new(),
            sensors: BTreeMap::new(),
            sensed_entities: BTreeMap::new(),
            sensor_models: BTreeMap::new(),
            sensed_models: BTreeMap::new(),
            binding_count: 0,
            prepared: false,
            event_capacity,
        }
    }

    fn ensure_building(&self, operation: &'static str) -> Result<()> {
        if self.prepared {
            Err(RegistryError::Sealed { operation })
        } else {
            Ok(())
        }
    }

    /// Add a sensor type. Replaces a detail with the same ID.
    pub fn add_sensor_detail(&mut self, detail: SensorDetail) -> Result<Arc<SensorDetail>> {
        self.ensure_building("add_sensor_detail")?;
        let detail = Arc::new(detail);
        self.sensor_details
            .insert(detail.external_id.clone(), detail.clone());
        Ok(detail)
    }

    /// Add a sensor. Its sensor detail must have been added first.
    pub fn add_sensor(&mut self, sensor: SensorDescription) -> Result<()> {
        self.ensure_building("add_sensor")?;
        let detail_id = &sensor.detail().external_id;
        if !self.sensor_details.contains_key(detail_id) {
            return Err(RegistryError::UnknownSensorDetail(detail_id.clone()));
        }
        self.sensors
            .insert(sensor.external_id.clone(), Arc::new(sensor));
        Ok(())
    }

    pub fn add_sensed_entity(&mut self, sensed: SensedEntityDescription) -> Result<()> {
        self.ensure_building("add_sensed_entity")?;
        self.sensed_entities
            .insert(sensed.external_id().to_string(), Arc::new(sensed));
        Ok(())
    }

    /// Associate channels of a sensor with a sensed entity.
    ///
    /// Channel IDs are not checked against the sensor detail here; a channel
    /// the detail does not define makes [`Self::prepare_runtime_models`] fail.
    pub fn register_sensor_association<I, S>(
        &mut self,
        sensor_id: &str,
        channel_ids: I,
        sensed_id: &str,
    ) -> Result<()>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.ensure_building("register_sensor_association")?;
        if !self.sensed_entities.contains_key(sensed_id) {
            return Err(RegistryError::UnknownSensedEntity(sensed_id.to_string()));
        }
        let sensor = self
            .sensors
            .get_mut(sensor_id)
            .ok_or_else(|| RegistryError::UnknownSensor(sensor_id.to_string()))?;

        let sensor = Arc::make_mut(sensor);
        for channel_id in channel_ids {
            sensor.add_channel_association(channel_id, sensed_id);
        }
        Ok(())
    }

    /// Create the active models and bind every channel association.
    ///
    /// Must be called exactly once. Nothing is committed if a channel
    /// association does not match its sensor detail.
    pub fn prepare_runtime_models(&mut self, created_at: Timestamp) -> Result<()> {
        if self.prepared {
            return Err(RegistryError::AlreadyPrepared);
        }

        let sensed_models: BTreeMap<String, Arc<SensedActiveModel>> = self
            .sensed_entities
            .iter()
            .map(|(id, description)| {
                let model = SensedActiveModel::for_description(description.clone(), self.event_capacity);
                (id.clone(), Arc::new(model))
            })
            .collect();

        let mut sensor_models = BTreeMap::new();
        let mut binding_count = 0;

        for (sensor_id, description) in &self.sensors {
            let model = Arc::new(SensorActiveModel::new(
                description.clone(),
                created_at,
                self.event_capacity,
            ));

            for (channel_id, sensed_id) in description.channel_associations() {
                let detail = description.detail();
                let channel_detail = detail.channel_detail(channel_id).ok_or_else(|| {
                    RegistryError::UnknownChannel {
                        sensor_id: sensor_id.clone(),
                        channel_id: channel_id.to_string(),
                        detail_id: detail.external_id.clone(),
                    }
                })?;
                let sensed = sensed_models
                    .get(sensed_id)
                    .ok_or_else(|| RegistryError::UnknownSensedEntity(sensed_id.to_string()))?;

                ChannelBinding::bind(channel_id, channel_detail.clone(), &model, sensed);
                binding_count += 1;
                debug!(sensor = %sensor_id, channel = %channel_id, sensed = %sensed_id, "Channel bound");
            }

            sensor_models.insert(sensor_id.clone(), model);
        }

        self.sensor_models = sensor_models;
        self.sensed_models = sensed_models;
        self.binding_count = binding_count;
        self.prepared = true;

        info!(
            sensors = self.sensor_models.len(),
            sensed = self.sensed_models.len(),
            bindings = binding_count,
            "Runtime models prepared"
        );
        Ok(())
    }

    pub fn is_prepared(&self) -> bool {
        self.prepared
    }

    pub fn sensor_active_model(&self, sensor_id: &str) -> Option<Arc<SensorActiveModel>> {
        self.sensor_models.get(sensor_id).cloned()
    }

    pub fn sensed_active_model(&self, sensed_id: &str) -> Option<Arc<SensedActiveModel>> {
        self.sensed_models.get(sensed_id).cloned()
    }

    /// All sensor active models, in sensor ID order.
    pub fn sensor_active_models(&self) -> impl Iterator<Item = &Arc<SensorActiveModel>> {
        self.sensor_models.values()
    }

    /// All sensed active models, in sensed ID order.
    pub fn sensed_active_models(&self) -> impl Iterator<Item = &Arc<SensedActiveModel>> {
        self.sensed_models.values()
    }

    pub fn sensor_detail(&self, detail_id: &str) -> Option<Arc<SensorDetail>> {
        self.sensor_details.get(detail_id).cloned()
    }

    pub fn sensor_description(&self, sensor_id: &str) -> Option<Arc<SensorDescription>> {
        self.sensors.get(sensor_id).cloned()
    }

    pub fn sensed_description(&self, sensed_id: &str) -> Option<Arc<SensedEntityDescription>> {
        self.sensed_entities.get(sensed_id).cloned()
    }

    /// Number of channel bindings created by preparation.
    pub fn binding_count(&self) -> usize {
        self.binding_count
    }

    pub fn summary(&self) -> RegistrySummary {
        let online = self
            .sensor_models
            .values()
            .filter(|model| model.is_online())
            .count() as u64;
        let total = self.sensors.len() as u64;

        RegistrySummary {
            sensors_total: total,
            sensors_online: online,
            sensors_offline: total.saturating_sub(online),
            sensed_total: self.sensed_entities.len() as u64,
            channel_bindings: self.binding_count as u64,
        }
    }

    /// Close every event channel. Observers drain and then see the end of
    /// their streams.
    pub fn shutdown(&self) {
        for model in self.sensor_models.values() {
            model.close_events();
        }
        for model in self.sensed_models.values() {
            model.close_events();
        }
        info!("Registry event channels closed");
    }
}
