/// Default key expression prefix for all SpaceCommand traffic.
pub const KEY_PREFIX: &str = "spacecommand";

/// Builder for constructing SpaceCommand key expressions.
///
/// Key expressions follow the patterns:
/// - inbound sensor messages: `<prefix>/sensors/<sensor_id>`
/// - outbound events: `<prefix>/events/<kind>/<sensor_id>`
/// - server metadata: `<prefix>/@/...`
#[derive(Debug, Clone)]
pub struct KeyExprBuilder {
    prefix: String,
}

impl Default for KeyExprBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl KeyExprBuilder {
    /// Create a builder using [`KEY_PREFIX`].
    pub fn new() -> Self {
        Self {
            prefix: KEY_PREFIX.to_string(),
        }
    }

    /// Create a builder with a custom prefix.
    pub fn with_prefix(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into().trim_end_matches('/').to_string(),
        }
    }

    /// Recover the builder behind an ingest key expression such as
    /// `site/sensors/**`.
    ///
    /// Returns `None` when the expression is not `<prefix>/sensors/*` or
    /// `<prefix>/sensors/**` with a literal prefix.
    ///
    /// # Example
    /// ```
    /// use spacecommand_common::keyexpr::KeyExprBuilder;
    ///
    /// let keys = KeyExprBuilder::for_sensors_key_expr("tinkermill/sensors/**").unwrap();
    /// assert_eq!(keys.prefix(), "tinkermill");
    /// ```
    pub fn for_sensors_key_expr(key_expr: &str) -> Option<Self> {
        let prefix = key_expr
            .strip_suffix("/sensors/**")
            .or_else(|| key_expr.strip_suffix("/sensors/*"))?;
        if prefix.is_empty() || prefix.contains(['*', '$']) {
            return None;
        }
        Some(Self::with_prefix(prefix))
    }

    /// The prefix used by this builder.
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Key a sensor node publishes its messages on.
    ///
    /// # Example
    /// ```
    /// use spacecommand_common::keyexpr::KeyExprBuilder;
    ///
    /// let key = KeyExprBuilder::new().sensor_key("sensor.esp8266.FE13DE");
    /// assert_eq!(key, "spacecommand/sensors/sensor.esp8266.FE13DE");
    /// ```
    pub fn sensor_key(&self, sensor_id: &str) -> String {
        format!("{}/sensors/{}", self.prefix, sensor_id)
    }

    /// Wildcard matching every sensor message.
    ///
    /// # Example
    /// ```
    /// use spacecommand_common::keyexpr::KeyExprBuilder;
    ///
    /// assert_eq!(KeyExprBuilder::new().sensors_wildcard(), "spacecommand/sensors/**");
    /// ```
    pub fn sensors_wildcard(&self) -> String {
        format!("{}/sensors/**", self.prefix)
    }

    /// Key for a measurement event produced by the dispatcher.
    pub fn measurement_event_key(&self, sensor_id: &str) -> String {
        format!("{}/events/measurement/{}", self.prefix, sensor_id)
    }

    /// Key for a sensor offline event.
    pub fn offline_event_key(&self, sensor_id: &str) -> String {
        format!("{}/events/offline/{}", self.prefix, sensor_id)
    }

    /// Wildcard matching every event.
    pub fn events_wildcard(&self) -> String {
        format!("{}/events/**", self.prefix)
    }

    /// Key for server status.
    ///
    /// # Example
    /// ```
    /// use spacecommand_common::keyexpr::KeyExprBuilder;
    ///
    /// assert_eq!(KeyExprBuilder::new().status_key(), "spacecommand/@/status");
    /// ```
    pub fn status_key(&self) -> String {
        format!("{}/@/status", self.prefix)
    }

    /// Key for a per-sensor status snapshot.
    pub fn sensor_status_key(&self, sensor_id: &str) -> String {
        format!("{}/@/sensors/{}/status", self.prefix, sensor_id)
    }

    /// Wildcard matching every per-sensor status snapshot.
    pub fn sensor_status_wildcard(&self) -> String {
        format!("{}/@/sensors/*/status", self.prefix)
    }

    /// Extract the sensor ID from an inbound message key.
    ///
    /// Returns `None` if the key is not under `<prefix>/sensors/`.
    pub fn parse_sensor_key<'a>(&self, key: &'a str) -> Option<&'a str> {
        let rest = key.strip_prefix(self.prefix.as_str())?;
        let rest = rest.strip_prefix("/sensors/")?;
        let sensor_id = rest.split('/').next()?;
        if sensor_id.is_empty() {
            None
        } else {
            Some(sensor_id)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_builder() {
        let builder = KeyExprBuilder::new();

        assert_eq!(builder.sensor_key("s1"), "spacecommand/sensors/s1");
        assert_eq!(
            builder.measurement_event_key("s1"),
            "spacecommand/events/measurement/s1"
        );
        assert_eq!(
            builder.offline_event_key("s1"),
            "spacecommand/events/offline/s1"
        );
        assert_eq!(builder.events_wildcard(), "spacecommand/events/**");
        assert_eq!(
            builder.sensor_status_key("s1"),
            "spacecommand/@/sensors/s1/status"
        );
    }

    #[test]
    fn test_custom_prefix_trims_slash() {
        let builder = KeyExprBuilder::with_prefix("site/tinkermill/");
        assert_eq!(builder.prefix(), "site/tinkermill");
        assert_eq!(builder.sensor_key("s1"), "site/tinkermill/sensors/s1");
    }

    #[test]
    fn test_parse_sensor_key() {
        let builder = KeyExprBuilder::new();

        assert_eq!(
            builder.parse_sensor_key("spacecommand/sensors/sensor.esp8266.FE13DE"),
            Some("sensor.esp8266.FE13DE")
        );
        assert_eq!(
            builder.parse_sensor_key("spacecommand/sensors/s1/measurement"),
            Some("s1")
        );
    }

    #[test]
    fn test_parse_invalid_key() {
        let builder = KeyExprBuilder::new();

        assert!(builder.parse_sensor_key("spacecommand/sensors/").is_none());
        assert!(builder.parse_sensor_key("spacecommand/events/offline/s1").is_none());
        assert!(builder.parse_sensor_key("other/sensors/s1").is_none());
        assert!(builder.parse_sensor_key("spacecommandx/sensors/s1").is_none());
    }

    #[test]
    fn test_for_sensors_key_expr() {
        let keys = KeyExprBuilder::for_sensors_key_expr("site/tinkermill/sensors/**").unwrap();
        assert_eq!(keys.prefix(), "site/tinkermill");
        assert_eq!(keys.parse_sensor_key("site/tinkermill/sensors/s1"), Some("s1"));

        let keys = KeyExprBuilder::for_sensors_key_expr("lab/sensors/*").unwrap();
        assert_eq!(keys.prefix(), "lab");

        assert!(KeyExprBuilder::for_sensors_key_expr("lab/**").is_none());
        assert!(KeyExprBuilder::for_sensors_key_expr("*/sensors/**").is_none());
        assert!(KeyExprBuilder::for_sensors_key_expr("/sensors/**").is_none());
        assert!(KeyExprBuilder::for_sensors_key_expr("lab/sensors/s1").is_none());
    }

    #[test]
    fn test_status_wildcard() {
        let builder = KeyExprBuilder::with_prefix("lab");
        assert_eq!(builder.sensor_status_wildcard(), "lab/@/sensors/*/status");
    }
}
