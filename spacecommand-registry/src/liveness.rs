//! Online/offline state machine for a single sensor.
//!
//! A sensor starts offline and only becomes online by reporting a value or a
//! heartbeat. [`Liveness::check_offline_transition`] is called periodically
//! and decides whether the sensor has gone quiet for longer than its time
//! limit. The value time limit always takes priority over the heartbeat time
//! limit; a sensor with neither is never marked offline by the check.

use chrono::TimeDelta;
use spacecommand_common::Timestamp;

/// Liveness state of one sensor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Liveness {
    created_at: Timestamp,
    update_time_limit: Option<TimeDelta>,
    heartbeat_time_limit: Option<TimeDelta>,
    last_value_time: Option<Timestamp>,
    last_heartbeat_time: Option<Timestamp>,
    online: bool,
    offline_signaled: bool,
}

impl Liveness {
    /// Create the state for a sensor born at `created_at`. Starts offline.
    pub fn new(
        created_at: Timestamp,
        update_time_limit: Option<TimeDelta>,
        heartbeat_time_limit: Option<TimeDelta>,
    ) -> Self {
        Self {
            created_at,
            update_time_limit,
            heartbeat_time_limit,
            last_value_time: None,
            last_heartbeat_time: None,
            online: false,
            offline_signaled: false,
        }
    }

    /// A value update was received.
    pub fn record_value(&mut self, received_at: Timestamp) {
        self.last_value_time = Some(received_at);
        self.online = true;
        self.offline_signaled = false;
    }

    /// A heartbeat was received.
    pub fn record_heartbeat(&mut self, received_at: Timestamp) {
        self.last_heartbeat_time = Some(received_at);
        self.online = true;
        self.offline_signaled = false;
    }

    /// Check whether the sensor has timed out as of `now`.
    ///
    /// Returns `true` exactly when an offline notification must be sent: an
    /// online sensor timed out, or an offline sensor that was never signaled
    /// for this episode exceeded its limit.
    pub fn check_offline_transition(&mut self, now: Timestamp) -> bool {
        let check = if self.online {
            self.online_reference()
        } else if self.offline_signaled {
            None
        } else {
            self.offline_reference()
        };

        let Some((reference, limit)) = check else {
            return false;
        };

        if is_timeout(now, reference, limit) {
            self.online = false;
            self.offline_signaled = true;
            true
        } else {
            false
        }
    }

    /// Reference time and limit used while online.
    fn online_reference(&self) -> Option<(Timestamp, TimeDelta)> {
        if let Some(limit) = self.update_time_limit {
            // A heartbeat alone can bring the sensor online.
            let reference = self.last_value_time.unwrap_or(self.created_at);
            return Some((reference, limit));
        }

        let limit = self.heartbeat_time_limit?;
        let reference = match (self.last_value_time, self.last_heartbeat_time) {
            (Some(value), Some(heartbeat)) => value.max(heartbeat),
            (Some(value), None) => value,
            (None, Some(heartbeat)) => heartbeat,
            (None, None) => self.created_at,
        };
        Some((reference, limit))
    }

    /// Reference time and limit used while offline and not yet signaled.
    fn offline_reference(&self) -> Option<(Timestamp, TimeDelta)> {
        if let Some(limit) = self.update_time_limit {
            return Some((self.last_value_time.unwrap_or(self.created_at), limit));
        }

        let limit = self.heartbeat_time_limit?;
        Some((self.last_heartbeat_time.unwrap_or(self.created_at), limit))
    }

    pub fn is_online(&self) -> bool {
        self.online
    }

    pub fn offline_signaled(&self) -> bool {
        self.offline_signaled
    }

    pub fn created_at(&self) -> Timestamp {
        self.created_at
    }

    pub fn last_value_time(&self) -> Option<Timestamp> {
        self.last_value_time
    }

    pub fn last_heartbeat_time(&self) -> Option<Timestamp> {
        self.last_heartbeat_time
    }

    pub fn update_time_limit(&self) -> Option<TimeDelta> {
        self.update_time_limit
    }

    pub fn heartbeat_time_limit(&self) -> Option<TimeDelta> {
        self.heartbeat_time_limit
    }
}

/// Strictly greater than: hitting the limit exactly is still in time.
pub fn is_timeout(now: Timestamp, reference: Timestamp, limit: TimeDelta) -> bool {
    now - reference > limit
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn t(secs: i64) -> Timestamp {
        Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
    }

    fn secs(s: i64) -> Option<TimeDelta> {
        Some(TimeDelta::seconds(s))
    }

    #[test]
    fn test_starts_offline_unsignaled() {
        let liveness = Liveness::new(t(0), secs(60), None);
        assert!(!liveness.is_online());
        assert!(!liveness.offline_signaled());
        assert!(liveness.last_value_time().is_none());
        assert!(liveness.last_heartbeat_time().is_none());
    }

    #[test]
    fn test_never_reporting_sensor_signaled_once() {
        let mut liveness = Liveness::new(t(0), secs(60), None);

        assert!(!liveness.check_offline_transition(t(30)));
        assert!(!liveness.check_offline_transition(t(60)), "equal is within limit");
        assert!(liveness.check_offline_transition(t(61)));
        assert!(liveness.offline_signaled());
        assert!(!liveness.check_offline_transition(t(120)));
        assert!(!liveness.check_offline_transition(t(10_000)));
    }

    #[test]
    fn test_value_brings_sensor_online() {
        let mut liveness = Liveness::new(t(0), secs(60), None);
        assert!(liveness.check_offline_transition(t(61)));

        liveness.record_value(t(130));
        assert!(liveness.is_online());
        assert!(!liveness.offline_signaled());
        assert_eq!(liveness.last_value_time(), Some(t(130)));
    }

    #[test]
    fn test_online_times_out_on_value_limit() {
        let mut liveness = Liveness::new(t(0), secs(60), secs(10));
        liveness.record_value(t(5));

        // Heartbeats do not keep a value-limited sensor alive.
        liveness.record_heartbeat(t(50));
        assert!(!liveness.check_offline_transition(t(65)));
        assert!(liveness.check_offline_transition(t(66)));
        assert!(!liveness.is_online());
        assert!(liveness.offline_signaled());
        assert!(!liveness.check_offline_transition(t(200)));
    }

    #[test]
    fn test_heartbeat_only_uses_latest_of_value_and_heartbeat() {
        let mut liveness = Liveness::new(t(0), None, secs(30));
        liveness.record_value(t(10));
        liveness.record_heartbeat(t(20));

        assert!(!liveness.check_offline_transition(t(50)));
        assert!(liveness.check_offline_transition(t(51)));

        let mut liveness = Liveness::new(t(0), None, secs(30));
        liveness.record_heartbeat(t(10));
        liveness.record_value(t(25));
        assert!(!liveness.check_offline_transition(t(55)));
        assert!(liveness.check_offline_transition(t(56)));
    }

    #[test]
    fn test_heartbeat_only_offline_reference() {
        let mut liveness = Liveness::new(t(0), None, secs(30));
        assert!(liveness.check_offline_transition(t(31)));

        let mut liveness = Liveness::new(t(100), None, secs(30));
        assert!(!liveness.check_offline_transition(t(130)));
        assert!(liveness.check_offline_transition(t(131)));
    }

    #[test]
    fn test_heartbeat_while_offline_clears_signal() {
        let mut liveness = Liveness::new(t(0), None, secs(30));
        assert!(liveness.check_offline_transition(t(31)));

        liveness.record_heartbeat(t(40));
        assert!(liveness.is_online());
        assert!(!liveness.offline_signaled());
        assert!(!liveness.check_offline_transition(t(70)));
        assert!(liveness.check_offline_transition(t(71)));
    }

    #[test]
    fn test_no_limits_never_goes_offline() {
        let mut liveness = Liveness::new(t(0), None, None);
        assert!(!liveness.check_offline_transition(t(1_000_000)));
        assert!(!liveness.offline_signaled());

        liveness.record_value(t(1));
        assert!(!liveness.check_offline_transition(t(1_000_000)));
        assert!(liveness.is_online());
    }

    #[test]
    fn test_is_timeout_strict() {
        let limit = TimeDelta::seconds(10);
        assert!(!is_timeout(t(10), t(0), limit));
        assert!(is_timeout(t(11), t(0), limit));
        assert!(!is_timeout(t(0), t(5), limit));
    }
}
