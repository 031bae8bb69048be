//! Forwarding of registry events to Zenoh.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use spacecommand_common::SensorStatus;
use spacecommand_registry::{
    Dispatcher, EventStream, MeasurementEvent, SensorActiveModel, SensorOfflineEvent,
};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::publisher::{PublishStats, Publisher};

/// Remembers the last status published per sensor so snapshots only go out
/// on a change.
#[derive(Debug, Default)]
pub struct SnapshotTracker {
    published: Mutex<HashMap<String, SensorStatus>>,
}

impl SnapshotTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `status` for `sensor_id`, returning true when it differs from
    /// the last recorded one.
    pub fn observe(&self, sensor_id: &str, status: SensorStatus) -> bool {
        let mut published = self.published.lock();
        match published.get(sensor_id) {
            Some(previous) if *previous == status => false,
            _ => {
                published.insert(sensor_id.to_string(), status);
                true
            }
        }
    }
}

/// Publishes measurement and offline events, plus sensor snapshots when a
/// sensor changes state.
pub struct EventForwarder {
    publisher: Publisher,
    dispatcher: Arc<Dispatcher>,
    publish_snapshots: bool,
}

impl EventForwarder {
    pub fn new(publisher: Publisher, dispatcher: Arc<Dispatcher>) -> Self {
        Self {
            publisher,
            dispatcher,
            publish_snapshots: true,
        }
    }

    pub fn with_snapshots(mut self, enabled: bool) -> Self {
        self.publish_snapshots = enabled;
        self
    }

    /// Subscribe to every event stream and spawn the forwarding tasks.
    ///
    /// Subscriptions are taken before this returns, so events emitted after
    /// `start` are never missed. The tasks end once the streams close.
    pub fn start(self) -> ForwarderHandle {
        let tracker = Arc::new(SnapshotTracker::new());
        let snapshots = self.publish_snapshots.then_some(tracker);
        let mut tasks = Vec::new();

        let measurements = self.dispatcher.subscribe_measurements();
        tasks.push(tokio::spawn(forward_measurements(
            self.publisher.clone(),
            measurements,
            snapshots.clone(),
        )));

        for sensor in self.dispatcher.registry().sensor_active_models() {
            let offline = sensor.subscribe_offline();
            tasks.push(tokio::spawn(forward_offline(
                self.publisher.clone(),
                sensor.clone(),
                offline,
                snapshots.clone(),
            )));
        }

        info!(tasks = tasks.len(), "Event forwarding started");
        ForwarderHandle { tasks }
    }
}

/// Handle to the running forwarding tasks.
pub struct ForwarderHandle {
    tasks: Vec<JoinHandle<PublishStats>>,
}

impl ForwarderHandle {
    pub fn task_count(&self) -> usize {
        self.tasks.len()
    }

    /// Wait for every task to drain its stream and return the combined
    /// publish counts.
    pub async fn join(self) -> PublishStats {
        let mut total = PublishStats::default();
        for task in self.tasks {
            match task.await {
                Ok(stats) => {
                    total.success += stats.success;
                    total.failed += stats.failed;
                }
                Err(e) => warn!(error = %e, "Forwarding task failed"),
            }
        }
        total
    }
}

async fn forward_measurements(
    publisher: Publisher,
    mut events: EventStream<MeasurementEvent>,
    snapshots: Option<Arc<SnapshotTracker>>,
) -> PublishStats {
    let mut stats = PublishStats::default();

    while let Some(event) = events.recv().await {
        let record = event.to_record();
        let key = publisher.keys().measurement_event_key(&record.sensor_id);
        let result = publisher.publish(&key, &record).await;
        if let Err(ref e) = result {
            debug!(key = %key, error = %e, "Failed to publish measurement");
        }
        stats.record(&result);

        if let Some(ref tracker) = snapshots {
            publish_snapshot(&publisher, &event.sensor, tracker, &mut stats).await;
        }
    }

    debug!(published = stats.success, failed = stats.failed, "Measurement forwarding finished");
    stats
}

async fn forward_offline(
    publisher: Publisher,
    sensor: Arc<SensorActiveModel>,
    mut events: EventStream<SensorOfflineEvent>,
    snapshots: Option<Arc<SnapshotTracker>>,
) -> PublishStats {
    let mut stats = PublishStats::default();

    while let Some(event) = events.recv().await {
        let key = publisher.keys().offline_event_key(&event.sensor_id);
        let result = publisher.publish(&key, &event.to_record()).await;
        if let Err(ref e) = result {
            warn!(key = %key, error = %e, "Failed to publish offline event");
        }
        stats.record(&result);

        if let Some(ref tracker) = snapshots {
            publish_snapshot(&publisher, &sensor, tracker, &mut stats).await;
        }
    }

    stats
}

async fn publish_snapshot(
    publisher: &Publisher,
    sensor: &SensorActiveModel,
    tracker: &SnapshotTracker,
    stats: &mut PublishStats,
) {
    let snapshot = sensor.snapshot();
    if !tracker.observe(&snapshot.sensor_id, snapshot.status) {
        return;
    }

    let key = publisher.keys().sensor_status_key(&snapshot.sensor_id);
    let result = publisher.publish(&key, &snapshot).await;
    if let Err(ref e) = result {
        debug!(key = %key, error = %e, "Failed to publish sensor snapshot");
    }
    stats.record(&result);
}
