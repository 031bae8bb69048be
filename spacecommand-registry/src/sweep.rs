//! Periodic liveness sweep.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use spacecommand_common::Timestamp;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use crate::registry::EntityRegistry;

/// Walks every sensor and runs its offline check.
#[derive(Debug, Clone)]
pub struct LivenessSweep {
    registry: Arc<EntityRegistry>,
}

impl LivenessSweep {
    pub fn new(registry: Arc<EntityRegistry>) -> Self {
        Self { registry }
    }

    /// Check every sensor as of `now`.
    ///
    /// Returns the IDs of the sensors signaled offline by this pass.
    pub fn sweep(&self, now: Timestamp) -> Vec<String> {
        let offline: Vec<String> = self
            .registry
            .sensor_active_models()
            .filter(|model| model.check_offline_transition(now))
            .map(|model| model.sensor_id().to_string())
            .collect();

        debug!(at = %now, newly_offline = offline.len(), "Liveness sweep done");
        offline
    }

    /// Run the sweep in the background every `interval` using the wall clock.
    ///
    /// The first pass happens one interval after start so sensors get a
    /// chance to report.
    pub fn start(self, interval: Duration) -> SweepHandle {
        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);

        let task = tokio::spawn(async move {
            let start = tokio::time::Instant::now() + interval;
            let mut ticker = tokio::time::interval_at(start, interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

            info!(interval_secs = interval.as_secs_f64(), "Liveness sweep started");

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        self.sweep(Utc::now());
                    }
                    changed = shutdown_rx.changed() => {
                        if changed.is_err() || *shutdown_rx.borrow() {
                            break;
                        }
                    }
                }
            }

            info!("Liveness sweep stopped");
        });

        SweepHandle {
            shutdown: shutdown_tx,
            task,
        }
    }
}

/// Handle to a running sweep task.
#[derive(Debug)]
pub struct SweepHandle {
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl SweepHandle {
    /// Signal the sweep to stop and wait for it to finish.
    pub async fn stop(self) {
        let _ = self.shutdown.send(true);
        if let Err(e) = self.task.await {
            error!("Liveness sweep task failed: {}", e);
        }
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}
