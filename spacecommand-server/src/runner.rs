//! Server lifecycle management.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use spacecommand_common::{connect, init_tracing};
use spacecommand_registry::{
    Dispatcher, EntityRegistry, LivenessSweep, LoadReport, SweepHandle, load_catalog,
};
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::ServerArgs;
use crate::config::ServerConfig;
use crate::error::{Result, ServerError};
use crate::forwarder::{EventForwarder, ForwarderHandle};
use crate::publisher::Publisher;
use crate::status::{StatusPublisher, status_metadata};
use crate::subscriber::TransportSubscriber;

/// Server name used in logs and status messages.
pub const SERVER_NAME: &str = "spacecommand";

/// How long shutdown waits for a background task before giving up on it.
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

/// Load the catalog and prepare the runtime models.
///
/// Catalog entry problems are logged and skipped; a catalog that cannot be
/// read at all, or models that cannot be prepared, fail the build.
pub fn build_registry(config: &ServerConfig) -> Result<(EntityRegistry, LoadReport)> {
    let mut registry = EntityRegistry::with_event_capacity(config.events.capacity);
    let report = load_catalog(&config.catalog.path, &mut registry)?;

    if !report.is_clean() {
        tracing::warn!(
            catalog = %config.catalog.path.display(),
            issues = report.issues.len(),
            "Catalog loaded with issues"
        );
    }

    registry.prepare_runtime_models(Utc::now())?;

    let summary = registry.summary();
    tracing::info!(
        sensors = summary.sensors_total,
        sensed = summary.sensed_total,
        bindings = summary.channel_bindings,
        "Registry prepared"
    );

    Ok((registry, report))
}

/// Background tasks started by [`ServerRunner::start`].
struct Workers {
    shutdown_tx: watch::Sender<bool>,
    subscriber: JoinHandle<Result<()>>,
    sweep: SweepHandle,
    forwarder: Option<ForwarderHandle>,
}

/// Runs the sensor server: ingestion, liveness sweep, event forwarding and
/// status publishing.
pub struct ServerRunner {
    version: String,
    config: ServerConfig,
    session: Arc<zenoh::Session>,
    dispatcher: Arc<Dispatcher>,
    publisher: Publisher,
    status_publisher: StatusPublisher,
    workers: Option<Workers>,
}

impl ServerRunner {
    /// Create a runner.
    ///
    /// This will:
    /// 1. Initialize logging (with optional CLI level override)
    /// 2. Load the catalog and prepare the registry
    /// 3. Connect to Zenoh
    pub async fn new(config: ServerConfig, args: Option<&ServerArgs>) -> Result<Self> {
        let version = env!("CARGO_PKG_VERSION").to_string();

        let level = args.and_then(|a| a.log_level.as_deref());
        let log_config = config.logging.with_level_override(level);
        init_tracing(&log_config).map_err(|e| ServerError::config(e.to_string()))?;

        tracing::info!(server = SERVER_NAME, version = %version, "Starting server");

        let (registry, _report) = build_registry(&config)?;
        let dispatcher = Arc::new(Dispatcher::with_event_capacity(
            Arc::new(registry),
            config.events.capacity,
        ));

        let session = Arc::new(
            connect(&config.zenoh)
                .await
                .map_err(|e| ServerError::ZenohConnection(e.to_string()))?,
        );

        let publisher = Publisher::new(session.clone(), config.key_builder(), config.events.format);
        let status_publisher = StatusPublisher::new(publisher.clone(), SERVER_NAME, &version);

        Ok(Self {
            version,
            config,
            session,
            dispatcher,
            publisher,
            status_publisher,
            workers: None,
        })
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    pub fn session(&self) -> &Arc<zenoh::Session> {
        &self.session
    }

    pub fn dispatcher(&self) -> &Arc<Dispatcher> {
        &self.dispatcher
    }

    pub fn registry(&self) -> &Arc<EntityRegistry> {
        self.dispatcher.registry()
    }

    /// Start the forwarder, the liveness sweep and the transport subscriber,
    /// then publish "running" status. Calling it twice has no effect.
    pub async fn start(&mut self) -> Result<()> {
        if self.workers.is_some() {
            return Ok(());
        }

        // Forwarder first so no event emitted by ingestion is missed.
        let forwarder = self.config.events.publish.then(|| {
            EventForwarder::new(self.publisher.clone(), self.dispatcher.clone())
                .with_snapshots(self.config.events.publish_snapshots)
                .start()
        });

        let sweep = LivenessSweep::new(self.registry().clone())
            .start(self.config.liveness.sweep_interval());

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let subscriber = TransportSubscriber::new(
            self.session.clone(),
            self.dispatcher.clone(),
            &self.config.ingest.key_expr,
        );
        let subscriber = tokio::spawn(subscriber.run(shutdown_rx));

        self.workers = Some(Workers {
            shutdown_tx,
            subscriber,
            sweep,
            forwarder,
        });

        let metadata = status_metadata(&self.registry().summary(), &self.dispatcher.stats());
        if let Err(e) = self.status_publisher.publish_running(Some(metadata)).await {
            tracing::warn!(error = %e, "Failed to publish running status");
        }

        tracing::info!(
            key_expr = %self.config.ingest.key_expr,
            forwarding_tasks = self
                .workers
                .as_ref()
                .and_then(|w| w.forwarder.as_ref())
                .map_or(0, ForwarderHandle::task_count),
            sweep_interval_secs = self.config.liveness.sweep_interval_secs,
            "Server running"
        );
        Ok(())
    }

    /// Run until Ctrl+C or SIGTERM, then shut down.
    pub async fn run(mut self) -> Result<()> {
        self.start().await?;
        wait_for_signal().await;
        tracing::info!("Received shutdown signal");
        self.shutdown().await
    }

    /// Stop everything in order: transport, sweep, event streams, status,
    /// session.
    pub async fn shutdown(mut self) -> Result<()> {
        if let Some(workers) = self.workers.take() {
            let _ = workers.shutdown_tx.send(true);
            match tokio::time::timeout(SHUTDOWN_TIMEOUT, workers.subscriber).await {
                Ok(Ok(Ok(()))) => {}
                Ok(Ok(Err(e))) => {
                    tracing::warn!(error = %e, "Subscriber stopped with error");
                    if let Err(e) = self.status_publisher.publish_error(e.to_string()).await {
                        tracing::warn!(error = %e, "Failed to publish error status");
                    }
                }
                Ok(Err(e)) => tracing::warn!(error = %e, "Subscriber task failed"),
                Err(_) => tracing::warn!("Subscriber did not stop in time"),
            }

            workers.sweep.stop().await;

            self.dispatcher.close();
            self.registry().shutdown();

            if let Some(forwarder) = workers.forwarder {
                match tokio::time::timeout(SHUTDOWN_TIMEOUT, forwarder.join()).await {
                    Ok(stats) => tracing::info!(
                        published = stats.success,
                        failed = stats.failed,
                        "Event forwarding stopped"
                    ),
                    Err(_) => tracing::warn!("Event forwarding did not drain in time"),
                }
            }
        } else {
            self.dispatcher.close();
            self.registry().shutdown();
        }

        let stats = self.dispatcher.stats();
        tracing::info!(
            messages = stats.messages_received,
            values = stats.values_applied,
            decode_errors = stats.decode_errors,
            unusable_values = stats.unusable_values,
            "Ingestion stopped"
        );

        if let Err(e) = self.status_publisher.publish_offline().await {
            tracing::warn!(error = %e, "Failed to publish offline status");
        }

        self.session
            .close()
            .await
            .map_err(|e| ServerError::ZenohSession(e.to_string()))?;

        tracing::info!(server = SERVER_NAME, "Goodbye!");
        Ok(())
    }
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{SignalKind, signal};

    let mut term = match signal(SignalKind::terminate()) {
        Ok(term) => term,
        Err(e) => {
            tracing::error!(error = %e, "Failed to listen for SIGTERM");
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "Failed to listen for Ctrl+C");
            }
            return;
        }
    };

    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            if let Err(e) = result {
                tracing::error!(error = %e, "Failed to listen for Ctrl+C");
            }
        }
        _ = term.recv() => {}
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for Ctrl+C");
    }
}
