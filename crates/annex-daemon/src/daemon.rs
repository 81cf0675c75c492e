//! Daemon setup and lifecycle management

use crate::config::DaemonConfig;
use crate::engine::{PassReport, ReconcileEngine};
use crate::error::DaemonResult;
use crate::identity::{local_hostname, IdentityResolver};
use crate::inventory::{AnnexDirectory, CloudStacks, DirectoryAds, StackInventory};
use crate::scheduler::Poller;
use annex_types::PollEventEnvelope;
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc};

/// Annex poller daemon
pub struct Daemon {
    config: DaemonConfig,
    poller: Arc<Poller>,
    trigger_rx: mpsc::Receiver<()>,
    event_tx: broadcast::Sender<PollEventEnvelope>,
}

impl Daemon {
    /// Create a daemon talking to the configured directory and cloud.
    ///
    /// Fails if the directory cannot be located or the cloud transport
    /// cannot be built.
    pub async fn new(config: DaemonConfig) -> DaemonResult<Self> {
        let directory = DirectoryAds::from_config(&config.directory)?;
        tracing::info!(endpoint = directory.endpoint(), "Using directory");

        let stacks = CloudStacks::from_config(&config.cloud)?;
        tracing::info!(service_url = %config.cloud.service_url, "Using cloud endpoint");

        let reporter = resolve_reporter(&config).await;

        Ok(Self::with_inventories(
            config,
            Arc::new(directory),
            Arc::new(stacks),
            reporter,
        ))
    }

    /// Create a daemon over arbitrary inventories
    pub fn with_inventories(
        config: DaemonConfig,
        directory: Arc<dyn AnnexDirectory>,
        stacks: Arc<dyn StackInventory>,
        reporter: impl Into<String>,
    ) -> Self {
        let (event_tx, _) = broadcast::channel(256);

        let engine = Arc::new(ReconcileEngine::new(
            directory,
            stacks,
            config.poll.fetch_timeout(),
        ));
        let (poller, trigger_rx) = Poller::new(
            engine,
            config.poll.interval(),
            reporter,
            event_tx.clone(),
        );

        Self {
            config,
            poller,
            trigger_rx,
            event_tx,
        }
    }

    pub fn poller(&self) -> &Arc<Poller> {
        &self.poller
    }

    /// Subscribe to pass events
    pub fn subscribe(&self) -> broadcast::Receiver<PollEventEnvelope> {
        self.event_tx.subscribe()
    }

    /// Run a single pass
    pub async fn run_once(&self) -> DaemonResult<PassReport> {
        Ok(self.poller.poll_once().await?)
    }

    /// Poll until a shutdown signal arrives
    pub async fn run(self) -> DaemonResult<()> {
        tracing::info!(
            interval_secs = self.config.poll.interval_secs,
            reporter = self.poller.reporter(),
            "annexd polling"
        );

        let poller = self.poller.clone();
        let trigger_rx = self.trigger_rx;
        let handle = tokio::spawn(async move {
            poller.start(trigger_rx).await;
        });

        shutdown_signal().await;

        tracing::info!("annexd shutting down");
        self.poller.stop();

        if let Err(e) = handle.await {
            tracing::error!(error = %e, "Poller task failed");
        }

        Ok(())
    }
}

/// Name findings are reported under.
///
/// A host whose name never resolves still polls; it reports under the raw
/// host name.
pub async fn resolve_reporter(config: &DaemonConfig) -> String {
    let host = local_hostname(&config.identity);
    let resolver = IdentityResolver::from_config(&config.identity);

    match resolver.resolve(&host).await {
        Ok(identity) => identity.hostname,
        Err(e) => {
            tracing::warn!(host = %host, error = %e, "Could not resolve local identity");
            host
        }
    }
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating graceful shutdown");
        }
        _ = terminate => {
            tracing::info!("Received terminate signal, initiating graceful shutdown");
        }
    }
}
