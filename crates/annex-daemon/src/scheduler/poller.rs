//! Poll loop

use crate::engine::{PassReport, ReconcileEngine};
use crate::error::PassError;
use annex_types::{PassId, PollEvent, PollEventEnvelope};
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, watch, Mutex};
use tokio::time::{interval, Duration, Instant, MissedTickBehavior};

/// Periodic reconciliation driver
pub struct Poller {
    engine: Arc<ReconcileEngine>,
    interval: Duration,
    reporter: String,
    event_tx: broadcast::Sender<PollEventEnvelope>,
    trigger_tx: mpsc::Sender<()>,
    shutdown_tx: watch::Sender<bool>,
    // Held for the whole of a pass
    pass_lock: Mutex<()>,
}

impl Poller {
    /// Create a new poller; the receiver is handed back to [`Poller::start`]
    pub fn new(
        engine: Arc<ReconcileEngine>,
        interval: Duration,
        reporter: impl Into<String>,
        event_tx: broadcast::Sender<PollEventEnvelope>,
    ) -> (Arc<Self>, mpsc::Receiver<()>) {
        // One slot: a trigger arriving while one is queued is folded into it
        let (trigger_tx, trigger_rx) = mpsc::channel(1);
        let (shutdown_tx, _) = watch::channel(false);

        let poller = Arc::new(Self {
            engine,
            interval,
            reporter: reporter.into(),
            event_tx,
            trigger_tx,
            shutdown_tx,
            pass_lock: Mutex::new(()),
        });

        (poller, trigger_rx)
    }

    /// Request a pass as soon as the loop is free.
    ///
    /// Returns false when a trigger is already pending.
    pub fn trigger_reconcile(&self) -> bool {
        self.trigger_tx.try_send(()).is_ok()
    }

    /// Run the loop until [`Poller::stop`] is called
    pub async fn start(self: Arc<Self>, mut trigger_rx: mpsc::Receiver<()>) {
        let mut shutdown = self.shutdown_tx.subscribe();
        if *shutdown.borrow_and_update() {
            return;
        }

        let mut ticker = interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        tracing::info!(interval_secs = self.interval.as_secs(), "Poller started");

        loop {
            tokio::select! {
                biased;
                _ = shutdown.changed() => break,
                _ = ticker.tick() => {}
                Some(()) = trigger_rx.recv() => {
                    tracing::debug!("Triggered reconciliation");
                }
            }

            let started = Instant::now();
            tokio::select! {
                biased;
                _ = shutdown.changed() => {
                    tracing::info!("Shutdown requested, abandoning in-flight pass");
                    break;
                }
                _ = self.poll_once() => {}
            }

            let elapsed = started.elapsed();
            if elapsed >= self.interval {
                tracing::warn!(
                    elapsed_secs = elapsed.as_secs(),
                    interval_secs = self.interval.as_secs(),
                    "Pass outlasted the poll interval, skipping missed ticks"
                );
                self.emit(PollEvent::TickSkipped);
            }
        }

        tracing::info!("Poller stopped");
    }

    /// Stop the loop
    pub fn stop(&self) {
        self.shutdown_tx.send_replace(true);
    }

    /// Run a single pass and publish its outcome.
    ///
    /// Waits for any pass already in flight to finish first.
    pub(crate) async fn poll_once(&self) -> Result<PassReport, PassError> {
        let _pass = self.pass_lock.lock().await;
        let pass_id = PassId::generate();
        let result = self.engine.run_pass(pass_id).await;

        let event = match &result {
            Ok(report) => PollEvent::PassCompleted {
                pass_id,
                ad_count: report.ad_count,
                stack_count: report.stack_count,
                findings: report.findings.clone(),
                duration_ms: report.duration_ms(),
            },
            Err(e) => PollEvent::PassAborted {
                pass_id,
                class: e.class().to_string(),
                reason: e.to_string(),
            },
        };
        self.emit(event);

        result
    }

    /// Subscribe to pass events
    pub fn subscribe(&self) -> broadcast::Receiver<PollEventEnvelope> {
        self.event_tx.subscribe()
    }

    pub fn reporter(&self) -> &str {
        &self.reporter
    }

    fn emit(&self, event: PollEvent) {
        // No subscribers is fine
        let _ = self
            .event_tx
            .send(PollEventEnvelope::new(event).with_reporter(self.reporter.as_str()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inventory::{InMemoryDirectory, InMemoryStacks};
    use annex_types::{AnnexAdvertisement, EventSeverity};

    struct Harness {
        directory: Arc<InMemoryDirectory>,
        stacks: Arc<InMemoryStacks>,
        poller: Arc<Poller>,
        trigger_rx: Option<mpsc::Receiver<()>>,
        events: broadcast::Receiver<PollEventEnvelope>,
    }

    fn harness(interval: Duration) -> Harness {
        let directory = Arc::new(InMemoryDirectory::new(vec![AnnexAdvertisement::for_project("p-1")]));
        let stacks = Arc::new(InMemoryStacks::default());
        let engine = Arc::new(ReconcileEngine::new(
            directory.clone(),
            stacks.clone(),
            Duration::from_secs(3600),
        ));
        let (event_tx, events) = broadcast::channel(64);
        let (poller, trigger_rx) = Poller::new(engine, interval, "submit.test", event_tx);
        Harness {
            directory,
            stacks,
            poller,
            trigger_rx: Some(trigger_rx),
            events,
        }
    }

    impl Harness {
        fn spawn(&mut self) -> tokio::task::JoinHandle<()> {
            let poller = self.poller.clone();
            let rx = self.trigger_rx.take().unwrap();
            tokio::spawn(async move { poller.start(rx).await })
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_passes_follow_interval() {
        let mut h = harness(Duration::from_secs(60));
        let handle = h.spawn();

        tokio::time::sleep(Duration::from_secs(150)).await;
        assert_eq!(h.directory.fetch_count(), 3);

        h.poller.stop();
        handle.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_triggers_coalesce() {
        let mut h = harness(Duration::from_secs(60));
        assert!(h.poller.trigger_reconcile());
        assert!(!h.poller.trigger_reconcile());
        assert!(!h.poller.trigger_reconcile());

        let handle = h.spawn();
        tokio::time::sleep(Duration::from_secs(30)).await;

        // Startup tick plus one coalesced trigger
        assert_eq!(h.directory.fetch_count(), 2);

        h.poller.stop();
        handle.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_abandons_in_flight_pass() {
        let mut h = harness(Duration::from_secs(60));
        h.directory.delay_by(Duration::from_secs(1000)).await;
        let handle = h.spawn();

        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(h.directory.fetch_count(), 1);

        h.poller.stop();
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("poller did not stop")
            .unwrap();
        assert!(h.events.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_before_start() {
        let mut h = harness(Duration::from_secs(60));
        h.poller.stop();
        h.spawn().await.unwrap();
        assert_eq!(h.directory.fetch_count(), 0);
    }

    #[tokio::test]
    async fn test_poll_once_events() {
        let mut h = harness(Duration::from_secs(60));

        let report = h.poller.poll_once().await.unwrap();
        assert_eq!(report.findings.len(), 1);
        let envelope = h.events.recv().await.unwrap();
        assert_eq!(envelope.severity, EventSeverity::Warning);
        assert_eq!(envelope.reporter.as_deref(), Some("submit.test"));
        assert!(matches!(envelope.event, PollEvent::PassCompleted { ad_count: 1, stack_count: 0, .. }));

        h.stacks.fail_with("connection reset").await;
        assert!(h.poller.poll_once().await.is_err());
        let envelope = h.events.recv().await.unwrap();
        assert_eq!(envelope.severity, EventSeverity::Error);
        match envelope.event {
            PollEvent::PassAborted { class, .. } => assert_eq!(class, "transport"),
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_passes_never_overlap() {
        let h = harness(Duration::from_secs(60));
        h.directory.delay_by(Duration::from_secs(10)).await;

        let spawn_pass = |poller: Arc<Poller>| tokio::spawn(async move { poller.poll_once().await });
        let first = spawn_pass(h.poller.clone());
        let second = spawn_pass(h.poller.clone());

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(h.directory.fetch_count(), 1);

        first.await.unwrap().unwrap();
        second.await.unwrap().unwrap();
        assert_eq!(h.directory.fetch_count(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_long_pass_skips_ticks() {
        let mut h = harness(Duration::from_secs(10));
        h.stacks.delay_by(Duration::from_secs(25)).await;
        let handle = h.spawn();

        tokio::time::sleep(Duration::from_secs(30)).await;
        h.poller.stop();
        handle.await.unwrap();

        let mut saw_skip = false;
        while let Ok(envelope) = h.events.try_recv() {
            if matches!(envelope.event, PollEvent::TickSkipped) {
                saw_skip = true;
            }
        }
        assert!(saw_skip);
        assert_eq!(h.stacks.fetch_count(), 2);
    }
}
