//! Operation tracker: explicit owner of the registry and its sweeper.
//!
//! Construct one per gateway process and hand out clones of
//! [`registry()`](OperationTracker::registry) or
//! [`scheduler()`](OperationTracker::scheduler) to request handlers.
//! `start()` launches the periodic sweeper; `shutdown()` stops it and drains
//! the registry.

use std::sync::Arc;

use arc_swap::ArcSwap;
use parking_lot::Mutex;
use relaygate_core::{ClockSource, SystemClock};
use tokio::sync::oneshot;
use tracing::info;

use crate::config::TrackerConfig;
use crate::operation::OperationScheduler;
use crate::registry::OperationRegistry;
use crate::sweeper::{SweepSummary, SweepTask, Sweeper};
use crate::worker::BackgroundWorker;

/// Tracker lifecycle.
///
/// State machine: Idle -> Running -> Stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackerState {
    /// Constructed; the registry accepts entries but nothing sweeps it.
    Idle,
    /// The sweeper is running.
    Running,
    /// Shut down; the registry has been drained.
    Stopped,
}

pub struct OperationTracker {
    config: TrackerConfig,
    registry: Arc<OperationRegistry>,
    worker: Mutex<Option<BackgroundWorker<Sweeper>>>,
    state: ArcSwap<TrackerState>,
}

impl OperationTracker {
    /// Creates an idle tracker whose registry reads the system clock.
    #[must_use]
    pub fn new(config: TrackerConfig) -> Self {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    #[must_use]
    pub fn with_clock(config: TrackerConfig, clock: Arc<dyn ClockSource>) -> Self {
        Self {
            config,
            registry: Arc::new(OperationRegistry::with_clock(clock)),
            worker: Mutex::new(None),
            state: ArcSwap::from_pointee(TrackerState::Idle),
        }
    }

    #[must_use]
    pub fn config(&self) -> &TrackerConfig {
        &self.config
    }

    #[must_use]
    pub fn registry(&self) -> Arc<OperationRegistry> {
        Arc::clone(&self.registry)
    }

    /// A scheduler that tracks what it spawns in this tracker's registry.
    #[must_use]
    pub fn scheduler(&self) -> OperationScheduler {
        OperationScheduler::new(self.registry())
    }

    #[must_use]
    pub fn state(&self) -> TrackerState {
        **self.state.load()
    }

    /// Launches the sweeper on the current tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid or the tracker has
    /// already been started.
    pub fn start(&self) -> anyhow::Result<()> {
        self.config.validate()?;

        let mut slot = self.worker.lock();
        let state = self.state();
        if state != TrackerState::Idle {
            anyhow::bail!("operation tracker cannot start from {state:?}");
        }

        let sweeper = Sweeper::new(self.registry(), &self.config);
        *slot = Some(BackgroundWorker::start(
            sweeper,
            self.config.completed_sweep_interval,
            self.config.sweep_channel_capacity,
        ));
        self.state.store(Arc::new(TrackerState::Running));

        info!(
            completed_interval_secs = self.config.completed_sweep_interval.as_secs(),
            stale_interval_secs = self.config.stale_sweep_interval.as_secs(),
            max_age_secs = self.config.max_operation_age.as_secs(),
            "operation tracker started"
        );
        Ok(())
    }

    /// Asks the sweeper to run a sweep now.
    ///
    /// # Errors
    ///
    /// Returns an error if the sweeper is not running.
    pub async fn request_sweep(&self, task: SweepTask) -> anyhow::Result<()> {
        let tx = self
            .worker
            .lock()
            .as_ref()
            .and_then(BackgroundWorker::sender)
            .ok_or_else(|| anyhow::anyhow!("sweeper not running"))?;
        tx.send(task)
            .await
            .map_err(|_| anyhow::anyhow!("sweeper channel closed"))
    }

    /// Runs both sweeps now and waits for their result.
    ///
    /// # Errors
    ///
    /// Returns an error if the sweeper is not running or stopped mid-request.
    pub async fn flush(&self) -> anyhow::Result<SweepSummary> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.request_sweep(SweepTask::Flush(reply_tx)).await?;
        reply_rx
            .await
            .map_err(|_| anyhow::anyhow!("sweeper stopped before replying"))
    }

    /// Stops the sweeper and drains the registry.
    ///
    /// Running operations are asked to cancel when `cancel_on_shutdown` is
    /// set; shutdown never waits for them. Returns the number of entries
    /// drained. Safe to call more than once.
    pub async fn shutdown(&self) -> usize {
        let worker = self.worker.lock().take();
        if let Some(mut worker) = worker {
            worker.stop().await;
        }

        let drained = self.registry.shutdown(self.config.cancel_on_shutdown);
        self.state.store(Arc::new(TrackerState::Stopped));
        info!(drained, "operation tracker stopped");
        drained
    }
}
