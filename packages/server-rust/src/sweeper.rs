//! Periodic registry hygiene.
//!
//! The sweeper drops finished operations on every tick and, on its own slower
//! cadence, asks over-age operations to cancel. The two passes are independent
//! so the cheap cleanup can run often while forced cancellation stays rare.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::oneshot;
use tokio::time::Instant;
use tracing::error;

use crate::config::TrackerConfig;
use crate::registry::{OperationRegistry, RegistryError};
use crate::worker::BackgroundRunnable;

/// Counter: sweeps that hit a handle whose state could not be read.
pub const SWEEP_FAULTS: &str = "relaygate_sweep_faults_total";

/// On-demand sweep requests.
#[derive(Debug)]
pub enum SweepTask {
    /// Drop finished operations now.
    Completed,
    /// Cancel over-age operations now.
    Stale,
    /// Both passes.
    Full,
    /// Both passes, reporting the result.
    Flush(oneshot::Sender<SweepSummary>),
}

/// What a sweep did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepSummary {
    pub removed: usize,
    pub cancel_requested: usize,
    /// Faulty entries seen, counted once per pass that hit them.
    pub faults: usize,
}

/// [`BackgroundRunnable`] that sweeps an [`OperationRegistry`].
pub struct Sweeper {
    registry: Arc<OperationRegistry>,
    max_age: Duration,
    stale_interval: Duration,
    last_stale: Instant,
}

impl Sweeper {
    #[must_use]
    pub fn new(registry: Arc<OperationRegistry>, config: &TrackerConfig) -> Self {
        Self {
            registry,
            max_age: config.max_operation_age,
            stale_interval: config.stale_sweep_interval,
            last_stale: Instant::now(),
        }
    }

    fn sweep_completed(&self, summary: &mut SweepSummary) {
        match self.registry.sweep_completed() {
            Ok(removed) => summary.removed += removed,
            Err(err) => {
                summary.removed += err.progress().removed;
                record_fault(&err, summary);
            }
        }
    }

    fn sweep_stale(&mut self, summary: &mut SweepSummary) {
        self.last_stale = Instant::now();
        match self.registry.sweep_stale(self.max_age) {
            Ok(report) => summary.cancel_requested += report.requested(),
            Err(err) => {
                summary.cancel_requested += err.progress().cancellation.requested();
                record_fault(&err, summary);
            }
        }
    }

    fn sweep_full(&mut self) -> SweepSummary {
        let mut summary = SweepSummary::default();
        self.sweep_completed(&mut summary);
        self.sweep_stale(&mut summary);
        summary
    }
}

fn record_fault(err: &RegistryError, summary: &mut SweepSummary) {
    let faulty = err.progress().faulty;
    error!(error = %err, faulty, "registry sweep hit a broken operation handle");
    metrics::counter!(SWEEP_FAULTS).increment(faulty as u64);
    summary.faults += faulty;
}

#[async_trait]
impl BackgroundRunnable for Sweeper {
    type Task = SweepTask;

    fn name(&self) -> &'static str {
        "operation-sweeper"
    }

    async fn run(&mut self, task: SweepTask) {
        let mut summary = SweepSummary::default();
        match task {
            SweepTask::Completed => self.sweep_completed(&mut summary),
            SweepTask::Stale => self.sweep_stale(&mut summary),
            SweepTask::Full => {
                self.sweep_full();
            }
            SweepTask::Flush(reply) => {
                let _ = reply.send(self.sweep_full());
            }
        }
    }

    async fn on_tick(&mut self) {
        let mut summary = SweepSummary::default();
        self.sweep_completed(&mut summary);
        if self.last_stale.elapsed() >= self.stale_interval {
            self.sweep_stale(&mut summary);
        }
    }

    async fn shutdown(&mut self) {
        // Last chance to drop entries for work that already finished.
        let mut summary = SweepSummary::default();
        self.sweep_completed(&mut summary);
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::Ordering;

    use super::*;
    use crate::test_support::{FixedClock, ScriptedHandle};
    use crate::worker::BackgroundWorker;

    fn config() -> TrackerConfig {
        TrackerConfig {
            completed_sweep_interval: Duration::from_secs(1),
            stale_sweep_interval: Duration::from_secs(5),
            max_operation_age: Duration::from_secs(10),
            ..TrackerConfig::default()
        }
    }

    #[tokio::test(start_paused = true)]
    async fn ticks_run_completed_often_and_stale_on_its_own_interval() {
        let (clock, time) = FixedClock::new(0);
        let registry: Arc<OperationRegistry> = Arc::new(OperationRegistry::with_clock(clock));
        let done = ScriptedHandle::running();
        let hung = ScriptedHandle::running();
        registry.insert("done", done.clone());
        registry.insert("hung", hung.clone());
        done.complete();
        time.store(20_000, Ordering::Relaxed);

        let config = config();
        let mut worker = BackgroundWorker::start(
            Sweeper::new(Arc::clone(&registry), &config),
            config.completed_sweep_interval,
            config.sweep_channel_capacity,
        );

        tokio::time::sleep(Duration::from_millis(1_500)).await;
        assert!(!registry.contains_key("done"));
        assert_eq!(hung.cancel_calls(), 0);

        tokio::time::sleep(Duration::from_secs(4)).await;
        assert_eq!(hung.cancel_calls(), 1);
        assert!(registry.contains_key("hung"));

        hung.observe_cancel();
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert!(registry.is_empty());

        worker.stop().await;
    }

    #[tokio::test]
    async fn flush_reports_summary() {
        let (clock, time) = FixedClock::new(0);
        let registry: Arc<OperationRegistry> = Arc::new(OperationRegistry::with_clock(clock));
        let done = ScriptedHandle::running();
        let old = ScriptedHandle::running();
        let broken = ScriptedHandle::running();
        registry.insert("done", done.clone());
        registry.insert("old", old.clone());
        registry.insert("broken", broken.clone());
        done.complete();
        broken.break_handle();
        time.store(60_000, Ordering::Relaxed);

        let config = config();
        let mut worker = BackgroundWorker::start(
            Sweeper::new(Arc::clone(&registry), &config),
            Duration::from_secs(3600),
            4,
        );

        let (tx, rx) = oneshot::channel();
        worker.submit(SweepTask::Flush(tx)).await.unwrap();
        let summary = rx.await.unwrap();

        // The broken handle faults both passes; the worker keeps going.
        assert_eq!(
            summary,
            SweepSummary {
                removed: 1,
                cancel_requested: 1,
                faults: 2,
            }
        );
        assert!(worker.is_running());
        assert!(registry.contains_key("broken"));

        worker.stop().await;
    }

    #[tokio::test]
    async fn faulted_passes_still_report_their_work() {
        let (clock, time) = FixedClock::new(0);
        let registry: Arc<OperationRegistry> = Arc::new(OperationRegistry::with_clock(clock));
        let broken = ScriptedHandle::running();
        let failing = ScriptedHandle::running();
        registry.insert("broken", broken.clone());
        registry.insert("failing", failing.clone());
        for i in 0..3 {
            let done = ScriptedHandle::running();
            registry.insert(format!("done-{i}"), done.clone());
            done.complete();
        }
        registry.insert("old-a", ScriptedHandle::running());
        registry.insert("old-b", ScriptedHandle::running());
        broken.break_handle();
        failing.fail_query("timeout");
        time.store(60_000, Ordering::Relaxed);

        let mut sweeper = Sweeper::new(Arc::clone(&registry), &config());
        let (tx, rx) = oneshot::channel();
        sweeper.run(SweepTask::Flush(tx)).await;

        assert_eq!(
            rx.await.unwrap(),
            SweepSummary {
                removed: 3,
                cancel_requested: 2,
                faults: 4,
            }
        );
        assert_eq!(registry.len(), 4);
    }

    #[tokio::test]
    async fn shutdown_hook_drops_finished_entries() {
        let registry: Arc<OperationRegistry> = Arc::new(OperationRegistry::new());
        let done = ScriptedHandle::running();
        registry.insert("done", done.clone());
        done.complete();

        let mut worker = BackgroundWorker::start(
            Sweeper::new(Arc::clone(&registry), &config()),
            Duration::from_secs(3600),
            4,
        );
        worker.stop().await;
        assert!(registry.is_empty());
    }
}
