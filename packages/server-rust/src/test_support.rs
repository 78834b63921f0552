//! Deterministic clocks and scriptable handles shared by unit tests.

use std::sync::atomic::{AtomicU32, AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;

use metrics::{
    Counter, Gauge, GaugeFn, Histogram, Key, KeyName, Metadata, Recorder, SharedString, Unit,
};
use parking_lot::Mutex;
use relaygate_core::ClockSource;

use crate::operation::{HandleError, OperationHandle, OperationState};

/// A deterministic clock source for testing. Time is controlled explicitly.
pub(crate) struct FixedClock {
    time: Arc<AtomicU64>,
}

impl FixedClock {
    pub(crate) fn new(initial: u64) -> (Arc<Self>, Arc<AtomicU64>) {
        let time = Arc::new(AtomicU64::new(initial));
        (Arc::new(Self { time: time.clone() }), time)
    }
}

impl ClockSource for FixedClock {
    fn now(&self) -> u64 {
        self.time.load(Ordering::Relaxed)
    }
}

const RUNNING: u8 = 0;
const COMPLETED: u8 = 1;
const CANCELLED: u8 = 2;

/// Handle whose state is set by the test.
///
/// By default `cancel()` only records the request, modelling an operation
/// that has not yet reached an await point. `honoring()` builds one that
/// switches to `Cancelled` immediately.
pub(crate) struct ScriptedHandle {
    state: AtomicU8,
    cancel_calls: AtomicU32,
    honors_cancel: bool,
    fault: Mutex<Option<HandleError>>,
}

impl ScriptedHandle {
    pub(crate) fn running() -> Arc<Self> {
        Arc::new(Self {
            state: AtomicU8::new(RUNNING),
            cancel_calls: AtomicU32::new(0),
            honors_cancel: false,
            fault: Mutex::new(None),
        })
    }

    pub(crate) fn honoring() -> Arc<Self> {
        Arc::new(Self {
            state: AtomicU8::new(RUNNING),
            cancel_calls: AtomicU32::new(0),
            honors_cancel: true,
            fault: Mutex::new(None),
        })
    }

    pub(crate) fn complete(&self) {
        self.state.store(COMPLETED, Ordering::SeqCst);
    }

    pub(crate) fn observe_cancel(&self) {
        self.state.store(CANCELLED, Ordering::SeqCst);
    }

    /// Makes every later state query fail as detached.
    pub(crate) fn break_handle(&self) {
        *self.fault.lock() = Some(HandleError::Detached);
    }

    /// Makes every later state query fail with `reason`.
    pub(crate) fn fail_query(&self, reason: &str) {
        *self.fault.lock() = Some(HandleError::QueryFailed(reason.to_string()));
    }

    pub(crate) fn cancel_calls(&self) -> u32 {
        self.cancel_calls.load(Ordering::SeqCst)
    }
}

impl OperationHandle for ScriptedHandle {
    fn state(&self) -> Result<OperationState, HandleError> {
        if let Some(fault) = self.fault.lock().clone() {
            return Err(fault);
        }
        Ok(match self.state.load(Ordering::SeqCst) {
            RUNNING => OperationState::Running,
            COMPLETED => OperationState::Completed,
            _ => OperationState::Cancelled,
        })
    }

    fn cancel(&self) {
        self.cancel_calls.fetch_add(1, Ordering::SeqCst);
        if self.honors_cancel {
            self.observe_cancel();
        }
    }
}

/// Gauge value shared with [`GaugeRecorder`].
#[derive(Default)]
pub(crate) struct TrackedGauge(Mutex<f64>);

impl TrackedGauge {
    pub(crate) fn value(&self) -> f64 {
        *self.0.lock()
    }
}

impl GaugeFn for TrackedGauge {
    fn increment(&self, value: f64) {
        *self.0.lock() += value;
    }

    fn decrement(&self, value: f64) {
        *self.0.lock() -= value;
    }

    fn set(&self, value: f64) {
        *self.0.lock() = value;
    }
}

/// Recorder that tracks a single gauge by name and drops everything else.
///
/// Install it with `metrics::with_local_recorder`; it only sees metrics
/// emitted on the calling thread.
pub(crate) struct GaugeRecorder {
    name: &'static str,
    gauge: Arc<TrackedGauge>,
}

impl GaugeRecorder {
    pub(crate) fn new(name: &'static str) -> (Self, Arc<TrackedGauge>) {
        let gauge = Arc::new(TrackedGauge::default());
        (
            Self {
                name,
                gauge: Arc::clone(&gauge),
            },
            gauge,
        )
    }
}

impl Recorder for GaugeRecorder {
    fn describe_counter(&self, _: KeyName, _: Option<Unit>, _: SharedString) {}
    fn describe_gauge(&self, _: KeyName, _: Option<Unit>, _: SharedString) {}
    fn describe_histogram(&self, _: KeyName, _: Option<Unit>, _: SharedString) {}

    fn register_counter(&self, _: &Key, _: &Metadata<'_>) -> Counter {
        Counter::noop()
    }

    fn register_gauge(&self, key: &Key, _: &Metadata<'_>) -> Gauge {
        if key.name() == self.name {
            Gauge::from_arc(Arc::clone(&self.gauge))
        } else {
            Gauge::noop()
        }
    }

    fn register_histogram(&self, _: &Key, _: &Metadata<'_>) -> Histogram {
        Histogram::noop()
    }
}
