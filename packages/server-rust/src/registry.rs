//! Active operation registry.
//!
//! Tracks in-flight upstream operations by caller-supplied key so the gateway
//! can find and deduplicate work, reclaim entries for operations that already
//! finished, and cancel operations that outlive the configured maximum age.
//!
//! The map is a `DashMap`, so every per-key read-modify-write (replace on
//! insert, age check plus cancel in a stale sweep) happens under that key's
//! shard lock. Sweeps iterate shard by shard and tolerate concurrent inserts
//! and removals of other keys.

use std::sync::Arc;
use std::time::Duration;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use relaygate_core::clock::elapsed_ms;
use relaygate_core::{ClockSource, OperationKey, SystemClock};
use tracing::{debug, info, warn};

use crate::operation::{HandleError, OperationHandle, OperationState};

/// Gauge: number of entries currently tracked, moved on each insert or removal.
pub const ACTIVE_OPERATIONS: &str = "relaygate_active_operations";
/// Counter: entries removed by completed sweeps.
pub const SWEPT_OPERATIONS: &str = "relaygate_swept_operations_total";
/// Counter: cancellation requests issued by stale sweeps.
pub const STALE_CANCELLATIONS: &str = "relaygate_stale_cancellations_total";

// ---------------------------------------------------------------------------
// Errors and reports
// ---------------------------------------------------------------------------

/// Errors surfaced by registry sweeps.
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    /// A handle could not report its state. The entry is kept so it stays visible.
    ///
    /// `progress` holds what the pass still did over the other entries.
    #[error("handle for operation `{key}` violated its contract: {source}")]
    HandleFault {
        key: OperationKey,
        #[source]
        source: HandleError,
        progress: SweepProgress,
    },
}

impl RegistryError {
    /// Work completed by the faulted pass.
    #[must_use]
    pub fn progress(&self) -> &SweepProgress {
        match self {
            Self::HandleFault { progress, .. } => progress,
        }
    }
}

/// What a sweep pass did, including a pass that hit faulty handles.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepProgress {
    /// Entries removed by a completed sweep.
    pub removed: usize,
    /// Cancellation requests issued by a stale sweep.
    pub cancellation: StaleSweep,
    /// Entries whose handle failed its state query.
    pub faulty: usize,
}

/// Result of a stale sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StaleSweep {
    /// Entries asked to cancel for the first time.
    pub first_requests: usize,
    /// Entries asked again because an earlier request has not been honored yet.
    pub repeated: usize,
}

impl StaleSweep {
    /// Total cancellation requests issued in this pass.
    #[must_use]
    pub fn requested(&self) -> usize {
        self.first_requests + self.repeated
    }
}

/// Point-in-time view of one entry, for diagnostics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntrySnapshot {
    pub key: OperationKey,
    pub age_ms: u64,
    pub cancel_requests: u32,
    pub cancel_requested_at_ms: Option<u64>,
}

// ---------------------------------------------------------------------------
// OperationEntry
// ---------------------------------------------------------------------------

/// Bookkeeping record stored per key.
///
/// The registry owns the record, never the operation: `handle` is shared with
/// whoever spawned the work.
struct OperationEntry<H: ?Sized> {
    handle: Arc<H>,
    /// Registry clock reading at insertion; the only basis for age.
    started_at_ms: u64,
    /// When a stale sweep first asked this operation to cancel.
    cancel_requested_at_ms: Option<u64>,
    cancel_requests: u32,
}

impl<H: ?Sized> OperationEntry<H> {
    fn new(handle: Arc<H>, started_at_ms: u64) -> Self {
        Self {
            handle,
            started_at_ms,
            cancel_requested_at_ms: None,
            cancel_requests: 0,
        }
    }
}

// ---------------------------------------------------------------------------
// OperationRegistry
// ---------------------------------------------------------------------------

/// Thread-safe registry of in-flight operations keyed by [`OperationKey`].
///
/// Generic over the handle type so tests and embedders can use concrete
/// handles; defaults to `dyn OperationHandle`.
pub struct OperationRegistry<H: ?Sized = dyn OperationHandle> {
    entries: DashMap<OperationKey, OperationEntry<H>>,
    clock: Arc<dyn ClockSource>,
}

impl<H: OperationHandle + ?Sized> OperationRegistry<H> {
    /// Creates an empty registry stamped by the system clock.
    #[must_use]
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    /// Creates an empty registry that reads time from `clock`.
    #[must_use]
    pub fn with_clock(clock: Arc<dyn ClockSource>) -> Self {
        Self {
            entries: DashMap::new(),
            clock,
        }
    }

    /// Tracks `handle` under `key`, stamping the current time as its start.
    ///
    /// An existing entry under the same key is replaced without cancelling it;
    /// its handle is returned so the caller can decide what to do with work
    /// that is no longer reachable through the registry.
    pub fn insert(&self, key: impl Into<OperationKey>, handle: Arc<H>) -> Option<Arc<H>> {
        let entry = OperationEntry::new(handle, self.clock.now());
        let previous = match self.entries.entry(key.into()) {
            Entry::Occupied(mut occupied) => {
                debug!(key = %occupied.key(), "replacing tracked operation");
                Some(occupied.insert(entry).handle)
            }
            Entry::Vacant(vacant) => {
                vacant.insert(entry);
                metrics::gauge!(ACTIVE_OPERATIONS).increment(1.0);
                None
            }
        };
        previous
    }

    /// Returns the handle tracked under `key`, if any.
    pub fn get(&self, key: &str) -> Option<Arc<H>> {
        self.entries.get(key).map(|entry| Arc::clone(&entry.handle))
    }

    /// Stops tracking `key`. Returns whether an entry was removed.
    ///
    /// The operation itself is left untouched.
    pub fn remove(&self, key: &str) -> bool {
        let removed = self.entries.remove(key).is_some();
        if removed {
            metrics::gauge!(ACTIVE_OPERATIONS).decrement(1.0);
        }
        removed
    }

    #[must_use]
    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Removes every entry whose operation has completed or been cancelled.
    ///
    /// Never cancels anything. Returns the number of entries removed.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::HandleFault`] for the first handle whose state
    /// query failed. The pass still covers every other entry, faulty entries
    /// are kept, and the error's progress carries the removal count.
    pub fn sweep_completed(&self) -> Result<usize, RegistryError> {
        let mut progress = SweepProgress::default();
        let mut first_fault = None;

        self.entries.retain(|key, entry| match entry.handle.state() {
            Ok(state) if state.is_finished() => {
                progress.removed += 1;
                false
            }
            Ok(_) => true,
            Err(source) => {
                progress.faulty += 1;
                first_fault.get_or_insert_with(|| (key.clone(), source));
                true
            }
        });

        if progress.removed > 0 {
            debug!(removed = progress.removed, "swept finished operations");
            metrics::counter!(SWEPT_OPERATIONS).increment(progress.removed as u64);
            metrics::gauge!(ACTIVE_OPERATIONS).decrement(as_gauge(progress.removed));
        }

        match first_fault {
            Some((key, source)) => Err(RegistryError::HandleFault {
                key,
                source,
                progress,
            }),
            None => Ok(progress.removed),
        }
    }

    /// Requests cancellation of every running operation older than `max_age`.
    ///
    /// Entries stay in the registry; a later [`sweep_completed`](Self::sweep_completed)
    /// removes them once the operation has actually stopped. Operations that
    /// ignore the request are asked again on every pass.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::HandleFault`] for the first over-age handle
    /// whose state query failed, after finishing the pass. The error's
    /// progress carries the cancellation requests that were still issued.
    pub fn sweep_stale(&self, max_age: Duration) -> Result<StaleSweep, RegistryError> {
        let max_age_ms = u64::try_from(max_age.as_millis()).unwrap_or(u64::MAX);
        let now = self.clock.now();
        let mut report = StaleSweep::default();
        let mut faulty = 0usize;
        let mut first_fault = None;

        for mut guard in self.entries.iter_mut() {
            let (key, entry) = guard.pair_mut();
            if elapsed_ms(entry.started_at_ms, now) <= max_age_ms {
                continue;
            }
            match entry.handle.state() {
                Ok(OperationState::Running) => {
                    entry.handle.cancel();
                    if entry.cancel_requests == 0 {
                        report.first_requests += 1;
                    } else {
                        report.repeated += 1;
                    }
                    entry.cancel_requests = entry.cancel_requests.saturating_add(1);
                    entry.cancel_requested_at_ms.get_or_insert(now);
                }
                Ok(_) => {}
                Err(source) => {
                    faulty += 1;
                    first_fault.get_or_insert_with(|| (key.clone(), source));
                }
            }
        }

        if report.requested() > 0 {
            warn!(
                requested = report.requested(),
                first = report.first_requests,
                repeated = report.repeated,
                max_age_secs = max_age.as_secs(),
                "requested cancellation of long-running operations"
            );
            metrics::counter!(STALE_CANCELLATIONS).increment(report.requested() as u64);
        }

        match first_fault {
            Some((key, source)) => Err(RegistryError::HandleFault {
                key,
                source,
                progress: SweepProgress {
                    cancellation: report,
                    faulty,
                    ..SweepProgress::default()
                },
            }),
            None => Ok(report),
        }
    }

    /// Removes every entry, optionally asking each operation to cancel first.
    ///
    /// Used during shutdown. Returns the number of entries drained.
    pub fn shutdown(&self, cancel_running: bool) -> usize {
        let keys: Vec<OperationKey> = self.entries.iter().map(|entry| entry.key().clone()).collect();

        let mut drained = 0usize;
        for key in keys {
            if let Some((_, entry)) = self.entries.remove(&key) {
                if cancel_running {
                    entry.handle.cancel();
                }
                drained += 1;
            }
        }

        if drained > 0 {
            info!(drained, cancel_running, "drained operation registry");
            metrics::gauge!(ACTIVE_OPERATIONS).decrement(as_gauge(drained));
        }
        drained
    }

    /// Per-entry ages and cancellation markers, in no particular order.
    #[must_use]
    pub fn snapshot(&self) -> Vec<EntrySnapshot> {
        let now = self.clock.now();
        self.entries
            .iter()
            .map(|guard| EntrySnapshot {
                key: guard.key().clone(),
                age_ms: elapsed_ms(guard.started_at_ms, now),
                cancel_requests: guard.cancel_requests,
                cancel_requested_at_ms: guard.cancel_requested_at_ms,
            })
            .collect()
    }
}

#[allow(clippy::cast_precision_loss)]
fn as_gauge(count: usize) -> f64 {
    count as f64
}

impl<H: OperationHandle + ?Sized> Default for OperationRegistry<H> {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
