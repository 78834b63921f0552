//! Tokio-backed operation handles and the scheduler that spawns them.

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use relaygate_core::OperationKey;
use tokio::task::{AbortHandle, JoinHandle};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::handle::{HandleError, OperationHandle, OperationState};
use crate::registry::OperationRegistry;

/// How a scheduled operation ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OperationOutcome<T> {
    Completed(T),
    Cancelled,
}

impl<T> OperationOutcome<T> {
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }

    pub fn into_completed(self) -> Option<T> {
        match self {
            Self::Completed(value) => Some(value),
            Self::Cancelled => None,
        }
    }
}

// ---------------------------------------------------------------------------
// TaskHandle
// ---------------------------------------------------------------------------

/// Handle to an operation running as a tokio task.
///
/// Holds an [`AbortHandle`] only to ask whether the task has finished; the
/// task's output stays with the caller's `JoinHandle`. Cancellation goes
/// through a [`CancellationToken`] that the task races against its work, so
/// it takes effect at the operation's next await point.
#[derive(Debug, Clone)]
pub struct TaskHandle {
    task: AbortHandle,
    token: CancellationToken,
    /// Set by the task when it stopped because of the token.
    stopped_by_cancel: Arc<AtomicBool>,
}

impl OperationHandle for TaskHandle {
    fn state(&self) -> Result<OperationState, HandleError> {
        if !self.task.is_finished() {
            return Ok(OperationState::Running);
        }
        if self.stopped_by_cancel.load(Ordering::Acquire) {
            Ok(OperationState::Cancelled)
        } else {
            Ok(OperationState::Completed)
        }
    }

    fn cancel(&self) {
        self.token.cancel();
    }
}

// ---------------------------------------------------------------------------
// OperationScheduler
// ---------------------------------------------------------------------------

/// Spawns operations on the tokio runtime and tracks them in a registry.
#[derive(Clone)]
pub struct OperationScheduler {
    registry: Arc<OperationRegistry>,
}

impl OperationScheduler {
    #[must_use]
    pub fn new(registry: Arc<OperationRegistry>) -> Self {
        Self { registry }
    }

    #[must_use]
    pub fn registry(&self) -> &Arc<OperationRegistry> {
        &self.registry
    }

    /// Spawns `operation` and tracks it under `key`.
    ///
    /// The caller keeps the returned `JoinHandle` to collect the result; the
    /// registry only holds a [`TaskHandle`].
    pub fn spawn<F>(&self, key: impl Into<OperationKey>, operation: F) -> JoinHandle<OperationOutcome<F::Output>>
    where
        F: Future + Send + 'static,
        F::Output: Send + 'static,
    {
        self.spawn_with_token(key, |_| operation)
    }

    /// Like [`spawn`](Self::spawn), but hands the operation a token that fires
    /// on cancellation so it can clean up or stop between its own steps.
    pub fn spawn_with_token<F, Fut>(
        &self,
        key: impl Into<OperationKey>,
        make_operation: F,
    ) -> JoinHandle<OperationOutcome<Fut::Output>>
    where
        F: FnOnce(CancellationToken) -> Fut,
        Fut: Future + Send + 'static,
        Fut::Output: Send + 'static,
    {
        let key = key.into();
        let token = CancellationToken::new();
        let stopped_by_cancel = Arc::new(AtomicBool::new(false));
        let operation = make_operation(token.child_token());

        let task_token = token.clone();
        let task_flag = Arc::clone(&stopped_by_cancel);
        let join = tokio::spawn(async move {
            tokio::select! {
                biased;
                () = task_token.cancelled() => {
                    task_flag.store(true, Ordering::Release);
                    OperationOutcome::Cancelled
                }
                output = operation => OperationOutcome::Completed(output),
            }
        });

        let handle = Arc::new(TaskHandle {
            task: join.abort_handle(),
            token,
            stopped_by_cancel,
        });
        debug!(%key, "tracking spawned operation");
        self.registry.insert(key, handle);
        join
    }
}
