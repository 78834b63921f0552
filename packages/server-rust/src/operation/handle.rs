//! The handle contract the registry tracks.

/// Lifecycle state of a tracked operation, read live from its handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperationState {
    /// Still executing (including operations asked to cancel that have not yet stopped).
    Running,
    /// Finished on its own, successfully or not.
    Completed,
    /// Finished after observing a cancellation request.
    Cancelled,
}

impl OperationState {
    /// `true` for `Completed` and `Cancelled`.
    #[must_use]
    pub fn is_finished(self) -> bool {
        !matches!(self, Self::Running)
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
        }
    }
}

/// A handle whose state can no longer be queried.
///
/// This is a broken contract, not a normal outcome; callers must surface it
/// instead of assuming the operation is still running.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum HandleError {
    #[error("operation handle is detached from its operation")]
    Detached,
    #[error("operation handle state query failed: {0}")]
    QueryFailed(String),
}

/// A shared, non-owning reference to an in-flight operation.
///
/// Implementations must answer both methods promptly: the registry calls them
/// while holding a shard lock.
pub trait OperationHandle: Send + Sync {
    /// Current lifecycle state.
    ///
    /// # Errors
    ///
    /// Returns a [`HandleError`] if the underlying operation cannot be queried.
    fn state(&self) -> Result<OperationState, HandleError>;

    /// Requests cooperative cancellation. Must not block, and must be
    /// harmless when called repeatedly or after the operation finished.
    fn cancel(&self);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finished_states() {
        assert!(!OperationState::Running.is_finished());
        assert!(OperationState::Completed.is_finished());
        assert!(OperationState::Cancelled.is_finished());
    }

    #[test]
    fn state_labels() {
        assert_eq!(OperationState::Running.as_str(), "running");
        assert_eq!(OperationState::Cancelled.as_str(), "cancelled");
    }
}
