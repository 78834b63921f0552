//! Operation handles: the contract the registry tracks and its tokio implementation.

pub mod handle;
pub mod task;

pub use handle::{HandleError, OperationHandle, OperationState};
pub use task::{OperationOutcome, OperationScheduler, TaskHandle};
