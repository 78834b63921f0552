//! `RelayGate` server: tracking and sweeping of in-flight upstream operations.
//!
//! The [`OperationRegistry`] maps request keys to live operation handles.
//! [`OperationTracker`] owns a registry plus the background sweeper that drops
//! finished entries and asks over-age operations to cancel.

pub mod config;
pub mod operation;
pub mod registry;
pub mod sweeper;
pub mod telemetry;
pub mod tracker;
pub mod worker;

#[cfg(test)]
mod test_support;

pub use config::{ConfigError, TrackerConfig};
pub use operation::{
    HandleError, OperationHandle, OperationOutcome, OperationScheduler, OperationState, TaskHandle,
};
pub use registry::{EntrySnapshot, OperationRegistry, RegistryError, StaleSweep, SweepProgress};
pub use sweeper::{SweepSummary, SweepTask, Sweeper};
pub use tracker::{OperationTracker, TrackerState};

#[cfg(test)]
mod tests {
    #[test]
    fn crate_loads() {
        // Empty body: if this test runs, the crate compiles and loads.
    }
}
