//! Tracker configuration.

use std::time::Duration;

/// Controls sweep cadence, the stale-operation threshold, and shutdown behavior.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackerConfig {
    /// Interval between sweeps that drop finished operations.
    pub completed_sweep_interval: Duration,
    /// Interval between sweeps that cancel over-age operations.
    pub stale_sweep_interval: Duration,
    /// Running operations older than this are asked to cancel.
    pub max_operation_age: Duration,
    /// Whether shutdown asks still-running operations to cancel.
    pub cancel_on_shutdown: bool,
    /// Capacity of the on-demand sweep request channel.
    pub sweep_channel_capacity: usize,
}

/// A configuration value the tracker cannot run with.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("{field} must be greater than zero")]
    Zero { field: &'static str },
    /// Stale passes ride on the completed-sweep tick, so they cannot run more often.
    #[error(
        "stale_sweep_interval ({stale:?}) must not be shorter than completed_sweep_interval ({completed:?})"
    )]
    StaleFasterThanCompleted {
        stale: Duration,
        completed: Duration,
    },
}

impl TrackerConfig {
    /// Checks values that would otherwise panic inside the sweeper.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Zero`] for a zero interval or channel capacity,
    /// and [`ConfigError::StaleFasterThanCompleted`] when the stale interval is
    /// shorter than the completed-sweep interval.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.completed_sweep_interval.is_zero() {
            return Err(ConfigError::Zero {
                field: "completed_sweep_interval",
            });
        }
        if self.stale_sweep_interval.is_zero() {
            return Err(ConfigError::Zero {
                field: "stale_sweep_interval",
            });
        }
        if self.sweep_channel_capacity == 0 {
            return Err(ConfigError::Zero {
                field: "sweep_channel_capacity",
            });
        }
        if self.stale_sweep_interval < self.completed_sweep_interval {
            return Err(ConfigError::StaleFasterThanCompleted {
                stale: self.stale_sweep_interval,
                completed: self.completed_sweep_interval,
            });
        }
        Ok(())
    }
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            completed_sweep_interval: Duration::from_secs(10),
            stale_sweep_interval: Duration::from_secs(60),
            max_operation_age: Duration::from_secs(300),
            cancel_on_shutdown: true,
            sweep_channel_capacity: 64,
        }
    }
}
