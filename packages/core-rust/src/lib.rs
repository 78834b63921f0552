//! relaygate core: operation keys, clock abstraction, and upstream request configuration.

pub mod clock;
pub mod key;
pub mod upstream;

pub use clock::{ClockSource, SystemClock};
pub use key::OperationKey;
pub use upstream::{Resolved, UpstreamSettings};
