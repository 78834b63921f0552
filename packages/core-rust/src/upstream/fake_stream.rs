//! Fake-stream flag derived from the inbound request path.
//!
//! Requests arriving under `/fake-stream` are answered with a streamed
//! response assembled from a single non-streaming upstream call. The flag is
//! derived from the path alone and written onto the request body.

use serde_json::Value;
use tracing::{debug, warn};

/// Path prefix that marks a fake-stream request.
pub const FAKE_STREAM_PREFIX: &str = "/fake-stream";

/// Field name used when the request body is raw JSON.
const FAKE_STREAM_FIELD: &str = "fake_stream";

/// Whether `path` is served in fake-stream mode.
#[must_use]
pub fn is_fake_stream_path(path: &str) -> bool {
    path.starts_with(FAKE_STREAM_PREFIX)
}

/// A request body that can carry the fake-stream flag.
pub trait FakeStreamTarget {
    /// Sets the flag. Returns `false` if this body cannot carry it.
    fn set_fake_stream(&mut self, enabled: bool) -> bool;
}

impl FakeStreamTarget for Value {
    fn set_fake_stream(&mut self, enabled: bool) -> bool {
        match self {
            Value::Object(map) => {
                map.insert(FAKE_STREAM_FIELD.to_string(), Value::Bool(enabled));
                true
            }
            _ => false,
        }
    }
}

impl FakeStreamTarget for serde_json::Map<String, Value> {
    fn set_fake_stream(&mut self, enabled: bool) -> bool {
        self.insert(FAKE_STREAM_FIELD.to_string(), Value::Bool(enabled));
        true
    }
}

/// Derives the flag from `path` and writes it onto `body`.
///
/// Returns the derived flag. A body that cannot carry the flag is left
/// unchanged and the request proceeds with its existing settings.
pub fn apply_fake_stream<T: FakeStreamTarget + ?Sized>(path: &str, body: &mut T) -> bool {
    let enabled = is_fake_stream_path(path);
    if body.set_fake_stream(enabled) {
        debug!(path, fake_stream = enabled, "applied fake-stream flag");
    } else {
        warn!(path, "request body cannot carry the fake-stream flag");
    }
    enabled
}
