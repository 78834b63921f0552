//! Upstream request configuration.
//!
//! Stateless helpers that turn operator-supplied strings into the plain values
//! a caller needs when issuing an outbound request: the base URL, extra
//! headers, and the fake-stream flag. Invalid input never aborts; each helper
//! returns a tagged result that says whether the configured value was used or
//! a default was substituted, and why.

pub mod endpoint;
pub mod fake_stream;
pub mod headers;

use std::collections::BTreeMap;

use serde::Serialize;

pub use endpoint::{resolve_endpoint, InvalidSetting, DEFAULT_ENDPOINT};
pub use fake_stream::{apply_fake_stream, is_fake_stream_path, FakeStreamTarget, FAKE_STREAM_PREFIX};
pub use headers::{parse_custom_headers, HeaderRejection, HeaderSet};

/// Outcome of resolving an optional setting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolved<T> {
    /// The operator supplied a valid value.
    Custom(T),
    /// Nothing was configured; the built-in default applies.
    Default(T),
    /// A value was configured but rejected; the default applies instead.
    Fallback { value: T, reason: InvalidSetting },
}

impl<T> Resolved<T> {
    /// The effective value, whichever branch produced it.
    pub fn value(&self) -> &T {
        match self {
            Self::Custom(v) | Self::Default(v) | Self::Fallback { value: v, .. } => v,
        }
    }

    pub fn into_value(self) -> T {
        match self {
            Self::Custom(v) | Self::Default(v) | Self::Fallback { value: v, .. } => v,
        }
    }

    #[must_use]
    pub fn is_custom(&self) -> bool {
        matches!(self, Self::Custom(_))
    }

    /// Why the configured value was rejected, if it was.
    #[must_use]
    pub fn fallback_reason(&self) -> Option<&InvalidSetting> {
        match self {
            Self::Fallback { reason, .. } => Some(reason),
            _ => None,
        }
    }
}

/// Resolved upstream settings handed to whatever issues outbound requests.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UpstreamSettings {
    /// Base URL with no trailing slash.
    pub base_url: String,
    /// Extra headers attached to every outbound request.
    pub headers: BTreeMap<String, String>,
}

impl UpstreamSettings {
    /// Resolves both settings from their raw configured strings.
    #[must_use]
    pub fn resolve(custom_endpoint: Option<&str>, custom_headers: Option<&str>) -> Self {
        Self {
            base_url: resolve_endpoint(custom_endpoint).into_value(),
            headers: parse_custom_headers(custom_headers).into_headers(),
        }
    }
}

impl Default for UpstreamSettings {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_ENDPOINT.to_string(),
            headers: BTreeMap::new(),
        }
    }
}
