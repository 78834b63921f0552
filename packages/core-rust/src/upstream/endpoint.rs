//! Base URL resolution for the upstream API.

use tracing::{error, info};
use url::Url;

use super::Resolved;

/// Endpoint used when no valid custom endpoint is configured.
pub const DEFAULT_ENDPOINT: &str = "https://generativelanguage.googleapis.com";

/// Reasons a configured setting was rejected.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum InvalidSetting {
    #[error("custom endpoint `{value}` is not a valid absolute URL: {source}")]
    MalformedEndpoint {
        value: String,
        #[source]
        source: url::ParseError,
    },
    #[error("custom endpoint `{value}` has no host")]
    MissingHost { value: String },
    #[error("custom endpoint scheme `{scheme}` is not supported, expected http or https")]
    UnsupportedScheme { scheme: String },
}

/// Resolves the upstream base URL from an optional operator setting.
///
/// Blank input yields [`Resolved::Default`]. A value that is not an absolute
/// `http`/`https` URL with a host yields [`Resolved::Fallback`] carrying the
/// default and the rejection reason. Accepted values are returned trimmed,
/// without trailing slashes. Only the origin is logged so credentials or
/// path segments in the endpoint do not reach the logs.
#[must_use]
pub fn resolve_endpoint(custom: Option<&str>) -> Resolved<String> {
    let Some(raw) = custom.map(str::trim).filter(|s| !s.is_empty()) else {
        return Resolved::Default(DEFAULT_ENDPOINT.to_string());
    };

    match validate(raw) {
        Ok(url) => {
            info!(
                origin = %url.origin().ascii_serialization(),
                "using custom upstream endpoint"
            );
            Resolved::Custom(raw.trim_end_matches('/').to_string())
        }
        Err(reason) => {
            error!(%reason, "falling back to default upstream endpoint");
            Resolved::Fallback {
                value: DEFAULT_ENDPOINT.to_string(),
                reason,
            }
        }
    }
}

fn validate(raw: &str) -> Result<Url, InvalidSetting> {
    let url = Url::parse(raw).map_err(|source| InvalidSetting::MalformedEndpoint {
        value: raw.to_string(),
        source,
    })?;

    if url.host_str().unwrap_or_default().is_empty() {
        return Err(InvalidSetting::MissingHost {
            value: raw.to_string(),
        });
    }

    match url.scheme() {
        "http" | "https" => Ok(url),
        other => Err(InvalidSetting::UnsupportedScheme {
            scheme: other.to_string(),
        }),
    }
}
