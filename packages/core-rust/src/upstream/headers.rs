//! Parsing of operator-configured extra request headers.
//!
//! Format: `name1=value1;name2=value2`. Whitespace around entries, names and
//! values is ignored, values may themselves contain `=`, and a later entry for
//! the same name replaces an earlier one.

use std::collections::BTreeMap;

use once_cell::sync::Lazy;
use regex::Regex;
use tracing::{debug, info};

static HEADER_NAME_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-zA-Z][a-zA-Z0-9\-_]*$").expect("header name regex"));

/// An entry skipped while parsing custom headers.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum HeaderRejection {
    #[error("header entry `{entry}` has no `=` separator")]
    MissingSeparator { entry: String },
    #[error("header entry `{entry}` has an empty name")]
    EmptyName { entry: String },
    #[error("header name `{name}` must start with a letter and contain only letters, digits, `-` or `_`")]
    InvalidName { name: String },
}

/// Parsed custom headers together with the entries that were skipped.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HeaderSet {
    headers: BTreeMap<String, String>,
    rejected: Vec<HeaderRejection>,
}

impl HeaderSet {
    #[must_use]
    pub fn headers(&self) -> &BTreeMap<String, String> {
        &self.headers
    }

    #[must_use]
    pub fn rejected(&self) -> &[HeaderRejection] {
        &self.rejected
    }

    #[must_use]
    pub fn into_headers(self) -> BTreeMap<String, String> {
        self.headers
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.headers.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.headers.len()
    }
}

/// Parses the raw custom-headers setting.
///
/// Never fails: malformed entries are collected in [`HeaderSet::rejected`]
/// and the rest of the input is still used.
#[must_use]
pub fn parse_custom_headers(raw: Option<&str>) -> HeaderSet {
    let mut set = HeaderSet::default();
    let Some(raw) = raw.map(str::trim).filter(|s| !s.is_empty()) else {
        return set;
    };

    for entry in raw.split(';').map(str::trim).filter(|e| !e.is_empty()) {
        match parse_entry(entry) {
            Ok((name, value)) => {
                set.headers.insert(name.to_string(), value.to_string());
            }
            Err(rejection) => {
                debug!(%rejection, "skipping custom header entry");
                set.rejected.push(rejection);
            }
        }
    }

    if !set.headers.is_empty() {
        info!(count = set.headers.len(), "loaded custom request headers");
    }
    set
}

fn parse_entry(entry: &str) -> Result<(&str, &str), HeaderRejection> {
    let Some((name, value)) = entry.split_once('=') else {
        return Err(HeaderRejection::MissingSeparator {
            entry: entry.to_string(),
        });
    };
    let name = name.trim();
    if name.is_empty() {
        return Err(HeaderRejection::EmptyName {
            entry: entry.to_string(),
        });
    }
    if !HEADER_NAME_RE.is_match(name) {
        return Err(HeaderRejection::InvalidName {
            name: name.to_string(),
        });
    }
    Ok((name, value.trim()))
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    #[test]
    fn unset_or_blank_yields_no_headers() {
        assert!(parse_custom_headers(None).is_empty());
        assert!(parse_custom_headers(Some("  ")).is_empty());
    }

    #[test]
    fn parses_pairs_and_trims() {
        let set = parse_custom_headers(Some(" X-Api-Tier = gold ;User_Agent=relay/1.0; "));
        assert_eq!(set.len(), 2);
        assert_eq!(set.headers()["X-Api-Tier"], "gold");
        assert_eq!(set.headers()["User_Agent"], "relay/1.0");
        assert!(set.rejected().is_empty());
    }

    #[test]
    fn value_may_contain_equals() {
        let set = parse_custom_headers(Some("Authorization=Basic dXNlcj1wYXNz=="));
        assert_eq!(set.headers()["Authorization"], "Basic dXNlcj1wYXNz==");
    }

    #[test]
    fn later_duplicate_wins() {
        let set = parse_custom_headers(Some("X-A=1;X-A=2"));
        assert_eq!(set.len(), 1);
        assert_eq!(set.headers()["X-A"], "2");
    }

    #[test]
    fn malformed_entries_are_recorded_not_fatal() {
        let set = parse_custom_headers(Some("novalue;=orphan;9lives=x;X-Ok=yes;Bad Name=z"));
        assert_eq!(set.len(), 1);
        assert_eq!(set.headers()["X-Ok"], "yes");
        assert_eq!(
            set.rejected(),
            &[
                HeaderRejection::MissingSeparator {
                    entry: "novalue".to_string()
                },
                HeaderRejection::EmptyName {
                    entry: "=orphan".to_string()
                },
                HeaderRejection::InvalidName {
                    name: "9lives".to_string()
                },
                HeaderRejection::InvalidName {
                    name: "Bad Name".to_string()
                },
            ]
        );
    }

    #[test]
    fn empty_value_is_kept() {
        let set = parse_custom_headers(Some("X-Empty="));
        assert_eq!(set.headers()["X-Empty"], "");
    }

    proptest! {
        #[test]
        fn accepted_names_always_match_token_rule(raw in ".{0,64}") {
            let set = parse_custom_headers(Some(&raw));
            for name in set.headers().keys() {
                prop_assert!(HEADER_NAME_RE.is_match(name));
            }
        }

        #[test]
        fn every_nonblank_entry_is_accepted_or_rejected(
            entries in proptest::collection::vec("[A-Za-z][A-Za-z0-9_-]{0,8}=[a-z0-9]{0,8}|[^;=]{1,8}", 0..8)
        ) {
            let raw = entries.join(";");
            let set = parse_custom_headers(Some(&raw));
            let nonblank = entries.iter().filter(|e| !e.trim().is_empty()).count();
            // Duplicate names collapse, so accepted + rejected never exceeds the entry count.
            prop_assert!(set.len() + set.rejected().len() <= nonblank);
            prop_assert!(set.rejected().len() <= nonblank);
        }
    }
}
