use std::collections::{HashMap, HashSet};

use serde_json::{Map, Value};

use crate::wire::{RecordedRequest, WireRequest};

/// One dimension of request validation. The `Ignoring` variants imply
/// their dimension is matched; listing keys without also listing the bare
/// variant is enough to turn the check on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Criterion {
    MatchBody,
    MatchBodyIgnoring(Vec<String>),
    MatchHeaders,
    MatchHeadersIgnoring(Vec<String>),
}

/// Whether a replay session validates live requests against the fixture's
/// recorded request before answering.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ValidationMode {
    #[default]
    Disabled,
    Match(Vec<Criterion>),
}

impl ValidationMode {
    /// Matches both body and headers with no exclusions.
    pub fn match_all() -> Self {
        Self::Match(vec![Criterion::MatchBody, Criterion::MatchHeaders])
    }
}

#[derive(Debug)]
pub enum MatchError {
    InvalidRecordedBody(serde_json::Error),
    InvalidLiveBody(serde_json::Error),
}

impl std::fmt::Display for MatchError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidRecordedBody(_) => {
                write!(f, "parse recorded request body as JSON for matching")
            }
            Self::InvalidLiveBody(_) => write!(f, "parse live request body as JSON for matching"),
        }
    }
}

impl std::error::Error for MatchError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::InvalidRecordedBody(source) | Self::InvalidLiveBody(source) => Some(source),
        }
    }
}

/// Decides whether a live request matches the request a fixture recorded.
///
/// Path and method are always compared; a mismatch there is a plain
/// non-match regardless of criteria. Headers and body are each compared
/// only when a criterion selects them, with that criterion's ignore keys
/// removed from both sides first. Body comparison parses both sides as
/// JSON (absent or empty bodies read as `{}`) and checks deep structural
/// equality, so key order never matters; a body that does not parse is an
/// error, not a silent mismatch.
pub fn request_matches(
    recorded: &RecordedRequest,
    live: &WireRequest,
    criteria: &[Criterion],
) -> Result<bool, MatchError> {
    if recorded.path != live.path || recorded.http_method != live.method {
        return Ok(false);
    }

    let criteria = effective_criteria(criteria);

    if criteria.headers
        && !headers_match(
            recorded.headers.as_ref(),
            live.headers.as_ref(),
            &criteria.header_ignore,
        )
    {
        return Ok(false);
    }

    if criteria.body {
        let recorded_body = parse_body(recorded.body.as_deref().map(str::as_bytes))
            .map_err(MatchError::InvalidRecordedBody)?;
        let live_body = parse_body(live.body.as_deref()).map_err(MatchError::InvalidLiveBody)?;
        if !structurally_equal(&recorded_body, &live_body, &criteria.body_ignore) {
            return Ok(false);
        }
    }

    Ok(true)
}

#[derive(Debug, Clone)]
struct EffectiveCriteria {
    body: bool,
    headers: bool,
    body_ignore: HashSet<String>,
    header_ignore: HashSet<String>,
}

fn effective_criteria(criteria: &[Criterion]) -> EffectiveCriteria {
    let mut effective = EffectiveCriteria {
        body: false,
        headers: false,
        body_ignore: HashSet::new(),
        header_ignore: HashSet::new(),
    };

    for criterion in criteria {
        match criterion {
            Criterion::MatchBody => effective.body = true,
            Criterion::MatchBodyIgnoring(keys) => {
                effective.body = true;
                effective.body_ignore.extend(keys.iter().cloned());
            }
            Criterion::MatchHeaders => effective.headers = true,
            Criterion::MatchHeadersIgnoring(keys) => {
                effective.headers = true;
                effective.header_ignore.extend(keys.iter().cloned());
            }
        }
    }

    effective
}

fn headers_match(
    recorded: Option<&HashMap<String, String>>,
    live: Option<&HashMap<String, String>>,
    ignore: &HashSet<String>,
) -> bool {
    let retained = |headers: Option<&HashMap<String, String>>| -> HashMap<String, String> {
        headers
            .map(|headers| {
                headers
                    .iter()
                    .filter(|(name, _)| !ignore.contains(*name))
                    .map(|(name, value)| (name.clone(), value.clone()))
                    .collect()
            })
            .unwrap_or_default()
    };

    retained(recorded) == retained(live)
}

fn parse_body(bytes: Option<&[u8]>) -> Result<Value, serde_json::Error> {
    match bytes {
        Some(bytes) if !bytes.is_empty() => serde_json::from_slice(bytes),
        _ => Ok(Value::Object(Map::new())),
    }
}

/// Removes every entry whose key is in `ignore`, at every nesting level,
/// recursing through objects and arrays. A no-op on scalar nodes.
pub fn strip_ignored_keys(value: &mut Value, ignore: &HashSet<String>) {
    match value {
        Value::Object(map) => {
            map.retain(|key, _| !ignore.contains(key));
            for nested in map.values_mut() {
                strip_ignored_keys(nested, ignore);
            }
        }
        Value::Array(items) => {
            for item in items {
                strip_ignored_keys(item, ignore);
            }
        }
        _ => {}
    }
}

/// Deep structural equality after stripping `ignore` keys from both sides.
///
/// Works on clones; the caller's values are never mutated. Object key sets
/// and values must agree independent of insertion order (`serde_json`
/// objects are sorted maps, so this coincides with byte equality of the
/// canonical serialization); arrays compare element-wise in order.
pub fn structurally_equal(a: &Value, b: &Value, ignore: &HashSet<String>) -> bool {
    let mut lhs = a.clone();
    let mut rhs = b.clone();
    strip_ignored_keys(&mut lhs, ignore);
    strip_ignored_keys(&mut rhs, ignore);
    lhs == rhs
}
