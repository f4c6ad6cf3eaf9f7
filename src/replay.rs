use std::path::PathBuf;

use crate::{
    config::Config,
    counter::CallCounters,
    matching::{self, MatchError, ValidationMode},
    storage::{Fixture, FixtureStore, ResolveError, normalized_endpoint},
    wire::{RecordedRequest, Transport, WireRequest, WireResponse},
};

#[derive(Debug)]
pub enum ReplayError {
    /// The request carries no target path to resolve fixtures against.
    NoUrl,
    /// Every resolution attempt missed; carries the last primary path
    /// searched and the index it was tried at.
    FixtureNotFound { path: PathBuf, index: usize },
    /// A fixture file was found but is not a usable document.
    FixtureParse { bytes: Vec<u8> },
    /// Validation was requested but the fixture recorded no request.
    RequestNotRecorded { method: String, path: String },
    /// The live request does not match the fixture's recorded request.
    ValidationFailed { method: String, path: String },
    /// Matching itself could not run (a body failed to parse as JSON).
    Match(MatchError),
}

impl std::fmt::Display for ReplayError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NoUrl => write!(f, "incoming mock request has no target path"),
            Self::FixtureNotFound { path, index } => write!(
                f,
                "failed to find mock response at {} (attempt {index}) or the default folder",
                path.display()
            ),
            Self::FixtureParse { bytes } => write!(
                f,
                "failed to parse mock response: {}",
                String::from_utf8_lossy(bytes)
            ),
            Self::RequestNotRecorded { method, path } => {
                write!(f, "mock request not found for {method} request {path}")
            }
            Self::ValidationFailed { method, path } => {
                write!(f, "request validation failed for {method} request {path}")
            }
            Self::Match(_) => write!(f, "match live request against recorded request"),
        }
    }
}

impl std::error::Error for ReplayError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Match(source) => Some(source),
            _ => None,
        }
    }
}

/// Answers wire requests from on-disk fixtures instead of the network.
///
/// Each endpoint advances through its fixture sequence one file per call.
/// A miss resets the sequence and retries index 0 once, then falls back to
/// the shared default folder, so a fixture at index 0 is always tried
/// before giving up. Fixtures are never written here; capture is
/// [`RecordSession`](crate::record::RecordSession)'s job.
#[derive(Debug)]
pub struct ReplaySession {
    store: FixtureStore,
    validation: ValidationMode,
    counters: CallCounters,
}

impl ReplaySession {
    pub fn new(directory: impl Into<PathBuf>, validation: ValidationMode) -> Self {
        Self {
            store: FixtureStore::new(directory),
            validation,
            counters: CallCounters::new(),
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(config.fixtures.directory.clone(), config.validation_mode())
    }

    /// The session's per-endpoint positions, exposed so tests can assert
    /// on call ordering.
    pub fn counters(&self) -> &CallCounters {
        &self.counters
    }

    pub fn send(&self, request: &WireRequest) -> Result<WireResponse, ReplayError> {
        if request.path.is_empty() {
            return Err(ReplayError::NoUrl);
        }
        let endpoint = normalized_endpoint(&request.path);

        // First attempt: the endpoint's next index in sequence. The
        // counter advances before the lookup, so a fixture that later
        // fails validation still consumes its index.
        let index = self.counters.advance(&endpoint);
        match self.store.resolve(&request.path, index) {
            Ok(fixture) => return self.process(request, fixture),
            Err(ResolveError::Parse { bytes, .. }) => {
                return Err(ReplayError::FixtureParse { bytes });
            }
            Err(ResolveError::NotFound { path }) => {
                tracing::debug!(%endpoint, index, path = %path.display(), "fixture miss, resetting sequence");
            }
        }

        // Second attempt: reset to the start of the sequence, so running
        // past the end of a recorded sequence wraps back to index 0.
        let index = self.counters.reset(&endpoint);
        match self.store.resolve(&request.path, index) {
            Ok(fixture) => return self.process(request, fixture),
            Err(ResolveError::Parse { bytes, .. }) => {
                return Err(ReplayError::FixtureParse { bytes });
            }
            Err(ResolveError::NotFound { path }) => {
                tracing::debug!(%endpoint, path = %path.display(), "fixture miss at sequence start, trying default folder");
            }
        }

        // Last resort: the shared default folder.
        match self.store.resolve_default(&request.path) {
            Ok(fixture) => self.process(request, fixture),
            Err(ResolveError::Parse { bytes, .. }) => Err(ReplayError::FixtureParse { bytes }),
            Err(ResolveError::NotFound { .. }) => Err(ReplayError::FixtureNotFound {
                path: self.store.fixture_path(&request.path, index),
                index,
            }),
        }
    }

    fn process(&self, request: &WireRequest, fixture: Fixture) -> Result<WireResponse, ReplayError> {
        if let ValidationMode::Match(criteria) = &self.validation {
            let Some(recorded) = &fixture.request else {
                return Err(ReplayError::RequestNotRecorded {
                    method: request.method.clone(),
                    path: request.path.clone(),
                });
            };
            let recorded: RecordedRequest = serde_json::from_value(recorded.clone())
                .map_err(|_| ReplayError::FixtureParse {
                    bytes: serde_json::to_vec(recorded).unwrap_or_default(),
                })?;

            let matched = matching::request_matches(&recorded, request, criteria)
                .map_err(ReplayError::Match)?;
            if !matched {
                return Err(ReplayError::ValidationFailed {
                    method: request.method.clone(),
                    path: request.path.clone(),
                });
            }
        }

        Ok(WireResponse {
            status: fixture.status,
            body: serde_json::to_vec_pretty(&fixture.response).unwrap_or_default(),
        })
    }
}

impl Transport for ReplaySession {
    fn send(&self, request: &WireRequest) -> anyhow::Result<WireResponse> {
        ReplaySession::send(self, request).map_err(anyhow::Error::from)
    }
}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::path::Path;

    use serde_json::{Value, json};

    use super::{ReplayError, ReplaySession};
    use crate::{
        matching::{Criterion, ValidationMode},
        storage::testenv,
        wire::{Transport, WireRequest},
    };

    fn write_fixture(directory: &Path, endpoint: &str, index: usize, content: &str) {
        let dir = directory.join(endpoint);
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join(format!("{index}.json")), content).unwrap();
    }

    fn body_json(body: &[u8]) -> Value {
        serde_json::from_slice(body).unwrap()
    }

    #[test]
    fn calls_walk_the_fixture_sequence_in_order() {
        let temp_dir = tempfile::tempdir().unwrap();
        write_fixture(temp_dir.path(), ":x", 0, r#"{"status":200,"response":{"n":0}}"#);
        write_fixture(temp_dir.path(), ":x", 1, r#"{"status":200,"response":{"n":1}}"#);

        let session = ReplaySession::new(temp_dir.path(), ValidationMode::Disabled);
        let request = WireRequest::new("GET", "/x");

        let first = session.send(&request).unwrap();
        let second = session.send(&request).unwrap();

        assert_eq!(body_json(&first.body), json!({"n": 0}));
        assert_eq!(body_json(&second.body), json!({"n": 1}));
        assert_eq!(session.counters().current(":x"), Some(1));
    }

    #[test]
    fn running_past_the_sequence_wraps_back_to_index_zero() {
        let temp_dir = tempfile::tempdir().unwrap();
        write_fixture(temp_dir.path(), ":x", 0, r#"{"status":200,"response":{"n":0}}"#);
        write_fixture(temp_dir.path(), ":x", 1, r#"{"status":200,"response":{"n":1}}"#);

        let session = ReplaySession::new(temp_dir.path(), ValidationMode::Disabled);
        let request = WireRequest::new("GET", "/x");

        session.send(&request).unwrap();
        session.send(&request).unwrap();

        // index 2 is missing, so the sequence resets and replays from 0
        let third = session.send(&request).unwrap();
        let fourth = session.send(&request).unwrap();
        assert_eq!(body_json(&third.body), json!({"n": 0}));
        assert_eq!(body_json(&fourth.body), json!({"n": 1}));
    }

    #[test]
    fn a_skipped_index_recovers_via_the_reset_attempt() {
        let temp_dir = tempfile::tempdir().unwrap();
        write_fixture(temp_dir.path(), ":x", 0, r#"{"status":200,"response":{"n":0}}"#);

        let session = ReplaySession::new(temp_dir.path(), ValidationMode::Disabled);
        // Simulate a consumer that skipped ahead before this call.
        session.counters().advance(":x");
        session.counters().advance(":x");

        let response = session.send(&WireRequest::new("GET", "/x")).unwrap();
        assert_eq!(body_json(&response.body), json!({"n": 0}));
        assert_eq!(session.counters().current(":x"), Some(0));
    }

    #[test]
    fn default_folder_is_the_last_resort() {
        let temp_dir = tempfile::tempdir().unwrap();
        let default_dir = temp_dir.path().join("default");
        fs::create_dir_all(&default_dir).unwrap();
        fs::write(
            default_dir.join(":api:v1:me.json"),
            r#"{"status":200,"response":{"source":"default"}}"#,
        )
        .unwrap();
        let _root = testenv::set_fixtures_root(temp_dir.path());

        let session = ReplaySession::new(temp_dir.path().join("empty"), ValidationMode::Disabled);
        let response = session.send(&WireRequest::new("GET", "/api/v1/me")).unwrap();
        assert_eq!(body_json(&response.body), json!({"source": "default"}));
    }

    #[test]
    fn exhausted_attempts_report_the_searched_path_and_index() {
        let temp_dir = tempfile::tempdir().unwrap();
        let _root = testenv::clear_fixtures_root();

        let session = ReplaySession::new(temp_dir.path(), ValidationMode::Disabled);
        let err = session.send(&WireRequest::new("GET", "/api/v1/me")).unwrap_err();

        let ReplayError::FixtureNotFound { path, index } = err else {
            panic!("expected a not-found failure, got {err}");
        };
        assert_eq!(index, 0);
        assert_eq!(path, temp_dir.path().join(":api:v1:me").join("0.json"));
    }

    #[test]
    fn malformed_fixture_is_terminal_not_a_fallback() {
        let temp_dir = tempfile::tempdir().unwrap();
        write_fixture(temp_dir.path(), ":x", 0, "{broken");

        let session = ReplaySession::new(temp_dir.path(), ValidationMode::Disabled);
        let err = session.send(&WireRequest::new("GET", "/x")).unwrap_err();
        assert!(matches!(err, ReplayError::FixtureParse { .. }));
    }

    #[test]
    fn empty_target_path_is_rejected() {
        let session = ReplaySession::new("unused", ValidationMode::Disabled);
        let err = session.send(&WireRequest::new("GET", "")).unwrap_err();
        assert!(matches!(err, ReplayError::NoUrl));
    }

    #[test]
    fn disabled_validation_never_looks_at_the_recorded_request() {
        let temp_dir = tempfile::tempdir().unwrap();
        write_fixture(temp_dir.path(), ":x", 0, r#"{"status":200,"response":{"ok":true}}"#);

        let session = ReplaySession::new(temp_dir.path(), ValidationMode::Disabled);
        let request = WireRequest {
            body: Some(b"anything, even non-JSON".to_vec()),
            ..WireRequest::new("POST", "/x")
        };

        let response = session.send(&request).unwrap();
        assert_eq!(response.status, 200);
    }

    #[test]
    fn match_all_accepts_a_structurally_matching_request() {
        let temp_dir = tempfile::tempdir().unwrap();
        write_fixture(
            temp_dir.path(),
            ":x",
            0,
            r#"{"status":200,"response":{"ok":true},"request":{"httpMethod":"GET","path":"/x","headers":{},"body":""}}"#,
        );

        let session = ReplaySession::new(temp_dir.path(), ValidationMode::match_all());
        let request = WireRequest {
            headers: Some(std::collections::HashMap::new()),
            body: Some(Vec::new()),
            ..WireRequest::new("GET", "/x")
        };

        let response = session.send(&request).unwrap();
        assert_eq!(response.status, 200);
        assert_eq!(body_json(&response.body), json!({"ok": true}));
    }

    #[test]
    fn method_mismatch_fails_validation_unconditionally() {
        let temp_dir = tempfile::tempdir().unwrap();
        write_fixture(
            temp_dir.path(),
            ":x",
            0,
            r#"{"status":200,"response":{"ok":true},"request":{"httpMethod":"GET","path":"/x","headers":{},"body":""}}"#,
        );

        let session = ReplaySession::new(temp_dir.path(), ValidationMode::Match(Vec::new()));
        let err = session.send(&WireRequest::new("POST", "/x")).unwrap_err();
        assert!(matches!(err, ReplayError::ValidationFailed { .. }));
    }

    #[test]
    fn validation_with_ignored_body_keys_tolerates_drift() {
        let temp_dir = tempfile::tempdir().unwrap();
        write_fixture(
            temp_dir.path(),
            ":x",
            0,
            r#"{"status":200,"response":{},"request":{"httpMethod":"POST","path":"/x","headers":null,"body":"{\"a\":1,\"timestamp\":\"T1\"}"}}"#,
        );

        let criteria = vec![Criterion::MatchBodyIgnoring(vec!["timestamp".to_owned()])];
        let session = ReplaySession::new(temp_dir.path(), ValidationMode::Match(criteria));
        let request = WireRequest {
            body: Some(br#"{"a":1,"timestamp":"T2"}"#.to_vec()),
            ..WireRequest::new("POST", "/x")
        };

        assert!(session.send(&request).is_ok());
    }

    #[test]
    fn validation_without_a_recorded_request_is_its_own_failure() {
        let temp_dir = tempfile::tempdir().unwrap();
        write_fixture(temp_dir.path(), ":x", 0, r#"{"status":200,"response":{}}"#);

        let session = ReplaySession::new(temp_dir.path(), ValidationMode::match_all());
        let err = session.send(&WireRequest::new("GET", "/x")).unwrap_err();
        assert!(matches!(err, ReplayError::RequestNotRecorded { .. }));
    }

    #[test]
    fn a_validation_failure_still_consumes_its_index() {
        let temp_dir = tempfile::tempdir().unwrap();
        write_fixture(
            temp_dir.path(),
            ":x",
            0,
            r#"{"status":200,"response":{"n":0},"request":{"httpMethod":"GET","path":"/x","headers":null}}"#,
        );
        write_fixture(
            temp_dir.path(),
            ":x",
            1,
            r#"{"status":200,"response":{"n":1},"request":{"httpMethod":"GET","path":"/x","headers":null}}"#,
        );

        let session = ReplaySession::new(temp_dir.path(), ValidationMode::Match(Vec::new()));

        let err = session.send(&WireRequest::new("POST", "/x")).unwrap_err();
        assert!(matches!(err, ReplayError::ValidationFailed { .. }));

        // The failed call consumed index 0; the next call moves on to 1.
        let response = session.send(&WireRequest::new("GET", "/x")).unwrap();
        assert_eq!(body_json(&response.body), json!({"n": 1}));
    }

    #[test]
    fn replay_session_slots_in_behind_the_transport_seam() {
        let temp_dir = tempfile::tempdir().unwrap();
        write_fixture(temp_dir.path(), ":x", 0, r#"{"status":200,"response":{}}"#);

        let session = ReplaySession::new(temp_dir.path(), ValidationMode::Disabled);
        let transport: &dyn Transport = &session;

        assert!(transport.send(&WireRequest::new("GET", "/x")).is_ok());
        let err = transport.send(&WireRequest::new("GET", "")).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<ReplayError>(),
            Some(ReplayError::NoUrl)
        ));
    }
}
