use std::{
    fs,
    path::{Path, PathBuf},
};

use anyhow::Context as _;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::{
    counter::CallCounters,
    wire::{RecordedRequest, WireRequest, WireResponse},
};

/// Environment variable naming the shared fixtures root. Read at call
/// time, never captured at construction, so a test run can repoint it
/// between calls.
pub const FIXTURES_ROOT_ENV: &str = "mock_responses";

/// Subfolder of the fixtures root holding last-resort fixtures, keyed by
/// endpoint with no sequence index.
pub const DEFAULT_SUBDIR: &str = "default";

/// Subfolder of the fixtures root that record sessions write into.
pub const RECORDED_SUBDIR: &str = "-recorded";

/// Rewrites a request path into its filesystem-safe endpoint key:
/// every path separator becomes a colon (`/api/v1/login` → `:api:v1:login`).
pub fn normalized_endpoint(path: &str) -> String {
    path.replace('/', ":")
}

/// One recorded exchange on disk. `status` is required for the fixture to
/// be usable; `response` is arbitrary JSON defaulting to an empty object;
/// `request` is present only on captured fixtures and is decoded into a
/// [`RecordedRequest`] when validation needs it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Fixture {
    pub status: u16,
    #[serde(default = "Fixture::empty_response")]
    pub response: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request: Option<Value>,
}

impl Fixture {
    fn empty_response() -> Value {
        Value::Object(Map::new())
    }
}

#[derive(Debug)]
pub enum ResolveError {
    NotFound { path: PathBuf },
    Parse { path: PathBuf, bytes: Vec<u8> },
}

impl std::fmt::Display for ResolveError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotFound { path } => {
                write!(f, "no fixture file at {}", path.display())
            }
            Self::Parse { path, bytes } => write!(
                f,
                "fixture at {} is not a usable JSON document: {}",
                path.display(),
                String::from_utf8_lossy(bytes)
            ),
        }
    }
}

impl std::error::Error for ResolveError {}

/// Resolves endpoints to their on-disk fixture sequences and appends
/// captured traffic in the same layout.
///
/// Replay reads `{directory}/{endpoint}/{index}.json`; the last-resort
/// fixture lives at `{$mock_responses}/default/{endpoint}.json`; capture
/// writes `{$mock_responses}/-recorded/{endpoint}/{index}.json` with
/// per-endpoint sequential numbering tracked by this store's write
/// counters.
#[derive(Debug, Default)]
pub struct FixtureStore {
    directory: PathBuf,
    write_counters: CallCounters,
}

impl FixtureStore {
    pub fn new(directory: impl Into<PathBuf>) -> Self {
        Self {
            directory: directory.into(),
            write_counters: CallCounters::new(),
        }
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    /// The file a given attempt at an endpoint resolves to.
    pub fn fixture_path(&self, path: &str, index: usize) -> PathBuf {
        self.directory
            .join(normalized_endpoint(path))
            .join(format!("{index}.json"))
    }

    /// Reads and parses the fixture for one attempt at an endpoint.
    ///
    /// An absent file is `NotFound`; a file that is present but does not
    /// parse as a fixture document (invalid JSON, missing `status`) is
    /// `Parse` and carries the offending bytes.
    pub fn resolve(&self, path: &str, index: usize) -> Result<Fixture, ResolveError> {
        let file = self.fixture_path(path, index);
        read_fixture(&file)
    }

    /// Reads the endpoint's last-resort fixture from the shared default
    /// folder. An unset root variable behaves as a miss.
    pub fn resolve_default(&self, path: &str) -> Result<Fixture, ResolveError> {
        let endpoint = normalized_endpoint(path);
        let file = match fixtures_root() {
            Some(root) => root.join(DEFAULT_SUBDIR).join(format!("{endpoint}.json")),
            None => {
                tracing::debug!(
                    %endpoint,
                    "`{FIXTURES_ROOT_ENV}` is not set; skipping default folder"
                );
                Path::new(DEFAULT_SUBDIR).join(format!("{endpoint}.json"))
            }
        };
        read_fixture(&file)
    }

    /// Persists one captured exchange and returns the sequence index it
    /// was written at.
    ///
    /// The write counter advances first, so a failed write still consumes
    /// its index. The fixture is pretty-printed and written through a
    /// temporary file so a crash never leaves a half-written fixture at
    /// the final path.
    pub fn append(&self, request: &WireRequest, response: &WireResponse) -> anyhow::Result<usize> {
        let root = fixtures_root()
            .with_context(|| format!("`{FIXTURES_ROOT_ENV}` environment variable is not set"))?;

        let endpoint = normalized_endpoint(&request.path);
        let index = self.write_counters.advance(&endpoint);

        let recorded = serde_json::to_value(RecordedRequest::from(request))
            .context("serialize captured request")?;
        let fixture = Fixture {
            status: response.status,
            response: response_json(&response.body),
            request: Some(recorded),
        };
        let json = serde_json::to_vec_pretty(&fixture).context("serialize fixture")?;

        let dir = root.join(RECORDED_SUBDIR).join(&endpoint);
        fs::create_dir_all(&dir)
            .with_context(|| format!("create fixture dir {}", dir.display()))?;

        let file = dir.join(format!("{index}.json"));
        let staging = dir.join(format!("{index}.json.tmp"));
        fs::write(&staging, &json)
            .with_context(|| format!("write fixture {}", staging.display()))?;
        fs::rename(&staging, &file)
            .with_context(|| format!("move fixture into place at {}", file.display()))?;

        tracing::debug!(%endpoint, index, path = %file.display(), "recorded fixture");
        Ok(index)
    }
}

fn read_fixture(file: &Path) -> Result<Fixture, ResolveError> {
    let bytes = fs::read(file).map_err(|_| ResolveError::NotFound {
        path: file.to_path_buf(),
    })?;
    serde_json::from_slice(&bytes).map_err(|_| ResolveError::Parse {
        path: file.to_path_buf(),
        bytes,
    })
}

fn fixtures_root() -> Option<PathBuf> {
    std::env::var_os(FIXTURES_ROOT_ENV).map(PathBuf::from)
}

fn response_json(body: &[u8]) -> Value {
    if body.is_empty() {
        return Fixture::empty_response();
    }
    serde_json::from_slice(body).unwrap_or_else(|_| Fixture::empty_response())
}
