use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// An outgoing request as the typed-request layer hands it to a session:
/// method, origin-relative path, optional headers, optional body bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WireRequest {
    pub method: String,
    pub path: String,
    pub headers: Option<HashMap<String, String>>,
    pub body: Option<Vec<u8>>,
}

impl WireRequest {
    pub fn new(method: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            path: path.into(),
            headers: None,
            body: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WireResponse {
    pub status: u16,
    pub body: Vec<u8>,
}

/// The request shape persisted inside a fixture's `request` field, used to
/// validate a live request against the traffic that was captured.
///
/// `headers` is written even when absent (as `null`); `body` is omitted
/// entirely when the captured request had none.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordedRequest {
    pub http_method: String,
    pub path: String,
    #[serde(default)]
    pub headers: Option<HashMap<String, String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
}

impl From<&WireRequest> for RecordedRequest {
    fn from(request: &WireRequest) -> Self {
        Self {
            http_method: request.method.clone(),
            path: request.path.clone(),
            headers: request.headers.clone(),
            body: request
                .body
                .as_deref()
                .map(|bytes| String::from_utf8_lossy(bytes).into_owned()),
        }
    }
}

/// The seam to the live network: anything that can turn a wire request into
/// a wire response. `ReplaySession` and `RecordSession` both implement it,
/// so either can stand in wherever the real transport is expected.
pub trait Transport {
    fn send(&self, request: &WireRequest) -> anyhow::Result<WireResponse>;
}
