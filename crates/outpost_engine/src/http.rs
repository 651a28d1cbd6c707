//! Request and response values crossing the interception boundary.

use crate::error::{EngineError, EngineResult};
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use url::Url;

/// Header recording when an API response was cached (epoch milliseconds).
pub const CACHED_AT_HEADER: &str = "sw-cached-at";

/// HTTP verb.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Method {
    /// GET
    Get,
    /// HEAD
    Head,
    /// POST
    Post,
    /// PUT
    Put,
    /// DELETE
    Delete,
    /// PATCH
    Patch,
    /// OPTIONS
    Options,
    /// Any other token, upper-cased.
    Other(String),
}

impl Method {
    /// Returns the canonical upper-case name.
    pub fn as_str(&self) -> &str {
        match self {
            Method::Get => "GET",
            Method::Head => "HEAD",
            Method::Post => "POST",
            Method::Put => "PUT",
            Method::Delete => "DELETE",
            Method::Patch => "PATCH",
            Method::Options => "OPTIONS",
            Method::Other(m) => m,
        }
    }

    /// Returns true for GET.
    pub fn is_get(&self) -> bool {
        *self == Method::Get
    }
}

impl FromStr for Method {
    type Err = EngineError;

    fn from_str(s: &str) -> EngineResult<Self> {
        let upper = s.trim().to_ascii_uppercase();
        Ok(match upper.as_str() {
            "" => return Err(EngineError::InvalidRequest("empty method".into())),
            "GET" => Method::Get,
            "HEAD" => Method::Head,
            "POST" => Method::Post,
            "PUT" => Method::Put,
            "DELETE" => Method::Delete,
            "PATCH" => Method::Patch,
            "OPTIONS" => Method::Options,
            _ => Method::Other(upper),
        })
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Case-insensitive header map. Names are stored lower-cased.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Headers(BTreeMap<String, String>);

impl Headers {
    /// Creates an empty header map.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets a header, replacing any previous value.
    pub fn insert(&mut self, name: impl AsRef<str>, value: impl Into<String>) {
        self.0.insert(name.as_ref().to_ascii_lowercase(), value.into());
    }

    /// Returns a header value.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.0.get(&name.to_ascii_lowercase()).map(String::as_str)
    }

    /// Removes a header.
    pub fn remove(&mut self, name: &str) -> Option<String> {
        self.0.remove(&name.to_ascii_lowercase())
    }

    /// Iterates over `(name, value)` pairs.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Returns the number of headers.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns true if there are no headers.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Flattens into a plain map.
    pub fn to_map(&self) -> BTreeMap<String, String> {
        self.0.clone()
    }
}

impl<K: AsRef<str>, V: Into<String>> FromIterator<(K, V)> for Headers {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut headers = Headers::new();
        for (k, v) in iter {
            headers.insert(k, v);
        }
        headers
    }
}

/// How the request was initiated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RequestMode {
    /// Top-level document load.
    Navigate,
    /// Same-origin subresource.
    SameOrigin,
    /// CORS subresource.
    #[default]
    Cors,
    /// Opaque cross-origin subresource.
    NoCors,
}

/// An intercepted outgoing request.
///
/// The body is a cheaply cloned [`Bytes`], so handlers can snapshot it and
/// still hand the request on untouched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    /// HTTP verb.
    pub method: Method,
    /// Absolute target URL.
    pub url: Url,
    /// Request headers.
    pub headers: Headers,
    /// Request body.
    pub body: Bytes,
    /// Request mode.
    pub mode: RequestMode,
}

impl Request {
    /// Creates a request with no headers and an empty body.
    pub fn new(method: Method, url: Url) -> Self {
        Self {
            method,
            url,
            headers: Headers::new(),
            body: Bytes::new(),
            mode: RequestMode::default(),
        }
    }

    /// Parses method and URL.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::InvalidRequest`] if either does not parse.
    pub fn parse(method: &str, url: &str) -> EngineResult<Self> {
        let url = Url::parse(url).map_err(|e| EngineError::InvalidRequest(format!("{url}: {e}")))?;
        Ok(Self::new(method.parse()?, url))
    }

    /// Creates a GET request.
    pub fn get(url: Url) -> Self {
        Self::new(Method::Get, url)
    }

    /// Creates a top-level navigation request.
    pub fn navigate(url: Url) -> Self {
        Self::get(url).with_mode(RequestMode::Navigate)
    }

    /// Adds a header.
    pub fn with_header(mut self, name: impl AsRef<str>, value: impl Into<String>) -> Self {
        self.headers.insert(name, value);
        self
    }

    /// Sets the body.
    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    /// Sets the request mode.
    pub fn with_mode(mut self, mode: RequestMode) -> Self {
        self.mode = mode;
        self
    }

    /// Returns the body decoded as text (lossy).
    pub fn body_text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

/// A completed HTTP response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Response {
    /// Status code.
    pub status: u16,
    /// Response headers.
    pub headers: Headers,
    /// Response body.
    pub body: Bytes,
}

impl Response {
    /// Creates a response with no headers.
    pub fn new(status: u16, body: impl Into<Bytes>) -> Self {
        Self {
            status,
            headers: Headers::new(),
            body: body.into(),
        }
    }

    /// Creates a 200 response.
    pub fn ok(body: impl Into<Bytes>) -> Self {
        Self::new(200, body)
    }

    /// Creates a JSON response.
    pub fn json(status: u16, value: &serde_json::Value) -> Self {
        Self::new(status, value.to_string()).with_header("content-type", "application/json")
    }

    /// Plain-text 503 for unreachable static assets and navigations.
    pub fn offline_text() -> Self {
        Self::new(503, "Offline").with_header("content-type", "text/plain")
    }

    /// JSON 503 for unreachable API reads with no fresh cache.
    pub fn offline_json() -> Self {
        Self::json(503, &serde_json::json!({ "error": "Offline" }))
    }

    /// 202 telling the caller the mutation was queued, not applied.
    pub fn queued(message: &str) -> Self {
        Self::json(202, &serde_json::json!({ "queued": true, "message": message }))
    }

    /// 503 for a mutation that could neither be sent nor queued.
    pub fn enqueue_failed() -> Self {
        Self::json(503, &serde_json::json!({ "error": "Offline", "queued": false }))
    }

    /// Adds a header.
    pub fn with_header(mut self, name: impl AsRef<str>, value: impl Into<String>) -> Self {
        self.headers.insert(name, value);
        self
    }

    /// Returns true for a 2xx status.
    pub fn is_ok(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Returns the body decoded as text (lossy).
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    /// Parses the body as JSON.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::InvalidRequest`] if the body is not JSON.
    pub fn json_body(&self) -> EngineResult<serde_json::Value> {
        serde_json::from_slice(&self.body).map_err(|e| EngineError::InvalidRequest(e.to_string()))
    }
}
