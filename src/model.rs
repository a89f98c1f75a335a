//! Core data model shared by the parser, executor, and assertion engine.

use crate::error::Error;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

/// HTTP request method.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Method {
    Get,
    Post,
    Put,
    Delete,
    Patch,
    Head,
    Options,
    Connect,
    Trace,
}

impl Method {
    /// The canonical upper-case method token.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Get => crate::constants::HTTP_METHOD_GET,
            Self::Post => crate::constants::HTTP_METHOD_POST,
            Self::Put => crate::constants::HTTP_METHOD_PUT,
            Self::Delete => crate::constants::HTTP_METHOD_DELETE,
            Self::Patch => crate::constants::HTTP_METHOD_PATCH,
            Self::Head => crate::constants::HTTP_METHOD_HEAD,
            Self::Options => crate::constants::HTTP_METHOD_OPTIONS,
            Self::Connect => crate::constants::HTTP_METHOD_CONNECT,
            Self::Trace => crate::constants::HTTP_METHOD_TRACE,
        }
    }
}

impl std::str::FromStr for Method {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            crate::constants::HTTP_METHOD_GET => Ok(Self::Get),
            crate::constants::HTTP_METHOD_POST => Ok(Self::Post),
            crate::constants::HTTP_METHOD_PUT => Ok(Self::Put),
            crate::constants::HTTP_METHOD_DELETE => Ok(Self::Delete),
            crate::constants::HTTP_METHOD_PATCH => Ok(Self::Patch),
            crate::constants::HTTP_METHOD_HEAD => Ok(Self::Head),
            crate::constants::HTTP_METHOD_OPTIONS => Ok(Self::Options),
            crate::constants::HTTP_METHOD_CONNECT => Ok(Self::Connect),
            crate::constants::HTTP_METHOD_TRACE => Ok(Self::Trace),
            other => Err(Error::invalid_http_method(other)),
        }
    }
}

impl std::fmt::Display for Method {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Ordered header map. Names are matched case-insensitively on lookup but
/// preserved as written on emission.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Headers(IndexMap<String, String>);

impl Headers {
    #[must_use]
    pub fn new() -> Self {
        Self(IndexMap::new())
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.0.insert(name.into(), value.into());
    }

    /// Case-insensitive lookup.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Headers {
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        Self(
            iter.into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}

/// A script block attached to a request: inline source or a file reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Script {
    Inline(String),
    File(PathBuf),
}

/// One part of a multipart/form-data body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MultipartField {
    pub name: String,
    pub filename: Option<String>,
    pub content_type: Option<String>,
    pub data: String,
}

/// A request body in one of its three source forms.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequestBody {
    /// Literal text (JSON, XML, form-encoded, plain).
    Text(String),
    /// `< path` reference; loaded at execution time.
    FromFile(PathBuf),
    /// Parsed multipart/form-data fields.
    Multipart(Vec<MultipartField>),
}

/// The kind of check an [`Assertion`] performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum AssertionKind {
    Status,
    Header,
    Body,
    Custom,
    ResponseTime,
    JsonSchema,
}

impl AssertionKind {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Status => "Status",
            Self::Header => "Header",
            Self::Body => "Body",
            Self::Custom => "Custom",
            Self::ResponseTime => "ResponseTime",
            Self::JsonSchema => "JsonSchema",
        }
    }
}

/// A single expectation against a response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Assertion {
    pub kind: AssertionKind,
    /// Header name or JSONPath, depending on `kind`.
    pub key: Option<String>,
    /// Expected literal, range string (`2xx`), schema document/path, or
    /// validator path.
    pub value: String,
}

/// A named group of assertions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Test {
    pub name: String,
    pub assertions: Vec<Assertion>,
}

/// A post-response variable binding: literal, or JSONPath evaluated against
/// the response body (distinguished by the leading `$`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VariableUpdate {
    pub key: String,
    pub source: String,
}

impl VariableUpdate {
    /// True when the source is a JSONPath expression rather than a literal.
    #[must_use]
    pub fn is_jsonpath(&self) -> bool {
        self.source.starts_with('$')
    }
}

/// A parsed request block.
#[derive(Debug, Clone, Default)]
pub struct Request {
    /// Section title (text after `###`), or a synthesized name.
    pub name: String,
    pub method: Option<Method>,
    pub url: String,
    pub headers: Headers,
    pub body: Option<RequestBody>,
    pub tests: Vec<Test>,
    /// In-request `@key = value` bindings: literal sources are applied to
    /// the Request scope before dispatch, JSONPath sources are evaluated
    /// against the response afterwards.
    pub variable_updates: Vec<VariableUpdate>,
    pub expect_error: bool,
    /// Id set by `# @name <id>`; addressable as `{{id.response.*}}`.
    pub request_id: Option<String>,
    /// Per-request override from `# @timeout <ms>`.
    pub timeout_ms: Option<u64>,
    pub pre_scripts: Vec<Script>,
    pub post_scripts: Vec<Script>,
}

impl Request {
    /// The method, which the parser guarantees to be present on every
    /// request it emits.
    #[must_use]
    pub fn method(&self) -> Method {
        self.method.unwrap_or(Method::Get)
    }
}

/// The parsed body of a response, when the content type is recognizable,
/// else the raw payload.
#[derive(Debug, Clone, PartialEq)]
pub enum ResponseData {
    Json(serde_json::Value),
    Text(String),
    Bytes(Vec<u8>),
}

impl ResponseData {
    /// The body as JSON, when it parsed as such.
    #[must_use]
    pub const fn as_json(&self) -> Option<&serde_json::Value> {
        match self {
            Self::Json(v) => Some(v),
            _ => None,
        }
    }

    /// Compact textual rendering used for template emission and reports.
    #[must_use]
    pub fn to_display_string(&self) -> String {
        match self {
            Self::Json(v) => v.to_string(),
            Self::Text(s) => s.clone(),
            Self::Bytes(b) => format!("({} bytes)", b.len()),
        }
    }
}

/// An executed HTTP exchange.
#[derive(Debug, Clone)]
pub struct Response {
    pub status: u16,
    pub status_text: String,
    pub headers: Headers,
    pub data: ResponseData,
    pub execution_time: Duration,
}

/// Most recent response per `# @name` id, addressable from templates as
/// `{{id.response.*}}`.
#[derive(Debug, Default)]
pub struct NamedResponseStore {
    responses: HashMap<String, Response>,
}

impl NamedResponseStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, id: impl Into<String>, response: Response) {
        self.responses.insert(id.into(), response);
    }

    #[must_use]
    pub fn get(&self, id: &str) -> Option<&Response> {
        self.responses.get(id)
    }

    #[must_use]
    pub fn contains(&self, id: &str) -> bool {
        self.responses.contains_key(id)
    }
}

/// Outcome of one assertion.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TestResult {
    pub name: String,
    pub passed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(serialize_with = "serialize_millis")]
    pub duration: Duration,
}

fn serialize_millis<S: serde::Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_u128(d.as_millis())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn method_round_trips_through_str() {
        for token in crate::constants::HTTP_METHODS {
            let method = Method::from_str(token).unwrap();
            assert_eq!(method.as_str(), token);
        }
    }

    #[test]
    fn method_rejects_unknown_tokens() {
        assert!(Method::from_str("FETCH").is_err());
        assert!(Method::from_str("get").is_err());
    }

    #[test]
    fn header_lookup_is_case_insensitive() {
        let mut headers = Headers::new();
        headers.insert("Content-Type", "application/json");
        assert_eq!(headers.get("content-type"), Some("application/json"));
        assert_eq!(headers.get("CONTENT-TYPE"), Some("application/json"));
        assert_eq!(headers.get("Accept"), None);
    }

    #[test]
    fn header_order_is_preserved_on_emission() {
        let mut headers = Headers::new();
        headers.insert("B-Header", "2");
        headers.insert("A-Header", "1");
        let names: Vec<&str> = headers.iter().map(|(k, _)| k).collect();
        assert_eq!(names, vec!["B-Header", "A-Header"]);
    }

    #[test]
    fn variable_update_detects_jsonpath_source() {
        let jsonpath = VariableUpdate {
            key: "id".into(),
            source: "$.data.id".into(),
        };
        let literal = VariableUpdate {
            key: "mode".into(),
            source: "fast".into(),
        };
        assert!(jsonpath.is_jsonpath());
        assert!(!literal.is_jsonpath());
    }

    #[test]
    fn named_store_keeps_latest_response() {
        let mut store = NamedResponseStore::new();
        let response = |status| Response {
            status,
            status_text: String::new(),
            headers: Headers::new(),
            data: ResponseData::Text(String::new()),
            execution_time: Duration::ZERO,
        };
        store.insert("login", response(200));
        store.insert("login", response(201));
        assert_eq!(store.get("login").unwrap().status, 201);
        assert!(!store.contains("logout"));
    }
}
