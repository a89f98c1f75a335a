//! Error handling module for the http-test CLI
//!
//! This module provides a consolidated error handling system that categorizes
//! all application errors into 4 distinct kinds. The design follows these principles:
//!
//! 1. **Error Consolidation**: All errors are mapped to one of 4 `ErrorKind` categories
//! 2. **Structured Context**: Each error carries a structured JSON context map
//! 3. **Builder Pattern**: Constructor helpers keep call sites short
//! 4. **JSON Support**: All errors can be serialized to JSON for programmatic consumption

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::borrow::Cow;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    // Keep essential external errors that can't be consolidated
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),
    #[error("JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),

    // Consolidated error variant carrying the structured payload
    #[error("{kind}: {message}")]
    Internal {
        kind: ErrorKind,
        message: Cow<'static, str>,
        context: Box<ErrorContext>,
    },

    #[error(transparent)]
    Anyhow(#[from] anyhow::Error),
}

/// Error categories for consolidated error handling
///
/// All internal errors are mapped to one of these categories to provide
/// consistent error handling, exit-code mapping, and reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Malformed `.http` file; non-recoverable for that file
    Parser,
    /// Transport or timeout errors; recoverable via the retry policy
    Request,
    /// Expected/actual mismatch produced by the assertion engine
    Assertion,
    /// Invalid configuration file or CLI usage
    Config,
}

/// Structured payload shared by all consolidated errors.
#[derive(Debug, Clone, Default)]
pub struct ErrorContext {
    /// Machine-readable code (e.g. `timeout`, `status_mismatch`)
    pub code: Option<Cow<'static, str>>,
    /// When the error was constructed
    pub timestamp: Option<DateTime<Utc>>,
    /// Structured details for programmatic access
    pub details: Option<serde_json::Value>,
}

impl ErrorContext {
    /// Create a context stamped with the current time.
    #[must_use]
    pub fn now() -> Self {
        Self {
            code: None,
            timestamp: Some(Utc::now()),
            details: None,
        }
    }

    /// Builder method to set the machine-readable code.
    #[must_use]
    pub fn with_code(mut self, code: impl Into<Cow<'static, str>>) -> Self {
        self.code = Some(code.into());
        self
    }

    /// Builder method to attach structured details.
    #[must_use]
    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }
}

impl ErrorKind {
    /// Get the string identifier for this error kind
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Parser => "ParserError",
            Self::Request => "RequestError",
            Self::Assertion => "AssertionError",
            Self::Config => "ConfigError",
        }
    }

    /// Map this kind to the process exit code contract.
    #[must_use]
    pub const fn exit_code(self) -> i32 {
        match self {
            Self::Parser | Self::Config => crate::constants::EXIT_USAGE,
            Self::Request | Self::Assertion => crate::constants::EXIT_ASSERT_FAILED,
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// JSON representation of an error for structured output
#[derive(Debug, Serialize, Deserialize)]
pub struct JsonError {
    pub error_type: Cow<'static, str>,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl Error {
    /// The consolidated kind, when this is an internal error.
    #[must_use]
    pub const fn kind(&self) -> Option<ErrorKind> {
        match self {
            Self::Internal { kind, .. } => Some(*kind),
            _ => None,
        }
    }

    /// Map any error to the process exit code contract.
    #[must_use]
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Io(_) => crate::constants::EXIT_IO,
            Self::Network(_) => crate::constants::EXIT_ASSERT_FAILED,
            Self::Json(_) | Self::Anyhow(_) => crate::constants::EXIT_USAGE,
            Self::Internal { kind, .. } => kind.exit_code(),
        }
    }

    /// Convert error to JSON representation for structured output
    #[must_use]
    pub fn to_json(&self) -> JsonError {
        match self {
            Self::Io(io_err) => JsonError {
                error_type: Cow::Borrowed("FileSystem"),
                message: io_err.to_string(),
                code: Some(format!("{:?}", io_err.kind())),
                details: None,
            },
            Self::Network(req_err) => JsonError {
                error_type: Cow::Borrowed("Network"),
                message: req_err.to_string(),
                code: req_err.status().map(|s| s.as_u16().to_string()),
                details: None,
            },
            Self::Json(json_err) => JsonError {
                error_type: Cow::Borrowed("JSONParsing"),
                message: json_err.to_string(),
                code: None,
                details: None,
            },
            Self::Internal {
                kind,
                message,
                context,
            } => JsonError {
                error_type: Cow::Borrowed(kind.as_str()),
                message: message.to_string(),
                code: context.code.as_ref().map(ToString::to_string),
                details: context.details.clone(),
            },
            Self::Anyhow(err) => JsonError {
                error_type: Cow::Borrowed("Unknown"),
                message: err.to_string(),
                code: None,
                details: None,
            },
        }
    }
}

impl Error {
    fn internal(kind: ErrorKind, message: String, context: ErrorContext) -> Self {
        Self::Internal {
            kind,
            message: Cow::Owned(message),
            context: Box::new(context),
        }
    }

    // ---- Parser Errors ----

    /// Create a parse error located at `file:line:column`.
    pub fn parse_error(
        file: impl Into<String>,
        line: usize,
        column: usize,
        reason: impl Into<String>,
    ) -> Self {
        let file = file.into();
        let reason = reason.into();
        Self::internal(
            ErrorKind::Parser,
            format!("{file}:{line}:{column}: {reason}"),
            ErrorContext::now()
                .with_code("syntax")
                .with_details(json!({
                    "file": file,
                    "line": line,
                    "column": column,
                    "reason": reason,
                })),
        )
    }

    /// Create an invalid HTTP method error
    pub fn invalid_http_method(method: impl Into<String>) -> Self {
        let method = method.into();
        Self::internal(
            ErrorKind::Parser,
            format!("Invalid HTTP method: {method}"),
            ErrorContext::now()
                .with_code("invalid_method")
                .with_details(json!({ "method": method })),
        )
    }

    // ---- Request Errors ----

    /// Create a request failed error with an HTTP status
    pub fn request_failed(status: u16, reason: impl Into<String>) -> Self {
        let reason = reason.into();
        Self::internal(
            ErrorKind::Request,
            format!("Request failed with status {status}: {reason}"),
            ErrorContext::now()
                .with_code("http_status")
                .with_details(json!({ "status_code": status, "reason": reason })),
        )
    }

    /// Create a request timeout error
    pub fn request_timeout(timeout_ms: u64) -> Self {
        Self::internal(
            ErrorKind::Request,
            format!("Request timed out after {timeout_ms} ms"),
            ErrorContext::now()
                .with_code("timeout")
                .with_details(json!({ "timeout_ms": timeout_ms })),
        )
    }

    /// Create a transient network error
    pub fn transient_network_error(reason: impl Into<String>, retryable: bool) -> Self {
        let reason = reason.into();
        Self::internal(
            ErrorKind::Request,
            format!("Transient network error: {reason}"),
            ErrorContext::now()
                .with_code("transient")
                .with_details(json!({ "reason": reason, "retryable": retryable })),
        )
    }

    /// Create a retry limit exceeded error
    pub fn retry_limit_exceeded(max_attempts: u32, last_error: impl Into<String>) -> Self {
        let last_error = last_error.into();
        Self::internal(
            ErrorKind::Request,
            format!("Retry limit exceeded after {max_attempts} attempts: {last_error}"),
            ErrorContext::now()
                .with_code("retry_exhausted")
                .with_details(json!({
                    "max_attempts": max_attempts,
                    "last_error": last_error,
                })),
        )
    }

    // ---- Assertion Errors ----

    /// Create an expected/actual mismatch error
    pub fn assertion_failed(
        assertion_type: impl Into<String>,
        expected: impl Into<String>,
        actual: impl Into<String>,
    ) -> Self {
        let assertion_type = assertion_type.into();
        let expected = expected.into();
        let actual = actual.into();
        Self::internal(
            ErrorKind::Assertion,
            format!("{assertion_type} assertion failed: expected {expected}, got {actual}"),
            ErrorContext::now()
                .with_code("mismatch")
                .with_details(json!({
                    "assertion_type": assertion_type,
                    "expected": expected,
                    "actual": actual,
                })),
        )
    }

    /// Create a custom-validator failure error
    pub fn validator_failed(path: impl Into<String>, message: impl Into<String>) -> Self {
        let path = path.into();
        let message = message.into();
        Self::internal(
            ErrorKind::Assertion,
            format!("Validator '{path}' failed: {message}"),
            ErrorContext::now()
                .with_code("validator")
                .with_details(json!({ "validator": path, "message": message })),
        )
    }

    // ---- Config Errors ----

    /// Create an invalid configuration error
    pub fn invalid_config(reason: impl Into<String>) -> Self {
        let reason = reason.into();
        Self::internal(
            ErrorKind::Config,
            format!("Invalid configuration: {reason}"),
            ErrorContext::now()
                .with_code("config")
                .with_details(json!({ "reason": reason })),
        )
    }

    /// Create a usage error (bad CLI invocation)
    pub fn usage(reason: impl Into<String>) -> Self {
        let reason = reason.into();
        Self::internal(
            ErrorKind::Config,
            reason.clone(),
            ErrorContext::now()
                .with_code("usage")
                .with_details(json!({ "reason": reason })),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_error_carries_location() {
        let err = Error::parse_error("suite.http", 12, 3, "expected request line");
        assert_eq!(err.kind(), Some(ErrorKind::Parser));
        let json = err.to_json();
        assert_eq!(json.error_type, "ParserError");
        let details = json.details.unwrap();
        assert_eq!(details["line"], 12);
        assert_eq!(details["column"], 3);
    }

    #[test]
    fn exit_codes_follow_the_contract() {
        assert_eq!(
            Error::parse_error("f", 1, 1, "x").exit_code(),
            crate::constants::EXIT_USAGE
        );
        assert_eq!(
            Error::invalid_config("bad").exit_code(),
            crate::constants::EXIT_USAGE
        );
        assert_eq!(
            Error::request_timeout(100).exit_code(),
            crate::constants::EXIT_ASSERT_FAILED
        );
        let io = Error::Io(std::io::Error::new(std::io::ErrorKind::NotFound, "gone"));
        assert_eq!(io.exit_code(), crate::constants::EXIT_IO);
    }

    #[test]
    fn assertion_error_exposes_expected_and_actual() {
        let err = Error::assertion_failed("Status", "2xx", "500");
        let json = err.to_json();
        let details = json.details.unwrap();
        assert_eq!(details["expected"], "2xx");
        assert_eq!(details["actual"], "500");
        assert_eq!(details["assertion_type"], "Status");
    }

    #[test]
    fn internal_errors_are_stamped() {
        let err = Error::request_timeout(5);
        let Error::Internal { context, .. } = &err else {
            panic!("expected internal error");
        };
        assert!(context.timestamp.is_some());
        assert_eq!(context.code.as_deref(), Some("timeout"));
    }
}
