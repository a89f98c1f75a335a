//! Assertion engine.
//!
//! Evaluates Status, Header, Body-JSONPath, JSON-Schema, Response-time, and
//! custom-validator assertions against a response, producing one
//! [`TestResult`] per assertion.

use crate::error::Error;
use crate::model::{Assertion, AssertionKind, Request, Response, Test, TestResult};
use jsonschema::{Draft, JSONSchema};
use regex::Regex;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::process::Stdio;
use std::time::Instant;
use tokio::io::AsyncWriteExt;
use tracing::debug;

/// Data handed to a custom validator as its `context` argument.
pub struct AssertionContext<'a> {
    pub request: &'a Request,
    /// Flattened variable view at evaluation time.
    pub variables: HashMap<String, String>,
}

/// Evaluates every assertion of every test group against the response.
pub async fn evaluate_tests(
    tests: &[Test],
    response: &Response,
    ctx: &AssertionContext<'_>,
) -> Vec<TestResult> {
    let mut results = Vec::new();
    for test in tests {
        for assertion in &test.assertions {
            results.push(evaluate(&test.name, assertion, response, ctx).await);
        }
    }
    results
}

/// Evaluates one assertion, timing it.
pub async fn evaluate(
    test_name: &str,
    assertion: &Assertion,
    response: &Response,
    ctx: &AssertionContext<'_>,
) -> TestResult {
    let started = Instant::now();
    let outcome = match assertion.kind {
        AssertionKind::Status => check_status(&assertion.value, response),
        AssertionKind::Header => check_header(assertion, response),
        AssertionKind::Body => check_body(assertion, response),
        AssertionKind::JsonSchema => check_json_schema(&assertion.value, response),
        AssertionKind::ResponseTime => check_response_time(&assertion.value, response),
        AssertionKind::Custom => check_custom(&assertion.value, response, ctx).await,
    };

    let name = match &assertion.key {
        Some(key) => format!("{test_name}: {} {key}", assertion.kind.as_str()),
        None => format!("{test_name}: {}", assertion.kind.as_str()),
    };
    debug!(assertion = %name, passed = outcome.is_ok(), "assertion evaluated");

    TestResult {
        name,
        passed: outcome.is_ok(),
        error: outcome.err().map(|e| e.to_string()),
        duration: started.elapsed(),
    }
}

/// Exact (`200`), wildcard range (`2xx`), or comma-separated list.
fn check_status(expected: &str, response: &Response) -> Result<(), Error> {
    let matches = expected
        .split(',')
        .map(str::trim)
        .any(|token| status_token_matches(token, response.status));
    if matches {
        Ok(())
    } else {
        Err(Error::assertion_failed(
            "Status",
            expected,
            response.status.to_string(),
        ))
    }
}

fn status_token_matches(token: &str, status: u16) -> bool {
    if let Some(first) = token.strip_suffix("xx") {
        if let Ok(hundreds) = first.parse::<u16>() {
            return status / 100 == hundreds;
        }
        return false;
    }
    token.parse::<u16>() == Ok(status)
}

/// Case-insensitive name match; value may be an exact string or a `/regex/`.
fn check_header(assertion: &Assertion, response: &Response) -> Result<(), Error> {
    let name = assertion.key.as_deref().unwrap_or_default();
    let Some(actual) = response.headers.get(name) else {
        return Err(Error::assertion_failed(
            "Header",
            format!("{name}: {}", assertion.value),
            "header absent".to_string(),
        ));
    };

    let expected = assertion.value.as_str();
    let matched = regex_literal(expected).map_or_else(
        || actual == expected,
        |pattern| {
            Regex::new(pattern).is_ok_and(|re| re.is_match(actual))
        },
    );
    if matched {
        Ok(())
    } else {
        Err(Error::assertion_failed(
            "Header",
            format!("{name}: {expected}"),
            format!("{name}: {actual}"),
        ))
    }
}

/// `/pattern/` → `pattern`; anything else is an exact-match literal.
fn regex_literal(value: &str) -> Option<&str> {
    value
        .strip_prefix('/')
        .and_then(|v| v.strip_suffix('/'))
        .filter(|inner| !inner.is_empty())
}

/// JSONPath select then literal compare. The expected side is parsed as JSON
/// first (`123`, `true`, `"x"`), else treated as a plain string.
fn check_body(assertion: &Assertion, response: &Response) -> Result<(), Error> {
    let path = assertion.key.as_deref().unwrap_or("$");
    let body = response.data.as_json().ok_or_else(|| {
        Error::assertion_failed("Body", path, "response body is not JSON".to_string())
    })?;
    let actual = crate::jsonpath::select(body, path)?;
    let expected = parse_expected(&assertion.value);

    if values_equal(&actual, &expected) {
        Ok(())
    } else {
        Err(Error::assertion_failed(
            "Body",
            expected.to_string(),
            actual.to_string(),
        ))
    }
}

fn parse_expected(raw: &str) -> Value {
    serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()))
}

/// Equality with one widening: a string expectation matches the textual
/// rendering of a non-string actual (`"7"` matches `7`).
fn values_equal(actual: &Value, expected: &Value) -> bool {
    if actual == expected {
        return true;
    }
    match (actual, expected) {
        (Value::String(a), _) => a == &expected.to_string(),
        (_, Value::String(e)) => &actual.to_string() == e,
        _ => false,
    }
}

/// Draft-07 schema validation; the assertion value is an inline document or
/// a file path.
fn check_json_schema(value: &str, response: &Response) -> Result<(), Error> {
    let schema_text = if value.trim_start().starts_with('{') {
        value.to_string()
    } else {
        std::fs::read_to_string(value)?
    };
    let schema: Value = serde_json::from_str(&schema_text)?;

    let compiled = JSONSchema::options()
        .with_draft(Draft::Draft7)
        .compile(&schema)
        .map_err(|e| Error::assertion_failed("JsonSchema", "valid schema", e.to_string()))?;

    let body = response.data.as_json().ok_or_else(|| {
        Error::assertion_failed(
            "JsonSchema",
            "JSON body",
            "response body is not JSON".to_string(),
        )
    })?;

    let violations: Vec<String> = match compiled.validate(body) {
        Ok(()) => return Ok(()),
        Err(errors) => errors.map(|e| e.to_string()).collect(),
    };
    Err(Error::assertion_failed(
        "JsonSchema",
        "schema-conformant body",
        violations.join("; "),
    ))
}

/// Pass iff `executionTime <= value` milliseconds.
fn check_response_time(value: &str, response: &Response) -> Result<(), Error> {
    let limit_ms: u128 = value.trim().parse().map_err(|_| {
        Error::assertion_failed("ResponseTime", "a millisecond bound", value.to_string())
    })?;
    let actual_ms = response.execution_time.as_millis();
    if actual_ms <= limit_ms {
        Ok(())
    } else {
        Err(Error::assertion_failed(
            "ResponseTime",
            format!("<= {limit_ms} ms"),
            format!("{actual_ms} ms"),
        ))
    }
}

/// Runs the user-supplied validator program with the response JSON on stdin
/// and the `{request, variables}` context as its single argument. A zero
/// exit signals pass; anything else fails with the validator's message.
async fn check_custom(
    path: &str,
    response: &Response,
    ctx: &AssertionContext<'_>,
) -> Result<(), Error> {
    let response_json = json!({
        "status": response.status,
        "statusText": response.status_text,
        "headers": ctx_headers(response),
        "body": response.data.as_json().cloned()
            .unwrap_or_else(|| Value::String(response.data.to_display_string())),
        "executionTime": response.execution_time.as_millis() as u64,
    });
    let context_json = json!({
        "request": {
            "name": ctx.request.name,
            "method": ctx.request.method().as_str(),
            "url": ctx.request.url,
        },
        "variables": ctx.variables,
    });

    let mut child = tokio::process::Command::new(path)
        .arg(context_json.to_string())
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|e| Error::validator_failed(path, format!("failed to start: {e}")))?;

    if let Some(stdin) = child.stdin.as_mut() {
        stdin
            .write_all(response_json.to_string().as_bytes())
            .await
            .map_err(|e| Error::validator_failed(path, format!("stdin write failed: {e}")))?;
    }

    let output = child
        .wait_with_output()
        .await
        .map_err(|e| Error::validator_failed(path, e.to_string()))?;

    if output.status.success() {
        return Ok(());
    }
    let stderr = String::from_utf8_lossy(&output.stderr);
    let stdout = String::from_utf8_lossy(&output.stdout);
    let message = stderr
        .lines()
        .chain(stdout.lines())
        .next()
        .unwrap_or("validator reported failure")
        .to_string();
    Err(Error::validator_failed(path, message))
}

fn ctx_headers(response: &Response) -> HashMap<String, String> {
    response
        .headers
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}
