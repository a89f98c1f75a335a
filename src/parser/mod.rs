//! `.http` file parser.
//!
//! A stateful scanner over lines (states: outside, headers, body,
//! assertions) producing the list of requests a file describes. Sections are
//! delimited by `###`; script blocks are split out per section before the
//! state machine runs, so bodies never see script text.

pub mod body;
pub mod line;
pub mod script;

use crate::error::Error;
use crate::model::{
    Assertion, AssertionKind, Method, Request, RequestBody, Test, VariableUpdate,
};
use body::BodyKind;
use line::{classify, LineClass};
use std::path::PathBuf;
use std::str::FromStr;
use tracing::warn;

/// Result of parsing one `.http` file.
#[derive(Debug, Default)]
pub struct ParsedFile {
    pub requests: Vec<Request>,
    /// `@key = value` declarations at file top, in order; these mutate the
    /// File scope.
    pub file_variables: Vec<(String, String)>,
    /// Recoverable oddities (discarded assertion blocks, unknown lines).
    pub warnings: Vec<String>,
}

/// Parses `.http` source into requests and file-scope variables.
///
/// # Errors
///
/// Returns a parser-kind error (with file/line/column) for malformed request
/// lines, unknown methods, and malformed headers. Recoverable issues are
/// collected as warnings instead.
pub fn parse(content: &str, file_name: &str) -> Result<ParsedFile, Error> {
    let mut parsed = ParsedFile::default();

    for section in split_sections(content) {
        if let Some(request) = parse_section(&section, file_name, &mut parsed)? {
            parsed.requests.push(request);
        }
    }

    Ok(parsed)
}

/// A `###`-delimited slice of the file. The preamble (everything before the
/// first separator) is a section without a title.
struct Section {
    title: Option<String>,
    /// (1-based line number, text) pairs.
    lines: Vec<(usize, String)>,
}

fn split_sections(content: &str) -> Vec<Section> {
    let mut sections = vec![Section {
        title: None,
        lines: Vec::new(),
    }];

    for (idx, text) in content.lines().enumerate() {
        if let LineClass::SectionHeader { title } = classify(text) {
            sections.push(Section {
                title: Some(title),
                lines: Vec::new(),
            });
        } else {
            sections
                .last_mut()
                .expect("sections always start non-empty")
                .lines
                .push((idx + 1, text.to_string()));
        }
    }
    sections
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Outside,
    Headers,
    Body,
    Assertions,
}

/// Parses one section into at most one request. Preamble sections usually
/// yield only file variables.
#[allow(clippy::too_many_lines)]
fn parse_section(
    section: &Section,
    file_name: &str,
    parsed: &mut ParsedFile,
) -> Result<Option<Request>, Error> {
    let texts: Vec<&str> = section.lines.iter().map(|(_, t)| t.as_str()).collect();
    let scripts = script::extract(&texts);

    // Script extraction only removes lines; recover line numbers by walking
    // the original buffer in order.
    let mut numbered = Vec::with_capacity(scripts.stripped.len());
    let mut cursor = 0;
    for stripped in &scripts.stripped {
        while section.lines[cursor].1 != *stripped {
            cursor += 1;
        }
        numbered.push((section.lines[cursor].0, stripped.as_str()));
        cursor += 1;
    }

    let is_preamble = section.title.is_none();
    let mut state = State::Outside;
    let mut request: Option<Request> = None;
    let mut pending_id: Option<String> = None;
    let mut pending_expect_error = false;
    let mut pending_timeout: Option<u64> = None;
    let mut updates: Vec<VariableUpdate> = Vec::new();
    let mut body_lines: Vec<&str> = Vec::new();
    let mut body_file: Option<PathBuf> = None;
    let mut tests: Vec<Test> = Vec::new();
    let mut discarding_assertions = false;

    for &(line_no, text) in &numbered {
        let class = classify(text);
        match state {
            State::Outside => match class {
                LineClass::Blank | LineClass::Comment => {}
                LineClass::NameDirective { id } => pending_id = Some(id),
                LineClass::ExpectErrorDirective => pending_expect_error = true,
                LineClass::TimeoutDirective { ms } => pending_timeout = Some(ms),
                LineClass::VariableAssignment { key, value } => {
                    if is_preamble {
                        parsed.file_variables.push((key, value));
                    } else {
                        updates.push(VariableUpdate { key, source: value });
                    }
                }
                LineClass::AssertHeader { .. } => {
                    warn!(file = file_name, line = line_no, "assertion block with no preceding request");
                    parsed.warnings.push(format!(
                        "{file_name}:{line_no}: assertion block with no preceding request; discarded"
                    ));
                    discarding_assertions = true;
                    state = State::Assertions;
                }
                LineClass::Other => {
                    request = Some(parse_request_line(text, file_name, line_no)?);
                    state = State::Headers;
                }
                LineClass::Script(_) => {}
                LineClass::BodyFileRef { .. } | LineClass::SectionHeader { .. } => {
                    return Err(Error::parse_error(
                        file_name,
                        line_no,
                        1,
                        format!("expected request line, found '{text}'"),
                    ));
                }
            },
            State::Headers => match class {
                LineClass::Blank => state = State::Body,
                LineClass::AssertHeader { description } => {
                    tests.push(new_test(description, tests.len()));
                    state = State::Assertions;
                }
                LineClass::VariableAssignment { key, value } => {
                    updates.push(VariableUpdate { key, source: value });
                }
                LineClass::Comment | LineClass::Script(_) => {}
                LineClass::Other => {
                    let Some((name, value)) = text.split_once(':') else {
                        return Err(Error::parse_error(
                            file_name,
                            line_no,
                            1,
                            format!("malformed header '{text}', expected 'Name: Value'"),
                        ));
                    };
                    let req = request.as_mut().expect("headers state implies a request");
                    req.headers.insert(name.trim(), value.trim());
                }
                LineClass::NameDirective { .. }
                | LineClass::ExpectErrorDirective
                | LineClass::TimeoutDirective { .. } => {}
                LineClass::BodyFileRef { .. } | LineClass::SectionHeader { .. } => {
                    return Err(Error::parse_error(
                        file_name,
                        line_no,
                        1,
                        format!("malformed header '{text}', expected 'Name: Value'"),
                    ));
                }
            },
            State::Body => match class {
                LineClass::AssertHeader { description } => {
                    tests.push(new_test(description, tests.len()));
                    state = State::Assertions;
                }
                LineClass::VariableAssignment { key, value } => {
                    updates.push(VariableUpdate { key, source: value });
                }
                LineClass::BodyFileRef { path } => body_file = Some(PathBuf::from(path)),
                LineClass::Script(_) => {}
                // Bodies are opaque: comments and blank lines accumulate.
                _ => body_lines.push(text),
            },
            State::Assertions => match class {
                LineClass::Blank | LineClass::Comment | LineClass::Script(_) => {}
                LineClass::AssertHeader { description } => {
                    if !discarding_assertions {
                        tests.push(new_test(description, tests.len()));
                    }
                }
                LineClass::VariableAssignment { key, value } => {
                    if !discarding_assertions {
                        updates.push(VariableUpdate { key, source: value });
                    }
                }
                LineClass::Other => {
                    if discarding_assertions {
                        continue;
                    }
                    match parse_assertion_line(text) {
                        Some(assertion) => tests
                            .last_mut()
                            .expect("assert header precedes assertion lines")
                            .assertions
                            .push(assertion),
                        None => {
                            parsed.warnings.push(format!(
                                "{file_name}:{line_no}: unrecognized assertion line '{text}'"
                            ));
                        }
                    }
                }
                LineClass::NameDirective { .. }
                | LineClass::ExpectErrorDirective
                | LineClass::TimeoutDirective { .. }
                | LineClass::BodyFileRef { .. }
                | LineClass::SectionHeader { .. } => {
                    parsed.warnings.push(format!(
                        "{file_name}:{line_no}: unexpected line in assertion block"
                    ));
                }
            },
        }
    }

    let Some(mut request) = request else {
        if pending_id.is_some() || pending_expect_error {
            parsed.warnings.push(format!(
                "{file_name}: directive without a following request in section '{}'",
                section.title.as_deref().unwrap_or("<preamble>")
            ));
        }
        return Ok(None);
    };

    request.name = section
        .title
        .clone()
        .filter(|t| !t.is_empty())
        .or_else(|| pending_id.clone())
        .unwrap_or_else(|| format!("Request {}", parsed.requests.len() + 1));
    request.request_id = pending_id;
    request.expect_error = pending_expect_error;
    request.timeout_ms = pending_timeout;
    request.variable_updates = updates;
    request.tests = tests;
    request.pre_scripts = scripts.pre;
    request.post_scripts = scripts.post;
    request.body = build_body(&request, body_file, &body_lines);

    Ok(Some(request))
}

fn new_test(description: Option<String>, index: usize) -> Test {
    Test {
        name: description.unwrap_or_else(|| format!("Assert {}", index + 1)),
        assertions: Vec::new(),
    }
}

/// `METHOD SP URL [HTTP/version]`
fn parse_request_line(text: &str, file_name: &str, line_no: usize) -> Result<Request, Error> {
    let mut parts = text.split_whitespace();
    let method_token = parts
        .next()
        .ok_or_else(|| Error::parse_error(file_name, line_no, 1, "empty request line"))?;
    let method = Method::from_str(method_token).map_err(|_| {
        Error::parse_error(
            file_name,
            line_no,
            1,
            format!("invalid HTTP method '{method_token}'"),
        )
    })?;
    let url = parts.next().map(str::to_string).ok_or_else(|| {
        Error::parse_error(file_name, line_no, method_token.len() + 1, "missing URL")
    })?;
    if let Some(extra) = parts.next() {
        if !extra.starts_with("HTTP/") {
            return Err(Error::parse_error(
                file_name,
                line_no,
                1,
                format!("unexpected token '{extra}' after URL"),
            ));
        }
    }

    Ok(Request {
        method: Some(method),
        url,
        ..Request::default()
    })
}

/// One line inside an assertion block.
fn parse_assertion_line(text: &str) -> Option<Assertion> {
    let (key, value) = text.split_once(':')?;
    let key = key.trim();
    let value = value.trim().to_string();

    let assertion = if key == crate::constants::ASSERT_KEY_STATUS {
        Assertion {
            kind: AssertionKind::Status,
            key: None,
            value,
        }
    } else if key.starts_with('$') {
        Assertion {
            kind: AssertionKind::Body,
            key: Some(key.to_string()),
            value,
        }
    } else if key == crate::constants::ASSERT_KEY_JSON_SCHEMA {
        Assertion {
            kind: AssertionKind::JsonSchema,
            key: None,
            value,
        }
    } else if key == crate::constants::ASSERT_KEY_CUSTOM {
        Assertion {
            kind: AssertionKind::Custom,
            key: None,
            value,
        }
    } else if key == "_ResponseTime" || key == "ResponseTime" {
        Assertion {
            kind: AssertionKind::ResponseTime,
            key: None,
            value,
        }
    } else {
        Assertion {
            kind: AssertionKind::Header,
            key: Some(key.to_string()),
            value,
        }
    };
    Some(assertion)
}

/// Assembles the request body from the accumulated lines or the `< path`
/// reference, choosing the parser family member from `Content-Type`.
fn build_body(
    request: &Request,
    body_file: Option<PathBuf>,
    body_lines: &[&str],
) -> Option<RequestBody> {
    if let Some(path) = body_file {
        return Some(RequestBody::FromFile(path));
    }

    // Trim trailing blank lines; leading blanks were consumed by the
    // headers→body transition.
    let trimmed_len = body_lines
        .iter()
        .rposition(|l| !l.trim().is_empty())
        .map_or(0, |i| i + 1);
    if trimmed_len == 0 {
        return None;
    }
    let text = body_lines[..trimmed_len].join("\n");

    let content_type = request.headers.get(crate::constants::HEADER_CONTENT_TYPE);
    if BodyKind::from_content_type(content_type) == BodyKind::Multipart {
        if let Some(boundary) = content_type.and_then(body::multipart_boundary) {
            if let Ok(body::ParsedBody::Multipart(fields)) =
                BodyKind::Multipart.parse_body(&text, Some(&boundary))
            {
                return Some(RequestBody::Multipart(fields));
            }
        }
    }
    Some(RequestBody::Text(text))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Method;

    fn parse_ok(content: &str) -> ParsedFile {
        parse(content, "test.http").unwrap()
    }

    #[test]
    fn empty_file_parses_to_zero_requests() {
        let parsed = parse_ok("");
        assert!(parsed.requests.is_empty());
        assert!(parsed.file_variables.is_empty());
    }

    #[test]
    fn file_top_variable_and_request() {
        let parsed = parse_ok("@h=http://x\n### A\nGET {{h}}/u\n");
        assert_eq!(parsed.file_variables, vec![("h".into(), "http://x".into())]);
        assert_eq!(parsed.requests.len(), 1);
        let request = &parsed.requests[0];
        assert_eq!(request.name, "A");
        assert_eq!(request.method(), Method::Get);
        assert_eq!(request.url, "{{h}}/u");
    }

    #[test]
    fn request_without_separator_at_file_top() {
        let parsed = parse_ok("GET http://x/u\n");
        assert_eq!(parsed.requests.len(), 1);
        assert_eq!(parsed.requests[0].name, "Request 1");
    }

    #[test]
    fn headers_end_at_blank_line() {
        let parsed = parse_ok(
            "### Post\nPOST http://x/u\nContent-Type: application/json\nX-Trace: abc\n\n{\"a\": 1}\n",
        );
        let request = &parsed.requests[0];
        assert_eq!(request.headers.len(), 2);
        assert_eq!(
            request.headers.get("content-type"),
            Some("application/json")
        );
        assert_eq!(
            request.body,
            Some(RequestBody::Text("{\"a\": 1}".into()))
        );
    }

    #[test]
    fn request_line_may_carry_http_version() {
        let parsed = parse_ok("### A\nGET http://x/u HTTP/1.1\n");
        assert_eq!(parsed.requests[0].url, "http://x/u");
    }

    #[test]
    fn invalid_method_is_a_parse_error() {
        let err = parse("### A\nFETCH http://x/u\n", "suite.http").unwrap_err();
        assert!(err.to_string().contains("FETCH"));
        assert!(err.to_string().contains("suite.http:2"));
    }

    #[test]
    fn missing_url_is_a_parse_error() {
        assert!(parse("### A\nGET\n", "t.http").is_err());
    }

    #[test]
    fn name_and_expect_error_directives() {
        let parsed = parse_ok("### A\n# @name login\n# @expectError\nGET http://x/u\n");
        let request = &parsed.requests[0];
        assert_eq!(request.request_id.as_deref(), Some("login"));
        assert!(request.expect_error);
    }

    #[test]
    fn timeout_directive_sets_override() {
        let parsed = parse_ok("### A\n# @timeout 2500\nGET http://x/u\n");
        assert_eq!(parsed.requests[0].timeout_ms, Some(2500));
    }

    #[test]
    fn assertion_block_kinds() {
        let parsed = parse_ok(
            "### A\nPOST http://x/u\n\n#### Assert\nStatus: 2xx\n$.id: 7\nContent-Type: application/json\n_JsonSchema: ./schema.json\n_CustomAssert: ./check.js\n_ResponseTime: 1000\n",
        );
        let request = &parsed.requests[0];
        assert_eq!(request.tests.len(), 1);
        let kinds: Vec<AssertionKind> = request.tests[0]
            .assertions
            .iter()
            .map(|a| a.kind)
            .collect();
        assert_eq!(
            kinds,
            vec![
                AssertionKind::Status,
                AssertionKind::Body,
                AssertionKind::Header,
                AssertionKind::JsonSchema,
                AssertionKind::Custom,
                AssertionKind::ResponseTime,
            ]
        );
        assert_eq!(
            request.tests[0].assertions[1].key.as_deref(),
            Some("$.id")
        );
    }

    #[test]
    fn assert_header_description_names_the_test() {
        let parsed = parse_ok("### A\nGET http://x\n\n#### Assert: happy path\nStatus: 200\n");
        assert_eq!(parsed.requests[0].tests[0].name, "happy path");
    }

    #[test]
    fn multiple_assert_blocks_become_multiple_tests() {
        let parsed = parse_ok(
            "### A\nGET http://x\n\n#### Assert: one\nStatus: 200\n#### Assert: two\nStatus: 2xx\n",
        );
        assert_eq!(parsed.requests[0].tests.len(), 2);
    }

    #[test]
    fn assertion_block_without_request_is_discarded_with_warning() {
        let parsed = parse_ok("#### Assert\nStatus: 200\n### A\nGET http://x\n");
        assert_eq!(parsed.requests.len(), 1);
        assert!(parsed.requests[0].tests.is_empty());
        assert!(!parsed.warnings.is_empty());
    }

    #[test]
    fn in_request_assignment_becomes_variable_update() {
        let parsed = parse_ok("### A\nGET http://x\n\n@uid=$.data.id\n@mode = fast\n");
        let updates = &parsed.requests[0].variable_updates;
        assert_eq!(updates.len(), 2);
        assert_eq!(updates[0].key, "uid");
        assert!(updates[0].is_jsonpath());
        assert!(!updates[1].is_jsonpath());
    }

    #[test]
    fn body_file_reference_defers_loading() {
        let parsed = parse_ok("### A\nPOST http://x\n\n< ./payload.json\n");
        assert_eq!(
            parsed.requests[0].body,
            Some(RequestBody::FromFile(PathBuf::from("./payload.json")))
        );
    }

    #[test]
    fn scripts_are_stripped_from_the_body() {
        let parsed = parse_ok(
            "### A\nPOST http://x\nContent-Type: application/json\n\n{\"a\": 1}\n> {%\ncheck();\n%}\n",
        );
        let request = &parsed.requests[0];
        assert_eq!(request.post_scripts.len(), 1);
        assert_eq!(
            request.body,
            Some(RequestBody::Text("{\"a\": 1}".into()))
        );
    }

    #[test]
    fn multipart_body_is_parsed_into_fields() {
        let content = "### Upload\nPOST http://x/upload\nContent-Type: multipart/form-data; boundary=XX\n\n--XX\r\nContent-Disposition: form-data; name=\"f\"\r\n\r\nv\r\n--XX--\n";
        let parsed = parse_ok(content);
        let Some(RequestBody::Multipart(fields)) = &parsed.requests[0].body else {
            panic!("expected multipart body");
        };
        assert_eq!(fields[0].name, "f");
        assert_eq!(fields[0].data, "v");
    }

    #[test]
    fn several_sections_in_order() {
        let parsed = parse_ok("### one\nGET http://x/1\n\n### two\nGET http://x/2\n\n### three\nGET http://x/3\n");
        let names: Vec<&str> = parsed.requests.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["one", "two", "three"]);
    }

    #[test]
    fn unnamed_section_falls_back_to_request_id_then_index() {
        let parsed = parse_ok("###\n# @name login\nGET http://x\n\n###\nGET http://y\n");
        assert_eq!(parsed.requests[0].name, "login");
        assert_eq!(parsed.requests[1].name, "Request 2");
    }

    #[test]
    fn every_request_has_method_and_url() {
        let parsed = parse_ok("### A\nGET http://x/1\n\n### B\nPOST http://x/2\n\n{}\n");
        for request in &parsed.requests {
            assert!(!request.url.is_empty());
            assert!(crate::constants::HTTP_METHODS.contains(&request.method().as_str()));
        }
    }
}
