//! Per-line classification for the `.http` dialect.
//!
//! Recognizers apply first-match-wins in the order the file parser needs:
//! blank, assertion header, section separator, directives, comments, variable
//! assignments, script delimiters, body-file references. Lines that classify
//! as [`LineClass::Other`] are interpreted contextually by the state machine
//! (request line, header, body text, assertion line).

use crate::constants;

/// Script block delimiters recognized by the classifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScriptMarker {
    /// `< {%` — start of an inline pre-request script.
    InlinePreOpen { rest: String },
    /// `> {%` — start of an inline response-handler script.
    InlinePostOpen { rest: String },
    /// A line ending in `%}`.
    Close,
    /// `< path.js`
    FilePre { path: String },
    /// `> path.js`
    FilePost { path: String },
}

/// Classification of one source line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LineClass {
    Blank,
    /// `### title…`
    SectionHeader { title: String },
    /// `#### Assert[: description]`
    AssertHeader { description: Option<String> },
    /// `# @name <id>` (also accepted with `//`, the JetBrains convention)
    NameDirective { id: String },
    /// `# @expectError`
    ExpectErrorDirective,
    /// `# @timeout <ms>`
    TimeoutDirective { ms: u64 },
    /// `#` or `//` comment that is not a separator or directive
    Comment,
    /// `@key = value`; the value may contain further `=`
    VariableAssignment { key: String, value: String },
    /// One of the script block delimiters
    Script(ScriptMarker),
    /// `< path` where the path does not end in `.js`
    BodyFileRef { path: String },
    /// Everything else; meaning depends on parser state
    Other,
}

/// Classifies a single line.
#[must_use]
pub fn classify(line: &str) -> LineClass {
    let trimmed = line.trim();

    if trimmed.is_empty() {
        return LineClass::Blank;
    }

    // `####` before `###`: an assert header is not a section separator.
    if let Some(rest) = trimmed.strip_prefix("####") {
        let rest = rest.trim_start();
        if let Some(desc) = rest.strip_prefix("Assert") {
            let description = desc
                .trim_start()
                .strip_prefix(':')
                .map(|d| d.trim().to_string())
                .filter(|d| !d.is_empty());
            return LineClass::AssertHeader { description };
        }
        return LineClass::Comment;
    }

    if let Some(rest) = trimmed.strip_prefix(constants::SECTION_SEPARATOR) {
        return LineClass::SectionHeader {
            title: rest.trim().to_string(),
        };
    }

    if trimmed.starts_with('#') || trimmed.starts_with("//") {
        return classify_comment(trimmed);
    }

    if let Some(rest) = trimmed.strip_prefix('@') {
        if let Some((key, value)) = rest.split_once('=') {
            let key = key.trim();
            if !key.is_empty() {
                return LineClass::VariableAssignment {
                    key: key.to_string(),
                    value: value.trim().to_string(),
                };
            }
        }
    }

    if let Some(marker) = classify_script(trimmed) {
        return LineClass::Script(marker);
    }

    if let Some(path) = trimmed.strip_prefix('<') {
        let path = path.trim();
        if !path.is_empty() {
            return LineClass::BodyFileRef {
                path: path.to_string(),
            };
        }
    }

    LineClass::Other
}

/// Distinguishes `@name` / `@expectError` / `@timeout` directives from plain
/// comments.
fn classify_comment(trimmed: &str) -> LineClass {
    let content = trimmed
        .strip_prefix("//")
        .or_else(|| trimmed.strip_prefix('#'))
        .unwrap_or(trimmed)
        .trim();

    if let Some(id) = content.strip_prefix(constants::DIRECTIVE_NAME) {
        let id = id.trim();
        if !id.is_empty() {
            return LineClass::NameDirective {
                id: id.to_string(),
            };
        }
    }
    if content == constants::DIRECTIVE_EXPECT_ERROR {
        return LineClass::ExpectErrorDirective;
    }
    if let Some(ms) = content.strip_prefix(constants::DIRECTIVE_TIMEOUT) {
        if let Ok(ms) = ms.trim().parse() {
            return LineClass::TimeoutDirective { ms };
        }
    }
    LineClass::Comment
}

fn classify_script(trimmed: &str) -> Option<ScriptMarker> {
    if let Some(rest) = trimmed.strip_prefix(constants::SCRIPT_OPEN_PRE) {
        return Some(ScriptMarker::InlinePreOpen {
            rest: rest.to_string(),
        });
    }
    if let Some(rest) = trimmed.strip_prefix(constants::SCRIPT_OPEN_POST) {
        return Some(ScriptMarker::InlinePostOpen {
            rest: rest.to_string(),
        });
    }
    if trimmed == constants::SCRIPT_CLOSE {
        return Some(ScriptMarker::Close);
    }
    if let Some(path) = trimmed.strip_prefix('<') {
        let path = path.trim();
        if path.ends_with(constants::SCRIPT_FILE_EXT) {
            return Some(ScriptMarker::FilePre {
                path: path.to_string(),
            });
        }
    }
    if let Some(path) = trimmed.strip_prefix('>') {
        let path = path.trim();
        if path.ends_with(constants::SCRIPT_FILE_EXT) {
            return Some(ScriptMarker::FilePost {
                path: path.to_string(),
            });
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_lines() {
        assert_eq!(classify(""), LineClass::Blank);
        assert_eq!(classify("   \t"), LineClass::Blank);
    }

    #[test]
    fn section_headers_keep_their_title() {
        assert_eq!(
            classify("### Login request"),
            LineClass::SectionHeader {
                title: "Login request".into()
            }
        );
        assert_eq!(
            classify("###"),
            LineClass::SectionHeader { title: String::new() }
        );
    }

    #[test]
    fn assert_header_is_not_a_section_separator() {
        assert_eq!(
            classify("#### Assert"),
            LineClass::AssertHeader { description: None }
        );
        assert_eq!(
            classify("#### Assert: checks the id"),
            LineClass::AssertHeader {
                description: Some("checks the id".into())
            }
        );
    }

    #[test]
    fn comments_in_both_dialects() {
        assert_eq!(classify("# plain comment"), LineClass::Comment);
        assert_eq!(classify("// slash comment"), LineClass::Comment);
    }

    #[test]
    fn name_directive() {
        assert_eq!(
            classify("# @name login"),
            LineClass::NameDirective { id: "login".into() }
        );
        assert_eq!(
            classify("// @name login"),
            LineClass::NameDirective { id: "login".into() }
        );
    }

    #[test]
    fn expect_error_and_timeout_directives() {
        assert_eq!(classify("# @expectError"), LineClass::ExpectErrorDirective);
        assert_eq!(
            classify("# @timeout 1500"),
            LineClass::TimeoutDirective { ms: 1500 }
        );
        // Unparseable timeout degrades to a comment
        assert_eq!(classify("# @timeout soon"), LineClass::Comment);
    }

    #[test]
    fn variable_assignment_spacing_variants() {
        assert_eq!(
            classify("@host = http://x"),
            LineClass::VariableAssignment {
                key: "host".into(),
                value: "http://x".into()
            }
        );
        assert_eq!(
            classify("@host=http://x"),
            LineClass::VariableAssignment {
                key: "host".into(),
                value: "http://x".into()
            }
        );
    }

    #[test]
    fn variable_assignment_value_may_contain_equals() {
        assert_eq!(
            classify("@query=a=1&b=2"),
            LineClass::VariableAssignment {
                key: "query".into(),
                value: "a=1&b=2".into()
            }
        );
    }

    #[test]
    fn script_delimiters() {
        assert!(matches!(
            classify("< {%"),
            LineClass::Script(ScriptMarker::InlinePreOpen { .. })
        ));
        assert!(matches!(
            classify("> {%"),
            LineClass::Script(ScriptMarker::InlinePostOpen { .. })
        ));
        assert_eq!(classify("%}"), LineClass::Script(ScriptMarker::Close));
        assert_eq!(
            classify("< pre.js"),
            LineClass::Script(ScriptMarker::FilePre { path: "pre.js".into() })
        );
        assert_eq!(
            classify("> post.js"),
            LineClass::Script(ScriptMarker::FilePost { path: "post.js".into() })
        );
    }

    #[test]
    fn body_file_reference_excludes_scripts() {
        assert_eq!(
            classify("< ./payload.json"),
            LineClass::BodyFileRef {
                path: "./payload.json".into()
            }
        );
    }

    #[test]
    fn request_and_header_lines_are_other() {
        assert_eq!(classify("GET http://x/u"), LineClass::Other);
        assert_eq!(classify("Content-Type: application/json"), LineClass::Other);
    }
}
