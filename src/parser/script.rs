//! Script block extraction.
//!
//! Scans a section's lines and splits out pre-request (`< {% … %}` /
//! `< file.js`) and response-handler (`> {% … %}` / `> file.js`) scripts,
//! returning the remaining lines as the stripped section the body parser
//! consumes. The single-line form `< {% … %}` is permitted.

use crate::constants;
use crate::model::Script;
use crate::parser::line::{classify, LineClass, ScriptMarker};
use std::path::PathBuf;

/// Scripts pulled from a section plus the section with those lines removed.
#[derive(Debug, Default)]
pub struct ExtractedScripts {
    pub pre: Vec<Script>,
    pub post: Vec<Script>,
    pub stripped: Vec<String>,
}

/// Extracts script blocks from the given lines.
#[must_use]
pub fn extract(lines: &[&str]) -> ExtractedScripts {
    let mut out = ExtractedScripts::default();
    let mut iter = lines.iter();

    while let Some(line) = iter.next() {
        let LineClass::Script(marker) = classify(line) else {
            out.stripped.push((*line).to_string());
            continue;
        };

        match marker {
            ScriptMarker::FilePre { path } => out.pre.push(Script::File(PathBuf::from(path))),
            ScriptMarker::FilePost { path } => out.post.push(Script::File(PathBuf::from(path))),
            ScriptMarker::InlinePreOpen { rest } => {
                out.pre.push(collect_inline(&rest, &mut iter));
            }
            ScriptMarker::InlinePostOpen { rest } => {
                out.post.push(collect_inline(&rest, &mut iter));
            }
            // A stray close marker outside a block carries no script.
            ScriptMarker::Close => {}
        }
    }

    out
}

/// Collects an inline block's source, starting from the text after the
/// opener and consuming lines until one ends with `%}`.
fn collect_inline<'a>(
    opener_rest: &str,
    iter: &mut std::slice::Iter<'_, &'a str>,
) -> Script {
    // Single-line form: `< {% source %}`
    if let Some(single) = opener_rest.trim_end().strip_suffix(constants::SCRIPT_CLOSE) {
        return Script::Inline(single.trim().to_string());
    }

    let mut source = Vec::new();
    if !opener_rest.trim().is_empty() {
        source.push(opener_rest.trim().to_string());
    }
    for line in iter.by_ref() {
        let trimmed = line.trim_end();
        if let Some(last) = trimmed.strip_suffix(constants::SCRIPT_CLOSE) {
            if !last.trim().is_empty() {
                source.push(last.trim().to_string());
            }
            break;
        }
        source.push((*line).to_string());
    }
    Script::Inline(source.join("\n"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lines(text: &str) -> Vec<&str> {
        text.lines().collect()
    }

    #[test]
    fn extracts_inline_pre_request_block() {
        let section = lines("GET http://x\n< {%\nconst a = 1;\nclient.log(a);\n%}\n");
        let result = extract(&section);
        assert_eq!(
            result.pre,
            vec![Script::Inline("const a = 1;\nclient.log(a);".into())]
        );
        assert!(result.post.is_empty());
        assert_eq!(result.stripped, vec!["GET http://x"]);
    }

    #[test]
    fn extracts_single_line_inline_form() {
        let section = lines("GET http://x\n< {% client.log(1) %}");
        let result = extract(&section);
        assert_eq!(result.pre, vec![Script::Inline("client.log(1)".into())]);
    }

    #[test]
    fn extracts_response_handler_block() {
        let section = lines("GET http://x\n> {%\nclient.test();\n%}");
        let result = extract(&section);
        assert_eq!(result.post, vec![Script::Inline("client.test();".into())]);
    }

    #[test]
    fn extracts_file_references() {
        let section = lines("GET http://x\n< setup.js\n> verify.js");
        let result = extract(&section);
        assert_eq!(result.pre, vec![Script::File(PathBuf::from("setup.js"))]);
        assert_eq!(result.post, vec![Script::File(PathBuf::from("verify.js"))]);
        assert_eq!(result.stripped, vec!["GET http://x"]);
    }

    #[test]
    fn body_file_reference_survives_stripping() {
        let section = lines("POST http://x\n\n< ./payload.json");
        let result = extract(&section);
        assert!(result.pre.is_empty());
        assert_eq!(
            result.stripped,
            vec!["POST http://x", "", "< ./payload.json"]
        );
    }

    #[test]
    fn mixed_scripts_and_body() {
        let section = lines(
            "POST http://x\nContent-Type: application/json\n\n{\"a\": 1}\n> {%\ncheck();\n%}",
        );
        let result = extract(&section);
        assert_eq!(result.post, vec![Script::Inline("check();".into())]);
        assert_eq!(
            result.stripped,
            vec![
                "POST http://x",
                "Content-Type: application/json",
                "",
                "{\"a\": 1}"
            ]
        );
    }
}
