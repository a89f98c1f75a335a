//! Minimal JSONPath walker shared by the assertion engine, variable updates,
//! and response references.
//!
//! Supported forms: `$`, `$.field`, `$.parent.child`, `$.array[0]`,
//! `$.array[*]`, and the `length` pseudo-segment which yields the element
//! count of an array.

use crate::error::Error;
use serde_json::Value;

/// Evaluates a JSONPath expression against a JSON document.
///
/// # Errors
///
/// Returns a parser-kind error when the path is malformed, or an
/// assertion-kind error when a segment does not match the document shape.
pub fn select(document: &Value, path: &str) -> Result<Value, Error> {
    let clean = path.strip_prefix('$').unwrap_or(path);
    let clean = clean.strip_prefix('.').unwrap_or(clean);

    if clean.is_empty() {
        return Ok(document.clone());
    }

    let mut current = document.clone();
    for segment in split_segments(clean) {
        current = walk_segment(&current, &segment, path)?;
    }
    Ok(current)
}

/// Splits a dotted path into segments, keeping `[idx]` accessors separate.
///
/// `users[0].name` → `["users", "[0]", "name"]`
fn split_segments(path: &str) -> Vec<String> {
    let mut segments = Vec::new();
    let mut current = String::new();

    let mut chars = path.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '.' => {
                if !current.is_empty() {
                    segments.push(std::mem::take(&mut current));
                }
            }
            '[' => {
                if !current.is_empty() {
                    segments.push(std::mem::take(&mut current));
                }
                current.push('[');
                for inner in chars.by_ref() {
                    current.push(inner);
                    if inner == ']' {
                        break;
                    }
                }
                segments.push(std::mem::take(&mut current));
            }
            _ => current.push(c),
        }
    }

    if !current.is_empty() {
        segments.push(current);
    }
    segments
}

fn walk_segment(value: &Value, segment: &str, full_path: &str) -> Result<Value, Error> {
    if let Some(index_str) = segment
        .strip_prefix('[')
        .and_then(|s| s.strip_suffix(']'))
    {
        if index_str == "*" {
            return match value {
                Value::Array(arr) => Ok(Value::Array(arr.clone())),
                other => Err(path_mismatch(full_path, "array", other)),
            };
        }
        let index: usize = index_str
            .parse()
            .map_err(|_| Error::parse_error("<jsonpath>", 1, 1, format!("bad index '{index_str}' in '{full_path}'")))?;
        return match value {
            Value::Array(arr) => arr.get(index).cloned().ok_or_else(|| {
                Error::assertion_failed(
                    "Body",
                    format!("index {index} in '{full_path}'"),
                    format!("array of {} elements", arr.len()),
                )
            }),
            other => Err(path_mismatch(full_path, "array", other)),
        };
    }

    // `length` pseudo-segment on arrays returns the element count.
    if segment == "length" {
        if let Value::Array(arr) = value {
            return Ok(Value::from(arr.len()));
        }
    }

    match value {
        Value::Object(map) => map.get(segment).cloned().ok_or_else(|| {
            Error::assertion_failed(
                "Body",
                format!("field '{segment}' in '{full_path}'"),
                "missing".to_string(),
            )
        }),
        other => Err(path_mismatch(full_path, "object", other)),
    }
}

fn path_mismatch(path: &str, expected: &str, found: &Value) -> Error {
    Error::assertion_failed("Body", format!("{expected} at '{path}'"), type_name(found))
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn selects_nested_field() {
        let doc = json!({"data": {"token": "abc123"}});
        assert_eq!(select(&doc, "$.data.token").unwrap(), json!("abc123"));
    }

    #[test]
    fn selects_array_index() {
        let doc = json!({"users": [{"id": 1}, {"id": 2}]});
        assert_eq!(select(&doc, "$.users[1].id").unwrap(), json!(2));
    }

    #[test]
    fn wildcard_returns_all_elements() {
        let doc = json!({"items": [1, 2, 3]});
        assert_eq!(select(&doc, "$.items[*]").unwrap(), json!([1, 2, 3]));
    }

    #[test]
    fn bare_root_returns_document() {
        let doc = json!({"a": 1});
        assert_eq!(select(&doc, "$").unwrap(), doc);
    }

    #[test]
    fn length_counts_array_elements() {
        let doc = json!([10, 20, 30]);
        assert_eq!(select(&doc, "$.length").unwrap(), json!(3));
        let nested = json!({"items": [1, 2]});
        assert_eq!(select(&nested, "$.items.length").unwrap(), json!(2));
    }

    #[test]
    fn length_still_matches_object_field() {
        let doc = json!({"length": "forty"});
        assert_eq!(select(&doc, "$.length").unwrap(), json!("forty"));
    }

    #[test]
    fn missing_field_is_an_error() {
        let doc = json!({"a": 1});
        assert!(select(&doc, "$.missing").is_err());
    }

    #[test]
    fn index_out_of_bounds_is_an_error() {
        let doc = json!({"items": [1]});
        assert!(select(&doc, "$.items[5]").is_err());
    }

    #[test]
    fn indexing_a_non_array_is_an_error() {
        let doc = json!({"items": {"a": 1}});
        assert!(select(&doc, "$.items[0]").is_err());
    }
}
