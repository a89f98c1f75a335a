//! Body parser family.
//!
//! One [`BodyKind`] per supported content type behind a single shape
//! contract: `is_body_start`, `is_body_end`, and `parse_body` with a uniform
//! return — a string payload for JSON/XML/URL-encoded/plain text, a field
//! list for multipart/form-data. A factory picks the kind from the
//! `Content-Type` header (parameters stripped); unknown types fall through
//! to plain text.

use crate::constants;
use crate::error::Error;
use crate::model::MultipartField;
use indexmap::IndexMap;

/// Supported body variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BodyKind {
    Json,
    Xml,
    UrlEncoded,
    Multipart,
    Text,
}

/// Uniform `parse_body` result.
#[derive(Debug, Clone, PartialEq)]
pub enum ParsedBody {
    /// Payload passed to the HTTP client as-is.
    Text(String),
    /// Multipart fields passed to the client's multipart builder.
    Multipart(Vec<MultipartField>),
}

impl BodyKind {
    /// Chooses a parser from the `Content-Type` header, stripping parameters
    /// such as `; charset=utf-8`. Unknown types fall through to plain text.
    #[must_use]
    pub fn from_content_type(content_type: Option<&str>) -> Self {
        let Some(content_type) = content_type else {
            return Self::Text;
        };
        let essence = content_type
            .split(';')
            .next()
            .unwrap_or(content_type)
            .trim()
            .to_lowercase();

        if constants::is_json_content_type(&essence) {
            Self::Json
        } else if constants::is_xml_content_type(&essence) {
            Self::Xml
        } else if essence == constants::CONTENT_TYPE_FORM {
            Self::UrlEncoded
        } else if essence == constants::CONTENT_TYPE_MULTIPART {
            Self::Multipart
        } else {
            Self::Text
        }
    }

    /// Whether `line` can open a body of this kind.
    #[must_use]
    pub fn is_body_start(self, line: &str) -> bool {
        let trimmed = line.trim_start();
        match self {
            Self::Json => trimmed.starts_with('{') || trimmed.starts_with('['),
            Self::Xml => trimmed.starts_with('<'),
            Self::UrlEncoded => trimmed.contains('='),
            Self::Multipart => trimmed.starts_with("--"),
            Self::Text => !trimmed.is_empty(),
        }
    }

    /// Whether `line` terminates a body. `None` (end of input) always does.
    #[must_use]
    pub fn is_body_end(self, line: Option<&str>) -> bool {
        let Some(line) = line else {
            return true;
        };
        let trimmed = line.trim_start();
        trimmed.starts_with(constants::SECTION_SEPARATOR)
    }

    /// Parses accumulated body text into the client-facing representation.
    ///
    /// URL-encoded bodies are decoded and re-emitted as a JSON object with
    /// string values. Multipart bodies need the boundary from the
    /// `Content-Type` parameter list.
    ///
    /// # Errors
    ///
    /// Returns a parser-kind error for undecodable URL-encoded pairs or a
    /// multipart body without a usable boundary.
    pub fn parse_body(self, text: &str, boundary: Option<&str>) -> Result<ParsedBody, Error> {
        match self {
            Self::Json | Self::Xml | Self::Text => Ok(ParsedBody::Text(text.to_string())),
            Self::UrlEncoded => {
                let map = parse_urlencoded(text)?;
                let object: serde_json::Map<String, serde_json::Value> = map
                    .into_iter()
                    .map(|(k, v)| (k, serde_json::Value::String(v)))
                    .collect();
                Ok(ParsedBody::Text(
                    serde_json::Value::Object(object).to_string(),
                ))
            }
            Self::Multipart => {
                let boundary = boundary.ok_or_else(|| {
                    Error::parse_error("<body>", 1, 1, "multipart body without boundary")
                })?;
                Ok(ParsedBody::Multipart(parse_multipart(text, boundary)))
            }
        }
    }
}

/// Extracts the `boundary` parameter from a `Content-Type` header value.
#[must_use]
pub fn multipart_boundary(content_type: &str) -> Option<String> {
    content_type.split(';').skip(1).find_map(|param| {
        let (name, value) = param.trim().split_once('=')?;
        if name.trim().eq_ignore_ascii_case("boundary") {
            Some(value.trim().trim_matches('"').to_string())
        } else {
            None
        }
    })
}

/// Decodes `a=1&b=x%20y` into an ordered string map.
///
/// # Errors
///
/// Returns a parser-kind error when a key or value is not valid
/// percent-encoding.
pub fn parse_urlencoded(text: &str) -> Result<IndexMap<String, String>, Error> {
    let mut map = IndexMap::new();
    for pair in text.trim().split('&').filter(|p| !p.is_empty()) {
        let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
        let decode = |part: &str| {
            urlencoding::decode(&part.replace('+', " "))
                .map(|c| c.into_owned())
                .map_err(|e| Error::parse_error("<body>", 1, 1, format!("bad escape: {e}")))
        };
        map.insert(decode(key)?, decode(value)?);
    }
    Ok(map)
}

/// Encodes a string map as `application/x-www-form-urlencoded`.
#[must_use]
pub fn encode_urlencoded(map: &IndexMap<String, String>) -> String {
    map.iter()
        .map(|(k, v)| format!("{}={}", urlencoding::encode(k), urlencoding::encode(v)))
        .collect::<Vec<_>>()
        .join("&")
}

/// Splits a multipart payload on its boundary and extracts each part's
/// `Content-Disposition` name/filename and the body that follows.
fn parse_multipart(text: &str, boundary: &str) -> Vec<MultipartField> {
    let delimiter = format!("--{boundary}");
    let mut fields = Vec::new();

    for chunk in text.split(&delimiter) {
        let chunk = chunk.trim_start_matches(['\r', '\n']);
        if chunk.is_empty() || chunk.starts_with("--") {
            continue;
        }
        if let Some(field) = parse_part(chunk) {
            fields.push(field);
        }
    }
    fields
}

fn parse_part(chunk: &str) -> Option<MultipartField> {
    let (headers, body) = chunk
        .split_once("\r\n\r\n")
        .or_else(|| chunk.split_once("\n\n"))?;

    let mut name = None;
    let mut filename = None;
    let mut content_type = None;

    for header in headers.lines() {
        let (header_name, value) = header.split_once(':')?;
        let value = value.trim();
        if header_name.eq_ignore_ascii_case("content-disposition") {
            name = disposition_param(value, "name");
            filename = disposition_param(value, "filename");
        } else if header_name.eq_ignore_ascii_case(constants::HEADER_CONTENT_TYPE) {
            content_type = Some(value.to_string());
        }
    }

    Some(MultipartField {
        name: name?,
        filename,
        content_type,
        data: body.trim_end_matches(['\r', '\n']).to_string(),
    })
}

fn disposition_param(value: &str, param: &str) -> Option<String> {
    value.split(';').skip(1).find_map(|part| {
        let (key, val) = part.trim().split_once('=')?;
        if key.trim() == param {
            Some(val.trim().trim_matches('"').to_string())
        } else {
            None
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn factory_strips_parameters() {
        assert_eq!(
            BodyKind::from_content_type(Some("application/json; charset=utf-8")),
            BodyKind::Json
        );
        assert_eq!(
            BodyKind::from_content_type(Some("text/xml")),
            BodyKind::Xml
        );
        assert_eq!(
            BodyKind::from_content_type(Some("application/x-www-form-urlencoded")),
            BodyKind::UrlEncoded
        );
        assert_eq!(
            BodyKind::from_content_type(Some("multipart/form-data; boundary=xyz")),
            BodyKind::Multipart
        );
    }

    #[test]
    fn unknown_types_fall_through_to_text() {
        assert_eq!(
            BodyKind::from_content_type(Some("application/pdf")),
            BodyKind::Text
        );
        assert_eq!(BodyKind::from_content_type(None), BodyKind::Text);
    }

    #[test]
    fn body_start_per_kind() {
        assert!(BodyKind::Json.is_body_start("{\"a\": 1}"));
        assert!(BodyKind::Json.is_body_start("[1, 2]"));
        assert!(!BodyKind::Json.is_body_start("plain"));
        assert!(BodyKind::Xml.is_body_start("<root/>"));
        assert!(BodyKind::UrlEncoded.is_body_start("a=1"));
        assert!(BodyKind::Multipart.is_body_start("--boundary"));
        assert!(BodyKind::Text.is_body_start("anything"));
        assert!(!BodyKind::Text.is_body_start("   "));
    }

    #[test]
    fn body_end_on_eof_and_separator() {
        assert!(BodyKind::Json.is_body_end(None));
        assert!(BodyKind::Json.is_body_end(Some("### next")));
        assert!(!BodyKind::Json.is_body_end(Some("{\"a\": 1}")));
    }

    #[test]
    fn urlencoded_round_trip() {
        let mut map = IndexMap::new();
        map.insert("name".to_string(), "John Doe".to_string());
        map.insert("q".to_string(), "a=b&c".to_string());
        map.insert("empty".to_string(), String::new());

        let encoded = encode_urlencoded(&map);
        let decoded = parse_urlencoded(&encoded).unwrap();
        assert_eq!(decoded, map);
    }

    #[test]
    fn urlencoded_reemitted_as_json_object() {
        let parsed = BodyKind::UrlEncoded
            .parse_body("a=1&b=x%20y", None)
            .unwrap();
        let ParsedBody::Text(text) = parsed else {
            panic!("expected text payload");
        };
        let value: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(value["a"], "1");
        assert_eq!(value["b"], "x y");
    }

    #[test]
    fn plus_decodes_to_space() {
        let map = parse_urlencoded("q=hello+world").unwrap();
        assert_eq!(map["q"], "hello world");
    }

    #[test]
    fn multipart_boundary_extraction() {
        assert_eq!(
            multipart_boundary("multipart/form-data; boundary=----abc123"),
            Some("----abc123".to_string())
        );
        assert_eq!(
            multipart_boundary("multipart/form-data; boundary=\"quoted\""),
            Some("quoted".to_string())
        );
        assert_eq!(multipart_boundary("application/json"), None);
    }

    #[test]
    fn multipart_parsing_extracts_fields() {
        let body = "--XX\r\nContent-Disposition: form-data; name=\"field1\"\r\n\r\nvalue1\r\n--XX\r\nContent-Disposition: form-data; name=\"file\"; filename=\"a.txt\"\r\nContent-Type: text/plain\r\n\r\nfile body\r\n--XX--\r\n";
        let parsed = BodyKind::Multipart.parse_body(body, Some("XX")).unwrap();
        let ParsedBody::Multipart(fields) = parsed else {
            panic!("expected multipart fields");
        };
        assert_eq!(fields.len(), 2);
        assert_eq!(fields[0].name, "field1");
        assert_eq!(fields[0].data, "value1");
        assert_eq!(fields[1].name, "file");
        assert_eq!(fields[1].filename.as_deref(), Some("a.txt"));
        assert_eq!(fields[1].content_type.as_deref(), Some("text/plain"));
        assert_eq!(fields[1].data, "file body");
    }

    #[test]
    fn multipart_without_boundary_is_an_error() {
        assert!(BodyKind::Multipart.parse_body("--x\r\n", None).is_err());
    }
}
