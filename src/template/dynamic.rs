//! Generators for `{{$…}}` dynamic variables.
//!
//! The resolver replaces every recognized `{{$…}}` token with a freshly
//! generated value and leaves unrecognized tokens verbatim. Directive names
//! match case-sensitively; whitespace inside the braces is trimmed.

use crate::constants;
use chrono::{Duration as ChronoDuration, Local, SecondsFormat, Utc};
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use uuid::Uuid;

/// Resolver for `$`-prefixed template tokens.
#[derive(Debug, Clone)]
pub struct DynamicResolver {
    /// Directory searched for the `.env` file used by `$dotenv`.
    env_dir: PathBuf,
}

impl Default for DynamicResolver {
    fn default() -> Self {
        Self {
            env_dir: PathBuf::from("."),
        }
    }
}

impl DynamicResolver {
    #[must_use]
    pub fn new(env_dir: impl Into<PathBuf>) -> Self {
        Self {
            env_dir: env_dir.into(),
        }
    }

    /// Replaces every recognized `{{$…}}` token in `text`; unrecognized
    /// tokens are left verbatim.
    #[must_use]
    pub fn resolve_all(&self, text: &str) -> String {
        let mut result = String::with_capacity(text.len());
        let mut remaining = text;

        while let Some(start) = remaining.find(constants::TEMPLATE_OPEN) {
            result.push_str(&remaining[..start]);
            let after_open = &remaining[start + 2..];

            let Some(end) = after_open.find(constants::TEMPLATE_CLOSE) else {
                result.push_str(constants::TEMPLATE_OPEN);
                remaining = after_open;
                continue;
            };

            let raw = &after_open[..end];
            let name = raw.trim();
            match name.strip_prefix('$').and_then(|d| self.generate(d)) {
                Some(value) => result.push_str(&value),
                None => {
                    result.push_str(constants::TEMPLATE_OPEN);
                    result.push_str(raw);
                    result.push_str(constants::TEMPLATE_CLOSE);
                }
            }
            remaining = &after_open[end + 2..];
        }

        result.push_str(remaining);
        result
    }

    /// Generates a value for a single directive (the token text after `$`),
    /// or `None` when the directive is not recognized and the token should
    /// stay verbatim.
    #[must_use]
    pub fn generate(&self, directive: &str) -> Option<String> {
        let mut parts = directive.split_whitespace();
        let name = parts.next()?;
        let args: Vec<&str> = parts.collect();

        match name {
            "guid" | "uuid" => Some(Uuid::new_v4().to_string()),
            "timestamp" => Some(Utc::now().timestamp().to_string()),
            "randomInt" => random_int(&args),
            "datetime" => Some(format_datetime(&args, false)),
            "localDatetime" => Some(format_datetime(&args, true)),
            "dotenv" => args
                .first()
                .and_then(|key| read_dotenv(&self.env_dir, key)),
            "processEnv" => args.first().and_then(|key| std::env::var(key).ok()),
            _ => None,
        }
    }
}

/// `$randomInt [min] [max]` — uniform in `[min, max]`, defaults `0..1000`;
/// the one-argument form is `min` with the default max.
fn random_int(args: &[&str]) -> Option<String> {
    let min: i64 = args.first().map_or(Ok(0), |v| v.parse()).ok()?;
    let max: i64 = args
        .get(1)
        .map_or(Ok(constants::DEFAULT_RANDOM_INT_MAX), |v| v.parse())
        .ok()?;
    if min > max {
        return None;
    }
    Some(fastrand::i64(min..=max).to_string())
}

/// `$datetime [format] [offset unit]` / `$localDatetime [format]`.
///
/// Formats: `iso8601` (default), `rfc1123`, or a custom token string using
/// `YYYY`, `MM`, `DD`, `HH`, `mm`, `ss`. The optional offset is an integer
/// plus a unit in days/hours/minutes/seconds, added to now.
fn format_datetime(args: &[&str], local: bool) -> String {
    let format = args.first().copied().unwrap_or("iso8601");
    let offset = parse_offset(args.get(1).copied(), args.get(2).copied());

    let utc = Utc::now() + offset;
    match format {
        "iso8601" => {
            if local {
                (Local::now() + offset)
                    .format("%Y-%m-%dT%H:%M:%S%.3f")
                    .to_string()
            } else {
                utc.to_rfc3339_opts(SecondsFormat::Millis, true)
            }
        }
        "rfc1123" => {
            if local {
                (Local::now() + offset)
                    .format("%a, %d %b %Y %H:%M:%S")
                    .to_string()
            } else {
                let system: SystemTime = utc.into();
                httpdate::fmt_http_date(system)
            }
        }
        custom => {
            let strftime = custom_tokens_to_strftime(custom);
            if local {
                (Local::now() + offset).format(&strftime).to_string()
            } else {
                utc.format(&strftime).to_string()
            }
        }
    }
}

fn parse_offset(amount: Option<&str>, unit: Option<&str>) -> ChronoDuration {
    let Some(amount) = amount.and_then(|a| a.parse::<i64>().ok()) else {
        return ChronoDuration::zero();
    };
    match unit {
        Some("d" | "day" | "days") => ChronoDuration::days(amount),
        Some("h" | "hour" | "hours") => ChronoDuration::hours(amount),
        Some("m" | "minute" | "minutes") => ChronoDuration::minutes(amount),
        Some("s" | "second" | "seconds") => ChronoDuration::seconds(amount),
        _ => ChronoDuration::zero(),
    }
}

/// Maps the `YYYY MM DD HH mm ss` token set onto strftime specifiers. The
/// tokens are case-distinct, so sequential replacement is unambiguous.
fn custom_tokens_to_strftime(format: &str) -> String {
    format
        .replace("YYYY", "%Y")
        .replace("MM", "%m")
        .replace("DD", "%d")
        .replace("HH", "%H")
        .replace("mm", "%M")
        .replace("ss", "%S")
}

/// Reads `key` from the `.env` file in `dir`. Supports `KEY=value`,
/// `KEY="quoted"`, and `#` comment lines.
fn read_dotenv(dir: &Path, key: &str) -> Option<String> {
    let content = std::fs::read_to_string(dir.join(constants::DOTENV_FILENAME)).ok()?;
    for line in content.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let Some((name, value)) = line.split_once('=') else {
            continue;
        };
        if name.trim() != key {
            continue;
        }
        let value = value.trim();
        let unquoted = value
            .strip_prefix('"')
            .and_then(|v| v.strip_suffix('"'))
            .unwrap_or(value);
        return Some(unquoted.to_string());
    }
    None
}
