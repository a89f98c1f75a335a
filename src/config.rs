//! `http-test.config.json` loading.
//!
//! The file is a partial override of the fixed schema: every leaf is
//! optional, and absent or null leaves keep their defaults when the partial
//! document is merged over [`Config::default`].

use crate::error::Error;
use crate::model::Method;
use serde::Deserialize;
use std::path::Path;
use std::str::FromStr;

/// Fully-resolved runner configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub timeouts: Timeouts,
    pub security: Security,
    pub retries: Retries,
    pub logging: Logging,
    pub performance: Performance,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Timeouts {
    /// Per-request timeout in milliseconds.
    pub request_ms: u64,
    /// Response read timeout in milliseconds.
    pub response_ms: u64,
    /// Preflight reachability probe timeout in milliseconds.
    pub server_check_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Security {
    /// When false, TLS certificate verification is disabled.
    pub reject_unauthorized: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Retries {
    pub max_attempts: u32,
    pub initial_delay_ms: u64,
    pub backoff_multiplier: f64,
    pub max_delay_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Logging {
    pub level: String,
    /// FIFO cap on the diagnostic log; `None` keeps everything.
    pub max_diagnostics: Option<usize>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Performance {
    pub parallel: bool,
    pub max_concurrency: usize,
    pub cache_ttl_secs: u64,
    pub cache_max_size: usize,
    pub cacheable_methods: Vec<Method>,
    pub significant_headers: Vec<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            timeouts: Timeouts {
                request_ms: 30_000,
                response_ms: 30_000,
                server_check_ms: 2_000,
            },
            security: Security {
                reject_unauthorized: true,
            },
            retries: Retries {
                max_attempts: 3,
                initial_delay_ms: 100,
                backoff_multiplier: 2.0,
                max_delay_ms: 5_000,
            },
            logging: Logging {
                level: "warn".to_string(),
                max_diagnostics: Some(10_000),
            },
            performance: Performance {
                parallel: false,
                max_concurrency: crate::constants::DEFAULT_MAX_CONCURRENCY,
                cache_ttl_secs: crate::constants::DEFAULT_CACHE_TTL_SECS,
                cache_max_size: crate::constants::DEFAULT_CACHE_MAX_SIZE,
                cacheable_methods: vec![Method::Get],
                significant_headers: Vec::new(),
            },
        }
    }
}

// ---- Partial schema -------------------------------------------------------

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct PartialConfig {
    #[serde(default)]
    timeouts: Option<PartialTimeouts>,
    #[serde(default)]
    security: Option<PartialSecurity>,
    #[serde(default)]
    retries: Option<PartialRetries>,
    #[serde(default)]
    logging: Option<PartialLogging>,
    #[serde(default)]
    performance: Option<PartialPerformance>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct PartialTimeouts {
    request: Option<u64>,
    response: Option<u64>,
    server_check: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct PartialSecurity {
    reject_unauthorized: Option<bool>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct PartialRetries {
    max_attempts: Option<u32>,
    initial_delay_ms: Option<u64>,
    backoff_multiplier: Option<f64>,
    max_delay_ms: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct PartialLogging {
    level: Option<String>,
    max_diagnostics: Option<usize>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct PartialPerformance {
    parallel: Option<bool>,
    max_concurrency: Option<usize>,
    cache_ttl_secs: Option<u64>,
    cache_max_size: Option<usize>,
    cacheable_methods: Option<Vec<String>>,
    significant_headers: Option<Vec<String>>,
}

fn merge_field<T>(target: &mut T, source: Option<T>) {
    if let Some(value) = source {
        *target = value;
    }
}

impl Config {
    /// Loads the config file at `path` and merges it over the defaults.
    ///
    /// # Errors
    ///
    /// Returns a config-kind error (exit code 2) when the file exists but
    /// is not valid JSON or does not match the schema.
    pub fn load(path: &Path) -> Result<Self, Error> {
        let content = std::fs::read_to_string(path)?;
        let partial: PartialConfig = serde_json::from_str(&content)
            .map_err(|e| Error::invalid_config(format!("{}: {e}", path.display())))?;
        let mut config = Self::default();
        config.apply(partial)?;
        Ok(config)
    }

    /// Loads `http-test.config.json` from `dir` when present, defaults
    /// otherwise.
    ///
    /// # Errors
    ///
    /// Same as [`Config::load`]; a missing file is not an error.
    pub fn load_from_dir(dir: &Path) -> Result<Self, Error> {
        let path = dir.join(crate::constants::CONFIG_FILENAME);
        if path.exists() {
            Self::load(&path)
        } else {
            Ok(Self::default())
        }
    }

    fn apply(&mut self, partial: PartialConfig) -> Result<(), Error> {
        if let Some(timeouts) = partial.timeouts {
            merge_field(&mut self.timeouts.request_ms, timeouts.request);
            merge_field(&mut self.timeouts.response_ms, timeouts.response);
            merge_field(&mut self.timeouts.server_check_ms, timeouts.server_check);
        }
        if let Some(security) = partial.security {
            merge_field(
                &mut self.security.reject_unauthorized,
                security.reject_unauthorized,
            );
        }
        if let Some(retries) = partial.retries {
            merge_field(&mut self.retries.max_attempts, retries.max_attempts);
            merge_field(&mut self.retries.initial_delay_ms, retries.initial_delay_ms);
            merge_field(
                &mut self.retries.backoff_multiplier,
                retries.backoff_multiplier,
            );
            merge_field(&mut self.retries.max_delay_ms, retries.max_delay_ms);
        }
        if let Some(logging) = partial.logging {
            merge_field(&mut self.logging.level, logging.level);
            if let Some(max) = logging.max_diagnostics {
                self.logging.max_diagnostics = Some(max);
            }
        }
        if let Some(performance) = partial.performance {
            merge_field(&mut self.performance.parallel, performance.parallel);
            merge_field(
                &mut self.performance.max_concurrency,
                performance.max_concurrency,
            );
            merge_field(
                &mut self.performance.cache_ttl_secs,
                performance.cache_ttl_secs,
            );
            merge_field(
                &mut self.performance.cache_max_size,
                performance.cache_max_size,
            );
            if let Some(methods) = performance.cacheable_methods {
                self.performance.cacheable_methods = methods
                    .iter()
                    .map(|m| {
                        Method::from_str(m).map_err(|_| {
                            Error::invalid_config(format!("unknown cacheable method '{m}'"))
                        })
                    })
                    .collect::<Result<_, _>>()?;
            }
            merge_field(
                &mut self.performance.significant_headers,
                performance.significant_headers,
            );
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_config(content: &str) -> (tempfile::TempDir, std::path::PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(crate::constants::CONFIG_FILENAME);
        let mut file = std::fs::File::create(&path).unwrap();
        file.write_all(content.as_bytes()).unwrap();
        (dir, path)
    }

    #[test]
    fn empty_document_keeps_all_defaults() {
        let (_dir, path) = write_config("{}");
        let config = Config::load(&path).unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn partial_override_keeps_sibling_defaults() {
        let (_dir, path) = write_config(r#"{"retries": {"maxAttempts": 7}}"#);
        let config = Config::load(&path).unwrap();
        assert_eq!(config.retries.max_attempts, 7);
        assert_eq!(config.retries.initial_delay_ms, 100);
        assert_eq!(config.timeouts.request_ms, 30_000);
    }

    #[test]
    fn null_leaves_keep_defaults() {
        let (_dir, path) =
            write_config(r#"{"timeouts": {"request": null, "serverCheck": 500}}"#);
        let config = Config::load(&path).unwrap();
        assert_eq!(config.timeouts.request_ms, 30_000);
        assert_eq!(config.timeouts.server_check_ms, 500);
    }

    #[test]
    fn performance_section_parses_methods() {
        let (_dir, path) = write_config(
            r#"{"performance": {"parallel": true, "cacheableMethods": ["GET", "HEAD"], "significantHeaders": ["Accept"]}}"#,
        );
        let config = Config::load(&path).unwrap();
        assert!(config.performance.parallel);
        assert_eq!(
            config.performance.cacheable_methods,
            vec![Method::Get, Method::Head]
        );
        assert_eq!(config.performance.significant_headers, vec!["Accept"]);
    }

    #[test]
    fn unknown_cacheable_method_is_a_config_error() {
        let (_dir, path) = write_config(r#"{"performance": {"cacheableMethods": ["FETCH"]}}"#);
        let err = Config::load(&path).unwrap_err();
        assert_eq!(err.exit_code(), crate::constants::EXIT_USAGE);
    }

    #[test]
    fn malformed_json_is_a_config_error() {
        let (_dir, path) = write_config("{nope");
        let err = Config::load(&path).unwrap_err();
        assert_eq!(err.exit_code(), crate::constants::EXIT_USAGE);
    }

    #[test]
    fn unknown_section_field_is_rejected() {
        let (_dir, path) = write_config(r#"{"retries": {"maxRetries": 2}}"#);
        assert!(Config::load(&path).is_err());
    }

    #[test]
    fn missing_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load_from_dir(dir.path()).unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn security_toggle() {
        let (_dir, path) = write_config(r#"{"security": {"rejectUnauthorized": false}}"#);
        let config = Config::load(&path).unwrap();
        assert!(!config.security.reject_unauthorized);
    }
}
