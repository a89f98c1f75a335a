//! Centralized string constants for the http-test CLI
//!
//! This module contains commonly used string literals to:
//! - Reduce string duplication
//! - Improve maintainability
//! - Ensure consistency across the codebase

// HTTP Headers
pub const HEADER_CONTENT_TYPE: &str = "Content-Type";

// Content Types
pub const CONTENT_TYPE_FORM: &str = "application/x-www-form-urlencoded";
pub const CONTENT_TYPE_MULTIPART: &str = "multipart/form-data";

// Environment Variables
pub const ENV_TLS_REJECT_UNAUTHORIZED: &str = "NODE_TLS_REJECT_UNAUTHORIZED";

// `.http` dialect markers
pub const SECTION_SEPARATOR: &str = "###";
pub const DIRECTIVE_NAME: &str = "@name";
pub const DIRECTIVE_EXPECT_ERROR: &str = "@expectError";
pub const DIRECTIVE_TIMEOUT: &str = "@timeout";
pub const ASSERT_KEY_STATUS: &str = "Status";
pub const ASSERT_KEY_CUSTOM: &str = "_CustomAssert";
pub const ASSERT_KEY_JSON_SCHEMA: &str = "_JsonSchema";
pub const SCRIPT_OPEN_PRE: &str = "< {%";
pub const SCRIPT_OPEN_POST: &str = "> {%";
pub const SCRIPT_CLOSE: &str = "%}";
pub const SCRIPT_FILE_EXT: &str = ".js";

// Template markers
pub const TEMPLATE_OPEN: &str = "{{";
pub const TEMPLATE_CLOSE: &str = "}}";

/// Substitution passes before the template engine gives up and returns the
/// partially-expanded text.
pub const TEMPLATE_MAX_DEPTH: usize = 16;

// Configuration
pub const CONFIG_FILENAME: &str = "http-test.config.json";
pub const DOTENV_FILENAME: &str = ".env";

// Default Values
pub const DEFAULT_CACHE_TTL_SECS: u64 = 300;
pub const DEFAULT_CACHE_MAX_SIZE: usize = 1000;
pub const DEFAULT_MAX_CONCURRENCY: usize = 5;
pub const DEFAULT_RANDOM_INT_MAX: i64 = 1000;

// Exit codes
pub const EXIT_OK: i32 = 0;
pub const EXIT_ASSERT_FAILED: i32 = 1;
pub const EXIT_USAGE: i32 = 2;
pub const EXIT_IO: i32 = 3;

// HTTP Methods
pub const HTTP_METHOD_GET: &str = "GET";
pub const HTTP_METHOD_POST: &str = "POST";
pub const HTTP_METHOD_PUT: &str = "PUT";
pub const HTTP_METHOD_DELETE: &str = "DELETE";
pub const HTTP_METHOD_PATCH: &str = "PATCH";
pub const HTTP_METHOD_HEAD: &str = "HEAD";
pub const HTTP_METHOD_OPTIONS: &str = "OPTIONS";
pub const HTTP_METHOD_CONNECT: &str = "CONNECT";
pub const HTTP_METHOD_TRACE: &str = "TRACE";

/// All HTTP methods a request line may carry.
pub const HTTP_METHODS: [&str; 9] = [
    HTTP_METHOD_GET,
    HTTP_METHOD_POST,
    HTTP_METHOD_PUT,
    HTTP_METHOD_DELETE,
    HTTP_METHOD_PATCH,
    HTTP_METHOD_HEAD,
    HTTP_METHOD_OPTIONS,
    HTTP_METHOD_CONNECT,
    HTTP_METHOD_TRACE,
];

/// Check if a content type is JSON
#[must_use]
pub fn is_json_content_type(content_type: &str) -> bool {
    content_type.contains("json")
}

/// Check if a content type is XML
#[must_use]
pub fn is_xml_content_type(content_type: &str) -> bool {
    content_type.to_lowercase().contains("xml")
}
