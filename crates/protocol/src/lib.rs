//! Wire types for the browser driver protocol.
//!
//! The driver is an external subprocess speaking newline-delimited JSON over
//! stdio: one request per line, one response per line, strictly sequential.
//!
//! # Request Format
//!
//! | Field | Type | Description |
//! |-------|------|-------------|
//! | `id` | `string?` | Request identifier echoed in the response |
//! | `command` | `string` | Command name (e.g., `"navigate"`, `"click"`) |
//! | `args` | `object` | Command-specific arguments |
//!
//! ```json
//! {"id": "1", "command": "navigate", "args": {"url": "http://localhost:8080/", "timeoutMs": 10000}}
//! ```
//!
//! # Response Format
//!
//! ```json
//! {"schemaVersion": 1, "id": "1", "ok": true, "command": "navigate", "data": {"url": "..."}}
//! {"schemaVersion": 1, "id": "2", "ok": false, "command": "click", "error": {"code": "ELEMENT_OBSCURED", "message": "..."}}
//! ```
//!
//! # Commands
//!
//! | Command | Args | Data |
//! |---------|------|------|
//! | `ping` | - | `version` |
//! | `launch` | `headless` | - |
//! | `navigate` | `url`, `timeoutMs` | `url` |
//! | `click` | `selector`, `force` | - |
//! | `fill` | `selector`, `value` | - |
//! | `press` | `key` | - |
//! | `hover` | `selector`, `force` | - |
//! | `focus` | `selector` | - |
//! | `select` | `selector`, `value` | - |
//! | `query` | `selector` | `count`, `visible` |
//! | `attribute` | `selector`, `name` | `value` (null when absent) |
//! | `text` | `selector?` | `text` |
//! | `style` | `selector`, `property` | `value` |
//! | `value` | `selector` | `value` |
//! | `storage` | `entries` | - |
//! | `viewport` | `width`, `height` | - |
//! | `screenshot` | `path`, `fullPage` | `path` |
//! | `quit` | - | - |

mod command;
mod data;

pub use command::Command;
pub use data::{AttributeData, PingData, QueryData, ScreenshotData, StyleData, TextData, ValueData};

use serde::{Deserialize, Serialize};

/// Protocol schema version. Bumped on breaking wire changes.
pub const SCHEMA_VERSION: u32 = 1;

/// One request line sent to the driver.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DriverRequest {
    /// Request identifier echoed in the response for correlation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    #[serde(flatten)]
    pub command: Command,
}

impl DriverRequest {
    pub fn new(id: impl Into<String>, command: Command) -> Self {
        Self {
            id: Some(id.into()),
            command,
        }
    }
}

/// One response line read from the driver.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DriverResponse {
    /// Schema version of the response. Absent on pre-versioning drivers.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema_version: Option<u32>,

    /// Request id echoed from [`DriverRequest::id`].
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    /// `true` if the command succeeded, `false` on error.
    pub ok: bool,

    /// Command name echoed from the request.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,

    /// Command-specific result data (present only on success).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,

    /// Error details (present only on failure).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<DriverError>,
}

impl DriverResponse {
    pub fn success(id: Option<String>, command: &str, data: serde_json::Value) -> Self {
        Self {
            schema_version: Some(SCHEMA_VERSION),
            id,
            ok: true,
            command: Some(command.to_string()),
            data: Some(data),
            error: None,
        }
    }

    pub fn success_empty(id: Option<String>, command: &str) -> Self {
        Self {
            schema_version: Some(SCHEMA_VERSION),
            id,
            ok: true,
            command: Some(command.to_string()),
            data: None,
            error: None,
        }
    }

    pub fn failure(id: Option<String>, command: &str, code: ErrorCode, message: &str) -> Self {
        Self {
            schema_version: Some(SCHEMA_VERSION),
            id,
            ok: false,
            command: Some(command.to_string()),
            data: None,
            error: Some(DriverError {
                code,
                message: message.to_string(),
            }),
        }
    }
}

/// Structured error information in a [`DriverResponse`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DriverError {
    /// Machine-readable error code.
    pub code: ErrorCode,
    /// Human-readable error description.
    pub message: String,
}

/// Standardized driver error codes for programmatic handling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    /// Invalid JSON in the request line
    ParseError,
    /// Missing or invalid argument
    InvalidInput,
    /// Unrecognized command name
    UnknownCommand,
    /// Page navigation error
    NavigationFailed,
    /// Page did not reach a stable load state in time
    NavigationTimeout,
    /// Selector matched no elements
    ElementNotFound,
    /// Click target intercepted by another element
    ElementObscured,
    /// JavaScript evaluation failed
    EvalFailed,
    /// Screenshot capture failed
    ScreenshotFailed,
    /// Unknown/internal driver error
    InternalError,
    /// Code not known to this protocol version
    #[serde(other)]
    Unrecognized,
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrorCode::ParseError => write!(f, "PARSE_ERROR"),
            ErrorCode::InvalidInput => write!(f, "INVALID_INPUT"),
            ErrorCode::UnknownCommand => write!(f, "UNKNOWN_COMMAND"),
            ErrorCode::NavigationFailed => write!(f, "NAVIGATION_FAILED"),
            ErrorCode::NavigationTimeout => write!(f, "NAVIGATION_TIMEOUT"),
            ErrorCode::ElementNotFound => write!(f, "ELEMENT_NOT_FOUND"),
            ErrorCode::ElementObscured => write!(f, "ELEMENT_OBSCURED"),
            ErrorCode::EvalFailed => write!(f, "EVAL_FAILED"),
            ErrorCode::ScreenshotFailed => write!(f, "SCREENSHOT_FAILED"),
            ErrorCode::InternalError => write!(f, "INTERNAL_ERROR"),
            ErrorCode::Unrecognized => write!(f, "UNRECOGNIZED"),
        }
    }
}
