//! Typed command set understood by the driver.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// A driver command with its arguments.
///
/// Serializes adjacently tagged so the wire form is
/// `{"command": "<name>", "args": {...}}`; unit commands omit `args`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(
    tag = "command",
    content = "args",
    rename_all = "snake_case",
    rename_all_fields = "camelCase"
)]
pub enum Command {
    /// Health check; first command after spawn.
    Ping,
    /// Start the browser context.
    Launch { headless: bool },
    Navigate {
        url: String,
        timeout_ms: u64,
    },
    Click {
        selector: String,
        force: bool,
    },
    Fill {
        selector: String,
        value: String,
    },
    Press {
        key: String,
    },
    Hover {
        selector: String,
        force: bool,
    },
    Focus {
        selector: String,
    },
    Select {
        selector: String,
        value: String,
    },
    /// Count elements matching a selector and report first-match visibility.
    Query {
        selector: String,
    },
    Attribute {
        selector: String,
        name: String,
    },
    /// Text content of the first match, or of the whole page body.
    Text {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        selector: Option<String>,
    },
    /// Computed style property of the first match.
    Style {
        selector: String,
        property: String,
    },
    /// Current input value of the first match.
    Value {
        selector: String,
    },
    /// localStorage entries applied before subsequent navigations.
    Storage {
        entries: BTreeMap<String, String>,
    },
    Viewport {
        width: u32,
        height: u32,
    },
    Screenshot {
        path: String,
        full_page: bool,
    },
    /// End the session; the driver exits after responding.
    Quit,
}

impl Command {
    /// Wire name of the command, used for correlation and logging.
    pub fn name(&self) -> &'static str {
        match self {
            Command::Ping => "ping",
            Command::Launch { .. } => "launch",
            Command::Navigate { .. } => "navigate",
            Command::Click { .. } => "click",
            Command::Fill { .. } => "fill",
            Command::Press { .. } => "press",
            Command::Hover { .. } => "hover",
            Command::Focus { .. } => "focus",
            Command::Select { .. } => "select",
            Command::Query { .. } => "query",
            Command::Attribute { .. } => "attribute",
            Command::Text { .. } => "text",
            Command::Style { .. } => "style",
            Command::Value { .. } => "value",
            Command::Storage { .. } => "storage",
            Command::Viewport { .. } => "viewport",
            Command::Screenshot { .. } => "screenshot",
            Command::Quit => "quit",
        }
    }
}
