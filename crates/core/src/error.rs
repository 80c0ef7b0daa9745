//! Error taxonomy.
//!
//! Two tiers with different blast radii: a [`ScenarioFault`] fails the one
//! scenario it occurred in and is recorded on its result; a [`SessionError`]
//! means the driver process or its pipes can no longer be trusted and aborts
//! the whole run.

use thiserror::Error;
use verdict_protocol::ErrorCode;

/// Fatal to the whole run: the driver process or transport failed.
#[derive(Debug, Error)]
#[error(transparent)]
pub struct SessionError(#[from] pub verdict_runtime::Error);

/// Scenario-local faults. Recorded as a failed result, never aborting other
/// scenarios.
#[derive(Debug, Error)]
pub enum ScenarioFault {
    #[error("navigation to '{url}' timed out after {timeout_ms}ms")]
    NavigationTimeout { url: String, timeout_ms: u64 },

    #[error("navigation to '{url}' failed: {message}")]
    NavigationFailed { url: String, message: String },

    #[error("element '{selector}' not found after waiting {waited_ms}ms")]
    ElementNotFound { selector: String, waited_ms: u64 },

    #[error("element '{selector}' is obscured by another element")]
    ElementObscured { selector: String },

    #[error("dismissal did not hide '{selector}' within {waited_ms}ms")]
    DismissTimeout { selector: String, waited_ms: u64 },

    /// Any other driver-reported command failure.
    #[error("driver rejected {command} [{code}]: {message}")]
    Command {
        command: String,
        code: ErrorCode,
        message: String,
    },
}

/// Outcome of one driver call made on behalf of a scenario.
#[derive(Debug, Error)]
pub enum CallError {
    #[error(transparent)]
    Fault(#[from] ScenarioFault),

    #[error(transparent)]
    Session(#[from] SessionError),
}

impl CallError {
    /// Splits the error into its tiers for per-scenario handling.
    pub fn into_fault(self) -> Result<ScenarioFault, SessionError> {
        match self {
            CallError::Fault(fault) => Ok(fault),
            CallError::Session(e) => Err(e),
        }
    }
}

/// Scenario file could not be loaded or failed validation.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("{path}: {source}")]
    Yaml {
        path: String,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("{path}: {message}")]
    Invalid { path: String, message: String },

    #[error("failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("duplicate scenario name '{name}' in {path}")]
    DuplicateName { name: String, path: String },

    #[error("no scenario files found under {path}")]
    NoScenarios { path: String },
}

impl LoadError {
    /// Path of the offending file.
    pub fn path(&self) -> &str {
        match self {
            LoadError::Yaml { path, .. }
            | LoadError::Invalid { path, .. }
            | LoadError::Io { path, .. }
            | LoadError::DuplicateName { path, .. }
            | LoadError::NoScenarios { path } => path,
        }
    }
}
