//! Driver command resolution.
//!
//! The driver is an external executable speaking the NDJSON protocol on
//! stdio. Which executable to run comes from explicit configuration only;
//! there is deliberately no built-in default to probe for.

use std::path::PathBuf;

use crate::error::{Error, Result};

/// Environment variable consulted when no explicit command is given.
pub const DRIVER_ENV: &str = "VERDICT_DRIVER";

/// Configuration for spawning the driver subprocess.
#[derive(Debug, Clone)]
pub struct DriverConfig {
    /// Program followed by its arguments.
    pub command: Vec<String>,
}

impl DriverConfig {
    pub fn new(command: Vec<String>) -> Self {
        Self { command }
    }

    /// Resolve the driver command line.
    ///
    /// Order: the explicit value (e.g. `--driver-cmd`), then the
    /// `VERDICT_DRIVER` environment variable. The command string is
    /// whitespace-split into program + args; a bare program name is resolved
    /// on `PATH`, a path is checked for existence.
    pub fn resolve(explicit: Option<&str>) -> Result<Self> {
        let raw = match explicit {
            Some(value) => value.to_string(),
            None => std::env::var(DRIVER_ENV)
                .map_err(|_| Error::DriverNotFound("no driver command configured".into()))?,
        };

        let mut parts: Vec<String> = raw.split_whitespace().map(str::to_string).collect();
        if parts.is_empty() {
            return Err(Error::DriverNotFound("driver command is empty".into()));
        }

        parts[0] = resolve_program(&parts[0])?.display().to_string();
        Ok(Self { command: parts })
    }

    pub fn program(&self) -> &str {
        &self.command[0]
    }

    pub fn args(&self) -> &[String] {
        &self.command[1..]
    }
}

fn resolve_program(program: &str) -> Result<PathBuf> {
    let path = PathBuf::from(program);
    if path.components().count() > 1 {
        if path.exists() {
            return Ok(path);
        }
        return Err(Error::DriverNotFound(format!(
            "'{}' does not exist",
            path.display()
        )));
    }

    which::which(program)
        .map_err(|_| Error::DriverNotFound(format!("'{program}' is not on PATH")))
}
