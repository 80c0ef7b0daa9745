use std::path::Path;

use anyhow::{Result, bail};
use verdict::validate_path;

use crate::commands::EXIT_PASS;
use crate::output;

/// Load and validate every scenario under `path`, reporting all problems in
/// one pass rather than stopping at the first.
pub fn execute(path: &Path) -> Result<i32> {
    let (scenarios, errors) = validate_path(path);

    for scenario in &scenarios {
        output::print_valid(scenario);
    }
    for error in &errors {
        output::print_load_error(error);
    }

    if !errors.is_empty() {
        bail!("{} validation error(s) under {}", errors.len(), path.display());
    }

    output::print_validate_ok(scenarios.len());
    Ok(EXIT_PASS)
}
