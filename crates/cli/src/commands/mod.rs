mod run;
mod validate;

use anyhow::Result;

use crate::cli::{Cli, Commands};

/// Exit code: every scenario passed.
pub const EXIT_PASS: i32 = 0;
/// Exit code: at least one scenario failed.
pub const EXIT_FAIL: i32 = 1;

/// Dispatch the parsed command line. `Err` means a load or configuration
/// problem and maps to exit code 2 in `main`.
pub async fn dispatch(cli: Cli) -> Result<i32> {
    match cli.command {
        Commands::Run(args) => run::execute(args).await,
        Commands::Validate { path } => validate::execute(&path),
    }
}
