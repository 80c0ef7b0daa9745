use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use url::Url;

use crate::styles::cli_styles;

#[derive(Parser, Debug)]
#[command(name = "verdict")]
#[command(about = "Declarative UI verification against a live web app")]
#[command(version)]
#[command(styles = cli_styles())]
pub struct Cli {
    /// Increase verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run scenarios against the configured browser driver
    Run(RunArgs),

    /// Load and validate scenario files without touching a browser
    Validate {
        /// Scenario file or directory
        path: PathBuf,
    },
}

#[derive(Args, Debug)]
pub struct RunArgs {
    /// Scenario file or directory
    pub path: PathBuf,

    /// Joined with relative scenario urls; required when any url is relative
    #[arg(long, value_name = "URL")]
    pub base_url: Option<Url>,

    /// Run the browser without a visible window
    #[arg(
        long,
        value_name = "BOOL",
        default_value_t = true,
        action = clap::ArgAction::Set
    )]
    pub headless: bool,

    /// Default wait budget for steps and assertions, in milliseconds
    #[arg(long = "timeout-ms", value_name = "MS", default_value_t = 5000)]
    pub timeout_ms: u64,

    /// Default navigation deadline, in milliseconds
    #[arg(long = "nav-timeout-ms", value_name = "MS", default_value_t = 10_000)]
    pub nav_timeout_ms: u64,

    /// Directory for screenshots and failure captures
    #[arg(long, value_name = "DIR", default_value = "artifacts")]
    pub artifacts_dir: PathBuf,

    /// Driver command line (falls back to the VERDICT_DRIVER environment
    /// variable)
    #[arg(long = "driver-cmd", value_name = "CMD")]
    pub driver_cmd: Option<String>,

    /// Number of concurrent browser sessions
    #[arg(long, value_name = "N", default_value_t = 1)]
    pub workers: usize,

    /// Wall-clock bound for the whole run, in milliseconds
    #[arg(long = "deadline-ms", value_name = "MS")]
    pub deadline_ms: Option<u64>,

    /// Write the run report as JSON
    #[arg(long = "report-json", value_name = "PATH")]
    pub report_json: Option<PathBuf>,

    /// Write a JUnit XML report for CI ingestion
    #[arg(long, value_name = "PATH")]
    pub junit: Option<PathBuf>,
}
