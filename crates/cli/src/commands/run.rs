use std::time::Duration;

use anyhow::{Context, Result};
use tracing::info;
use verdict::runner::{RunConfig, RunnerError};
use verdict::{RunReport, load_path};
use verdict_runtime::DriverConfig;

use crate::cli::RunArgs;
use crate::commands::{EXIT_FAIL, EXIT_PASS};
use crate::output;

pub async fn execute(args: RunArgs) -> Result<i32> {
    let scenarios = load_path(&args.path)?;
    info!(scenarios = scenarios.len(), path = %args.path.display(), "loaded");

    let driver = DriverConfig::resolve(args.driver_cmd.as_deref())?;
    let config = RunConfig {
        base_url: args.base_url.clone(),
        headless: args.headless,
        step_timeout: Duration::from_millis(args.timeout_ms),
        nav_timeout: Duration::from_millis(args.nav_timeout_ms),
        artifacts_dir: args.artifacts_dir.clone(),
        workers: args.workers,
        deadline: args.deadline_ms.map(Duration::from_millis),
    };

    match verdict::run(scenarios, &driver, &config).await {
        Ok(report) => {
            output::print_summary(&report);
            write_reports(&report, &args)?;
            Ok(if report.all_passed() { EXIT_PASS } else { EXIT_FAIL })
        }
        Err(RunnerError::Aborted { error, report }) => {
            // The partial summary still prints; the abort maps to exit 2.
            output::print_summary(&report);
            write_reports(&report, &args)?;
            Err(anyhow::Error::new(error).context("run aborted"))
        }
        Err(err) => Err(err.into()),
    }
}

fn write_reports(report: &RunReport, args: &RunArgs) -> Result<()> {
    if let Some(path) = &args.report_json {
        report
            .write_json(path)
            .with_context(|| format!("writing JSON report to {}", path.display()))?;
        info!(path = %path.display(), "wrote JSON report");
    }
    if let Some(path) = &args.junit {
        report
            .write_junit(path)
            .with_context(|| format!("writing JUnit report to {}", path.display()))?;
        info!(path = %path.display(), "wrote JUnit report");
    }
    Ok(())
}
