//! Console rendering of run results.
//!
//! Everything here prints to stdout (stderr for load errors); logging is
//! separate and goes to stderr via `tracing`.

use colored::Colorize;
use verdict::{LoadError, RunReport, Scenario, ScenarioRecord};

/// Per-scenario lines followed by the pass/fail totals.
pub fn print_summary(report: &RunReport) {
    println!();
    for record in &report.records {
        print_record(record);
    }
    println!();

    let totals = format!(
        "{} passed, {} failed in {}",
        report.passed,
        report.failed,
        format_duration(report.total_ms)
    );
    if report.all_passed() {
        println!("{}", totals.green().bold());
    } else {
        println!("{}", totals.red().bold());
    }
}

fn print_record(record: &ScenarioRecord) {
    let timing = format!("({})", format_duration(record.timing_ms));
    match record.outcome.detail() {
        None => {
            println!("  {}  {} {}", "PASS".green().bold(), record.name, timing.dimmed());
        }
        Some(detail) => {
            println!("  {}  {} {}", "FAIL".red().bold(), record.name, timing.dimmed());
            println!("        {}: {}", detail.kind, detail.reason);
            for artifact in &record.artifacts {
                println!("        {} {}", "capture:".dimmed(), artifact.display());
            }
        }
    }
}

pub fn print_valid(scenario: &Scenario) {
    println!(
        "  {}   {} ({} steps, {} assertions)",
        "ok".green().bold(),
        scenario.name,
        scenario.steps.len(),
        scenario.assertions.len()
    );
}

pub fn print_load_error(error: &LoadError) {
    eprintln!("  {}  {error}", "err".red().bold());
}

pub fn print_validate_ok(count: usize) {
    println!();
    println!("{}", format!("{count} scenario(s) valid").green().bold());
}

fn format_duration(ms: u64) -> String {
    if ms < 1000 {
        format!("{ms}ms")
    } else {
        format!("{:.1}s", ms as f64 / 1000.0)
    }
}
