//! Per-scenario records and the aggregated run report.

use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Instant;

use serde::Serialize;

/// Where in the scenario lifecycle a failure occurred.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailKind {
    Navigation,
    Dismissal,
    Interaction,
    Assertion,
    Artifact,
    /// Driver process or transport failure; aborts the run.
    Session,
    /// Run deadline expired before or during this scenario.
    Cancelled,
}

impl fmt::Display for FailKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            FailKind::Navigation => "navigation",
            FailKind::Dismissal => "dismissal",
            FailKind::Interaction => "interaction",
            FailKind::Assertion => "assertion",
            FailKind::Artifact => "artifact",
            FailKind::Session => "session",
            FailKind::Cancelled => "cancelled",
        };
        f.write_str(s)
    }
}

/// Why a scenario failed.
#[derive(Debug, Clone, Serialize)]
pub struct FailDetail {
    pub kind: FailKind,
    pub reason: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum Outcome {
    Pass,
    Fail {
        #[serde(flatten)]
        detail: FailDetail,
    },
}

impl Outcome {
    pub fn fail(kind: FailKind, reason: impl Into<String>) -> Self {
        Outcome::Fail {
            detail: FailDetail {
                kind,
                reason: reason.into(),
            },
        }
    }

    pub fn passed(&self) -> bool {
        matches!(self, Outcome::Pass)
    }

    pub fn detail(&self) -> Option<&FailDetail> {
        match self {
            Outcome::Pass => None,
            Outcome::Fail { detail } => Some(detail),
        }
    }
}

/// Result of one scenario execution. Immutable once created.
#[derive(Debug, Clone, Serialize)]
pub struct ScenarioRecord {
    pub name: String,
    #[serde(flatten)]
    pub outcome: Outcome,
    /// Artifact files written for this scenario, in capture order.
    pub artifacts: Vec<PathBuf>,
    pub timing_ms: u64,
}

/// Aggregated run summary, records in scenario load order.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub passed: usize,
    pub failed: usize,
    pub total_ms: u64,
    pub records: Vec<ScenarioRecord>,
}

impl RunReport {
    pub fn all_passed(&self) -> bool {
        self.failed == 0
    }

    pub fn write_json(&self, path: &Path) -> io::Result<()> {
        let json = serde_json::to_string_pretty(self).map_err(io::Error::other)?;
        std::fs::write(path, json)
    }

    pub fn write_junit(&self, path: &Path) -> io::Result<()> {
        std::fs::write(path, self.to_junit_xml())
    }

    /// Render as JUnit XML for CI ingestion (Jenkins, GitHub Actions).
    pub fn to_junit_xml(&self) -> String {
        let mut cases = String::new();
        for record in &self.records {
            let name = escape_xml(&record.name);
            let time = record.timing_ms as f64 / 1000.0;
            match record.outcome.detail() {
                None => {
                    cases.push_str(&format!(
                        "  <testcase name=\"{name}\" classname=\"verdict\" time=\"{time:.3}\" />\n"
                    ));
                }
                Some(detail) => {
                    cases.push_str(&format!(
                        "  <testcase name=\"{name}\" classname=\"verdict\" time=\"{time:.3}\">\n    <failure message=\"{message}\" type=\"{kind}\" />\n  </testcase>\n",
                        message = escape_xml(&detail.reason),
                        kind = detail.kind,
                    ));
                }
            }
        }
        format!(
            "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n<testsuite name=\"verdict\" tests=\"{tests}\" failures=\"{failures}\" time=\"{time:.3}\">\n{cases}</testsuite>\n",
            tests = self.records.len(),
            failures = self.failed,
            time = self.total_ms as f64 / 1000.0,
        )
    }
}

/// Accumulates scenario records. Purely additive, single-writer; ordering is
/// the caller's concern and is preserved as recorded.
#[derive(Debug)]
pub struct ReportSink {
    records: Vec<ScenarioRecord>,
    started: Instant,
}

impl ReportSink {
    pub fn new() -> Self {
        Self {
            records: Vec::new(),
            started: Instant::now(),
        }
    }

    pub fn record(&mut self, record: ScenarioRecord) {
        self.records.push(record);
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Compute counts and total wall time.
    pub fn finalize(self) -> RunReport {
        let passed = self.records.iter().filter(|r| r.outcome.passed()).count();
        let failed = self.records.len() - passed;
        RunReport {
            passed,
            failed,
            total_ms: self.started.elapsed().as_millis() as u64,
            records: self.records,
        }
    }
}

impl Default for ReportSink {
    fn default() -> Self {
        Self::new()
    }
}

fn escape_xml(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&apos;")
}
