//! verdict: declarative UI verification
//!
//! Scenarios are YAML data: where to navigate, which onboarding dialogs to
//! dismiss, which interactions to replay, what must hold afterwards, and
//! which screenshots to keep. The runner executes them against a browser
//! driver subprocess with uniform bounded-wait, cleanup and reporting
//! semantics, replacing fleets of ad hoc automation scripts.
//!
//! # Example
//!
//! ```ignore
//! use verdict::{runner, scenario, RunConfig};
//! use verdict_runtime::DriverConfig;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let scenarios = scenario::load_path("scenarios/".as_ref())?;
//!     let driver = DriverConfig::resolve(None)?;
//!     let config = RunConfig {
//!         base_url: Some("http://localhost:5173".parse()?),
//!         ..RunConfig::default()
//!     };
//!
//!     let report = runner::run(scenarios, &driver, &config).await?;
//!     for record in &report.records {
//!         println!("{}: {:?}", record.name, record.outcome);
//!     }
//!     Ok(())
//! }
//! ```
//!
//! Every scenario owns exactly one session (one driver subprocess) and the
//! session is closed on every exit path. Assertion mismatches are ordinary
//! failed records; only driver transport failures abort a run.

pub mod check;
pub mod error;
pub mod executor;
pub mod report;
pub mod runner;
pub mod scenario;
pub mod session;

#[cfg(test)]
pub(crate) mod testutil;

pub use check::{Verdict, check};
pub use error::{CallError, LoadError, ScenarioFault, SessionError};
pub use report::{FailDetail, FailKind, Outcome, ReportSink, RunReport, ScenarioRecord};
pub use runner::{RunConfig, RunnerError, run, run_with_connector};
pub use scenario::{
    ArtifactRequest, Assertion, DismissAction, Interaction, Scenario, Viewport, load_path,
    validate_path,
};
pub use session::{Session, SessionConfig};
