//! Scenario orchestration.
//!
//! One scenario runs as `open session → navigate → dismiss → steps →
//! assertions → artifacts → close`, with close guaranteed on every path,
//! including assertion failures, driver faults and run-deadline
//! cancellation. Scenario-local faults become failed records; a
//! [`SessionError`] aborts the run with a partial report.

use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use thiserror::Error;
use tokio::sync::mpsc;
use tokio::time::{Instant, sleep_until};
use tracing::{debug, info, warn};
use url::Url;
use verdict_runtime::{DriverConfig, DriverConnection};

use crate::check::{self, Verdict};
use crate::error::{CallError, SessionError};
use crate::executor;
use crate::report::{FailKind, Outcome, ReportSink, RunReport, ScenarioRecord};
use crate::scenario::{Scenario, slugify};
use crate::session::{Session, SessionConfig};

/// Run-level policy shared by every scenario.
#[derive(Debug, Clone)]
pub struct RunConfig {
    /// Joined with relative scenario urls. There is no default; a relative
    /// url without a base is a configuration error.
    pub base_url: Option<Url>,
    pub headless: bool,
    /// Default wait budget for element and assertion polls.
    pub step_timeout: Duration,
    /// Default navigation deadline; scenarios may override.
    pub nav_timeout: Duration,
    pub artifacts_dir: PathBuf,
    pub workers: usize,
    /// Wall-clock bound for the whole run.
    pub deadline: Option<Duration>,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            headless: true,
            step_timeout: Duration::from_secs(5),
            nav_timeout: Duration::from_secs(10),
            artifacts_dir: PathBuf::from("artifacts"),
            workers: 1,
            deadline: None,
        }
    }
}

#[derive(Debug, Error)]
pub enum RunnerError {
    #[error("scenario '{scenario}' has relative url '{url}' and no base URL was configured")]
    BaseUrlRequired { scenario: String, url: String },

    #[error("scenario '{scenario}' has invalid url '{url}': {message}")]
    InvalidUrl {
        scenario: String,
        url: String,
        message: String,
    },

    /// The driver failed mid-run. The report covers every scenario that
    /// produced a record before the abort.
    #[error("run aborted: {error}")]
    Aborted {
        error: SessionError,
        report: RunReport,
    },
}

/// Run scenarios against the configured driver subprocess.
pub async fn run(
    scenarios: Vec<Scenario>,
    driver: &DriverConfig,
    config: &RunConfig,
) -> Result<RunReport, RunnerError> {
    let driver = driver.clone();
    run_with_connector(scenarios, config, move || {
        let driver = driver.clone();
        async move { DriverConnection::connect(&driver).await }
    })
    .await
}

/// Run scenarios obtaining each session's connection from `connect`.
///
/// Tests pass connectors that attach in-memory drivers; [`run`] passes one
/// that spawns the driver subprocess.
pub async fn run_with_connector<C, Fut>(
    scenarios: Vec<Scenario>,
    config: &RunConfig,
    connect: C,
) -> Result<RunReport, RunnerError>
where
    C: Fn() -> Fut + Clone + Send + Sync + 'static,
    Fut: Future<Output = verdict_runtime::Result<DriverConnection>> + Send + 'static,
{
    // Resolve every url up front; a bad url is a configuration error, not a
    // scenario failure.
    let mut urls = Vec::with_capacity(scenarios.len());
    for scenario in &scenarios {
        urls.push(resolve_url(scenario, config.base_url.as_ref())?);
    }

    let deadline = config.deadline.map(|d| Instant::now() + d);

    if config.workers <= 1 {
        run_sequential(scenarios, urls, config, connect, deadline).await
    } else {
        run_parallel(scenarios, urls, config, connect, deadline).await
    }
}

async fn run_sequential<C, Fut>(
    scenarios: Vec<Scenario>,
    urls: Vec<Url>,
    config: &RunConfig,
    connect: C,
    deadline: Option<Instant>,
) -> Result<RunReport, RunnerError>
where
    C: Fn() -> Fut,
    Fut: Future<Output = verdict_runtime::Result<DriverConnection>>,
{
    let mut sink = ReportSink::new();
    for (scenario, url) in scenarios.iter().zip(&urls) {
        if deadline_passed(deadline) {
            sink.record(cancelled_record(scenario, "run deadline exceeded before start"));
            continue;
        }
        let (record, abort) = run_scenario(scenario, url, config, &connect, deadline).await;
        log_record(&record);
        sink.record(record);
        if let Some(error) = abort {
            return Err(RunnerError::Aborted {
                error,
                report: sink.finalize(),
            });
        }
    }
    Ok(sink.finalize())
}

/// Parallel mode: `workers` tasks pull scenarios from a shared cursor, each
/// owning a disjoint session. Records are reassembled into load order.
async fn run_parallel<C, Fut>(
    scenarios: Vec<Scenario>,
    urls: Vec<Url>,
    config: &RunConfig,
    connect: C,
    deadline: Option<Instant>,
) -> Result<RunReport, RunnerError>
where
    C: Fn() -> Fut + Clone + Send + Sync + 'static,
    Fut: Future<Output = verdict_runtime::Result<DriverConnection>> + Send + 'static,
{
    let sink = ReportSink::new();
    let total = scenarios.len();
    let work: Arc<Vec<(Scenario, Url)>> = Arc::new(scenarios.into_iter().zip(urls).collect());
    let cursor = Arc::new(AtomicUsize::new(0));
    let aborted = Arc::new(AtomicBool::new(false));
    let (tx, mut rx) = mpsc::unbounded_channel();

    let worker_count = config.workers.min(total).max(1);
    info!(workers = worker_count, scenarios = total, "starting workers");

    let mut handles = Vec::with_capacity(worker_count);
    for worker_id in 0..worker_count {
        let work = work.clone();
        let cursor = cursor.clone();
        let aborted = aborted.clone();
        let tx = tx.clone();
        let connect = connect.clone();
        let config = config.clone();
        handles.push(tokio::spawn(async move {
            loop {
                if aborted.load(Ordering::SeqCst) {
                    break;
                }
                let index = cursor.fetch_add(1, Ordering::SeqCst);
                let Some((scenario, url)) = work.get(index) else {
                    break;
                };
                if deadline_passed(deadline) {
                    let record =
                        cancelled_record(scenario, "run deadline exceeded before start");
                    let _ = tx.send((index, record, None));
                    continue;
                }
                debug!(worker = worker_id, scenario = %scenario.name, "picked");
                let (record, abort) =
                    run_scenario(scenario, url, &config, &connect, deadline).await;
                if abort.is_some() {
                    aborted.store(true, Ordering::SeqCst);
                }
                let _ = tx.send((index, record, abort));
            }
        }));
    }
    drop(tx);

    let mut slots: Vec<Option<ScenarioRecord>> = (0..total).map(|_| None).collect();
    let mut abort_error: Option<SessionError> = None;
    while let Some((index, record, abort)) = rx.recv().await {
        log_record(&record);
        slots[index] = Some(record);
        if let Some(error) = abort {
            abort_error.get_or_insert(error);
        }
    }
    for handle in handles {
        let _ = handle.await;
    }

    let mut sink = sink;
    for record in slots.into_iter().flatten() {
        sink.record(record);
    }
    match abort_error {
        Some(error) => Err(RunnerError::Aborted {
            error,
            report: sink.finalize(),
        }),
        None => Ok(sink.finalize()),
    }
}

/// Execute one scenario on its own session. Always closes the session; a
/// returned [`SessionError`] tells the caller to abort the run after
/// recording this scenario's failure.
async fn run_scenario<C, Fut>(
    scenario: &Scenario,
    url: &Url,
    config: &RunConfig,
    connect: &C,
    deadline: Option<Instant>,
) -> (ScenarioRecord, Option<SessionError>)
where
    C: Fn() -> Fut,
    Fut: Future<Output = verdict_runtime::Result<DriverConnection>>,
{
    let started = Instant::now();
    info!(scenario = %scenario.name, url = %url, "starting");

    let session_config = SessionConfig {
        headless: config.headless,
        viewport: scenario.viewport,
        storage: scenario.storage.clone(),
    };
    let opened = match connect().await {
        Ok(conn) => Session::start(conn, &session_config).await,
        Err(e) => Err(SessionError::from(e)),
    };
    let mut session = match opened {
        Ok(session) => session,
        Err(error) => {
            let record = ScenarioRecord {
                name: scenario.name.clone(),
                outcome: Outcome::fail(FailKind::Session, error.to_string()),
                artifacts: Vec::new(),
                timing_ms: started.elapsed().as_millis() as u64,
            };
            return (record, Some(error));
        }
    };

    let artifact_dir = config.artifacts_dir.join(scenario.slug());
    let mut artifacts = Vec::new();
    let result = {
        let exec = execute(
            &mut session,
            scenario,
            url,
            config,
            &artifact_dir,
            &mut artifacts,
        );
        match deadline {
            None => exec.await,
            Some(at) => tokio::select! {
                result = exec => result,
                _ = sleep_until(at) => Ok(Err(Failure {
                    kind: FailKind::Cancelled,
                    reason: "run deadline exceeded".to_string(),
                })),
            },
        }
    };

    let (outcome, abort) = match result {
        Ok(Ok(())) => (Outcome::Pass, None),
        Ok(Err(failure)) => {
            if failure.kind != FailKind::Cancelled {
                capture_failure_screenshot(&mut session, &artifact_dir, &mut artifacts).await;
            }
            (Outcome::fail(failure.kind, failure.reason), None)
        }
        Err(error) => (
            Outcome::fail(FailKind::Session, error.to_string()),
            Some(error),
        ),
    };

    if let Err(e) = session.close().await {
        debug!(scenario = %scenario.name, error = %e, "close failed, driver killed");
    }

    let record = ScenarioRecord {
        name: scenario.name.clone(),
        outcome,
        artifacts,
        timing_ms: started.elapsed().as_millis() as u64,
    };
    (record, abort)
}

struct Failure {
    kind: FailKind,
    reason: String,
}

fn to_failure(e: CallError, kind: FailKind) -> Result<Failure, SessionError> {
    match e.into_fault() {
        Ok(fault) => Ok(Failure {
            kind,
            reason: fault.to_string(),
        }),
        Err(session) => Err(session),
    }
}

/// Navigate, dismiss, interact, assert and capture, in that order.
/// `Ok(Err(_))` is a scenario failure; `Err(_)` means the session died.
async fn execute(
    session: &mut Session,
    scenario: &Scenario,
    url: &Url,
    config: &RunConfig,
    artifact_dir: &Path,
    artifacts: &mut Vec<PathBuf>,
) -> Result<Result<(), Failure>, SessionError> {
    let nav_timeout = scenario
        .nav_timeout_ms
        .map(Duration::from_millis)
        .unwrap_or(config.nav_timeout);
    if let Err(e) = session.navigate(url.as_str(), nav_timeout).await {
        return Ok(Err(to_failure(e, FailKind::Navigation)?));
    }

    for (i, action) in scenario.dismiss.iter().enumerate() {
        if let Err(e) = executor::dismiss(session, action, config.step_timeout).await {
            let mut failure = to_failure(e, FailKind::Dismissal)?;
            failure.reason = format!("dismiss step {}: {}", i + 1, failure.reason);
            return Ok(Err(failure));
        }
    }

    for (i, step) in scenario.steps.iter().enumerate() {
        if let Err(e) = executor::apply(session, step, config.step_timeout).await {
            let mut failure = to_failure(e, FailKind::Interaction)?;
            failure.reason = format!("step {} ({}): {}", i + 1, step.describe(), failure.reason);
            return Ok(Err(failure));
        }
    }

    for assertion in &scenario.assertions {
        match check::check(session, assertion, config.step_timeout).await {
            Ok(Verdict::Pass) => {}
            Ok(Verdict::Mismatch {
                expected,
                actual,
                waited_ms,
            }) => {
                return Ok(Err(Failure {
                    kind: FailKind::Assertion,
                    reason: format!(
                        "{}: expected {expected}, got {actual} after {waited_ms}ms",
                        check::subject(assertion)
                    ),
                }));
            }
            Err(e) => return Ok(Err(to_failure(e, FailKind::Assertion)?)),
        }
    }

    if !scenario.artifacts.is_empty() {
        if let Err(e) = std::fs::create_dir_all(artifact_dir) {
            return Ok(Err(Failure {
                kind: FailKind::Artifact,
                reason: format!("cannot create {}: {e}", artifact_dir.display()),
            }));
        }
        for artifact in &scenario.artifacts {
            let path = artifact_dir.join(format!("{}.png", slugify(&artifact.name)));
            match session
                .screenshot(&path.display().to_string(), artifact.full_page)
                .await
            {
                Ok(_) => artifacts.push(path),
                Err(e) => {
                    let mut failure = to_failure(e, FailKind::Artifact)?;
                    failure.reason = format!("capturing '{}': {}", artifact.name, failure.reason);
                    return Ok(Err(failure));
                }
            }
        }
    }

    Ok(Ok(()))
}

/// Best-effort diagnostic screenshot on the failure path. Errors here are
/// logged and swallowed; the scenario already has its failure recorded.
async fn capture_failure_screenshot(
    session: &mut Session,
    artifact_dir: &Path,
    artifacts: &mut Vec<PathBuf>,
) {
    if session.is_closed() {
        return;
    }
    if let Err(e) = std::fs::create_dir_all(artifact_dir) {
        debug!(error = %e, "skipping failure screenshot");
        return;
    }
    let path = artifact_dir.join("failure.png");
    match session.screenshot(&path.display().to_string(), false).await {
        Ok(_) => artifacts.push(path),
        Err(e) => debug!(error = %e, "failure screenshot not captured"),
    }
}

fn cancelled_record(scenario: &Scenario, reason: &str) -> ScenarioRecord {
    ScenarioRecord {
        name: scenario.name.clone(),
        outcome: Outcome::fail(FailKind::Cancelled, reason),
        artifacts: Vec::new(),
        timing_ms: 0,
    }
}

fn log_record(record: &ScenarioRecord) {
    match record.outcome.detail() {
        None => info!(scenario = %record.name, ms = record.timing_ms, "pass"),
        Some(detail) => warn!(
            scenario = %record.name,
            kind = %detail.kind,
            reason = %detail.reason,
            "fail"
        ),
    }
}

fn deadline_passed(deadline: Option<Instant>) -> bool {
    deadline.is_some_and(|at| Instant::now() >= at)
}

fn resolve_url(scenario: &Scenario, base: Option<&Url>) -> Result<Url, RunnerError> {
    match Url::parse(&scenario.url) {
        Ok(url) => Ok(url),
        Err(url::ParseError::RelativeUrlWithoutBase) => match base {
            Some(base) => base.join(&scenario.url).map_err(|e| RunnerError::InvalidUrl {
                scenario: scenario.name.clone(),
                url: scenario.url.clone(),
                message: e.to_string(),
            }),
            None => Err(RunnerError::BaseUrlRequired {
                scenario: scenario.name.clone(),
                url: scenario.url.clone(),
            }),
        },
        Err(e) => Err(RunnerError::InvalidUrl {
            scenario: scenario.name.clone(),
            url: scenario.url.clone(),
            message: e.to_string(),
        }),
    }
}
