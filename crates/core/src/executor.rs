//! Interaction execution with bounded waits.
//!
//! Selector-targeted actions first wait for the selector to resolve, polling
//! every [`POLL_INTERVAL`] up to the step's wait budget, then issue the
//! action once. There are no fixed settling sleeps anywhere; every wait is a
//! bounded condition poll.

use std::time::Duration;

use tokio::time::{Instant, sleep};
use tracing::debug;
use verdict_protocol::{Command, ErrorCode, QueryData};

use crate::error::{CallError, ScenarioFault};
use crate::scenario::{DismissAction, Interaction};
use crate::session::Session;

/// Poll cadence for element and condition waits.
pub const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Apply one interaction step.
///
/// `default_timeout` is the run-level wait budget; the step's own
/// `timeout_ms` overrides it. Key presses target the page and skip the
/// element wait.
pub async fn apply(
    session: &mut Session,
    step: &Interaction,
    default_timeout: Duration,
) -> Result<(), CallError> {
    let timeout = step
        .timeout_override()
        .map(Duration::from_millis)
        .unwrap_or(default_timeout);
    debug!(step = %step.describe(), "applying");

    match step {
        Interaction::Press { key } => {
            session.call(Command::Press { key: key.clone() }).await?;
            Ok(())
        }
        Interaction::Click {
            selector, force, ..
        } => {
            wait_for_element(session, selector, timeout).await?;
            apply_forceable(session, selector, *force, |force| Command::Click {
                selector: selector.clone(),
                force,
            })
            .await
        }
        Interaction::Hover {
            selector, force, ..
        } => {
            wait_for_element(session, selector, timeout).await?;
            apply_forceable(session, selector, *force, |force| Command::Hover {
                selector: selector.clone(),
                force,
            })
            .await
        }
        Interaction::Fill {
            selector, value, ..
        } => {
            wait_for_element(session, selector, timeout).await?;
            session
                .call(Command::Fill {
                    selector: selector.clone(),
                    value: value.clone(),
                })
                .await?;
            Ok(())
        }
        Interaction::Focus { selector, .. } => {
            wait_for_element(session, selector, timeout).await?;
            session
                .call(Command::Focus {
                    selector: selector.clone(),
                })
                .await?;
            Ok(())
        }
        Interaction::Select {
            selector, value, ..
        } => {
            wait_for_element(session, selector, timeout).await?;
            session
                .call(Command::Select {
                    selector: selector.clone(),
                    value: value.clone(),
                })
                .await?;
            Ok(())
        }
    }
}

/// Run one dismissal step.
pub async fn dismiss(
    session: &mut Session,
    action: &DismissAction,
    default_timeout: Duration,
) -> Result<(), CallError> {
    match action {
        DismissAction::Press {
            key,
            until_hidden,
            timeout_ms,
        } => {
            session.call(Command::Press { key: key.clone() }).await?;
            if let Some(selector) = until_hidden {
                let timeout = timeout_ms
                    .map(Duration::from_millis)
                    .unwrap_or(default_timeout);
                wait_until_hidden(session, selector, timeout).await?;
            }
            Ok(())
        }
        DismissAction::Click {
            selector,
            if_visible,
            timeout_ms,
        } => {
            let timeout = timeout_ms
                .map(Duration::from_millis)
                .unwrap_or(default_timeout);
            if *if_visible {
                // Single probe: the dialog either showed up or it did not.
                let query = session.query(selector).await?;
                if query.count == 0 || !query.visible {
                    debug!(selector, "dismiss target not visible, skipping");
                    return Ok(());
                }
            } else {
                wait_for_element(session, selector, timeout).await?;
            }
            apply_forceable(session, selector, false, |force| Command::Click {
                selector: selector.clone(),
                force,
            })
            .await
        }
    }
}

/// Poll until `selector` matches at least one element.
///
/// Always probes at least once, so a zero timeout still sees elements that
/// are already present.
pub async fn wait_for_element(
    session: &mut Session,
    selector: &str,
    timeout: Duration,
) -> Result<QueryData, CallError> {
    let started = Instant::now();
    loop {
        let query = session.query(selector).await?;
        if query.count > 0 {
            return Ok(query);
        }
        if started.elapsed() >= timeout {
            return Err(CallError::Fault(ScenarioFault::ElementNotFound {
                selector: selector.to_string(),
                waited_ms: started.elapsed().as_millis() as u64,
            }));
        }
        sleep(POLL_INTERVAL).await;
    }
}

/// Poll until `selector` matches nothing or its first match is hidden.
async fn wait_until_hidden(
    session: &mut Session,
    selector: &str,
    timeout: Duration,
) -> Result<(), CallError> {
    let started = Instant::now();
    loop {
        let query = session.query(selector).await?;
        if query.count == 0 || !query.visible {
            return Ok(());
        }
        if started.elapsed() >= timeout {
            return Err(CallError::Fault(ScenarioFault::DismissTimeout {
                selector: selector.to_string(),
                waited_ms: started.elapsed().as_millis() as u64,
            }));
        }
        sleep(POLL_INTERVAL).await;
    }
}

/// Issue an action once; when the driver reports the target obscured and the
/// step allows it, retry exactly once with the driver-level force option.
/// The first attempt is always unforced.
async fn apply_forceable(
    session: &mut Session,
    selector: &str,
    allow_force: bool,
    build: impl Fn(bool) -> Command,
) -> Result<(), CallError> {
    let err = match session.call(build(false)).await {
        Ok(_) => return Ok(()),
        Err(e) => e,
    };
    if !is_obscured(&err) {
        return Err(err);
    }
    if !allow_force {
        return Err(CallError::Fault(ScenarioFault::ElementObscured {
            selector: selector.to_string(),
        }));
    }

    debug!(selector, "target obscured, retrying with force");
    match session.call(build(true)).await {
        Ok(_) => Ok(()),
        Err(e) if is_obscured(&e) => Err(CallError::Fault(ScenarioFault::ElementObscured {
            selector: selector.to_string(),
        })),
        Err(e) => Err(e),
    }
}

fn is_obscured(err: &CallError) -> bool {
    matches!(
        err,
        CallError::Fault(ScenarioFault::Command {
            code: ErrorCode::ElementObscured,
            ..
        })
    )
}
