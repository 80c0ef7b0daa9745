//! Assertion evaluation by condition-polling.
//!
//! Equality and visibility checks re-probe every [`POLL_INTERVAL`] within the
//! wait budget instead of sleeping a fixed interval and hoping. A predicate
//! that never holds yields a [`Verdict::Mismatch`] carrying the last observed
//! actual value; only driver and transport failures are errors.

use std::time::Duration;

use tokio::time::{Instant, sleep};
use tracing::debug;
use verdict_protocol::ErrorCode;

use crate::error::{CallError, ScenarioFault};
use crate::executor::{self, POLL_INTERVAL};
use crate::scenario::Assertion;
use crate::session::Session;

/// Outcome of evaluating one assertion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    Pass,
    /// The predicate did not hold within the wait budget. A mismatch is a
    /// normal result, not a fault.
    Mismatch {
        expected: String,
        actual: String,
        waited_ms: u64,
    },
}

impl Verdict {
    pub fn passed(&self) -> bool {
        matches!(self, Verdict::Pass)
    }
}

/// Evaluate one assertion against the current page state.
///
/// Computed-style checks wait for the element to exist, then compare a
/// single snapshot; style values are expected to be stable once the prior
/// interaction settles, so re-polling them would only mask real failures.
pub async fn check(
    session: &mut Session,
    assertion: &Assertion,
    default_timeout: Duration,
) -> Result<Verdict, CallError> {
    let timeout = assertion
        .timeout_override()
        .map(Duration::from_millis)
        .unwrap_or(default_timeout);
    debug!(assertion = %assertion.describe(), "checking");

    if let Assertion::Style {
        selector,
        property,
        expected,
        ..
    } = assertion
    {
        return style_snapshot(session, selector, property, expected, timeout).await;
    }

    let started = Instant::now();
    loop {
        match probe(session, assertion).await? {
            Ok(()) => return Ok(Verdict::Pass),
            Err(actual) if started.elapsed() >= timeout => {
                return Ok(Verdict::Mismatch {
                    expected: expectation(assertion),
                    actual,
                    waited_ms: started.elapsed().as_millis() as u64,
                });
            }
            Err(_) => sleep(POLL_INTERVAL).await,
        }
    }
}

/// What an assertion is about, for failure messages.
pub fn subject(assertion: &Assertion) -> String {
    match assertion {
        Assertion::Visible { selector, .. } | Assertion::Hidden { selector, .. } => {
            format!("visibility of '{selector}'")
        }
        Assertion::Attribute { selector, name, .. } => {
            format!("attribute '{name}' of '{selector}'")
        }
        Assertion::Text { .. } => "page text".to_string(),
        Assertion::Value { selector, .. } => format!("value of '{selector}'"),
        Assertion::Style {
            selector, property, ..
        } => format!("style '{property}' of '{selector}'"),
    }
}

fn expectation(assertion: &Assertion) -> String {
    match assertion {
        Assertion::Visible { .. } => "visible".to_string(),
        Assertion::Hidden { .. } => "hidden".to_string(),
        Assertion::Attribute { expected, .. }
        | Assertion::Value { expected, .. }
        | Assertion::Style { expected, .. } => format!("\"{expected}\""),
        Assertion::Text { text, .. } => format!("text containing \"{text}\""),
    }
}

/// One evaluation of the predicate. `Ok(Err(actual))` is unsatisfied-so-far.
async fn probe(
    session: &mut Session,
    assertion: &Assertion,
) -> Result<Result<(), String>, CallError> {
    match assertion {
        Assertion::Visible { selector, .. } => {
            let query = session.query(selector).await?;
            Ok(if query.count == 0 {
                Err("no matching element".to_string())
            } else if !query.visible {
                Err("present but hidden".to_string())
            } else {
                Ok(())
            })
        }
        Assertion::Hidden { selector, .. } => {
            let query = session.query(selector).await?;
            Ok(if query.count > 0 && query.visible {
                Err("visible".to_string())
            } else {
                Ok(())
            })
        }
        Assertion::Attribute {
            selector,
            name,
            expected,
            ..
        } => match tolerate_missing(session.attribute(selector, name).await)? {
            None => Ok(Err("no matching element".to_string())),
            Some(data) => Ok(match data.value {
                Some(actual) if actual == *expected => Ok(()),
                Some(actual) => Err(format!("\"{actual}\"")),
                None => Err("attribute absent".to_string()),
            }),
        },
        Assertion::Text { text, .. } => {
            let data = session.text(None).await?;
            Ok(if data.text.contains(text.as_str()) {
                Ok(())
            } else {
                Err("not found in page text".to_string())
            })
        }
        Assertion::Value {
            selector, expected, ..
        } => match tolerate_missing(session.value(selector).await)? {
            None => Ok(Err("no matching element".to_string())),
            Some(data) => Ok(if data.value == *expected {
                Ok(())
            } else {
                Err(format!("\"{}\"", data.value))
            }),
        },
        Assertion::Style { .. } => unreachable!("style checks snapshot once"),
    }
}

/// During assertion polling a missing element is not-yet-satisfied, not a
/// fault; it becomes the reported actual value if the deadline expires.
fn tolerate_missing<T>(result: Result<T, CallError>) -> Result<Option<T>, CallError> {
    match result {
        Ok(value) => Ok(Some(value)),
        Err(CallError::Fault(ScenarioFault::Command {
            code: ErrorCode::ElementNotFound,
            ..
        })) => Ok(None),
        Err(e) => Err(e),
    }
}

async fn style_snapshot(
    session: &mut Session,
    selector: &str,
    property: &str,
    expected: &str,
    timeout: Duration,
) -> Result<Verdict, CallError> {
    let started = Instant::now();
    match executor::wait_for_element(session, selector, timeout).await {
        Ok(_) => {}
        Err(CallError::Fault(ScenarioFault::ElementNotFound { waited_ms, .. })) => {
            return Ok(Verdict::Mismatch {
                expected: format!("\"{expected}\""),
                actual: "no matching element".to_string(),
                waited_ms,
            });
        }
        Err(e) => return Err(e),
    }

    // The element can vanish between the wait and the snapshot.
    let style = match tolerate_missing(session.style(selector, property).await)? {
        Some(style) => style,
        None => {
            return Ok(Verdict::Mismatch {
                expected: format!("\"{expected}\""),
                actual: "no matching element".to_string(),
                waited_ms: started.elapsed().as_millis() as u64,
            });
        }
    };

    Ok(if style.value == expected {
        Verdict::Pass
    } else {
        Verdict::Mismatch {
            expected: format!("\"{expected}\""),
            actual: format!("\"{}\"", style.value),
            waited_ms: started.elapsed().as_millis() as u64,
        }
    })
}
