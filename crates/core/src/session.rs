//! Browser session lifecycle.
//!
//! A [`Session`] owns one driver subprocess for the duration of one scenario.
//! Opening runs the launch sequence (launch, viewport, storage seeding);
//! closing is idempotent and always reaps the subprocess. Driver-reported
//! command failures surface as [`ScenarioFault`]s, transport failures as
//! [`SessionError`]s.

use std::collections::BTreeMap;
use std::time::Duration;

use serde::de::DeserializeOwned;
use tracing::debug;
use verdict_protocol::{
    AttributeData, Command, QueryData, ScreenshotData, StyleData, TextData, ValueData,
};
use verdict_runtime::{DriverConfig, DriverConnection};

use crate::error::{CallError, ScenarioFault, SessionError};
use crate::scenario::Viewport;

/// Transport deadline for ordinary calls. Guards against a hung driver, not
/// against slow pages; page waits are driver-side and shorter.
const CALL_DEADLINE: Duration = Duration::from_secs(30);

/// Browser launch downloads and starts an engine on cold machines.
const LAUNCH_DEADLINE: Duration = Duration::from_secs(60);

/// Transport slack on top of the driver-enforced navigation timeout, so the
/// driver's own NAVIGATION_TIMEOUT report wins over ours.
const NAV_GRACE: Duration = Duration::from_secs(5);

/// Per-scenario launch settings.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub headless: bool,
    pub viewport: Option<Viewport>,
    /// localStorage entries applied before the first navigation.
    pub storage: BTreeMap<String, String>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            headless: true,
            viewport: None,
            storage: BTreeMap::new(),
        }
    }
}

/// One browser context, exclusively owned by one scenario execution.
#[derive(Debug)]
pub struct Session {
    conn: DriverConnection,
}

impl Session {
    /// Spawn the driver, perform the handshake and run the launch sequence.
    pub async fn open(driver: &DriverConfig, config: &SessionConfig) -> Result<Self, SessionError> {
        let conn = DriverConnection::connect(driver).await?;
        Self::start(conn, config).await
    }

    /// Run the launch sequence on an established connection.
    ///
    /// Tests attach in-memory drivers here; [`Session::open`] is the
    /// subprocess path. The connection is closed if the sequence fails.
    pub async fn start(
        conn: DriverConnection,
        config: &SessionConfig,
    ) -> Result<Self, SessionError> {
        let mut session = Session { conn };
        if let Err(e) = session.launch_sequence(config).await {
            let _ = session.close().await;
            return Err(e);
        }
        Ok(session)
    }

    async fn launch_sequence(&mut self, config: &SessionConfig) -> Result<(), SessionError> {
        self.conn
            .call(
                Command::Launch {
                    headless: config.headless,
                },
                LAUNCH_DEADLINE,
            )
            .await?;

        if let Some(viewport) = config.viewport {
            self.conn
                .call(
                    Command::Viewport {
                        width: viewport.width,
                        height: viewport.height,
                    },
                    CALL_DEADLINE,
                )
                .await?;
        }

        if !config.storage.is_empty() {
            self.conn
                .call(
                    Command::Storage {
                        entries: config.storage.clone(),
                    },
                    CALL_DEADLINE,
                )
                .await?;
        }

        debug!(headless = config.headless, "session ready");
        Ok(())
    }

    /// Navigate and wait for a stable load state, bounded by `timeout`.
    ///
    /// The timeout is enforced driver-side; the transport deadline adds
    /// [`NAV_GRACE`] so a driver timeout report arrives before ours fires.
    pub async fn navigate(&mut self, url: &str, timeout: Duration) -> Result<(), CallError> {
        let timeout_ms = timeout.as_millis() as u64;
        let result = self
            .conn
            .call(
                Command::Navigate {
                    url: url.to_string(),
                    timeout_ms,
                },
                timeout + NAV_GRACE,
            )
            .await;

        match result {
            Ok(_) => Ok(()),
            Err(verdict_runtime::Error::Driver { code, message }) => {
                Err(CallError::Fault(match code {
                    verdict_protocol::ErrorCode::NavigationTimeout => {
                        ScenarioFault::NavigationTimeout {
                            url: url.to_string(),
                            timeout_ms,
                        }
                    }
                    verdict_protocol::ErrorCode::NavigationFailed => {
                        ScenarioFault::NavigationFailed {
                            url: url.to_string(),
                            message,
                        }
                    }
                    _ => ScenarioFault::Command {
                        command: "navigate".to_string(),
                        code,
                        message,
                    },
                }))
            }
            Err(e) => Err(CallError::Session(e.into())),
        }
    }

    /// Issue one command with the standard deadline.
    ///
    /// Driver-reported failures come back as [`ScenarioFault::Command`];
    /// callers with more context (the executor knows the selector and what
    /// was being attempted) refine the code into a specific fault.
    pub async fn call(&mut self, command: Command) -> Result<serde_json::Value, CallError> {
        let name = command.name();
        match self.conn.call(command, CALL_DEADLINE).await {
            Ok(data) => Ok(data),
            Err(verdict_runtime::Error::Driver { code, message }) => {
                Err(CallError::Fault(ScenarioFault::Command {
                    command: name.to_string(),
                    code,
                    message,
                }))
            }
            Err(e) => Err(CallError::Session(e.into())),
        }
    }

    pub async fn query(&mut self, selector: &str) -> Result<QueryData, CallError> {
        let data = self
            .call(Command::Query {
                selector: selector.to_string(),
            })
            .await?;
        decode("query", data)
    }

    pub async fn attribute(
        &mut self,
        selector: &str,
        name: &str,
    ) -> Result<AttributeData, CallError> {
        let data = self
            .call(Command::Attribute {
                selector: selector.to_string(),
                name: name.to_string(),
            })
            .await?;
        decode("attribute", data)
    }

    /// Text content of the first match, or of the whole page when `selector`
    /// is `None`.
    pub async fn text(&mut self, selector: Option<&str>) -> Result<TextData, CallError> {
        let data = self
            .call(Command::Text {
                selector: selector.map(str::to_string),
            })
            .await?;
        decode("text", data)
    }

    pub async fn style(&mut self, selector: &str, property: &str) -> Result<StyleData, CallError> {
        let data = self
            .call(Command::Style {
                selector: selector.to_string(),
                property: property.to_string(),
            })
            .await?;
        decode("style", data)
    }

    pub async fn value(&mut self, selector: &str) -> Result<ValueData, CallError> {
        let data = self
            .call(Command::Value {
                selector: selector.to_string(),
            })
            .await?;
        decode("value", data)
    }

    /// Capture a screenshot to `path`. The parent directory must exist.
    pub async fn screenshot(
        &mut self,
        path: &str,
        full_page: bool,
    ) -> Result<ScreenshotData, CallError> {
        let data = self
            .call(Command::Screenshot {
                path: path.to_string(),
                full_page,
            })
            .await?;
        decode("screenshot", data)
    }

    /// Close the session. Idempotent; always reaps the driver subprocess.
    pub async fn close(&mut self) -> Result<(), SessionError> {
        self.conn.close().await.map_err(SessionError::from)
    }

    pub fn is_closed(&self) -> bool {
        self.conn.is_closed()
    }
}

/// Decode a `data` payload; a shape mismatch means the driver violated the
/// protocol, which poisons trust in the whole session.
fn decode<T: DeserializeOwned>(command: &str, data: serde_json::Value) -> Result<T, CallError> {
    serde_json::from_value(data).map_err(|e| {
        CallError::Session(SessionError::from(verdict_runtime::Error::Protocol(
            format!("bad '{command}' data: {e}"),
        )))
    })
}
