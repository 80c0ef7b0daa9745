//! Sequential request/response connection to the driver.

use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tracing::{debug, warn};
use verdict_protocol::{Command, DriverRequest, DriverResponse, PingData, SCHEMA_VERSION};

use crate::driver::DriverConfig;
use crate::error::{Error, Result};
use crate::process::DriverProcess;

/// Deadline for the initial ping after spawn.
const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(5);

/// How long `close` waits for the `quit` acknowledgement.
const QUIT_GRACE: Duration = Duration::from_secs(2);

/// One NDJSON connection to a driver.
///
/// Calls are strictly sequential: a request is written as one line and lines
/// are read until the response with the matching id arrives. Any transport
/// failure (EOF, deadline expiry, malformed line) poisons the connection;
/// subsequent calls fail fast with [`Error::ConnectionClosed`].
pub struct DriverConnection {
    writer: Box<dyn AsyncWrite + Send + Unpin>,
    reader: BufReader<Box<dyn AsyncRead + Send + Unpin>>,
    process: Option<DriverProcess>,
    next_id: u64,
    closed: bool,
}

impl std::fmt::Debug for DriverConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DriverConnection")
            .field("next_id", &self.next_id)
            .field("closed", &self.closed)
            .field("has_process", &self.process.is_some())
            .finish()
    }
}

impl DriverConnection {
    /// Spawn the configured driver and perform the `ping` handshake.
    pub async fn connect(config: &DriverConfig) -> Result<Self> {
        let (process, stdin, stdout) = DriverProcess::spawn(config).await?;
        let mut conn = Self::attach(stdin, stdout);
        conn.process = Some(process);

        match conn.call(Command::Ping, HANDSHAKE_TIMEOUT).await {
            Ok(data) => {
                if let Ok(ping) = serde_json::from_value::<PingData>(data) {
                    debug!(version = %ping.version, "driver ready");
                }
                Ok(conn)
            }
            Err(e) => {
                let _ = conn.close().await;
                Err(Error::HandshakeFailed(e.to_string()))
            }
        }
    }

    /// Attach to an already-connected driver over arbitrary stdio-like pipes.
    ///
    /// Used by tests to wire an in-memory driver via `tokio::io::duplex`.
    pub fn attach<W, R>(writer: W, reader: R) -> Self
    where
        W: AsyncWrite + Send + Unpin + 'static,
        R: AsyncRead + Send + Unpin + 'static,
    {
        Self {
            writer: Box::new(writer),
            reader: BufReader::new(Box::new(reader)),
            process: None,
            next_id: 1,
            closed: false,
        }
    }

    /// Send one command and wait for its response, bounded by `deadline`.
    ///
    /// Returns the response `data` on success. A driver-reported failure maps
    /// to [`Error::Driver`] and leaves the connection usable; transport
    /// failures poison it.
    pub async fn call(
        &mut self,
        command: Command,
        deadline: Duration,
    ) -> Result<serde_json::Value> {
        if self.closed {
            return Err(Error::ConnectionClosed);
        }

        let name = command.name();
        let id = self.next_id.to_string();
        self.next_id += 1;
        let request = DriverRequest::new(id.clone(), command);

        let response = match tokio::time::timeout(deadline, self.roundtrip(&request, &id)).await {
            Ok(Ok(response)) => response,
            Ok(Err(e)) => {
                self.closed = true;
                return Err(e);
            }
            Err(_) => {
                self.closed = true;
                return Err(Error::CallTimeout {
                    command: name.to_string(),
                    deadline_ms: deadline.as_millis() as u64,
                });
            }
        };

        if let Some(version) = response.schema_version {
            if version > SCHEMA_VERSION {
                return Err(Error::Protocol(format!(
                    "driver speaks schema version {version}, this build understands {SCHEMA_VERSION}"
                )));
            }
        }

        if response.ok {
            Ok(response.data.unwrap_or(serde_json::Value::Null))
        } else {
            let error = response.error.ok_or_else(|| {
                Error::Protocol(format!("'{name}' failed without error details"))
            })?;
            Err(Error::Driver {
                code: error.code,
                message: error.message,
            })
        }
    }

    async fn roundtrip(&mut self, request: &DriverRequest, id: &str) -> Result<DriverResponse> {
        let mut line = serde_json::to_string(request)?;
        line.push('\n');
        self.writer.write_all(line.as_bytes()).await?;
        self.writer.flush().await?;

        loop {
            let mut buf = String::new();
            let n = self.reader.read_line(&mut buf).await?;
            if n == 0 {
                return Err(Error::ConnectionClosed);
            }
            let trimmed = buf.trim();
            if trimmed.is_empty() {
                continue;
            }
            let response: DriverResponse = serde_json::from_str(trimmed)
                .map_err(|e| Error::Protocol(format!("malformed response line: {e}")))?;
            if response.id.as_deref() == Some(id) {
                return Ok(response);
            }
            warn!(expected = id, got = ?response.id, "skipping response with unexpected id");
        }
    }

    /// Close the connection: best-effort `quit`, then reap the process.
    ///
    /// Idempotent. A poisoned connection skips `quit` and goes straight to
    /// killing the process.
    pub async fn close(&mut self) -> Result<()> {
        if !self.closed {
            self.closed = true;
            let id = self.next_id.to_string();
            self.next_id += 1;
            let quit = DriverRequest::new(id.clone(), Command::Quit);
            match tokio::time::timeout(QUIT_GRACE, self.roundtrip(&quit, &id)).await {
                Ok(Ok(_)) => debug!("driver acknowledged quit"),
                Ok(Err(e)) => debug!(error = %e, "quit not acknowledged"),
                Err(_) => debug!("quit timed out"),
            }
        }

        if let Some(process) = self.process.take() {
            process.shutdown().await?;
        }
        Ok(())
    }

    /// True once the connection is closed or poisoned.
    pub fn is_closed(&self) -> bool {
        self.closed
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, DuplexStream};
    use verdict_protocol::ErrorCode;

    use super::*;

    fn attach_duplex(client: DuplexStream) -> DriverConnection {
        let (read, write) = tokio::io::split(client);
        DriverConnection::attach(write, read)
    }

    async fn write_line(writer: &mut (impl tokio::io::AsyncWrite + Unpin), resp: &DriverResponse) {
        let mut line = serde_json::to_string(resp).unwrap();
        line.push('\n');
        writer.write_all(line.as_bytes()).await.unwrap();
    }

    #[tokio::test]
    async fn call_roundtrips_over_duplex() {
        let (client, server) = tokio::io::duplex(4096);
        let mut conn = attach_duplex(client);

        let server_task = tokio::spawn(async move {
            let (read, mut write) = tokio::io::split(server);
            let mut lines = BufReader::new(read).lines();
            let line = lines.next_line().await.unwrap().unwrap();
            let req: DriverRequest = serde_json::from_str(&line).unwrap();
            assert_eq!(req.command.name(), "query");
            let resp = DriverResponse::success(
                req.id,
                "query",
                serde_json::json!({"count": 1, "visible": true}),
            );
            write_line(&mut write, &resp).await;
        });

        let data = conn
            .call(
                Command::Query {
                    selector: "#app".into(),
                },
                Duration::from_secs(1),
            )
            .await
            .unwrap();
        assert_eq!(data["count"], 1);
        assert_eq!(data["visible"], true);
        server_task.await.unwrap();
    }

    #[tokio::test]
    async fn driver_failure_maps_to_error_and_keeps_connection() {
        let (client, server) = tokio::io::duplex(4096);
        let mut conn = attach_duplex(client);

        let server_task = tokio::spawn(async move {
            let (read, mut write) = tokio::io::split(server);
            let mut lines = BufReader::new(read).lines();

            let line = lines.next_line().await.unwrap().unwrap();
            let req: DriverRequest = serde_json::from_str(&line).unwrap();
            let resp = DriverResponse::failure(
                req.id,
                "click",
                ErrorCode::ElementObscured,
                "intercepted by .overlay",
            );
            write_line(&mut write, &resp).await;

            let line = lines.next_line().await.unwrap().unwrap();
            let req: DriverRequest = serde_json::from_str(&line).unwrap();
            let resp = DriverResponse::success_empty(req.id, "press");
            write_line(&mut write, &resp).await;
        });

        let err = conn
            .call(
                Command::Click {
                    selector: "button".into(),
                    force: false,
                },
                Duration::from_secs(1),
            )
            .await
            .unwrap_err();
        assert_eq!(err.driver_code(), Some(ErrorCode::ElementObscured));
        assert!(!conn.is_closed());

        conn.call(
            Command::Press {
                key: "Escape".into(),
            },
            Duration::from_secs(1),
        )
        .await
        .unwrap();
        server_task.await.unwrap();
    }

    #[tokio::test]
    async fn mismatched_ids_are_skipped() {
        let (client, server) = tokio::io::duplex(4096);
        let mut conn = attach_duplex(client);

        let server_task = tokio::spawn(async move {
            let (read, mut write) = tokio::io::split(server);
            let mut lines = BufReader::new(read).lines();
            let line = lines.next_line().await.unwrap().unwrap();
            let req: DriverRequest = serde_json::from_str(&line).unwrap();

            let stale = DriverResponse::success_empty(Some("999".into()), "click");
            write_line(&mut write, &stale).await;
            let real = DriverResponse::success_empty(req.id, "focus");
            write_line(&mut write, &real).await;
        });

        conn.call(
            Command::Focus {
                selector: "#search".into(),
            },
            Duration::from_secs(1),
        )
        .await
        .unwrap();
        server_task.await.unwrap();
    }

    #[tokio::test]
    async fn eof_poisons_the_connection() {
        let (client, server) = tokio::io::duplex(4096);
        let mut conn = attach_duplex(client);

        let server_task = tokio::spawn(async move {
            let (read, _write) = tokio::io::split(server);
            let mut lines = BufReader::new(read).lines();
            let _ = lines.next_line().await.unwrap();
            // dropping both halves closes the pipe without responding
        });

        let err = conn
            .call(Command::Ping, Duration::from_secs(1))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::ConnectionClosed), "got: {err:?}");
        assert!(conn.is_closed());

        let err = conn
            .call(Command::Ping, Duration::from_secs(1))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::ConnectionClosed));
        server_task.await.unwrap();
    }

    #[tokio::test]
    async fn silent_driver_times_out_and_poisons() {
        let (client, _server) = tokio::io::duplex(4096);
        let mut conn = attach_duplex(client);

        let err = conn
            .call(Command::Ping, Duration::from_millis(50))
            .await
            .unwrap_err();
        assert!(err.is_timeout(), "got: {err:?}");
        assert!(conn.is_closed());
    }

    #[tokio::test]
    async fn malformed_response_is_a_protocol_error() {
        let (client, server) = tokio::io::duplex(4096);
        let mut conn = attach_duplex(client);

        let server_task = tokio::spawn(async move {
            let (read, mut write) = tokio::io::split(server);
            let mut lines = BufReader::new(read).lines();
            let _ = lines.next_line().await.unwrap();
            write.write_all(b"this is not json\n").await.unwrap();
        });

        let err = conn
            .call(Command::Ping, Duration::from_secs(1))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Protocol(_)), "got: {err:?}");
        server_task.await.unwrap();
    }

    #[tokio::test]
    async fn newer_schema_version_is_rejected() {
        let (client, server) = tokio::io::duplex(4096);
        let mut conn = attach_duplex(client);

        let server_task = tokio::spawn(async move {
            let (read, mut write) = tokio::io::split(server);
            let mut lines = BufReader::new(read).lines();
            let line = lines.next_line().await.unwrap().unwrap();
            let req: DriverRequest = serde_json::from_str(&line).unwrap();
            let mut resp = DriverResponse::success_empty(req.id, "ping");
            resp.schema_version = Some(SCHEMA_VERSION + 1);
            write_line(&mut write, &resp).await;
        });

        let err = conn
            .call(Command::Ping, Duration::from_secs(1))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Protocol(_)), "got: {err:?}");
        server_task.await.unwrap();
    }

    #[tokio::test]
    async fn close_sends_quit_exactly_once() {
        let (client, server) = tokio::io::duplex(4096);
        let mut conn = attach_duplex(client);
        let quits = Arc::new(AtomicUsize::new(0));
        let seen = quits.clone();

        let server_task = tokio::spawn(async move {
            let (read, mut write) = tokio::io::split(server);
            let mut lines = BufReader::new(read).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                let req: DriverRequest = serde_json::from_str(&line).unwrap();
                if req.command.name() == "quit" {
                    seen.fetch_add(1, Ordering::SeqCst);
                }
                let name = req.command.name();
                let resp = DriverResponse::success_empty(req.id, name);
                write_line(&mut write, &resp).await;
            }
        });

        conn.close().await.unwrap();
        conn.close().await.unwrap();
        assert!(conn.is_closed());

        drop(conn);
        server_task.await.unwrap();
        assert_eq!(quits.load(Ordering::SeqCst), 1);
    }

    #[cfg(unix)]
    mod with_process {
        use std::fs;
        use std::os::unix::fs::PermissionsExt;
        use std::path::Path;

        use tempfile::TempDir;

        use super::*;
        use crate::driver::DriverConfig;

        fn write_mock_driver(path: &Path) {
            let script = r#"#!/bin/sh
while IFS= read -r line; do
  id=$(printf '%s' "$line" | sed 's/.*"id":"\([^"]*\)".*/\1/')
  case "$line" in
  *'"command":"ping"'*)
    printf '{"schemaVersion":1,"id":"%s","ok":true,"command":"ping","data":{"version":"mock"}}\n' "$id"
    ;;
  *'"command":"quit"'*)
    printf '{"schemaVersion":1,"id":"%s","ok":true,"command":"quit"}\n' "$id"
    exit 0
    ;;
  *)
    printf '{"schemaVersion":1,"id":"%s","ok":true,"command":"other","data":{}}\n' "$id"
    ;;
  esac
done
"#;
            fs::write(path, script).unwrap();
            let mut perms = fs::metadata(path).unwrap().permissions();
            perms.set_mode(0o755);
            fs::set_permissions(path, perms).unwrap();
        }

        #[tokio::test]
        async fn connect_handshakes_and_closes_mock_driver() {
            let temp = TempDir::new().unwrap();
            let script = temp.path().join("mock-driver.sh");
            write_mock_driver(&script);

            let config = DriverConfig::new(vec![script.display().to_string()]);
            let mut conn = DriverConnection::connect(&config).await.unwrap();
            conn.close().await.unwrap();
            conn.close().await.unwrap();
        }

        #[tokio::test]
        async fn connect_fails_handshake_against_mute_driver() {
            let temp = TempDir::new().unwrap();
            let script = temp.path().join("mute-driver.sh");
            fs::write(&script, "#!/bin/sh\ncat > /dev/null\n").unwrap();
            let mut perms = fs::metadata(&script).unwrap().permissions();
            perms.set_mode(0o755);
            fs::set_permissions(&script, perms).unwrap();

            let config = DriverConfig::new(vec![script.display().to_string()]);
            let err = DriverConnection::connect(&config).await.unwrap_err();
            assert!(matches!(err, Error::HandshakeFailed(_)), "got: {err:?}");
        }
    }
}
