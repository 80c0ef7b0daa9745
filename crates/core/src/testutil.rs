//! In-memory scripted drivers for unit tests.

use std::sync::{Arc, Mutex};

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, duplex};
use verdict_protocol::{Command, DriverRequest, DriverResponse, ErrorCode};
use verdict_runtime::DriverConnection;

use crate::session::{Session, SessionConfig};

/// What a scripted driver replies to one command.
pub enum Reply {
    Ok(serde_json::Value),
    OkEmpty,
    Fail(ErrorCode, &'static str),
}

/// Shared log of command names a scripted driver has received.
#[derive(Clone, Default)]
pub struct CommandLog(Arc<Mutex<Vec<String>>>);

impl CommandLog {
    pub fn new() -> Self {
        Self::default()
    }

    fn push(&self, name: &str) {
        self.0.lock().unwrap().push(name.to_string());
    }

    pub fn names(&self) -> Vec<String> {
        self.0.lock().unwrap().clone()
    }

    pub fn count_of(&self, name: &str) -> usize {
        self.0.lock().unwrap().iter().filter(|n| *n == name).count()
    }
}

/// Start a session against an in-memory driver whose behavior is `script`.
///
/// The script sees every command except that unhandled bookkeeping (launch,
/// quit and friends) should fall through to `Reply::OkEmpty` in its catch-all
/// arm. Every received command name is appended to the returned log.
pub async fn scripted_session<F>(script: F) -> (Session, CommandLog)
where
    F: FnMut(&Command) -> Reply + Send + 'static,
{
    let log = CommandLog::new();
    let conn = scripted_connection(script, log.clone());
    let session = Session::start(conn, &SessionConfig::default())
        .await
        .expect("launch against scripted driver");
    (session, log)
}

/// Attach a scripted driver without running the launch sequence.
fn scripted_connection<F>(mut script: F, log: CommandLog) -> DriverConnection
where
    F: FnMut(&Command) -> Reply + Send + 'static,
{
    let (client_w, server_r) = duplex(16 * 1024);
    let (mut server_w, client_r) = duplex(16 * 1024);

    tokio::spawn(async move {
        let mut lines = BufReader::new(server_r).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            let request: DriverRequest = match serde_json::from_str(&line) {
                Ok(request) => request,
                Err(e) => panic!("scripted driver got malformed request: {e}"),
            };
            let name = request.command.name();
            log.push(name);
            let response = match script(&request.command) {
                Reply::Ok(data) => DriverResponse::success(request.id.clone(), name, data),
                Reply::OkEmpty => DriverResponse::success_empty(request.id.clone(), name),
                Reply::Fail(code, message) => {
                    DriverResponse::failure(request.id.clone(), name, code, message)
                }
            };
            let mut out = serde_json::to_string(&response).unwrap();
            out.push('\n');
            if server_w.write_all(out.as_bytes()).await.is_err() {
                break;
            }
            if matches!(request.command, Command::Quit) {
                break;
            }
        }
    });

    DriverConnection::attach(client_w, client_r)
}
