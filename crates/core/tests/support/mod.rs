//! An in-memory driver with a mutable fake page, for end-to-end runner
//! tests. Each session gets a fresh clone of the page template, mirroring a
//! real browser context starting from a clean profile.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, duplex};
use tokio::time::Instant;
use verdict_protocol::{Command, DriverRequest, DriverResponse, ErrorCode};
use verdict_runtime::DriverConnection;

#[derive(Debug, Clone)]
pub struct FakeElement {
    visible: bool,
    attributes: HashMap<String, String>,
    value: String,
    styles: HashMap<String, String>,
    text: String,
    /// A forced click gets through; an unforced one reports ELEMENT_OBSCURED.
    obscured: bool,
    /// Becomes visible this long after navigation, regardless of `visible`.
    reveal_after: Option<Duration>,
}

impl FakeElement {
    pub fn visible() -> Self {
        Self {
            visible: true,
            attributes: HashMap::new(),
            value: String::new(),
            styles: HashMap::new(),
            text: String::new(),
            obscured: false,
            reveal_after: None,
        }
    }

    pub fn hidden() -> Self {
        Self {
            visible: false,
            ..Self::visible()
        }
    }

    pub fn attr(mut self, name: &str, value: &str) -> Self {
        self.attributes.insert(name.to_string(), value.to_string());
        self
    }

    pub fn value(mut self, value: &str) -> Self {
        self.value = value.to_string();
        self
    }

    pub fn style(mut self, property: &str, value: &str) -> Self {
        self.styles.insert(property.to_string(), value.to_string());
        self
    }

    pub fn obscured(mut self) -> Self {
        self.obscured = true;
        self
    }

    pub fn reveal_after(mut self, delay: Duration) -> Self {
        self.reveal_after = Some(delay);
        self
    }

    fn visible_at(&self, navigated_at: Option<Instant>) -> bool {
        match (self.reveal_after, navigated_at) {
            (Some(delay), Some(at)) => at.elapsed() >= delay,
            (Some(_), None) => false,
            (None, _) => self.visible,
        }
    }
}

/// State change applied when a selector is clicked.
#[derive(Debug, Clone)]
pub enum PageMutation {
    Show(String),
    Hide(String),
    SetAttribute {
        selector: String,
        name: String,
        value: String,
    },
}

/// Template page model; selectors are exact-match keys.
#[derive(Debug, Clone, Default)]
pub struct FakePage {
    elements: HashMap<String, FakeElement>,
    body_text: String,
    on_click: HashMap<String, Vec<PageMutation>>,
}

impl FakePage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn body_text(mut self, text: &str) -> Self {
        self.body_text = text.to_string();
        self
    }

    pub fn element(mut self, selector: &str, element: FakeElement) -> Self {
        self.elements.insert(selector.to_string(), element);
        self
    }

    pub fn on_click(mut self, selector: &str, mutation: PageMutation) -> Self {
        self.on_click
            .entry(selector.to_string())
            .or_default()
            .push(mutation);
        self
    }
}

/// Counters shared across every session the driver serves.
#[derive(Debug, Clone, Default)]
pub struct DriverStats {
    launches: Arc<AtomicUsize>,
    quits: Arc<AtomicUsize>,
    clicks: Arc<AtomicUsize>,
    forced_clicks: Arc<AtomicUsize>,
    commands: Arc<Mutex<Vec<String>>>,
    seeded: Arc<Mutex<Vec<BTreeMap<String, String>>>>,
}

impl DriverStats {
    pub fn launches(&self) -> usize {
        self.launches.load(Ordering::SeqCst)
    }

    pub fn quits(&self) -> usize {
        self.quits.load(Ordering::SeqCst)
    }

    pub fn clicks(&self) -> usize {
        self.clicks.load(Ordering::SeqCst)
    }

    pub fn forced_clicks(&self) -> usize {
        self.forced_clicks.load(Ordering::SeqCst)
    }

    /// Command names in arrival order. Only meaningful for sequential runs.
    pub fn command_names(&self) -> Vec<String> {
        self.commands.lock().unwrap().clone()
    }

    /// localStorage payloads received, one per storage command.
    pub fn seeded(&self) -> Vec<BTreeMap<String, String>> {
        self.seeded.lock().unwrap().clone()
    }
}

pub struct FakeDriver {
    page: FakePage,
    stats: DriverStats,
    /// Hard-disconnect (no response, pipes dropped) when this command
    /// arrives. Simulates a crashed driver.
    hang_up_on: Option<&'static str>,
}

impl FakeDriver {
    pub fn new(page: FakePage) -> Self {
        Self {
            page,
            stats: DriverStats::default(),
            hang_up_on: None,
        }
    }

    pub fn hang_up_on(mut self, command: &'static str) -> Self {
        self.hang_up_on = Some(command);
        self
    }

    pub fn stats(&self) -> DriverStats {
        self.stats.clone()
    }

    /// Connector compatible with `runner::run_with_connector`: every call
    /// serves a new session over fresh in-memory pipes.
    pub fn connector(
        &self,
    ) -> impl Fn() -> std::future::Ready<verdict_runtime::Result<DriverConnection>>
    + Clone
    + Send
    + Sync
    + 'static {
        let page = self.page.clone();
        let stats = self.stats.clone();
        let hang_up_on = self.hang_up_on;
        move || std::future::ready(Ok(spawn_session(page.clone(), stats.clone(), hang_up_on)))
    }
}

struct SessionState {
    page: FakePage,
    navigated_at: Option<Instant>,
}

fn spawn_session(
    page: FakePage,
    stats: DriverStats,
    hang_up_on: Option<&'static str>,
) -> DriverConnection {
    let (client_w, server_r) = duplex(64 * 1024);
    let (mut server_w, client_r) = duplex(64 * 1024);

    tokio::spawn(async move {
        let mut state = SessionState {
            page,
            navigated_at: None,
        };
        let mut lines = BufReader::new(server_r).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            let request: DriverRequest =
                serde_json::from_str(&line).expect("well-formed driver request");
            let name = request.command.name();
            stats.commands.lock().unwrap().push(name.to_string());
            if hang_up_on == Some(name) {
                break;
            }
            let quitting = matches!(request.command, Command::Quit);
            let response = state.handle(&request, &stats);
            let mut out = serde_json::to_string(&response).unwrap();
            out.push('\n');
            if server_w.write_all(out.as_bytes()).await.is_err() {
                break;
            }
            if quitting {
                break;
            }
        }
    });

    DriverConnection::attach(client_w, client_r)
}

impl SessionState {
    fn handle(&mut self, request: &DriverRequest, stats: &DriverStats) -> DriverResponse {
        let id = request.id.clone();
        let name = request.command.name();
        let ok = |data| DriverResponse::success(id.clone(), name, data);
        let ok_empty = || DriverResponse::success_empty(id.clone(), name);
        let fail =
            |code, message: &str| DriverResponse::failure(id.clone(), name, code, message);

        match &request.command {
            Command::Ping => ok(serde_json::json!({"version": "fake-driver 1.0"})),
            Command::Launch { .. } => {
                stats.launches.fetch_add(1, Ordering::SeqCst);
                ok_empty()
            }
            Command::Viewport { .. } => ok_empty(),
            Command::Storage { entries } => {
                stats.seeded.lock().unwrap().push(entries.clone());
                ok_empty()
            }
            Command::Navigate { .. } => {
                self.navigated_at = Some(Instant::now());
                ok_empty()
            }
            Command::Query { selector } => match self.page.elements.get(selector) {
                None => ok(serde_json::json!({"count": 0, "visible": false})),
                Some(element) => ok(serde_json::json!({
                    "count": 1,
                    "visible": element.visible_at(self.navigated_at),
                })),
            },
            Command::Click { selector, force } => {
                stats.clicks.fetch_add(1, Ordering::SeqCst);
                if *force {
                    stats.forced_clicks.fetch_add(1, Ordering::SeqCst);
                }
                let obscured = match self.page.elements.get(selector) {
                    None => {
                        return fail(ErrorCode::ElementNotFound, "no element matches selector");
                    }
                    Some(element) => element.obscured,
                };
                if obscured && !force {
                    return fail(
                        ErrorCode::ElementObscured,
                        "another element intercepts pointer events",
                    );
                }
                for mutation in self
                    .page
                    .on_click
                    .get(selector)
                    .cloned()
                    .unwrap_or_default()
                {
                    self.apply(&mutation);
                }
                ok_empty()
            }
            Command::Fill { selector, value } => match self.page.elements.get_mut(selector) {
                None => fail(ErrorCode::ElementNotFound, "no element matches selector"),
                Some(element) => {
                    element.value = value.clone();
                    ok_empty()
                }
            },
            Command::Press { .. } => ok_empty(),
            Command::Hover { selector, .. }
            | Command::Focus { selector }
            | Command::Select { selector, .. } => {
                if self.page.elements.contains_key(selector) {
                    ok_empty()
                } else {
                    fail(ErrorCode::ElementNotFound, "no element matches selector")
                }
            }
            Command::Attribute { selector, name: attr } => {
                match self.page.elements.get(selector) {
                    None => fail(ErrorCode::ElementNotFound, "no element matches selector"),
                    Some(element) => ok(serde_json::json!({
                        "value": element.attributes.get(attr),
                    })),
                }
            }
            Command::Text { selector } => match selector {
                None => ok(serde_json::json!({"text": self.page.body_text})),
                Some(selector) => match self.page.elements.get(selector) {
                    None => fail(ErrorCode::ElementNotFound, "no element matches selector"),
                    Some(element) => ok(serde_json::json!({"text": element.text})),
                },
            },
            Command::Style { selector, property } => match self.page.elements.get(selector) {
                None => fail(ErrorCode::ElementNotFound, "no element matches selector"),
                Some(element) => ok(serde_json::json!({
                    "value": element.styles.get(property).cloned().unwrap_or_default(),
                })),
            },
            Command::Value { selector } => match self.page.elements.get(selector) {
                None => fail(ErrorCode::ElementNotFound, "no element matches selector"),
                Some(element) => ok(serde_json::json!({"value": element.value})),
            },
            Command::Screenshot { path, .. } => {
                if std::fs::write(path, b"\x89PNG fake image data").is_err() {
                    return fail(ErrorCode::ScreenshotFailed, "cannot write image file");
                }
                ok(serde_json::json!({"path": path}))
            }
            Command::Quit => {
                stats.quits.fetch_add(1, Ordering::SeqCst);
                ok_empty()
            }
        }
    }

    fn apply(&mut self, mutation: &PageMutation) {
        match mutation {
            PageMutation::Show(selector) => {
                if let Some(element) = self.page.elements.get_mut(selector) {
                    element.visible = true;
                    element.reveal_after = None;
                }
            }
            PageMutation::Hide(selector) => {
                if let Some(element) = self.page.elements.get_mut(selector) {
                    element.visible = false;
                    element.reveal_after = None;
                }
            }
            PageMutation::SetAttribute {
                selector,
                name,
                value,
            } => {
                if let Some(element) = self.page.elements.get_mut(selector) {
                    element.attributes.insert(name.clone(), value.clone());
                }
            }
        }
    }
}
