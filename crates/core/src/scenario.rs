//! Declarative YAML verification scenarios.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::LoadError;

/// One verification case: where to go, what to clear away, what to do, and
/// what must hold afterwards.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Scenario {
    /// Unique name within a run; its slug names the artifact directory.
    pub name: String,

    /// Absolute URL, or a path joined to the run's base URL.
    pub url: String,

    /// Human-readable description.
    #[serde(default)]
    pub description: String,

    /// Navigation deadline in milliseconds; the run-level default applies
    /// when absent.
    #[serde(default)]
    pub nav_timeout_ms: Option<u64>,

    /// Browser viewport; the driver default applies when absent.
    #[serde(default)]
    pub viewport: Option<Viewport>,

    /// localStorage entries seeded before the first navigation.
    #[serde(default)]
    pub storage: BTreeMap<String, String>,

    /// Steps that clear onboarding dialogs and overlays before interactions.
    #[serde(default)]
    pub dismiss: Vec<DismissAction>,

    /// Interactions applied in order.
    #[serde(default)]
    pub steps: Vec<Interaction>,

    /// Checked in order after the steps; at least one is required.
    pub assertions: Vec<Assertion>,

    /// Screenshots captured after the assertions.
    #[serde(default)]
    pub artifacts: Vec<ArtifactRequest>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Viewport {
    pub width: u32,
    pub height: u32,
}

/// A declared dismissal step. Replaces ad hoc dialog-removal hacks: the
/// intent is part of the scenario data.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum DismissAction {
    /// Send a key to the page, optionally waiting for a dialog to go away.
    Press {
        key: String,
        #[serde(default)]
        until_hidden: Option<String>,
        #[serde(default)]
        timeout_ms: Option<u64>,
    },

    /// Click a dismissal control. With `if_visible` the step is a no-op when
    /// the target is not currently visible (dialogs that may not appear).
    Click {
        selector: String,
        #[serde(default)]
        if_visible: bool,
        #[serde(default)]
        timeout_ms: Option<u64>,
    },
}

/// A single simulated user action.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum Interaction {
    Click {
        selector: String,
        /// Permission for one forced retry when the click is obscured.
        #[serde(default)]
        force: bool,
        #[serde(default)]
        timeout_ms: Option<u64>,
    },

    Fill {
        selector: String,
        value: String,
        #[serde(default)]
        timeout_ms: Option<u64>,
    },

    /// Key press sent to the page, not to an element.
    Press {
        key: String,
    },

    Hover {
        selector: String,
        #[serde(default)]
        force: bool,
        #[serde(default)]
        timeout_ms: Option<u64>,
    },

    Focus {
        selector: String,
        #[serde(default)]
        timeout_ms: Option<u64>,
    },

    /// Select an option from a dropdown by value.
    Select {
        selector: String,
        value: String,
        #[serde(default)]
        timeout_ms: Option<u64>,
    },
}

impl Interaction {
    /// Target selector, when the interaction has one.
    pub fn selector(&self) -> Option<&str> {
        match self {
            Interaction::Click { selector, .. }
            | Interaction::Fill { selector, .. }
            | Interaction::Hover { selector, .. }
            | Interaction::Focus { selector, .. }
            | Interaction::Select { selector, .. } => Some(selector),
            Interaction::Press { .. } => None,
        }
    }

    /// Per-step wait override.
    pub fn timeout_override(&self) -> Option<u64> {
        match self {
            Interaction::Click { timeout_ms, .. }
            | Interaction::Fill { timeout_ms, .. }
            | Interaction::Hover { timeout_ms, .. }
            | Interaction::Focus { timeout_ms, .. }
            | Interaction::Select { timeout_ms, .. } => *timeout_ms,
            Interaction::Press { .. } => None,
        }
    }

    /// Short human description used in logs and failure messages.
    pub fn describe(&self) -> String {
        match self {
            Interaction::Click { selector, .. } => format!("click '{selector}'"),
            Interaction::Fill { selector, .. } => format!("fill '{selector}'"),
            Interaction::Press { key } => format!("press '{key}'"),
            Interaction::Hover { selector, .. } => format!("hover '{selector}'"),
            Interaction::Focus { selector, .. } => format!("focus '{selector}'"),
            Interaction::Select { selector, value, .. } => {
                format!("select '{value}' in '{selector}'")
            }
        }
    }
}

/// A predicate over current page state.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "check", rename_all = "snake_case")]
pub enum Assertion {
    /// At least one match exists and the first match is visible.
    Visible {
        selector: String,
        #[serde(default)]
        timeout_ms: Option<u64>,
    },

    /// No match exists, or the first match is not visible.
    Hidden {
        selector: String,
        #[serde(default)]
        timeout_ms: Option<u64>,
    },

    /// An attribute of the first match equals the expected string.
    Attribute {
        selector: String,
        name: String,
        expected: String,
        #[serde(default)]
        timeout_ms: Option<u64>,
    },

    /// The page text contains the given string.
    Text {
        text: String,
        #[serde(default)]
        timeout_ms: Option<u64>,
    },

    /// The input value of the first match equals the expected string.
    Value {
        selector: String,
        expected: String,
        #[serde(default)]
        timeout_ms: Option<u64>,
    },

    /// A computed style property equals the expected string. Checked as a
    /// single snapshot once the element exists; `timeout_ms` bounds only the
    /// element wait.
    Style {
        selector: String,
        property: String,
        expected: String,
        #[serde(default)]
        timeout_ms: Option<u64>,
    },
}

impl Assertion {
    pub fn timeout_override(&self) -> Option<u64> {
        match self {
            Assertion::Visible { timeout_ms, .. }
            | Assertion::Hidden { timeout_ms, .. }
            | Assertion::Attribute { timeout_ms, .. }
            | Assertion::Text { timeout_ms, .. }
            | Assertion::Value { timeout_ms, .. }
            | Assertion::Style { timeout_ms, .. } => *timeout_ms,
        }
    }

    pub fn describe(&self) -> String {
        match self {
            Assertion::Visible { selector, .. } => format!("'{selector}' is visible"),
            Assertion::Hidden { selector, .. } => format!("'{selector}' is hidden"),
            Assertion::Attribute {
                selector,
                name,
                expected,
                ..
            } => format!("attribute '{name}' of '{selector}' equals \"{expected}\""),
            Assertion::Text { text, .. } => format!("page text contains \"{text}\""),
            Assertion::Value {
                selector, expected, ..
            } => format!("value of '{selector}' equals \"{expected}\""),
            Assertion::Style {
                selector,
                property,
                expected,
                ..
            } => format!("style '{property}' of '{selector}' equals \"{expected}\""),
        }
    }
}

/// A screenshot capture point.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArtifactRequest {
    /// File stem under the scenario's artifact directory.
    pub name: String,
    #[serde(default)]
    pub full_page: bool,
}

impl Scenario {
    /// Parse a scenario from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self, LoadError> {
        Self::from_yaml_named(yaml, "<inline>")
    }

    fn from_yaml_named(yaml: &str, path: &str) -> Result<Self, LoadError> {
        let scenario: Scenario = serde_yaml::from_str(yaml).map_err(|source| LoadError::Yaml {
            path: path.to_string(),
            source,
        })?;
        scenario.validate(path)?;
        Ok(scenario)
    }

    /// Parse and validate a scenario file.
    pub fn from_file(path: &Path) -> Result<Self, LoadError> {
        let display = path.display().to_string();
        let content = std::fs::read_to_string(path).map_err(|source| LoadError::Io {
            path: display.clone(),
            source,
        })?;
        Self::from_yaml_named(&content, &display)
    }

    /// Filesystem-safe slug of the scenario name, used for artifact paths.
    pub fn slug(&self) -> String {
        slugify(&self.name)
    }

    fn validate(&self, path: &str) -> Result<(), LoadError> {
        let invalid = |message: String| LoadError::Invalid {
            path: path.to_string(),
            message,
        };

        if self.name.trim().is_empty() {
            return Err(invalid("scenario name must not be empty".into()));
        }
        if self.slug().is_empty() {
            return Err(invalid(format!(
                "scenario name '{}' has no filesystem-safe characters",
                self.name
            )));
        }
        if self.url.trim().is_empty() {
            return Err(invalid("url must not be empty".into()));
        }
        if self.assertions.is_empty() {
            return Err(invalid("at least one assertion is required".into()));
        }

        for (i, action) in self.dismiss.iter().enumerate() {
            let selector = match action {
                DismissAction::Press { until_hidden, .. } => until_hidden.as_deref(),
                DismissAction::Click { selector, .. } => Some(selector.as_str()),
            };
            if selector.is_some_and(|sel| sel.trim().is_empty()) {
                return Err(invalid(format!("dismiss step {} has an empty selector", i + 1)));
            }
        }

        for (i, step) in self.steps.iter().enumerate() {
            if step.selector().is_some_and(|sel| sel.trim().is_empty()) {
                return Err(invalid(format!("step {} has an empty selector", i + 1)));
            }
        }

        for (i, assertion) in self.assertions.iter().enumerate() {
            let selector = match assertion {
                Assertion::Visible { selector, .. }
                | Assertion::Hidden { selector, .. }
                | Assertion::Attribute { selector, .. }
                | Assertion::Value { selector, .. }
                | Assertion::Style { selector, .. } => Some(selector.as_str()),
                Assertion::Text { text, .. } => {
                    if text.is_empty() {
                        return Err(invalid(format!("assertion {} has an empty text", i + 1)));
                    }
                    None
                }
            };
            if selector.is_some_and(|sel| sel.trim().is_empty()) {
                return Err(invalid(format!("assertion {} has an empty selector", i + 1)));
            }
        }

        for artifact in &self.artifacts {
            if slugify(&artifact.name).is_empty() {
                return Err(invalid(format!(
                    "artifact name '{}' has no filesystem-safe characters",
                    artifact.name
                )));
            }
        }

        Ok(())
    }
}

/// Load one scenario file, or every `.yaml`/`.yml` under a directory in
/// sorted path order. Scenario names must be unique across the set.
pub fn load_path(path: &Path) -> Result<Vec<Scenario>, LoadError> {
    let files = scenario_files(path);
    if files.is_empty() {
        return Err(LoadError::NoScenarios {
            path: path.display().to_string(),
        });
    }

    let mut scenarios = Vec::with_capacity(files.len());
    for file in &files {
        scenarios.push(Scenario::from_file(file)?);
    }
    check_unique_names(&scenarios, path)?;
    Ok(scenarios)
}

/// Like [`load_path`], but collects every error instead of stopping at the
/// first bad file. Backs `verdict validate`, which reports a whole suite in
/// one pass.
pub fn validate_path(path: &Path) -> (Vec<Scenario>, Vec<LoadError>) {
    let files = scenario_files(path);
    if files.is_empty() {
        let error = LoadError::NoScenarios {
            path: path.display().to_string(),
        };
        return (Vec::new(), vec![error]);
    }

    let mut scenarios = Vec::new();
    let mut errors = Vec::new();
    for file in &files {
        match Scenario::from_file(file) {
            Ok(scenario) => scenarios.push(scenario),
            Err(e) => errors.push(e),
        }
    }
    if let Err(e) = check_unique_names(&scenarios, path) {
        errors.push(e);
    }
    (scenarios, errors)
}

fn scenario_files(path: &Path) -> Vec<PathBuf> {
    if !path.is_dir() {
        return vec![path.to_path_buf()];
    }
    walkdir::WalkDir::new(path)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .map(|e| e.into_path())
        .filter(|p| {
            p.extension()
                .map(|ext| ext == "yaml" || ext == "yml")
                .unwrap_or(false)
        })
        .collect()
}

/// Slugs must be unique: artifact directories are keyed by slug, and two
/// scenarios sharing one would overwrite each other's captures.
fn check_unique_names(scenarios: &[Scenario], path: &Path) -> Result<(), LoadError> {
    let mut seen: HashMap<String, String> = HashMap::new();
    for scenario in scenarios {
        if seen.insert(scenario.slug(), scenario.name.clone()).is_some() {
            return Err(LoadError::DuplicateName {
                name: scenario.name.clone(),
                path: path.display().to_string(),
            });
        }
    }
    Ok(())
}

/// Lowercased name with every non-alphanumeric run collapsed to one '-'.
pub fn slugify(name: &str) -> String {
    let mut slug = String::with_capacity(name.len());
    let mut last_dash = true;
    for c in name.chars() {
        if c.is_ascii_alphanumeric() {
            slug.push(c.to_ascii_lowercase());
            last_dash = false;
        } else if !last_dash {
            slug.push('-');
            last_dash = true;
        }
    }
    while slug.ends_with('-') {
        slug.pop();
    }
    slug
}
