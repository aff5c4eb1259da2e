//! Declarative YAML scenario specification

use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use walkdir::WalkDir;

use crate::error::{E2eError, E2eResult};
use crate::locator::{Locator, MatchMode};

/// Directory name skipped when scanning for scenarios
pub const FRAGMENTS_DIR: &str = "fragments";

/// One end-to-end journey parsed from YAML
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Scenario {
    /// Unique name for this scenario
    pub name: String,

    /// Human-readable description
    #[serde(default)]
    pub description: String,

    /// Tags for filtering
    #[serde(default)]
    pub tags: Vec<String>,

    /// Relative `navigate` urls are joined onto this
    #[serde(default)]
    pub base_url: Option<String>,

    /// Viewport size for the browser
    #[serde(default = "default_viewport")]
    pub viewport: Viewport,

    /// Default timeout for steps that wait (ms)
    #[serde(default)]
    pub timeout_ms: Option<u64>,

    /// Default variable values
    #[serde(default)]
    pub vars: BTreeMap<String, String>,

    /// Steps to execute in order
    pub steps: Vec<Step>,
}

fn default_viewport() -> Viewport {
    Viewport { width: 1280, height: 720 }
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Viewport {
    pub width: u32,
    pub height: u32,
}

/// A single step in a scenario
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum Step {
    /// Load a URL and wait for the `load` event
    Navigate {
        url: String,
        #[serde(default)]
        timeout_ms: Option<u64>,
    },

    GoBack,

    GoForward,

    /// Set an input's value
    Fill {
        selector: Locator,
        value: String,
    },

    /// Type text key by key
    Type {
        selector: Locator,
        text: String,
        #[serde(default)]
        delay_ms: Option<u64>,
    },

    Click {
        selector: Locator,
        #[serde(default)]
        delay_ms: Option<u64>,
        #[serde(default)]
        timeout_ms: Option<u64>,
    },

    Check {
        selector: Locator,
    },

    Uncheck {
        selector: Locator,
    },

    Hover {
        selector: Locator,
    },

    /// Choose a dropdown option by `value` or visible `label`
    SelectOption {
        selector: Locator,
        #[serde(default)]
        value: Option<String>,
        #[serde(default)]
        label: Option<String>,
    },

    /// Wait for an element to reach a state
    WaitFor {
        selector: Locator,
        #[serde(default)]
        state: WaitState,
        #[serde(default)]
        timeout_ms: Option<u64>,
    },

    AssertText {
        selector: Locator,
        text: String,
        #[serde(rename = "match", default)]
        mode: MatchMode,
        #[serde(default)]
        timeout_ms: Option<u64>,
    },

    /// Passes once the element reaches the visibility state, times out otherwise
    AssertVisible {
        selector: Locator,
        #[serde(default = "default_true")]
        visible: bool,
        #[serde(default)]
        timeout_ms: Option<u64>,
    },

    AssertChecked {
        selector: Locator,
        #[serde(default = "default_true")]
        checked: bool,
    },

    AssertAttribute {
        selector: Locator,
        name: String,
        value: String,
    },

    AssertValue {
        selector: Locator,
        value: String,
    },

    AssertTitle {
        title: String,
        #[serde(rename = "match", default)]
        mode: MatchMode,
    },

    SetAttribute {
        selector: Locator,
        name: String,
        value: String,
    },

    /// Register how native dialogs are answered from now on
    HandleDialog {
        #[serde(default = "default_true")]
        accept: bool,
        #[serde(default)]
        prompt_text: Option<String>,
    },

    /// Wait for a tab opened by an earlier click and make it active
    WaitForNewPage {
        #[serde(default)]
        timeout_ms: Option<u64>,
    },

    /// Resolve following locators inside an iframe
    EnterFrame {
        selector: Locator,
    },

    ExitFrame,

    /// Scan candidates in document order and click the first whose text matches
    ClickMatching {
        selector: Locator,
        /// Element inside each candidate whose text is compared
        #[serde(default)]
        text_of: Option<Locator>,
        text: String,
        #[serde(rename = "match", default)]
        mode: MatchMode,
        /// Element inside the matched candidate to click
        #[serde(default)]
        then_click: Option<Locator>,
    },

    /// Store an element's text (or the page title without a selector) into a variable
    Capture {
        var: String,
        #[serde(default)]
        selector: Option<Locator>,
        #[serde(default)]
        non_empty: bool,
    },

    Log {
        message: String,
    },

    /// Splice in a named fragment
    Use {
        fragment: String,
        #[serde(default, rename = "with")]
        args: BTreeMap<String, String>,
    },
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WaitState {
    #[default]
    Visible,
    Hidden,
    Attached,
    Detached,
}

impl WaitState {
    pub fn as_str(&self) -> &'static str {
        match self {
            WaitState::Visible => "visible",
            WaitState::Hidden => "hidden",
            WaitState::Attached => "attached",
            WaitState::Detached => "detached",
        }
    }
}

/// A reusable, parameterized step list
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Fragment {
    pub name: String,

    #[serde(default)]
    pub description: String,

    /// Parameters that callers must supply via `with`
    #[serde(default)]
    pub params: Vec<String>,

    pub steps: Vec<Step>,
}

impl Step {
    /// Short name used in logs and results
    pub fn name(&self) -> String {
        match self {
            Step::Navigate { url, .. } => format!("navigate:{}", url),
            Step::GoBack => "go_back".to_string(),
            Step::GoForward => "go_forward".to_string(),
            Step::Fill { selector, .. } => format!("fill:{}", selector),
            Step::Type { selector, .. } => format!("type:{}", selector),
            Step::Click { selector, .. } => format!("click:{}", selector),
            Step::Check { selector } => format!("check:{}", selector),
            Step::Uncheck { selector } => format!("uncheck:{}", selector),
            Step::Hover { selector } => format!("hover:{}", selector),
            Step::SelectOption { selector, .. } => format!("select_option:{}", selector),
            Step::WaitFor { selector, state, .. } => {
                format!("wait_for:{}:{}", selector, state.as_str())
            }
            Step::AssertText { selector, .. } => format!("assert_text:{}", selector),
            Step::AssertVisible { selector, .. } => format!("assert_visible:{}", selector),
            Step::AssertChecked { selector, .. } => format!("assert_checked:{}", selector),
            Step::AssertAttribute { selector, name, .. } => {
                format!("assert_attribute:{}[{}]", selector, name)
            }
            Step::AssertValue { selector, .. } => format!("assert_value:{}", selector),
            Step::AssertTitle { .. } => "assert_title".to_string(),
            Step::SetAttribute { selector, name, .. } => {
                format!("set_attribute:{}[{}]", selector, name)
            }
            Step::HandleDialog { accept, .. } => {
                format!("handle_dialog:{}", if *accept { "accept" } else { "dismiss" })
            }
            Step::WaitForNewPage { .. } => "wait_for_new_page".to_string(),
            Step::EnterFrame { selector } => format!("enter_frame:{}", selector),
            Step::ExitFrame => "exit_frame".to_string(),
            Step::ClickMatching { selector, text, .. } => {
                format!("click_matching:{}={}", selector, text)
            }
            Step::Capture { var, .. } => format!("capture:{}", var),
            Step::Log { message } => {
                format!("log:{}", message.chars().take(30).collect::<String>())
            }
            Step::Use { fragment, .. } => format!("use:{}", fragment),
        }
    }

    fn validate(&self, scenario: &str) -> E2eResult<()> {
        if let Step::SelectOption { selector, value, label } = self {
            if value.is_some() == label.is_some() {
                return Err(E2eError::SpecParse(format!(
                    "{}: select_option on {} needs exactly one of `value` or `label`",
                    scenario, selector
                )));
            }
        }
        Ok(())
    }
}

impl Scenario {
    /// Parse a scenario from YAML string
    pub fn from_yaml(yaml: &str) -> E2eResult<Self> {
        let scenario: Self = serde_yaml::from_str(yaml)?;
        scenario.validate()?;
        Ok(scenario)
    }

    /// Parse a scenario from a YAML file
    pub fn from_file(path: &Path) -> E2eResult<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
            .map_err(|e| E2eError::SpecParse(format!("{}: {}", path.display(), e)))
    }

    /// Load all scenarios below a directory, skipping the fragments folder
    pub fn load_all(dir: &Path) -> E2eResult<Vec<Self>> {
        if !dir.is_dir() {
            return Err(E2eError::Config(format!(
                "scenario directory {} does not exist",
                dir.display()
            )));
        }

        let mut scenarios: Vec<Self> = Vec::new();
        let mut names = HashSet::new();

        for path in yaml_files(dir, true)? {
            let scenario = Self::from_file(&path)?;
            if !names.insert(scenario.name.clone()) {
                return Err(E2eError::SpecParse(format!(
                    "duplicate scenario name '{}' in {}",
                    scenario.name,
                    path.display()
                )));
            }
            scenarios.push(scenario);
        }

        Ok(scenarios)
    }

    fn validate(&self) -> E2eResult<()> {
        if self.name.trim().is_empty() {
            return Err(E2eError::SpecParse("scenario name is empty".to_string()));
        }
        if self.steps.is_empty() {
            return Err(E2eError::SpecParse(format!("{}: scenario has no steps", self.name)));
        }
        for step in &self.steps {
            step.validate(&self.name)?;
        }
        Ok(())
    }
}

impl Fragment {
    pub fn from_yaml(yaml: &str) -> E2eResult<Self> {
        let fragment: Self = serde_yaml::from_str(yaml)?;
        for step in &fragment.steps {
            step.validate(&fragment.name)?;
        }
        Ok(fragment)
    }

    /// Load every fragment in a directory, keyed by name. A missing directory yields none.
    pub fn load_all(dir: &Path) -> E2eResult<BTreeMap<String, Self>> {
        let mut fragments = BTreeMap::new();
        if !dir.exists() {
            return Ok(fragments);
        }

        for path in yaml_files(dir, false)? {
            let content = std::fs::read_to_string(&path)?;
            let fragment = Self::from_yaml(&content)
                .map_err(|e| E2eError::SpecParse(format!("{}: {}", path.display(), e)))?;
            if fragments.contains_key(&fragment.name) {
                return Err(E2eError::SpecParse(format!(
                    "duplicate fragment name '{}' in {}",
                    fragment.name,
                    path.display()
                )));
            }
            fragments.insert(fragment.name.clone(), fragment);
        }

        Ok(fragments)
    }
}

fn yaml_files(dir: &Path, skip_fragments: bool) -> E2eResult<Vec<PathBuf>> {
    let mut files = Vec::new();
    let walker = WalkDir::new(dir).sort_by_file_name().into_iter().filter_entry(|e| {
        !(skip_fragments
            && e.depth() > 0
            && e.file_type().is_dir()
            && e.file_name() == FRAGMENTS_DIR)
    });

    for entry in walker {
        let entry = entry.map_err(std::io::Error::from)?;
        let is_yaml = entry
            .path()
            .extension()
            .map(|ext| ext == "yaml" || ext == "yml")
            .unwrap_or(false);
        if entry.file_type().is_file() && is_yaml {
            files.push(entry.into_path());
        }
    }

    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_login_scenario() {
        let yaml = r#"
name: login-practice
description: Sign in on the practice login page
tags:
  - smoke
  - login
steps:
  - action: navigate
    url: https://rahulshettyacademy.com/loginpagePractise
  - action: fill
    selector: '#username'
    value: rahulshetty
  - action: fill
    selector: "[type='password']"
    value: learning
  - action: click
    selector: '#signInBtn'
  - action: assert_visible
    selector: "[style*='block']"
    timeout_ms: 5000
"#;
        let scenario = Scenario::from_yaml(yaml).unwrap();
        assert_eq!(scenario.name, "login-practice");
        assert_eq!(scenario.steps.len(), 5);
        assert_eq!(scenario.viewport, Viewport { width: 1280, height: 720 });
        assert_eq!(
            scenario.steps[1],
            Step::Fill { selector: "#username".into(), value: "rahulshetty".to_string() }
        );
        match &scenario.steps[4] {
            Step::AssertVisible { visible, timeout_ms, .. } => {
                assert!(*visible);
                assert_eq!(*timeout_ms, Some(5000));
            }
            other => panic!("unexpected step {:?}", other),
        }
    }

    #[test]
    fn test_parse_selection_and_frame_steps() {
        let yaml = r#"
name: mixed
steps:
  - action: handle_dialog
  - action: enter_frame
    selector: '#courses-iframe'
  - action: exit_frame
  - action: click_matching
    selector: .ta-results button
    text: " India"
  - action: click_matching
    selector: tbody tr
    text_of: th
    text: ${order_id}
    match: contained_in
    then_click: button
  - action: wait_for
    selector: '#displayed-text'
    state: hidden
"#;
        let scenario = Scenario::from_yaml(yaml).unwrap();
        assert_eq!(scenario.steps[0], Step::HandleDialog { accept: true, prompt_text: None });
        assert_eq!(scenario.steps[2], Step::ExitFrame);
        match &scenario.steps[3] {
            Step::ClickMatching { text, mode, text_of, .. } => {
                assert_eq!(text, " India");
                assert_eq!(*mode, MatchMode::Exact);
                assert!(text_of.is_none());
            }
            other => panic!("unexpected step {:?}", other),
        }
        match &scenario.steps[4] {
            Step::ClickMatching { mode, then_click, .. } => {
                assert_eq!(*mode, MatchMode::ContainedIn);
                assert_eq!(then_click.as_ref().map(Locator::as_str), Some("button"));
            }
            other => panic!("unexpected step {:?}", other),
        }
        assert_eq!(scenario.steps[5].name(), "wait_for:#displayed-text:hidden");
    }

    #[test]
    fn test_select_option_needs_one_choice() {
        let yaml = r#"
name: bad-select
steps:
  - action: select_option
    selector: select.form-control
"#;
        let err = Scenario::from_yaml(yaml).unwrap_err();
        assert!(matches!(err, E2eError::SpecParse(_)));
    }

    #[test]
    fn test_empty_steps_rejected() {
        let err = Scenario::from_yaml("name: nothing\nsteps: []\n").unwrap_err();
        assert!(err.to_string().contains("no steps"));
    }

    #[test]
    fn test_load_all_skips_fragments_and_sorts() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("b.yaml"), "name: b\nsteps:\n  - action: go_back\n")
            .unwrap();
        std::fs::write(
            dir.path().join("a.yml"),
            "name: a\ntags: [smoke]\nsteps:\n  - action: go_forward\n",
        )
        .unwrap();
        std::fs::write(dir.path().join("notes.txt"), "ignored").unwrap();
        std::fs::create_dir(dir.path().join(FRAGMENTS_DIR)).unwrap();
        std::fs::write(
            dir.path().join(FRAGMENTS_DIR).join("f.yaml"),
            "name: f\nsteps:\n  - action: go_back\n",
        )
        .unwrap();

        let scenarios = Scenario::load_all(dir.path()).unwrap();
        let names: Vec<_> = scenarios.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["a", "b"]);
        assert_eq!(scenarios[0].tags, vec!["smoke"]);

        let fragments = Fragment::load_all(&dir.path().join(FRAGMENTS_DIR)).unwrap();
        assert!(fragments.contains_key("f"));
    }

    #[test]
    fn test_duplicate_names_rejected() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("one.yaml"), "name: same\nsteps:\n  - action: go_back\n")
            .unwrap();
        std::fs::write(dir.path().join("two.yaml"), "name: same\nsteps:\n  - action: go_back\n")
            .unwrap();
        assert!(Scenario::load_all(dir.path()).is_err());
    }

    #[test]
    fn test_missing_fragment_dir_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let fragments = Fragment::load_all(&dir.path().join("nope")).unwrap();
        assert!(fragments.is_empty());
    }

    #[test]
    fn test_missing_scenario_dir_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = Scenario::load_all(&dir.path().join("scenarois")).unwrap_err();
        assert!(matches!(err, E2eError::Config(ref m) if m.contains("scenarois")), "{:?}", err);
        assert_eq!(err.kind(), "setup");
    }
}
