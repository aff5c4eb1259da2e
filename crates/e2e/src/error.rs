//! Error types for journey execution

use thiserror::Error;

#[derive(Error, Debug)]
pub enum E2eError {
    #[error("Playwright not found. Install with: npm i playwright && npx playwright install")]
    PlaywrightNotFound,

    #[error("Bridge error: {0}")]
    Bridge(String),

    #[error("Scenario parse error: {0}")]
    SpecParse(String),

    #[error("Scenario not found: {0}")]
    ScenarioNotFound(String),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Locator failed for '{selector}': {reason}")]
    Locator { selector: String, reason: String },

    #[error("Timeout after {timeout_ms} ms waiting for: {what}")]
    Timeout { what: String, timeout_ms: u64 },

    #[error("Assertion failed on {what}: expected {expected:?}, observed {observed:?}")]
    AssertionFailed {
        what: String,
        expected: String,
        observed: String,
    },

    #[error("Unhandled dialog blocked the page: {0}")]
    UnhandledDialog(String),

    #[error("Frame not found: {0}")]
    FrameNotFound(String),

    #[error("Option '{option}' not found in {selector}")]
    OptionNotFound { selector: String, option: String },

    #[error("No candidate in '{selector}' matched {target:?} ({scanned} scanned)")]
    NoMatchingCandidate {
        selector: String,
        target: String,
        scanned: usize,
    },

    #[error("Unknown variable: ${{{0}}}")]
    UnknownVariable(String),

    #[error("Unknown fragment: {0}")]
    UnknownFragment(String),

    #[error("Fragment '{fragment}' requires parameter '{param}'")]
    MissingParam { fragment: String, param: String },

    #[error("Fragment cycle: {0}")]
    FragmentCycle(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),
}

impl E2eError {
    /// Short classification used in reports
    pub fn kind(&self) -> &'static str {
        match self {
            E2eError::Locator { .. }
            | E2eError::FrameNotFound(_)
            | E2eError::OptionNotFound { .. }
            | E2eError::NoMatchingCandidate { .. } => "locator",
            E2eError::Timeout { .. } => "timeout",
            E2eError::AssertionFailed { .. } => "assertion",
            E2eError::UnhandledDialog(_) => "dialog",
            E2eError::UnknownVariable(_)
            | E2eError::UnknownFragment(_)
            | E2eError::MissingParam { .. }
            | E2eError::FragmentCycle(_)
            | E2eError::SpecParse(_)
            | E2eError::ScenarioNotFound(_)
            | E2eError::Yaml(_) => "scenario",
            _ => "setup",
        }
    }

    pub(crate) fn assertion(
        what: impl Into<String>,
        expected: impl Into<String>,
        observed: impl Into<String>,
    ) -> Self {
        E2eError::AssertionFailed {
            what: what.into(),
            expected: expected.into(),
            observed: observed.into(),
        }
    }
}

pub type E2eResult<T> = Result<T, E2eError>;
