//! Runner configuration

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{E2eError, E2eResult};
use crate::playwright::PlaywrightConfig;
use crate::spec::FRAGMENTS_DIR;
use crate::vars::Vars;

/// Runner configuration, usually read from `journey.toml`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RunnerConfig {
    /// Directory scanned for scenario YAML files
    pub scenarios_dir: PathBuf,

    /// Fragment directory (defaults to `<scenarios_dir>/fragments`)
    pub fragments_dir: Option<PathBuf>,

    /// Timeout for waiting steps when neither step nor scenario sets one
    pub default_timeout_ms: u64,

    /// Scenarios run concurrently, each on its own session
    pub jobs: usize,

    /// Variables layered over every scenario's own `vars`
    pub vars: BTreeMap<String, String>,

    pub playwright: PlaywrightConfig,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            scenarios_dir: PathBuf::from("scenarios"),
            fragments_dir: None,
            default_timeout_ms: 10_000,
            jobs: 1,
            vars: BTreeMap::new(),
            playwright: PlaywrightConfig::default(),
        }
    }
}

impl RunnerConfig {
    /// Load configuration from file; a missing file yields defaults
    pub fn load(path: &Path) -> E2eResult<Self> {
        if path.exists() {
            let content = std::fs::read_to_string(path)?;
            let config: Self = toml::from_str(&content)?;
            Ok(config)
        } else {
            Ok(Self::default())
        }
    }

    pub fn fragments_dir(&self) -> PathBuf {
        self.fragments_dir
            .clone()
            .unwrap_or_else(|| self.scenarios_dir.join(FRAGMENTS_DIR))
    }

    /// Apply `JOURNEY_*` overrides from an environment iterator
    pub fn apply_env<I>(&mut self, env: I) -> E2eResult<()>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let env: Vec<(String, String)> = env.into_iter().collect();

        for (key, value) in &env {
            match key.as_str() {
                "JOURNEY_BROWSER" => self.playwright.browser = value.parse()?,
                "JOURNEY_HEADLESS" => self.playwright.headless = parse_bool(key, value)?,
                "JOURNEY_TIMEOUT_MS" => self.default_timeout_ms = parse_num(key, value)?,
                "JOURNEY_JOBS" => self.jobs = parse_num(key, value)?,
                "JOURNEY_NODE_MODULES" => self.playwright.node_modules = Some(PathBuf::from(value)),
                _ => {}
            }
        }

        for (name, value) in Vars::from_env(env) {
            self.vars.retain(|k, _| !k.eq_ignore_ascii_case(&name));
            self.vars.insert(name, value);
        }
        Ok(())
    }

    pub fn validate(&self) -> E2eResult<()> {
        if self.jobs == 0 {
            return Err(E2eError::Config("jobs must be at least 1".to_string()));
        }
        if self.default_timeout_ms == 0 {
            return Err(E2eError::Config("default_timeout_ms must be positive".to_string()));
        }
        Ok(())
    }
}

fn parse_bool(key: &str, value: &str) -> E2eResult<bool> {
    match value.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" => Ok(true),
        "0" | "false" | "no" => Ok(false),
        _ => Err(E2eError::Config(format!("{} must be a boolean, got {:?}", key, value))),
    }
}

fn parse_num<T: std::str::FromStr>(key: &str, value: &str) -> E2eResult<T> {
    value
        .parse()
        .map_err(|_| E2eError::Config(format!("{} must be a number, got {:?}", key, value)))
}
