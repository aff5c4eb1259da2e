//! Scenario runner: session lifecycle, step ordering and suite results

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use crate::config::RunnerConfig;
use crate::error::{E2eError, E2eResult};
use crate::fragment;
use crate::session::{BrowserSession, SessionFactory};
use crate::spec::{Fragment, Scenario};
use crate::steps::StepExecutor;
use crate::vars::Vars;

/// Result of executing a single step
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepResult {
    pub index: usize,
    pub step_name: String,
    pub success: bool,
    pub duration_ms: u64,
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

/// The first failure of a scenario
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepFailure {
    /// Failing step index; `None` when the scenario failed before its first step
    pub index: Option<usize>,
    pub step_name: Option<String>,
    pub kind: String,
    pub message: String,
}

/// Result of running a single scenario
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScenarioResult {
    pub name: String,
    pub success: bool,
    pub started_at: DateTime<Utc>,
    pub duration_ms: u64,
    pub steps: Vec<StepResult>,
    pub failure: Option<StepFailure>,
    /// Variables captured during the run
    pub captured: BTreeMap<String, String>,
}

/// Result of running a set of scenarios
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SuiteResult {
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
    pub duration_ms: u64,
    pub results: Vec<ScenarioResult>,
}

/// Executes scenarios, each on a fresh session from the factory
pub struct ScenarioRunner {
    factory: Arc<dyn SessionFactory>,
    config: RunnerConfig,
    fragments: BTreeMap<String, Fragment>,
}

impl ScenarioRunner {
    pub fn new(factory: Arc<dyn SessionFactory>, config: RunnerConfig) -> Self {
        Self { factory, config, fragments: BTreeMap::new() }
    }

    /// Load fragments from the configured directory
    pub fn load_fragments(&mut self) -> E2eResult<()> {
        self.fragments = Fragment::load_all(&self.config.fragments_dir())?;
        debug!("Loaded {} fragment(s)", self.fragments.len());
        Ok(())
    }

    pub fn with_fragments(mut self, fragments: BTreeMap<String, Fragment>) -> Self {
        self.fragments = fragments;
        self
    }

    /// Load scenarios and keep those matching `names` (all when empty) and `tag`
    pub fn select(&self, names: &[String], tag: Option<&str>) -> E2eResult<Vec<Scenario>> {
        let all = Scenario::load_all(&self.config.scenarios_dir)?;
        select_scenarios(all, names, tag)
    }

    /// Expand fragments of a scenario
    pub fn expand(&self, scenario: &Scenario) -> E2eResult<Scenario> {
        fragment::expand(scenario, &self.fragments)
    }

    /// Run scenarios, at most `jobs` at a time, reporting in input order
    pub async fn run_all(&self, scenarios: &[Scenario]) -> SuiteResult {
        let start = Instant::now();
        let jobs = self.config.jobs.max(1);

        info!("Running {} scenario(s) with {} job(s)...", scenarios.len(), jobs);

        let results: Vec<ScenarioResult> = stream::iter(scenarios)
            .map(|scenario| self.run_scenario(scenario))
            .buffered(jobs)
            .collect()
            .await;

        let passed = results.iter().filter(|r| r.success).count();
        let failed = results.len() - passed;
        let duration_ms = start.elapsed().as_millis() as u64;

        info!("");
        info!("Scenario results: {} passed, {} failed ({} ms)", passed, failed, duration_ms);

        SuiteResult {
            total: scenarios.len(),
            passed,
            failed,
            duration_ms,
            results,
        }
    }

    /// Run one scenario on a fresh session. The session is closed whatever the outcome.
    pub async fn run_scenario(&self, scenario: &Scenario) -> ScenarioResult {
        let start = Instant::now();
        let started_at = Utc::now();
        debug!("Running scenario: {}", scenario.name);

        let mut vars = Vars::new();
        vars.merge(&scenario.vars);
        vars.merge(&self.config.vars);

        let mut result = ScenarioResult {
            name: scenario.name.clone(),
            success: false,
            started_at,
            duration_ms: 0,
            steps: Vec::new(),
            failure: None,
            captured: BTreeMap::new(),
        };

        match self.expand(scenario) {
            Ok(expanded) => match self.factory.open(&expanded).await {
                Ok(mut session) => {
                    let names = self
                        .execute_steps(&expanded, session.as_mut(), &mut vars, &mut result)
                        .await;
                    result.captured = names
                        .into_iter()
                        .filter_map(|name| vars.get(&name).map(|v| (name, v.to_string())))
                        .collect();
                    if let Err(e) = session.close().await {
                        warn!("{}: session teardown failed: {}", scenario.name, e);
                    }
                }
                Err(e) => result.failure = Some(setup_failure(&e)),
            },
            Err(e) => result.failure = Some(setup_failure(&e)),
        }

        result.duration_ms = start.elapsed().as_millis() as u64;
        result.success = result.failure.is_none();

        match &result.failure {
            None => info!("✓ {} ({} ms)", result.name, result.duration_ms),
            Some(f) => match (&f.index, &f.step_name) {
                (Some(i), Some(step)) => {
                    error!("✗ {} - step {} ({}): {}", result.name, i + 1, step, f.message)
                }
                _ => error!("✗ {} - {}", result.name, f.message),
            },
        }

        result
    }

    /// Execute steps in order, stopping at the first failure. Returns the captured names.
    async fn execute_steps(
        &self,
        scenario: &Scenario,
        session: &mut dyn BrowserSession,
        vars: &mut Vars,
        result: &mut ScenarioResult,
    ) -> BTreeSet<String> {
        let default_timeout = Duration::from_millis(
            scenario.timeout_ms.unwrap_or(self.config.default_timeout_ms),
        );
        let mut executor =
            StepExecutor::new(session, vars, scenario.base_url.as_deref(), default_timeout);

        for (index, step) in scenario.steps.iter().enumerate() {
            let step_start = Instant::now();
            let step_name = step.name();
            debug!("Executing step {}: {}", index + 1, step_name);

            let outcome = executor.execute(step).await;
            let duration_ms = step_start.elapsed().as_millis() as u64;

            match outcome {
                Ok(note) => result.steps.push(StepResult {
                    index,
                    step_name,
                    success: true,
                    duration_ms,
                    error: None,
                    note,
                }),
                Err(e) => {
                    result.failure = Some(StepFailure {
                        index: Some(index),
                        step_name: Some(step_name.clone()),
                        kind: e.kind().to_string(),
                        message: e.to_string(),
                    });
                    result.steps.push(StepResult {
                        index,
                        step_name,
                        success: false,
                        duration_ms,
                        error: Some(e.to_string()),
                        note: None,
                    });
                    break; // Stop on first failure
                }
            }
        }

        executor.captured().clone()
    }

    /// Write suite results to a JSON file
    pub fn write_results(&self, results: &SuiteResult, path: &Path) -> E2eResult<PathBuf> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }

        let json = serde_json::to_string_pretty(results)?;
        std::fs::write(path, json)?;

        info!("Results written to: {}", path.display());
        Ok(path.to_path_buf())
    }
}

fn setup_failure(e: &E2eError) -> StepFailure {
    StepFailure {
        index: None,
        step_name: None,
        kind: e.kind().to_string(),
        message: e.to_string(),
    }
}

/// Keep scenarios named in `names` (in that order) or all of them, then filter by tag
pub fn select_scenarios(
    all: Vec<Scenario>,
    names: &[String],
    tag: Option<&str>,
) -> E2eResult<Vec<Scenario>> {
    let mut picked = if names.is_empty() {
        all
    } else {
        let mut by_name: BTreeMap<String, Scenario> =
            all.into_iter().map(|s| (s.name.clone(), s)).collect();
        names
            .iter()
            .map(|n| by_name.remove(n).ok_or_else(|| E2eError::ScenarioNotFound(n.clone())))
            .collect::<E2eResult<Vec<_>>>()?
    };

    if let Some(tag) = tag {
        picked.retain(|s| s.tags.iter().any(|t| t == tag));
    }
    Ok(picked)
}
