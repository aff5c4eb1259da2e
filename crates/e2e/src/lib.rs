//! Journey E2E Scenario Runner
//!
//! This crate runs declarative browser journeys against live web pages:
//! - Parses YAML scenarios and reusable parameterized fragments
//! - Drives Playwright through a long-lived node bridge, one per scenario
//! - Executes steps strictly in order and stops at the first failure
//! - Reports per-step results, captured values and the failing step
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                 Scenario Runner (Rust)                      │
//! ├─────────────────────────────────────────────────────────────┤
//! │  ScenarioRunner                                             │
//! │    ├── select(names, tag) -> Vec<Scenario>                  │
//! │    ├── run_scenario(&Scenario) -> ScenarioResult            │
//! │    │     ├── SessionFactory::open() -> BrowserSession       │
//! │    │     ├── StepExecutor::execute(step) (in order)         │
//! │    │     └── BrowserSession::close() (always)               │
//! │    └── run_all(&[Scenario]) -> SuiteResult                  │
//! ├─────────────────────────────────────────────────────────────┤
//! │  PlaywrightSession ── JSON lines ──> node bridge.js         │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Scenario (YAML)                                            │
//! │    ├── name, tags, base_url, vars, timeout_ms               │
//! │    └── steps: [Step]                                        │
//! │          ├── navigate / fill / type / click / hover         │
//! │          ├── select_option / check / uncheck                │
//! │          ├── wait_for / assert_* / capture / log            │
//! │          ├── handle_dialog / wait_for_new_page              │
//! │          ├── enter_frame / exit_frame / click_matching      │
//! │          └── use { fragment, with }                         │
//! └─────────────────────────────────────────────────────────────┘
//! ```

pub mod bridge;
pub mod config;
pub mod error;
pub mod fragment;
pub mod locator;
pub mod playwright;
pub mod runner;
pub mod session;
pub mod spec;
pub mod steps;
pub mod vars;

pub use config::RunnerConfig;
pub use error::{E2eError, E2eResult};
pub use locator::{ElementRef, Locator, MatchMode};
pub use runner::{ScenarioResult, ScenarioRunner, SuiteResult};
pub use session::{BrowserSession, SessionFactory};
pub use spec::{Scenario, Step};
