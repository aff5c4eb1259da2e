//! JSON-lines protocol spoken with the Playwright bridge process
//!
//! Requests go to the bridge's stdin, one JSON object per line. The bridge
//! answers every request with exactly one response carrying the same `id`,
//! and may interleave unsolicited event lines.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{E2eError, E2eResult};
use crate::locator::{ElementRef, Locator};
use crate::spec::WaitState;

/// Node script implementing the bridge side
pub const BRIDGE_SCRIPT: &str = include_str!("bridge.js");

#[derive(Debug, Clone, Serialize)]
pub struct Request {
    pub id: u64,
    #[serde(flatten)]
    pub command: Command,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Command {
    Launch {
        browser: String,
        headless: bool,
        width: u32,
        height: u32,
    },
    Goto { url: String, timeout_ms: u64 },
    GoBack { timeout_ms: u64 },
    GoForward { timeout_ms: u64 },
    Title,
    Fill { target: ElementRef, value: String, timeout_ms: u64 },
    Type { target: ElementRef, text: String, delay_ms: u64, timeout_ms: u64 },
    Click { target: ElementRef, delay_ms: u64, timeout_ms: u64 },
    SetChecked { target: ElementRef, checked: bool, timeout_ms: u64 },
    Hover { target: ElementRef, timeout_ms: u64 },
    SelectOption {
        target: ElementRef,
        #[serde(skip_serializing_if = "Option::is_none")]
        value: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        label: Option<String>,
        timeout_ms: u64,
    },
    WaitFor { target: ElementRef, state: WaitState, timeout_ms: u64 },
    TextContent { target: ElementRef, timeout_ms: u64 },
    AllTextContents { selector: Locator },
    Count { selector: Locator },
    IsChecked { target: ElementRef, timeout_ms: u64 },
    InputValue { target: ElementRef, timeout_ms: u64 },
    GetAttribute { target: ElementRef, name: String, timeout_ms: u64 },
    SetAttribute { target: ElementRef, name: String, value: String, timeout_ms: u64 },
    DialogPolicy {
        accept: bool,
        #[serde(skip_serializing_if = "Option::is_none")]
        prompt_text: Option<String>,
    },
    WaitForNewPage { timeout_ms: u64 },
    EnterFrame { selector: Locator, timeout_ms: u64 },
    ExitFrame,
    Close,
}

/// One line read from the bridge
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum Incoming {
    Response(Response),
    Event(Event),
}

#[derive(Debug, Clone, Deserialize)]
pub struct Response {
    pub id: u64,
    pub ok: bool,
    #[serde(default)]
    pub value: Value,
    #[serde(default)]
    pub error: Option<Fault>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Fault {
    pub kind: FaultKind,
    #[serde(default)]
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FaultKind {
    Timeout,
    Locator,
    Frame,
    Dialog,
    Option,
    #[serde(other)]
    Other,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum Event {
    Dialog {
        #[serde(rename = "type", default)]
        kind: String,
        #[serde(default)]
        message: String,
        #[serde(default)]
        handled: bool,
    },
    Page {
        #[serde(default)]
        url: String,
    },
    Console {
        #[serde(default)]
        level: String,
        #[serde(default)]
        text: String,
    },
}

/// What a request was about, for error reporting
#[derive(Debug, Clone)]
pub struct Context {
    pub what: String,
    pub timeout_ms: u64,
}

impl Context {
    pub fn new(what: impl Into<String>, timeout_ms: u64) -> Self {
        Self { what: what.into(), timeout_ms }
    }
}

pub fn parse_line(line: &str) -> E2eResult<Incoming> {
    serde_json::from_str(line)
        .map_err(|e| E2eError::Bridge(format!("unreadable bridge line {:?}: {}", line, e)))
}

impl Response {
    pub fn into_result(self, ctx: &Context) -> E2eResult<Value> {
        if self.ok {
            return Ok(self.value);
        }
        let fault = self.error.unwrap_or(Fault {
            kind: FaultKind::Other,
            message: "bridge reported failure without detail".to_string(),
        });
        Err(fault.into_error(ctx))
    }
}

impl Fault {
    pub fn into_error(self, ctx: &Context) -> E2eError {
        match self.kind {
            FaultKind::Timeout => E2eError::Timeout {
                what: ctx.what.clone(),
                timeout_ms: ctx.timeout_ms,
            },
            FaultKind::Locator => E2eError::Locator {
                selector: ctx.what.clone(),
                reason: self.message,
            },
            FaultKind::Frame => E2eError::FrameNotFound(ctx.what.clone()),
            FaultKind::Dialog => E2eError::UnhandledDialog(self.message),
            FaultKind::Option => E2eError::OptionNotFound {
                selector: ctx.what.clone(),
                option: self.message,
            },
            FaultKind::Other => E2eError::Bridge(self.message),
        }
    }
}

/// Pull a string out of a response value (`null` becomes empty)
pub fn value_as_string(value: Value) -> E2eResult<String> {
    match value {
        Value::String(s) => Ok(s),
        Value::Null => Ok(String::new()),
        other => Err(E2eError::Bridge(format!("expected string, got {}", other))),
    }
}
