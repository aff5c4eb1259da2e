//! Playwright browser automation
//!
//! Each [`PlaywrightSession`] owns one `node` child running the bridge
//! script. The child launches a browser, creates one context and page, and
//! then executes requests one at a time.

use std::collections::VecDeque;
use std::path::PathBuf;
use std::process::{Command, Stdio};
use std::str::FromStr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tempfile::TempDir;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, Command as TokioCommand};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::bridge::{self, Command as BridgeCommand, Context, Event, Incoming, Request, Response};
use crate::error::{E2eError, E2eResult};
use crate::locator::{ElementRef, Locator};
use crate::session::{BrowserSession, DialogPolicy, OptionChoice, SessionFactory};
use crate::spec::{Scenario, Viewport, WaitState};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Browser {
    #[default]
    Chromium,
    Firefox,
    Webkit,
}

impl Browser {
    pub fn as_str(&self) -> &'static str {
        match self {
            Browser::Chromium => "chromium",
            Browser::Firefox => "firefox",
            Browser::Webkit => "webkit",
        }
    }
}

impl FromStr for Browser {
    type Err = E2eError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "chromium" | "chrome" => Ok(Browser::Chromium),
            "firefox" => Ok(Browser::Firefox),
            "webkit" => Ok(Browser::Webkit),
            other => Err(E2eError::Config(format!("unsupported browser: {}", other))),
        }
    }
}

/// Configuration for Playwright
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PlaywrightConfig {
    pub browser: Browser,
    pub headless: bool,

    /// Node executable
    pub node_binary: PathBuf,

    /// Directory holding `node_modules/playwright` (exported as NODE_PATH)
    pub node_modules: Option<PathBuf>,

    /// Extra time the Rust side waits beyond a step's own timeout
    pub bridge_grace_ms: u64,

    /// Time allowed for launching the browser
    pub launch_timeout_ms: u64,

    /// Time allowed for a clean close before the bridge is signalled
    pub shutdown_timeout_ms: u64,
}

impl Default for PlaywrightConfig {
    fn default() -> Self {
        Self {
            browser: Browser::Chromium,
            headless: true,
            node_binary: PathBuf::from("node"),
            node_modules: None,
            bridge_grace_ms: 2000,
            launch_timeout_ms: 30_000,
            shutdown_timeout_ms: 5000,
        }
    }
}

/// Opens a [`PlaywrightSession`] per scenario
pub struct PlaywrightFactory {
    config: PlaywrightConfig,
}

impl PlaywrightFactory {
    pub fn new(config: PlaywrightConfig) -> E2eResult<Self> {
        Self::check_playwright_installed()?;
        Ok(Self { config })
    }

    /// Check if Playwright is installed
    fn check_playwright_installed() -> E2eResult<()> {
        let output = Command::new("npx")
            .args(["playwright", "--version"])
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status();

        match output {
            Ok(status) if status.success() => Ok(()),
            _ => Err(E2eError::PlaywrightNotFound),
        }
    }
}

#[async_trait]
impl SessionFactory for PlaywrightFactory {
    async fn open(&self, scenario: &Scenario) -> E2eResult<Box<dyn BrowserSession>> {
        let session = PlaywrightSession::launch(&self.config, scenario.viewport).await?;
        Ok(Box::new(session))
    }
}

/// Live browser session backed by a bridge process
pub struct PlaywrightSession {
    child: Child,
    stdin: ChildStdin,
    responses: mpsc::Receiver<Response>,
    next_id: u64,
    grace: Duration,
    shutdown_timeout: Duration,
    closed: bool,
    stderr_tail: StderrTail,
    // keeps the bridge script on disk for the lifetime of the child
    _script_dir: TempDir,
}

impl PlaywrightSession {
    /// Spawn the bridge and launch a browser context
    pub async fn launch(config: &PlaywrightConfig, viewport: Viewport) -> E2eResult<Self> {
        let script_dir = tempfile::tempdir()?;
        let script_path = script_dir.path().join("bridge.js");
        std::fs::write(&script_path, bridge::BRIDGE_SCRIPT)?;

        let mut cmd = TokioCommand::new(&config.node_binary);
        cmd.arg(&script_path)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let node_modules = match &config.node_modules {
            Some(dir) => Some(dir.clone()),
            None => std::env::current_dir().ok().map(|d| d.join("node_modules")),
        };
        if let Some(dir) = node_modules {
            cmd.env("NODE_PATH", dir);
        }

        let mut child = cmd.spawn().map_err(|e| {
            E2eError::Bridge(format!("failed to spawn {}: {}", config.node_binary.display(), e))
        })?;

        debug!("Bridge started (pid: {:?}) from {}", child.id(), script_path.display());

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| E2eError::Bridge("bridge stdin unavailable".to_string()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| E2eError::Bridge("bridge stdout unavailable".to_string()))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| E2eError::Bridge("bridge stderr unavailable".to_string()))?;

        let (tx, rx) = mpsc::channel(16);
        tokio::spawn(async move {
            let mut lines = BufReader::new(stdout).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                match bridge::parse_line(&line) {
                    Ok(Incoming::Response(resp)) => {
                        if tx.send(resp).await.is_err() {
                            break;
                        }
                    }
                    Ok(Incoming::Event(event)) => log_event(&event),
                    Err(e) => debug!("{}", e),
                }
            }
        });
        let stderr_tail = StderrTail::default();
        let tail = stderr_tail.clone();
        tokio::spawn(async move {
            let mut lines = BufReader::new(stderr).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                debug!("[bridge] {}", line);
                tail.push(line);
            }
        });

        let mut session = Self {
            child,
            stdin,
            responses: rx,
            next_id: 1,
            grace: Duration::from_millis(config.bridge_grace_ms),
            shutdown_timeout: Duration::from_millis(config.shutdown_timeout_ms),
            closed: false,
            stderr_tail,
            _script_dir: script_dir,
        };

        let launch = BridgeCommand::Launch {
            browser: config.browser.as_str().to_string(),
            headless: config.headless,
            width: viewport.width,
            height: viewport.height,
        };
        session
            .request(
                launch,
                Context::new(
                    format!("launch {}", config.browser.as_str()),
                    config.launch_timeout_ms,
                ),
            )
            .await?;

        Ok(session)
    }

    /// Send one request and wait for its response
    async fn request(&mut self, command: BridgeCommand, ctx: Context) -> E2eResult<Value> {
        let id = self.next_id;
        self.next_id += 1;

        let mut line = serde_json::to_string(&Request { id, command })?;
        debug!("-> {}", line);
        line.push('\n');
        self.stdin
            .write_all(line.as_bytes())
            .await
            .map_err(|e| self.stderr_tail.bridge_error(&format!("bridge stdin closed: {}", e)))?;
        self.stdin.flush().await?;

        let budget = Duration::from_millis(ctx.timeout_ms) + self.grace;
        let deadline = tokio::time::Instant::now() + budget;
        loop {
            let received = tokio::time::timeout_at(deadline, self.responses.recv())
                .await
                .map_err(|_| E2eError::Timeout {
                    what: ctx.what.clone(),
                    timeout_ms: ctx.timeout_ms,
                })?;
            let resp = received.ok_or_else(|| self.stderr_tail.bridge_error("bridge exited"))?;
            if resp.id != id {
                // late answer to a request that already timed out
                debug!("Discarding stale response {}", resp.id);
                continue;
            }
            return resp.into_result(&ctx);
        }
    }

    async fn request_string(&mut self, command: BridgeCommand, ctx: Context) -> E2eResult<String> {
        let value = self.request(command, ctx).await?;
        bridge::value_as_string(value)
    }

    /// Signal the bridge, then kill it if it is still around
    async fn terminate(&mut self) {
        if let Ok(Ok(status)) =
            tokio::time::timeout(self.shutdown_timeout, self.child.wait()).await
        {
            debug!("Bridge exited with {}", status);
            return;
        }

        #[cfg(unix)]
        {
            use nix::sys::signal::{kill, Signal};
            use nix::unistd::Pid;

            if let Some(pid) = self.child.id() {
                warn!("Bridge did not exit, sending SIGTERM (pid: {})", pid);
                if kill(Pid::from_raw(pid as i32), Signal::SIGTERM).is_ok()
                    && tokio::time::timeout(Duration::from_millis(500), self.child.wait())
                        .await
                        .is_ok()
                {
                    return;
                }
            }
        }

        let _ = self.child.kill().await;
    }
}

/// Last lines the bridge wrote to stderr, attached to errors when it dies
#[derive(Debug, Clone, Default)]
struct StderrTail {
    lines: Arc<Mutex<VecDeque<String>>>,
}

impl StderrTail {
    const KEEP: usize = 20;

    fn push(&self, line: String) {
        if let Ok(mut lines) = self.lines.lock() {
            if lines.len() == Self::KEEP {
                lines.pop_front();
            }
            lines.push_back(line);
        }
    }

    fn bridge_error(&self, what: &str) -> E2eError {
        let tail: Vec<String> = match self.lines.lock() {
            Ok(lines) => lines.iter().cloned().collect(),
            Err(_) => Vec::new(),
        };
        if tail.is_empty() {
            return E2eError::Bridge(what.to_string());
        }
        warn!("Bridge stderr before failure:\n{}", tail.join("\n"));
        E2eError::Bridge(format!("{}; stderr: {}", what, tail.join(" | ")))
    }
}

fn log_event(event: &Event) {
    match event {
        Event::Dialog { kind, message, handled: true } => {
            info!("Dialog ({}) answered: {}", kind, message)
        }
        Event::Dialog { kind, message, handled: false } => {
            warn!("Dialog ({}) left open: {}", kind, message)
        }
        Event::Page { url } => debug!("New page opened: {}", url),
        Event::Console { level, text } => debug!("[console.{}] {}", level, text),
    }
}

fn ms(d: Duration) -> u64 {
    d.as_millis() as u64
}

#[async_trait]
impl BrowserSession for PlaywrightSession {
    async fn goto(&mut self, url: &str, timeout: Duration) -> E2eResult<()> {
        let cmd = BridgeCommand::Goto { url: url.to_string(), timeout_ms: ms(timeout) };
        self.request(cmd, Context::new(format!("load {}", url), ms(timeout))).await?;
        Ok(())
    }

    async fn go_back(&mut self, timeout: Duration) -> E2eResult<()> {
        let cmd = BridgeCommand::GoBack { timeout_ms: ms(timeout) };
        self.request(cmd, Context::new("history back", ms(timeout))).await?;
        Ok(())
    }

    async fn go_forward(&mut self, timeout: Duration) -> E2eResult<()> {
        let cmd = BridgeCommand::GoForward { timeout_ms: ms(timeout) };
        self.request(cmd, Context::new("history forward", ms(timeout))).await?;
        Ok(())
    }

    async fn title(&mut self) -> E2eResult<String> {
        let grace = ms(self.grace);
        self.request_string(BridgeCommand::Title, Context::new("page title", grace)).await
    }

    async fn fill(&mut self, target: &ElementRef, value: &str, timeout: Duration) -> E2eResult<()> {
        let ctx = Context::new(target.describe(), ms(timeout));
        let cmd = BridgeCommand::Fill {
            target: target.clone(),
            value: value.to_string(),
            timeout_ms: ms(timeout),
        };
        self.request(cmd, ctx).await?;
        Ok(())
    }

    async fn type_text(
        &mut self,
        target: &ElementRef,
        text: &str,
        delay: Option<Duration>,
        timeout: Duration,
    ) -> E2eResult<()> {
        // keystroke delays count against the step budget
        let budget = timeout + delay.unwrap_or_default() * text.chars().count() as u32;
        let ctx = Context::new(target.describe(), ms(budget));
        let cmd = BridgeCommand::Type {
            target: target.clone(),
            text: text.to_string(),
            delay_ms: delay.map(ms).unwrap_or(0),
            timeout_ms: ms(timeout),
        };
        self.request(cmd, ctx).await?;
        Ok(())
    }

    async fn click(
        &mut self,
        target: &ElementRef,
        delay: Option<Duration>,
        timeout: Duration,
    ) -> E2eResult<()> {
        let ctx = Context::new(target.describe(), ms(timeout + delay.unwrap_or_default()));
        let cmd = BridgeCommand::Click {
            target: target.clone(),
            delay_ms: delay.map(ms).unwrap_or(0),
            timeout_ms: ms(timeout),
        };
        self.request(cmd, ctx).await?;
        Ok(())
    }

    async fn set_checked(
        &mut self,
        target: &ElementRef,
        checked: bool,
        timeout: Duration,
    ) -> E2eResult<()> {
        let ctx = Context::new(target.describe(), ms(timeout));
        let cmd = BridgeCommand::SetChecked {
            target: target.clone(),
            checked,
            timeout_ms: ms(timeout),
        };
        self.request(cmd, ctx).await?;
        Ok(())
    }

    async fn hover(&mut self, target: &ElementRef, timeout: Duration) -> E2eResult<()> {
        let ctx = Context::new(target.describe(), ms(timeout));
        let cmd = BridgeCommand::Hover { target: target.clone(), timeout_ms: ms(timeout) };
        self.request(cmd, ctx).await?;
        Ok(())
    }

    async fn select_option(
        &mut self,
        target: &ElementRef,
        choice: &OptionChoice,
        timeout: Duration,
    ) -> E2eResult<()> {
        let ctx = Context::new(target.describe(), ms(timeout));
        let (value, label) = match choice {
            OptionChoice::Value(v) => (Some(v.clone()), None),
            OptionChoice::Label(l) => (None, Some(l.clone())),
        };
        let cmd = BridgeCommand::SelectOption {
            target: target.clone(),
            value,
            label,
            timeout_ms: ms(timeout),
        };
        self.request(cmd, ctx).await?;
        Ok(())
    }

    async fn wait_for(
        &mut self,
        target: &ElementRef,
        state: WaitState,
        timeout: Duration,
    ) -> E2eResult<()> {
        let ctx = Context::new(
            format!("{} to be {}", target.describe(), state.as_str()),
            ms(timeout),
        );
        let cmd = BridgeCommand::WaitFor { target: target.clone(), state, timeout_ms: ms(timeout) };
        self.request(cmd, ctx).await?;
        Ok(())
    }

    async fn text_content(&mut self, target: &ElementRef, timeout: Duration) -> E2eResult<String> {
        let ctx = Context::new(target.describe(), ms(timeout));
        let cmd = BridgeCommand::TextContent { target: target.clone(), timeout_ms: ms(timeout) };
        self.request_string(cmd, ctx).await
    }

    async fn all_text_contents(&mut self, selector: &Locator) -> E2eResult<Vec<String>> {
        let ctx = Context::new(selector.to_string(), ms(self.grace));
        let value = self
            .request(BridgeCommand::AllTextContents { selector: selector.clone() }, ctx)
            .await?;
        Ok(serde_json::from_value(value)?)
    }

    async fn count(&mut self, selector: &Locator) -> E2eResult<usize> {
        let ctx = Context::new(selector.to_string(), ms(self.grace));
        let value = self.request(BridgeCommand::Count { selector: selector.clone() }, ctx).await?;
        Ok(serde_json::from_value(value)?)
    }

    async fn is_checked(&mut self, target: &ElementRef, timeout: Duration) -> E2eResult<bool> {
        let ctx = Context::new(target.describe(), ms(timeout));
        let value = self
            .request(
                BridgeCommand::IsChecked { target: target.clone(), timeout_ms: ms(timeout) },
                ctx,
            )
            .await?;
        Ok(serde_json::from_value(value)?)
    }

    async fn input_value(&mut self, target: &ElementRef, timeout: Duration) -> E2eResult<String> {
        let ctx = Context::new(target.describe(), ms(timeout));
        let cmd = BridgeCommand::InputValue { target: target.clone(), timeout_ms: ms(timeout) };
        self.request_string(cmd, ctx).await
    }

    async fn attribute(
        &mut self,
        target: &ElementRef,
        name: &str,
        timeout: Duration,
    ) -> E2eResult<Option<String>> {
        let ctx = Context::new(format!("{}[{}]", target.describe(), name), ms(timeout));
        let cmd = BridgeCommand::GetAttribute {
            target: target.clone(),
            name: name.to_string(),
            timeout_ms: ms(timeout),
        };
        let value = self.request(cmd, ctx).await?;
        Ok(serde_json::from_value(value)?)
    }

    async fn set_attribute(
        &mut self,
        target: &ElementRef,
        name: &str,
        value: &str,
        timeout: Duration,
    ) -> E2eResult<()> {
        let ctx = Context::new(format!("{}[{}]", target.describe(), name), ms(timeout));
        let cmd = BridgeCommand::SetAttribute {
            target: target.clone(),
            name: name.to_string(),
            value: value.to_string(),
            timeout_ms: ms(timeout),
        };
        self.request(cmd, ctx).await?;
        Ok(())
    }

    async fn set_dialog_policy(&mut self, policy: DialogPolicy) -> E2eResult<()> {
        let cmd = match policy {
            DialogPolicy::Accept { prompt_text } => {
                BridgeCommand::DialogPolicy { accept: true, prompt_text }
            }
            DialogPolicy::Dismiss => {
                BridgeCommand::DialogPolicy { accept: false, prompt_text: None }
            }
        };
        let grace = ms(self.grace);
        let answered = self.request_string(cmd, Context::new("dialog policy", grace)).await?;
        if !answered.is_empty() {
            info!("Answered dialog left open: {}", answered);
        }
        Ok(())
    }

    async fn wait_for_new_page(&mut self, timeout: Duration) -> E2eResult<()> {
        let cmd = BridgeCommand::WaitForNewPage { timeout_ms: ms(timeout) };
        let url = self.request_string(cmd, Context::new("new page", ms(timeout))).await?;
        info!("Switched to new page {}", url);
        Ok(())
    }

    async fn enter_frame(&mut self, selector: &Locator, timeout: Duration) -> E2eResult<()> {
        let cmd = BridgeCommand::EnterFrame { selector: selector.clone(), timeout_ms: ms(timeout) };
        self.request(cmd, Context::new(selector.to_string(), ms(timeout))).await?;
        Ok(())
    }

    async fn exit_frame(&mut self) -> E2eResult<()> {
        let grace = ms(self.grace);
        self.request(BridgeCommand::ExitFrame, Context::new("exit frame", grace)).await?;
        Ok(())
    }

    async fn close(&mut self) -> E2eResult<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;

        let timeout = ms(self.shutdown_timeout);
        let result = self.request(BridgeCommand::Close, Context::new("close", timeout)).await;
        self.terminate().await;
        result.map(|_| ())
    }
}
