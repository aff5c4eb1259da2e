//! Browser session seam
//!
//! A [`BrowserSession`] is one browser context + active page pair. Every
//! method is a suspension point bounded by the timeout it is given. The
//! runner holds the session by `&mut`, so calls never overlap.

use std::time::Duration;

use async_trait::async_trait;

use crate::error::E2eResult;
use crate::locator::{ElementRef, Locator};
use crate::spec::{Scenario, WaitState};

/// How an option is picked out of a `<select>`
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OptionChoice {
    Value(String),
    Label(String),
}

/// Answer given to native dialogs once a policy is registered
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DialogPolicy {
    Accept { prompt_text: Option<String> },
    Dismiss,
}

#[async_trait]
pub trait BrowserSession: Send {
    async fn goto(&mut self, url: &str, timeout: Duration) -> E2eResult<()>;

    async fn go_back(&mut self, timeout: Duration) -> E2eResult<()>;

    async fn go_forward(&mut self, timeout: Duration) -> E2eResult<()>;

    async fn title(&mut self) -> E2eResult<String>;

    async fn fill(&mut self, target: &ElementRef, value: &str, timeout: Duration) -> E2eResult<()>;

    async fn type_text(
        &mut self,
        target: &ElementRef,
        text: &str,
        delay: Option<Duration>,
        timeout: Duration,
    ) -> E2eResult<()>;

    async fn click(
        &mut self,
        target: &ElementRef,
        delay: Option<Duration>,
        timeout: Duration,
    ) -> E2eResult<()>;

    async fn set_checked(
        &mut self,
        target: &ElementRef,
        checked: bool,
        timeout: Duration,
    ) -> E2eResult<()>;

    async fn hover(&mut self, target: &ElementRef, timeout: Duration) -> E2eResult<()>;

    async fn select_option(
        &mut self,
        target: &ElementRef,
        choice: &OptionChoice,
        timeout: Duration,
    ) -> E2eResult<()>;

    /// Poll until the element reaches `state`; fails with `Timeout`
    async fn wait_for(
        &mut self,
        target: &ElementRef,
        state: WaitState,
        timeout: Duration,
    ) -> E2eResult<()>;

    async fn text_content(&mut self, target: &ElementRef, timeout: Duration) -> E2eResult<String>;

    /// Text of every match in document order (empty when nothing matches)
    async fn all_text_contents(&mut self, selector: &Locator) -> E2eResult<Vec<String>>;

    async fn count(&mut self, selector: &Locator) -> E2eResult<usize>;

    async fn is_checked(&mut self, target: &ElementRef, timeout: Duration) -> E2eResult<bool>;

    async fn input_value(&mut self, target: &ElementRef, timeout: Duration) -> E2eResult<String>;

    async fn attribute(
        &mut self,
        target: &ElementRef,
        name: &str,
        timeout: Duration,
    ) -> E2eResult<Option<String>>;

    async fn set_attribute(
        &mut self,
        target: &ElementRef,
        name: &str,
        value: &str,
        timeout: Duration,
    ) -> E2eResult<()>;

    async fn set_dialog_policy(&mut self, policy: DialogPolicy) -> E2eResult<()>;

    /// Wait for a page opened after the last switch and make it active
    async fn wait_for_new_page(&mut self, timeout: Duration) -> E2eResult<()>;

    async fn enter_frame(&mut self, selector: &Locator, timeout: Duration) -> E2eResult<()>;

    async fn exit_frame(&mut self) -> E2eResult<()>;

    /// Tear down the context and page
    async fn close(&mut self) -> E2eResult<()>;
}

/// Opens one fresh session per scenario
#[async_trait]
pub trait SessionFactory: Send + Sync {
    async fn open(&self, scenario: &Scenario) -> E2eResult<Box<dyn BrowserSession>>;
}
