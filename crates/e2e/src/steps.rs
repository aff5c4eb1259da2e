//! Step execution semantics
//!
//! [`StepExecutor`] turns one [`Step`] into calls on a [`BrowserSession`].
//! Every call is bounded by the step's timeout (or the scenario default)
//! and nothing is retried: a failed call fails the step.

use std::collections::BTreeSet;
use std::time::Duration;

use tracing::{debug, info};

use crate::error::{E2eError, E2eResult};
use crate::locator::{first_match, ElementRef, Locator, MatchMode};
use crate::session::{BrowserSession, DialogPolicy, OptionChoice};
use crate::spec::{Step, WaitState};
use crate::vars::Vars;

pub struct StepExecutor<'a> {
    session: &'a mut dyn BrowserSession,
    vars: &'a mut Vars,
    base_url: Option<&'a str>,
    default_timeout: Duration,
    captured: BTreeSet<String>,
}

impl<'a> StepExecutor<'a> {
    pub fn new(
        session: &'a mut dyn BrowserSession,
        vars: &'a mut Vars,
        base_url: Option<&'a str>,
        default_timeout: Duration,
    ) -> Self {
        Self { session, vars, base_url, default_timeout, captured: BTreeSet::new() }
    }

    /// Names written by `capture` steps so far
    pub fn captured(&self) -> &BTreeSet<String> {
        &self.captured
    }

    /// Execute one step; `Ok(Some(note))` carries a diagnostic for the report
    pub async fn execute(&mut self, step: &Step) -> E2eResult<Option<String>> {
        match step {
            Step::Navigate { url, timeout_ms } => {
                let url = resolve_url(self.base_url, &self.vars.interpolate(url)?);
                self.session.goto(&url, pick(*timeout_ms, self.default_timeout)).await?;
                Ok(None)
            }
            Step::GoBack => {
                self.session.go_back(self.default_timeout).await?;
                Ok(None)
            }
            Step::GoForward => {
                self.session.go_forward(self.default_timeout).await?;
                Ok(None)
            }
            Step::Fill { selector, value } => {
                let target = self.target(selector)?;
                let value = self.vars.interpolate(value)?;
                self.session.fill(&target, &value, self.default_timeout).await?;

                let observed = self.session.input_value(&target, self.default_timeout).await?;
                if observed != value {
                    return Err(E2eError::assertion(
                        format!("value of {} after fill", target.describe()),
                        value,
                        observed,
                    ));
                }
                Ok(None)
            }
            Step::Type { selector, text, delay_ms } => {
                let target = self.target(selector)?;
                let text = self.vars.interpolate(text)?;
                let delay = delay_ms.map(Duration::from_millis);
                self.session.type_text(&target, &text, delay, self.default_timeout).await?;
                Ok(None)
            }
            Step::Click { selector, delay_ms, timeout_ms } => {
                let target = self.target(selector)?;
                let delay = delay_ms.map(Duration::from_millis);
                self.session.click(&target, delay, pick(*timeout_ms, self.default_timeout)).await?;
                Ok(None)
            }
            Step::Check { selector } => {
                let target = self.target(selector)?;
                self.session.set_checked(&target, true, self.default_timeout).await?;
                Ok(None)
            }
            Step::Uncheck { selector } => {
                let target = self.target(selector)?;
                self.session.set_checked(&target, false, self.default_timeout).await?;
                Ok(None)
            }
            Step::Hover { selector } => {
                let target = self.target(selector)?;
                self.session.hover(&target, self.default_timeout).await?;
                Ok(None)
            }
            Step::SelectOption { selector, value, label } => {
                let target = self.target(selector)?;
                let choice = match (value, label) {
                    (Some(v), _) => OptionChoice::Value(self.vars.interpolate(v)?),
                    (None, Some(l)) => OptionChoice::Label(self.vars.interpolate(l)?),
                    (None, None) => {
                        return Err(E2eError::SpecParse(format!(
                            "select_option on {} has neither value nor label",
                            selector
                        )))
                    }
                };
                self.session.select_option(&target, &choice, self.default_timeout).await?;
                Ok(None)
            }
            Step::WaitFor { selector, state, timeout_ms } => {
                let target = self.target(selector)?;
                self.session
                    .wait_for(&target, *state, pick(*timeout_ms, self.default_timeout))
                    .await?;
                Ok(None)
            }
            Step::AssertText { selector, text, mode, timeout_ms } => {
                let target = self.target(selector)?;
                let expected = self.vars.interpolate(text)?;
                let observed = self
                    .session
                    .text_content(&target, pick(*timeout_ms, self.default_timeout))
                    .await?;
                check_text(&format!("text of {}", target.describe()), &observed, &expected, *mode)?;
                Ok(None)
            }
            Step::AssertVisible { selector, visible, timeout_ms } => {
                let target = self.target(selector)?;
                let state = if *visible { WaitState::Visible } else { WaitState::Hidden };
                self.session
                    .wait_for(&target, state, pick(*timeout_ms, self.default_timeout))
                    .await?;
                Ok(None)
            }
            Step::AssertChecked { selector, checked } => {
                let target = self.target(selector)?;
                let observed = self.session.is_checked(&target, self.default_timeout).await?;
                if observed != *checked {
                    return Err(E2eError::assertion(
                        format!("checked state of {}", target.describe()),
                        checked.to_string(),
                        observed.to_string(),
                    ));
                }
                Ok(None)
            }
            Step::AssertAttribute { selector, name, value } => {
                let target = self.target(selector)?;
                let expected = self.vars.interpolate(value)?;
                let observed = self.session.attribute(&target, name, self.default_timeout).await?;
                match observed {
                    Some(observed) if observed == expected => Ok(None),
                    Some(observed) => Err(E2eError::assertion(
                        format!("attribute {} of {}", name, target.describe()),
                        expected,
                        observed,
                    )),
                    None => Err(E2eError::assertion(
                        format!("attribute {} of {}", name, target.describe()),
                        expected,
                        "<absent>",
                    )),
                }
            }
            Step::AssertValue { selector, value } => {
                let target = self.target(selector)?;
                let expected = self.vars.interpolate(value)?;
                let observed = self.session.input_value(&target, self.default_timeout).await?;
                let what = format!("value of {}", target.describe());
                check_text(&what, &observed, &expected, MatchMode::Exact)?;
                Ok(None)
            }
            Step::AssertTitle { title, mode } => {
                let expected = self.vars.interpolate(title)?;
                let observed = self.session.title().await?;
                check_text("page title", &observed, &expected, *mode)?;
                Ok(Some(format!("title = {}", observed)))
            }
            Step::SetAttribute { selector, name, value } => {
                let target = self.target(selector)?;
                let value = self.vars.interpolate(value)?;
                self.session.set_attribute(&target, name, &value, self.default_timeout).await?;
                Ok(None)
            }
            Step::HandleDialog { accept, prompt_text } => {
                let policy = if *accept {
                    let prompt_text =
                        prompt_text.as_deref().map(|p| self.vars.interpolate(p)).transpose()?;
                    DialogPolicy::Accept { prompt_text }
                } else {
                    DialogPolicy::Dismiss
                };
                self.session.set_dialog_policy(policy).await?;
                Ok(None)
            }
            Step::WaitForNewPage { timeout_ms } => {
                self.session.wait_for_new_page(pick(*timeout_ms, self.default_timeout)).await?;
                Ok(None)
            }
            Step::EnterFrame { selector } => {
                let selector = self.locator(selector)?;
                self.session.enter_frame(&selector, self.default_timeout).await?;
                Ok(None)
            }
            Step::ExitFrame => {
                self.session.exit_frame().await?;
                Ok(None)
            }
            Step::ClickMatching { selector, text_of, text, mode, then_click } => {
                let selector = self.locator(selector)?;
                let target = self.vars.interpolate(text)?;
                let text_of = text_of.as_ref().map(|l| self.locator(l)).transpose()?;
                let then_click = then_click.as_ref().map(|l| self.locator(l)).transpose()?;

                let index = self.scan(&selector, text_of.as_ref(), &target, *mode).await?;
                debug!("Candidate {} of {} matched {:?}", index, selector, target);

                let hit = ElementRef::new(selector).nth(index).child(then_click);
                self.session.click(&hit, None, self.default_timeout).await?;
                Ok(Some(format!("matched candidate {}", index)))
            }
            Step::Capture { var, selector, non_empty } => {
                let value = match selector {
                    Some(selector) => {
                        let target = self.target(selector)?;
                        self.session.text_content(&target, self.default_timeout).await?
                    }
                    None => self.session.title().await?,
                };
                if *non_empty && value.trim().is_empty() {
                    return Err(E2eError::assertion(
                        format!("captured {}", var),
                        "a non-empty value",
                        value,
                    ));
                }
                info!("{} = {}", var, value);
                self.vars.set(var.clone(), value.clone());
                self.captured.insert(var.clone());
                Ok(Some(format!("{} = {}", var, value)))
            }
            Step::Log { message } => {
                let message = self.vars.interpolate(message)?;
                info!("[LOG] {}", message);
                Ok(Some(message))
            }
            Step::Use { fragment, .. } => Err(E2eError::SpecParse(format!(
                "fragment '{}' was not expanded before execution",
                fragment
            ))),
        }
    }

    /// Index of the first candidate whose text matches, scanning in document order
    async fn scan(
        &mut self,
        selector: &Locator,
        text_of: Option<&Locator>,
        target: &str,
        mode: MatchMode,
    ) -> E2eResult<usize> {
        let no_match = |scanned: usize| E2eError::NoMatchingCandidate {
            selector: selector.to_string(),
            target: target.to_string(),
            scanned,
        };

        let first = ElementRef::new(selector.clone()).nth(0);
        match self.session.wait_for(&first, WaitState::Attached, self.default_timeout).await {
            Ok(()) => {}
            Err(E2eError::Timeout { .. }) | Err(E2eError::Locator { .. }) => {
                return Err(no_match(0))
            }
            Err(e) => return Err(e),
        }

        let Some(text_of) = text_of else {
            let texts = self.session.all_text_contents(selector).await?;
            return first_match(&texts, target, mode).ok_or_else(|| no_match(texts.len()));
        };

        let count = self.session.count(selector).await?;
        for index in 0..count {
            let cell = ElementRef::new(selector.clone()).nth(index).child(Some(text_of.clone()));
            let text = self.session.text_content(&cell, self.default_timeout).await?;
            if mode.matches(&text, target) {
                return Ok(index);
            }
        }
        Err(no_match(count))
    }

    fn locator(&self, selector: &Locator) -> E2eResult<Locator> {
        Ok(Locator::new(self.vars.interpolate(selector.as_str())?))
    }

    fn target(&self, selector: &Locator) -> E2eResult<ElementRef> {
        Ok(ElementRef::new(self.locator(selector)?))
    }
}

fn pick(ms: Option<u64>, default: Duration) -> Duration {
    ms.map(Duration::from_millis).unwrap_or(default)
}

fn check_text(what: &str, observed: &str, expected: &str, mode: MatchMode) -> E2eResult<()> {
    if mode.matches(observed, expected) {
        Ok(())
    } else {
        Err(E2eError::assertion(what, expected, observed))
    }
}

/// Join a relative url onto the scenario base; absolute urls pass through
pub fn resolve_url(base: Option<&str>, url: &str) -> String {
    let absolute = url.contains("://") || url.starts_with("about:") || url.starts_with("data:");
    match base {
        Some(base) if !absolute => {
            format!("{}/{}", base.trim_end_matches('/'), url.trim_start_matches('/'))
        }
        _ => url.to_string(),
    }
}
