//! In-memory browser used by the runner tests
//!
//! Pages are trees of elements keyed by selector string. Nothing waits:
//! a state that does not hold right now is reported as a timeout.

#![allow(dead_code)]

use std::collections::{BTreeMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use journey_e2e::error::{E2eError, E2eResult};
use journey_e2e::locator::{ElementRef, Locator};
use journey_e2e::session::{BrowserSession, DialogPolicy, OptionChoice, SessionFactory};
use journey_e2e::spec::{Scenario, WaitState};

#[derive(Debug, Clone)]
pub enum Effect {
    Show(String),
    Hide(String),
    SetText(String, String),
    /// Open a tab with this url (must be registered on the site)
    OpenPage(String),
    /// Raise a confirm dialog; effects applied on accept / dismiss
    Confirm {
        message: String,
        on_accept: Vec<Effect>,
        on_dismiss: Vec<Effect>,
    },
    Navigate(String),
}

#[derive(Debug, Clone)]
pub struct FakeElement {
    pub text: String,
    pub visible: bool,
    pub checked: bool,
    pub value: String,
    pub editable: bool,
    pub max_length: Option<usize>,
    pub attrs: BTreeMap<String, String>,
    pub options: Vec<(String, String)>,
    pub selected: Option<String>,
    pub children: BTreeMap<String, Vec<FakeElement>>,
    pub on_click: Vec<Effect>,
}

impl Default for FakeElement {
    fn default() -> Self {
        Self {
            text: String::new(),
            visible: true,
            checked: false,
            value: String::new(),
            editable: false,
            max_length: None,
            attrs: BTreeMap::new(),
            options: Vec::new(),
            selected: None,
            children: BTreeMap::new(),
            on_click: Vec::new(),
        }
    }
}

impl FakeElement {
    pub fn text(text: &str) -> Self {
        Self { text: text.to_string(), ..Default::default() }
    }

    pub fn input() -> Self {
        Self { editable: true, ..Default::default() }
    }

    pub fn hidden(mut self) -> Self {
        self.visible = false;
        self
    }

    pub fn child(mut self, selector: &str, element: FakeElement) -> Self {
        self.children.entry(selector.to_string()).or_default().push(element);
        self
    }

    pub fn on_click(mut self, effect: Effect) -> Self {
        self.on_click.push(effect);
        self
    }

    pub fn options(mut self, options: &[(&str, &str)]) -> Self {
        self.options = options.iter().map(|(v, l)| (v.to_string(), l.to_string())).collect();
        self
    }
}

#[derive(Debug, Clone, Default)]
pub struct FakePage {
    pub url: String,
    pub title: String,
    pub elements: BTreeMap<String, Vec<FakeElement>>,
    pub frames: BTreeMap<String, FakePage>,
}

impl FakePage {
    pub fn new(url: &str, title: &str) -> Self {
        Self { url: url.to_string(), title: title.to_string(), ..Default::default() }
    }

    pub fn with(mut self, selector: &str, element: FakeElement) -> Self {
        self.elements.entry(selector.to_string()).or_default().push(element);
        self
    }

    pub fn frame(mut self, selector: &str, page: FakePage) -> Self {
        self.elements.entry(selector.to_string()).or_default().push(FakeElement::default());
        self.frames.insert(selector.to_string(), page);
        self
    }
}

/// A dialog raised while no policy was set, waiting for one
#[derive(Debug, Clone)]
pub struct PendingDialog {
    pub message: String,
    pub on_accept: Vec<Effect>,
    pub on_dismiss: Vec<Effect>,
}

/// Everything a test may inspect after a run
#[derive(Debug, Default)]
pub struct FakeState {
    pub site: BTreeMap<String, FakePage>,
    pub history: Vec<FakePage>,
    pub cursor: usize,
    pub frames: Vec<String>,
    pub new_pages: VecDeque<FakePage>,
    pub policy: Option<DialogPolicy>,
    pub pending_dialog: Option<PendingDialog>,
    pub dialogs_seen: Vec<String>,
    pub calls: Vec<String>,
    pub opened: usize,
    pub closed: usize,
}

impl FakeState {
    fn page_mut(&mut self) -> E2eResult<&mut FakePage> {
        let frames = self.frames.clone();
        let mut page = self
            .history
            .get_mut(self.cursor)
            .ok_or_else(|| E2eError::Bridge("no page loaded".to_string()))?;
        for f in &frames {
            page = page
                .frames
                .get_mut(f)
                .ok_or_else(|| E2eError::FrameNotFound(f.clone()))?;
        }
        Ok(page)
    }

    fn top_mut(&mut self) -> E2eResult<&mut FakePage> {
        self.history
            .get_mut(self.cursor)
            .ok_or_else(|| E2eError::Bridge("no page loaded".to_string()))
    }
}

fn not_found(target: &ElementRef, reason: &str) -> E2eError {
    E2eError::Locator { selector: target.describe(), reason: reason.to_string() }
}

fn resolve<'p>(page: &'p mut FakePage, target: &ElementRef) -> E2eResult<&'p mut FakeElement> {
    let matches = page
        .elements
        .get_mut(target.selector.as_str())
        .filter(|v| !v.is_empty())
        .ok_or_else(|| not_found(target, "no element matches"))?;

    let element = match target.nth {
        Some(i) => matches.get_mut(i).ok_or_else(|| not_found(target, "index out of range"))?,
        None if matches.len() == 1 => &mut matches[0],
        None => return Err(not_found(target, "strict mode violation: several elements match")),
    };

    match &target.child {
        None => Ok(element),
        Some(child) => {
            let kids = element
                .children
                .get_mut(child.as_str())
                .filter(|v| !v.is_empty())
                .ok_or_else(|| not_found(target, "no child matches"))?;
            if kids.len() > 1 {
                return Err(not_found(target, "strict mode violation: several children match"));
            }
            Ok(&mut kids[0])
        }
    }
}

fn exists_visible(page: &FakePage, target: &ElementRef) -> (bool, bool) {
    let Some(matches) = page.elements.get(target.selector.as_str()) else {
        return (false, false);
    };
    let element = match target.nth {
        Some(i) => matches.get(i),
        None => matches.first(),
    };
    let element = match (&target.child, element) {
        (Some(child), Some(e)) => e.children.get(child.as_str()).and_then(|k| k.first()),
        (None, e) => e,
        (_, None) => None,
    };
    match element {
        Some(e) => (true, e.visible),
        None => (false, false),
    }
}

#[derive(Clone)]
pub struct FakeSession {
    pub state: Arc<Mutex<FakeState>>,
}

impl FakeSession {
    fn call(&self, entry: String) -> E2eResult<std::sync::MutexGuard<'_, FakeState>> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(entry);
        if let Some(dialog) = &state.pending_dialog {
            let message = dialog.message.clone();
            return Err(E2eError::UnhandledDialog(message));
        }
        Ok(state)
    }
}

fn apply(state: &mut FakeState, effects: Vec<Effect>) -> E2eResult<()> {
    for effect in effects {
        match effect {
            Effect::Show(sel) => set_visible(state.top_mut()?, &sel, true),
            Effect::Hide(sel) => set_visible(state.top_mut()?, &sel, false),
            Effect::SetText(sel, text) => {
                if let Some(list) = state.top_mut()?.elements.get_mut(&sel) {
                    list.iter_mut().for_each(|e| e.text = text.clone());
                }
            }
            Effect::OpenPage(url) => {
                let page = state.site.get(&url).cloned().unwrap_or_else(|| FakePage::new(&url, ""));
                state.new_pages.push_back(page);
            }
            Effect::Confirm { message, on_accept, on_dismiss } => {
                state.dialogs_seen.push(message.clone());
                match state.policy.clone() {
                    Some(DialogPolicy::Accept { .. }) => apply(state, on_accept)?,
                    Some(DialogPolicy::Dismiss) => apply(state, on_dismiss)?,
                    None => {
                        state.pending_dialog =
                            Some(PendingDialog { message, on_accept, on_dismiss })
                    }
                }
            }
            Effect::Navigate(url) => load(state, &url),
        }
    }
    Ok(())
}

fn set_visible(page: &mut FakePage, sel: &str, visible: bool) {
    if let Some(list) = page.elements.get_mut(sel) {
        list.iter_mut().for_each(|e| e.visible = visible);
    }
}

fn load(state: &mut FakeState, url: &str) {
    let page = state.site.get(url).cloned().unwrap_or_else(|| FakePage::new(url, ""));
    if !state.history.is_empty() {
        state.history.truncate(state.cursor + 1);
    }
    state.history.push(page);
    state.cursor = state.history.len() - 1;
    state.frames.clear();
}

fn timeout(what: String, t: Duration) -> E2eError {
    E2eError::Timeout { what, timeout_ms: t.as_millis() as u64 }
}

#[async_trait]
impl BrowserSession for FakeSession {
    async fn goto(&mut self, url: &str, t: Duration) -> E2eResult<()> {
        let mut state = self.call(format!("goto:{}", url))?;
        if !state.site.contains_key(url) {
            return Err(timeout(format!("load {}", url), t));
        }
        load(&mut state, url);
        Ok(())
    }

    async fn go_back(&mut self, t: Duration) -> E2eResult<()> {
        let mut state = self.call("go_back".to_string())?;
        if state.cursor == 0 {
            return Err(timeout("history back".to_string(), t));
        }
        state.cursor -= 1;
        state.frames.clear();
        Ok(())
    }

    async fn go_forward(&mut self, t: Duration) -> E2eResult<()> {
        let mut state = self.call("go_forward".to_string())?;
        if state.cursor + 1 >= state.history.len() {
            return Err(timeout("history forward".to_string(), t));
        }
        state.cursor += 1;
        state.frames.clear();
        Ok(())
    }

    async fn title(&mut self) -> E2eResult<String> {
        let mut state = self.call("title".to_string())?;
        Ok(state.top_mut()?.title.clone())
    }

    async fn fill(&mut self, target: &ElementRef, value: &str, _t: Duration) -> E2eResult<()> {
        let mut state = self.call(format!("fill:{}", target.describe()))?;
        let element = resolve(state.page_mut()?, target)?;
        if !element.editable {
            return Err(not_found(target, "element is not editable"));
        }
        element.value = match element.max_length {
            Some(max) => value.chars().take(max).collect(),
            None => value.to_string(),
        };
        Ok(())
    }

    async fn type_text(
        &mut self,
        target: &ElementRef,
        text: &str,
        _d: Option<Duration>,
        _t: Duration,
    ) -> E2eResult<()> {
        let mut state = self.call(format!("type:{}", target.describe()))?;
        let element = resolve(state.page_mut()?, target)?;
        element.value.push_str(text);
        Ok(())
    }

    async fn click(
        &mut self,
        target: &ElementRef,
        _d: Option<Duration>,
        _t: Duration,
    ) -> E2eResult<()> {
        let mut state = self.call(format!("click:{}", target.describe()))?;
        let element = resolve(state.page_mut()?, target)?;
        if !element.visible {
            return Err(not_found(target, "element is not visible"));
        }
        if element.attrs.get("type").map(String::as_str) == Some("checkbox") {
            element.checked = !element.checked;
        }
        let effects = element.on_click.clone();
        apply(&mut state, effects)
    }

    async fn set_checked(
        &mut self,
        target: &ElementRef,
        checked: bool,
        _t: Duration,
    ) -> E2eResult<()> {
        let mut state = self.call(format!("set_checked:{}:{}", target.describe(), checked))?;
        resolve(state.page_mut()?, target)?.checked = checked;
        Ok(())
    }

    async fn hover(&mut self, target: &ElementRef, _t: Duration) -> E2eResult<()> {
        let mut state = self.call(format!("hover:{}", target.describe()))?;
        resolve(state.page_mut()?, target)?;
        Ok(())
    }

    async fn select_option(
        &mut self,
        target: &ElementRef,
        choice: &OptionChoice,
        _t: Duration,
    ) -> E2eResult<()> {
        let mut state = self.call(format!("select_option:{}", target.describe()))?;
        let element = resolve(state.page_mut()?, target)?;
        let found = element.options.iter().find(|(v, l)| match choice {
            OptionChoice::Value(want) => v == want,
            OptionChoice::Label(want) => l == want,
        });
        match found {
            Some((v, _)) => {
                let v = v.clone();
                element.selected = Some(v.clone());
                element.value = v;
                Ok(())
            }
            None => Err(E2eError::OptionNotFound {
                selector: target.describe(),
                option: match choice {
                    OptionChoice::Value(v) | OptionChoice::Label(v) => v.clone(),
                },
            }),
        }
    }

    async fn wait_for(
        &mut self,
        target: &ElementRef,
        state_wanted: WaitState,
        t: Duration,
    ) -> E2eResult<()> {
        let mut state =
            self.call(format!("wait_for:{}:{}", target.describe(), state_wanted.as_str()))?;
        let (exists, visible) = exists_visible(state.page_mut()?, target);
        let ok = match state_wanted {
            WaitState::Visible => exists && visible,
            WaitState::Hidden => !exists || !visible,
            WaitState::Attached => exists,
            WaitState::Detached => !exists,
        };
        if ok {
            Ok(())
        } else {
            Err(timeout(format!("{} to be {}", target.describe(), state_wanted.as_str()), t))
        }
    }

    async fn text_content(&mut self, target: &ElementRef, _t: Duration) -> E2eResult<String> {
        let mut state = self.call(format!("text_content:{}", target.describe()))?;
        Ok(resolve(state.page_mut()?, target)?.text.clone())
    }

    async fn all_text_contents(&mut self, selector: &Locator) -> E2eResult<Vec<String>> {
        let mut state = self.call(format!("all_text_contents:{}", selector))?;
        let page = state.page_mut()?;
        Ok(page
            .elements
            .get(selector.as_str())
            .map(|v| v.iter().map(|e| e.text.clone()).collect())
            .unwrap_or_default())
    }

    async fn count(&mut self, selector: &Locator) -> E2eResult<usize> {
        let mut state = self.call(format!("count:{}", selector))?;
        let page = state.page_mut()?;
        Ok(page.elements.get(selector.as_str()).map(Vec::len).unwrap_or(0))
    }

    async fn is_checked(&mut self, target: &ElementRef, _t: Duration) -> E2eResult<bool> {
        let mut state = self.call(format!("is_checked:{}", target.describe()))?;
        Ok(resolve(state.page_mut()?, target)?.checked)
    }

    async fn input_value(&mut self, target: &ElementRef, _t: Duration) -> E2eResult<String> {
        let mut state = self.call(format!("input_value:{}", target.describe()))?;
        Ok(resolve(state.page_mut()?, target)?.value.clone())
    }

    async fn attribute(
        &mut self,
        target: &ElementRef,
        name: &str,
        _t: Duration,
    ) -> E2eResult<Option<String>> {
        let mut state = self.call(format!("attribute:{}:{}", target.describe(), name))?;
        Ok(resolve(state.page_mut()?, target)?.attrs.get(name).cloned())
    }

    async fn set_attribute(
        &mut self,
        target: &ElementRef,
        name: &str,
        value: &str,
        _t: Duration,
    ) -> E2eResult<()> {
        let mut state = self.call(format!("set_attribute:{}:{}", target.describe(), name))?;
        resolve(state.page_mut()?, target)?
            .attrs
            .insert(name.to_string(), value.to_string());
        Ok(())
    }

    async fn set_dialog_policy(&mut self, policy: DialogPolicy) -> E2eResult<()> {
        // answers a dialog that is already open, like the bridge does
        let mut state = self.state.lock().unwrap();
        state.calls.push("set_dialog_policy".to_string());
        state.policy = Some(policy.clone());
        match state.pending_dialog.take() {
            Some(dialog) => match policy {
                DialogPolicy::Accept { .. } => apply(&mut state, dialog.on_accept),
                DialogPolicy::Dismiss => apply(&mut state, dialog.on_dismiss),
            },
            None => Ok(()),
        }
    }

    async fn wait_for_new_page(&mut self, t: Duration) -> E2eResult<()> {
        let mut state = self.call("wait_for_new_page".to_string())?;
        match state.new_pages.pop_front() {
            Some(page) => {
                state.history = vec![page];
                state.cursor = 0;
                state.frames.clear();
                Ok(())
            }
            None => Err(timeout("new page".to_string(), t)),
        }
    }

    async fn enter_frame(&mut self, selector: &Locator, _t: Duration) -> E2eResult<()> {
        let mut state = self.call(format!("enter_frame:{}", selector))?;
        let known = state.page_mut()?.frames.contains_key(selector.as_str());
        if !known {
            return Err(E2eError::FrameNotFound(selector.to_string()));
        }
        state.frames.push(selector.to_string());
        Ok(())
    }

    async fn exit_frame(&mut self) -> E2eResult<()> {
        let mut state = self.call("exit_frame".to_string())?;
        state.frames.pop();
        Ok(())
    }

    async fn close(&mut self) -> E2eResult<()> {
        let mut state = self.state.lock().unwrap();
        state.calls.push("close".to_string());
        state.closed += 1;
        Ok(())
    }
}

/// Hands out sessions over one shared site
pub struct FakeFactory {
    pub site: BTreeMap<String, FakePage>,
    pub sessions: Mutex<Vec<Arc<Mutex<FakeState>>>>,
    pub fail_open: bool,
}

impl FakeFactory {
    pub fn new(pages: Vec<FakePage>) -> Self {
        Self {
            site: pages.into_iter().map(|p| (p.url.clone(), p)).collect(),
            sessions: Mutex::new(Vec::new()),
            fail_open: false,
        }
    }

    /// State of the n-th opened session
    pub fn state(&self, n: usize) -> Arc<Mutex<FakeState>> {
        self.sessions.lock().unwrap()[n].clone()
    }

    pub fn calls(&self, n: usize) -> Vec<String> {
        self.state(n).lock().unwrap().calls.clone()
    }
}

#[async_trait]
impl SessionFactory for FakeFactory {
    async fn open(&self, _scenario: &Scenario) -> E2eResult<Box<dyn BrowserSession>> {
        if self.fail_open {
            return Err(E2eError::PlaywrightNotFound);
        }
        let state = Arc::new(Mutex::new(FakeState {
            site: self.site.clone(),
            opened: 1,
            ..Default::default()
        }));
        self.sessions.lock().unwrap().push(state.clone());
        Ok(Box::new(FakeSession { state }))
    }
}
