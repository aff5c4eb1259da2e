//! Locators and text matching
//!
//! A [`Locator`] is an opaque selector string. It is never parsed on the Rust
//! side; the browser engine resolves it against the current page or frame at
//! execution time. Anything Playwright accepts works here: CSS
//! (`#username`), text engines (`text=Checkout`), pseudo classes
//! (`h3:has-text('LG Refrigerator')`) and role engines
//! (`role=button[name="Login"]`).

use std::fmt;

use serde::{Deserialize, Serialize};

/// Opaque selector resolvable against a page context
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Locator(String);

impl Locator {
    pub fn new(selector: impl Into<String>) -> Self {
        Self(selector.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Locator {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

/// A concrete element target handed to a session.
///
/// `nth` picks one element out of the locator's matches (document order,
/// zero based). `child` is resolved inside that element. Without `nth`
/// the locator must resolve to exactly one element.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ElementRef {
    pub selector: Locator,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nth: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub child: Option<Locator>,
}

impl ElementRef {
    pub fn new(selector: Locator) -> Self {
        Self { selector, nth: None, child: None }
    }

    pub fn nth(mut self, index: usize) -> Self {
        self.nth = Some(index);
        self
    }

    pub fn child(mut self, child: Option<Locator>) -> Self {
        self.child = child;
        self
    }

    /// Human readable form used in step names and errors
    pub fn describe(&self) -> String {
        let mut out = self.selector.to_string();
        if let Some(n) = self.nth {
            out.push_str(&format!(" >> nth={}", n));
        }
        if let Some(child) = &self.child {
            out.push_str(&format!(" >> {}", child));
        }
        out
    }
}

impl From<Locator> for ElementRef {
    fn from(selector: Locator) -> Self {
        Self::new(selector)
    }
}

/// How an observed text is compared with an expected literal
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchMode {
    /// Observed text equals the literal byte for byte
    #[default]
    Exact,
    /// Observed text contains the literal
    Contains,
    /// The literal contains the observed text (e.g. a row id inside a longer order id)
    ContainedIn,
}

impl MatchMode {
    pub fn matches(&self, observed: &str, expected: &str) -> bool {
        match self {
            MatchMode::Exact => observed == expected,
            MatchMode::Contains => observed.contains(expected),
            MatchMode::ContainedIn => !observed.is_empty() && expected.contains(observed),
        }
    }
}

/// Index of the first candidate (document order) matching `target`
pub fn first_match<S: AsRef<str>>(
    candidates: &[S],
    target: &str,
    mode: MatchMode,
) -> Option<usize> {
    candidates
        .iter()
        .position(|candidate| mode.matches(candidate.as_ref(), target))
}
