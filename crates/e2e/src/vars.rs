//! Scenario variables and `${name}` interpolation

use std::collections::BTreeMap;

use once_cell::sync::Lazy;
use regex::{Captures, Regex};

use crate::error::{E2eError, E2eResult};

/// Environment prefix for variable overrides (`JOURNEY_VAR_EMAIL` sets `email`)
pub const ENV_PREFIX: &str = "JOURNEY_VAR_";

static PLACEHOLDER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)\}").expect("placeholder pattern is valid")
});

/// Variables visible to one scenario run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Vars {
    values: BTreeMap<String, String>,
}

impl Vars {
    pub fn new() -> Self {
        Self::default()
    }

    /// Layer `overrides` on top of the current values.
    ///
    /// Names match ignoring ASCII case, so the lowercased `JOURNEY_VAR_ORDERID`
    /// replaces a scenario's `orderId` and the scenario's spelling is kept.
    pub fn merge(&mut self, overrides: &BTreeMap<String, String>) {
        for (k, v) in overrides {
            let key = self
                .values
                .keys()
                .find(|existing| existing.eq_ignore_ascii_case(k))
                .cloned()
                .unwrap_or_else(|| k.clone());
            self.values.insert(key, v.clone());
        }
    }

    /// Collect `JOURNEY_VAR_*` pairs from an environment iterator
    pub fn from_env<I>(env: I) -> BTreeMap<String, String>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        env.into_iter()
            .filter_map(|(k, v)| {
                k.strip_prefix(ENV_PREFIX)
                    .filter(|name| !name.is_empty())
                    .map(|name| (name.to_ascii_lowercase(), v))
            })
            .collect()
    }

    pub fn set(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.values.insert(name.into(), value.into());
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.values.get(name).map(String::as_str)
    }

    pub fn as_map(&self) -> &BTreeMap<String, String> {
        &self.values
    }

    /// Replace every `${name}`; an unknown name is an error
    pub fn interpolate(&self, input: &str) -> E2eResult<String> {
        let mut missing = None;
        let out = PLACEHOLDER.replace_all(input, |caps: &Captures<'_>| match self.get(&caps[1]) {
            Some(v) => v.to_string(),
            None => {
                missing.get_or_insert_with(|| caps[1].to_string());
                String::new()
            }
        });
        match missing {
            Some(name) => Err(E2eError::UnknownVariable(name)),
            None => Ok(out.into_owned()),
        }
    }
}

/// Replace only the placeholders named in `args`, leaving the rest intact
pub fn substitute_known(input: &str, args: &BTreeMap<String, String>) -> String {
    PLACEHOLDER
        .replace_all(input, |caps: &Captures<'_>| match args.get(&caps[1]) {
            Some(v) => v.clone(),
            None => caps[0].to_string(),
        })
        .into_owned()
}
