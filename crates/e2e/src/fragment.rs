//! Fragment expansion
//!
//! `use` steps are replaced by the referenced fragment's steps before a
//! scenario runs. Arguments are substituted into every string of the
//! spliced steps; placeholders that are not fragment parameters are left
//! for runtime interpolation. Fragments may use other fragments.

use std::collections::BTreeMap;

use serde_json::Value;

use crate::error::{E2eError, E2eResult};
use crate::spec::{Fragment, Scenario, Step};
use crate::vars::substitute_known;

/// Return a copy of `scenario` with every `use` step expanded
pub fn expand(scenario: &Scenario, fragments: &BTreeMap<String, Fragment>) -> E2eResult<Scenario> {
    let mut stack = Vec::new();
    let steps = expand_steps(&scenario.steps, fragments, &mut stack)?;
    Ok(Scenario { steps, ..scenario.clone() })
}

fn expand_steps(
    steps: &[Step],
    fragments: &BTreeMap<String, Fragment>,
    stack: &mut Vec<String>,
) -> E2eResult<Vec<Step>> {
    let mut out = Vec::with_capacity(steps.len());

    for step in steps {
        let Step::Use { fragment: name, args } = step else {
            out.push(step.clone());
            continue;
        };

        if stack.iter().any(|s| s == name) {
            stack.push(name.clone());
            return Err(E2eError::FragmentCycle(stack.join(" -> ")));
        }

        let fragment = fragments
            .get(name)
            .ok_or_else(|| E2eError::UnknownFragment(name.clone()))?;

        for param in &fragment.params {
            if !args.contains_key(param) {
                return Err(E2eError::MissingParam {
                    fragment: name.clone(),
                    param: param.clone(),
                });
            }
        }
        if let Some(extra) = args.keys().find(|k| !fragment.params.contains(k)) {
            return Err(E2eError::SpecParse(format!(
                "fragment '{}' has no parameter '{}'",
                name, extra
            )));
        }

        let bound = fragment
            .steps
            .iter()
            .map(|s| bind(s, args))
            .collect::<E2eResult<Vec<_>>>()?;

        stack.push(name.clone());
        out.extend(expand_steps(&bound, fragments, stack)?);
        stack.pop();
    }

    Ok(out)
}

fn bind(step: &Step, args: &BTreeMap<String, String>) -> E2eResult<Step> {
    let mut value = serde_json::to_value(step)?;
    substitute_strings(&mut value, args);
    Ok(serde_json::from_value(value)?)
}

fn substitute_strings(value: &mut Value, args: &BTreeMap<String, String>) {
    match value {
        Value::String(s) => *s = substitute_known(s, args),
        Value::Array(items) => items.iter_mut().for_each(|v| substitute_strings(v, args)),
        Value::Object(map) => map.values_mut().for_each(|v| substitute_strings(v, args)),
        _ => {}
    }
}
