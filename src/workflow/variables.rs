// PromptChain — `{name}` placeholder extraction, substitution and validation

use super::{VariableDefinition, Workflow};
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, HashSet};
use std::sync::OnceLock;
use thiserror::Error;

/// Runtime values keyed by variable name.
pub type VariableValues = BTreeMap<String, String>;

#[derive(Error, Debug, PartialEq)]
pub enum VariableError {
    #[error("variable '{name}' must be a string, number or boolean")]
    NotAString { name: String },
    #[error("variables must be a JSON object")]
    NotAnObject,
}

/// Outcome of checking a template against a set of definitions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Validation {
    pub is_valid: bool,
    pub missing: Vec<String>,
    pub unused: Vec<String>,
}

fn placeholder_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\{([^}]+)\}").expect("placeholder pattern is valid"))
}

/// Distinct placeholder names in first-seen order.
///
/// There is no escape syntax: any `{...}` run without a closing brace inside
/// is a placeholder.
pub fn extract_variables(template: &str) -> Vec<String> {
    let mut seen = HashSet::new();
    placeholder_regex()
        .captures_iter(template)
        .filter_map(|c| c.get(1).map(|m| m.as_str()))
        .filter(|name| seen.insert(*name))
        .map(str::to_string)
        .collect()
}

/// Replace every `{name}` for each supplied value. Names without a value stay verbatim.
pub fn substitute(template: &str, values: &VariableValues) -> String {
    let mut result = template.to_string();
    for (name, value) in values {
        let placeholder = format!("{{{}}}", name);
        result = result.replace(&placeholder, value);
    }
    result
}

pub fn validate(template: &str, definitions: &[VariableDefinition]) -> Validation {
    let referenced = extract_variables(template);
    let defined: Vec<&str> = definitions.iter().map(|d| d.name.as_str()).collect();

    let missing: Vec<String> = referenced
        .iter()
        .filter(|name| !defined.contains(&name.as_str()))
        .cloned()
        .collect();
    let unused: Vec<String> = defined
        .iter()
        .filter(|name| !referenced.iter().any(|r| r == *name))
        .map(|name| name.to_string())
        .collect();

    Validation {
        is_valid: missing.is_empty(),
        missing,
        unused,
    }
}

// ---------------------------------------------------------------------------
// Pre-execution helpers
// ---------------------------------------------------------------------------

/// Every placeholder referenced by any node prompt, first-seen order.
pub fn required_variables(workflow: &Workflow) -> Vec<String> {
    let mut required: Vec<String> = Vec::new();
    for node in &workflow.nodes {
        if let Some(prompt) = node.data.prompt.as_deref() {
            for name in extract_variables(prompt) {
                if !required.contains(&name) {
                    required.push(name);
                }
            }
        }
    }
    required
}

/// Starting values for each required variable, taken from the definitions' defaults.
pub fn initial_values(workflow: &Workflow) -> VariableValues {
    required_variables(workflow)
        .into_iter()
        .map(|name| {
            let value = workflow
                .variable(&name)
                .map(|d| d.value.clone())
                .unwrap_or_default();
            (name, value)
        })
        .collect()
}

/// True when every required variable has a non-blank value.
pub fn is_ready(required: &[String], values: &VariableValues) -> bool {
    required
        .iter()
        .all(|name| values.get(name).is_some_and(|v| !v.trim().is_empty()))
}

/// Normalize loosely-typed values received over the message boundary.
pub fn coerce_values(raw: &Value) -> Result<VariableValues, VariableError> {
    let obj = match raw {
        Value::Object(obj) => obj,
        Value::Null => return Ok(VariableValues::new()),
        _ => return Err(VariableError::NotAnObject),
    };

    obj.iter()
        .map(|(name, value)| {
            let s = match value {
                Value::String(s) => s.clone(),
                Value::Number(n) => n.to_string(),
                Value::Bool(b) => b.to_string(),
                _ => return Err(VariableError::NotAString { name: name.clone() }),
            };
            Ok((name.clone(), s))
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
