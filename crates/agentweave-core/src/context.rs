//! Execution context threaded through one interpreter run.
//!
//! Created fresh per run and dropped at the end. The user profile is a
//! read-only snapshot taken when the run starts; handlers change the rest
//! only through [`ContextPatch`].

use crate::{ConditionOperator, ConditionParams};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};

/// Caller-supplied key/value snapshot (e.g. onboarding answers).
pub type UserProfile = BTreeMap<String, String>;

/// Variable names with built-in meaning in condition nodes.
pub const INPUT_VARIABLE: &str = "input";
pub const LAST_OUTPUT_VARIABLE: &str = "last_output";
pub const USER_PROFILE_PREFIX: &str = "user_profile.";

#[derive(Debug, Clone, Default)]
pub struct ExecutionContext {
    /// The triggering text, usually the user's message.
    pub input: String,

    /// Output of the most recent generative node. `None` until one runs.
    pub last_output: Option<String>,

    /// Named variables written by handlers. Generative nodes store their
    /// output under their node id; classifiers also set `intent`.
    pub variables: HashMap<String, Value>,

    user_profile: UserProfile,
}

/// Changes a handler asks the interpreter to merge into the context.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ContextPatch {
    pub last_output: Option<String>,
    pub variables: Vec<(String, Value)>,
}

impl ContextPatch {
    pub fn with_last_output(mut self, output: impl Into<String>) -> Self {
        self.last_output = Some(output.into());
        self
    }

    pub fn with_variable(mut self, name: impl Into<String>, value: Value) -> Self {
        self.variables.push((name.into(), value));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.last_output.is_none() && self.variables.is_empty()
    }
}

impl ExecutionContext {
    pub fn new(input: impl Into<String>, user_profile: UserProfile) -> Self {
        Self {
            input: input.into(),
            user_profile,
            ..Default::default()
        }
    }

    pub fn user_profile(&self) -> &UserProfile {
        &self.user_profile
    }

    pub fn apply(&mut self, patch: ContextPatch) {
        if let Some(output) = patch.last_output {
            self.last_output = Some(output);
        }
        for (name, value) in patch.variables {
            self.variables.insert(name, value);
        }
    }

    /// What an `end` node emits: the last generated text, else the input.
    pub fn final_output(&self) -> &str {
        self.last_output.as_deref().unwrap_or(&self.input)
    }

    /// Resolve a condition variable to a concrete value.
    ///
    /// - `input` (or an empty name) → the run's input.
    /// - `last_output` / `context` → last generated text, `Null` if none yet.
    /// - `user_profile.<key>` → that profile entry, `Null` if missing.
    /// - anything else → the named variable, `Null` if unset.
    pub fn resolve_variable(&self, name: &str) -> Value {
        let name = name.trim();
        match name {
            "" | INPUT_VARIABLE => Value::String(self.input.clone()),
            LAST_OUTPUT_VARIABLE | "lastOutput" | "context" => self
                .last_output
                .clone()
                .map(Value::String)
                .unwrap_or(Value::Null),
            _ => {
                if let Some(key) = name.strip_prefix(USER_PROFILE_PREFIX) {
                    return self
                        .user_profile
                        .get(key)
                        .cloned()
                        .map(Value::String)
                        .unwrap_or(Value::Null);
                }
                self.variables.get(name).cloned().unwrap_or(Value::Null)
            }
        }
    }

    /// Evaluate a condition node's test against the current state.
    pub fn evaluate_condition(&self, condition: &ConditionParams) -> bool {
        let left = self.resolve_variable(&condition.variable);
        evaluate_operator(condition.operator, &left, &condition.value)
    }
}

// ---------------------------------------------------------------------------
// Private helpers
// ---------------------------------------------------------------------------

/// Apply an operator to a resolved value and the node's comparison text.
fn evaluate_operator(op: ConditionOperator, left: &Value, right: &str) -> bool {
    match op {
        ConditionOperator::Contains => {
            as_text(left).to_lowercase().contains(&right.to_lowercase())
        }
        ConditionOperator::Equals => values_equal(left, right),
        ConditionOperator::Empty => is_empty(left),
        ConditionOperator::NotEmpty => !is_empty(left),
        ConditionOperator::Greater => compare_numbers(left, right, |l, r| l > r),
        ConditionOperator::Less => compare_numbers(left, right, |l, r| l < r),
    }
}

/// Render a value as comparison text. `Null` is the empty string.
fn as_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// A value is empty when it is null, blank text, or an empty collection.
fn is_empty(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.trim().is_empty(),
        Value::Array(a) => a.is_empty(),
        Value::Object(o) => o.is_empty(),
        Value::Bool(_) | Value::Number(_) => false,
    }
}

/// Equality with light coercion: numbers compare numerically when both
/// sides parse, everything else compares as trimmed, case-insensitive text.
fn values_equal(left: &Value, right: &str) -> bool {
    if let (Some(l), Some(r)) = (value_as_f64(left), right.trim().parse::<f64>().ok()) {
        return (l - r).abs() < f64::EPSILON;
    }
    as_text(left).trim().eq_ignore_ascii_case(right.trim())
}

fn compare_numbers(left: &Value, right: &str, cmp: impl Fn(f64, f64) -> bool) -> bool {
    match (value_as_f64(left), right.trim().parse::<f64>().ok()) {
        (Some(l), Some(r)) => cmp(l, r),
        _ => false,
    }
}

/// Works for `Value::Number` and strings that parse as f64.
fn value_as_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
