//! Branch condition evaluation

use crate::context::WorkflowContext;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Where a condition reads its subject from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConditionType {
    /// Read the workflow context by field
    Context,
    /// Read a prior step result by field
    Result,
    /// Read a recorded user choice by field
    User,
    Always,
    Never,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConditionOperator {
    Exists,
    Equals,
    Contains,
    Gt,
    Lt,
    Empty,
    NotEmpty,
}

impl Default for ConditionOperator {
    fn default() -> Self {
        Self::Exists
    }
}

/// A branch condition on a conditional step
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Condition {
    #[serde(rename = "type")]
    pub condition_type: ConditionType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
    #[serde(default)]
    pub operator: ConditionOperator,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
    /// For `result` conditions: which step, defaulting to the last completed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub step: Option<String>,
}

impl Condition {
    pub fn always() -> Self {
        Self {
            condition_type: ConditionType::Always,
            field: None,
            operator: ConditionOperator::Exists,
            value: None,
            step: None,
        }
    }

    /// Evaluate against the current context
    ///
    /// A missing field never errors: with `exists` it is false, and the
    /// other operators treat it as an absent value.
    pub fn evaluate(&self, context: &WorkflowContext) -> bool {
        match self.condition_type {
            ConditionType::Always => true,
            ConditionType::Never => false,
            ConditionType::User => self
                .field
                .as_deref()
                .and_then(|field| context.user_choices.get(field).copied())
                .unwrap_or(false),
            ConditionType::Context => {
                let subject = self
                    .field
                    .as_deref()
                    .and_then(|field| context.values.get(field));
                apply(self.operator, subject, self.value.as_ref())
            }
            ConditionType::Result => {
                let result = context.result_of(self.step.as_deref());
                let subject = result.and_then(|r| {
                    self.field.as_deref().and_then(|field| r.output.get(field))
                });
                apply(self.operator, subject, self.value.as_ref())
            }
        }
    }
}

fn apply(operator: ConditionOperator, subject: Option<&Value>, expected: Option<&Value>) -> bool {
    match operator {
        ConditionOperator::Exists => subject.is_some(),
        ConditionOperator::Equals => match (subject, expected) {
            (Some(actual), Some(expected)) => actual == expected,
            _ => false,
        },
        ConditionOperator::Contains => match (subject, expected) {
            (Some(Value::String(haystack)), Some(Value::String(needle))) => {
                haystack.contains(needle.as_str())
            }
            (Some(Value::Array(items)), Some(expected)) => items.contains(expected),
            _ => false,
        },
        ConditionOperator::Gt => compare(subject, expected, |a, b| a > b),
        ConditionOperator::Lt => compare(subject, expected, |a, b| a < b),
        ConditionOperator::Empty => match subject {
            None | Some(Value::Null) => true,
            Some(Value::String(s)) => s.is_empty(),
            Some(Value::Array(items)) => items.is_empty(),
            Some(Value::Object(map)) => map.is_empty(),
            Some(_) => false,
        },
        ConditionOperator::NotEmpty => !apply(ConditionOperator::Empty, subject, expected),
    }
}

fn compare(
    subject: Option<&Value>,
    expected: Option<&Value>,
    op: impl Fn(f64, f64) -> bool,
) -> bool {
    match (
        subject.and_then(Value::as_f64),
        expected.and_then(Value::as_f64),
    ) {
        (Some(a), Some(b)) => op(a, b),
        _ => false,
    }
}
