//! Shared workflow context

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{HashMap, HashSet};

/// Outcome status of one step
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepStatus {
    Completed,
    Failed,
    Skipped,
}

/// Result record for one step, skipped steps included
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowStepResult {
    pub step_id: String,
    pub status: StepStatus,
    /// Step output; shape depends on the step type
    #[serde(default)]
    pub output: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub skip_reason: Option<String>,
    pub duration_ms: u64,
}

/// Mutable state threaded through a workflow run
#[derive(Debug, Clone, Default)]
pub struct WorkflowContext {
    /// Key/value data passed between steps
    pub values: HashMap<String, Value>,
    pub step_results: HashMap<String, WorkflowStepResult>,
    pub completed: HashSet<String>,
    pub skipped: HashSet<String>,
    /// Explicit user decisions: step id → skip?
    pub skip_decisions: HashMap<String, bool>,
    /// Answers for `user`-typed conditions, keyed by condition field
    pub user_choices: HashMap<String, bool>,
    last_completed: Option<String>,
}

impl WorkflowContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_value(mut self, key: &str, value: Value) -> Self {
        self.values.insert(key.to_string(), value);
        self
    }

    /// Record a user decision about skipping a step
    pub fn decide_skip(&mut self, step_id: &str, skip: bool) {
        self.skip_decisions.insert(step_id.to_string(), skip);
    }

    pub fn record_completed(&mut self, result: WorkflowStepResult) {
        self.completed.insert(result.step_id.clone());
        self.last_completed = Some(result.step_id.clone());
        self.step_results.insert(result.step_id.clone(), result);
    }

    pub fn record_skipped(&mut self, result: WorkflowStepResult) {
        self.skipped.insert(result.step_id.clone());
        self.step_results.insert(result.step_id.clone(), result);
    }

    pub fn record_failed(&mut self, result: WorkflowStepResult) {
        self.step_results.insert(result.step_id.clone(), result);
    }

    /// Result of a named step, or of the most recently completed one
    pub fn result_of(&self, step_id: Option<&str>) -> Option<&WorkflowStepResult> {
        match step_id {
            Some(id) => self.step_results.get(id),
            None => self
                .last_completed
                .as_deref()
                .and_then(|id| self.step_results.get(id)),
        }
    }

    /// Substitute `{key}` placeholders with stringified context values
    pub fn render(&self, template: &str) -> String {
        let mut rendered = template.to_string();
        for (key, value) in &self.values {
            let placeholder = format!("{{{}}}", key);
            if rendered.contains(&placeholder) {
                let text = match value {
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                };
                rendered = rendered.replace(&placeholder, &text);
            }
        }
        rendered
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn completed(id: &str) -> WorkflowStepResult {
        WorkflowStepResult {
            step_id: id.to_string(),
            status: StepStatus::Completed,
            output: json!({"ok": true}),
            error: None,
            skip_reason: None,
            duration_ms: 1,
        }
    }

    #[test]
    fn result_of_defaults_to_last_completed() {
        let mut context = WorkflowContext::new();
        context.record_completed(completed("a"));
        context.record_completed(completed("b"));
        assert_eq!(context.result_of(None).unwrap().step_id, "b");
        assert_eq!(context.result_of(Some("a")).unwrap().step_id, "a");
    }

    #[test]
    fn render_substitutes_placeholders() {
        let context = WorkflowContext::new()
            .with_value("target", json!("src/lib.rs"))
            .with_value("depth", json!(3));
        assert_eq!(
            context.render("review {target} at depth {depth}"),
            "review src/lib.rs at depth 3"
        );
    }

    #[test]
    fn render_leaves_unknown_placeholders() {
        let context = WorkflowContext::new();
        assert_eq!(context.render("keep {unknown}"), "keep {unknown}");
    }
}
