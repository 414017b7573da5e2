//! Workflow execution events

use crate::context::WorkflowStepResult;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

fn now_ms() -> i64 {
    Utc::now().timestamp_millis()
}

/// Final result of a workflow run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowResult {
    pub workflow_id: String,
    pub name: String,
    /// True when no executed step failed
    pub success: bool,
    pub step_results: HashMap<String, WorkflowStepResult>,
    /// Final context values
    pub context: HashMap<String, Value>,
    pub duration_ms: u64,
}

/// Events emitted while a workflow runs
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WorkflowEvent {
    WorkflowStart {
        workflow_id: String,
        name: String,
        step_count: usize,
        timestamp: i64,
    },
    StepStart {
        step_id: String,
        name: String,
        timestamp: i64,
    },
    StepSkip {
        step_id: String,
        reason: String,
        timestamp: i64,
    },
    StepComplete {
        step_id: String,
        timestamp: i64,
    },
    StepError {
        step_id: String,
        error: String,
        timestamp: i64,
    },
    /// A conditional chose its branch
    Branch {
        step_id: String,
        condition_met: bool,
        taken: Vec<String>,
        timestamp: i64,
    },
    Checkpoint {
        step_id: String,
        timestamp: i64,
    },
    /// Terminal event
    WorkflowComplete {
        result: WorkflowResult,
        timestamp: i64,
    },
}

impl WorkflowEvent {
    pub fn workflow_start(workflow_id: &str, name: &str, step_count: usize) -> Self {
        Self::WorkflowStart {
            workflow_id: workflow_id.to_string(),
            name: name.to_string(),
            step_count,
            timestamp: now_ms(),
        }
    }

    pub fn step_start(step_id: &str, name: &str) -> Self {
        Self::StepStart {
            step_id: step_id.to_string(),
            name: name.to_string(),
            timestamp: now_ms(),
        }
    }

    pub fn step_skip(step_id: &str, reason: &str) -> Self {
        Self::StepSkip {
            step_id: step_id.to_string(),
            reason: reason.to_string(),
            timestamp: now_ms(),
        }
    }

    pub fn step_complete(step_id: &str) -> Self {
        Self::StepComplete {
            step_id: step_id.to_string(),
            timestamp: now_ms(),
        }
    }

    pub fn step_error(step_id: &str, error: &str) -> Self {
        Self::StepError {
            step_id: step_id.to_string(),
            error: error.to_string(),
            timestamp: now_ms(),
        }
    }

    pub fn branch(step_id: &str, condition_met: bool, taken: Vec<String>) -> Self {
        Self::Branch {
            step_id: step_id.to_string(),
            condition_met,
            taken,
            timestamp: now_ms(),
        }
    }

    pub fn checkpoint(step_id: &str) -> Self {
        Self::Checkpoint {
            step_id: step_id.to_string(),
            timestamp: now_ms(),
        }
    }

    pub fn workflow_complete(result: WorkflowResult) -> Self {
        Self::WorkflowComplete {
            result,
            timestamp: now_ms(),
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::WorkflowComplete { .. })
    }
}
