//! Workflow definitions

use crate::condition::Condition;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

/// What a step executes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepType {
    /// One agent
    Agent,
    /// A whole team with its merge
    Team,
    /// A concurrent group of single agents
    Parallel,
    /// Branch on a condition
    Conditional,
    /// Emit a checkpoint event and continue
    Checkpoint,
}

/// One node of the workflow DAG
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Step {
    pub id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub step_type: StepType,
    /// Agent preset names, resolved through the preset library
    #[serde(default)]
    pub agents: Vec<String>,
    /// Task template; `{key}` placeholders read the shared context
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<Condition>,
    #[serde(default)]
    pub then_steps: Vec<String>,
    #[serde(default)]
    pub else_steps: Vec<String>,
    #[serde(default)]
    pub skippable: bool,
    #[serde(default)]
    pub skip_by_default: bool,
    #[serde(default)]
    pub depends_on: Vec<String>,
    /// Context keys this step reads (declarative)
    #[serde(default)]
    pub reads: Vec<String>,
    /// Context keys set to the step's output after success
    #[serde(default)]
    pub writes: Vec<String>,
}

impl Step {
    pub fn new(id: &str, step_type: StepType) -> Self {
        Self {
            id: id.to_string(),
            name: id.to_string(),
            step_type,
            agents: Vec::new(),
            task: None,
            condition: None,
            then_steps: Vec::new(),
            else_steps: Vec::new(),
            skippable: false,
            skip_by_default: false,
            depends_on: Vec::new(),
            reads: Vec::new(),
            writes: Vec::new(),
        }
    }
}

/// A named DAG of steps
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowDefinition {
    pub id: String,
    pub name: String,
    /// Steps in definition order
    pub steps: Vec<Step>,
    pub entry_step: String,
    #[serde(default)]
    pub exit_steps: Vec<String>,
    /// Seed values for the shared context
    #[serde(default)]
    pub default_context: HashMap<String, Value>,
}

impl WorkflowDefinition {
    pub fn step(&self, id: &str) -> Option<&Step> {
        self.steps.iter().find(|step| step.id == id)
    }
}
