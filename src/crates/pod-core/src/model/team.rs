//! Team configuration

use crate::model::preset::AgentPreset;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// How a team's agents are scheduled
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TeamStrategy {
    #[default]
    Parallel,
    Sequential,
}

impl TeamStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Parallel => "parallel",
            Self::Sequential => "sequential",
        }
    }
}

/// Description of a tool made available to a team's agents
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDescriptor {
    pub name: String,
    #[serde(default)]
    pub description: String,
    /// JSON schema for the tool's parameters
    #[serde(default)]
    pub parameters: Value,
}

/// Merge configuration for a team
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MergeConfig {
    /// Strategy name resolved through the merge registry
    pub strategy: String,
    /// Preset for the merge agent, used by strategies that spawn one
    #[serde(skip_serializing_if = "Option::is_none")]
    pub merge_agent: Option<AgentPreset>,
}

impl Default for MergeConfig {
    fn default() -> Self {
        Self {
            strategy: "noop".to_string(),
            merge_agent: None,
        }
    }
}

fn default_max_retries() -> u32 {
    1
}

fn default_continue_on_error() -> bool {
    true
}

/// A named set of agents run together against one task
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TeamConfig {
    pub name: String,
    /// Agents in dispatch order
    pub agents: Vec<AgentPreset>,
    #[serde(default)]
    pub tools: Vec<ToolDescriptor>,
    #[serde(default)]
    pub strategy: TeamStrategy,
    #[serde(default)]
    pub merge: MergeConfig,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_continue_on_error")]
    pub continue_on_error: bool,
}

impl TeamConfig {
    pub fn new(name: impl Into<String>, agents: Vec<AgentPreset>) -> Self {
        Self {
            name: name.into(),
            agents,
            tools: Vec::new(),
            strategy: TeamStrategy::default(),
            merge: MergeConfig::default(),
            max_retries: default_max_retries(),
            continue_on_error: default_continue_on_error(),
        }
    }
}
