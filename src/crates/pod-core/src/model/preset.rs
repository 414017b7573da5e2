//! Agent presets
//!
//! A preset bundles the prompt, model reference, sampling parameters and tool
//! allowlist that define one agent. Presets are immutable; teams reference
//! them by value.

use serde::{Deserialize, Serialize};

/// Extended-thinking budget for an agent
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ThinkingLevel {
    #[default]
    Off,
    Minimal,
    Low,
    Medium,
    High,
    Xhigh,
}

impl ThinkingLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Off => "off",
            Self::Minimal => "minimal",
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Xhigh => "xhigh",
        }
    }
}

impl From<&str> for ThinkingLevel {
    fn from(s: &str) -> Self {
        match s.trim().to_ascii_lowercase().as_str() {
            "minimal" => Self::Minimal,
            "low" => Self::Low,
            "medium" => Self::Medium,
            "high" => Self::High,
            "xhigh" => Self::Xhigh,
            _ => Self::Off,
        }
    }
}

/// Immutable definition of one agent
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentPreset {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub system_prompt: String,
    /// Model reference, resolved by the LLM client when absent
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    #[serde(default)]
    pub thinking: ThinkingLevel,
    /// Names of tools this agent may call; empty means all available
    #[serde(default)]
    pub tools: Vec<String>,
}

impl AgentPreset {
    /// Minimal preset with just a name and system prompt
    pub fn new(name: impl Into<String>, system_prompt: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            system_prompt: system_prompt.into(),
            model: None,
            temperature: None,
            max_tokens: None,
            thinking: ThinkingLevel::Off,
            tools: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn thinking_level_defaults_off() {
        assert_eq!(ThinkingLevel::from("none"), ThinkingLevel::Off);
        assert_eq!(ThinkingLevel::from("XHIGH"), ThinkingLevel::Xhigh);
    }

    #[test]
    fn preset_yaml_roundtrip() {
        let yaml = r#"
name: reviewer
description: Reviews code for defects
system_prompt: You are a careful reviewer.
model: claude-sonnet
temperature: 0.2
thinking: high
tools: [read_file, grep]
"#;
        let preset: AgentPreset = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(preset.name, "reviewer");
        assert_eq!(preset.thinking, ThinkingLevel::High);
        assert_eq!(preset.tools, vec!["read_file", "grep"]);
    }
}
