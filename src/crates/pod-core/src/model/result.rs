//! Agent execution results and message transcripts

use crate::model::finding::{Finding, FindingCluster};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Role of a transcript message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageRole {
    User,
    Assistant,
    ToolResult,
    Custom,
}

/// One content block inside a message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlock {
    Text { text: String },
    Thinking { text: String },
    /// Opaque block the runtime forwards without interpreting
    Other { data: Value },
}

impl ContentBlock {
    /// Text payload if this is a text block
    pub fn text(&self) -> Option<&str> {
        match self {
            Self::Text { text } => Some(text),
            _ => None,
        }
    }
}

/// Token usage for one agent execution
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct TokenUsage {
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub cache_read_tokens: u64,
    pub cache_write_tokens: u64,
    /// Cost in USD as reported by the provider
    pub cost: f64,
}

impl TokenUsage {
    /// Accumulate another usage report into this one
    pub fn add(&mut self, other: &TokenUsage) {
        self.input_tokens += other.input_tokens;
        self.output_tokens += other.output_tokens;
        self.cache_read_tokens += other.cache_read_tokens;
        self.cache_write_tokens += other.cache_write_tokens;
        self.cost += other.cost;
    }
}

/// A message in an agent transcript
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentMessage {
    pub role: MessageRole,
    pub content: Vec<ContentBlock>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub usage: Option<TokenUsage>,
}

impl AgentMessage {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: MessageRole::User,
            content: vec![ContentBlock::Text { text: text.into() }],
            usage: None,
        }
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self {
            role: MessageRole::Assistant,
            content: vec![ContentBlock::Text { text: text.into() }],
            usage: None,
        }
    }

    /// Concatenated text of all text blocks
    pub fn text(&self) -> String {
        self.content
            .iter()
            .filter_map(ContentBlock::text)
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Result of one agent execution, immutable once emitted
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentResult {
    pub agent_name: String,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub messages: Vec<AgentMessage>,
    pub findings: Vec<Finding>,
    pub duration_ms: u64,
    pub usage: TokenUsage,
}

impl AgentResult {
    /// Synthesize a failed result carrying an error message
    pub fn failed(agent_name: &str, error: impl Into<String>) -> Self {
        Self {
            agent_name: agent_name.to_string(),
            success: false,
            error: Some(error.into()),
            messages: Vec::new(),
            findings: Vec::new(),
            duration_ms: 0,
            usage: TokenUsage::default(),
        }
    }

    /// Final assistant text in the transcript, empty when none
    pub fn final_text(&self) -> String {
        self.messages
            .iter()
            .rev()
            .find(|m| m.role == MessageRole::Assistant)
            .map(|m| m.text())
            .unwrap_or_default()
    }
}

/// Merged findings, clusters and summary
///
/// This is the contractual schema of the final merge snapshot's output data.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct MergeOutcome {
    pub findings: Vec<Finding>,
    #[serde(default)]
    pub clusters: Vec<FindingCluster>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
}

/// Final result of a team run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TeamResult {
    pub team_name: String,
    /// True when at least one agent succeeded
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub agent_results: Vec<AgentResult>,
    /// Findings after the merge phase
    pub findings: Vec<Finding>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub clusters: Vec<FindingCluster>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    pub duration_ms: u64,
    /// Usage summed across all agents
    pub total_usage: TokenUsage,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn usage_accumulates() {
        let mut total = TokenUsage::default();
        total.add(&TokenUsage {
            input_tokens: 100,
            output_tokens: 50,
            cache_read_tokens: 10,
            cache_write_tokens: 5,
            cost: 0.25,
        });
        total.add(&TokenUsage {
            input_tokens: 10,
            output_tokens: 5,
            ..Default::default()
        });
        assert_eq!(total.input_tokens, 110);
        assert_eq!(total.output_tokens, 55);
        assert!((total.cost - 0.25).abs() < f64::EPSILON);
    }

    #[test]
    fn final_text_picks_last_assistant_message() {
        let result = AgentResult {
            agent_name: "reviewer".into(),
            success: true,
            error: None,
            messages: vec![
                AgentMessage::user("task"),
                AgentMessage::assistant("first"),
                AgentMessage::assistant("second"),
            ],
            findings: Vec::new(),
            duration_ms: 1,
            usage: TokenUsage::default(),
        };
        assert_eq!(result.final_text(), "second");
    }
}
