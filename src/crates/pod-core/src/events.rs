//! Agent loop events
//!
//! One tagged union shared by the in-process agent loop and the subagent
//! subprocess protocol (one JSON event per stdout line). Unknown event types
//! deserialize to [`AgentEvent::Unknown`] and are ignored by consumers.

use crate::model::{AgentMessage, TokenUsage};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Why an agent loop stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    /// Loop ran to completion
    Done,
    /// Loop failed
    Error,
    /// Loop was cancelled externally
    Aborted,
}

/// Events produced during one agent execution
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AgentEvent {
    /// A tool call began executing
    ToolExecutionStart {
        id: String,
        name: String,
        #[serde(default)]
        args: Value,
    },
    /// A tool call finished
    ToolExecutionEnd {
        id: String,
        #[serde(default)]
        is_error: bool,
        /// Text content of the tool result, when the tool produced any
        #[serde(default, skip_serializing_if = "Option::is_none")]
        text: Option<String>,
    },
    /// Streaming delta for the message currently being produced
    MessageUpdate { message: AgentMessage },
    /// A message finished; assistant messages carry final usage
    MessageEnd { message: AgentMessage },
    /// A tool-result message was appended to the transcript
    ToolResultEnd { message: AgentMessage },
    /// The agent loop terminated
    AgentEnd {
        stop_reason: StopReason,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        usage: Option<TokenUsage>,
    },
    /// Any event type this runtime does not recognize
    #[serde(other)]
    Unknown,
}

impl AgentEvent {
    /// Whether this event terminates the agent loop
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::AgentEnd { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tagged_roundtrip() {
        let event = AgentEvent::ToolExecutionStart {
            id: "call-1".into(),
            name: "read_file".into(),
            args: serde_json::json!({"path": "src/main.rs"}),
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains(r#""type":"tool_execution_start""#));
        let back: AgentEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(event, back);
    }

    #[test]
    fn unknown_event_types_are_tolerated() {
        let event: AgentEvent =
            serde_json::from_str(r#"{"type":"telemetry_ping"}"#).unwrap();
        assert_eq!(event, AgentEvent::Unknown);
    }

    #[test]
    fn agent_end_is_terminal() {
        let event = AgentEvent::AgentEnd {
            stop_reason: StopReason::Done,
            error: None,
            usage: None,
        };
        assert!(event.is_terminal());
    }
}
