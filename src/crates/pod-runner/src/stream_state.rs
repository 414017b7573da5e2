//! Per-child stream accounting
//!
//! Folds the child's event stream into an [`AgentResult`]: transcript
//! messages, live and historical tool calls, accumulated text, and summed
//! token usage. Progress callbacks are throttled to one per 100 ms.

use pod_core::events::{AgentEvent, StopReason};
use pod_core::findings;
use pod_core::model::{
    AgentMessage, AgentResult, ContentBlock, MessageRole, TokenUsage,
};
use serde_json::Value;
use std::collections::HashMap;
use std::time::{Duration, Instant};

/// Minimum spacing between progress callbacks
pub const UPDATE_THROTTLE: Duration = Duration::from_millis(100);

/// One tool call observed on the stream
#[derive(Debug, Clone, PartialEq)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    pub args: Value,
    pub done: bool,
    pub is_error: bool,
}

/// Progress snapshot handed to update callbacks
#[derive(Debug, Clone)]
pub struct ExecutionProgress {
    pub agent_name: String,
    pub current_text: String,
    pub current_thinking: String,
    /// Tool calls still in flight
    pub live_tools: Vec<ToolCall>,
    /// All tool calls seen so far
    pub tools_seen: usize,
    pub usage: TokenUsage,
}

/// Callback invoked with throttled progress snapshots
pub type UpdateFn = dyn Fn(ExecutionProgress) + Send + Sync;

/// Mutable accounting for one child's event stream
#[derive(Debug)]
pub struct StreamState {
    agent_name: String,
    messages: Vec<AgentMessage>,
    live_tools: HashMap<String, ToolCall>,
    all_tools: Vec<ToolCall>,
    current_text: String,
    current_thinking: String,
    usage: TokenUsage,
    stop: Option<(StopReason, Option<String>)>,
    last_update: Option<Instant>,
}

impl StreamState {
    pub fn new(agent_name: &str) -> Self {
        Self {
            agent_name: agent_name.to_string(),
            messages: Vec::new(),
            live_tools: HashMap::new(),
            all_tools: Vec::new(),
            current_text: String::new(),
            current_thinking: String::new(),
            usage: TokenUsage::default(),
            stop: None,
            last_update: None,
        }
    }

    /// Fold one event into the state
    pub fn apply(&mut self, event: AgentEvent) {
        match event {
            AgentEvent::ToolExecutionStart { id, name, args } => {
                let call = ToolCall {
                    id: id.clone(),
                    name,
                    args,
                    done: false,
                    is_error: false,
                };
                self.all_tools.push(call.clone());
                self.live_tools.insert(id, call);
            }
            AgentEvent::ToolExecutionEnd { id, is_error, .. } => {
                if let Some(call) = self.live_tools.get_mut(&id) {
                    call.done = true;
                    call.is_error = is_error;
                }
                if let Some(call) = self.all_tools.iter_mut().find(|c| c.id == id) {
                    call.done = true;
                    call.is_error = is_error;
                }
            }
            AgentEvent::MessageUpdate { message } => {
                self.current_text = text_blocks(&message, false);
                self.current_thinking = text_blocks(&message, true);
            }
            AgentEvent::MessageEnd { message } => {
                if message.role == MessageRole::Assistant {
                    if let Some(usage) = &message.usage {
                        self.usage.add(usage);
                    }
                    self.current_text.clear();
                    self.current_thinking.clear();
                    self.live_tools.retain(|_, call| !call.done);
                }
                self.messages.push(message);
            }
            AgentEvent::ToolResultEnd { message } => {
                self.messages.push(message);
            }
            AgentEvent::AgentEnd {
                stop_reason,
                error,
                usage,
            } => {
                if let Some(usage) = usage {
                    // Final report from the child wins over the running sum
                    self.usage = usage;
                }
                self.stop = Some((stop_reason, error));
            }
            AgentEvent::Unknown => {}
        }
    }

    /// Whether enough time has passed to emit another progress callback
    pub fn should_emit_update(&mut self) -> bool {
        let now = Instant::now();
        match self.last_update {
            Some(last) if now.duration_since(last) < UPDATE_THROTTLE => false,
            _ => {
                self.last_update = Some(now);
                true
            }
        }
    }

    pub fn snapshot(&self) -> ExecutionProgress {
        let mut live_tools: Vec<ToolCall> = self.live_tools.values().cloned().collect();
        live_tools.sort_by(|a, b| a.id.cmp(&b.id));
        ExecutionProgress {
            agent_name: self.agent_name.clone(),
            current_text: self.current_text.clone(),
            current_thinking: self.current_thinking.clone(),
            live_tools,
            tools_seen: self.all_tools.len(),
            usage: self.usage,
        }
    }

    pub fn stop_reason(&self) -> Option<StopReason> {
        self.stop.as_ref().map(|(reason, _)| *reason)
    }

    /// Finish accounting and produce the agent result
    ///
    /// `exit_ok` reflects the child's exit status. Failure comes from a
    /// non-zero exit or a stop reason of error/aborted.
    pub fn into_result(self, exit_ok: bool, duration_ms: u64) -> AgentResult {
        let (stop_reason, stop_error) = self
            .stop
            .unwrap_or((StopReason::Error, Some("agent loop produced no agent_end".into())));
        let success = exit_ok && stop_reason == StopReason::Done;
        let error = if success {
            None
        } else {
            Some(stop_error.unwrap_or_else(|| match stop_reason {
                StopReason::Aborted => "Aborted".to_string(),
                _ => "child process failed".to_string(),
            }))
        };
        let parsed = findings::parse(&self.agent_name, &self.messages);
        AgentResult {
            agent_name: self.agent_name,
            success,
            error,
            messages: self.messages,
            findings: parsed,
            duration_ms,
            usage: self.usage,
        }
    }
}

fn text_blocks(message: &AgentMessage, thinking: bool) -> String {
    message
        .content
        .iter()
        .filter_map(|block| match block {
            ContentBlock::Text { text } if !thinking => Some(text.as_str()),
            ContentBlock::Thinking { text } if thinking => Some(text.as_str()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("\n")
}
