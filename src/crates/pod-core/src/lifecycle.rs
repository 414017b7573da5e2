//! Session lifecycle state
//!
//! Explicit per-session counters that in earlier designs lived as
//! process-wide statics. One [`SessionLifecycle`] is owned by the session
//! that runs teams and workflows; engines call the hooks at the matching
//! points and apply any returned message to the agent's prompt context.

use serde::{Deserialize, Serialize};

/// Interval, in turns, between reminders injected into agent prompts
const NUDGE_INTERVAL: u64 = 10;

/// Outcome of [`SessionLifecycle::on_before_agent_start`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptDecision {
    /// Prompt to dispatch, possibly rewritten
    pub prompt: String,
    /// Optional message the engine should surface alongside the prompt
    pub message: Option<String>,
}

/// Mutable per-session counters
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SessionLifecycle {
    /// Agent dispatches seen this session
    turns: u64,
    /// Tool calls issued across all agents
    tool_calls: u64,
    /// Tool results observed across all agents
    tool_results: u64,
    /// Turn at which the last reminder was injected
    last_nudge_turn: u64,
    started: bool,
}

impl SessionLifecycle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_session_start(&mut self) {
        *self = Self {
            started: true,
            ..Self::default()
        };
    }

    pub fn on_session_shutdown(&mut self) {
        self.started = false;
    }

    pub fn on_tool_call(&mut self) {
        self.tool_calls += 1;
    }

    pub fn on_tool_result(&mut self) {
        self.tool_results += 1;
    }

    /// Called before each agent dispatch
    ///
    /// Counts the turn and, every [`NUDGE_INTERVAL`] turns, attaches a
    /// reminder message about accumulated tool activity. The prompt itself is
    /// returned unchanged.
    pub fn on_before_agent_start(&mut self, prompt: &str) -> PromptDecision {
        self.turns += 1;
        let message = if self.turns >= self.last_nudge_turn + NUDGE_INTERVAL {
            self.last_nudge_turn = self.turns;
            Some(format!(
                "{} agent runs this session, {} tool calls so far",
                self.turns, self.tool_calls
            ))
        } else {
            None
        };
        PromptDecision {
            prompt: prompt.to_string(),
            message,
        }
    }

    pub fn turns(&self) -> u64 {
        self.turns
    }

    pub fn tool_calls(&self) -> u64 {
        self.tool_calls
    }

    pub fn is_started(&self) -> bool {
        self.started
    }
}
