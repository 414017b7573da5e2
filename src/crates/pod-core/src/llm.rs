//! LLM client seam
//!
//! The runtime never speaks a provider protocol itself. It drives agents
//! through [`AgentLoop`], an interface implemented by the external LLM
//! client, and consumes the event stream it returns. Tools are likewise
//! reached through the narrow [`Tool`] interface.

use crate::abort::AbortSignal;
use crate::error::Result;
use crate::events::AgentEvent;
use crate::model::{ContentBlock, ThinkingLevel, ToolDescriptor};
use async_trait::async_trait;
use futures::Stream;
use serde_json::Value;
use std::path::PathBuf;
use std::pin::Pin;
use std::sync::Arc;

/// Prompts for one agent execution
#[derive(Debug, Clone)]
pub struct AgentPrompts {
    pub system_prompt: String,
    pub task: String,
}

/// Execution context for one agent loop
#[derive(Debug, Clone, Default)]
pub struct LoopContext {
    /// Working directory the agent's tools operate in
    pub cwd: Option<PathBuf>,
    /// Tools available to the agent
    pub tools: Vec<ToolDescriptor>,
}

/// Sampling and routing options for one agent loop
#[derive(Debug, Clone, Default)]
pub struct LoopOptions {
    pub provider: Option<String>,
    pub model: Option<String>,
    pub temperature: Option<f64>,
    pub max_tokens: Option<u32>,
    pub thinking: ThinkingLevel,
}

/// Stream of events produced by one agent loop
pub type AgentEventStream = Pin<Box<dyn Stream<Item = AgentEvent> + Send>>;

/// The agent loop implemented by the external LLM client
///
/// The returned stream ends with exactly one `agent_end` event. The loop must
/// observe the abort signal at every suspension point.
#[async_trait]
pub trait AgentLoop: Send + Sync {
    async fn run(
        &self,
        prompts: AgentPrompts,
        context: LoopContext,
        options: LoopOptions,
        signal: AbortSignal,
    ) -> Result<AgentEventStream>;
}

/// Output of one tool execution
#[derive(Debug, Clone)]
pub struct ToolOutput {
    pub content: Vec<ContentBlock>,
    pub details: Option<Value>,
}

impl ToolOutput {
    /// Concatenated text of all text content blocks
    pub fn text(&self) -> String {
        self.content
            .iter()
            .filter_map(ContentBlock::text)
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Progress callback for long-running tools
pub type ToolUpdateFn = dyn Fn(String) + Send + Sync;

/// A tool callable by agents
#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;
    fn description(&self) -> &str;
    /// JSON schema of the tool's parameters
    fn parameters(&self) -> Value;
    async fn execute(
        &self,
        call_id: &str,
        params: Value,
        signal: &AbortSignal,
        on_update: Option<&ToolUpdateFn>,
    ) -> Result<ToolOutput>;
}

/// Resolves a provider name to its API key, or None when unavailable
pub type KeyResolver = Arc<dyn Fn(&str) -> Option<String> + Send + Sync>;
