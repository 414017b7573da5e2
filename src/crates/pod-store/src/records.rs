//! Persisted row types

use pod_core::model::{
    AgentMessage, AgentStatus, ExecutionStatus, Finding, MergePhase, TokenUsage,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One row of `team_executions`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TeamExecutionRecord {
    pub id: i64,
    pub session_id: String,
    pub team_name: String,
    pub task: String,
    pub status: ExecutionStatus,
    pub agent_count: i64,
    pub error: Option<String>,
    /// Epoch milliseconds
    pub started_at: i64,
    pub completed_at: Option<i64>,
}

/// One row of `agent_results`, with blobs deserialized
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredAgentResult {
    pub id: i64,
    pub execution_id: i64,
    pub agent_name: String,
    pub status: AgentStatus,
    pub findings: Vec<Finding>,
    pub messages: Vec<AgentMessage>,
    pub usage: Option<TokenUsage>,
    pub duration_ms: Option<i64>,
    pub error: Option<String>,
    pub created_at: i64,
    pub updated_at: i64,
}

/// One row of `merge_snapshots`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MergeSnapshotRecord {
    pub id: i64,
    pub execution_id: i64,
    pub phase: MergePhase,
    pub input_data: Value,
    pub output_data: Option<Value>,
    pub created_at: i64,
}

/// Partial update applied to a stored agent result
///
/// Every present field is written; absent fields keep their stored value.
/// `updated_at` is always refreshed.
#[derive(Debug, Clone, Default)]
pub struct AgentResultUpdate {
    pub status: Option<AgentStatus>,
    pub findings: Option<Vec<Finding>>,
    pub messages: Option<Vec<AgentMessage>>,
    pub usage: Option<TokenUsage>,
    pub duration_ms: Option<i64>,
    pub error: Option<Option<String>>,
}

impl AgentResultUpdate {
    pub fn status(status: AgentStatus) -> Self {
        Self {
            status: Some(status),
            ..Self::default()
        }
    }
}
