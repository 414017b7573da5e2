//! Team execution events

use chrono::Utc;
use pod_core::model::{AgentResult, MergePhase, TeamResult};
use serde::{Deserialize, Serialize};

fn now_ms() -> i64 {
    Utc::now().timestamp_millis()
}

/// Events emitted while a team runs
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TeamEvent {
    /// Team execution started
    TeamStart {
        team_name: String,
        task: String,
        agent_count: usize,
        execution_id: Option<i64>,
        timestamp: i64,
    },
    /// One agent was dispatched
    AgentStart {
        agent_name: String,
        attempt: u32,
        timestamp: i64,
    },
    /// An agent attempt failed
    AgentError {
        agent_name: String,
        error: String,
        will_retry: bool,
        timestamp: i64,
    },
    /// An agent is being retried
    AgentRetry {
        agent_name: String,
        attempt: u32,
        timestamp: i64,
    },
    /// Forwarded event from an agent's own loop
    AgentEvent {
        agent_name: String,
        event: pod_core::events::AgentEvent,
    },
    /// Task-manager progress changed for an agent
    AgentTaskUpdate {
        agent_name: String,
        total: usize,
        completed: usize,
        active_task_title: Option<String>,
        timestamp: i64,
    },
    /// One agent finished (successfully or not)
    AgentEnd {
        agent_name: String,
        result: AgentResult,
        timestamp: i64,
    },
    /// All agents done, merge began
    MergeStart {
        finding_count: usize,
        timestamp: i64,
    },
    /// Merge moved to a new phase
    MergeProgress { phase: MergePhase, timestamp: i64 },
    /// Forwarded event from the merge agent's loop
    MergeEvent {
        event: pod_core::events::AgentEvent,
    },
    /// Merge finished
    MergeEnd {
        finding_count: usize,
        cluster_count: usize,
        timestamp: i64,
    },
    /// Team execution finished; terminal event
    TeamEnd {
        result: TeamResult,
        timestamp: i64,
    },
}

impl TeamEvent {
    pub fn team_start(
        team_name: &str,
        task: &str,
        agent_count: usize,
        execution_id: Option<i64>,
    ) -> Self {
        Self::TeamStart {
            team_name: team_name.to_string(),
            task: task.to_string(),
            agent_count,
            execution_id,
            timestamp: now_ms(),
        }
    }

    pub fn agent_start(agent_name: &str, attempt: u32) -> Self {
        Self::AgentStart {
            agent_name: agent_name.to_string(),
            attempt,
            timestamp: now_ms(),
        }
    }

    pub fn agent_error(agent_name: &str, error: &str, will_retry: bool) -> Self {
        Self::AgentError {
            agent_name: agent_name.to_string(),
            error: error.to_string(),
            will_retry,
            timestamp: now_ms(),
        }
    }

    pub fn agent_retry(agent_name: &str, attempt: u32) -> Self {
        Self::AgentRetry {
            agent_name: agent_name.to_string(),
            attempt,
            timestamp: now_ms(),
        }
    }

    pub fn agent_end(agent_name: &str, result: AgentResult) -> Self {
        Self::AgentEnd {
            agent_name: agent_name.to_string(),
            result,
            timestamp: now_ms(),
        }
    }

    pub fn merge_start(finding_count: usize) -> Self {
        Self::MergeStart {
            finding_count,
            timestamp: now_ms(),
        }
    }

    pub fn merge_progress(phase: MergePhase) -> Self {
        Self::MergeProgress {
            phase,
            timestamp: now_ms(),
        }
    }

    pub fn merge_end(finding_count: usize, cluster_count: usize) -> Self {
        Self::MergeEnd {
            finding_count,
            cluster_count,
            timestamp: now_ms(),
        }
    }

    pub fn team_end(result: TeamResult) -> Self {
        Self::TeamEnd {
            result,
            timestamp: now_ms(),
        }
    }

    /// Whether this event terminates the team stream
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::TeamEnd { .. })
    }
}
