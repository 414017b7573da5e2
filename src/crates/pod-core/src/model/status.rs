//! Lifecycle statuses for persisted executions

use serde::{Deserialize, Serialize};

/// Status of a team execution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionStatus {
    Pending,
    Running,
    Merging,
    Completed,
    Failed,
    Aborted,
}

impl ExecutionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Merging => "merging",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Aborted => "aborted",
        }
    }

    /// Whether the execution has reached a terminal state
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Aborted)
    }
}

impl std::fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl From<&str> for ExecutionStatus {
    fn from(s: &str) -> Self {
        match s {
            "running" => Self::Running,
            "merging" => Self::Merging,
            "completed" => Self::Completed,
            "failed" => Self::Failed,
            "aborted" => Self::Aborted,
            _ => Self::Pending,
        }
    }
}

/// Status of one stored agent result
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Retrying,
}

impl AgentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Retrying => "retrying",
        }
    }
}

impl std::fmt::Display for AgentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl From<&str> for AgentStatus {
    fn from(s: &str) -> Self {
        match s {
            "running" => Self::Running,
            "completed" => Self::Completed,
            "failed" => Self::Failed,
            "retrying" => Self::Retrying,
            _ => Self::Pending,
        }
    }
}

/// Phase of the merge pipeline
///
/// Transitions are strictly sequential: parsing → clustering → verifying →
/// ranking → synthesizing → completed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MergePhase {
    Parsing,
    Clustering,
    Verifying,
    Ranking,
    Synthesizing,
    Completed,
}

impl MergePhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Parsing => "parsing",
            Self::Clustering => "clustering",
            Self::Verifying => "verifying",
            Self::Ranking => "ranking",
            Self::Synthesizing => "synthesizing",
            Self::Completed => "completed",
        }
    }
}

impl std::fmt::Display for MergePhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl From<&str> for MergePhase {
    fn from(s: &str) -> Self {
        match s {
            "clustering" => Self::Clustering,
            "verifying" => Self::Verifying,
            "ranking" => Self::Ranking,
            "synthesizing" => Self::Synthesizing,
            "completed" => Self::Completed,
            _ => Self::Parsing,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_statuses() {
        assert!(ExecutionStatus::Completed.is_terminal());
        assert!(ExecutionStatus::Aborted.is_terminal());
        assert!(!ExecutionStatus::Merging.is_terminal());
    }

    #[test]
    fn status_string_roundtrip() {
        for status in [
            ExecutionStatus::Pending,
            ExecutionStatus::Running,
            ExecutionStatus::Merging,
            ExecutionStatus::Completed,
            ExecutionStatus::Failed,
            ExecutionStatus::Aborted,
        ] {
            assert_eq!(ExecutionStatus::from(status.as_str()), status);
        }
    }
}
