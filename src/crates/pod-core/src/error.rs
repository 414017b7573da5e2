//! Error types for the pod runtime
//!
//! One taxonomy shared by every crate in the workspace. Variants are grouped
//! by recovery behavior rather than by origin: transient errors are retried,
//! persistence errors are logged and skipped, cancellation is surfaced as an
//! aborted result.

use thiserror::Error;

/// Result type alias for pod operations
pub type Result<T> = std::result::Result<T, PodError>;

/// Errors that can occur across the pod runtime
#[derive(Error, Debug)]
pub enum PodError {
    /// Invalid configuration (preset YAML, unknown strategy, bad workflow)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Transient agent failure, eligible for retry
    #[error("Agent error (transient): {0}")]
    TransientAgent(String),

    /// Fatal agent failure, recorded on the result
    #[error("Agent error: {0}")]
    AgentFatal(String),

    /// Persistence failure; execution continues without the write
    #[error("Persistence error: {0}")]
    Persistence(String),

    /// Subprocess failure (spawn, non-zero exit, protocol)
    #[error("Subprocess error: {0}")]
    Subprocess(String),

    /// Dependency cycle detected, naming the nodes still blocked
    #[error("Dependency cycle among nodes: {0:?}")]
    Cycle(Vec<String>),

    /// Execution was aborted by an external signal
    #[error("Aborted")]
    Cancelled,

    /// Unparseable input that could not be degraded gracefully
    #[error("Parse error: {0}")]
    Parse(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// YAML configuration parse error
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

impl PodError {
    /// Whether retrying the failed operation may succeed
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::TransientAgent(_))
    }

    /// Whether this error must not terminate a running team
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::Persistence(_) | Self::Cancelled)
    }
}
