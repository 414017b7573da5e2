//! Team engine and merge pipeline
//!
//! Orchestrates a named set of agents against one task: dependency-free
//! parallel or sequential dispatch, retry with backoff, streamed events,
//! pluggable finding merge, and durable per-phase persistence.

pub mod engine;
pub mod events;
pub mod merge;
pub mod retry;
pub mod tracker;

pub use engine::{TeamEngine, TeamEngineBuilder, TeamOptions};
pub use events::TeamEvent;
pub use merge::{
    AgentMergeStrategy, ClusterMergeStrategy, MergeExecutor, MergeOptions,
    MergeRegistry, MergeStrategy, NoopMergeStrategy,
};
pub use retry::RetryPolicy;
pub use tracker::{TaskProgress, TaskTracker, TrackedTask, TASK_TOOL_PREFIX};
