//! Subagent subprocess runtime
//!
//! Launches agents as isolated child processes with their own context
//! windows, streams their NDJSON events back into the parent, bounds
//! parallel fan-out, and propagates cancellation (SIGTERM, then SIGKILL).

pub mod env;
pub mod exec;
pub mod prompt;
pub mod protocol;
pub mod runner;
pub mod stream_state;

pub use env::{
    build_child_env, provider_credentials, resolve_credentials, ProviderCredentials,
    ResolvedCredentials, SYSTEM_ENV_ALLOWLIST,
};
pub use exec::exec_with_timeout;
pub use protocol::SubagentTask;
pub use runner::{
    ChainOutcome, ChildRunner, ProcessChildRunner, RunnerConfig, SubagentRunner,
    DEFAULT_MAX_CONCURRENCY, MAX_CONCURRENCY_CAP,
};
pub use stream_state::{ExecutionProgress, StreamState, ToolCall, UpdateFn};
