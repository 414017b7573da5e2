//! Core model and primitives for the pod agent orchestration runtime
//!
//! This crate carries everything the engines share: the data model (presets,
//! findings, results, team configuration), the finding parser, the dependency
//! graph, typed terminating event streams, cooperative cancellation, and the
//! narrow interfaces to the external LLM client and tool implementations.

pub mod abort;
pub mod config;
pub mod error;
pub mod events;
pub mod findings;
pub mod graph;
pub mod lifecycle;
pub mod llm;
pub mod model;
pub mod stream;

pub use abort::AbortSignal;
pub use error::{PodError, Result};
pub use events::{AgentEvent, StopReason};
pub use graph::DependencyGraph;
pub use stream::{EventSender, EventStream};

use std::sync::OnceLock;

/// Whether `DEBUG_AGENTS` is set to a truthy value
///
/// Read once and cached for the lifetime of the process.
pub fn debug_agents_enabled() -> bool {
    static FLAG: OnceLock<bool> = OnceLock::new();
    *FLAG.get_or_init(|| {
        std::env::var("DEBUG_AGENTS")
            .map(|v| !v.is_empty() && v != "0" && !v.eq_ignore_ascii_case("false"))
            .unwrap_or(false)
    })
}
