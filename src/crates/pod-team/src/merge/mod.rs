//! Finding merge pipeline
//!
//! Strategies are registered by name and dispatched through the registry. An
//! unknown strategy name bypasses merging and returns the raw findings. Every
//! strategy reports each phase transition through `on_progress` so the engine
//! can persist snapshots.

mod agent;
mod cluster;
mod noop;

pub use agent::AgentMergeStrategy;
pub use cluster::ClusterMergeStrategy;
pub use noop::NoopMergeStrategy;

use async_trait::async_trait;
use parking_lot::RwLock;
use pod_core::abort::AbortSignal;
use pod_core::error::Result;
use pod_core::events::AgentEvent;
use pod_core::llm::{AgentLoop, KeyResolver};
use pod_core::model::{
    AgentPreset, Finding, MergeOutcome, MergePhase, ToolDescriptor,
};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

/// Callback receiving merge phase transitions
pub type ProgressFn = dyn Fn(MergePhase) + Send + Sync;

/// Callback receiving merge-agent loop events
pub type MergeEventFn = dyn Fn(AgentEvent) + Send + Sync;

/// Options handed to a merge strategy
#[derive(Clone, Default)]
pub struct MergeOptions {
    /// Preset for strategies that spawn a merge agent
    pub merge_agent: Option<AgentPreset>,
    pub tools: Vec<ToolDescriptor>,
    pub signal: AbortSignal,
    pub key_resolver: Option<KeyResolver>,
    /// Agent loop used by merge-agent strategies
    pub agent_loop: Option<Arc<dyn AgentLoop>>,
    pub on_event: Option<Arc<MergeEventFn>>,
    pub on_progress: Option<Arc<ProgressFn>>,
}

impl std::fmt::Debug for MergeOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MergeOptions")
            .field("merge_agent", &self.merge_agent.as_ref().map(|a| &a.name))
            .field("tools", &self.tools.len())
            .finish()
    }
}

impl MergeOptions {
    /// Report a phase transition
    pub fn progress(&self, phase: MergePhase) {
        if let Some(cb) = &self.on_progress {
            cb(phase);
        }
    }

    /// Forward a merge-agent event
    pub fn event(&self, event: AgentEvent) {
        if let Some(cb) = &self.on_event {
            cb(event);
        }
    }
}

/// A pluggable merge strategy
#[async_trait]
pub trait MergeStrategy: Send + Sync {
    fn name(&self) -> &str;
    async fn execute(
        &self,
        findings: Vec<Finding>,
        options: &MergeOptions,
    ) -> Result<MergeOutcome>;
}

/// Name-keyed strategy registry
///
/// Strategies register at startup; engines look up by name and call through
/// the [`MergeStrategy`] interface.
#[derive(Default)]
pub struct MergeRegistry {
    strategies: RwLock<HashMap<String, Arc<dyn MergeStrategy>>>,
}

impl MergeRegistry {
    /// An empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry pre-loaded with the built-in strategies
    pub fn with_builtins() -> Self {
        let registry = Self::new();
        registry.register(Arc::new(NoopMergeStrategy));
        registry.register(Arc::new(ClusterMergeStrategy));
        registry.register(Arc::new(AgentMergeStrategy));
        registry
    }

    pub fn register(&self, strategy: Arc<dyn MergeStrategy>) {
        self.strategies
            .write()
            .insert(strategy.name().to_string(), strategy);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn MergeStrategy>> {
        self.strategies.read().get(name).cloned()
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.strategies.read().keys().cloned().collect();
        names.sort();
        names
    }
}

/// Dispatches merges through the registry
#[derive(Clone)]
pub struct MergeExecutor {
    registry: Arc<MergeRegistry>,
}

impl MergeExecutor {
    pub fn new(registry: Arc<MergeRegistry>) -> Self {
        Self { registry }
    }

    /// Run the named strategy, or bypass when it is not registered
    pub async fn execute(
        &self,
        strategy_name: &str,
        findings: Vec<Finding>,
        options: &MergeOptions,
    ) -> Result<MergeOutcome> {
        match self.registry.get(strategy_name) {
            Some(strategy) => strategy.execute(findings, options).await,
            None => {
                debug!(strategy = strategy_name, "Unknown merge strategy, bypassing");
                Ok(MergeOutcome {
                    findings,
                    clusters: Vec::new(),
                    summary: None,
                })
            }
        }
    }
}
