//! Step execution backends
//!
//! Steps reach agents and teams through this seam: the production backend
//! wires the subagent runner and the team engine; tests substitute a
//! scripted implementation.

use async_trait::async_trait;
use pod_core::abort::AbortSignal;
use pod_core::error::Result;
use pod_core::model::{AgentPreset, AgentResult, TeamConfig, TeamResult};
use pod_runner::{SubagentRunner, SubagentTask};
use pod_team::{TeamEngine, TeamOptions};
use std::sync::Arc;

/// Executes the agent-bearing step types
#[async_trait]
pub trait StepBackend: Send + Sync {
    async fn run_agent(
        &self,
        preset: AgentPreset,
        task: String,
        signal: AbortSignal,
    ) -> Result<AgentResult>;

    async fn run_parallel(
        &self,
        presets: Vec<AgentPreset>,
        task: String,
        signal: AbortSignal,
    ) -> Result<Vec<AgentResult>>;

    async fn run_team(
        &self,
        config: TeamConfig,
        task: String,
        signal: AbortSignal,
    ) -> Result<TeamResult>;
}

/// Production backend: subprocesses for agents, the team engine for teams
pub struct RuntimeBackend {
    runner: SubagentRunner,
    team_engine: Arc<TeamEngine>,
    provider: String,
    session_id: String,
}

impl RuntimeBackend {
    pub fn new(
        runner: SubagentRunner,
        team_engine: Arc<TeamEngine>,
        provider: &str,
        session_id: &str,
    ) -> Self {
        Self {
            runner,
            team_engine,
            provider: provider.to_string(),
            session_id: session_id.to_string(),
        }
    }

    fn subagent_task(&self, preset: AgentPreset, task: &str) -> SubagentTask {
        SubagentTask::new(preset, task, self.provider.clone())
    }
}

#[async_trait]
impl StepBackend for RuntimeBackend {
    async fn run_agent(
        &self,
        preset: AgentPreset,
        task: String,
        signal: AbortSignal,
    ) -> Result<AgentResult> {
        self.runner
            .run_single(self.subagent_task(preset, &task), &signal, None)
            .await
    }

    async fn run_parallel(
        &self,
        presets: Vec<AgentPreset>,
        task: String,
        signal: AbortSignal,
    ) -> Result<Vec<AgentResult>> {
        let tasks = presets
            .into_iter()
            .map(|preset| self.subagent_task(preset, &task))
            .collect();
        self.runner.run_parallel(tasks, &signal).await
    }

    async fn run_team(
        &self,
        config: TeamConfig,
        task: String,
        signal: AbortSignal,
    ) -> Result<TeamResult> {
        let mut options = TeamOptions::new(config, task);
        options.session_id = self.session_id.clone();
        options.provider = Some(self.provider.clone());
        options.signal = Some(signal);
        self.team_engine.execute(options).await
    }
}
