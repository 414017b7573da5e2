//! Team orchestration engine
//!
//! Runs a team's agents (parallel or sequential) with retry, streams events
//! to the caller, merges findings through the registered strategy, and
//! persists every phase so a crashed run can be reconstructed. Store errors
//! never abort a run: the failed persistence step is logged and skipped.

use crate::events::TeamEvent;
use crate::merge::{MergeExecutor, MergeOptions, MergeRegistry};
use crate::retry::RetryPolicy;
use crate::tracker::TaskTracker;
use futures::StreamExt;
use parking_lot::Mutex;
use pod_core::abort::AbortSignal;
use pod_core::error::{PodError, Result};
use pod_core::events::AgentEvent;
use pod_core::graph::DependencyGraph;
use pod_core::lifecycle::SessionLifecycle;
use pod_core::llm::{AgentLoop, AgentPrompts, KeyResolver, LoopContext, LoopOptions};
use pod_core::model::{
    AgentPreset, AgentResult, AgentStatus, ExecutionStatus, Finding, MergeOutcome,
    MergePhase, TeamConfig, TeamResult, TeamStrategy, TokenUsage, ToolDescriptor,
};
use pod_core::stream::{EventSender, EventStream};
use pod_runner::StreamState;
use pod_store::{AgentResultUpdate, TeamStore};
use serde_json::json;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Options for one team run
#[derive(Clone)]
pub struct TeamOptions {
    pub config: TeamConfig,
    pub task: String,
    pub session_id: String,
    pub cwd: Option<PathBuf>,
    /// Provider routed to the agent loop
    pub provider: Option<String>,
    /// Caller-supplied abort signal, composed with the engine's own
    pub signal: Option<AbortSignal>,
    /// Overrides the policy derived from the team's `max_retries`
    pub retry_policy: Option<RetryPolicy>,
    /// Pre-partitioned dispatch waves for parallel strategy; each wave waits
    /// for the previous one. Unset means one wave of all agents.
    pub agent_waves: Option<Vec<Vec<String>>>,
}

impl TeamOptions {
    pub fn new(config: TeamConfig, task: impl Into<String>) -> Self {
        Self {
            config,
            task: task.into(),
            session_id: "local".to_string(),
            cwd: None,
            provider: None,
            signal: None,
            retry_policy: None,
            agent_waves: None,
        }
    }
}

struct EngineCore {
    agent_loop: Arc<dyn AgentLoop>,
    store: Option<Arc<TeamStore>>,
    registry: Arc<MergeRegistry>,
    lifecycle: Option<Arc<Mutex<SessionLifecycle>>>,
    key_resolver: Option<KeyResolver>,
}

/// Configures a [`TeamEngine`] before its first run
pub struct TeamEngineBuilder {
    agent_loop: Arc<dyn AgentLoop>,
    store: Option<Arc<TeamStore>>,
    registry: Arc<MergeRegistry>,
    lifecycle: Option<Arc<Mutex<SessionLifecycle>>>,
    key_resolver: Option<KeyResolver>,
}

impl TeamEngineBuilder {
    pub fn with_store(mut self, store: Arc<TeamStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn with_registry(mut self, registry: Arc<MergeRegistry>) -> Self {
        self.registry = registry;
        self
    }

    pub fn with_lifecycle(mut self, lifecycle: Arc<Mutex<SessionLifecycle>>) -> Self {
        self.lifecycle = Some(lifecycle);
        self
    }

    pub fn with_key_resolver(mut self, resolver: KeyResolver) -> Self {
        self.key_resolver = Some(resolver);
        self
    }

    pub fn build(self) -> TeamEngine {
        TeamEngine {
            core: Arc::new(EngineCore {
                agent_loop: self.agent_loop,
                store: self.store,
                registry: self.registry,
                lifecycle: self.lifecycle,
                key_resolver: self.key_resolver,
            }),
            abort: AbortSignal::new(),
        }
    }
}

/// Orchestrates one team at a time; create one engine per caller
pub struct TeamEngine {
    core: Arc<EngineCore>,
    abort: AbortSignal,
}

impl TeamEngine {
    pub fn new(agent_loop: Arc<dyn AgentLoop>) -> Self {
        Self::builder(agent_loop).build()
    }

    pub fn builder(agent_loop: Arc<dyn AgentLoop>) -> TeamEngineBuilder {
        TeamEngineBuilder {
            agent_loop,
            store: None,
            registry: Arc::new(MergeRegistry::with_builtins()),
            lifecycle: None,
            key_resolver: None,
        }
    }

    /// Abort the engine and everything it spawned
    pub fn abort(&self) {
        self.abort.abort();
    }

    /// Start a team run, returning its event stream
    ///
    /// The stream terminates with exactly one `team_end` carrying the
    /// [`TeamResult`].
    pub fn run(&self, options: TeamOptions) -> EventStream<TeamEvent, TeamResult> {
        let (sender, stream) = EventStream::channel(TeamEvent::is_terminal, |event| {
            match event {
                TeamEvent::TeamEnd { result, .. } => result.clone(),
                _ => unreachable!("terminal predicate only admits team_end"),
            }
        });

        let signal = match &options.signal {
            Some(caller) => AbortSignal::merged(&self.abort, caller),
            None => self.abort.child(),
        };
        let core = self.core.clone();
        tokio::spawn(async move {
            EngineCore::orchestrate(core, options, signal, sender).await;
        });

        stream
    }

    /// Run to completion and return the final result
    pub async fn execute(&self, options: TeamOptions) -> Result<TeamResult> {
        self.run(options).result().await.ok_or_else(|| {
            PodError::AgentFatal("team stream ended without a result".to_string())
        })
    }
}

/// Run a store operation, downgrading failure to a debug log
macro_rules! persist {
    ($store:expr, $what:expr, |$s:ident: &TeamStore| $body:expr) => {
        match $store {
            Some($s) => {
                match $body.await {
                    Ok(value) => Some(value),
                    Err(e) => {
                        debug!(step = $what, error = %e, "Skipping persistence step");
                        None
                    }
                }
            }
            None => None,
        }
    };
}

impl EngineCore {
    async fn orchestrate(
        core: Arc<Self>,
        options: TeamOptions,
        signal: AbortSignal,
        sender: EventSender<TeamEvent, TeamResult>,
    ) {
        let started = Instant::now();
        let team_name = options.config.name.clone();
        let store = core.store.as_deref();

        let execution_id = persist!(store, "create execution", |s: &TeamStore| s
            .create_execution(
                &options.session_id,
                &team_name,
                &options.task,
                options.config.agents.len(),
            ));

        sender.push(TeamEvent::team_start(
            &team_name,
            &options.task,
            options.config.agents.len(),
            execution_id,
        ));

        let result = core
            .run_phases(&options, execution_id, &signal, &sender, started)
            .await;

        let result = match result {
            Ok(result) => result,
            Err(e) => {
                let aborted = matches!(e, PodError::Cancelled);
                let status = if aborted {
                    ExecutionStatus::Aborted
                } else {
                    ExecutionStatus::Failed
                };
                let message = e.to_string();
                warn!(team = %team_name, error = %message, aborted, "Team run failed");
                let _ = persist!(store, "record failure", |s: &TeamStore| s
                    .update_execution_status(
                        execution_id.unwrap_or_default(),
                        status,
                        Some(&message),
                    ));
                TeamResult {
                    team_name: team_name.clone(),
                    success: false,
                    error: Some(message),
                    agent_results: Vec::new(),
                    findings: Vec::new(),
                    clusters: Vec::new(),
                    summary: None,
                    duration_ms: started.elapsed().as_millis() as u64,
                    total_usage: TokenUsage::default(),
                }
            }
        };

        // The stream must always see its terminal event
        sender.push(TeamEvent::team_end(result));
    }

    async fn run_phases(
        &self,
        options: &TeamOptions,
        execution_id: Option<i64>,
        signal: &AbortSignal,
        sender: &EventSender<TeamEvent, TeamResult>,
        started: Instant,
    ) -> Result<TeamResult> {
        let config = &options.config;
        let store = self.store.as_deref();
        let policy = options
            .retry_policy
            .unwrap_or_else(|| RetryPolicy::with_max_retries(config.max_retries));

        let _ = persist!(store, "mark running", |s: &TeamStore| s
            .update_execution_status(
                execution_id.unwrap_or_default(),
                ExecutionStatus::Running,
                None,
            ));

        let agent_results = match config.strategy {
            TeamStrategy::Parallel => {
                // Agents are scheduled wave by wave through the dependency
                // graph; without a partition every agent lands in one wave.
                let names: Vec<String> =
                    config.agents.iter().map(|p| p.name.clone()).collect();
                let graph =
                    DependencyGraph::from_waves(&names, options.agent_waves.as_deref());
                let waves = graph.waves()?;

                let mut results = Vec::with_capacity(config.agents.len());
                for wave in waves {
                    let futures = wave.iter().filter_map(|name| {
                        config.agents.iter().find(|p| &p.name == name).map(|preset| {
                            self.run_agent_with_retry(
                                preset, options, execution_id, policy, signal, sender,
                            )
                        })
                    });
                    for outcome in futures::future::join_all(futures).await {
                        results.push(outcome?);
                    }
                }
                results
            }
            TeamStrategy::Sequential => {
                let mut results = Vec::with_capacity(config.agents.len());
                for preset in &config.agents {
                    let result = self
                        .run_agent_with_retry(
                            preset, options, execution_id, policy, signal, sender,
                        )
                        .await?;
                    // Results are carried forward; feeding them into the next
                    // agent's prompt is an unimplemented extension point.
                    results.push(result);
                }
                results
            }
        };

        let all_findings: Vec<Finding> = agent_results
            .iter()
            .flat_map(|result| result.findings.iter().cloned())
            .collect();

        let _ = persist!(store, "mark merging", |s: &TeamStore| s
            .update_execution_status(
                execution_id.unwrap_or_default(),
                ExecutionStatus::Merging,
                None,
            ));
        sender.push(TeamEvent::merge_start(all_findings.len()));

        let outcome = self
            .run_merge(config, all_findings, execution_id, signal, sender)
            .await?;

        let mut total_usage = TokenUsage::default();
        for result in &agent_results {
            total_usage.add(&result.usage);
        }
        let success = agent_results.iter().any(|result| result.success);
        let error = if success {
            None
        } else {
            Some("all agents failed".to_string())
        };

        let result = TeamResult {
            team_name: config.name.clone(),
            success,
            error: error.clone(),
            agent_results,
            findings: outcome.findings.clone(),
            clusters: outcome.clusters.clone(),
            summary: outcome.summary.clone(),
            duration_ms: started.elapsed().as_millis() as u64,
            total_usage,
        };

        sender.push(TeamEvent::merge_end(
            result.findings.len(),
            result.clusters.len(),
        ));

        let status = if success {
            ExecutionStatus::Completed
        } else {
            ExecutionStatus::Failed
        };
        let _ = persist!(store, "record completion", |s: &TeamStore| s
            .update_execution_status(
                execution_id.unwrap_or_default(),
                status,
                error.as_deref(),
            ));

        info!(
            team = %config.name,
            success,
            findings = result.findings.len(),
            duration_ms = result.duration_ms,
            "Team run finished"
        );
        Ok(result)
    }

    /// Dispatch one agent with the retry loop
    ///
    /// An agent runs at most `max_retries + 1` times. Exhausted retries
    /// become a synthesized failure result under `continue_on_error`, or an
    /// error that fails the whole team otherwise.
    async fn run_agent_with_retry(
        &self,
        preset: &AgentPreset,
        options: &TeamOptions,
        execution_id: Option<i64>,
        policy: RetryPolicy,
        signal: &AbortSignal,
        sender: &EventSender<TeamEvent, TeamResult>,
    ) -> Result<AgentResult> {
        let store = self.store.as_deref();
        let agent_result_id = match execution_id {
            Some(execution_id) => persist!(store, "create agent result", |s: &TeamStore| s
                .create_agent_result(execution_id, &preset.name)),
            None => None,
        };

        sender.push(TeamEvent::agent_start(&preset.name, 0));
        let mut attempt: u32 = 0;

        loop {
            signal.check()?;
            if let Some(id) = agent_result_id {
                let _ = persist!(store, "mark agent running", |s: &TeamStore| s
                    .update_agent_result(id, AgentResultUpdate::status(AgentStatus::Running)));
            }

            let error = match self.run_agent_once(preset, options, signal, sender).await {
                Ok(result) if result.success => {
                    if let Some(id) = agent_result_id {
                        let update = AgentResultUpdate {
                            status: Some(AgentStatus::Completed),
                            findings: Some(result.findings.clone()),
                            messages: Some(result.messages.clone()),
                            usage: Some(result.usage),
                            duration_ms: Some(result.duration_ms as i64),
                            error: Some(None),
                        };
                        let _ = persist!(store, "store agent result", |s: &TeamStore| s
                            .update_agent_result(id, update.clone()));
                    }
                    sender.push(TeamEvent::agent_end(&preset.name, result.clone()));
                    return Ok(result);
                }
                Ok(result) => result
                    .error
                    .unwrap_or_else(|| "agent failed without an error message".to_string()),
                Err(PodError::Cancelled) => return Err(PodError::Cancelled),
                Err(e) => e.to_string(),
            };

            let will_retry = attempt < policy.max_retries;
            sender.push(TeamEvent::agent_error(&preset.name, &error, will_retry));

            if will_retry {
                attempt += 1;
                debug!(agent = %preset.name, attempt, error = %error, "Retrying agent");
                if let Some(id) = agent_result_id {
                    let _ = persist!(store, "mark agent retrying", |s: &TeamStore| s
                        .update_agent_result(id, AgentResultUpdate::status(AgentStatus::Retrying)));
                }
                sender.push(TeamEvent::agent_retry(&preset.name, attempt));
                let delay = policy.delay_for(attempt);
                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
                continue;
            }

            // Retries exhausted
            if let Some(id) = agent_result_id {
                let update = AgentResultUpdate {
                    status: Some(AgentStatus::Failed),
                    error: Some(Some(error.clone())),
                    ..Default::default()
                };
                let _ = persist!(store, "mark agent failed", |s: &TeamStore| s
                    .update_agent_result(id, update.clone()));
            }
            if options.config.continue_on_error {
                let failed = AgentResult::failed(&preset.name, &error);
                sender.push(TeamEvent::agent_end(&preset.name, failed.clone()));
                return Ok(failed);
            }
            return Err(PodError::AgentFatal(format!(
                "agent '{}' failed after {} attempts: {}",
                preset.name,
                attempt + 1,
                error
            )));
        }
    }

    /// One in-process agent-loop execution
    async fn run_agent_once(
        &self,
        preset: &AgentPreset,
        options: &TeamOptions,
        signal: &AbortSignal,
        sender: &EventSender<TeamEvent, TeamResult>,
    ) -> Result<AgentResult> {
        let started = Instant::now();

        let task_text = match &self.lifecycle {
            Some(lifecycle) => {
                let decision = lifecycle.lock().on_before_agent_start(&options.task);
                match decision.message {
                    Some(note) => format!("{}\n\n[{}]", decision.prompt, note),
                    None => decision.prompt,
                }
            }
            None => options.task.clone(),
        };

        let prompts = AgentPrompts {
            system_prompt: preset.system_prompt.clone(),
            task: task_text,
        };
        let context = LoopContext {
            cwd: options.cwd.clone(),
            tools: allowed_tools(&options.config.tools, preset),
        };
        let loop_options = LoopOptions {
            provider: options.provider.clone(),
            model: preset.model.clone(),
            temperature: preset.temperature,
            max_tokens: preset.max_tokens,
            thinking: preset.thinking,
        };

        let mut stream = self
            .agent_loop
            .run(prompts, context, loop_options, signal.child())
            .await
            .map_err(|e| PodError::TransientAgent(e.to_string()))?;

        let mut state = StreamState::new(&preset.name);
        let mut tool_names: HashMap<String, String> = HashMap::new();
        let mut tracker = TaskTracker::new();

        while let Some(event) = stream.next().await {
            signal.check()?;
            self.observe_agent_event(preset, &event, &mut tool_names, &mut tracker, sender);
            state.apply(event.clone());
            sender.push(TeamEvent::AgentEvent {
                agent_name: preset.name.clone(),
                event,
            });
        }

        Ok(state.into_result(true, started.elapsed().as_millis() as u64))
    }

    /// Lifecycle hooks and task-progress tracking for one forwarded event
    fn observe_agent_event(
        &self,
        preset: &AgentPreset,
        event: &AgentEvent,
        tool_names: &mut HashMap<String, String>,
        tracker: &mut TaskTracker,
        sender: &EventSender<TeamEvent, TeamResult>,
    ) {
        match event {
            AgentEvent::ToolExecutionStart { id, name, .. } => {
                if let Some(lifecycle) = &self.lifecycle {
                    lifecycle.lock().on_tool_call();
                }
                tool_names.insert(id.clone(), name.clone());
            }
            AgentEvent::ToolExecutionEnd { id, text, .. } => {
                if let Some(lifecycle) = &self.lifecycle {
                    lifecycle.lock().on_tool_result();
                }
                let Some(name) = tool_names.get(id) else {
                    return;
                };
                let Some(progress) =
                    tracker.observe(name, text.as_deref().unwrap_or_default())
                else {
                    return;
                };
                sender.push(TeamEvent::AgentTaskUpdate {
                    agent_name: preset.name.clone(),
                    total: progress.total,
                    completed: progress.completed,
                    active_task_title: progress.active_task_title,
                    timestamp: chrono::Utc::now().timestamp_millis(),
                });
            }
            _ => {}
        }
    }

    /// Run the merge strategy, persisting a snapshot per phase transition
    async fn run_merge(
        &self,
        config: &TeamConfig,
        findings: Vec<Finding>,
        execution_id: Option<i64>,
        signal: &AbortSignal,
        sender: &EventSender<TeamEvent, TeamResult>,
    ) -> Result<MergeOutcome> {
        let store = self.store.as_deref();
        let finding_count = findings.len();

        let (phase_tx, mut phase_rx) = mpsc::unbounded_channel::<MergePhase>();
        let (event_tx, mut event_rx) = mpsc::unbounded_channel::<AgentEvent>();

        let merge_options = MergeOptions {
            merge_agent: config.merge.merge_agent.clone(),
            tools: config.tools.clone(),
            signal: signal.clone(),
            key_resolver: self.key_resolver.clone(),
            agent_loop: Some(self.agent_loop.clone()),
            on_event: Some(Arc::new(move |event| {
                let _ = event_tx.send(event);
            })),
            on_progress: Some(Arc::new(move |phase| {
                let _ = phase_tx.send(phase);
            })),
        };

        let executor = MergeExecutor::new(self.registry.clone());
        let merge_future =
            executor.execute(&config.merge.strategy, findings, &merge_options);
        tokio::pin!(merge_future);

        let mut previous_snapshot: Option<i64> = None;
        let outcome = loop {
            tokio::select! {
                biased;
                Some(phase) = phase_rx.recv() => {
                    self.on_merge_phase(
                        phase, finding_count, execution_id, &mut previous_snapshot, sender,
                    ).await;
                }
                Some(event) = event_rx.recv() => {
                    sender.push(TeamEvent::MergeEvent { event });
                }
                outcome = &mut merge_future => break outcome?,
            }
        };

        // Callbacks fired during the final poll may still be queued
        while let Ok(phase) = phase_rx.try_recv() {
            self.on_merge_phase(
                phase,
                finding_count,
                execution_id,
                &mut previous_snapshot,
                sender,
            )
            .await;
        }
        while let Ok(event) = event_rx.try_recv() {
            sender.push(TeamEvent::MergeEvent { event });
        }

        // Close out the snapshot chain with the completed phase
        if let Some(previous) = previous_snapshot {
            let _ = persist!(store, "patch snapshot", |s: &TeamStore| s.update_merge_snapshot(
                previous,
                &transition_patch(MergePhase::Completed),
            ));
        }
        if let Some(execution_id) = execution_id {
            let final_snapshot = persist!(store, "final snapshot", |s: &TeamStore| s
                .create_merge_snapshot(
                    execution_id,
                    MergePhase::Completed,
                    &json!({ "finding_count": finding_count }),
                ));
            if let Some(snapshot_id) = final_snapshot {
                if let Ok(output) = serde_json::to_value(&outcome) {
                    let _ = persist!(store, "final snapshot output", |s: &TeamStore| s
                        .update_merge_snapshot(snapshot_id, &output));
                }
            }
        }

        Ok(outcome)
    }

    async fn on_merge_phase(
        &self,
        phase: MergePhase,
        finding_count: usize,
        execution_id: Option<i64>,
        previous_snapshot: &mut Option<i64>,
        sender: &EventSender<TeamEvent, TeamResult>,
    ) {
        let store = self.store.as_deref();
        sender.push(TeamEvent::merge_progress(phase));

        let Some(execution_id) = execution_id else {
            return;
        };
        if let Some(previous) = *previous_snapshot {
            let _ = persist!(store, "patch snapshot", |s: &TeamStore| s
                .update_merge_snapshot(previous, &transition_patch(phase)));
        }
        *previous_snapshot = persist!(store, "create snapshot", |s: &TeamStore| s
            .create_merge_snapshot(
                execution_id,
                phase,
                &json!({ "finding_count": finding_count }),
            ));
    }
}

/// Opaque patch recorded on a snapshot when its phase ends
fn transition_patch(next_phase: MergePhase) -> serde_json::Value {
    json!({
        "phase": next_phase.as_str(),
        "transition_time": chrono::Utc::now().to_rfc3339(),
    })
}

/// Tools visible to a preset: its allowlist, or everything when empty
fn allowed_tools(tools: &[ToolDescriptor], preset: &AgentPreset) -> Vec<ToolDescriptor> {
    if preset.tools.is_empty() {
        return tools.to_vec();
    }
    tools
        .iter()
        .filter(|tool| preset.tools.contains(&tool.name))
        .cloned()
        .collect()
}
