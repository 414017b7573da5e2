//! Integration tests for the team engine

use async_trait::async_trait;
use pod_core::abort::AbortSignal;
use pod_core::error::{PodError, Result};
use pod_core::events::{AgentEvent, StopReason};
use pod_core::llm::{AgentEventStream, AgentLoop, AgentPrompts, LoopContext, LoopOptions};
use pod_core::model::{
    AgentMessage, AgentPreset, MergePhase, TeamConfig, TokenUsage,
};
use pod_team::{RetryPolicy, TeamEngine, TeamEvent, TeamOptions};
use serde_json::json;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

/// Scripted agent loop keyed by system prompt
///
/// Each agent's behavior: fail the first `fail_attempts` runs with a
/// transient error, then stream the scripted answer.
struct ScriptedLoop {
    answers: HashMap<String, String>,
    fail_attempts: HashMap<String, usize>,
    attempts: Mutex<HashMap<String, usize>>,
    total_runs: AtomicUsize,
    /// Extra events injected before the final message
    prelude: Vec<AgentEvent>,
}

impl ScriptedLoop {
    fn new() -> Self {
        Self {
            answers: HashMap::new(),
            fail_attempts: HashMap::new(),
            attempts: Mutex::new(HashMap::new()),
            total_runs: AtomicUsize::new(0),
            prelude: Vec::new(),
        }
    }

    fn answer(mut self, agent: &str, text: &str) -> Self {
        self.answers.insert(agent.to_string(), text.to_string());
        self
    }

    fn failing_first(mut self, agent: &str, attempts: usize) -> Self {
        self.fail_attempts.insert(agent.to_string(), attempts);
        self
    }

    fn with_prelude(mut self, events: Vec<AgentEvent>) -> Self {
        self.prelude = events;
        self
    }

    fn attempts_for(&self, agent: &str) -> usize {
        *self.attempts.lock().unwrap().get(agent).unwrap_or(&0)
    }
}

#[async_trait]
impl AgentLoop for ScriptedLoop {
    async fn run(
        &self,
        prompts: AgentPrompts,
        _context: LoopContext,
        _options: LoopOptions,
        _signal: AbortSignal,
    ) -> Result<AgentEventStream> {
        self.total_runs.fetch_add(1, Ordering::SeqCst);
        // Tests use the agent name as the system prompt
        let agent = prompts.system_prompt.clone();
        let attempt = {
            let mut attempts = self.attempts.lock().unwrap();
            let entry = attempts.entry(agent.clone()).or_insert(0);
            *entry += 1;
            *entry
        };
        if attempt <= *self.fail_attempts.get(&agent).unwrap_or(&0) {
            return Err(PodError::TransientAgent("llm call failed".to_string()));
        }

        let answer = self
            .answers
            .get(&agent)
            .cloned()
            .unwrap_or_else(|| "nothing to report".to_string());
        let prelude = self.prelude.clone();
        let stream = async_stream::stream! {
            for event in prelude {
                yield event;
            }
            let mut message = AgentMessage::assistant(answer);
            message.usage = Some(TokenUsage {
                input_tokens: 100,
                output_tokens: 25,
                ..Default::default()
            });
            yield AgentEvent::MessageEnd { message };
            yield AgentEvent::AgentEnd {
                stop_reason: StopReason::Done,
                error: None,
                usage: None,
            };
        };
        Ok(Box::pin(stream))
    }
}

fn preset(name: &str) -> AgentPreset {
    // System prompt doubles as the mock's routing key
    AgentPreset::new(name, name)
}

fn team(name: &str, agents: &[&str], merge_strategy: &str) -> TeamConfig {
    let mut config = TeamConfig::new(name, agents.iter().map(|a| preset(a)).collect());
    config.merge.strategy = merge_strategy.to_string();
    config
}

const FINDING_ANSWER: &str = "### Finding: hardcoded secret\nSeverity: high\nCategory: security\nFile: src/config.rs\n";

async fn collect_events(
    mut stream: pod_core::stream::EventStream<TeamEvent, pod_core::model::TeamResult>,
) -> Vec<TeamEvent> {
    let mut events = Vec::new();
    while let Some(event) = stream.next().await {
        events.push(event);
    }
    events
}

#[tokio::test]
async fn single_agent_success_streams_full_sequence() {
    let agent_loop = Arc::new(ScriptedLoop::new().answer("reviewer", FINDING_ANSWER));
    let engine = TeamEngine::new(agent_loop);
    let options = TeamOptions::new(team("review", &["reviewer"], "noop"), "Review file X");

    let events = collect_events(engine.run(options)).await;

    assert!(matches!(events.first(), Some(TeamEvent::TeamStart { .. })));
    let starts = events
        .iter()
        .filter(|e| matches!(e, TeamEvent::AgentStart { .. }))
        .count();
    assert_eq!(starts, 1);

    let agent_end = events
        .iter()
        .find_map(|e| match e {
            TeamEvent::AgentEnd { result, .. } => Some(result),
            _ => None,
        })
        .expect("agent_end emitted");
    assert!(agent_end.success);
    assert_eq!(agent_end.findings.len(), 1);

    let merge_start_count = events.iter().find_map(|e| match e {
        TeamEvent::MergeStart { finding_count, .. } => Some(*finding_count),
        _ => None,
    });
    assert_eq!(merge_start_count, Some(1));

    let phases: Vec<MergePhase> = events
        .iter()
        .filter_map(|e| match e {
            TeamEvent::MergeProgress { phase, .. } => Some(*phase),
            _ => None,
        })
        .collect();
    assert_eq!(
        phases,
        vec![
            MergePhase::Parsing,
            MergePhase::Clustering,
            MergePhase::Verifying,
            MergePhase::Ranking,
            MergePhase::Synthesizing,
        ]
    );

    let team_ends: Vec<_> = events
        .iter()
        .filter_map(|e| match e {
            TeamEvent::TeamEnd { result, .. } => Some(result),
            _ => None,
        })
        .collect();
    assert_eq!(team_ends.len(), 1);
    let result = team_ends[0];
    assert!(result.success);
    assert_eq!(result.findings.len(), 1);
    assert_eq!(result.findings[0].id, "reviewer-0");
    assert_eq!(result.total_usage.input_tokens, 100);
}

#[tokio::test]
async fn retry_then_success_emits_expected_sequence() {
    let agent_loop = Arc::new(
        ScriptedLoop::new()
            .answer("flaky", "all good")
            .failing_first("flaky", 1),
    );
    let engine = TeamEngine::new(agent_loop.clone());
    let mut options = TeamOptions::new(team("retry-team", &["flaky"], "noop"), "task");
    options.retry_policy = Some(RetryPolicy::immediate(2));

    let events = collect_events(engine.run(options)).await;

    let interesting: Vec<String> = events
        .iter()
        .filter_map(|e| match e {
            TeamEvent::AgentStart { .. } => Some("start".to_string()),
            TeamEvent::AgentError { will_retry, .. } => {
                Some(format!("error:{}", will_retry))
            }
            TeamEvent::AgentRetry { attempt, .. } => Some(format!("retry:{}", attempt)),
            TeamEvent::AgentEnd { result, .. } => Some(format!("end:{}", result.success)),
            _ => None,
        })
        .collect();
    assert_eq!(interesting, vec!["start", "error:true", "retry:1", "end:true"]);
    // Dispatched exactly twice: one failure, one success
    assert_eq!(agent_loop.attempts_for("flaky"), 2);
}

#[tokio::test]
async fn exhausted_retries_with_continue_on_error_synthesizes_failure() {
    let agent_loop = Arc::new(ScriptedLoop::new().failing_first("dead", 10));
    let engine = TeamEngine::new(agent_loop.clone());
    let mut options = TeamOptions::new(team("t", &["dead"], "noop"), "task");
    options.retry_policy = Some(RetryPolicy::immediate(1));

    let events = collect_events(engine.run(options)).await;

    // max_retries + 1 dispatches
    assert_eq!(agent_loop.attempts_for("dead"), 2);
    let agent_end = events
        .iter()
        .find_map(|e| match e {
            TeamEvent::AgentEnd { result, .. } => Some(result),
            _ => None,
        })
        .expect("agent_end emitted");
    assert!(!agent_end.success);

    let result = events
        .iter()
        .find_map(|e| match e {
            TeamEvent::TeamEnd { result, .. } => Some(result),
            _ => None,
        })
        .expect("team_end emitted");
    assert!(!result.success);
    assert_eq!(result.error.as_deref(), Some("all agents failed"));
}

#[tokio::test]
async fn fatal_agent_without_continue_terminates_with_failure_result() {
    let agent_loop = Arc::new(ScriptedLoop::new().failing_first("dead", 10));
    let engine = TeamEngine::new(agent_loop);
    let mut config = team("strict", &["dead"], "noop");
    config.continue_on_error = false;
    let mut options = TeamOptions::new(config, "task");
    options.retry_policy = Some(RetryPolicy::immediate(0));

    let events = collect_events(engine.run(options)).await;

    let team_ends: Vec<_> = events
        .iter()
        .filter(|e| matches!(e, TeamEvent::TeamEnd { .. }))
        .collect();
    assert_eq!(team_ends.len(), 1, "team_end must still be emitted");
    let result = events
        .iter()
        .find_map(|e| match e {
            TeamEvent::TeamEnd { result, .. } => Some(result),
            _ => None,
        })
        .expect("team_end emitted");
    assert!(!result.success);
    assert!(result.error.as_deref().unwrap().contains("dead"));
}

#[tokio::test]
async fn parallel_team_aggregates_usage_and_findings() {
    let agent_loop = Arc::new(
        ScriptedLoop::new()
            .answer("alpha", FINDING_ANSWER)
            .answer("beta", "### Finding: slow loop\nSeverity: low\nCategory: performance\n"),
    );
    let engine = TeamEngine::new(agent_loop);
    let options = TeamOptions::new(team("pair", &["alpha", "beta"], "cluster"), "task");

    let result = engine.execute(options).await.unwrap();
    assert!(result.success);
    assert_eq!(result.agent_results.len(), 2);
    assert_eq!(result.findings.len(), 2);
    assert!(!result.clusters.is_empty());
    assert!(result.summary.is_some());
    assert_eq!(result.total_usage.input_tokens, 200);
    assert_eq!(result.total_usage.output_tokens, 50);
}

#[tokio::test]
async fn agent_waves_impose_dispatch_order() {
    let agent_loop = Arc::new(
        ScriptedLoop::new()
            .answer("alpha", "a done")
            .answer("beta", "b done"),
    );
    let engine = TeamEngine::new(agent_loop);
    let mut options = TeamOptions::new(team("waved", &["alpha", "beta"], "noop"), "task");
    // Beta's wave completes before alpha is dispatched
    options.agent_waves = Some(vec![vec!["beta".to_string()], vec!["alpha".to_string()]]);

    let events = collect_events(engine.run(options)).await;
    let sequence: Vec<String> = events
        .iter()
        .filter_map(|e| match e {
            TeamEvent::AgentStart { agent_name, .. } => {
                Some(format!("start:{}", agent_name))
            }
            TeamEvent::AgentEnd { agent_name, .. } => Some(format!("end:{}", agent_name)),
            _ => None,
        })
        .collect();
    assert_eq!(
        sequence,
        vec!["start:beta", "end:beta", "start:alpha", "end:alpha"]
    );
}

#[tokio::test]
async fn unknown_merge_strategy_bypasses_merge() {
    let agent_loop = Arc::new(ScriptedLoop::new().answer("reviewer", FINDING_ANSWER));
    let engine = TeamEngine::new(agent_loop);
    let options = TeamOptions::new(team("t", &["reviewer"], "mystery"), "task");

    let events = collect_events(engine.run(options)).await;
    let phases = events
        .iter()
        .filter(|e| matches!(e, TeamEvent::MergeProgress { .. }))
        .count();
    assert_eq!(phases, 0);
    let result = events
        .iter()
        .find_map(|e| match e {
            TeamEvent::TeamEnd { result, .. } => Some(result),
            _ => None,
        })
        .expect("team_end emitted");
    assert_eq!(result.findings.len(), 1);
}

#[tokio::test]
async fn persisted_run_reconstructs_from_store() {
    let dir = TempDir::new().unwrap();
    let store = Arc::new(
        pod_store::TeamStore::open(dir.path(), "session-1")
            .await
            .unwrap(),
    );
    let agent_loop = Arc::new(ScriptedLoop::new().answer("reviewer", FINDING_ANSWER));
    let engine = TeamEngine::builder(agent_loop)
        .with_store(store.clone())
        .build();

    let mut options = TeamOptions::new(team("persisted", &["reviewer"], "noop"), "task");
    options.session_id = "session-1".to_string();

    let mut stream = engine.run(options);
    let mut execution_id = None;
    let mut final_result = None;
    while let Some(event) = stream.next().await {
        match event {
            TeamEvent::TeamStart { execution_id: id, .. } => execution_id = id,
            TeamEvent::TeamEnd { result, .. } => final_result = Some(result),
            _ => {}
        }
    }
    let execution_id = execution_id.expect("execution persisted");
    let final_result = final_result.expect("team_end emitted");

    let restored = store
        .get_complete_team_result(execution_id)
        .await
        .unwrap()
        .expect("execution reconstructable");
    assert_eq!(restored.findings, final_result.findings);
    assert_eq!(
        restored.total_usage.input_tokens + restored.total_usage.output_tokens,
        final_result.total_usage.input_tokens + final_result.total_usage.output_tokens
    );

    // Snapshot chain ends in a completed phase with output data
    let snapshots = store.get_merge_snapshots(execution_id).await.unwrap();
    let last = snapshots.last().expect("snapshots written");
    assert_eq!(last.phase, MergePhase::Completed);
    assert!(last.output_data.is_some());
    // Five phase snapshots plus the completed one
    assert_eq!(snapshots.len(), 6);
    // Every earlier snapshot was patched with its transition
    for snapshot in &snapshots[..snapshots.len() - 1] {
        let output = snapshot.output_data.as_ref().expect("patched");
        assert!(output.get("transition_time").is_some());
    }

    let execution = store.get_execution(execution_id).await.unwrap().unwrap();
    assert_eq!(execution.status, pod_core::model::ExecutionStatus::Completed);
}

#[tokio::test]
async fn abort_produces_single_aborted_team_end() {
    let agent_loop = Arc::new(ScriptedLoop::new().answer("reviewer", "ok"));
    let engine = TeamEngine::new(agent_loop);
    let signal = AbortSignal::new();
    signal.abort();
    let mut options = TeamOptions::new(team("t", &["reviewer"], "noop"), "task");
    options.signal = Some(signal);

    let events = collect_events(engine.run(options)).await;
    let team_ends: Vec<_> = events
        .iter()
        .filter_map(|e| match e {
            TeamEvent::TeamEnd { result, .. } => Some(result),
            _ => None,
        })
        .collect();
    assert_eq!(team_ends.len(), 1);
    assert!(!team_ends[0].success);
    assert_eq!(team_ends[0].error.as_deref(), Some("Aborted"));
}

#[tokio::test]
async fn task_tool_results_emit_task_updates() {
    let prelude = vec![
        AgentEvent::ToolExecutionStart {
            id: "call-1".into(),
            name: "task_create".into(),
            args: json!({}),
        },
        AgentEvent::ToolExecutionEnd {
            id: "call-1".into(),
            is_error: false,
            text: Some("Created task #1: Investigate flaky test".into()),
        },
        AgentEvent::ToolExecutionStart {
            id: "call-2".into(),
            name: "task_update".into(),
            args: json!({}),
        },
        AgentEvent::ToolExecutionEnd {
            id: "call-2".into(),
            is_error: false,
            text: Some("Updated task #1 to done".into()),
        },
    ];
    let agent_loop = Arc::new(
        ScriptedLoop::new()
            .answer("worker", "done")
            .with_prelude(prelude),
    );
    let engine = TeamEngine::new(agent_loop);
    let options = TeamOptions::new(team("t", &["worker"], "noop"), "task");

    let events = collect_events(engine.run(options)).await;
    let updates: Vec<(usize, usize)> = events
        .iter()
        .filter_map(|e| match e {
            TeamEvent::AgentTaskUpdate {
                total, completed, ..
            } => Some((*total, *completed)),
            _ => None,
        })
        .collect();
    assert_eq!(updates, vec![(1, 0), (1, 1)]);
}
