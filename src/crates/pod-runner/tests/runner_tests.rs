//! Integration tests for the subagent runner modes

use async_trait::async_trait;
use pod_core::abort::AbortSignal;
use pod_core::error::Result;
use pod_core::model::{AgentMessage, AgentPreset, AgentResult, TokenUsage};
use pod_runner::stream_state::UpdateFn;
use pod_runner::{
    ChildRunner, ResolvedCredentials, RunnerConfig, SubagentRunner, SubagentTask,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Instrumented fake child: tracks concurrent executions and echoes the task
struct FakeChild {
    running: AtomicUsize,
    max_running: AtomicUsize,
    spawned: AtomicUsize,
    delay: Duration,
    /// Agent names that should fail
    failing: Vec<String>,
}

impl FakeChild {
    fn new(delay: Duration) -> Self {
        Self {
            running: AtomicUsize::new(0),
            max_running: AtomicUsize::new(0),
            spawned: AtomicUsize::new(0),
            delay,
            failing: Vec::new(),
        }
    }

    fn failing(mut self, names: &[&str]) -> Self {
        self.failing = names.iter().map(|s| s.to_string()).collect();
        self
    }
}

#[async_trait]
impl ChildRunner for FakeChild {
    async fn run(
        &self,
        task: SubagentTask,
        _credentials: ResolvedCredentials,
        _signal: AbortSignal,
        _on_update: Option<Arc<UpdateFn>>,
    ) -> Result<AgentResult> {
        self.spawned.fetch_add(1, Ordering::SeqCst);
        let now = self.running.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_running.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep(self.delay).await;
        self.running.fetch_sub(1, Ordering::SeqCst);

        if self.failing.contains(&task.agent.name) {
            return Ok(AgentResult::failed(&task.agent.name, "simulated failure"));
        }
        Ok(AgentResult {
            agent_name: task.agent.name.clone(),
            success: true,
            error: None,
            messages: vec![
                AgentMessage::user(task.task.clone()),
                AgentMessage::assistant(format!("answer from {}: {}", task.agent.name, task.task)),
            ],
            findings: Vec::new(),
            duration_ms: 1,
            usage: TokenUsage::default(),
        })
    }
}

fn task(name: &str) -> SubagentTask {
    // Unknown provider: no credential variables required
    SubagentTask::new(AgentPreset::new(name, "prompt"), format!("task for {}", name), "local")
}

fn runner_with(child: Arc<FakeChild>, max_concurrency: usize) -> SubagentRunner {
    let config = RunnerConfig {
        max_concurrency,
        ..Default::default()
    };
    SubagentRunner::with_child_runner(config, child)
}

#[tokio::test]
async fn single_returns_the_child_result() {
    let child = Arc::new(FakeChild::new(Duration::from_millis(1)));
    let runner = runner_with(child, 4);
    let result = runner
        .run_single(task("solo"), &AbortSignal::new(), None)
        .await
        .unwrap();
    assert!(result.success);
    assert_eq!(result.agent_name, "solo");
}

#[tokio::test]
async fn parallel_respects_concurrency_cap() {
    let child = Arc::new(FakeChild::new(Duration::from_millis(30)));
    let runner = runner_with(child.clone(), 2);

    let tasks: Vec<SubagentTask> = (0..6).map(|i| task(&format!("agent-{}", i))).collect();
    let results = runner
        .run_parallel(tasks, &AbortSignal::new())
        .await
        .unwrap();

    assert_eq!(results.len(), 6);
    assert!(child.max_running.load(Ordering::SeqCst) <= 2);
    assert_eq!(child.spawned.load(Ordering::SeqCst), 6);
    // Results come back in input order
    for (i, result) in results.iter().enumerate() {
        assert_eq!(result.agent_name, format!("agent-{}", i));
    }
}

#[tokio::test]
async fn parallel_cap_never_exceeds_eight() {
    let child = Arc::new(FakeChild::new(Duration::from_millis(10)));
    let runner = runner_with(child.clone(), 50);

    let tasks: Vec<SubagentTask> = (0..20).map(|i| task(&format!("a{}", i))).collect();
    runner
        .run_parallel(tasks, &AbortSignal::new())
        .await
        .unwrap();
    assert!(child.max_running.load(Ordering::SeqCst) <= 8);
}

#[tokio::test]
async fn parallel_failures_become_failed_results() {
    let child = Arc::new(FakeChild::new(Duration::from_millis(1)).failing(&["agent-1"]));
    let runner = runner_with(child, 4);

    let tasks: Vec<SubagentTask> = (0..3).map(|i| task(&format!("agent-{}", i))).collect();
    let results = runner
        .run_parallel(tasks, &AbortSignal::new())
        .await
        .unwrap();
    assert!(results[0].success);
    assert!(!results[1].success);
    assert!(results[2].success);
}

#[tokio::test]
async fn parallel_fails_before_spawn_on_unresolvable_credentials() {
    let child = Arc::new(FakeChild::new(Duration::from_millis(1)));
    let config = RunnerConfig {
        max_concurrency: 4,
        key_resolver: Some(Arc::new(|_provider: &str| None)),
        ..Default::default()
    };
    let runner = SubagentRunner::with_child_runner(config, child.clone());

    let mut tasks: Vec<SubagentTask> = (0..2).map(|i| task(&format!("a{}", i))).collect();
    // Known provider with no resolvable key
    tasks.push(SubagentTask::new(
        AgentPreset::new("keyed", "prompt"),
        "task",
        "openrouter",
    ));

    std::env::remove_var("OPENROUTER_API_KEY");
    let outcome = runner.run_parallel(tasks, &AbortSignal::new()).await;
    assert!(outcome.is_err());
    // Nothing spawned: resolution happens before the first child starts
    assert_eq!(child.spawned.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn chain_substitutes_previous_and_runs_in_order() {
    let child = Arc::new(FakeChild::new(Duration::from_millis(1)));
    let runner = runner_with(child, 4);

    let tasks = vec![
        SubagentTask::new(AgentPreset::new("first", "p"), "start", "local"),
        SubagentTask::new(AgentPreset::new("second", "p"), "refine: {previous}", "local"),
    ];
    let outcome = runner
        .run_chain(tasks, &AbortSignal::new())
        .await
        .unwrap();

    assert!(outcome.failed_step.is_none());
    assert_eq!(outcome.results.len(), 2);
    // The second task saw the first's final assistant text
    let second_task = outcome.results[1].messages[0].text();
    assert_eq!(second_task, "refine: answer from first: start");
}

#[tokio::test]
async fn chain_halts_on_first_failure() {
    let child = Arc::new(FakeChild::new(Duration::from_millis(1)).failing(&["second"]));
    let runner = runner_with(child.clone(), 4);

    let tasks = vec![
        SubagentTask::new(AgentPreset::new("first", "p"), "a", "local"),
        SubagentTask::new(AgentPreset::new("second", "p"), "b", "local"),
        SubagentTask::new(AgentPreset::new("third", "p"), "c", "local"),
    ];
    let outcome = runner
        .run_chain(tasks, &AbortSignal::new())
        .await
        .unwrap();

    assert_eq!(outcome.failed_step, Some(1));
    assert_eq!(outcome.results.len(), 2);
    // The third step never ran
    assert_eq!(child.spawned.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn aborted_signal_stops_single_run() {
    let child = Arc::new(FakeChild::new(Duration::from_millis(1)));
    let runner = runner_with(child, 4);
    let signal = AbortSignal::new();
    signal.abort();
    assert!(runner.run_single(task("x"), &signal, None).await.is_err());
}
