//! Subagent execution modes
//!
//! Three ways to run agents as isolated child processes: `single` (one
//! task), `parallel` (bounded fan-out preserving input order), and `chain`
//! (sequential with `{previous}` substitution, halting on first failure).
//!
//! Parallel mode resolves every task's credentials before the first spawn so
//! a late resolution failure cannot orphan running children. Workers pull
//! task indices from a shared atomic counter, incrementing before any await.

use crate::env::{build_child_env, resolve_credentials, ResolvedCredentials};
use crate::prompt::PromptFile;
use crate::protocol::{build_child_args, parse_event_line, SubagentTask};
use crate::stream_state::{StreamState, UpdateFn};
use async_trait::async_trait;
use pod_core::abort::AbortSignal;
use pod_core::error::{PodError, Result};
use pod_core::llm::KeyResolver;
use pod_core::model::AgentResult;
use std::process::Stdio;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, Command};
use tracing::{debug, warn};

/// Default parallel fan-out
pub const DEFAULT_MAX_CONCURRENCY: usize = 4;

/// Hard cap on parallel fan-out
pub const MAX_CONCURRENCY_CAP: usize = 8;

/// Grace period between SIGTERM and SIGKILL
const TERM_GRACE: Duration = Duration::from_secs(5);

/// Runner configuration
#[derive(Clone)]
pub struct RunnerConfig {
    /// Binary invoked for each child agent
    pub command: String,
    pub max_concurrency: usize,
    pub key_resolver: Option<KeyResolver>,
}

impl std::fmt::Debug for RunnerConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RunnerConfig")
            .field("command", &self.command)
            .field("max_concurrency", &self.max_concurrency)
            .finish()
    }
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            command: "pod".to_string(),
            max_concurrency: DEFAULT_MAX_CONCURRENCY,
            key_resolver: None,
        }
    }
}

/// Outcome of a chain run
#[derive(Debug, Clone)]
pub struct ChainOutcome {
    /// Results of the steps that ran, in order
    pub results: Vec<AgentResult>,
    /// Index of the step that failed, when the chain halted early
    pub failed_step: Option<usize>,
}

/// Executes one child agent to completion
///
/// The production implementation spawns a subprocess; tests substitute an
/// instrumented fake.
#[async_trait]
pub trait ChildRunner: Send + Sync {
    async fn run(
        &self,
        task: SubagentTask,
        credentials: ResolvedCredentials,
        signal: AbortSignal,
        on_update: Option<Arc<UpdateFn>>,
    ) -> Result<AgentResult>;
}

/// Spawns real child processes speaking the NDJSON protocol
#[derive(Debug, Clone)]
pub struct ProcessChildRunner {
    command: String,
}

impl ProcessChildRunner {
    pub fn new(command: &str) -> Self {
        Self {
            command: command.to_string(),
        }
    }
}

#[async_trait]
impl ChildRunner for ProcessChildRunner {
    async fn run(
        &self,
        task: SubagentTask,
        credentials: ResolvedCredentials,
        signal: AbortSignal,
        on_update: Option<Arc<UpdateFn>>,
    ) -> Result<AgentResult> {
        signal.check()?;

        let prompt = PromptFile::create(&task.agent.system_prompt)?;
        let args = build_child_args(&task, Some(prompt.path()));
        let env = build_child_env(&credentials);

        let mut command = Command::new(&self.command);
        command
            .args(&args)
            .env_clear()
            .envs(env)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(cwd) = &task.cwd {
            command.current_dir(cwd);
        }

        let started = Instant::now();
        let mut child = command
            .spawn()
            .map_err(|e| PodError::Subprocess(format!("failed to spawn {}: {}", self.command, e)))?;
        debug!(agent = %task.agent.name, pid = ?child.id(), "Spawned subagent");

        let stdout = child.stdout.take().ok_or_else(|| {
            PodError::Subprocess("child stdout was not captured".to_string())
        })?;
        if let Some(stderr) = child.stderr.take() {
            let agent = task.agent.name.clone();
            let verbose = pod_core::debug_agents_enabled();
            tokio::spawn(async move {
                let mut lines = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    if verbose {
                        tracing::info!(agent = %agent, "subagent stderr: {}", line);
                    } else {
                        debug!(agent = %agent, "subagent stderr: {}", line);
                    }
                }
            });
        }

        let mut lines = BufReader::new(stdout).lines();
        let mut state = StreamState::new(&task.agent.name);
        let mut aborted = false;

        loop {
            tokio::select! {
                line = lines.next_line() => match line {
                    Ok(Some(line)) => {
                        if let Some(event) = parse_event_line(&line) {
                            state.apply(event);
                            if let Some(cb) = &on_update {
                                if state.should_emit_update() {
                                    cb(state.snapshot());
                                }
                            }
                        }
                    }
                    Ok(None) => break,
                    Err(e) => {
                        warn!(agent = %task.agent.name, error = %e, "Lost subagent stdout");
                        break;
                    }
                },
                _ = signal.cancelled() => {
                    aborted = true;
                    break;
                }
            }
        }

        let exit_ok = if aborted {
            terminate(&mut child, &task.agent.name).await;
            false
        } else {
            match child.wait().await {
                Ok(status) => status.success(),
                Err(e) => {
                    warn!(agent = %task.agent.name, error = %e, "Failed to reap subagent");
                    false
                }
            }
        };
        let duration_ms = started.elapsed().as_millis() as u64;

        // Tempfile removal must follow child exit on every path
        prompt.cleanup();

        if aborted {
            return Err(PodError::Cancelled);
        }
        Ok(state.into_result(exit_ok, duration_ms))
    }
}

/// SIGTERM, then SIGKILL after the grace period
async fn terminate(child: &mut Child, agent: &str) {
    #[cfg(unix)]
    if let Some(pid) = child.id() {
        debug!(agent = %agent, pid, "Sending SIGTERM to subagent");
        unsafe {
            libc::kill(pid as i32, libc::SIGTERM);
        }
    }
    #[cfg(not(unix))]
    let _ = child.start_kill();

    if tokio::time::timeout(TERM_GRACE, child.wait()).await.is_err() {
        warn!(agent = %agent, "Subagent ignored SIGTERM, sending SIGKILL");
        let _ = child.start_kill();
        let _ = child.wait().await;
    }
}

/// Runs subagents in single, parallel, or chain mode
pub struct SubagentRunner {
    config: RunnerConfig,
    child_runner: Arc<dyn ChildRunner>,
}

impl SubagentRunner {
    pub fn new(config: RunnerConfig) -> Self {
        let child_runner = Arc::new(ProcessChildRunner::new(&config.command));
        Self {
            config,
            child_runner,
        }
    }

    /// Substitute the child execution backend (test instrumentation)
    pub fn with_child_runner(config: RunnerConfig, child_runner: Arc<dyn ChildRunner>) -> Self {
        Self {
            config,
            child_runner,
        }
    }

    /// Run one task to completion
    ///
    /// Returns a failed [`AgentResult`] for child-level failures; `Err` is
    /// reserved for cancellation and pre-flight errors.
    pub async fn run_single(
        &self,
        task: SubagentTask,
        signal: &AbortSignal,
        on_update: Option<Arc<UpdateFn>>,
    ) -> Result<AgentResult> {
        signal.check()?;
        let credentials =
            resolve_credentials(&task.provider, self.config.key_resolver.as_ref())?;
        self.child_runner
            .run(task, credentials, signal.clone(), on_update)
            .await
    }

    /// Run tasks with bounded fan-out, returning results in input order
    ///
    /// Exactly `min(max_concurrency, 8, N)` workers pull indices from a
    /// shared counter. Per-task failures become failed results; the call
    /// itself only fails on pre-flight credential resolution.
    pub async fn run_parallel(
        &self,
        tasks: Vec<SubagentTask>,
        signal: &AbortSignal,
    ) -> Result<Vec<AgentResult>> {
        signal.check()?;
        if tasks.is_empty() {
            return Ok(Vec::new());
        }

        // Every resolution must succeed before the first spawn
        let mut credentials = Vec::with_capacity(tasks.len());
        for task in &tasks {
            credentials
                .push(resolve_credentials(&task.provider, self.config.key_resolver.as_ref())?);
        }

        let worker_count = self
            .config
            .max_concurrency
            .min(MAX_CONCURRENCY_CAP)
            .min(tasks.len())
            .max(1);
        debug!(tasks = tasks.len(), workers = worker_count, "Starting parallel subagents");

        let tasks = Arc::new(tasks);
        let credentials = Arc::new(credentials);
        let next = Arc::new(AtomicUsize::new(0));

        let mut workers = Vec::with_capacity(worker_count);
        for _ in 0..worker_count {
            let tasks = tasks.clone();
            let credentials = credentials.clone();
            let next = next.clone();
            let child_runner = self.child_runner.clone();
            let signal = signal.clone();
            workers.push(async move {
                let mut collected = Vec::new();
                loop {
                    // Claim the next index before any suspension
                    let index = next.fetch_add(1, Ordering::SeqCst);
                    if index >= tasks.len() {
                        break;
                    }
                    let task = tasks[index].clone();
                    let agent_name = task.agent.name.clone();
                    let outcome = child_runner
                        .run(task, credentials[index].clone(), signal.clone(), None)
                        .await;
                    let result = match outcome {
                        Ok(result) => result,
                        Err(PodError::Cancelled) => AgentResult::failed(&agent_name, "Aborted"),
                        Err(e) => AgentResult::failed(&agent_name, e.to_string()),
                    };
                    collected.push((index, result));
                }
                collected
            });
        }

        let mut pairs: Vec<(usize, AgentResult)> = futures::future::join_all(workers)
            .await
            .into_iter()
            .flatten()
            .collect();
        pairs.sort_by_key(|(index, _)| *index);
        Ok(pairs.into_iter().map(|(_, result)| result).collect())
    }

    /// Run tasks sequentially, substituting `{previous}` with the previous
    /// step's final assistant text; halts on first failure
    pub async fn run_chain(
        &self,
        tasks: Vec<SubagentTask>,
        signal: &AbortSignal,
    ) -> Result<ChainOutcome> {
        let mut results = Vec::with_capacity(tasks.len());
        let mut previous_text = String::new();

        for (index, task) in tasks.into_iter().enumerate() {
            signal.check()?;
            let mut task = task;
            task.task = task.task.replace("{previous}", &previous_text);

            let credentials =
                resolve_credentials(&task.provider, self.config.key_resolver.as_ref())?;
            let agent_name = task.agent.name.clone();
            let result = match self
                .child_runner
                .run(task, credentials, signal.clone(), None)
                .await
            {
                Ok(result) => result,
                Err(PodError::Cancelled) => return Err(PodError::Cancelled),
                Err(e) => AgentResult::failed(&agent_name, e.to_string()),
            };

            let failed = !result.success;
            previous_text = result.final_text();
            results.push(result);
            if failed {
                warn!(step = index, "Chain halted on failed step");
                return Ok(ChainOutcome {
                    results,
                    failed_step: Some(index),
                });
            }
        }

        Ok(ChainOutcome {
            results,
            failed_step: None,
        })
    }
}
