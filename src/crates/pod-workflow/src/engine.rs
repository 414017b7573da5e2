//! Workflow execution engine
//!
//! Validates the step DAG up front (missing references, cycles), executes
//! every reachable step in a valid topological order, and threads a shared
//! context between steps. Conditional steps extend the frontier with their
//! chosen branch; skipped steps still contribute a result record.

use crate::backend::StepBackend;
use crate::context::{StepStatus, WorkflowContext, WorkflowStepResult};
use crate::definition::{Step, StepType, WorkflowDefinition};
use crate::events::{WorkflowEvent, WorkflowResult};
use pod_core::abort::AbortSignal;
use pod_core::error::{PodError, Result};
use pod_core::model::{AgentPreset, TeamConfig};
use pod_core::stream::{EventSender, EventStream};
use serde_json::{json, Value};
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Options for one workflow run
#[derive(Clone)]
pub struct WorkflowOptions {
    pub definition: WorkflowDefinition,
    pub context: WorkflowContext,
    /// Preset library the steps' agent names resolve through
    pub presets: HashMap<String, AgentPreset>,
    pub signal: Option<AbortSignal>,
}

impl WorkflowOptions {
    pub fn new(definition: WorkflowDefinition) -> Self {
        Self {
            definition,
            context: WorkflowContext::new(),
            presets: HashMap::new(),
            signal: None,
        }
    }
}

/// Executes workflow definitions over a step backend
pub struct WorkflowEngine {
    backend: Arc<dyn StepBackend>,
    abort: AbortSignal,
}

impl WorkflowEngine {
    pub fn new(backend: Arc<dyn StepBackend>) -> Self {
        Self {
            backend,
            abort: AbortSignal::new(),
        }
    }

    pub fn abort(&self) {
        self.abort.abort();
    }

    /// Start a run, returning its event stream
    ///
    /// Validation failures surface as an immediately-terminated stream whose
    /// result marks the workflow failed before any step ran.
    pub fn run(&self, options: WorkflowOptions) -> EventStream<WorkflowEvent, WorkflowResult> {
        let (sender, stream) = EventStream::channel(WorkflowEvent::is_terminal, |event| {
            match event {
                WorkflowEvent::WorkflowComplete { result, .. } => result.clone(),
                _ => unreachable!("terminal predicate only admits workflow_complete"),
            }
        });

        let signal = match &options.signal {
            Some(caller) => AbortSignal::merged(&self.abort, caller),
            None => self.abort.child(),
        };
        let backend = self.backend.clone();
        tokio::spawn(async move {
            execute_workflow(backend, options, signal, sender).await;
        });
        stream
    }

    /// Run to completion and return the final result
    pub async fn execute(&self, options: WorkflowOptions) -> Result<WorkflowResult> {
        self.run(options).result().await.ok_or_else(|| {
            PodError::Config("workflow stream ended without a result".to_string())
        })
    }
}

/// Pre-run validation: references resolve and the dependency DAG is acyclic
pub fn validate(definition: &WorkflowDefinition) -> Result<()> {
    let ids: HashSet<&str> = definition.steps.iter().map(|s| s.id.as_str()).collect();
    if ids.len() != definition.steps.len() {
        return Err(PodError::Config(format!(
            "workflow '{}' has duplicate step ids",
            definition.id
        )));
    }
    if !ids.contains(definition.entry_step.as_str()) {
        return Err(PodError::Config(format!(
            "entry step '{}' does not exist",
            definition.entry_step
        )));
    }
    for exit in &definition.exit_steps {
        if !ids.contains(exit.as_str()) {
            return Err(PodError::Config(format!(
                "exit step '{}' does not exist",
                exit
            )));
        }
    }
    for step in &definition.steps {
        for reference in step
            .depends_on
            .iter()
            .chain(&step.then_steps)
            .chain(&step.else_steps)
        {
            if !ids.contains(reference.as_str()) {
                return Err(PodError::Config(format!(
                    "step '{}' references unknown step '{}'",
                    step.id, reference
                )));
            }
        }
    }
    detect_cycles(definition)
}

/// DFS over `depends_on` edges with an explicit recursion stack
fn detect_cycles(definition: &WorkflowDefinition) -> Result<()> {
    let mut visited: HashSet<&str> = HashSet::new();
    let mut in_stack: HashSet<&str> = HashSet::new();

    fn visit<'a>(
        definition: &'a WorkflowDefinition,
        id: &'a str,
        visited: &mut HashSet<&'a str>,
        in_stack: &mut HashSet<&'a str>,
    ) -> Result<()> {
        if in_stack.contains(id) {
            let mut cycle: Vec<String> = in_stack.iter().map(|s| s.to_string()).collect();
            cycle.sort();
            return Err(PodError::Cycle(cycle));
        }
        if visited.contains(id) {
            return Ok(());
        }
        in_stack.insert(id);
        if let Some(step) = definition.step(id) {
            for dep in &step.depends_on {
                visit(definition, dep, visited, in_stack)?;
            }
        }
        in_stack.remove(id);
        visited.insert(id);
        Ok(())
    }

    for step in &definition.steps {
        visit(definition, &step.id, &mut visited, &mut in_stack)?;
    }
    Ok(())
}

/// Base execution order: DFS from the entry with dependencies first, then
/// unreachable steps in definition order; branch targets are deferred until
/// their conditional takes them
fn execution_order(definition: &WorkflowDefinition) -> Vec<String> {
    let branch_targets: HashSet<&str> = definition
        .steps
        .iter()
        .flat_map(|s| s.then_steps.iter().chain(&s.else_steps))
        .map(String::as_str)
        .collect();

    let mut order: Vec<String> = Vec::new();
    let mut visited: HashSet<String> = HashSet::new();

    fn visit(
        definition: &WorkflowDefinition,
        id: &str,
        visited: &mut HashSet<String>,
        order: &mut Vec<String>,
    ) {
        if visited.contains(id) {
            return;
        }
        visited.insert(id.to_string());
        let Some(step) = definition.step(id) else {
            return;
        };
        for dep in &step.depends_on {
            visit(definition, dep, visited, order);
        }
        order.push(id.to_string());
        // Dependents, in definition order
        for candidate in &definition.steps {
            if candidate.depends_on.iter().any(|d| d == id) {
                visit(definition, &candidate.id, visited, order);
            }
        }
    }

    visit(definition, &definition.entry_step, &mut visited, &mut order);

    // Nothing is silently lost: remaining non-branch steps run last
    for step in &definition.steps {
        if !visited.contains(&step.id) && !branch_targets.contains(step.id.as_str()) {
            visit(definition, &step.id, &mut visited, &mut order);
        }
    }

    order
}

async fn execute_workflow(
    backend: Arc<dyn StepBackend>,
    options: WorkflowOptions,
    signal: AbortSignal,
    sender: EventSender<WorkflowEvent, WorkflowResult>,
) {
    let started = Instant::now();
    let definition = &options.definition;
    let mut context = options.context.clone();
    for (key, value) in &definition.default_context {
        context.values.entry(key.clone()).or_insert(value.clone());
    }

    sender.push(WorkflowEvent::workflow_start(
        &definition.id,
        &definition.name,
        definition.steps.len(),
    ));

    let mut failed = false;
    if let Err(e) = validate(definition) {
        warn!(workflow = %definition.id, error = %e, "Workflow validation failed");
        failed = true;
        sender.push(WorkflowEvent::step_error(&definition.entry_step, &e.to_string()));
    } else {
        let mut queue: VecDeque<String> = execution_order(definition).into();
        let mut processed: HashSet<String> = HashSet::new();

        while let Some(step_id) = queue.pop_front() {
            if processed.contains(&step_id) {
                continue;
            }
            processed.insert(step_id.clone());
            let Some(step) = definition.step(&step_id) else {
                continue;
            };

            if signal.is_aborted() {
                warn!(workflow = %definition.id, "Workflow aborted");
                failed = true;
                break;
            }

            if let Some(reason) = skip_reason(step, &context) {
                debug!(step = %step.id, reason = %reason, "Skipping step");
                context.record_skipped(WorkflowStepResult {
                    step_id: step.id.clone(),
                    status: StepStatus::Skipped,
                    output: Value::Null,
                    error: None,
                    skip_reason: Some(reason.clone()),
                    duration_ms: 0,
                });
                sender.push(WorkflowEvent::step_skip(&step.id, &reason));
                continue;
            }

            sender.push(WorkflowEvent::step_start(&step.id, &step.name));
            let step_started = Instant::now();

            match run_step(&backend, step, &options.presets, &context, &signal, &sender).await {
                Ok(StepOutcome::Completed(output)) => {
                    // Declared writes land in the context only on success
                    for key in &step.writes {
                        context.values.insert(key.clone(), output.clone());
                    }
                    context.record_completed(WorkflowStepResult {
                        step_id: step.id.clone(),
                        status: StepStatus::Completed,
                        output,
                        error: None,
                        skip_reason: None,
                        duration_ms: step_started.elapsed().as_millis() as u64,
                    });
                    sender.push(WorkflowEvent::step_complete(&step.id));
                }
                Ok(StepOutcome::Branched { condition_met, taken, output }) => {
                    context.record_completed(WorkflowStepResult {
                        step_id: step.id.clone(),
                        status: StepStatus::Completed,
                        output,
                        error: None,
                        skip_reason: None,
                        duration_ms: step_started.elapsed().as_millis() as u64,
                    });
                    sender.push(WorkflowEvent::branch(&step.id, condition_met, taken.clone()));
                    // Chosen branch runs next, in its declared order
                    for id in taken.into_iter().rev() {
                        if !processed.contains(&id) {
                            queue.push_front(id);
                        }
                    }
                }
                Err(PodError::Cancelled) => {
                    failed = true;
                    sender.push(WorkflowEvent::step_error(&step.id, "Aborted"));
                    break;
                }
                Err(e) => {
                    let message = e.to_string();
                    warn!(step = %step.id, error = %message, "Step failed");
                    failed = true;
                    context.record_failed(WorkflowStepResult {
                        step_id: step.id.clone(),
                        status: StepStatus::Failed,
                        output: Value::Null,
                        error: Some(message.clone()),
                        skip_reason: None,
                        duration_ms: step_started.elapsed().as_millis() as u64,
                    });
                    sender.push(WorkflowEvent::step_error(&step.id, &message));
                }
            }
        }
    }

    let result = WorkflowResult {
        workflow_id: definition.id.clone(),
        name: definition.name.clone(),
        success: !failed,
        step_results: context.step_results.clone(),
        context: context.values.clone(),
        duration_ms: started.elapsed().as_millis() as u64,
    };
    info!(
        workflow = %definition.id,
        success = result.success,
        steps = result.step_results.len(),
        "Workflow finished"
    );
    sender.push(WorkflowEvent::workflow_complete(result));
}

/// Skip decision for one step, in priority order: explicit user decision,
/// skipped dependency, skip-by-default
fn skip_reason(step: &Step, context: &WorkflowContext) -> Option<String> {
    if step.skippable {
        if let Some(&skip) = context.skip_decisions.get(&step.id) {
            return skip.then(|| "Skipped by user".to_string());
        }
    }
    for dep in &step.depends_on {
        if context.skipped.contains(dep) {
            return Some(format!("Dependency '{}' was skipped", dep));
        }
    }
    if step.skippable && step.skip_by_default {
        return Some("Skipped by default".to_string());
    }
    None
}

enum StepOutcome {
    Completed(Value),
    Branched {
        condition_met: bool,
        taken: Vec<String>,
        output: Value,
    },
}

async fn run_step(
    backend: &Arc<dyn StepBackend>,
    step: &Step,
    presets: &HashMap<String, AgentPreset>,
    context: &WorkflowContext,
    signal: &AbortSignal,
    sender: &EventSender<WorkflowEvent, WorkflowResult>,
) -> Result<StepOutcome> {
    signal.check()?;
    let task = step_task(step, context);

    match step.step_type {
        StepType::Checkpoint => {
            sender.push(WorkflowEvent::checkpoint(&step.id));
            Ok(StepOutcome::Completed(json!({ "checkpoint": step.id })))
        }
        StepType::Conditional => {
            let condition_met = step
                .condition
                .as_ref()
                .map(|condition| condition.evaluate(context))
                .unwrap_or(true);
            let taken = if condition_met {
                step.then_steps.clone()
            } else {
                step.else_steps.clone()
            };
            Ok(StepOutcome::Branched {
                condition_met,
                taken,
                output: json!({ "condition_met": condition_met }),
            })
        }
        StepType::Agent => {
            let preset = resolve_preset(step, presets, 0)?;
            let result = backend.run_agent(preset, task, signal.child()).await?;
            if !result.success {
                return Err(PodError::AgentFatal(
                    result
                        .error
                        .unwrap_or_else(|| format!("agent step '{}' failed", step.id)),
                ));
            }
            Ok(StepOutcome::Completed(serde_json::to_value(&result)?))
        }
        StepType::Parallel => {
            let presets: Vec<AgentPreset> = (0..step.agents.len())
                .map(|index| resolve_preset(step, presets, index))
                .collect::<Result<_>>()?;
            if presets.is_empty() {
                return Err(PodError::Config(format!(
                    "parallel step '{}' lists no agents",
                    step.id
                )));
            }
            let results = backend.run_parallel(presets, task, signal.child()).await?;
            if !results.iter().any(|r| r.success) {
                return Err(PodError::AgentFatal(format!(
                    "every agent in parallel step '{}' failed",
                    step.id
                )));
            }
            Ok(StepOutcome::Completed(serde_json::to_value(&results)?))
        }
        StepType::Team => {
            let members: Vec<AgentPreset> = (0..step.agents.len())
                .map(|index| resolve_preset(step, presets, index))
                .collect::<Result<_>>()?;
            if members.is_empty() {
                return Err(PodError::Config(format!(
                    "team step '{}' lists no agents",
                    step.id
                )));
            }
            let config = TeamConfig::new(step.name.clone(), members);
            let result = backend.run_team(config, task, signal.child()).await?;
            if !result.success {
                return Err(PodError::AgentFatal(
                    result
                        .error
                        .unwrap_or_else(|| format!("team step '{}' failed", step.id)),
                ));
            }
            Ok(StepOutcome::Completed(serde_json::to_value(&result)?))
        }
    }
}

/// Task text for a step: its template rendered against the context, the
/// context's `task` value, or the step name
fn step_task(step: &Step, context: &WorkflowContext) -> String {
    if let Some(template) = &step.task {
        return context.render(template);
    }
    if let Some(Value::String(task)) = context.values.get("task") {
        return task.clone();
    }
    step.name.clone()
}

fn resolve_preset(
    step: &Step,
    presets: &HashMap<String, AgentPreset>,
    index: usize,
) -> Result<AgentPreset> {
    let name = step.agents.get(index).ok_or_else(|| {
        PodError::Config(format!("step '{}' lists no agent at position {}", step.id, index))
    })?;
    presets.get(name).cloned().ok_or_else(|| {
        PodError::Config(format!(
            "step '{}' references unknown agent preset '{}'",
            step.id, name
        ))
    })
}
