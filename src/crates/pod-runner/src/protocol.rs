//! Subagent subprocess protocol
//!
//! The parent invokes the child with json mode, a single prompt, no session
//! save, explicit provider and model, and the task as the final positional
//! argument. The child answers with one JSON event per stdout line; stderr is
//! free-form diagnostics.

use pod_core::events::AgentEvent;
use pod_core::model::AgentPreset;
use tracing::trace;

/// One subagent invocation
#[derive(Debug, Clone)]
pub struct SubagentTask {
    pub agent: AgentPreset,
    pub task: String,
    pub provider: String,
    pub cwd: Option<std::path::PathBuf>,
}

impl SubagentTask {
    pub fn new(agent: AgentPreset, task: impl Into<String>, provider: impl Into<String>) -> Self {
        Self {
            agent,
            task: task.into(),
            provider: provider.into(),
            cwd: None,
        }
    }
}

/// Build the child's argument vector
///
/// `prompt_path` points at the tempfile holding the agent's system prompt.
pub fn build_child_args(
    invocation: &SubagentTask,
    prompt_path: Option<&std::path::Path>,
) -> Vec<String> {
    let mut args = vec![
        "--mode".to_string(),
        "json".to_string(),
        "--single-prompt".to_string(),
        "--no-session-save".to_string(),
        "--provider".to_string(),
        invocation.provider.clone(),
    ];
    if let Some(model) = &invocation.agent.model {
        args.push("--model".to_string());
        args.push(model.clone());
    }
    if !invocation.agent.tools.is_empty() {
        args.push("--tools".to_string());
        args.push(invocation.agent.tools.join(","));
    }
    if let Some(path) = prompt_path {
        args.push("--append-system-prompt".to_string());
        args.push(path.display().to_string());
    }
    args.push(format!("Task: {}", invocation.task));
    args
}

/// Parse one stdout line into an event
///
/// Blank lines and undecodable lines yield None; unknown event types decode
/// to [`AgentEvent::Unknown`] and are skipped by the caller.
pub fn parse_event_line(line: &str) -> Option<AgentEvent> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }
    match serde_json::from_str::<AgentEvent>(line) {
        Ok(event) => Some(event),
        Err(e) => {
            trace!(error = %e, "Skipping undecodable child event line");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pod_core::events::StopReason;

    fn invocation() -> SubagentTask {
        let mut agent = AgentPreset::new("reviewer", "Review things.");
        agent.model = Some("claude-sonnet".into());
        agent.tools = vec!["read_file".into(), "grep".into()];
        SubagentTask::new(agent, "Review file X", "anthropic")
    }

    #[test]
    fn args_carry_flags_and_final_task() {
        let inv = invocation();
        let args = build_child_args(&inv, Some(std::path::Path::new("/tmp/p.md")));
        assert_eq!(args[0..2], ["--mode", "json"]);
        assert!(args.contains(&"--no-session-save".to_string()));
        assert!(args.contains(&"--provider".to_string()));
        assert!(args.contains(&"--tools".to_string()));
        assert!(args.contains(&"read_file,grep".to_string()));
        assert!(args.contains(&"--append-system-prompt".to_string()));
        assert_eq!(args.last().unwrap(), "Task: Review file X");
    }

    #[test]
    fn optional_flags_are_omitted() {
        let mut inv = invocation();
        inv.agent.model = None;
        inv.agent.tools.clear();
        let args = build_child_args(&inv, None);
        assert!(!args.contains(&"--model".to_string()));
        assert!(!args.contains(&"--tools".to_string()));
        assert!(!args.contains(&"--append-system-prompt".to_string()));
    }

    #[test]
    fn event_lines_parse() {
        let event = parse_event_line(
            r#"{"type":"agent_end","stop_reason":"done"}"#,
        )
        .unwrap();
        assert!(matches!(
            event,
            AgentEvent::AgentEnd {
                stop_reason: StopReason::Done,
                ..
            }
        ));
    }

    #[test]
    fn garbage_lines_are_skipped() {
        assert!(parse_event_line("").is_none());
        assert!(parse_event_line("not json at all").is_none());
    }

    #[test]
    fn unknown_event_types_decode_to_unknown() {
        let event = parse_event_line(r#"{"type":"shiny_new_event","x":1}"#).unwrap();
        assert_eq!(event, AgentEvent::Unknown);
    }
}
