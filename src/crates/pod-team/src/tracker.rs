//! Task-manager progress tracking
//!
//! While forwarding agent events, the engine watches `tool_execution_end`
//! results from the task-manager tool family and maintains a per-agent map of
//! task id → {title, status}. The map is bounded; parse failures leave the
//! last known state untouched.

use regex::Regex;
use std::collections::BTreeMap;
use std::sync::OnceLock;

/// Tools whose names start with this prefix are task-manager tools
pub const TASK_TOOL_PREFIX: &str = "task_";

/// Cap on tracked tasks per agent
const MAX_TRACKED_TASKS: usize = 100;

/// Statuses counting as completed
const DONE_STATUSES: &[&str] = &["done", "cancelled"];

fn create_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"(?m)^Created task #(\d+): (.+)$").expect("valid create pattern")
    })
}

fn bulk_create_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"(?m)^Created (\d+) tasks$").expect("valid bulk create pattern")
    })
}

fn bulk_create_item_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"(?m)^\s*#(\d+): (.+)$").expect("valid bulk item pattern")
    })
}

fn update_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"(?m)^Updated task #(\d+) to (\w+)$").expect("valid update pattern")
    })
}

fn bulk_update_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"(?m)^Updated tasks ((?:#\d+(?:, )?)+) to (\w+)$")
            .expect("valid bulk update pattern")
    })
}

fn delete_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"(?m)^Deleted task #(\d+)$").expect("valid delete pattern")
    })
}

/// One tracked task
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackedTask {
    pub title: String,
    pub status: String,
}

/// Aggregate progress for one agent
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskProgress {
    pub total: usize,
    /// Tasks with status done or cancelled
    pub completed: usize,
    /// Title of the most recently started task
    pub active_task_title: Option<String>,
}

/// Per-agent task state derived from task-tool results
#[derive(Debug, Default)]
pub struct TaskTracker {
    tasks: BTreeMap<u64, TrackedTask>,
    active_id: Option<u64>,
}

impl TaskTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether this tool belongs to the task-manager family
    pub fn is_task_tool(tool_name: &str) -> bool {
        tool_name.starts_with(TASK_TOOL_PREFIX)
    }

    /// Fold one tool result into the state
    ///
    /// Returns the new progress when anything changed; unrecognized text
    /// changes nothing.
    pub fn observe(&mut self, tool_name: &str, result_text: &str) -> Option<TaskProgress> {
        if !Self::is_task_tool(tool_name) {
            return None;
        }
        let changed = self.apply_text(result_text);
        changed.then(|| self.progress())
    }

    fn apply_text(&mut self, text: &str) -> bool {
        let mut changed = false;

        for capture in create_pattern().captures_iter(text) {
            if let Ok(id) = capture[1].parse::<u64>() {
                changed |= self.insert(id, capture[2].trim().to_string());
            }
        }

        if bulk_create_pattern().is_match(text) {
            for capture in bulk_create_item_pattern().captures_iter(text) {
                if let Ok(id) = capture[1].parse::<u64>() {
                    changed |= self.insert(id, capture[2].trim().to_string());
                }
            }
        }

        for capture in update_pattern().captures_iter(text) {
            if let Ok(id) = capture[1].parse::<u64>() {
                changed |= self.set_status(id, &capture[2]);
            }
        }

        for capture in bulk_update_pattern().captures_iter(text) {
            let status = capture[2].to_string();
            for id in capture[1]
                .split(',')
                .filter_map(|part| part.trim().trim_start_matches('#').parse::<u64>().ok())
            {
                changed |= self.set_status(id, &status);
            }
        }

        for capture in delete_pattern().captures_iter(text) {
            if let Ok(id) = capture[1].parse::<u64>() {
                changed |= self.tasks.remove(&id).is_some();
                if self.active_id == Some(id) {
                    self.active_id = None;
                }
            }
        }

        changed
    }

    fn insert(&mut self, id: u64, title: String) -> bool {
        if self.tasks.len() >= MAX_TRACKED_TASKS && !self.tasks.contains_key(&id) {
            return false;
        }
        self.tasks.insert(
            id,
            TrackedTask {
                title,
                status: "pending".to_string(),
            },
        );
        true
    }

    fn set_status(&mut self, id: u64, status: &str) -> bool {
        let Some(task) = self.tasks.get_mut(&id) else {
            return false;
        };
        task.status = status.to_string();
        if status == "in_progress" {
            self.active_id = Some(id);
        } else if self.active_id == Some(id) {
            self.active_id = None;
        }
        true
    }

    /// Current aggregate progress
    pub fn progress(&self) -> TaskProgress {
        let completed = self
            .tasks
            .values()
            .filter(|task| DONE_STATUSES.contains(&task.status.as_str()))
            .count();
        let active_task_title = self
            .active_id
            .and_then(|id| self.tasks.get(&id))
            .or_else(|| {
                self.tasks
                    .values()
                    .find(|task| task.status == "in_progress")
            })
            .map(|task| task.title.clone());
        TaskProgress {
            total: self.tasks.len(),
            completed,
            active_task_title,
        }
    }
}
