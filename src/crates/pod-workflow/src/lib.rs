//! Workflow engine
//!
//! A DAG of steps, each executing one agent, a parallel agent group, or a
//! whole team, with conditional branching, skip propagation, and a shared
//! key/value context threaded between steps.

pub mod backend;
pub mod condition;
pub mod context;
pub mod definition;
pub mod engine;
pub mod events;

pub use backend::{RuntimeBackend, StepBackend};
pub use condition::{Condition, ConditionOperator, ConditionType};
pub use context::{StepStatus, WorkflowContext, WorkflowStepResult};
pub use definition::{Step, StepType, WorkflowDefinition};
pub use engine::{validate, WorkflowEngine, WorkflowOptions};
pub use events::{WorkflowEvent, WorkflowResult};
