//! Durable persistence for team executions
//!
//! An embedded SQLite store holding executions, per-agent results and merge
//! snapshots, so a crashed run can be reconstructed. Engines treat every
//! store error as skippable: a failed write is logged and execution
//! continues.

pub mod error;
pub mod path;
pub mod records;
pub mod schema;
pub mod store;

pub use error::{Result, StoreError};
pub use records::{
    AgentResultUpdate, MergeSnapshotRecord, StoredAgentResult, TeamExecutionRecord,
};
pub use store::TeamStore;
