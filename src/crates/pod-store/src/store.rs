//! Team execution store
//!
//! Three cascade-linked tables keyed by autoincrement ids. One pool
//! connection keeps writes serialized; WAL journaling and foreign keys are
//! set on open. Callers must not share a store handle across processes.

use crate::error::{Result, StoreError};
use crate::records::{
    AgentResultUpdate, MergeSnapshotRecord, StoredAgentResult, TeamExecutionRecord,
};
use crate::schema::ensure_schema;
use crate::path::team_db_path;
use chrono::Utc;
use pod_core::model::{
    AgentResult, AgentStatus, ExecutionStatus, Finding, MergeOutcome, MergePhase,
    TeamResult, TokenUsage,
};
use serde_json::Value;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::{Row, SqlitePool};
use std::path::Path;
use tracing::{debug, info};

/// Durable store for team executions
#[derive(Clone, Debug)]
pub struct TeamStore {
    pool: SqlitePool,
}

impl TeamStore {
    /// Open (creating if needed) the per-session database under `data_root`
    pub async fn open(data_root: &Path, session_id: &str) -> Result<Self> {
        let path = team_db_path(data_root, session_id)?;
        Self::open_at(&path).await
    }

    /// Open a database at an explicit path
    pub async fn open_at(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.exists() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await?;

        ensure_schema(&pool).await?;
        info!(path = %path.display(), "Team store opened");
        Ok(Self { pool })
    }

    /// Close the pool, flushing WAL state
    pub async fn close(&self) {
        self.pool.close().await;
    }

    // --- team_executions ---

    /// Create a new execution in status `pending`, returning its id
    pub async fn create_execution(
        &self,
        session_id: &str,
        team_name: &str,
        task: &str,
        agent_count: usize,
    ) -> Result<i64> {
        let now = Utc::now().timestamp_millis();
        let result = sqlx::query(
            "INSERT INTO team_executions (session_id, team_name, task, status, agent_count, started_at)
             VALUES (?, ?, ?, 'pending', ?, ?)",
        )
        .bind(session_id)
        .bind(team_name)
        .bind(task)
        .bind(agent_count as i64)
        .bind(now)
        .execute(&self.pool)
        .await?;

        let id = result.last_insert_rowid();
        debug!(execution_id = id, team = team_name, "Created team execution");
        Ok(id)
    }

    /// Update an execution's status, stamping `completed_at` on terminal states
    pub async fn update_execution_status(
        &self,
        id: i64,
        status: ExecutionStatus,
        error: Option<&str>,
    ) -> Result<()> {
        let completed_at = status
            .is_terminal()
            .then(|| Utc::now().timestamp_millis());
        sqlx::query(
            "UPDATE team_executions
             SET status = ?, error = COALESCE(?, error), completed_at = COALESCE(?, completed_at)
             WHERE id = ?",
        )
        .bind(status.as_str())
        .bind(error)
        .bind(completed_at)
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn get_execution(&self, id: i64) -> Result<Option<TeamExecutionRecord>> {
        let row = sqlx::query(
            "SELECT id, session_id, team_name, task, status, agent_count, error, started_at, completed_at
             FROM team_executions WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(execution_from_row))
    }

    /// Most recent execution for a (session, team) pair
    pub async fn get_latest_execution(
        &self,
        session_id: &str,
        team_name: &str,
    ) -> Result<Option<TeamExecutionRecord>> {
        let row = sqlx::query(
            "SELECT id, session_id, team_name, task, status, agent_count, error, started_at, completed_at
             FROM team_executions
             WHERE session_id = ? AND team_name = ?
             ORDER BY started_at DESC, id DESC
             LIMIT 1",
        )
        .bind(session_id)
        .bind(team_name)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(execution_from_row))
    }

    /// Executions that never reached a terminal status
    pub async fn get_incomplete_executions(
        &self,
        session_id: &str,
    ) -> Result<Vec<TeamExecutionRecord>> {
        let rows = sqlx::query(
            "SELECT id, session_id, team_name, task, status, agent_count, error, started_at, completed_at
             FROM team_executions
             WHERE session_id = ? AND status NOT IN ('completed', 'failed', 'aborted')
             ORDER BY started_at DESC, id DESC",
        )
        .bind(session_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(execution_from_row).collect())
    }

    /// Keep only the most recent `keep_per_team` executions per
    /// (session, team); returns the number of executions removed
    pub async fn prune_old_executions(&self, keep_per_team: u32) -> Result<u64> {
        let result = sqlx::query(
            "DELETE FROM team_executions
             WHERE id NOT IN (
                 SELECT t2.id FROM team_executions t2
                 WHERE t2.session_id = team_executions.session_id
                   AND t2.team_name = team_executions.team_name
                 ORDER BY t2.started_at DESC, t2.id DESC
                 LIMIT ?
             )",
        )
        .bind(keep_per_team as i64)
        .execute(&self.pool)
        .await?;
        let pruned = result.rows_affected();
        if pruned > 0 {
            debug!(pruned, keep_per_team, "Pruned old executions");
        }
        Ok(pruned)
    }

    // --- agent_results ---

    /// Create a pending agent result row, returning its id
    pub async fn create_agent_result(
        &self,
        execution_id: i64,
        agent_name: &str,
    ) -> Result<i64> {
        let now = Utc::now().timestamp_millis();
        let result = sqlx::query(
            "INSERT INTO agent_results (execution_id, agent_name, status, created_at, updated_at)
             VALUES (?, ?, 'pending', ?, ?)",
        )
        .bind(execution_id)
        .bind(agent_name)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await?;
        Ok(result.last_insert_rowid())
    }

    /// Apply a partial update; absent fields keep their stored values
    pub async fn update_agent_result(
        &self,
        id: i64,
        update: AgentResultUpdate,
    ) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        let row = sqlx::query(
            "SELECT status, findings, messages, usage, duration_ms, error
             FROM agent_results WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| StoreError::NotFound(format!("agent result {}", id)))?;

        let status = update
            .status
            .map(|s| s.as_str().to_string())
            .unwrap_or_else(|| row.get::<String, _>("status"));
        let findings = match update.findings {
            Some(findings) => serde_json::to_string(&findings)?,
            None => row.get::<String, _>("findings"),
        };
        let messages = match update.messages {
            Some(messages) => serde_json::to_string(&messages)?,
            None => row.get::<String, _>("messages"),
        };
        let usage = match update.usage {
            Some(usage) => Some(serde_json::to_string(&usage)?),
            None => row.get::<Option<String>, _>("usage"),
        };
        let duration_ms = update
            .duration_ms
            .or_else(|| row.get::<Option<i64>, _>("duration_ms"));
        let error = match update.error {
            Some(error) => error,
            None => row.get::<Option<String>, _>("error"),
        };

        sqlx::query(
            "UPDATE agent_results
             SET status = ?, findings = ?, messages = ?, usage = ?, duration_ms = ?, error = ?, updated_at = ?
             WHERE id = ?",
        )
        .bind(status)
        .bind(findings)
        .bind(messages)
        .bind(usage)
        .bind(duration_ms)
        .bind(error)
        .bind(Utc::now().timestamp_millis())
        .bind(id)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }

    /// Append findings to the stored blob (read-modify-write)
    pub async fn append_findings(
        &self,
        agent_result_id: i64,
        new_findings: &[Finding],
    ) -> Result<()> {
        if new_findings.is_empty() {
            return Ok(());
        }
        let mut tx = self.pool.begin().await?;

        let blob: String = sqlx::query_scalar("SELECT findings FROM agent_results WHERE id = ?")
            .bind(agent_result_id)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or_else(|| StoreError::NotFound(format!("agent result {}", agent_result_id)))?;

        let mut findings: Vec<Finding> = serde_json::from_str(&blob)?;
        findings.extend_from_slice(new_findings);

        sqlx::query("UPDATE agent_results SET findings = ?, updated_at = ? WHERE id = ?")
            .bind(serde_json::to_string(&findings)?)
            .bind(Utc::now().timestamp_millis())
            .bind(agent_result_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(())
    }

    pub async fn get_agent_results(&self, execution_id: i64) -> Result<Vec<StoredAgentResult>> {
        let rows = sqlx::query(
            "SELECT id, execution_id, agent_name, status, findings, messages, usage,
                    duration_ms, error, created_at, updated_at
             FROM agent_results WHERE execution_id = ? ORDER BY id",
        )
        .bind(execution_id)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(stored_agent_result_from_row).collect()
    }

    // --- merge_snapshots ---

    /// Append a snapshot for a new merge phase, returning its id
    pub async fn create_merge_snapshot(
        &self,
        execution_id: i64,
        phase: MergePhase,
        input_data: &Value,
    ) -> Result<i64> {
        let result = sqlx::query(
            "INSERT INTO merge_snapshots (execution_id, phase, input_data, created_at)
             VALUES (?, ?, ?, ?)",
        )
        .bind(execution_id)
        .bind(phase.as_str())
        .bind(serde_json::to_string(input_data)?)
        .bind(Utc::now().timestamp_millis())
        .execute(&self.pool)
        .await?;
        Ok(result.last_insert_rowid())
    }

    /// Patch a snapshot's output data when its phase ends
    pub async fn update_merge_snapshot(&self, id: i64, output_data: &Value) -> Result<()> {
        sqlx::query("UPDATE merge_snapshots SET output_data = ? WHERE id = ?")
            .bind(serde_json::to_string(output_data)?)
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn get_merge_snapshots(
        &self,
        execution_id: i64,
    ) -> Result<Vec<MergeSnapshotRecord>> {
        let rows = sqlx::query(
            "SELECT id, execution_id, phase, input_data, output_data, created_at
             FROM merge_snapshots WHERE execution_id = ? ORDER BY id",
        )
        .bind(execution_id)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(snapshot_from_row).collect()
    }

    // --- reconstruction ---

    /// Reconstruct the full team result for an execution
    ///
    /// Merged findings come from the last snapshot whose phase is
    /// `synthesizing` or `completed`; when no such snapshot carries output
    /// data, the per-agent findings are concatenated instead.
    pub async fn get_complete_team_result(
        &self,
        execution_id: i64,
    ) -> Result<Option<TeamResult>> {
        let Some(execution) = self.get_execution(execution_id).await? else {
            return Ok(None);
        };

        let stored = self.get_agent_results(execution_id).await?;
        let mut total_usage = TokenUsage::default();
        let mut agent_results = Vec::with_capacity(stored.len());
        for record in stored {
            let usage = record.usage.unwrap_or_default();
            total_usage.add(&usage);
            agent_results.push(AgentResult {
                agent_name: record.agent_name,
                success: record.status == AgentStatus::Completed,
                error: record.error,
                messages: record.messages,
                findings: record.findings,
                duration_ms: record.duration_ms.unwrap_or(0) as u64,
                usage,
            });
        }

        let snapshot = self.last_final_snapshot(execution_id).await?;
        let outcome = snapshot
            .and_then(|s| s.output_data)
            .and_then(|data| serde_json::from_value::<MergeOutcome>(data).ok())
            .unwrap_or_else(|| MergeOutcome {
                findings: agent_results
                    .iter()
                    .flat_map(|r| r.findings.iter().cloned())
                    .collect(),
                clusters: Vec::new(),
                summary: None,
            });

        let duration_ms = execution
            .completed_at
            .map(|end| (end - execution.started_at).max(0) as u64)
            .unwrap_or(0);

        Ok(Some(TeamResult {
            team_name: execution.team_name,
            success: agent_results.iter().any(|r| r.success),
            error: execution.error,
            agent_results,
            findings: outcome.findings,
            clusters: outcome.clusters,
            summary: outcome.summary,
            duration_ms,
            total_usage,
        }))
    }

    async fn last_final_snapshot(
        &self,
        execution_id: i64,
    ) -> Result<Option<MergeSnapshotRecord>> {
        let row = sqlx::query(
            "SELECT id, execution_id, phase, input_data, output_data, created_at
             FROM merge_snapshots
             WHERE execution_id = ? AND phase IN ('synthesizing', 'completed')
             ORDER BY id DESC LIMIT 1",
        )
        .bind(execution_id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(snapshot_from_row).transpose()
    }
}

fn execution_from_row(row: sqlx::sqlite::SqliteRow) -> TeamExecutionRecord {
    TeamExecutionRecord {
        id: row.get("id"),
        session_id: row.get("session_id"),
        team_name: row.get("team_name"),
        task: row.get("task"),
        status: ExecutionStatus::from(row.get::<String, _>("status").as_str()),
        agent_count: row.get("agent_count"),
        error: row.get("error"),
        started_at: row.get("started_at"),
        completed_at: row.get("completed_at"),
    }
}

fn stored_agent_result_from_row(row: sqlx::sqlite::SqliteRow) -> Result<StoredAgentResult> {
    let findings: Vec<Finding> = serde_json::from_str(&row.get::<String, _>("findings"))?;
    let messages = serde_json::from_str(&row.get::<String, _>("messages"))?;
    let usage = row
        .get::<Option<String>, _>("usage")
        .map(|blob| serde_json::from_str(&blob))
        .transpose()?;
    Ok(StoredAgentResult {
        id: row.get("id"),
        execution_id: row.get("execution_id"),
        agent_name: row.get("agent_name"),
        status: AgentStatus::from(row.get::<String, _>("status").as_str()),
        findings,
        messages,
        usage,
        duration_ms: row.get("duration_ms"),
        error: row.get("error"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    })
}

fn snapshot_from_row(row: sqlx::sqlite::SqliteRow) -> Result<MergeSnapshotRecord> {
    let input_data = serde_json::from_str(&row.get::<String, _>("input_data"))?;
    let output_data = row
        .get::<Option<String>, _>("output_data")
        .map(|blob| serde_json::from_str(&blob))
        .transpose()?;
    Ok(MergeSnapshotRecord {
        id: row.get("id"),
        execution_id: row.get("execution_id"),
        phase: MergePhase::from(row.get::<String, _>("phase").as_str()),
        input_data,
        output_data,
        created_at: row.get("created_at"),
    })
}
