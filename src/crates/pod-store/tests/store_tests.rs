//! Integration tests for the team execution store

use pod_core::model::{
    AgentMessage, AgentStatus, ExecutionStatus, Finding, LineRef, MergeOutcome,
    MergePhase, Severity, TokenUsage,
};
use pod_store::{AgentResultUpdate, TeamStore};
use serde_json::json;
use tempfile::TempDir;

async fn open_store(dir: &TempDir) -> TeamStore {
    TeamStore::open(dir.path(), "test-session").await.unwrap()
}

fn sample_finding(agent: &str, index: usize) -> Finding {
    let mut finding = Finding::new(agent, index, format!("finding {}", index));
    finding.severity = Severity::High;
    finding.file = Some("src/lib.rs".into());
    finding.line = Some(LineRef::Single(10 + index as u32));
    finding.description = "something is off".into();
    finding.references = vec!["CWE-20".into()];
    finding
}

#[tokio::test]
async fn execution_lifecycle_stamps_completed_at() {
    let dir = TempDir::new().unwrap();
    let store = open_store(&dir).await;

    let id = store
        .create_execution("test-session", "review", "Review file X", 2)
        .await
        .unwrap();

    let execution = store.get_execution(id).await.unwrap().unwrap();
    assert_eq!(execution.status, ExecutionStatus::Pending);
    assert!(execution.completed_at.is_none());

    store
        .update_execution_status(id, ExecutionStatus::Running, None)
        .await
        .unwrap();
    let execution = store.get_execution(id).await.unwrap().unwrap();
    assert_eq!(execution.status, ExecutionStatus::Running);
    assert!(execution.completed_at.is_none());

    store
        .update_execution_status(id, ExecutionStatus::Completed, None)
        .await
        .unwrap();
    let execution = store.get_execution(id).await.unwrap().unwrap();
    assert_eq!(execution.status, ExecutionStatus::Completed);
    assert!(execution.completed_at.is_some());
}

#[tokio::test]
async fn findings_round_trip_byte_identical() {
    let dir = TempDir::new().unwrap();
    let store = open_store(&dir).await;

    let execution_id = store
        .create_execution("test-session", "review", "task", 1)
        .await
        .unwrap();
    let result_id = store
        .create_agent_result(execution_id, "reviewer")
        .await
        .unwrap();

    let findings = vec![sample_finding("reviewer", 0), sample_finding("reviewer", 1)];
    store
        .update_agent_result(
            result_id,
            AgentResultUpdate {
                status: Some(AgentStatus::Completed),
                findings: Some(findings.clone()),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    let stored = store.get_agent_results(execution_id).await.unwrap();
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].findings, findings);
    assert_eq!(
        serde_json::to_vec(&stored[0].findings).unwrap(),
        serde_json::to_vec(&findings).unwrap()
    );
}

#[tokio::test]
async fn partial_update_keeps_other_fields() {
    let dir = TempDir::new().unwrap();
    let store = open_store(&dir).await;

    let execution_id = store
        .create_execution("test-session", "review", "task", 1)
        .await
        .unwrap();
    let result_id = store
        .create_agent_result(execution_id, "reviewer")
        .await
        .unwrap();

    store
        .update_agent_result(
            result_id,
            AgentResultUpdate {
                messages: Some(vec![AgentMessage::assistant("hello")]),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    store
        .update_agent_result(result_id, AgentResultUpdate::status(AgentStatus::Running))
        .await
        .unwrap();

    let stored = &store.get_agent_results(execution_id).await.unwrap()[0];
    assert_eq!(stored.status, AgentStatus::Running);
    assert_eq!(stored.messages.len(), 1);
}

#[tokio::test]
async fn update_refreshes_updated_at() {
    let dir = TempDir::new().unwrap();
    let store = open_store(&dir).await;

    let execution_id = store
        .create_execution("test-session", "review", "task", 1)
        .await
        .unwrap();
    let result_id = store
        .create_agent_result(execution_id, "reviewer")
        .await
        .unwrap();

    let before = store.get_agent_results(execution_id).await.unwrap()[0].updated_at;
    tokio::time::sleep(std::time::Duration::from_millis(5)).await;
    store
        .update_agent_result(result_id, AgentResultUpdate::status(AgentStatus::Retrying))
        .await
        .unwrap();
    let after = store.get_agent_results(execution_id).await.unwrap()[0].updated_at;
    assert!(after > before);
}

#[tokio::test]
async fn append_findings_extends_blob() {
    let dir = TempDir::new().unwrap();
    let store = open_store(&dir).await;

    let execution_id = store
        .create_execution("test-session", "review", "task", 1)
        .await
        .unwrap();
    let result_id = store
        .create_agent_result(execution_id, "reviewer")
        .await
        .unwrap();

    store
        .append_findings(result_id, &[sample_finding("reviewer", 0)])
        .await
        .unwrap();
    store
        .append_findings(result_id, &[sample_finding("reviewer", 1)])
        .await
        .unwrap();

    let stored = &store.get_agent_results(execution_id).await.unwrap()[0];
    assert_eq!(stored.findings.len(), 2);
    assert_eq!(stored.findings[1].id, "reviewer-1");
}

#[tokio::test]
async fn snapshots_append_and_patch() {
    let dir = TempDir::new().unwrap();
    let store = open_store(&dir).await;

    let execution_id = store
        .create_execution("test-session", "review", "task", 1)
        .await
        .unwrap();

    let first = store
        .create_merge_snapshot(execution_id, MergePhase::Parsing, &json!({"count": 3}))
        .await
        .unwrap();
    store
        .update_merge_snapshot(first, &json!({"phase": "clustering"}))
        .await
        .unwrap();
    store
        .create_merge_snapshot(execution_id, MergePhase::Clustering, &json!({}))
        .await
        .unwrap();

    let snapshots = store.get_merge_snapshots(execution_id).await.unwrap();
    assert_eq!(snapshots.len(), 2);
    assert_eq!(snapshots[0].phase, MergePhase::Parsing);
    assert_eq!(
        snapshots[0].output_data,
        Some(json!({"phase": "clustering"}))
    );
    assert_eq!(snapshots[1].phase, MergePhase::Clustering);
    assert!(snapshots[1].output_data.is_none());
}

#[tokio::test]
async fn complete_result_survives_reopen() {
    let dir = TempDir::new().unwrap();
    let findings = vec![sample_finding("reviewer", 0)];
    let usage = TokenUsage {
        input_tokens: 120,
        output_tokens: 40,
        cache_read_tokens: 0,
        cache_write_tokens: 0,
        cost: 0.02,
    };

    let execution_id = {
        let store = open_store(&dir).await;
        let execution_id = store
            .create_execution("test-session", "review", "Review file X", 1)
            .await
            .unwrap();
        let result_id = store
            .create_agent_result(execution_id, "reviewer")
            .await
            .unwrap();
        store
            .update_agent_result(
                result_id,
                AgentResultUpdate {
                    status: Some(AgentStatus::Completed),
                    findings: Some(findings.clone()),
                    usage: Some(usage),
                    duration_ms: Some(830),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        let outcome = MergeOutcome {
            findings: findings.clone(),
            clusters: Vec::new(),
            summary: Some("1 high finding".into()),
        };
        let snapshot_id = store
            .create_merge_snapshot(execution_id, MergePhase::Completed, &json!({}))
            .await
            .unwrap();
        store
            .update_merge_snapshot(snapshot_id, &serde_json::to_value(&outcome).unwrap())
            .await
            .unwrap();
        store
            .update_execution_status(execution_id, ExecutionStatus::Completed, None)
            .await
            .unwrap();
        store.close().await;
        execution_id
    };

    // Reopen and reconstruct
    let store = open_store(&dir).await;
    let result = store
        .get_complete_team_result(execution_id)
        .await
        .unwrap()
        .unwrap();

    assert!(result.success);
    assert_eq!(result.team_name, "review");
    assert_eq!(result.findings, findings);
    assert_eq!(result.summary.as_deref(), Some("1 high finding"));
    assert_eq!(
        result.total_usage.input_tokens + result.total_usage.output_tokens,
        160
    );
}

#[tokio::test]
async fn complete_result_falls_back_to_agent_findings() {
    let dir = TempDir::new().unwrap();
    let store = open_store(&dir).await;

    let execution_id = store
        .create_execution("test-session", "review", "task", 2)
        .await
        .unwrap();
    for agent in ["alpha", "beta"] {
        let result_id = store
            .create_agent_result(execution_id, agent)
            .await
            .unwrap();
        store
            .update_agent_result(
                result_id,
                AgentResultUpdate {
                    status: Some(AgentStatus::Completed),
                    findings: Some(vec![sample_finding(agent, 0)]),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
    }

    let result = store
        .get_complete_team_result(execution_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(result.findings.len(), 2);
    assert!(result.clusters.is_empty());
}

#[tokio::test]
async fn incomplete_executions_are_listed() {
    let dir = TempDir::new().unwrap();
    let store = open_store(&dir).await;

    let running = store
        .create_execution("test-session", "review", "a", 1)
        .await
        .unwrap();
    store
        .update_execution_status(running, ExecutionStatus::Running, None)
        .await
        .unwrap();
    let done = store
        .create_execution("test-session", "review", "b", 1)
        .await
        .unwrap();
    store
        .update_execution_status(done, ExecutionStatus::Completed, None)
        .await
        .unwrap();

    let incomplete = store
        .get_incomplete_executions("test-session")
        .await
        .unwrap();
    assert_eq!(incomplete.len(), 1);
    assert_eq!(incomplete[0].id, running);
}

#[tokio::test]
async fn prune_keeps_most_recent_per_team() {
    let dir = TempDir::new().unwrap();
    let store = open_store(&dir).await;

    for i in 0..5 {
        let id = store
            .create_execution("test-session", "review", &format!("task {}", i), 1)
            .await
            .unwrap();
        store
            .update_execution_status(id, ExecutionStatus::Completed, None)
            .await
            .unwrap();
    }
    let other = store
        .create_execution("test-session", "audit", "other", 1)
        .await
        .unwrap();

    let pruned = store.prune_old_executions(2).await.unwrap();
    assert_eq!(pruned, 3);

    // The other team's single execution is untouched
    assert!(store.get_execution(other).await.unwrap().is_some());
    let latest = store
        .get_latest_execution("test-session", "review")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(latest.task, "task 4");
}

#[tokio::test]
async fn children_cascade_on_execution_delete() {
    let dir = TempDir::new().unwrap();
    let store = open_store(&dir).await;

    // Two executions so pruning to one removes the older with its children
    let old = store
        .create_execution("test-session", "review", "old", 1)
        .await
        .unwrap();
    store.create_agent_result(old, "reviewer").await.unwrap();
    store
        .create_merge_snapshot(old, MergePhase::Parsing, &json!({}))
        .await
        .unwrap();
    store
        .create_execution("test-session", "review", "new", 1)
        .await
        .unwrap();

    store.prune_old_executions(1).await.unwrap();

    assert!(store.get_execution(old).await.unwrap().is_none());
    assert!(store.get_agent_results(old).await.unwrap().is_empty());
    assert!(store.get_merge_snapshots(old).await.unwrap().is_empty());
}
