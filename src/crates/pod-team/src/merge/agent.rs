//! LLM-assisted merge
//!
//! Runs the deterministic pipeline for parsing through ranking, then spawns a
//! single merge agent (one more agent-loop run) during synthesis to produce
//! clusters and a summary. Any failure in the merge agent degrades to the
//! heuristic output.

use super::cluster::{cluster, rank, synthesize, verify};
use super::{MergeOptions, MergeStrategy};
use async_trait::async_trait;
use futures::StreamExt;
use pod_core::error::Result;
use pod_core::events::AgentEvent;
use pod_core::llm::{AgentLoop, AgentPrompts, LoopContext, LoopOptions};
use pod_core::model::{
    AgentPreset, Finding, FindingCluster, MergeOutcome, MergePhase, MessageRole,
    Severity,
};
use serde::Deserialize;
use std::sync::Arc;
use tracing::{debug, warn};

/// Shape the merge agent is asked to answer with
#[derive(Debug, Deserialize)]
struct MergeReply {
    #[serde(default)]
    clusters: Vec<ClusterReply>,
    #[serde(default)]
    summary: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ClusterReply {
    title: String,
    finding_ids: Vec<String>,
}

pub struct AgentMergeStrategy;

#[async_trait]
impl MergeStrategy for AgentMergeStrategy {
    fn name(&self) -> &str {
        "agent"
    }

    async fn execute(
        &self,
        findings: Vec<Finding>,
        options: &MergeOptions,
    ) -> Result<MergeOutcome> {
        options.signal.check()?;
        options.progress(MergePhase::Parsing);

        options.signal.check()?;
        options.progress(MergePhase::Clustering);
        let heuristic_clusters = cluster(&findings);

        options.signal.check()?;
        options.progress(MergePhase::Verifying);
        let mut findings = verify(findings);

        options.signal.check()?;
        options.progress(MergePhase::Ranking);
        rank(&mut findings);

        options.signal.check()?;
        options.progress(MergePhase::Synthesizing);

        let synthesized = match (&options.agent_loop, &options.merge_agent) {
            (Some(agent_loop), Some(preset)) => {
                run_merge_agent(agent_loop.clone(), preset, &findings, options).await
            }
            _ => None,
        };

        let (clusters, summary) = match synthesized {
            Some((clusters, summary)) => (clusters, summary),
            None => {
                let summary = synthesize(&findings, &heuristic_clusters);
                (heuristic_clusters, Some(summary))
            }
        };

        Ok(MergeOutcome {
            findings,
            clusters,
            summary,
        })
    }
}

/// One single-agent run over the same loop machinery; None on any failure
async fn run_merge_agent(
    agent_loop: Arc<dyn AgentLoop>,
    preset: &AgentPreset,
    findings: &[Finding],
    options: &MergeOptions,
) -> Option<(Vec<FindingCluster>, Option<String>)> {
    let findings_json = serde_json::to_string_pretty(findings).ok()?;
    let task = format!(
        "Cluster the following findings and write a short summary. \
         Answer with JSON: {{\"clusters\": [{{\"title\", \"finding_ids\"}}], \"summary\"}}.\n\n{}",
        findings_json
    );

    let prompts = AgentPrompts {
        system_prompt: preset.system_prompt.clone(),
        task,
    };
    let context = LoopContext {
        cwd: None,
        tools: options.tools.clone(),
    };
    let loop_options = LoopOptions {
        provider: None,
        model: preset.model.clone(),
        temperature: preset.temperature,
        max_tokens: preset.max_tokens,
        thinking: preset.thinking,
    };

    let mut stream = match agent_loop
        .run(prompts, context, loop_options, options.signal.child())
        .await
    {
        Ok(stream) => stream,
        Err(e) => {
            warn!(error = %e, "Merge agent failed to start");
            return None;
        }
    };

    let mut final_text = String::new();
    let mut failed = false;
    while let Some(event) = stream.next().await {
        match &event {
            AgentEvent::MessageEnd { message } if message.role == MessageRole::Assistant => {
                final_text = message.text();
            }
            AgentEvent::AgentEnd { stop_reason, .. } => {
                failed = *stop_reason != pod_core::events::StopReason::Done;
            }
            _ => {}
        }
        options.event(event);
    }
    if failed {
        warn!("Merge agent loop ended with failure");
        return None;
    }

    let reply = parse_reply(&final_text)?;
    let clusters = materialize_clusters(reply.clusters, findings);
    debug!(clusters = clusters.len(), "Merge agent produced clusters");
    Some((clusters, reply.summary))
}

/// Extract the first JSON object from the agent's answer
fn parse_reply(text: &str) -> Option<MergeReply> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    if end <= start {
        return None;
    }
    serde_json::from_str(&text[start..=end]).ok()
}

/// Turn reply clusters into model clusters, dropping unknown finding ids
fn materialize_clusters(
    replies: Vec<ClusterReply>,
    findings: &[Finding],
) -> Vec<FindingCluster> {
    replies
        .into_iter()
        .enumerate()
        .filter_map(|(index, reply)| {
            let members: Vec<&Finding> = reply
                .finding_ids
                .iter()
                .filter_map(|id| findings.iter().find(|f| &f.id == id))
                .collect();
            if members.is_empty() {
                return None;
            }
            let severity = members
                .iter()
                .map(|f| f.severity)
                .min_by_key(|s| s.rank())
                .unwrap_or(Severity::Medium);
            Some(FindingCluster {
                id: format!("cluster-{}", index),
                title: reply.title,
                finding_ids: members.iter().map(|f| f.id.clone()).collect(),
                severity,
            })
        })
        .collect()
}
