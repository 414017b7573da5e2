//! Deterministic heuristic merge
//!
//! Clusters findings by (category, file), deduplicates corroborated
//! duplicates during verification, ranks by severity then confidence, and
//! synthesizes a counts-by-severity summary. Produces the same output for the
//! same input, with no model in the loop.

use super::{MergeOptions, MergeStrategy};
use async_trait::async_trait;
use pod_core::error::Result;
use pod_core::model::{Finding, FindingCluster, MergeOutcome, MergePhase, Severity};
use std::collections::BTreeMap;

/// Confidence at or above which a finding counts as verified on its own
const VERIFY_CONFIDENCE_FLOOR: f64 = 0.5;

pub struct ClusterMergeStrategy;

#[async_trait]
impl MergeStrategy for ClusterMergeStrategy {
    fn name(&self) -> &str {
        "cluster"
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
        let clusters = cluster(&findings);

        options.signal.check()?;
        options.progress(MergePhase::Verifying);
        let mut findings = verify(findings);

        options.signal.check()?;
        options.progress(MergePhase::Ranking);
        rank(&mut findings);

        options.signal.check()?;
        options.progress(MergePhase::Synthesizing);
        let summary = synthesize(&findings, &clusters);

        Ok(MergeOutcome {
            findings,
            clusters,
            summary: Some(summary),
        })
    }
}

/// Group findings by (category, file), most severe member first
pub(super) fn cluster(findings: &[Finding]) -> Vec<FindingCluster> {
    let mut groups: BTreeMap<(String, String), Vec<&Finding>> = BTreeMap::new();
    for finding in findings {
        let key = (
            finding.category.as_str().to_string(),
            finding.file.clone().unwrap_or_default(),
        );
        groups.entry(key).or_default().push(finding);
    }

    groups
        .into_values()
        .enumerate()
        .map(|(index, mut members)| {
            members.sort_by_key(|f| (f.severity.rank(), f.id.clone()));
            FindingCluster {
                id: format!("cluster-{}", index),
                title: members[0].title.clone(),
                finding_ids: members.iter().map(|f| f.id.clone()).collect(),
                severity: members[0].severity,
            }
        })
        .collect()
}

/// Deduplicate corroborated findings and set the verified flag
///
/// Findings with the same (title, file, line) reported by multiple agents
/// collapse into the first occurrence, which becomes verified. A lone finding
/// is verified when its confidence clears the floor.
pub(super) fn verify(findings: Vec<Finding>) -> Vec<Finding> {
    let mut seen: BTreeMap<(String, String, Option<u32>), usize> = BTreeMap::new();
    let mut out: Vec<Finding> = Vec::with_capacity(findings.len());

    for mut finding in findings {
        let key = (
            finding.title.to_ascii_lowercase(),
            finding.file.clone().unwrap_or_default(),
            finding.line.map(|l| l.start()),
        );
        match seen.get(&key) {
            Some(&index) => {
                // Corroborated by another agent
                out[index].verified = true;
                let confidence = finding.confidence.unwrap_or(0.0);
                if confidence > out[index].confidence.unwrap_or(0.0) {
                    out[index].confidence = Some(confidence);
                }
            }
            None => {
                finding.verified =
                    finding.confidence.unwrap_or(0.0) >= VERIFY_CONFIDENCE_FLOOR;
                seen.insert(key, out.len());
                out.push(finding);
            }
        }
    }
    out
}

/// Severity first, then confidence, then id for determinism
pub(super) fn rank(findings: &mut [Finding]) {
    findings.sort_by(|a, b| {
        a.severity
            .rank()
            .cmp(&b.severity.rank())
            .then_with(|| {
                b.confidence
                    .unwrap_or(0.0)
                    .partial_cmp(&a.confidence.unwrap_or(0.0))
                    .unwrap_or(std::cmp::Ordering::Equal)
            })
            .then_with(|| a.id.cmp(&b.id))
    });
}

pub(super) fn synthesize(findings: &[Finding], clusters: &[FindingCluster]) -> String {
    let mut counts: BTreeMap<u8, (Severity, usize)> = BTreeMap::new();
    for finding in findings {
        counts
            .entry(finding.severity.rank())
            .or_insert((finding.severity, 0))
            .1 += 1;
    }
    let by_severity: Vec<String> = counts
        .values()
        .map(|(severity, count)| format!("{} {}", count, severity))
        .collect();
    format!(
        "{} findings in {} clusters ({})",
        findings.len(),
        clusters.len(),
        by_severity.join(", ")
    )
}
