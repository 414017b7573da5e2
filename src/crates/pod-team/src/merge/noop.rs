//! Pass-through merge

use super::{MergeOptions, MergeStrategy};
use async_trait::async_trait;
use pod_core::error::Result;
use pod_core::model::{Finding, MergeOutcome, MergePhase};

/// Returns the findings untouched
///
/// Still walks every phase so snapshot persistence sees the full sequence.
pub struct NoopMergeStrategy;

#[async_trait]
impl MergeStrategy for NoopMergeStrategy {
    fn name(&self) -> &str {
        "noop"
    }

    async fn execute(
        &self,
        findings: Vec<Finding>,
        options: &MergeOptions,
    ) -> Result<MergeOutcome> {
        for phase in [
            MergePhase::Parsing,
            MergePhase::Clustering,
            MergePhase::Verifying,
            MergePhase::Ranking,
            MergePhase::Synthesizing,
        ] {
            options.signal.check()?;
            options.progress(phase);
        }
        Ok(MergeOutcome {
            findings,
            clusters: Vec::new(),
            summary: None,
        })
    }
}
