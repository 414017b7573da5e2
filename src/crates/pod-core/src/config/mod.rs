//! Preset and team configuration loading
//!
//! Presets and teams are YAML documents. A preset directory holds one
//! document per agent; a team document references its agents inline.

use crate::error::{PodError, Result};
use crate::model::{AgentPreset, TeamConfig};
use std::collections::BTreeSet;
use std::path::Path;
use tracing::debug;

/// Load a single agent preset document
pub fn load_preset(path: &Path) -> Result<AgentPreset> {
    let text = std::fs::read_to_string(path)?;
    let preset: AgentPreset = serde_yaml::from_str(&text)
        .map_err(|e| PodError::Config(format!("{}: {}", path.display(), e)))?;
    validate_preset(&preset)?;
    Ok(preset)
}

/// Load every `.yaml`/`.yml` preset in a directory, sorted by file name
pub fn load_presets_dir(dir: &Path) -> Result<Vec<AgentPreset>> {
    let mut paths = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        let ext = path.extension().and_then(|e| e.to_str());
        if matches!(ext, Some("yaml") | Some("yml")) {
            paths.push(path);
        }
    }
    paths.sort();

    let mut presets = Vec::with_capacity(paths.len());
    for path in paths {
        presets.push(load_preset(&path)?);
    }
    debug!(count = presets.len(), dir = %dir.display(), "Loaded agent presets");
    Ok(presets)
}

/// Load and validate a team document
pub fn load_team(path: &Path) -> Result<TeamConfig> {
    let text = std::fs::read_to_string(path)?;
    let team: TeamConfig = serde_yaml::from_str(&text)
        .map_err(|e| PodError::Config(format!("{}: {}", path.display(), e)))?;
    validate_team(&team)?;
    Ok(team)
}

fn validate_preset(preset: &AgentPreset) -> Result<()> {
    if preset.name.trim().is_empty() {
        return Err(PodError::Config("preset name must not be empty".into()));
    }
    if preset.system_prompt.trim().is_empty() {
        return Err(PodError::Config(format!(
            "preset '{}' has an empty system prompt",
            preset.name
        )));
    }
    if let Some(t) = preset.temperature {
        if !(0.0..=2.0).contains(&t) {
            return Err(PodError::Config(format!(
                "preset '{}': temperature {} out of range",
                preset.name, t
            )));
        }
    }
    Ok(())
}

/// Validate a team configuration
///
/// Checks agent presence and name uniqueness; the merge strategy name is
/// resolved later against the registry, where unknown names bypass merging
/// rather than fail.
pub fn validate_team(team: &TeamConfig) -> Result<()> {
    if team.agents.is_empty() {
        return Err(PodError::Config(format!(
            "team '{}' has no agents",
            team.name
        )));
    }
    let mut seen = BTreeSet::new();
    for preset in &team.agents {
        validate_preset(preset)?;
        if !seen.insert(preset.name.as_str()) {
            return Err(PodError::Config(format!(
                "team '{}' lists agent '{}' more than once",
                team.name, preset.name
            )));
        }
    }
    Ok(())
}
