//! Database path derivation
//!
//! Each session gets its own database under the data root:
//! `<data-root>/team-executions/<sanitized-prefix>_<hash16>/team.db`. The
//! prefix keeps directories recognizable; the hash keeps them unique for
//! session ids that sanitize to the same prefix. The derived path is checked
//! to stay inside the data root.

use crate::error::{Result, StoreError};
use sha2::{Digest, Sha256};
use std::path::{Component, Path, PathBuf};

const PREFIX_LEN: usize = 20;
const HASH_LEN: usize = 16;

/// Database file name inside the per-session directory
pub const DB_FILE_NAME: &str = "team.db";

/// Default data root: `POD_DATA_DIR` when set, else `~/.pod`
pub fn default_data_root() -> Option<PathBuf> {
    if let Ok(dir) = std::env::var("POD_DATA_DIR") {
        if !dir.is_empty() {
            return Some(PathBuf::from(dir));
        }
    }
    dirs::home_dir().map(|home| home.join(".pod"))
}

/// Derive the per-session database path under the data root
pub fn team_db_path(data_root: &Path, session_id: &str) -> Result<PathBuf> {
    if session_id.is_empty() {
        return Err(StoreError::InvalidPath("empty session id".into()));
    }

    let prefix: String = session_id
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '_' || *c == '-')
        .take(PREFIX_LEN)
        .collect();
    let prefix = if prefix.is_empty() {
        "session".to_string()
    } else {
        prefix
    };

    let digest = Sha256::digest(session_id.as_bytes());
    let hash = format!("{:x}", digest);
    let dir_name = format!("{}_{}", prefix, &hash[..HASH_LEN]);

    let path = data_root
        .join("team-executions")
        .join(dir_name)
        .join(DB_FILE_NAME);

    if !is_contained(data_root, &path) {
        return Err(StoreError::InvalidPath(format!(
            "derived path {} escapes data root {}",
            path.display(),
            data_root.display()
        )));
    }
    Ok(path)
}

/// Whether `path` stays inside `root` without traversal components
fn is_contained(root: &Path, path: &Path) -> bool {
    if path
        .components()
        .any(|c| matches!(c, Component::ParentDir))
    {
        return false;
    }
    path.starts_with(root)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derives_stable_path() {
        let root = Path::new("/data");
        let first = team_db_path(root, "session-abc-123").unwrap();
        let second = team_db_path(root, "session-abc-123").unwrap();
        assert_eq!(first, second);
        assert!(first.starts_with("/data/team-executions"));
        assert!(first.ends_with("team.db"));
        let dir = first.parent().unwrap().file_name().unwrap().to_str().unwrap();
        assert!(dir.starts_with("session-abc-123_"));
        // prefix + underscore + 16 hex chars
        assert_eq!(dir.len(), "session-abc-123".len() + 1 + 16);
    }

    #[test]
    fn hostile_session_ids_are_sanitized() {
        let root = Path::new("/data");
        let path = team_db_path(root, "../../etc/passwd").unwrap();
        assert!(path.starts_with("/data/team-executions"));
        assert!(!path.to_str().unwrap().contains(".."));
    }

    #[test]
    fn different_sessions_get_different_dirs() {
        let root = Path::new("/data");
        let a = team_db_path(root, "alpha").unwrap();
        let b = team_db_path(root, "beta").unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn long_ids_collapse_to_prefix_plus_hash() {
        let root = Path::new("/data");
        let long_a = format!("{}{}", "a".repeat(40), "x");
        let long_b = format!("{}{}", "a".repeat(40), "y");
        let a = team_db_path(root, &long_a).unwrap();
        let b = team_db_path(root, &long_b).unwrap();
        // Same prefix, distinguished by the hash
        assert_ne!(a, b);
    }

    #[test]
    fn empty_session_id_is_rejected() {
        assert!(team_db_path(Path::new("/data"), "").is_err());
    }
}
