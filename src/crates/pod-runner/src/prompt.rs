//! System prompt transport
//!
//! The agent's system prompt travels to the child through a tempfile with
//! owner-only permissions; the child is told to append it via
//! `--append-system-prompt`. The file and its parent directory are removed
//! only after the child has exited, so the handle must be held across the
//! whole child lifetime.

use pod_core::error::Result;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// An on-disk system prompt scoped to one child process
#[derive(Debug)]
pub struct PromptFile {
    dir: TempDir,
    path: PathBuf,
}

impl PromptFile {
    /// Write the prompt into a fresh owner-only tempdir
    pub fn create(system_prompt: &str) -> Result<Self> {
        let dir = tempfile::Builder::new().prefix("pod-agent-").tempdir()?;
        let path = dir.path().join("system-prompt.md");
        std::fs::write(&path, system_prompt)?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(dir.path(), std::fs::Permissions::from_mode(0o700))?;
            std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o600))?;
        }

        Ok(Self { dir, path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Remove the file and its directory; also happens on drop
    pub fn cleanup(self) {
        let path = self.dir.path().to_path_buf();
        if let Err(e) = self.dir.close() {
            tracing::debug!(path = %path.display(), error = %e, "Prompt tempdir cleanup failed");
        }
    }
}
