/// Run-scoped scratch directory for build results
use crate::config::types::{LifecycleError, Result};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use uuid::Uuid;

const RESULT_LINK: &str = "result";

/// A uniquely named directory that is removed when dropped.
///
/// Removal failure is logged and never escalates.
#[derive(Debug)]
pub struct Workspace {
    run_id: String,
    run_dir: PathBuf,
}

impl Workspace {
    /// Create a new workspace under `base_dir`
    pub fn new(base_dir: &Path) -> Result<Self> {
        let run_id = format!("genctl-{}", Uuid::new_v4());
        let run_dir = base_dir.join(&run_id);

        fs::create_dir_all(&run_dir).map_err(|e| {
            if e.kind() == io::ErrorKind::PermissionDenied {
                LifecycleError::PermissionDenied(format!("creating {}", run_dir.display()))
            } else {
                LifecycleError::ResourceCreationFailed(format!(
                    "workspace directory {}: {}",
                    run_dir.display(),
                    e
                ))
            }
        })?;
        log::debug!("Created workspace {}", run_dir.display());

        Ok(Self { run_id, run_dir })
    }

    /// Create a workspace in the system temporary directory
    pub fn in_temp_dir() -> Result<Self> {
        Self::new(&std::env::temp_dir())
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    pub fn run_dir(&self) -> &Path {
        &self.run_dir
    }

    /// Where the builder should place its result symlink
    pub fn result_link(&self) -> PathBuf {
        self.run_dir.join(RESULT_LINK)
    }

    /// Remove the workspace (idempotent)
    pub fn cleanup(&self) {
        match fs::remove_dir_all(&self.run_dir) {
            Ok(()) => log::debug!("Removed workspace {}", self.run_dir.display()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => log::warn!(
                "Failed to remove workspace {}: {}",
                self.run_dir.display(),
                e
            ),
        }
    }
}

impl Drop for Workspace {
    fn drop(&mut self) {
        self.cleanup();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::os::unix::fs::symlink;

    #[test]
    fn test_workspace_removed_on_drop() {
        let base = tempfile::tempdir().unwrap();
        let workspace = Workspace::new(base.path()).unwrap();
        let run_dir = workspace.run_dir().to_path_buf();
        assert!(run_dir.is_dir());
        assert!(workspace.run_id().starts_with("genctl-"));

        symlink("/nonexistent/store/path", workspace.result_link()).unwrap();
        drop(workspace);
        assert!(!run_dir.exists());
    }

    #[test]
    fn test_cleanup_is_idempotent() {
        let base = tempfile::tempdir().unwrap();
        let workspace = Workspace::new(base.path()).unwrap();
        workspace.cleanup();
        workspace.cleanup();
        assert!(!workspace.run_dir().exists());
    }

    #[test]
    fn test_distinct_run_dirs() {
        let base = tempfile::tempdir().unwrap();
        let a = Workspace::new(base.path()).unwrap();
        let b = Workspace::new(base.path()).unwrap();
        assert_ne!(a.run_dir(), b.run_dir());
    }
}
