use std::path::{Path, PathBuf};

pub const DEFAULT_GITCLAW_DIR_NAME: &str = ".GITCLAW";

#[derive(Debug, Clone, PartialEq, Eq)]
/// Resolves every on-disk location the lifecycle reads or writes.
pub struct GitclawLayout {
    repo_root: PathBuf,
    gitclaw_dir_name: String,
}

impl GitclawLayout {
    pub fn new(repo_root: impl Into<PathBuf>, gitclaw_dir_name: impl Into<String>) -> Self {
        Self {
            repo_root: repo_root.into(),
            gitclaw_dir_name: gitclaw_dir_name.into(),
        }
    }

    pub fn repo_root(&self) -> &Path {
        &self.repo_root
    }

    pub fn gitclaw_dir(&self) -> PathBuf {
        self.repo_root.join(&self.gitclaw_dir_name)
    }

    pub fn state_dir(&self) -> PathBuf {
        self.gitclaw_dir().join("state")
    }

    /// Directory holding one session record per issue.
    pub fn issues_dir(&self) -> PathBuf {
        self.state_dir().join("issues")
    }

    pub fn sessions_dir(&self) -> PathBuf {
        self.state_dir().join("sessions")
    }

    /// Session directory relative to the repo root, as handed to the agent.
    pub fn sessions_dir_relative(&self) -> PathBuf {
        PathBuf::from(&self.gitclaw_dir_name)
            .join("state")
            .join("sessions")
    }

    /// Resolves a repo-relative path; absolute paths pass through unchanged.
    pub fn resolve_repo_path(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.repo_root.join(path)
        }
    }

    /// Renders `path` relative to the repo root with `/` separators when possible.
    pub fn relative_to_repo(&self, path: &Path) -> String {
        path.strip_prefix(&self.repo_root)
            .unwrap_or(path)
            .to_string_lossy()
            .replace('\\', "/")
    }
}
