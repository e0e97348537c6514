//! Per-issue session records mapping an issue to its resumable agent session.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use anyhow::{Context, Result};
use gitclaw_core::{current_rfc3339_timestamp, write_text_atomic};
use serde::{Deserialize, Serialize};

use crate::runtime_layout::GitclawLayout;

const SESSION_ARTIFACT_EXTENSION: &str = "jsonl";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IssueSessionRecord {
    pub issue_number: u64,
    pub session_path: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionMode {
    New,
    Resume { session_path: String },
}

impl SessionMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::New => "new",
            Self::Resume { .. } => "resume",
        }
    }

    pub fn session_path(&self) -> Option<&str> {
        match self {
            Self::New => None,
            Self::Resume { session_path } => Some(session_path.as_str()),
        }
    }
}

#[derive(Debug, Clone)]
pub struct IssueSessionStore {
    layout: GitclawLayout,
}

impl IssueSessionStore {
    pub fn new(layout: GitclawLayout) -> Self {
        Self { layout }
    }

    /// Creates the issues and sessions directories.
    pub fn ensure_dirs(&self) -> Result<()> {
        for dir in [self.layout.issues_dir(), self.layout.sessions_dir()] {
            std::fs::create_dir_all(&dir)
                .with_context(|| format!("failed to create {}", dir.display()))?;
        }
        Ok(())
    }

    pub fn record_path(&self, issue_number: u64) -> PathBuf {
        self.layout.issues_dir().join(format!("{issue_number}.json"))
    }

    pub fn load_record(&self, issue_number: u64) -> Result<Option<IssueSessionRecord>> {
        let path = self.record_path(issue_number);
        if !path.exists() {
            return Ok(None);
        }
        let raw = std::fs::read_to_string(&path)
            .with_context(|| format!("failed to read session record {}", path.display()))?;
        let record = serde_json::from_str::<IssueSessionRecord>(&raw)
            .with_context(|| format!("failed to parse session record {}", path.display()))?;
        Ok(Some(record))
    }

    /// Resume when the record points at an artifact that still exists; otherwise start fresh.
    pub fn resolve(&self, issue_number: u64) -> SessionMode {
        let record = match self.load_record(issue_number) {
            Ok(Some(record)) => record,
            Ok(None) => {
                tracing::info!(issue_number, "no session mapping found, starting fresh");
                return SessionMode::New;
            }
            Err(error) => {
                tracing::warn!(
                    issue_number,
                    error = %format!("{error:#}"),
                    "unreadable session mapping, starting fresh"
                );
                return SessionMode::New;
            }
        };

        let session_path = record.session_path.trim();
        if session_path.is_empty()
            || !self
                .layout
                .resolve_repo_path(Path::new(session_path))
                .is_file()
        {
            tracing::info!(
                issue_number,
                session_path,
                "mapped session file missing, starting fresh"
            );
            return SessionMode::New;
        }
        tracing::info!(issue_number, session_path, "found existing session");
        SessionMode::Resume {
            session_path: session_path.to_string(),
        }
    }

    /// Overwrites (or creates) the record for `issue_number`.
    pub fn persist(&self, issue_number: u64, session_path: &str) -> Result<IssueSessionRecord> {
        let record = IssueSessionRecord {
            issue_number,
            session_path: session_path.to_string(),
            updated_at: current_rfc3339_timestamp(),
        };
        let mut payload =
            serde_json::to_string_pretty(&record).context("failed to serialize session record")?;
        payload.push('\n');
        write_text_atomic(&self.record_path(issue_number), &payload)?;
        tracing::info!(issue_number, session_path, "saved session mapping");
        Ok(record)
    }

    /// Records the session artifacts present before an agent invocation.
    pub fn snapshot_session_artifacts(&self) -> Result<SessionArtifactSnapshot> {
        Ok(SessionArtifactSnapshot {
            modified: self.scan_session_artifacts()?.into_iter().collect(),
        })
    }

    /// Most recently modified artifact that is new or changed since `before`,
    /// as a repo-relative path. Artifacts other sessions left untouched are ignored.
    pub fn latest_session_artifact_since(
        &self,
        before: &SessionArtifactSnapshot,
    ) -> Result<Option<String>> {
        let mut latest: Option<(SystemTime, PathBuf)> = None;
        for (path, modified) in self.scan_session_artifacts()? {
            if !before.is_changed(&path, modified) {
                continue;
            }
            let newer = match &latest {
                Some((best_modified, best_path)) => {
                    modified > *best_modified || (modified == *best_modified && path > *best_path)
                }
                None => true,
            };
            if newer {
                latest = Some((modified, path));
            }
        }
        Ok(latest.map(|(_, path)| self.layout.relative_to_repo(&path)))
    }

    fn scan_session_artifacts(&self) -> Result<Vec<(PathBuf, SystemTime)>> {
        let sessions_dir = self.layout.sessions_dir();
        if !sessions_dir.is_dir() {
            return Ok(Vec::new());
        }
        let entries = std::fs::read_dir(&sessions_dir)
            .with_context(|| format!("failed to read {}", sessions_dir.display()))?;

        let mut artifacts = Vec::new();
        for entry in entries {
            let entry = entry
                .with_context(|| format!("failed to read entry in {}", sessions_dir.display()))?;
            let path = entry.path();
            let is_artifact = path
                .extension()
                .is_some_and(|extension| extension == SESSION_ARTIFACT_EXTENSION);
            if !is_artifact || !path.is_file() {
                continue;
            }
            let modified = entry
                .metadata()
                .and_then(|metadata| metadata.modified())
                .with_context(|| format!("failed to stat {}", path.display()))?;
            artifacts.push((path, modified));
        }
        Ok(artifacts)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
/// Artifact modification times captured before one agent invocation.
pub struct SessionArtifactSnapshot {
    modified: BTreeMap<PathBuf, SystemTime>,
}

impl SessionArtifactSnapshot {
    pub fn len(&self) -> usize {
        self.modified.len()
    }

    pub fn is_empty(&self) -> bool {
        self.modified.is_empty()
    }

    fn is_changed(&self, path: &Path, modified: SystemTime) -> bool {
        self.modified.get(path) != Some(&modified)
    }
}
