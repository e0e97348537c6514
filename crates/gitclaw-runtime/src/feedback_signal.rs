//! Acknowledgement reaction and the handoff record that lets cleanup remove it.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use gitclaw_core::write_text_atomic;
use gitclaw_github::{GithubApiClient, IssueTriggerEvent, ReactionTarget, TriggerEventKind};
use serde::{Deserialize, Serialize};

pub const ACKNOWLEDGEMENT_REACTION: &str = "eyes";
const HANDOFF_FILE_PREFIX: &str = "gitclaw-feedback";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReactionTargetKind {
    Comment,
    Issue,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
/// Single-writer/single-reader record of the acknowledgement placed for one run.
pub struct FeedbackHandoff {
    pub reaction_id: Option<String>,
    pub reaction_target: ReactionTargetKind,
    pub comment_id: Option<u64>,
    pub issue_number: u64,
    pub repo: String,
}

impl FeedbackHandoff {
    /// Target the reaction lives on; comment targets without an id fall back to the issue.
    pub fn reaction_target(&self) -> ReactionTarget {
        match (self.reaction_target, self.comment_id) {
            (ReactionTargetKind::Comment, Some(comment_id)) => {
                ReactionTarget::Comment { comment_id }
            }
            _ => ReactionTarget::Issue {
                issue_number: self.issue_number,
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
/// Run-scoped file used when signal and cleanup execute in separate processes.
pub struct FeedbackHandoffStore {
    path: PathBuf,
}

impl FeedbackHandoffStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// `<dir>/gitclaw-feedback-<run_key>.json`; the key keeps overlapping runs apart.
    pub fn for_run(dir: &Path, run_key: &str) -> Self {
        let sanitized = run_key
            .chars()
            .map(|ch| {
                if ch.is_ascii_alphanumeric() || ch == '-' || ch == '_' {
                    ch
                } else {
                    '_'
                }
            })
            .collect::<String>();
        let run_key = if sanitized.is_empty() {
            "local".to_string()
        } else {
            sanitized
        };
        Self::new(dir.join(format!("{HANDOFF_FILE_PREFIX}-{run_key}.json")))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn write(&self, handoff: &FeedbackHandoff) -> Result<()> {
        let payload =
            serde_json::to_string(handoff).context("failed to serialize feedback handoff")?;
        write_text_atomic(&self.path, &payload)
    }

    /// Reads and removes the handoff. Returns `None` when nothing was written.
    pub fn take(&self) -> Result<Option<FeedbackHandoff>> {
        if !self.path.exists() {
            return Ok(None);
        }
        let raw = std::fs::read_to_string(&self.path)
            .with_context(|| format!("failed to read feedback handoff {}", self.path.display()))?;
        if let Err(error) = std::fs::remove_file(&self.path) {
            tracing::warn!(
                path = %self.path.display(),
                error = %error,
                "failed to remove consumed feedback handoff"
            );
        }
        let handoff = serde_json::from_str::<FeedbackHandoff>(&raw).with_context(|| {
            format!("failed to parse feedback handoff {}", self.path.display())
        })?;
        Ok(Some(handoff))
    }
}

/// Adds the acknowledgement reaction for `event`. Reaction failures are logged
/// and produce a handoff with no reaction id.
pub async fn signal_acknowledgement(
    client: &GithubApiClient,
    event: &IssueTriggerEvent,
) -> FeedbackHandoff {
    let (reaction_target, comment_id, target) = match (event.kind, event.comment_id()) {
        (TriggerEventKind::CommentAdded, Some(comment_id)) => (
            ReactionTargetKind::Comment,
            Some(comment_id),
            ReactionTarget::Comment { comment_id },
        ),
        _ => (
            ReactionTargetKind::Issue,
            None,
            ReactionTarget::Issue {
                issue_number: event.issue_number,
            },
        ),
    };

    let reaction_id = match client
        .create_reaction(target, ACKNOWLEDGEMENT_REACTION)
        .await
    {
        Ok(reaction) => {
            tracing::info!(
                issue_number = event.issue_number,
                reaction_id = reaction.id,
                target = ?reaction_target,
                "acknowledgement reaction added"
            );
            Some(reaction.id.to_string())
        }
        Err(error) => {
            tracing::warn!(
                issue_number = event.issue_number,
                error = %format!("{error:#}"),
                "failed to add acknowledgement reaction"
            );
            None
        }
    };

    FeedbackHandoff {
        reaction_id,
        reaction_target,
        comment_id,
        issue_number: event.issue_number,
        repo: event.repo.clone(),
    }
}

/// Signals and records the handoff for a later, separate cleanup step.
/// A failed handoff write is logged; the reaction then stays until removed by hand.
pub async fn signal_and_record(
    client: &GithubApiClient,
    event: &IssueTriggerEvent,
    store: &FeedbackHandoffStore,
) -> FeedbackHandoff {
    let handoff = signal_acknowledgement(client, event).await;
    if let Err(error) = store.write(&handoff) {
        tracing::error!(
            path = %store.path().display(),
            error = %format!("{error:#}"),
            "failed to persist feedback handoff"
        );
    }
    handoff
}
