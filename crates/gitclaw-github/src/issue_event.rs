//! Trigger-event parsing for `issues` and `issue_comment` workflow events.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

const DEFAULT_BRANCH_FALLBACK: &str = "main";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
/// Enumerates the workflow event subtypes the lifecycle reacts to.
pub enum TriggerEventKind {
    /// A new issue was opened (`issues`).
    IssueOpened,
    /// A comment was added to an existing issue (`issue_comment`).
    CommentAdded,
}

impl TriggerEventKind {
    /// Maps a `GITHUB_EVENT_NAME` value onto a supported kind.
    pub fn from_event_name(raw: &str) -> Option<Self> {
        match raw.trim() {
            "issues" => Some(Self::IssueOpened),
            "issue_comment" => Some(Self::CommentAdded),
            _ => None,
        }
    }
}

#[derive(Debug, Error)]
pub enum TriggerEventError {
    #[error("unsupported event '{0}', expected 'issues' or 'issue_comment'")]
    UnsupportedEvent(String),
    #[error("event payload is not valid json: {0}")]
    InvalidPayload(#[from] serde_json::Error),
    #[error("event payload has no issue object")]
    MissingIssue,
    #[error("issue_comment event payload has no comment object")]
    MissingComment,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TriggerComment {
    pub id: u64,
    pub body: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
/// Normalized view of one triggering workflow event.
pub struct IssueTriggerEvent {
    pub kind: TriggerEventKind,
    pub repo: String,
    pub issue_number: u64,
    pub issue_title: String,
    pub issue_body: String,
    pub comment: Option<TriggerComment>,
    pub default_branch: String,
}

#[derive(Debug, Deserialize)]
struct RawEventPayload {
    #[serde(default)]
    issue: Option<RawIssue>,
    #[serde(default)]
    comment: Option<RawComment>,
    #[serde(default)]
    repository: Option<RawRepository>,
}

#[derive(Debug, Deserialize)]
struct RawIssue {
    number: u64,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    body: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawComment {
    id: u64,
    #[serde(default)]
    body: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawRepository {
    #[serde(default)]
    default_branch: Option<String>,
}

impl IssueTriggerEvent {
    /// Builds an event from the workflow event name, repository slug, and raw payload json.
    pub fn from_payload(
        event_name: &str,
        repo: &str,
        payload: &str,
    ) -> Result<Self, TriggerEventError> {
        let kind = TriggerEventKind::from_event_name(event_name)
            .ok_or_else(|| TriggerEventError::UnsupportedEvent(event_name.trim().to_string()))?;
        let raw: RawEventPayload = serde_json::from_str(payload)?;
        let issue = raw.issue.ok_or(TriggerEventError::MissingIssue)?;
        let comment = match kind {
            TriggerEventKind::CommentAdded => {
                let comment = raw.comment.ok_or(TriggerEventError::MissingComment)?;
                Some(TriggerComment {
                    id: comment.id,
                    body: comment.body.unwrap_or_default(),
                })
            }
            TriggerEventKind::IssueOpened => None,
        };
        let default_branch = raw
            .repository
            .and_then(|repository| repository.default_branch)
            .map(|branch| branch.trim().to_string())
            .filter(|branch| !branch.is_empty())
            .unwrap_or_else(|| DEFAULT_BRANCH_FALLBACK.to_string());

        Ok(Self {
            kind,
            repo: repo.trim().to_string(),
            issue_number: issue.number,
            issue_title: issue.title.unwrap_or_default(),
            issue_body: issue.body.unwrap_or_default(),
            comment,
            default_branch,
        })
    }

    pub fn comment_id(&self) -> Option<u64> {
        self.comment.as_ref().map(|comment| comment.id)
    }
}

/// Extracts `issue.body` from a raw payload, yielding an empty string for any
/// missing, null, non-string, or unparsable value.
pub fn issue_body_from_payload(payload: &str) -> String {
    serde_json::from_str::<Value>(payload)
        .ok()
        .and_then(|value| {
            value
                .get("issue")
                .and_then(|issue| issue.get("body"))
                .and_then(Value::as_str)
                .map(str::to_string)
        })
        .unwrap_or_default()
}
