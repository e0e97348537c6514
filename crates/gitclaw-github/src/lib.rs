//! GitHub-facing building blocks for the GitClaw issue lifecycle.
//! This crate provides trigger-event parsing, the REST client used for
//! reactions and comments with its retry policy, and comment-size limits.

pub mod github_api_client;
pub mod issue_comment;
pub mod issue_event;

pub use github_api_client::{
    GithubApiClient, GithubCommentCreateResponse, GithubIssue, GithubReaction, ReactionTarget,
    RepoRef,
};
pub use issue_comment::{truncate_comment_body, COMMENT_BODY_MAX_CHARS};
pub use issue_event::{
    issue_body_from_payload, IssueTriggerEvent, TriggerComment, TriggerEventError,
    TriggerEventKind,
};
