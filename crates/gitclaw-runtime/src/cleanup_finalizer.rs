//! Removes the acknowledgement reaction once a run is over.

use gitclaw_github::{GithubApiClient, RepoRef};
use serde::Serialize;

use crate::feedback_signal::{FeedbackHandoff, FeedbackHandoffStore};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "detail", rename_all = "snake_case")]
pub enum CleanupOutcome {
    Removed,
    NothingToRemove,
    Failed(String),
}

/// Where the finalizer gets its handoff from.
#[derive(Debug, Clone)]
pub enum HandoffSource {
    /// Recorded by this process.
    InProcess(Option<FeedbackHandoff>),
    /// Written by an earlier `signal` step.
    Store(FeedbackHandoffStore),
}

impl HandoffSource {
    fn take(self) -> Result<Option<FeedbackHandoff>, String> {
        match self {
            Self::InProcess(handoff) => Ok(handoff),
            Self::Store(store) => store.take().map_err(|error| format!("{error:#}")),
        }
    }
}

/// Never fails: every problem is logged and reported in the outcome.
pub async fn finalize(client: &GithubApiClient, source: HandoffSource) -> CleanupOutcome {
    let handoff = match source.take() {
        Ok(Some(handoff)) => handoff,
        Ok(None) => {
            tracing::info!("no feedback handoff recorded; nothing to clean up");
            return CleanupOutcome::NothingToRemove;
        }
        Err(error) => {
            tracing::warn!(error = %error, "failed to read feedback handoff");
            return CleanupOutcome::Failed(error);
        }
    };
    remove_acknowledgement(client, &handoff).await
}

pub async fn remove_acknowledgement(
    client: &GithubApiClient,
    handoff: &FeedbackHandoff,
) -> CleanupOutcome {
    let Some(reaction_id) = handoff.reaction_id.as_deref() else {
        tracing::info!(
            issue_number = handoff.issue_number,
            "no acknowledgement reaction to remove"
        );
        return CleanupOutcome::NothingToRemove;
    };
    let repo_client = match RepoRef::parse(&handoff.repo) {
        Ok(repo) => client.for_repo(repo),
        Err(error) => {
            let detail = format!("{error:#}");
            tracing::warn!(error = %detail, "feedback handoff names an invalid repository");
            return CleanupOutcome::Failed(detail);
        }
    };
    match repo_client
        .delete_reaction(handoff.reaction_target(), reaction_id)
        .await
    {
        Ok(()) => {
            tracing::info!(
                issue_number = handoff.issue_number,
                reaction_id,
                "removed acknowledgement reaction"
            );
            CleanupOutcome::Removed
        }
        Err(error) => {
            let detail = format!("{error:#}");
            tracing::warn!(
                issue_number = handoff.issue_number,
                reaction_id,
                error = %detail,
                "failed to remove acknowledgement reaction"
            );
            CleanupOutcome::Failed(detail)
        }
    }
}

#[cfg(test)]
mod tests {
    use httpmock::prelude::*;
    use tempfile::tempdir;

    use super::{finalize, CleanupOutcome, HandoffSource};
    use crate::feedback_signal::{FeedbackHandoff, FeedbackHandoffStore, ReactionTargetKind};
    use crate::test_support::test_github_client;

    fn handoff(reaction_id: Option<&str>, target: ReactionTargetKind) -> FeedbackHandoff {
        FeedbackHandoff {
            reaction_id: reaction_id.map(str::to_string),
            reaction_target: target,
            comment_id: Some(501),
            issue_number: 42,
            repo: "owner/other".to_string(),
        }
    }

    #[tokio::test]
    async fn functional_finalize_deletes_comment_reaction_in_handoff_repo() {
        let server = MockServer::start();
        let delete = server.mock(|when, then| {
            when.method(DELETE)
                .path("/repos/owner/other/issues/comments/501/reactions/9001");
            then.status(204);
        });
        let client = test_github_client(&server.base_url());
        let outcome = finalize(
            &client,
            HandoffSource::InProcess(Some(handoff(Some("9001"), ReactionTargetKind::Comment))),
        )
        .await;
        delete.assert_calls(1);
        assert_eq!(outcome, CleanupOutcome::Removed);
    }

    #[tokio::test]
    async fn functional_finalize_deletes_issue_reaction_from_store() {
        let server = MockServer::start();
        let delete = server.mock(|when, then| {
            when.method(DELETE)
                .path("/repos/owner/other/issues/42/reactions/12");
            then.status(204);
        });
        let temp = tempdir().expect("tempdir");
        let store = FeedbackHandoffStore::for_run(temp.path(), "run-1");
        store
            .write(&handoff(Some("12"), ReactionTargetKind::Issue))
            .expect("write");
        let client = test_github_client(&server.base_url());

        let outcome = finalize(&client, HandoffSource::Store(store.clone())).await;
        delete.assert_calls(1);
        assert_eq!(outcome, CleanupOutcome::Removed);
        assert!(!store.path().exists());
    }

    #[tokio::test]
    async fn unit_finalize_without_handoff_or_reaction_is_a_no_op() {
        let server = MockServer::start();
        let any_delete = server.mock(|when, then| {
            when.method(DELETE);
            then.status(204);
        });
        let client = test_github_client(&server.base_url());
        let temp = tempdir().expect("tempdir");

        let missing = finalize(
            &client,
            HandoffSource::Store(FeedbackHandoffStore::for_run(temp.path(), "none")),
        )
        .await;
        assert_eq!(missing, CleanupOutcome::NothingToRemove);
        let null_reaction = finalize(
            &client,
            HandoffSource::InProcess(Some(handoff(None, ReactionTargetKind::Issue))),
        )
        .await;
        assert_eq!(null_reaction, CleanupOutcome::NothingToRemove);
        any_delete.assert_calls(0);
    }

    #[tokio::test]
    async fn regression_finalize_swallows_delete_and_parse_failures() {
        let server = MockServer::start();
        let delete = server.mock(|when, then| {
            when.method(DELETE)
                .path("/repos/owner/other/issues/42/reactions/12");
            then.status(404).body("not found");
        });
        let client = test_github_client(&server.base_url());
        let failed = finalize(
            &client,
            HandoffSource::InProcess(Some(handoff(Some("12"), ReactionTargetKind::Issue))),
        )
        .await;
        delete.assert_calls(1);
        assert!(matches!(failed, CleanupOutcome::Failed(_)));

        let temp = tempdir().expect("tempdir");
        let store = FeedbackHandoffStore::for_run(temp.path(), "corrupt");
        std::fs::write(store.path(), "{not json").expect("write corrupt");
        let corrupt = finalize(&client, HandoffSource::Store(store)).await;
        assert!(matches!(corrupt, CleanupOutcome::Failed(_)));
    }
}
