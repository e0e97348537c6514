//! Posts the extracted reply as a single issue comment.

use std::str::FromStr;

use anyhow::{bail, Context, Result};
use gitclaw_github::{truncate_comment_body, GithubApiClient, COMMENT_BODY_MAX_CHARS};

pub const EMPTY_REPLY_PLACEHOLDER: &str =
    "GitClaw finished this run without producing a reply. See the workflow logs for details.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
/// What to do when the agent produced no reply text.
pub enum EmptyReplyPolicy {
    /// Post the empty body anyway and let the platform decide.
    #[default]
    Post,
    Skip,
    Placeholder,
}

impl EmptyReplyPolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Post => "post",
            Self::Skip => "skip",
            Self::Placeholder => "placeholder",
        }
    }
}

impl FromStr for EmptyReplyPolicy {
    type Err = anyhow::Error;

    fn from_str(raw: &str) -> Result<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "post" => Ok(Self::Post),
            "skip" => Ok(Self::Skip),
            "placeholder" => Ok(Self::Placeholder),
            other => bail!("unsupported empty reply policy '{other}' (expected post, skip, or placeholder)"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplyPublication {
    pub comment_id: Option<u64>,
    pub posted_chars: usize,
    pub truncated: bool,
}

#[derive(Clone)]
pub struct ReplyPublisher {
    client: GithubApiClient,
    empty_reply: EmptyReplyPolicy,
}

impl ReplyPublisher {
    pub fn new(client: GithubApiClient, empty_reply: EmptyReplyPolicy) -> Self {
        Self {
            client,
            empty_reply,
        }
    }

    pub async fn publish(&self, issue_number: u64, reply: &str) -> Result<ReplyPublication> {
        let body = if reply.is_empty() {
            match self.empty_reply {
                EmptyReplyPolicy::Post => reply,
                EmptyReplyPolicy::Skip => {
                    tracing::warn!(issue_number, "empty reply; skipping comment");
                    return Ok(ReplyPublication {
                        comment_id: None,
                        posted_chars: 0,
                        truncated: false,
                    });
                }
                EmptyReplyPolicy::Placeholder => EMPTY_REPLY_PLACEHOLDER,
            }
        } else {
            reply
        };

        let truncated_body = truncate_comment_body(body);
        let truncated = truncated_body.len() < body.len();
        if truncated {
            tracing::warn!(
                issue_number,
                max_chars = COMMENT_BODY_MAX_CHARS,
                "reply exceeds comment limit; truncating"
            );
        }
        let posted = self
            .client
            .create_issue_comment(issue_number, truncated_body)
            .await
            .with_context(|| format!("failed to post reply on issue #{issue_number}"))?;
        tracing::info!(
            issue_number,
            comment_id = posted.id,
            url = posted.html_url.as_deref().unwrap_or_default(),
            "posted reply"
        );
        Ok(ReplyPublication {
            comment_id: Some(posted.id),
            posted_chars: truncated_body.chars().count(),
            truncated,
        })
    }
}

#[cfg(test)]
mod tests {
    use httpmock::prelude::*;
    use serde_json::json;

    use super::{EmptyReplyPolicy, ReplyPublisher, EMPTY_REPLY_PLACEHOLDER};
    use crate::test_support::test_github_client;

    #[test]
    fn unit_empty_reply_policy_parses_cli_values() {
        assert_eq!("post".parse::<EmptyReplyPolicy>().ok(), Some(EmptyReplyPolicy::Post));
        assert_eq!(" Skip ".parse::<EmptyReplyPolicy>().ok(), Some(EmptyReplyPolicy::Skip));
        assert_eq!(
            "placeholder".parse::<EmptyReplyPolicy>().ok(),
            Some(EmptyReplyPolicy::Placeholder)
        );
        assert!("drop".parse::<EmptyReplyPolicy>().is_err());
        assert_eq!(EmptyReplyPolicy::default(), EmptyReplyPolicy::Post);
    }

    #[tokio::test]
    async fn functional_publish_truncates_long_reply_to_sixty_thousand_chars() {
        let server = MockServer::start();
        let expected = "x".repeat(60_000);
        let post = server.mock(|when, then| {
            when.method(POST)
                .path("/repos/owner/repo/issues/42/comments")
                .json_body(json!({ "body": expected }));
            then.status(201).json_body(json!({ "id": 77, "html_url": "https://example.test/c/77" }));
        });
        let publisher = ReplyPublisher::new(
            test_github_client(&server.base_url()),
            EmptyReplyPolicy::Post,
        );
        let publication = publisher
            .publish(42, &"x".repeat(70_000))
            .await
            .expect("publish");
        post.assert_calls(1);
        assert_eq!(publication.comment_id, Some(77));
        assert_eq!(publication.posted_chars, 60_000);
        assert!(publication.truncated);
    }

    #[tokio::test]
    async fn regression_publish_failure_is_not_retried() {
        let server = MockServer::start();
        let post = server.mock(|when, then| {
            when.method(POST).path("/repos/owner/repo/issues/42/comments");
            then.status(502).body("bad gateway");
        });
        let publisher = ReplyPublisher::new(
            test_github_client(&server.base_url()),
            EmptyReplyPolicy::Post,
        );
        let error = publisher.publish(42, "hello").await.expect_err("post fails");
        post.assert_calls(1);
        assert!(format!("{error:#}").contains("failed to post reply on issue #42"));
    }

    #[tokio::test]
    async fn functional_empty_reply_policies() {
        let server = MockServer::start();
        let placeholder = server.mock(|when, then| {
            when.method(POST)
                .path("/repos/owner/repo/issues/5/comments")
                .json_body(json!({ "body": EMPTY_REPLY_PLACEHOLDER }));
            then.status(201).json_body(json!({ "id": 1, "html_url": null }));
        });
        let any_post = server.mock(|when, then| {
            when.method(POST).path("/repos/owner/repo/issues/6/comments");
            then.status(201).json_body(json!({ "id": 2, "html_url": null }));
        });
        let client = test_github_client(&server.base_url());

        let skipped = ReplyPublisher::new(client.clone(), EmptyReplyPolicy::Skip)
            .publish(6, "")
            .await
            .expect("skip");
        assert_eq!(skipped.comment_id, None);
        any_post.assert_calls(0);

        let replaced = ReplyPublisher::new(client, EmptyReplyPolicy::Placeholder)
            .publish(5, "")
            .await
            .expect("placeholder");
        placeholder.assert_calls(1);
        assert_eq!(replaced.comment_id, Some(1));
    }
}
