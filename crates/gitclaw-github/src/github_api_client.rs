//! REST client for the issue, reaction, and comment endpoints the lifecycle touches.

use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::json;

const RETRY_DELAY_CAP_MS: u64 = 30_000;
const ERROR_BODY_MAX_CHARS: usize = 800;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepoRef {
    pub owner: String,
    pub name: String,
}

impl RepoRef {
    pub fn parse(raw: &str) -> Result<Self> {
        let trimmed = raw.trim();
        let (owner, name) = trimmed
            .split_once('/')
            .ok_or_else(|| anyhow!("invalid repository '{raw}', expected owner/repo"))?;
        let owner = owner.trim();
        let name = name.trim();
        if owner.is_empty() || name.is_empty() || name.contains('/') {
            bail!("invalid repository '{raw}', expected owner/repo");
        }
        Ok(Self {
            owner: owner.to_string(),
            name: name.to_string(),
        })
    }

    pub fn as_slug(&self) -> String {
        format!("{}/{}", self.owner, self.name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
/// Item a reaction is attached to.
pub enum ReactionTarget {
    Issue { issue_number: u64 },
    Comment { comment_id: u64 },
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct GithubReaction {
    pub id: u64,
    #[serde(default)]
    pub content: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GithubCommentCreateResponse {
    pub id: u64,
    pub html_url: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GithubIssue {
    pub number: u64,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub body: Option<String>,
}

/// Requests the lifecycle sends. Only the reply comment is exempt from retries,
/// since a retried POST can duplicate the comment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum GithubOperation {
    GetIssue,
    CreateReaction,
    DeleteReaction,
    CreateIssueComment,
}

impl GithubOperation {
    fn label(self) -> &'static str {
        match self {
            Self::GetIssue => "get issue",
            Self::CreateReaction => "create reaction",
            Self::DeleteReaction => "delete reaction",
            Self::CreateIssueComment => "create issue comment",
        }
    }

    fn is_retried(self) -> bool {
        !matches!(self, Self::CreateIssueComment)
    }
}

#[derive(Debug, Clone, Copy)]
struct RetryPolicy {
    max_attempts: usize,
    base_delay_ms: u64,
}

impl RetryPolicy {
    fn attempts_for(self, operation: GithubOperation) -> usize {
        if operation.is_retried() {
            self.max_attempts.max(1)
        } else {
            1
        }
    }

    /// Exponential backoff capped at 30s; an explicit `retry-after` wins when present.
    fn delay(self, attempt: usize, retry_after: Option<Duration>) -> Duration {
        if let Some(delay) = retry_after {
            return delay.max(Duration::from_millis(self.base_delay_ms));
        }
        let exponent = attempt.saturating_sub(1).min(10) as u32;
        let scaled = self
            .base_delay_ms
            .saturating_mul(2_u64.saturating_pow(exponent));
        Duration::from_millis(scaled.min(RETRY_DELAY_CAP_MS))
    }
}

/// Rate limiting and server-side failures are transient; other statuses are final.
fn is_transient_status(status: reqwest::StatusCode) -> bool {
    status == reqwest::StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
}

fn is_transient_transport_error(error: &reqwest::Error) -> bool {
    error.is_timeout() || error.is_connect() || error.is_request()
}

/// Reads a `retry-after` header expressed in whole seconds.
fn retry_after(headers: &reqwest::header::HeaderMap) -> Option<Duration> {
    let raw = headers.get(reqwest::header::RETRY_AFTER)?.to_str().ok()?;
    let seconds = raw.trim().parse::<u64>().ok()?;
    Some(Duration::from_secs(seconds))
}

fn error_excerpt(body: &str) -> String {
    if body.chars().count() <= ERROR_BODY_MAX_CHARS {
        return body.to_string();
    }
    let mut excerpt = body.chars().take(ERROR_BODY_MAX_CHARS).collect::<String>();
    excerpt.push_str("...");
    excerpt
}

#[derive(Clone)]
pub struct GithubApiClient {
    http: reqwest::Client,
    api_base: String,
    repo: RepoRef,
    retry: RetryPolicy,
}

impl GithubApiClient {
    pub fn new(
        api_base: String,
        token: String,
        repo: RepoRef,
        request_timeout_ms: u64,
        retry_max_attempts: usize,
        retry_base_delay_ms: u64,
    ) -> Result<Self> {
        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert(
            reqwest::header::USER_AGENT,
            reqwest::header::HeaderValue::from_static("gitclaw-issue-lifecycle"),
        );
        headers.insert(
            reqwest::header::ACCEPT,
            reqwest::header::HeaderValue::from_static("application/vnd.github+json"),
        );
        headers.insert(
            "x-github-api-version",
            reqwest::header::HeaderValue::from_static("2022-11-28"),
        );
        let auth_header = format!("Bearer {}", token.trim());
        headers.insert(
            reqwest::header::AUTHORIZATION,
            reqwest::header::HeaderValue::from_str(&auth_header)
                .context("invalid github authorization header")?,
        );

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_millis(request_timeout_ms.max(1)))
            .build()
            .context("failed to create github api client")?;
        Ok(Self {
            http: client,
            api_base: api_base.trim_end_matches('/').to_string(),
            repo,
            retry: RetryPolicy {
                max_attempts: retry_max_attempts.max(1),
                base_delay_ms: retry_base_delay_ms.max(1),
            },
        })
    }

    pub fn repo(&self) -> &RepoRef {
        &self.repo
    }

    /// Same transport and credentials, addressed at another repository.
    pub fn for_repo(&self, repo: RepoRef) -> Self {
        Self {
            repo,
            ..self.clone()
        }
    }

    fn repo_url(&self, suffix: &str) -> String {
        format!(
            "{}/repos/{}/{}/{}",
            self.api_base, self.repo.owner, self.repo.name, suffix
        )
    }

    pub async fn get_issue(&self, issue_number: u64) -> Result<GithubIssue> {
        let url = self.repo_url(&format!("issues/{issue_number}"));
        self.request_json(GithubOperation::GetIssue, || self.http.get(&url))
            .await
    }

    pub async fn create_reaction(
        &self,
        target: ReactionTarget,
        content: &str,
    ) -> Result<GithubReaction> {
        let url = self.reaction_collection_url(target);
        let payload = json!({ "content": content });
        self.request_json(GithubOperation::CreateReaction, || {
            self.http.post(&url).json(&payload)
        })
        .await
    }

    pub async fn delete_reaction(&self, target: ReactionTarget, reaction_id: &str) -> Result<()> {
        let reaction_id = reaction_id.trim();
        if reaction_id.is_empty() {
            bail!("reaction id cannot be empty");
        }
        let url = format!("{}/{reaction_id}", self.reaction_collection_url(target));
        self.request_no_content(GithubOperation::DeleteReaction, || {
            self.http.delete(&url)
        })
        .await
    }

    /// Posts a new issue comment. Sent exactly once; failures are not retried.
    pub async fn create_issue_comment(
        &self,
        issue_number: u64,
        body: &str,
    ) -> Result<GithubCommentCreateResponse> {
        let url = self.repo_url(&format!("issues/{issue_number}/comments"));
        let payload = json!({ "body": body });
        self.request_json(GithubOperation::CreateIssueComment, || {
            self.http.post(&url).json(&payload)
        })
        .await
    }

    fn reaction_collection_url(&self, target: ReactionTarget) -> String {
        match target {
            ReactionTarget::Issue { issue_number } => {
                self.repo_url(&format!("issues/{issue_number}/reactions"))
            }
            ReactionTarget::Comment { comment_id } => {
                self.repo_url(&format!("issues/comments/{comment_id}/reactions"))
            }
        }
    }

    async fn request_json<T, F>(
        &self,
        operation: GithubOperation,
        request_builder: F,
    ) -> Result<T>
    where
        T: DeserializeOwned,
        F: FnMut() -> reqwest::RequestBuilder,
    {
        let response = self.send_with_retry(operation, request_builder).await?;
        response
            .json::<T>()
            .await
            .with_context(|| format!("failed to decode github {}", operation.label()))
    }

    async fn request_no_content<F>(&self, operation: GithubOperation, request_builder: F) -> Result<()>
    where
        F: FnMut() -> reqwest::RequestBuilder,
    {
        self.send_with_retry(operation, request_builder)
            .await
            .map(|_| ())
    }

    async fn send_with_retry<F>(
        &self,
        operation: GithubOperation,
        mut request_builder: F,
    ) -> Result<reqwest::Response>
    where
        F: FnMut() -> reqwest::RequestBuilder,
    {
        let label = operation.label();
        let max_attempts = self.retry.attempts_for(operation);
        let mut attempt = 0_usize;
        loop {
            attempt = attempt.saturating_add(1);
            let response = request_builder()
                .header("x-gitclaw-retry-attempt", attempt.saturating_sub(1).to_string())
                .send()
                .await;
            match response {
                Ok(response) => {
                    let status = response.status();
                    if status.is_success() {
                        return Ok(response);
                    }

                    let retry_after = retry_after(response.headers());
                    let body = response.text().await.unwrap_or_default();
                    if attempt < max_attempts && is_transient_status(status) {
                        tracing::debug!(
                            operation = label,
                            attempt,
                            status = status.as_u16(),
                            "retrying github request"
                        );
                        tokio::time::sleep(self.retry.delay(attempt, retry_after)).await;
                        continue;
                    }

                    bail!(
                        "github api {label} failed with status {}: {}",
                        status.as_u16(),
                        error_excerpt(&body)
                    );
                }
                Err(error) => {
                    if attempt < max_attempts && is_transient_transport_error(&error) {
                        tokio::time::sleep(self.retry.delay(attempt, None)).await;
                        continue;
                    }
                    return Err(error)
                        .with_context(|| format!("github api {label} request failed"));
                }
            }
        }
    }
}
