//! Issue lifecycle runtime: drives one triggered run from session lookup to the
//! posted reply, and always finishes by removing the acknowledgement.

use std::path::PathBuf;

use anyhow::{Context, Result};
use gitclaw_github::{GithubApiClient, IssueTriggerEvent, TriggerEventKind};
use serde::Serialize;

use crate::agent_invoker::{build_prompt, AgentInvoker, AgentInvokerConfig};
use crate::cleanup_finalizer::{finalize, CleanupOutcome, HandoffSource};
use crate::feedback_signal::{signal_acknowledgement, FeedbackHandoff};
use crate::issue_session_store::IssueSessionStore;
use crate::reply_extractor::extract_final_reply;
use crate::reply_publisher::{EmptyReplyPolicy, ReplyPublisher};
use crate::runtime_layout::GitclawLayout;
use crate::state_publisher::{
    GitCommandRunner, StatePublisher, StatePublisherConfig, DEFAULT_PUSH_MAX_ATTEMPTS,
};

#[derive(Debug, Clone)]
/// Settings for one lifecycle run.
pub struct IssueLifecycleConfig {
    pub layout: GitclawLayout,
    pub agent_bin: PathBuf,
    pub raw_log_path: PathBuf,
    pub relay_agent_output: bool,
    pub push_max_attempts: usize,
    pub push_retry_delay_ms: u64,
    pub empty_reply: EmptyReplyPolicy,
    /// Set the bot commit identity before the agent runs.
    pub configure_git_identity: bool,
    /// Fetch the current issue title and body instead of trusting the payload.
    pub refresh_issue: bool,
}

impl IssueLifecycleConfig {
    pub fn new(
        layout: GitclawLayout,
        agent_bin: impl Into<PathBuf>,
        raw_log_path: impl Into<PathBuf>,
    ) -> Self {
        Self {
            layout,
            agent_bin: agent_bin.into(),
            raw_log_path: raw_log_path.into(),
            relay_agent_output: true,
            push_max_attempts: DEFAULT_PUSH_MAX_ATTEMPTS,
            push_retry_delay_ms: 0,
            empty_reply: EmptyReplyPolicy::default(),
            configure_git_identity: true,
            refresh_issue: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IssueRunReport {
    pub issue_number: u64,
    pub mode: String,
    pub session_path: Option<String>,
    pub reply_chars: usize,
    pub push_attempts: usize,
    pub comment_id: Option<u64>,
    pub cleanup: CleanupOutcome,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct MainSequenceOutcome {
    mode: String,
    session_path: Option<String>,
    reply_chars: usize,
    push_attempts: usize,
    comment_id: Option<u64>,
}

pub struct IssueLifecycleRuntime<G: GitCommandRunner> {
    config: IssueLifecycleConfig,
    github: GithubApiClient,
    sessions: IssueSessionStore,
    agent: AgentInvoker,
    state: StatePublisher<G>,
    replies: ReplyPublisher,
}

impl<G: GitCommandRunner> IssueLifecycleRuntime<G> {
    pub fn new(
        config: IssueLifecycleConfig,
        github: GithubApiClient,
        git: G,
        default_branch: &str,
    ) -> Self {
        let sessions = IssueSessionStore::new(config.layout.clone());
        let agent = AgentInvoker::new(
            AgentInvokerConfig {
                agent_bin: config.agent_bin.clone(),
                raw_log_path: config.raw_log_path.clone(),
                relay_stdout: config.relay_agent_output,
            },
            config.layout.clone(),
        );
        let mut state_config =
            StatePublisherConfig::new(config.layout.repo_root().to_path_buf(), default_branch);
        state_config.max_attempts = config.push_max_attempts;
        state_config.retry_delay_ms = config.push_retry_delay_ms;
        let state = StatePublisher::new(git, state_config);
        let replies = ReplyPublisher::new(github.clone(), config.empty_reply);
        Self {
            config,
            github,
            sessions,
            agent,
            state,
            replies,
        }
    }

    pub fn state_publisher(&self) -> &StatePublisher<G> {
        &self.state
    }

    /// Adds the acknowledgement in-process and keeps the handoff for cleanup.
    pub async fn acknowledge(&self, event: &IssueTriggerEvent) -> FeedbackHandoff {
        signal_acknowledgement(&self.github, event).await
    }

    /// Runs the main sequence, then cleanup exactly once whatever the outcome.
    /// Returns the first fatal error of the main sequence after cleanup.
    pub async fn run(
        &self,
        event: &IssueTriggerEvent,
        handoff: HandoffSource,
    ) -> Result<IssueRunReport> {
        let outcome = self.run_main_sequence(event).await;
        let cleanup = finalize(&self.github, handoff).await;
        match outcome {
            Ok(outcome) => {
                let report = IssueRunReport {
                    issue_number: event.issue_number,
                    mode: outcome.mode,
                    session_path: outcome.session_path,
                    reply_chars: outcome.reply_chars,
                    push_attempts: outcome.push_attempts,
                    comment_id: outcome.comment_id,
                    cleanup,
                };
                tracing::info!(
                    issue_number = report.issue_number,
                    mode = %report.mode,
                    push_attempts = report.push_attempts,
                    comment_id = ?report.comment_id,
                    cleanup = ?report.cleanup,
                    "issue run complete"
                );
                Ok(report)
            }
            Err(error) => {
                tracing::error!(
                    issue_number = event.issue_number,
                    error = %format!("{error:#}"),
                    cleanup = ?cleanup,
                    "issue run failed"
                );
                Err(error)
            }
        }
    }

    async fn run_main_sequence(&self, event: &IssueTriggerEvent) -> Result<MainSequenceOutcome> {
        let issue_number = event.issue_number;
        let event = self.refreshed_event(event).await;

        self.sessions.ensure_dirs()?;
        let mode = self.sessions.resolve(issue_number);

        if self.config.configure_git_identity {
            self.state
                .configure_identity()
                .await
                .context("failed to configure git identity")?;
        }

        let prompt = build_prompt(&event);
        let known_artifacts = self.sessions.snapshot_session_artifacts()?;
        tracing::debug!(
            issue_number,
            known_artifacts = known_artifacts.len(),
            "captured session artifacts before invocation"
        );
        let run = self.agent.invoke(&prompt, &mode).await?;
        let reply = extract_final_reply(&run.stream);
        if reply.is_empty() {
            tracing::warn!(
                issue_number,
                raw_log = %run.raw_log_path.display(),
                "agent produced no final reply"
            );
        }

        let session_path = match self
            .sessions
            .latest_session_artifact_since(&known_artifacts)?
        {
            Some(session_path) => {
                self.sessions.persist(issue_number, &session_path)?;
                Some(session_path)
            }
            None => {
                tracing::warn!(issue_number, "agent wrote no session artifact; mapping not updated");
                None
            }
        };

        let published = self
            .state
            .publish(issue_number)
            .await
            .with_context(|| format!("failed to publish state for issue #{issue_number}"))?;

        let reply_chars = reply.chars().count();
        let publication = self.replies.publish(issue_number, &reply).await?;

        Ok(MainSequenceOutcome {
            mode: mode.as_str().to_string(),
            session_path,
            reply_chars,
            push_attempts: published.push_attempts,
            comment_id: publication.comment_id,
        })
    }

    async fn refreshed_event(&self, event: &IssueTriggerEvent) -> IssueTriggerEvent {
        let mut refreshed = event.clone();
        if !self.config.refresh_issue || event.kind != TriggerEventKind::IssueOpened {
            return refreshed;
        }
        match self.github.get_issue(event.issue_number).await {
            Ok(issue) => {
                if let Some(title) = issue.title {
                    refreshed.issue_title = title;
                }
                refreshed.issue_body = issue.body.unwrap_or_default();
            }
            Err(error) => {
                tracing::warn!(
                    issue_number = event.issue_number,
                    error = %format!("{error:#}"),
                    "failed to refresh issue; using event payload"
                );
            }
        }
        refreshed
    }
}
