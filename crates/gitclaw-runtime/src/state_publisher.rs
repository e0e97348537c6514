//! Commits agent-produced repository changes and pushes them with a bounded
//! rebase-and-retry loop.

use std::ffi::OsString;
use std::io;
use std::path::{Path, PathBuf};
use std::process::{Output, Stdio};
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tokio::process::Command;

pub const GITCLAW_COMMIT_NAME: &str = "gitclaw[bot]";
pub const GITCLAW_COMMIT_EMAIL: &str = "gitclaw[bot]@users.noreply.github.com";
pub const DEFAULT_PUSH_MAX_ATTEMPTS: usize = 3;

#[async_trait]
pub trait GitCommandRunner: Send + Sync {
    async fn run(&self, repo_root: &Path, args: &[OsString]) -> io::Result<Output>;
}

#[derive(Debug, Clone)]
pub struct ProcessGitCommandRunner {
    binary: PathBuf,
}

impl Default for ProcessGitCommandRunner {
    fn default() -> Self {
        Self {
            binary: PathBuf::from("git"),
        }
    }
}

impl ProcessGitCommandRunner {
    pub fn new(binary: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
        }
    }
}

#[async_trait]
impl GitCommandRunner for ProcessGitCommandRunner {
    async fn run(&self, repo_root: &Path, args: &[OsString]) -> io::Result<Output> {
        Command::new(&self.binary)
            .args(args)
            .current_dir(repo_root)
            .stdin(Stdio::null())
            .output()
            .await
    }
}

#[derive(Debug, Error)]
pub enum StatePublishError {
    #[error("failed to launch `git {command}`: {source}")]
    Spawn {
        command: String,
        #[source]
        source: io::Error,
    },
    #[error("`git {command}` exited with {status}: {stderr}")]
    CommandFailed {
        command: String,
        status: String,
        stderr: String,
    },
    #[error("push to '{branch}' failed after {attempts} attempts: {last_error}")]
    PushExhausted {
        branch: String,
        attempts: usize,
        last_error: String,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatePublishOutcome {
    pub committed: bool,
    pub push_attempts: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatePublisherConfig {
    pub repo_root: PathBuf,
    pub remote: String,
    pub branch: String,
    pub max_attempts: usize,
    /// Base of the exponential delay between attempts; 0 disables it.
    pub retry_delay_ms: u64,
}

impl StatePublisherConfig {
    pub fn new(repo_root: impl Into<PathBuf>, branch: impl Into<String>) -> Self {
        Self {
            repo_root: repo_root.into(),
            remote: "origin".to_string(),
            branch: branch.into(),
            max_attempts: DEFAULT_PUSH_MAX_ATTEMPTS,
            retry_delay_ms: 0,
        }
    }
}

pub fn commit_message(issue_number: u64) -> String {
    format!("gitclaw: work on issue #{issue_number}")
}

pub struct StatePublisher<G: GitCommandRunner> {
    runner: G,
    config: StatePublisherConfig,
}

impl<G: GitCommandRunner> StatePublisher<G> {
    pub fn new(runner: G, config: StatePublisherConfig) -> Self {
        Self { runner, config }
    }

    pub fn runner(&self) -> &G {
        &self.runner
    }

    pub async fn configure_identity(&self) -> Result<(), StatePublishError> {
        self.git_checked(&["config", "user.name", GITCLAW_COMMIT_NAME])
            .await?;
        self.git_checked(&["config", "user.email", GITCLAW_COMMIT_EMAIL])
            .await?;
        Ok(())
    }

    /// Stages everything, commits when something is staged, then pushes.
    pub async fn publish(
        &self,
        issue_number: u64,
    ) -> Result<StatePublishOutcome, StatePublishError> {
        self.git_checked(&["add", "-A"]).await?;
        let committed = if self.has_staged_changes().await? {
            let message = commit_message(issue_number);
            self.git_checked(&["commit", "-m", message.as_str()]).await?;
            tracing::info!(issue_number, "committed agent changes");
            true
        } else {
            tracing::info!(issue_number, "no staged changes to commit");
            false
        };
        let push_attempts = self.push_with_retry().await?;
        Ok(StatePublishOutcome {
            committed,
            push_attempts,
        })
    }

    async fn has_staged_changes(&self) -> Result<bool, StatePublishError> {
        let output = self.git(&["diff", "--cached", "--quiet"]).await?;
        match output.status.code() {
            Some(0) => Ok(false),
            Some(1) => Ok(true),
            _ => Err(command_failed("diff --cached --quiet", &output)),
        }
    }

    async fn push_with_retry(&self) -> Result<usize, StatePublishError> {
        let max_attempts = self.config.max_attempts.max(1);
        let remote = self.config.remote.as_str();
        let branch = self.config.branch.as_str();
        let refspec = format!("HEAD:{branch}");
        let mut last_error = String::new();

        for attempt in 1..=max_attempts {
            let output = self.git(&["push", remote, refspec.as_str()]).await?;
            if output.status.success() {
                tracing::info!(attempt, branch, "pushed state");
                return Ok(attempt);
            }
            last_error = stderr_text(&output);
            tracing::warn!(attempt, max_attempts, branch, error = %last_error, "push rejected");
            if attempt == max_attempts {
                break;
            }

            if self.config.retry_delay_ms > 0 {
                let exponent = u32::try_from(attempt - 1).unwrap_or(u32::MAX).min(10);
                let delay_ms = self
                    .config
                    .retry_delay_ms
                    .saturating_mul(2_u64.saturating_pow(exponent));
                tokio::time::sleep(Duration::from_millis(delay_ms)).await;
            }
            let rebase = self.git(&["pull", "--rebase", remote, branch]).await?;
            if !rebase.status.success() {
                tracing::warn!(
                    attempt,
                    error = %stderr_text(&rebase),
                    "rebase onto remote failed; aborting rebase"
                );
                if let Err(error) = self.git(&["rebase", "--abort"]).await {
                    tracing::warn!(error = %error, "rebase --abort failed");
                }
            }
        }

        Err(StatePublishError::PushExhausted {
            branch: branch.to_string(),
            attempts: max_attempts,
            last_error,
        })
    }

    async fn git(&self, args: &[&str]) -> Result<Output, StatePublishError> {
        let os_args = args.iter().map(OsString::from).collect::<Vec<_>>();
        self.runner
            .run(&self.config.repo_root, &os_args)
            .await
            .map_err(|source| StatePublishError::Spawn {
                command: args.join(" "),
                source,
            })
    }

    async fn git_checked(&self, args: &[&str]) -> Result<Output, StatePublishError> {
        let output = self.git(args).await?;
        if output.status.success() {
            Ok(output)
        } else {
            Err(command_failed(&args.join(" "), &output))
        }
    }
}

fn stderr_text(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr).trim().to_string()
}

fn command_failed(command: &str, output: &Output) -> StatePublishError {
    StatePublishError::CommandFailed {
        command: command.to_string(),
        status: output.status.to_string(),
        stderr: stderr_text(output),
    }
}
