use std::path::PathBuf;

use clap::{ArgAction, Args, Parser, Subcommand};
use gitclaw_runtime::{EmptyReplyPolicy, DEFAULT_GITCLAW_DIR_NAME};

const DEFAULT_AGENT_BIN: &str = ".GITCLAW/node_modules/.bin/pi";

fn parse_positive_usize(value: &str) -> Result<usize, String> {
    let parsed = value
        .parse::<usize>()
        .map_err(|error| format!("failed to parse integer: {error}"))?;
    if parsed == 0 {
        return Err("value must be greater than 0".to_string());
    }
    Ok(parsed)
}

fn parse_empty_reply_policy(value: &str) -> Result<EmptyReplyPolicy, String> {
    value.parse::<EmptyReplyPolicy>().map_err(|error| error.to_string())
}

#[derive(Debug, Parser)]
#[command(
    name = "gitclaw",
    about = "Runs a coding agent against GitHub issues from a workflow",
    version
)]
pub(crate) struct Cli {
    #[command(flatten)]
    pub(crate) workspace: WorkspaceArgs,

    #[command(subcommand)]
    pub(crate) command: CliCommand,
}

#[derive(Debug, Args)]
pub(crate) struct WorkspaceArgs {
    #[arg(
        long = "repo-root",
        env = "GITCLAW_REPO_ROOT",
        default_value = ".",
        global = true,
        help = "Repository working tree the agent operates on"
    )]
    pub(crate) repo_root: PathBuf,

    #[arg(
        long = "gitclaw-dir",
        env = "GITCLAW_DIR",
        default_value = DEFAULT_GITCLAW_DIR_NAME,
        global = true,
        help = "Directory (relative to the repo root) holding markers and state"
    )]
    pub(crate) gitclaw_dir: String,
}

#[derive(Debug, Subcommand)]
pub(crate) enum CliCommand {
    /// Exit 0 when the enabled sentinel exists, 1 otherwise.
    Enabled,
    /// Exit 1 when a heart is required but the new issue body has none.
    HeartGuard(HeartGuardArgs),
    /// Add the acknowledgement reaction and record it for cleanup.
    Signal(SignalArgs),
    /// Run the agent for the triggering issue, publish state, and reply.
    Run(RunArgs),
    /// Remove the acknowledgement recorded by `signal`.
    Cleanup(CleanupArgs),
}

#[derive(Debug, Args)]
pub(crate) struct HeartGuardArgs {
    #[arg(long = "event-name", env = "GITHUB_EVENT_NAME")]
    pub(crate) event_name: Option<String>,

    #[arg(long = "event-path", env = "GITHUB_EVENT_PATH")]
    pub(crate) event_path: Option<PathBuf>,
}

#[derive(Debug, Args)]
pub(crate) struct EventArgs {
    #[arg(
        long = "event-name",
        env = "GITHUB_EVENT_NAME",
        help = "Workflow event name: issues or issue_comment"
    )]
    pub(crate) event_name: String,

    #[arg(
        long = "event-path",
        env = "GITHUB_EVENT_PATH",
        help = "Path to the workflow event payload json"
    )]
    pub(crate) event_path: PathBuf,
}

#[derive(Debug, Args)]
pub(crate) struct GithubArgs {
    #[arg(
        long = "github-repo",
        env = "GITHUB_REPOSITORY",
        help = "Repository slug in owner/repo format"
    )]
    pub(crate) github_repo: String,

    #[arg(
        long = "github-token",
        env = "GITHUB_TOKEN",
        hide_env_values = true,
        help = "Token used for reactions and comments"
    )]
    pub(crate) github_token: String,

    #[arg(
        long = "github-api-base",
        env = "GITHUB_API_URL",
        default_value = "https://api.github.com"
    )]
    pub(crate) github_api_base: String,

    #[arg(long = "request-timeout-ms", default_value_t = 30_000)]
    pub(crate) request_timeout_ms: u64,

    #[arg(
        long = "github-retry-max-attempts",
        default_value_t = 4,
        value_parser = parse_positive_usize,
        help = "Attempts for retryable reaction and issue requests; comments are sent once"
    )]
    pub(crate) retry_max_attempts: usize,

    #[arg(long = "github-retry-base-delay-ms", default_value_t = 500)]
    pub(crate) retry_base_delay_ms: u64,
}

#[derive(Debug, Args)]
pub(crate) struct HandoffArgs {
    #[arg(
        long = "handoff-path",
        env = "GITCLAW_FEEDBACK_HANDOFF",
        help = "Override the run-scoped feedback handoff file"
    )]
    pub(crate) handoff_path: Option<PathBuf>,

    #[arg(long = "run-id", env = "GITHUB_RUN_ID", default_value = "local")]
    pub(crate) run_id: String,

    #[arg(long = "run-attempt", env = "GITHUB_RUN_ATTEMPT", default_value = "1")]
    pub(crate) run_attempt: String,
}

impl HandoffArgs {
    pub(crate) fn run_key(&self) -> String {
        format!("{}-{}", self.run_id.trim(), self.run_attempt.trim())
    }
}

#[derive(Debug, Args)]
pub(crate) struct SignalArgs {
    #[command(flatten)]
    pub(crate) event: EventArgs,
    #[command(flatten)]
    pub(crate) github: GithubArgs,
    #[command(flatten)]
    pub(crate) handoff: HandoffArgs,
}

#[derive(Debug, Args)]
pub(crate) struct CleanupArgs {
    #[command(flatten)]
    pub(crate) github: GithubArgs,
    #[command(flatten)]
    pub(crate) handoff: HandoffArgs,
}

#[derive(Debug, Args)]
pub(crate) struct RunArgs {
    #[command(flatten)]
    pub(crate) event: EventArgs,
    #[command(flatten)]
    pub(crate) github: GithubArgs,
    #[command(flatten)]
    pub(crate) handoff: HandoffArgs,

    #[arg(
        long = "agent-bin",
        env = "GITCLAW_AGENT_BIN",
        default_value = DEFAULT_AGENT_BIN,
        help = "Agent executable; relative paths with a directory resolve against the repo root"
    )]
    pub(crate) agent_bin: PathBuf,

    #[arg(
        long = "agent-raw-log",
        env = "GITCLAW_AGENT_RAW_LOG",
        help = "Where to keep the raw agent output (defaults to the temp dir)"
    )]
    pub(crate) agent_raw_log: Option<PathBuf>,

    #[arg(
        long = "relay-agent-output",
        env = "GITCLAW_RELAY_AGENT_OUTPUT",
        default_value_t = true,
        action = ArgAction::Set,
        num_args = 0..=1,
        require_equals = true,
        default_missing_value = "true",
        help = "Mirror agent output onto stdout while it runs"
    )]
    pub(crate) relay_agent_output: bool,

    #[arg(
        long = "acknowledge",
        default_value_t = false,
        help = "Add the acknowledgement reaction in-process instead of reading a handoff file"
    )]
    pub(crate) acknowledge: bool,

    #[arg(long = "git-bin", env = "GITCLAW_GIT_BIN", default_value = "git")]
    pub(crate) git_bin: PathBuf,

    #[arg(
        long = "push-max-attempts",
        env = "GITCLAW_PUSH_MAX_ATTEMPTS",
        default_value_t = 3,
        value_parser = parse_positive_usize
    )]
    pub(crate) push_max_attempts: usize,

    #[arg(
        long = "push-retry-delay-ms",
        env = "GITCLAW_PUSH_RETRY_DELAY_MS",
        default_value_t = 0,
        help = "Base of the exponential delay between push attempts; 0 retries immediately"
    )]
    pub(crate) push_retry_delay_ms: u64,

    #[arg(
        long = "empty-reply",
        env = "GITCLAW_EMPTY_REPLY",
        default_value = "post",
        value_parser = parse_empty_reply_policy,
        help = "What to do when the agent produced no reply: post, skip, or placeholder"
    )]
    pub(crate) empty_reply: EmptyReplyPolicy,

    #[arg(
        long = "refresh-issue",
        env = "GITCLAW_REFRESH_ISSUE",
        default_value_t = true,
        action = ArgAction::Set,
        num_args = 0..=1,
        require_equals = true,
        default_missing_value = "true",
        help = "Fetch the current issue title and body before building the prompt"
    )]
    pub(crate) refresh_issue: bool,
}
