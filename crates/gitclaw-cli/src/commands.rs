use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use gitclaw_core::current_unix_timestamp_ms;
use gitclaw_github::{
    issue_body_from_payload, GithubApiClient, IssueTriggerEvent, RepoRef, TriggerEventKind,
};
use gitclaw_runtime::{
    evaluate_gates, finalize, signal_and_record, AdmissionGate, FeedbackHandoffStore,
    GateContext, GateDecision, GitclawLayout, HandoffSource, IssueLifecycleConfig,
    IssueLifecycleRuntime, ProcessGitCommandRunner,
};

use crate::cli_args::{
    CleanupArgs, Cli, CliCommand, EventArgs, GithubArgs, HandoffArgs, HeartGuardArgs, RunArgs,
    SignalArgs, WorkspaceArgs,
};

pub(crate) async fn run_cli(cli: Cli) -> Result<ExitCode> {
    let layout = workspace_layout(&cli.workspace);
    match cli.command {
        CliCommand::Enabled => Ok(gate_exit_code(
            &AdmissionGate::enabled_sentinel(&layout),
            &GateContext::default(),
        )),
        CliCommand::HeartGuard(args) => Ok(execute_heart_guard(&layout, &args)),
        CliCommand::Signal(args) => execute_signal(&args).await,
        CliCommand::Run(args) => execute_run(&layout, &args).await,
        CliCommand::Cleanup(args) => execute_cleanup(&args).await,
    }
}

fn workspace_layout(args: &WorkspaceArgs) -> GitclawLayout {
    GitclawLayout::new(args.repo_root.clone(), args.gitclaw_dir.clone())
}

fn gate_exit_code(gate: &AdmissionGate, context: &GateContext<'_>) -> ExitCode {
    match evaluate_gates(std::slice::from_ref(gate), context) {
        GateDecision::Pass { reason } => {
            tracing::info!(gate = gate.label(), reason = %reason, "admission gate passed");
            ExitCode::SUCCESS
        }
        GateDecision::Block { reason } => {
            eprintln!("{reason}");
            ExitCode::FAILURE
        }
    }
}

fn execute_heart_guard(layout: &GitclawLayout, args: &HeartGuardArgs) -> ExitCode {
    let event_kind = args
        .event_name
        .as_deref()
        .and_then(TriggerEventKind::from_event_name);
    // An unreadable payload counts as an empty body.
    let body = args
        .event_path
        .as_deref()
        .and_then(|path| std::fs::read_to_string(path).ok())
        .map(|payload| issue_body_from_payload(&payload))
        .unwrap_or_default();
    gate_exit_code(
        &AdmissionGate::heart_content(layout),
        &GateContext {
            event_kind,
            body: Some(body.as_str()),
        },
    )
}

fn load_event(event: &EventArgs, repo: &str) -> Result<IssueTriggerEvent> {
    let payload = std::fs::read_to_string(&event.event_path).with_context(|| {
        format!("failed to read event payload {}", event.event_path.display())
    })?;
    IssueTriggerEvent::from_payload(&event.event_name, repo, &payload).with_context(|| {
        format!(
            "failed to parse '{}' event payload {}",
            event.event_name,
            event.event_path.display()
        )
    })
}

fn github_client(args: &GithubArgs) -> Result<GithubApiClient> {
    GithubApiClient::new(
        args.github_api_base.clone(),
        args.github_token.clone(),
        RepoRef::parse(&args.github_repo)?,
        args.request_timeout_ms,
        args.retry_max_attempts,
        args.retry_base_delay_ms,
    )
}

fn handoff_store(args: &HandoffArgs) -> FeedbackHandoffStore {
    match &args.handoff_path {
        Some(path) => FeedbackHandoffStore::new(path.clone()),
        None => FeedbackHandoffStore::for_run(&std::env::temp_dir(), &args.run_key()),
    }
}

fn default_raw_log_path(run_key: &str) -> PathBuf {
    let run_key = if run_key.trim().is_empty() {
        current_unix_timestamp_ms().to_string()
    } else {
        run_key.to_string()
    };
    std::env::temp_dir().join(format!("gitclaw-agent-raw-{run_key}.jsonl"))
}

async fn execute_signal(args: &SignalArgs) -> Result<ExitCode> {
    let client = github_client(&args.github)?;
    let event = load_event(&args.event, &client.repo().as_slug())?;
    let store = handoff_store(&args.handoff);
    let handoff = signal_and_record(&client, &event, &store).await;
    tracing::info!(
        issue_number = handoff.issue_number,
        reaction_id = handoff.reaction_id.as_deref().unwrap_or_default(),
        handoff = %store.path().display(),
        "feedback signal recorded"
    );
    Ok(ExitCode::SUCCESS)
}

async fn execute_run(layout: &GitclawLayout, args: &RunArgs) -> Result<ExitCode> {
    // Without a client no reaction can be removed; a recorded handoff stays for `cleanup`.
    let client = github_client(&args.github)?;
    let event = match load_event(&args.event, &client.repo().as_slug()) {
        Ok(event) => event,
        Err(error) => {
            if !args.acknowledge {
                let cleanup =
                    finalize(&client, HandoffSource::Store(handoff_store(&args.handoff))).await;
                tracing::error!(cleanup = ?cleanup, "run aborted before the lifecycle started");
            }
            return Err(error);
        }
    };

    let raw_log_path = args
        .agent_raw_log
        .clone()
        .unwrap_or_else(|| default_raw_log_path(&args.handoff.run_id));
    let mut config = IssueLifecycleConfig::new(layout.clone(), args.agent_bin.clone(), raw_log_path);
    config.relay_agent_output = args.relay_agent_output;
    config.push_max_attempts = args.push_max_attempts;
    config.push_retry_delay_ms = args.push_retry_delay_ms;
    config.empty_reply = args.empty_reply;
    config.refresh_issue = args.refresh_issue;

    let runtime = IssueLifecycleRuntime::new(
        config,
        client,
        ProcessGitCommandRunner::new(args.git_bin.clone()),
        &event.default_branch,
    );
    let handoff = if args.acknowledge {
        HandoffSource::InProcess(Some(runtime.acknowledge(&event).await))
    } else {
        HandoffSource::Store(handoff_store(&args.handoff))
    };

    let report = runtime.run(&event, handoff).await?;
    let rendered = serde_json::to_string(&report).context("failed to render run report")?;
    tracing::info!(report = %rendered, "gitclaw run finished");
    Ok(ExitCode::SUCCESS)
}

async fn execute_cleanup(args: &CleanupArgs) -> Result<ExitCode> {
    let client = github_client(&args.github)?;
    let outcome = finalize(&client, HandoffSource::Store(handoff_store(&args.handoff))).await;
    tracing::info!(outcome = ?outcome, "cleanup finished");
    Ok(ExitCode::SUCCESS)
}
