//! Launches the external coding agent and captures its event stream.

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use gitclaw_github::{IssueTriggerEvent, TriggerEventKind};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::process::Command;

use crate::issue_session_store::SessionMode;
use crate::reply_extractor::AgentEventStream;
use crate::runtime_layout::GitclawLayout;

const RELAY_BUFFER_BYTES: usize = 8 * 1024;

/// Prompt for one event: the comment text, or the issue title and body.
pub fn build_prompt(event: &IssueTriggerEvent) -> String {
    match (&event.kind, &event.comment) {
        (TriggerEventKind::CommentAdded, Some(comment)) => comment.body.clone(),
        _ => format!("{}\n\n{}", event.issue_title, event.issue_body),
    }
}

/// Arguments passed to the agent: `--session` is only present when resuming.
pub fn agent_args(
    prompt: &str,
    sessions_dir_relative: &Path,
    mode: &SessionMode,
) -> Vec<OsString> {
    let mut args: Vec<OsString> = vec![
        "--mode".into(),
        "json".into(),
        "--session-dir".into(),
        sessions_dir_relative.as_os_str().to_os_string(),
        "-p".into(),
        prompt.into(),
    ];
    if let Some(session_path) = mode.session_path() {
        args.push("--session".into());
        args.push(session_path.into());
    }
    args
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentInvokerConfig {
    pub agent_bin: PathBuf,
    /// Verbatim copy of the agent's stdout.
    pub raw_log_path: PathBuf,
    /// Mirror agent output onto this process' stdout while it runs.
    pub relay_stdout: bool,
}

#[derive(Debug, Clone)]
pub struct AgentRun {
    pub stream: AgentEventStream,
    pub raw_log_path: PathBuf,
    pub exit_code: Option<i32>,
    pub bytes_captured: u64,
}

#[derive(Debug, Clone)]
pub struct AgentInvoker {
    config: AgentInvokerConfig,
    layout: GitclawLayout,
}

impl AgentInvoker {
    pub fn new(config: AgentInvokerConfig, layout: GitclawLayout) -> Self {
        Self { config, layout }
    }

    pub async fn invoke(&self, prompt: &str, mode: &SessionMode) -> Result<AgentRun> {
        // Bare program names are looked up on PATH.
        let agent_bin = if self.config.agent_bin.components().count() > 1 {
            self.layout.resolve_repo_path(&self.config.agent_bin)
        } else {
            self.config.agent_bin.clone()
        };
        let executable = agent_bin.display().to_string();
        let mut command = Command::new(&agent_bin);
        command.kill_on_drop(true);
        command.args(agent_args(
            prompt,
            &self.layout.sessions_dir_relative(),
            mode,
        ));
        command.current_dir(self.layout.repo_root());
        command.stdin(Stdio::null());
        command.stdout(Stdio::piped());
        command.stderr(Stdio::null());

        tracing::info!(
            agent = %executable,
            mode = mode.as_str(),
            session_path = mode.session_path().unwrap_or_default(),
            "invoking agent"
        );
        let mut child = spawn_with_text_file_busy_retry(&mut command, &executable).await?;
        let mut stdout = child
            .stdout
            .take()
            .ok_or_else(|| anyhow!("agent '{executable}' stdout was not captured"))?;

        if let Some(parent) = self
            .config
            .raw_log_path
            .parent()
            .filter(|dir| !dir.as_os_str().is_empty())
        {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
        let mut raw_log = tokio::fs::File::create(&self.config.raw_log_path)
            .await
            .with_context(|| {
                format!(
                    "failed to create agent raw log {}",
                    self.config.raw_log_path.display()
                )
            })?;
        let mut relay = tokio::io::stdout();
        let mut captured = Vec::new();
        let mut buffer = vec![0_u8; RELAY_BUFFER_BYTES];
        loop {
            let read = stdout
                .read(&mut buffer)
                .await
                .with_context(|| format!("failed to read output of agent '{executable}'"))?;
            if read == 0 {
                break;
            }
            let chunk = &buffer[..read];
            raw_log
                .write_all(chunk)
                .await
                .context("failed to write agent raw log")?;
            if self.config.relay_stdout {
                relay
                    .write_all(chunk)
                    .await
                    .context("failed to relay agent output")?;
            }
            captured.extend_from_slice(chunk);
        }
        raw_log
            .flush()
            .await
            .context("failed to flush agent raw log")?;
        if self.config.relay_stdout {
            relay.flush().await.context("failed to flush relay")?;
        }

        let status = child
            .wait()
            .await
            .with_context(|| format!("failed to wait for agent '{executable}'"))?;
        if !status.success() {
            tracing::warn!(
                agent = %executable,
                exit_code = ?status.code(),
                "agent exited unsuccessfully"
            );
        }

        let stream = AgentEventStream::from_ndjson(&captured);
        tracing::info!(
            events = stream.len(),
            skipped_lines = stream.skipped_lines(),
            raw_log = %self.config.raw_log_path.display(),
            "captured agent event stream"
        );
        Ok(AgentRun {
            stream,
            raw_log_path: self.config.raw_log_path.clone(),
            exit_code: status.code(),
            bytes_captured: captured.len() as u64,
        })
    }
}

async fn spawn_with_text_file_busy_retry(
    command: &mut Command,
    executable: &str,
) -> Result<tokio::process::Child> {
    const MAX_TEXT_FILE_BUSY_RETRIES: u32 = 5;
    const TEXT_FILE_BUSY_ERRNO: i32 = 26;
    let mut attempt = 0;
    loop {
        match command.spawn() {
            Ok(child) => return Ok(child),
            Err(error)
                if error.raw_os_error() == Some(TEXT_FILE_BUSY_ERRNO)
                    && attempt < MAX_TEXT_FILE_BUSY_RETRIES =>
            {
                attempt += 1;
                tokio::time::sleep(Duration::from_millis(25)).await;
            }
            Err(error) => {
                return Err(error).with_context(|| format!("failed to spawn agent '{executable}'"))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use tempfile::tempdir;

    use super::{agent_args, build_prompt, AgentInvoker, AgentInvokerConfig};
    use crate::issue_session_store::SessionMode;
    use crate::reply_extractor::extract_final_reply;
    use crate::runtime_layout::{GitclawLayout, DEFAULT_GITCLAW_DIR_NAME};
    use crate::test_support::{comment_event, issue_opened_event, write_script};

    #[test]
    fn unit_build_prompt_uses_comment_body_for_comment_events() {
        let event = comment_event(42, 7, "  please also add tests  ");
        assert_eq!(build_prompt(&event), "  please also add tests  ");
    }

    #[test]
    fn unit_build_prompt_joins_title_and_body_for_new_issues() {
        let event = issue_opened_event(42, "Crash on start", "Please fix the bug ❤️");
        assert_eq!(build_prompt(&event), "Crash on start\n\nPlease fix the bug ❤️");
        let empty = issue_opened_event(1, "Only title", "");
        assert_eq!(build_prompt(&empty), "Only title\n\n");
    }

    #[test]
    fn unit_agent_args_only_pass_session_when_resuming() {
        let sessions = Path::new(".GITCLAW/state/sessions");
        let fresh = agent_args("hi", sessions, &SessionMode::New);
        assert_eq!(
            fresh,
            ["--mode", "json", "--session-dir", ".GITCLAW/state/sessions", "-p", "hi"]
                .map(std::ffi::OsString::from)
        );
        let resumed = agent_args(
            "hi",
            sessions,
            &SessionMode::Resume {
                session_path: "s.jsonl".to_string(),
            },
        );
        assert_eq!(resumed.len(), 8);
        assert_eq!(resumed[6], "--session");
        assert_eq!(resumed[7], "s.jsonl");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn integration_invoke_captures_stream_and_raw_copy() {
        let temp = tempdir().expect("tempdir");
        let layout = GitclawLayout::new(temp.path(), DEFAULT_GITCLAW_DIR_NAME);
        let args_file = temp.path().join("args.txt");
        let script = write_script(
            temp.path(),
            "fake-pi",
            &format!(
                r#"
printf '%s\n' "$@" > '{}'
printf '{{"type":"agent_start"}}\n'
printf 'progress noise\n'
printf '{{"type":"message_end","message":{{"content":[{{"type":"text","text":"done"}}]}}}}\n'
"#,
                args_file.display()
            ),
        );
        let raw_log = temp.path().join("raw").join("agent-raw.jsonl");
        let invoker = AgentInvoker::new(
            AgentInvokerConfig {
                agent_bin: script,
                raw_log_path: raw_log.clone(),
                relay_stdout: false,
            },
            layout,
        );

        let run = invoker
            .invoke(
                "fix it",
                &SessionMode::Resume {
                    session_path: ".GITCLAW/state/sessions/s.jsonl".to_string(),
                },
            )
            .await
            .expect("invoke");

        assert_eq!(run.exit_code, Some(0));
        assert_eq!(run.stream.len(), 2);
        assert_eq!(run.stream.skipped_lines(), 1);
        assert_eq!(extract_final_reply(&run.stream), "done");
        let raw = std::fs::read_to_string(&raw_log).expect("raw log");
        assert!(raw.contains("progress noise\n"));
        assert_eq!(raw.len() as u64, run.bytes_captured);

        let args = std::fs::read_to_string(&args_file).expect("args");
        assert_eq!(
            args.lines().collect::<Vec<_>>(),
            vec![
                "--mode",
                "json",
                "--session-dir",
                ".GITCLAW/state/sessions",
                "-p",
                "fix it",
                "--session",
                ".GITCLAW/state/sessions/s.jsonl"
            ]
        );
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn regression_invoke_tolerates_non_zero_agent_exit() {
        let temp = tempdir().expect("tempdir");
        let layout = GitclawLayout::new(temp.path(), DEFAULT_GITCLAW_DIR_NAME);
        let script = write_script(
            temp.path(),
            "fake-pi",
            "printf '{\"type\":\"agent_start\"}\\n'\nexit 3",
        );
        let invoker = AgentInvoker::new(
            AgentInvokerConfig {
                agent_bin: script,
                raw_log_path: temp.path().join("raw.jsonl"),
                relay_stdout: false,
            },
            layout,
        );
        let run = invoker.invoke("p", &SessionMode::New).await.expect("invoke");
        assert_eq!(run.exit_code, Some(3));
        assert_eq!(extract_final_reply(&run.stream), "");
    }

    #[tokio::test]
    async fn regression_invoke_reports_missing_agent_binary() {
        let temp = tempdir().expect("tempdir");
        let layout = GitclawLayout::new(temp.path(), DEFAULT_GITCLAW_DIR_NAME);
        let invoker = AgentInvoker::new(
            AgentInvokerConfig {
                agent_bin: temp.path().join("missing-pi"),
                raw_log_path: temp.path().join("raw.jsonl"),
                relay_stdout: false,
            },
            layout,
        );
        let error = invoker
            .invoke("p", &SessionMode::New)
            .await
            .expect_err("spawn should fail");
        assert!(format!("{error:#}").contains("failed to spawn agent"));
    }
}
