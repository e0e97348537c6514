use std::collections::VecDeque;
use std::ffi::OsString;
use std::io;
use std::path::{Path, PathBuf};
use std::process::Output;
use std::sync::Mutex;

use async_trait::async_trait;
use gitclaw_github::{
    GithubApiClient, IssueTriggerEvent, RepoRef, TriggerComment, TriggerEventKind,
};

use crate::state_publisher::GitCommandRunner;

pub(crate) fn test_github_client(base_url: &str) -> GithubApiClient {
    GithubApiClient::new(
        base_url.to_string(),
        "test-token".to_string(),
        RepoRef {
            owner: "owner".to_string(),
            name: "repo".to_string(),
        },
        2_000,
        2,
        1,
    )
    .expect("github client")
}

pub(crate) fn issue_opened_event(issue_number: u64, title: &str, body: &str) -> IssueTriggerEvent {
    IssueTriggerEvent {
        kind: TriggerEventKind::IssueOpened,
        repo: "owner/repo".to_string(),
        issue_number,
        issue_title: title.to_string(),
        issue_body: body.to_string(),
        comment: None,
        default_branch: "main".to_string(),
    }
}

pub(crate) fn comment_event(issue_number: u64, comment_id: u64, body: &str) -> IssueTriggerEvent {
    IssueTriggerEvent {
        kind: TriggerEventKind::CommentAdded,
        repo: "owner/repo".to_string(),
        issue_number,
        issue_title: "Existing issue".to_string(),
        issue_body: "Original body".to_string(),
        comment: Some(TriggerComment {
            id: comment_id,
            body: body.to_string(),
        }),
        default_branch: "main".to_string(),
    }
}

#[cfg(unix)]
pub(crate) fn write_script(dir: &Path, name: &str, body: &str) -> PathBuf {
    use std::os::unix::fs::PermissionsExt;

    let script = dir.join(name);
    let content = format!("#!/bin/sh\nset -eu\n{body}\n");
    std::fs::write(&script, content).expect("write script");
    let mut perms = std::fs::metadata(&script)
        .expect("script metadata")
        .permissions();
    perms.set_mode(0o755);
    std::fs::set_permissions(&script, perms).expect("chmod script");
    script
}

#[cfg(unix)]
pub(crate) fn git_output(code: i32, stderr: &str) -> Output {
    use std::os::unix::process::ExitStatusExt;

    Output {
        status: std::process::ExitStatus::from_raw(code << 8),
        stdout: Vec::new(),
        stderr: stderr.as_bytes().to_vec(),
    }
}

/// Replays queued git results in order; an empty queue answers with success.
#[derive(Default)]
pub(crate) struct StubGitRunner {
    outputs: Mutex<VecDeque<Output>>,
    calls: Mutex<Vec<String>>,
    last_repo_root: Mutex<Option<PathBuf>>,
}

impl StubGitRunner {
    pub(crate) fn new(outputs: Vec<Output>) -> Self {
        Self {
            outputs: Mutex::new(outputs.into()),
            ..Self::default()
        }
    }

    pub(crate) fn calls(&self) -> Vec<String> {
        self.calls.lock().expect("calls lock").clone()
    }

    pub(crate) fn last_repo_root(&self) -> Option<PathBuf> {
        self.last_repo_root.lock().expect("root lock").clone()
    }
}

#[async_trait]
impl GitCommandRunner for StubGitRunner {
    async fn run(&self, repo_root: &Path, args: &[OsString]) -> io::Result<Output> {
        let rendered = args
            .iter()
            .map(|arg| arg.to_string_lossy().into_owned())
            .collect::<Vec<_>>()
            .join(" ");
        self.calls.lock().expect("calls lock").push(rendered);
        *self.last_repo_root.lock().expect("root lock") = Some(repo_root.to_path_buf());
        let next = self.outputs.lock().expect("outputs lock").pop_front();
        Ok(next.unwrap_or_else(|| git_output(0, "")))
    }
}
