use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};

use crate::time_utils::current_unix_timestamp_ms;

/// Replaces `path` with `content` through a sibling temp file and a rename.
///
/// State files live inside the repository working tree and are staged with
/// `git add -A`, so a failed write removes its temp file before returning.
pub fn write_text_atomic(path: &Path, content: &str) -> Result<()> {
    if path.as_os_str().is_empty() {
        bail!("destination path cannot be empty");
    }
    if path.is_dir() {
        bail!("destination path '{}' is a directory", path.display());
    }

    let parent_dir = path
        .parent()
        .filter(|dir| !dir.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    std::fs::create_dir_all(parent_dir)
        .with_context(|| format!("failed to create {}", parent_dir.display()))?;

    let temp_path = sibling_temp_path(parent_dir, path);
    let result = write_then_rename(&temp_path, path, content);
    if result.is_err() && temp_path.exists() {
        let _ = std::fs::remove_file(&temp_path);
    }
    result
}

fn sibling_temp_path(parent_dir: &Path, path: &Path) -> PathBuf {
    let stem = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| "gitclaw-state".to_string());
    parent_dir.join(format!(
        ".{stem}.tmp-{}-{}",
        std::process::id(),
        current_unix_timestamp_ms()
    ))
}

fn write_then_rename(temp_path: &Path, path: &Path, content: &str) -> Result<()> {
    let mut file = std::fs::File::create(temp_path)
        .with_context(|| format!("failed to create {}", temp_path.display()))?;
    file.write_all(content.as_bytes())
        .with_context(|| format!("failed to write {}", temp_path.display()))?;
    file.sync_all()
        .with_context(|| format!("failed to flush {}", temp_path.display()))?;
    drop(file);
    std::fs::rename(temp_path, path).with_context(|| {
        format!(
            "failed to move {} into place at {}",
            temp_path.display(),
            path.display()
        )
    })
}
