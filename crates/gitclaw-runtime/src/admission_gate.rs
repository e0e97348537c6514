//! Admission gates evaluated before any lifecycle side effect.
//!
//! The sentinel gate fails closed: the marker must exist for a run to proceed.
//! The heart gate is opt-in: it only blocks while its marker exists, and only
//! for newly opened issues whose body carries no heart symbol.

use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use gitclaw_github::TriggerEventKind;
use regex::Regex;

use crate::runtime_layout::GitclawLayout;

pub const ENABLED_SENTINEL_FILE_NAME: &str = ".GITCLAW-ENABLED.md";
pub const HEART_REQUIRED_MARKER_STEM: &str = "GITCLAW-HEART-REQUIRED";
pub const HEART_NOT_REQUIRED_FILE_NAME: &str = "GITCLAW-HEART-NOT-REQUIRED.md";

const HEART_PATTERN: &str = r"[\x{2661}\x{2665}\x{2763}-\x{2767}\x{1F493}-\x{1F49F}\x{1F5A4}\x{1F90D}\x{1F90E}\x{1F9E1}\x{1FA75}-\x{1FA77}]\x{FE0F}?";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GateDecision {
    Pass { reason: String },
    Block { reason: String },
}

impl GateDecision {
    pub fn is_pass(&self) -> bool {
        matches!(self, Self::Pass { .. })
    }

    pub fn reason(&self) -> &str {
        match self {
            Self::Pass { reason } | Self::Block { reason } => reason,
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
/// Event facts a gate may inspect. `body` is the triggering issue body.
pub struct GateContext<'a> {
    pub event_kind: Option<TriggerEventKind>,
    pub body: Option<&'a str>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdmissionGate {
    /// Passes only while `marker_path` exists.
    Sentinel { marker_path: PathBuf },
    /// Requires a heart in new-issue bodies while a `GITCLAW-HEART-REQUIRED.*`
    /// file exists in `marker_dir`.
    HeartContent { marker_dir: PathBuf },
}

impl AdmissionGate {
    pub fn enabled_sentinel(layout: &GitclawLayout) -> Self {
        Self::Sentinel {
            marker_path: layout.gitclaw_dir().join(ENABLED_SENTINEL_FILE_NAME),
        }
    }

    pub fn heart_content(layout: &GitclawLayout) -> Self {
        Self::HeartContent {
            marker_dir: layout.gitclaw_dir(),
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Sentinel { .. } => "enabled sentinel",
            Self::HeartContent { .. } => "heart guard",
        }
    }

    pub fn evaluate(&self, context: &GateContext<'_>) -> GateDecision {
        match self {
            Self::Sentinel { marker_path } => evaluate_sentinel(marker_path),
            Self::HeartContent { marker_dir } => evaluate_heart_content(marker_dir, context),
        }
    }
}

/// Evaluates gates in order; the first block wins.
pub fn evaluate_gates(gates: &[AdmissionGate], context: &GateContext<'_>) -> GateDecision {
    let mut reasons = Vec::new();
    for gate in gates {
        let decision = gate.evaluate(context);
        if !decision.is_pass() {
            return decision;
        }
        reasons.push(decision.reason().to_string());
    }
    GateDecision::Pass {
        reason: reasons.join("; "),
    }
}

pub fn body_contains_heart(body: &str) -> bool {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN
        .get_or_init(|| Regex::new(HEART_PATTERN).expect("heart pattern compiles"))
        .is_match(body)
}

fn evaluate_sentinel(marker_path: &Path) -> GateDecision {
    let file_name = marker_path
        .file_name()
        .map(|name| name.to_string_lossy().to_string())
        .unwrap_or_else(|| marker_path.display().to_string());
    if marker_path.exists() {
        GateDecision::Pass {
            reason: format!("GitClaw enabled: {file_name} found."),
        }
    } else {
        GateDecision::Block {
            reason: format!("GitClaw disabled by missing {file_name}"),
        }
    }
}

fn evaluate_heart_content(marker_dir: &Path, context: &GateContext<'_>) -> GateDecision {
    let Some(marker) = find_heart_required_marker(marker_dir) else {
        return GateDecision::Pass {
            reason: "heart requirement is not active".to_string(),
        };
    };
    if context.event_kind != Some(TriggerEventKind::IssueOpened) {
        return GateDecision::Pass {
            reason: format!("heart requirement active ({marker}) but event is not a new issue"),
        };
    }
    if body_contains_heart(context.body.unwrap_or_default()) {
        return GateDecision::Pass {
            reason: format!("heart requirement active ({marker}) and issue body has a heart"),
        };
    }
    GateDecision::Block {
        reason: format!(
            "issue does not contain a ❤️ heart emoji. Skipping.\n\
             To process this issue, edit it to include a heart emoji (❤️) in the body.\n\
             To disable this requirement, rename `{marker}` to `{HEART_NOT_REQUIRED_FILE_NAME}`."
        ),
    }
}

/// Returns the first `GITCLAW-HEART-REQUIRED.<ext>` entry name in `dir`.
/// An unreadable directory counts as no marker.
fn find_heart_required_marker(dir: &Path) -> Option<String> {
    let entries = std::fs::read_dir(dir).ok()?;
    let prefix = format!("{HEART_REQUIRED_MARKER_STEM}.");
    let mut matches = entries
        .filter_map(Result::ok)
        .filter_map(|entry| entry.file_name().into_string().ok())
        .filter(|name| {
            name.strip_prefix(prefix.as_str())
                .is_some_and(|extension| !extension.is_empty())
        })
        .collect::<Vec<_>>();
    matches.sort();
    matches.into_iter().next()
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use gitclaw_github::TriggerEventKind;
    use tempfile::tempdir;

    use super::{
        body_contains_heart, evaluate_gates, AdmissionGate, GateContext, GateDecision,
        ENABLED_SENTINEL_FILE_NAME,
    };
    use crate::runtime_layout::{GitclawLayout, DEFAULT_GITCLAW_DIR_NAME};

    fn layout_with_markers(root: &Path, markers: &[&str]) -> GitclawLayout {
        let layout = GitclawLayout::new(root, DEFAULT_GITCLAW_DIR_NAME);
        std::fs::create_dir_all(layout.gitclaw_dir()).expect("gitclaw dir");
        for marker in markers {
            std::fs::write(layout.gitclaw_dir().join(marker), "").expect("marker");
        }
        layout
    }

    fn opened(body: Option<&str>) -> GateContext<'_> {
        GateContext {
            event_kind: Some(TriggerEventKind::IssueOpened),
            body,
        }
    }

    #[test]
    fn unit_body_contains_heart_matches_heart_block_variants() {
        for body in [
            "Please fix the bug ❤️",
            "plain ❤ heart",
            "suit ♥",
            "suit with selector ♥️",
            "outline ♡",
            "exclamation ❣",
            "💓💔💕💖💗💘",
            "💙💚💛💜💝💞💟",
            "🖤 🤍 🤎 🧡",
            "🩵 🩶 🩷",
            "fire ❤️‍🔥",
        ] {
            assert!(body_contains_heart(body), "expected heart in {body:?}");
        }
    }

    #[test]
    fn unit_body_contains_heart_rejects_bodies_without_hearts() {
        for body in ["", "no hearts here", "<3", "😍 love it", "💌 letter", "🩸"] {
            assert!(!body_contains_heart(body), "unexpected heart in {body:?}");
        }
    }

    #[test]
    fn functional_sentinel_gate_passes_only_when_marker_exists() {
        let temp = tempdir().expect("tempdir");
        let layout = layout_with_markers(temp.path(), &[]);
        let gate = AdmissionGate::enabled_sentinel(&layout);

        let decision = gate.evaluate(&GateContext::default());
        assert_eq!(
            decision,
            GateDecision::Block {
                reason: "GitClaw disabled by missing .GITCLAW-ENABLED.md".to_string()
            }
        );

        std::fs::write(layout.gitclaw_dir().join(ENABLED_SENTINEL_FILE_NAME), "on")
            .expect("sentinel");
        assert!(gate.evaluate(&GateContext::default()).is_pass());
    }

    #[test]
    fn functional_heart_gate_always_passes_without_marker() {
        let temp = tempdir().expect("tempdir");
        let layout = layout_with_markers(temp.path(), &["GITCLAW-HEART-NOT-REQUIRED.md"]);
        let gate = AdmissionGate::heart_content(&layout);
        assert!(gate.evaluate(&opened(Some("no heart"))).is_pass());
        assert!(gate.evaluate(&opened(None)).is_pass());
    }

    #[test]
    fn functional_heart_gate_blocks_new_issue_without_heart_when_active() {
        let temp = tempdir().expect("tempdir");
        let layout = layout_with_markers(temp.path(), &["GITCLAW-HEART-REQUIRED.md"]);
        let gate = AdmissionGate::heart_content(&layout);

        let blocked = gate.evaluate(&opened(Some("please help")));
        assert!(!blocked.is_pass());
        assert!(blocked.reason().contains("GITCLAW-HEART-REQUIRED.md"));
        assert!(gate.evaluate(&opened(Some("please help 💜"))).is_pass());
    }

    #[test]
    fn regression_heart_gate_blocks_missing_body_when_active() {
        let temp = tempdir().expect("tempdir");
        let layout = layout_with_markers(temp.path(), &["GITCLAW-HEART-REQUIRED.txt"]);
        let gate = AdmissionGate::heart_content(&layout);
        assert!(!gate.evaluate(&opened(None)).is_pass());
    }

    #[test]
    fn functional_heart_gate_ignores_comment_events_and_unknown_events() {
        let temp = tempdir().expect("tempdir");
        let layout = layout_with_markers(temp.path(), &["GITCLAW-HEART-REQUIRED.md"]);
        let gate = AdmissionGate::heart_content(&layout);
        let comment = GateContext {
            event_kind: Some(TriggerEventKind::CommentAdded),
            body: Some("no heart at all"),
        };
        assert!(gate.evaluate(&comment).is_pass());
        let unknown = GateContext {
            event_kind: None,
            body: None,
        };
        assert!(gate.evaluate(&unknown).is_pass());
    }

    #[test]
    fn regression_heart_marker_requires_non_empty_extension() {
        let temp = tempdir().expect("tempdir");
        let layout = layout_with_markers(
            temp.path(),
            &["GITCLAW-HEART-REQUIRED", "GITCLAW-HEART-REQUIRED."],
        );
        let gate = AdmissionGate::heart_content(&layout);
        assert!(gate.evaluate(&opened(Some("no heart"))).is_pass());
    }

    #[test]
    fn regression_heart_gate_passes_when_marker_dir_is_missing() {
        let temp = tempdir().expect("tempdir");
        let gate = AdmissionGate::HeartContent {
            marker_dir: temp.path().join("does-not-exist"),
        };
        assert!(gate.evaluate(&opened(Some(""))).is_pass());
    }

    #[test]
    fn integration_evaluate_gates_stops_at_first_block() {
        let temp = tempdir().expect("tempdir");
        let layout = layout_with_markers(temp.path(), &["GITCLAW-HEART-REQUIRED.md"]);
        let gates = [
            AdmissionGate::enabled_sentinel(&layout),
            AdmissionGate::heart_content(&layout),
        ];
        let decision = evaluate_gates(&gates, &opened(Some("no heart")));
        assert!(decision.reason().contains(".GITCLAW-ENABLED.md"));

        std::fs::write(layout.gitclaw_dir().join(ENABLED_SENTINEL_FILE_NAME), "")
            .expect("sentinel");
        let decision = evaluate_gates(&gates, &opened(Some("no heart")));
        assert!(decision.reason().contains("heart emoji"));
        assert!(evaluate_gates(&gates, &opened(Some("ok ❤️"))).is_pass());
    }
}
