//! Issue lifecycle runtime for GitClaw.
//!
//! Gates decide whether a triggered run may proceed; the lifecycle runtime then
//! resumes or starts the per-issue agent session, publishes the resulting
//! repository state, posts the reply, and removes the acknowledgement.

pub mod admission_gate;
pub mod agent_invoker;
pub mod cleanup_finalizer;
pub mod feedback_signal;
pub mod issue_lifecycle;
pub mod issue_session_store;
pub mod reply_extractor;
pub mod reply_publisher;
pub mod runtime_layout;
pub mod state_publisher;

#[cfg(test)]
mod test_support;

pub use admission_gate::{
    body_contains_heart, evaluate_gates, AdmissionGate, GateContext, GateDecision,
    ENABLED_SENTINEL_FILE_NAME,
};
pub use agent_invoker::{build_prompt, AgentInvoker, AgentInvokerConfig, AgentRun};
pub use cleanup_finalizer::{finalize, CleanupOutcome, HandoffSource};
pub use feedback_signal::{
    signal_acknowledgement, signal_and_record, FeedbackHandoff, FeedbackHandoffStore,
    ReactionTargetKind, ACKNOWLEDGEMENT_REACTION,
};
pub use issue_lifecycle::{IssueLifecycleConfig, IssueLifecycleRuntime, IssueRunReport};
pub use issue_session_store::{
    IssueSessionRecord, IssueSessionStore, SessionArtifactSnapshot, SessionMode,
};
pub use reply_extractor::{extract_final_reply, AgentEvent, AgentEventStream};
pub use reply_publisher::{EmptyReplyPolicy, ReplyPublication, ReplyPublisher};
pub use runtime_layout::{GitclawLayout, DEFAULT_GITCLAW_DIR_NAME};
pub use state_publisher::{
    GitCommandRunner, ProcessGitCommandRunner, StatePublishError, StatePublishOutcome,
    StatePublisher, StatePublisherConfig,
};
