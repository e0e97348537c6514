//! Low-level utilities shared across GitClaw crates.
//!
//! Provides the atomic file-write helper used for session records and feedback
//! handoffs, plus the clock helpers that stamp them.

pub mod atomic_io;
pub mod time_utils;

pub use atomic_io::write_text_atomic;
pub use time_utils::{current_rfc3339_timestamp, current_unix_timestamp_ms};
