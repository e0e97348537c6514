//! Event-stream parsing and final-reply extraction for agent output.

use serde_json::Value;

pub const FINAL_MESSAGE_EVENT_TYPE: &str = "message_end";
const TEXT_SEGMENT_TYPE: &str = "text";

#[derive(Debug, Clone, PartialEq)]
pub struct AgentEvent {
    /// Zero-based emission order among parsed events.
    pub sequence: usize,
    pub event_type: String,
    pub payload: Value,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct AgentEventStream {
    events: Vec<AgentEvent>,
    skipped_lines: usize,
}

impl AgentEventStream {
    /// Parses newline-delimited JSON. Blank lines, non-JSON lines, and records
    /// without a string `type` are counted as skipped.
    pub fn from_ndjson(raw: &[u8]) -> Self {
        let text = String::from_utf8_lossy(raw);
        let mut stream = Self::default();
        for line in text.lines() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let parsed = serde_json::from_str::<Value>(line).ok().and_then(|payload| {
                let event_type = payload.get("type")?.as_str()?.to_string();
                Some((event_type, payload))
            });
            match parsed {
                Some((event_type, payload)) => {
                    let sequence = stream.events.len();
                    stream.events.push(AgentEvent {
                        sequence,
                        event_type,
                        payload,
                    });
                }
                None => stream.skipped_lines = stream.skipped_lines.saturating_add(1),
            }
        }
        stream
    }

    pub fn events(&self) -> &[AgentEvent] {
        &self.events
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn skipped_lines(&self) -> usize {
        self.skipped_lines
    }
}

/// Text of the last `message_end` event; empty when the stream has none.
pub fn extract_final_reply(stream: &AgentEventStream) -> String {
    stream
        .events()
        .iter()
        .filter(|event| event.event_type == FINAL_MESSAGE_EVENT_TYPE)
        .max_by_key(|event| event.sequence)
        .map(|event| collect_text_segments(&event.payload))
        .unwrap_or_default()
}

fn collect_text_segments(payload: &Value) -> String {
    payload
        .get("message")
        .and_then(|message| message.get("content"))
        .and_then(Value::as_array)
        .map(|segments| {
            segments
                .iter()
                .filter(|segment| {
                    segment.get("type").and_then(Value::as_str) == Some(TEXT_SEGMENT_TYPE)
                })
                .filter_map(|segment| segment.get("text").and_then(Value::as_str))
                .collect::<Vec<_>>()
                .join("\n")
        })
        .unwrap_or_default()
}
