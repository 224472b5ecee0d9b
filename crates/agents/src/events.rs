//! Stream events emitted over the course of a single agent run (§4.10).

use serde::{Deserialize, Serialize};
use vargos_protocol::ErrorShape;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssistantStreamEvent {
    pub session_key: String,
    pub delta: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolStreamEvent {
    pub session_key: String,
    pub call_id: String,
    pub tool_name: String,
    pub arguments: serde_json::Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompactionStreamEvent {
    pub session_key: String,
    pub summarized_messages: usize,
}

/// Terminal `run.completed` event published on the event bus when a run
/// reaches `completed` or `failed`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunCompletedEvent {
    pub session_key: String,
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorShape>,
}

impl RunCompletedEvent {
    #[must_use]
    pub fn ok(session_key: impl Into<String>) -> Self {
        Self {
            session_key: session_key.into(),
            ok: true,
            error: None,
        }
    }

    #[must_use]
    pub fn err(session_key: impl Into<String>, error: ErrorShape) -> Self {
        Self {
            session_key: session_key.into(),
            ok: false,
            error: Some(error),
        }
    }
}

/// The union of everything a run can emit, in the order the lifecycle table
/// allows them to occur.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RunEvent {
    Assistant(AssistantStreamEvent),
    Tool(ToolStreamEvent),
    Compaction(CompactionStreamEvent),
    Completed(RunCompletedEvent),
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn run_completed_ok_has_no_error() {
        let event = RunCompletedEvent::ok("cli:chat");
        assert!(event.ok);
        assert!(event.error.is_none());
    }

    #[test]
    fn run_event_tags_discriminate_on_wire() {
        let event = RunEvent::Assistant(AssistantStreamEvent {
            session_key: "cli:chat".into(),
            delta: "hi".into(),
        });
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "assistant");
    }
}
