//! `SessionMessage` — a single message stored in arrival order per session
//! (§3 of the specification).

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    User,
    Assistant,
    System,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionMessage {
    pub role: MessageRole,
    pub content: String,
    pub timestamp: i64,
    #[serde(default)]
    pub metadata: serde_json::Value,
}

impl SessionMessage {
    #[must_use]
    pub fn new(role: MessageRole, content: impl Into<String>, timestamp: i64) -> Self {
        Self {
            role,
            content: content.into(),
            timestamp,
            metadata: serde_json::Value::Null,
        }
    }

    #[must_use]
    pub fn user(content: impl Into<String>, timestamp: i64) -> Self {
        Self::new(MessageRole::User, content, timestamp)
    }

    #[must_use]
    pub fn assistant(content: impl Into<String>, timestamp: i64) -> Self {
        Self::new(MessageRole::Assistant, content, timestamp)
    }

    #[must_use]
    pub fn system(content: impl Into<String>, timestamp: i64) -> Self {
        Self::new(MessageRole::System, content, timestamp)
    }
}
