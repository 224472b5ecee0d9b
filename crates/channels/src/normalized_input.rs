//! `NormalizedInput` — the shape every channel adapter converts its native
//! message format into before handing it to the Gateway's inbound pipeline
//! (§3, §4.12).

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InputKind {
    Text,
    Image,
    Voice,
    File,
    Video,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InputSource {
    pub channel: String,
    pub user_id: String,
    pub session_key: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NormalizedInput {
    #[serde(rename = "type")]
    pub kind: InputKind,
    pub content: String,
    #[serde(default)]
    pub metadata: serde_json::Value,
    pub source: InputSource,
    pub timestamp: i64,
}

impl NormalizedInput {
    #[must_use]
    pub fn text(
        content: impl Into<String>,
        channel: impl Into<String>,
        user_id: impl Into<String>,
        session_key: impl Into<String>,
        timestamp: i64,
    ) -> Self {
        Self {
            kind: InputKind::Text,
            content: content.into(),
            metadata: serde_json::Value::Null,
            source: InputSource {
                channel: channel.into(),
                user_id: user_id.into(),
                session_key: session_key.into(),
            },
            timestamp,
        }
    }
}
