//! Built-in session-management tools: `sessions_list`, `sessions_history`,
//! `sessions_send`, `sessions_spawn` (§4.10). These are exactly the four
//! tools a subagent run denies via `SUBAGENT_DENIED_TOOLS` — registering
//! them here, backed by the real `SessionStore`/`SessionQueue`, is what
//! makes that denial meaningful rather than a gate in front of nothing.

use std::sync::{Arc, Weak};

use async_trait::async_trait;
use serde_json::{json, Value};
use vargos_agents::AgentTool;
use vargos_sessions::{MessageRole, SessionKind, SessionStore};

use crate::session_queue::{QueuedMessage, SessionQueue};

fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

fn required_str(params: &Value, field: &str) -> Result<String, String> {
    params
        .get(field)
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| format!("missing '{field}' parameter"))
}

fn role_str(role: MessageRole) -> &'static str {
    match role {
        MessageRole::User => "user",
        MessageRole::Assistant => "assistant",
        MessageRole::System => "system",
    }
}

pub struct SessionsListTool {
    pub sessions: Arc<dyn SessionStore>,
}

#[async_trait]
impl AgentTool for SessionsListTool {
    fn name(&self) -> &str {
        "sessions_list"
    }

    fn description(&self) -> &str {
        "List every known session key and its kind."
    }

    fn parameters_schema(&self) -> Value {
        json!({ "type": "object", "properties": {} })
    }

    async fn execute(&self, _params: Value) -> Result<Value, String> {
        let sessions = self.sessions.list().await;
        Ok(json!(
            sessions
                .into_iter()
                .map(|s| json!({ "sessionKey": s.session_key, "kind": s.kind }))
                .collect::<Vec<_>>()
        ))
    }
}

pub struct SessionsHistoryTool {
    pub sessions: Arc<dyn SessionStore>,
}

#[async_trait]
impl AgentTool for SessionsHistoryTool {
    fn name(&self) -> &str {
        "sessions_history"
    }

    fn description(&self) -> &str {
        "Fetch the stored message history of a session."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "required": ["sessionKey"],
            "properties": { "sessionKey": { "type": "string" } },
        })
    }

    async fn execute(&self, params: Value) -> Result<Value, String> {
        let session_key = required_str(&params, "sessionKey")?;
        let history = self.sessions.history(&session_key).await;
        Ok(json!(
            history
                .into_iter()
                .map(|m| json!({
                    "role": role_str(m.role),
                    "content": m.content,
                    "timestamp": m.timestamp,
                }))
                .collect::<Vec<_>>()
        ))
    }
}

/// Holds a `Weak<SessionQueue>` rather than an `Arc`: both tools are built
/// before the session queue exists (§9 Design Notes — the cyclic
/// gateway/queue/tool wiring in `agent_bridge::build`), so they upgrade at
/// call time and fail cleanly if the gateway has since shut down.
pub struct SessionsSendTool {
    pub session_queue: Weak<SessionQueue>,
}

#[async_trait]
impl AgentTool for SessionsSendTool {
    fn name(&self) -> &str {
        "sessions_send"
    }

    fn description(&self) -> &str {
        "Enqueue a message into another session's queue."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "required": ["sessionKey", "message"],
            "properties": {
                "sessionKey": { "type": "string" },
                "message": { "type": "string" },
            },
        })
    }

    async fn execute(&self, params: Value) -> Result<Value, String> {
        let session_key = required_str(&params, "sessionKey")?;
        let message = required_str(&params, "message")?;
        let queue = self
            .session_queue
            .upgrade()
            .ok_or_else(|| "gateway shut down".to_string())?;
        queue
            .enqueue(QueuedMessage {
                session_key: session_key.clone(),
                content: message,
                enqueued_at: now_ms(),
                source: "tool:sessions_send".to_string(),
            })
            .await;
        Ok(json!({ "sessionKey": session_key, "enqueued": true }))
    }
}

pub struct SessionsSpawnTool {
    pub sessions: Arc<dyn SessionStore>,
    pub session_queue: Weak<SessionQueue>,
}

#[async_trait]
impl AgentTool for SessionsSpawnTool {
    fn name(&self) -> &str {
        "sessions_spawn"
    }

    fn description(&self) -> &str {
        "Spawn a new subagent session seeded with an initial task message."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "required": ["task"],
            "properties": { "task": { "type": "string" } },
        })
    }

    async fn execute(&self, params: Value) -> Result<Value, String> {
        let task = required_str(&params, "task")?;
        let session_key = format!("agent:{}", uuid::Uuid::new_v4());
        let now = now_ms();
        self.sessions
            .get_or_create(&session_key, SessionKind::Subagent, now)
            .await;
        let queue = self
            .session_queue
            .upgrade()
            .ok_or_else(|| "gateway shut down".to_string())?;
        queue
            .enqueue(QueuedMessage {
                session_key: session_key.clone(),
                content: task,
                enqueued_at: now,
                source: "tool:sessions_spawn".to_string(),
            })
            .await;
        Ok(json!({ "sessionKey": session_key }))
    }
}
