//! Concrete `AgentService`/`SessionService`/`SystemInfoService`
//! implementations backed by the Gateway's own `SessionQueue`/
//! `SessionStore`/`GatewayState`, wired into the `Services` bundle
//! `local_dispatch` answers RPC calls from so callers see real session and
//! connection state instead of the `Noop*` placeholders `vargos-service-traits`
//! ships for standalone testing (§4.7, §4.9, §10).

use std::sync::{Arc, Weak};
use std::time::Instant;

use async_trait::async_trait;
use serde_json::{json, Value};
use vargos_service_traits::{AgentService, ServiceError, ServiceResult, SessionService, SystemInfoService};
use vargos_sessions::{MessageRole, SessionMessage, SessionStore};

use crate::session_queue::{QueuedMessage, SessionQueue};
use crate::state::GatewayState;

fn session_key_param(params: &Value) -> Result<String, ServiceError> {
    params
        .get("sessionKey")
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| ServiceError::message("missing 'sessionKey' parameter"))
}

fn role_str(role: MessageRole) -> &'static str {
    match role {
        MessageRole::User => "user",
        MessageRole::Assistant => "assistant",
        MessageRole::System => "system",
    }
}

/// Held as a `Weak` because it is constructed before the `SessionQueue` it
/// drives exists (`agent_bridge::build`'s `Arc::new_cyclic` wiring).
pub struct GatewayAgentService {
    pub session_queue: Weak<SessionQueue>,
}

#[async_trait]
impl AgentService for GatewayAgentService {
    /// Enqueue a message for `params.sessionKey` and return immediately;
    /// the session queue's own arbitration (§4.9) decides whether it starts
    /// a run now or waits for the current one to finish.
    async fn run(&self, params: Value) -> ServiceResult {
        let session_key = session_key_param(&params)?;
        let message = params
            .get("message")
            .and_then(Value::as_str)
            .ok_or_else(|| ServiceError::message("missing 'message' parameter"))?
            .to_string();
        let queue = self
            .session_queue
            .upgrade()
            .ok_or_else(|| ServiceError::message("gateway shut down"))?;
        queue
            .enqueue(QueuedMessage {
                session_key: session_key.clone(),
                content: message,
                enqueued_at: chrono::Utc::now().timestamp_millis(),
                source: "rpc:agent.run".to_string(),
            })
            .await;
        Ok(json!({ "sessionKey": session_key, "enqueued": true }))
    }

    /// Same as `run`, but polls until the session is idle again before
    /// returning. There is no completion future to await directly — the
    /// queue only tracks whether a run is in flight — so this is a bounded
    /// poll loop rather than a true wakeup.
    async fn run_wait(&self, params: Value) -> ServiceResult {
        let session_key = session_key_param(&params)?;
        self.run(params).await?;
        let queue = self
            .session_queue
            .upgrade()
            .ok_or_else(|| ServiceError::message("gateway shut down"))?;
        for _ in 0..600 {
            if !queue.is_running(&session_key).await {
                return Ok(json!({ "sessionKey": session_key, "completed": true }));
            }
            tokio::time::sleep(std::time::Duration::from_millis(100)).await;
        }
        Err(ServiceError::message("timed out waiting for run to complete"))
    }

    async fn cancel(&self, session_key: &str) -> ServiceResult {
        let Some(queue) = self.session_queue.upgrade() else {
            return Ok(json!({ "cancelled": false }));
        };
        Ok(json!({ "cancelled": queue.cancel(session_key).await }))
    }

    async fn active_session_keys(&self) -> Vec<String> {
        let Some(queue) = self.session_queue.upgrade() else {
            return Vec::new();
        };
        queue.active_session_keys().await
    }
}

pub struct GatewaySessionService {
    pub sessions: Arc<dyn SessionStore>,
}

#[async_trait]
impl SessionService for GatewaySessionService {
    async fn list(&self) -> ServiceResult {
        let sessions = self.sessions.list().await;
        Ok(json!(
            sessions
                .into_iter()
                .map(|s| json!({ "sessionKey": s.session_key, "kind": s.kind, "label": s.label }))
                .collect::<Vec<_>>()
        ))
    }

    async fn history(&self, session_key: &str) -> ServiceResult {
        let history = self.sessions.history(session_key).await;
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

    async fn append_message(&self, session_key: &str, message: Value) -> ServiceResult {
        let role = match message.get("role").and_then(Value::as_str) {
            Some("assistant") => MessageRole::Assistant,
            Some("system") => MessageRole::System,
            _ => MessageRole::User,
        };
        let content = message
            .get("content")
            .and_then(Value::as_str)
            .ok_or_else(|| ServiceError::message("missing 'content' field"))?
            .to_string();
        let now = chrono::Utc::now().timestamp_millis();
        self.sessions
            .append_message(session_key, SessionMessage::new(role, content, now), now)
            .await;
        Ok(json!({ "ok": true }))
    }

    async fn delete(&self, session_key: &str) -> ServiceResult {
        Ok(json!({ "deleted": self.sessions.delete(session_key).await }))
    }
}

/// Held as a `Weak` for the same reason as `GatewayAgentService`: it is
/// built before the `GatewayState` it reports on exists.
pub struct GatewaySystemInfoService {
    pub gateway: Weak<GatewayState>,
    pub started_at: Instant,
}

#[async_trait]
impl SystemInfoService for GatewaySystemInfoService {
    async fn health(&self) -> ServiceResult {
        let connections = self
            .gateway
            .upgrade()
            .map_or(0, |gateway| gateway.connection_count());
        Ok(json!({
            "ok": true,
            "connections": connections,
            "uptimeSeconds": self.started_at.elapsed().as_secs(),
        }))
    }
}
