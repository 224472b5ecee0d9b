//! Wires the session queue's `RunStarter` capability to
//! `vargos_agents::run_agent_loop`, and the agent's `ToolDispatch` capability
//! back to the Gateway's request router (§4.9, §4.10).
//!
//! `GatewayState` and `SessionQueue` are mutually referential (a run needs
//! to call back into the gateway's RPC router, and finishing a run needs to
//! tell the queue to start the next message) without either crate depending
//! on the other's concrete type. `Arc::new_cyclic` breaks the cycle: both
//! structures are built from weak handles to each other before either is
//! fully constructed.

use std::sync::{Arc, Weak};

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::{mpsc, Notify};
use tracing::warn;
use vargos_agents::{run_agent_loop, DispatchError, LlmProvider, RunEvent, ToolDispatch, ToolRegistry};
use vargos_protocol::{RequestFrame, RPC_TIMEOUT_MS};
use vargos_service_traits::Services;
use vargos_sessions::{MessageRole, SessionMessage, SessionStore};

use crate::{
    channel_registry::{self, ChannelRegistry},
    domain_services::{GatewayAgentService, GatewaySessionService, GatewaySystemInfoService},
    event_bus::EventBus,
    session_queue::{QueuedMessage, RunStarter, SessionQueue},
    session_tools::{SessionsHistoryTool, SessionsListTool, SessionsSendTool, SessionsSpawnTool},
    state::GatewayState,
};

/// Dispatches an agent tool call to whichever registry entry owns it: a
/// tool registered locally (the four built-in session tools, or any other
/// in-process `AgentTool`) executes in-process; anything else is routed
/// through the Gateway's request router as an RPC call, so an externally
/// registered service named after the tool receives the call exactly as
/// any other RPC caller would.
struct GatewayToolDispatch {
    gateway: Weak<GatewayState>,
    tools: Arc<ToolRegistry>,
}

#[async_trait]
impl ToolDispatch for GatewayToolDispatch {
    async fn dispatch(
        &self,
        _session_key: &str,
        tool_name: &str,
        arguments: serde_json::Value,
    ) -> Result<serde_json::Value, DispatchError> {
        if let Some(tool) = self.tools.get(tool_name) {
            return tool.execute(arguments).await.map_err(DispatchError::Internal);
        }

        let Some(gateway) = self.gateway.upgrade() else {
            return Err(DispatchError::ServiceUnavailable("gateway shut down".into()));
        };
        let request = RequestFrame {
            id: uuid::Uuid::new_v4().to_string(),
            target: tool_name.to_string(),
            method: "execute".to_string(),
            params: Some(arguments),
        };
        gateway
            .call_local_or_remote(request, RPC_TIMEOUT_MS)
            .await
            .map_err(|err| DispatchError::ServiceUnavailable(err.message))
    }
}

/// Drives one queued message through a full agent run: loads history,
/// appends the user message, runs the lifecycle, persists assistant output,
/// publishes lifecycle events, and delivers the final reply through the
/// owning channel adapter.
struct GatewayRunStarter {
    gateway: Weak<GatewayState>,
    session_queue: Weak<SessionQueue>,
    provider: Arc<dyn LlmProvider>,
    tools: Arc<ToolRegistry>,
    sessions: Arc<dyn SessionStore>,
    channels: Arc<ChannelRegistry>,
}

#[async_trait]
impl RunStarter for GatewayRunStarter {
    async fn start_run(&self, message: QueuedMessage, cancel: Arc<Notify>) {
        let (Some(gateway), Some(session_queue)) =
            (self.gateway.upgrade(), self.session_queue.upgrade())
        else {
            return;
        };

        let tools = Arc::clone(&self.tools);
        let dispatch: Arc<dyn ToolDispatch> = Arc::new(GatewayToolDispatch {
            gateway: Arc::downgrade(&gateway),
            tools: Arc::clone(&tools),
        });
        let provider = Arc::clone(&self.provider);
        let sessions = Arc::clone(&self.sessions);
        let channels = Arc::clone(&self.channels);

        tokio::spawn(async move {
            let session_key = message.session_key.clone();
            let now = chrono::Utc::now().timestamp_millis();

            let history = sessions
                .history(&session_key)
                .await
                .into_iter()
                .map(|m| serde_json::json!({ "role": role_str(m.role), "content": m.content }))
                .collect::<Vec<_>>();
            sessions
                .append_message(&session_key, SessionMessage::user(message.content.clone(), now), now)
                .await;

            let (tx, mut rx) = mpsc::unbounded_channel();
            let mut final_text: Option<String> = None;
            let event_gateway = Arc::clone(&gateway);
            let event_key = session_key.clone();
            let drain = tokio::spawn(async move {
                let mut last_text: Option<String> = None;
                while let Some(event) = rx.recv().await {
                    if let RunEvent::Assistant(ref assistant) = event {
                        last_text = Some(assistant.delta.clone());
                    }
                    publish_run_event(&event_gateway, &event_key, &event);
                }
                last_text
            });

            let outcome = run_agent_loop(
                &session_key,
                provider,
                dispatch,
                &tools,
                history,
                &message.content,
                tx,
                &cancel,
            )
            .await;

            if let Ok(last_text) = drain.await {
                final_text = outcome.final_text.clone().or(last_text);
            }

            if let Some(text) = final_text {
                let stamp = chrono::Utc::now().timestamp_millis();
                sessions
                    .append_message(&session_key, SessionMessage::assistant(text.clone(), stamp), stamp)
                    .await;
                if let Err(err) = channel_registry::deliver_reply(&channels, &session_key, &text).await {
                    warn!(session_key, %err, "failed to deliver agent reply");
                }
            }

            session_queue.on_run_finished(&session_key).await;
        });
    }
}

fn role_str(role: MessageRole) -> &'static str {
    match role {
        MessageRole::User => "user",
        MessageRole::Assistant => "assistant",
        MessageRole::System => "system",
    }
}

fn publish_run_event(gateway: &Arc<GatewayState>, _session_key: &str, event: &RunEvent) {
    let (name, payload) = match event {
        RunEvent::Assistant(ev) => ("assistant_delta", serde_json::to_value(ev)),
        RunEvent::Tool(ev) => ("tool_call", serde_json::to_value(ev)),
        RunEvent::Compaction(ev) => ("compaction", serde_json::to_value(ev)),
        RunEvent::Completed(ev) => ("run_completed", serde_json::to_value(ev)),
    };
    let Ok(payload) = payload else { return };
    gateway.publish("agent", name, payload);
}

/// Assemble a fully wired `GatewayState`: event bus, session queue, tool
/// dispatch, and agent run driver all pointing at each other through weak
/// handles established before either `Arc` is complete.
///
/// `tools` is the caller's base registry (whatever tools an external
/// deployment wires in — file/shell/web/memory tools are out of scope
/// collaborators here); the four built-in `sessions_*` tools (§4.10) are
/// registered on top of it, backed by `sessions` and the session queue
/// this function constructs. The `agent`/`session` entries of `services`
/// are likewise replaced with implementations backed by the same session
/// queue and store, so RPC callers see real data rather than the
/// `Noop*` placeholders a caller that only needs channel/cron/memory/
/// system-info defaults would otherwise hand in.
#[must_use]
pub fn build(
    provider: Arc<dyn LlmProvider>,
    mut tools: ToolRegistry,
    sessions: Arc<dyn SessionStore>,
    channels: Arc<ChannelRegistry>,
    services: Arc<Services>,
) -> Arc<GatewayState> {
    Arc::new_cyclic(|gateway_weak: &Weak<GatewayState>| {
        let gateway_weak = gateway_weak.clone();
        let session_queue = Arc::new_cyclic(|queue_weak: &Weak<SessionQueue>| {
            tools.register(Arc::new(SessionsListTool {
                sessions: Arc::clone(&sessions),
            }));
            tools.register(Arc::new(SessionsHistoryTool {
                sessions: Arc::clone(&sessions),
            }));
            tools.register(Arc::new(SessionsSendTool {
                session_queue: queue_weak.clone(),
            }));
            tools.register(Arc::new(SessionsSpawnTool {
                sessions: Arc::clone(&sessions),
                session_queue: queue_weak.clone(),
            }));

            let starter = Arc::new(GatewayRunStarter {
                gateway: gateway_weak.clone(),
                session_queue: queue_weak.clone(),
                provider,
                tools: Arc::new(tools),
                sessions: Arc::clone(&sessions),
                channels,
            });
            SessionQueue::new(starter)
        });

        let merged_services = Arc::new(Services {
            agent: Arc::new(GatewayAgentService {
                session_queue: Arc::downgrade(&session_queue),
            }),
            session: Arc::new(GatewaySessionService {
                sessions: Arc::clone(&sessions),
            }),
            channel: Arc::clone(&services.channel),
            cron: Arc::clone(&services.cron),
            memory: Arc::clone(&services.memory),
            system_info: Arc::new(GatewaySystemInfoService {
                gateway: gateway_weak.clone(),
                started_at: std::time::Instant::now(),
            }),
        });

        GatewayState::new(Arc::new(EventBus::new()), session_queue, merged_services)
    })
}
