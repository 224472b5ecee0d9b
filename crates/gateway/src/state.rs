//! Shared gateway state: the service registry, event bus, session queue,
//! and the connection-routing broker that ties request/response frames
//! across independent WebSocket connections (§4.6, §4.7, §4.8).
//!
//! A registered service is not necessarily local code — it is whichever
//! connection declared it at registration time. Routing a `Request` means
//! finding that connection and forwarding the frame over the wire; the
//! `pending` map is what lets a `Response` arriving on connection B find its
//! way back to the connection A that originated the call.

use std::{
    collections::HashMap,
    sync::{Arc, Mutex as StdMutex},
};

use dashmap::DashMap;
use tokio::sync::{oneshot, Mutex};
use tokio_util::sync::CancellationToken;
use vargos_protocol::{error_codes, ErrorShape, RequestFrame, ResponseFrame, ServiceRegistration};
use vargos_service_traits::Services;

use crate::{event_bus::EventBus, registry::ServiceRegistry, session_queue::SessionQueue};

/// Where a pending call's response should be delivered.
enum Origin {
    /// Forward the response frame to this connection's outbound queue.
    Connection(String),
    /// Settle an in-process caller (e.g. the agent runner dispatching a
    /// tool call) waiting on this oneshot.
    Local(oneshot::Sender<ResponseFrame>),
}

struct PendingCall {
    origin: Origin,
    target_conn: String,
}

struct Connection {
    outbound: tokio::sync::mpsc::UnboundedSender<String>,
    cancel: CancellationToken,
}

/// Shared, `Arc`-wrapped state every connection task and background service
/// holds a handle to. Constructed once at boot (§9 Design Notes — explicit
/// values passed through a shared context, not module-level singletons).
pub struct GatewayState {
    pub registry: Mutex<ServiceRegistry>,
    pub event_bus: Arc<EventBus>,
    pub session_queue: Arc<SessionQueue>,
    pub services: Arc<Services>,
    connections: DashMap<String, Connection>,
    pending: StdMutex<HashMap<String, PendingCall>>,
    pub shutdown: CancellationToken,
}

impl GatewayState {
    #[must_use]
    pub fn new(event_bus: Arc<EventBus>, session_queue: Arc<SessionQueue>, services: Arc<Services>) -> Self {
        Self {
            registry: Mutex::new(ServiceRegistry::new()),
            event_bus,
            session_queue,
            services,
            connections: DashMap::new(),
            pending: StdMutex::new(HashMap::new()),
            shutdown: CancellationToken::new(),
        }
    }

    /// Track a newly connected socket's outbound queue, returning a token the
    /// connection task should select on to detect a server-initiated close
    /// (backpressure eviction or shutdown).
    pub fn register_connection(
        &self,
        conn_id: &str,
        outbound: tokio::sync::mpsc::UnboundedSender<String>,
    ) -> CancellationToken {
        let cancel = self.shutdown.child_token();
        self.connections.insert(
            conn_id.to_string(),
            Connection {
                outbound,
                cancel: cancel.clone(),
            },
        );
        cancel
    }

    /// Tear down everything owned by `conn_id`: its registry entries (with
    /// `SERVICE_UNAVAILABLE` errors sent to any caller still waiting on a
    /// request it owned), its event subscriptions, and its outbound queue.
    pub async fn remove_connection(&self, conn_id: &str) {
        let removed_services = self.registry.lock().await.deregister_connection(conn_id);
        self.event_bus.unsubscribe(conn_id);
        self.connections.remove(conn_id);

        if removed_services.is_empty() {
            return;
        }
        let stale_ids: Vec<String> = {
            let pending = self.pending.lock().unwrap_or_else(|e| e.into_inner());
            pending
                .iter()
                .filter(|(_, call)| call.target_conn == conn_id)
                .map(|(id, _)| id.clone())
                .collect()
        };
        for id in stale_ids {
            let call = {
                let mut pending = self.pending.lock().unwrap_or_else(|e| e.into_inner());
                pending.remove(&id)
            };
            if let Some(call) = call {
                let response = ResponseFrame::err(
                    id,
                    ErrorShape::new(
                        error_codes::SERVICE_UNAVAILABLE,
                        format!("service connection '{conn_id}' closed"),
                    ),
                );
                self.deliver(call.origin, response);
            }
        }
    }

    /// Force-disconnect `conn_id` (event-bus backpressure eviction, §4.8).
    pub fn evict(&self, conn_id: &str) {
        if let Some(conn) = self.connections.get(conn_id) {
            conn.cancel.cancel();
        }
    }

    pub async fn register_service(
        &self,
        conn_id: &str,
        registration: ServiceRegistration,
    ) -> Result<(), ErrorShape> {
        self.registry
            .lock()
            .await
            .register(registration, conn_id)
            .map_err(Into::into)
    }

    /// Route `request` originating from `origin_conn_id`: to a registered
    /// remote service if one owns `(target, method)`, otherwise to the
    /// gateway's built-in local services (§10 of the full specification).
    /// Replies either forward a frame to the caller directly (local
    /// dispatch) or park the call in `pending` until the remote service's
    /// `Response` arrives.
    pub async fn route_request(&self, origin_conn_id: &str, request: RequestFrame) {
        let target_conn = self
            .registry
            .lock()
            .await
            .resolve_method(&request.target, &request.method)
            .map(str::to_string);

        if let Some(target_conn) = target_conn {
            let id = request.id.clone();
            {
                let mut pending = self.pending.lock().unwrap_or_else(|e| e.into_inner());
                pending.insert(
                    id,
                    PendingCall {
                        origin: Origin::Connection(origin_conn_id.to_string()),
                        target_conn: target_conn.clone(),
                    },
                );
            }
            self.send_to(&target_conn, &vargos_protocol::Frame::Request(request));
            return;
        }

        let response = crate::local_dispatch::dispatch(&self.services, request).await;
        self.send_to(origin_conn_id, &vargos_protocol::Frame::Response(response));
    }

    /// Issue a request against a registered service from in-process code
    /// (the agent runner's tool dispatch), bypassing the WebSocket entirely
    /// when the target resolves to a local built-in service.
    pub async fn call_local_or_remote(
        &self,
        request: RequestFrame,
        timeout_ms: u64,
    ) -> Result<serde_json::Value, ErrorShape> {
        let target_conn = self
            .registry
            .lock()
            .await
            .resolve_method(&request.target, &request.method)
            .map(str::to_string);

        let Some(target_conn) = target_conn else {
            let response = crate::local_dispatch::dispatch(&self.services, request).await;
            return response
                .payload
                .ok_or_else(|| ErrorShape::new(error_codes::INTERNAL, "empty response payload"))
                .or_else(|_| {
                    response
                        .error
                        .map_or_else(|| Ok(serde_json::Value::Null), Err)
                });
        };

        let (tx, rx) = oneshot::channel();
        let id = request.id.clone();
        {
            let mut pending = self.pending.lock().unwrap_or_else(|e| e.into_inner());
            pending.insert(
                id.clone(),
                PendingCall {
                    origin: Origin::Local(tx),
                    target_conn: target_conn.clone(),
                },
            );
        }
        self.send_to(&target_conn, &vargos_protocol::Frame::Request(request));

        let outcome = tokio::time::timeout(std::time::Duration::from_millis(timeout_ms), rx).await;
        match outcome {
            Ok(Ok(response)) if response.ok => {
                Ok(response.payload.unwrap_or(serde_json::Value::Null))
            },
            Ok(Ok(response)) => Err(response
                .error
                .unwrap_or_else(|| ErrorShape::new(error_codes::INTERNAL, "unknown error"))),
            Ok(Err(_)) => Err(ErrorShape::new(error_codes::INTERNAL, "caller dropped")),
            Err(_) => {
                self.pending.lock().unwrap_or_else(|e| e.into_inner()).remove(&id);
                Err(ErrorShape::new(error_codes::TIMEOUT, "request timed out"))
            },
        }
    }

    /// A connected service answering a request the gateway forwarded to it.
    pub fn settle_response(&self, response: ResponseFrame) {
        let call = {
            let mut pending = self.pending.lock().unwrap_or_else(|e| e.into_inner());
            pending.remove(&response.id)
        };
        if let Some(call) = call {
            self.deliver(call.origin, response);
        }
    }

    fn deliver(&self, origin: Origin, response: ResponseFrame) {
        match origin {
            Origin::Connection(conn_id) => {
                self.send_to(&conn_id, &vargos_protocol::Frame::Response(response));
            },
            Origin::Local(tx) => {
                let _ = tx.send(response);
            },
        }
    }

    /// Publish `payload` under `(source, event)` and fan it out to every
    /// subscriber. Subscribers the bus drops for backpressure are forcibly
    /// disconnected so they reconnect with a fresh subscription (§4.8).
    pub fn publish(&self, source: &str, event: &str, payload: serde_json::Value) {
        let (_, dropped) = self.event_bus.publish(source, event, payload);
        for conn_id in dropped {
            self.evict(&conn_id);
        }
    }

    /// Subscribe a connection to its declared topics and spawn the task that
    /// forwards published events onto its outbound queue until the bus
    /// drops it or the socket closes.
    pub fn spawn_event_forwarder(&self, conn_id: &str, topics: Vec<String>) {
        let mut rx = self.event_bus.subscribe(conn_id.to_string(), topics);
        let Some(conn) = self.connections.get(conn_id) else {
            return;
        };
        let outbound = conn.outbound.clone();
        tokio::spawn(async move {
            while let Some(frame) = rx.recv().await {
                let Ok(raw) = vargos_protocol::serialize_frame(&vargos_protocol::Frame::Event(frame))
                else {
                    continue;
                };
                if outbound.send(raw).is_err() {
                    break;
                }
            }
        });
    }

    fn send_to(&self, conn_id: &str, frame: &vargos_protocol::Frame) {
        let Some(conn) = self.connections.get(conn_id) else {
            return;
        };
        if let Ok(raw) = vargos_protocol::serialize_frame(frame) {
            let _ = conn.outbound.send(raw);
        }
    }

    #[must_use]
    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use vargos_service_traits::Services;

    struct NoopStarter;

    #[async_trait::async_trait]
    impl crate::session_queue::RunStarter for NoopStarter {
        async fn start_run(&self, _message: crate::session_queue::QueuedMessage, _cancel: Arc<tokio::sync::Notify>) {}
    }

    fn state() -> Arc<GatewayState> {
        Arc::new(GatewayState::new(
            Arc::new(EventBus::new()),
            Arc::new(SessionQueue::new(Arc::new(NoopStarter))),
            Arc::new(Services::default()),
        ))
    }

    #[tokio::test]
    async fn register_service_then_duplicate_fails() {
        let state = state();
        let reg = ServiceRegistration {
            service: "agent".into(),
            version: 1,
            methods: vec!["run".into()],
            events: vec![],
            subscriptions: vec![],
        };
        state.register_service("conn-1", reg.clone()).await.unwrap();
        assert!(state.register_service("conn-2", reg).await.is_err());
    }

    #[tokio::test]
    async fn remove_connection_errors_out_pending_calls_targeting_it() {
        let state = state();
        state
            .register_service(
                "svc-conn",
                ServiceRegistration {
                    service: "agent".into(),
                    version: 1,
                    methods: vec!["run".into()],
                    events: vec![],
                    subscriptions: vec![],
                },
            )
            .await
            .unwrap();

        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        state.register_connection("caller-conn", tx);

        state
            .route_request(
                "caller-conn",
                RequestFrame {
                    id: uuid::Uuid::new_v4().to_string(),
                    target: "agent".into(),
                    method: "run".into(),
                    params: None,
                },
            )
            .await;

        state.remove_connection("svc-conn").await;

        let raw = rx.recv().await.expect("should receive error response");
        assert!(raw.contains(vargos_protocol::error_codes::SERVICE_UNAVAILABLE));
    }

    #[tokio::test]
    async fn unregistered_target_falls_back_to_local_dispatch() {
        let state = state();
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        state.register_connection("caller-conn", tx);

        state
            .route_request(
                "caller-conn",
                RequestFrame {
                    id: uuid::Uuid::new_v4().to_string(),
                    target: "sessions".into(),
                    method: "list".into(),
                    params: None,
                },
            )
            .await;

        let raw = rx.recv().await.expect("should receive local response");
        assert!(raw.contains("\"ok\":true"));
    }
}
