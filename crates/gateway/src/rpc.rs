//! RPC dispatcher (§4.7): client-side pending-request map with timeout, and
//! server-side routing of requests to registered service handlers.

use std::{collections::HashMap, sync::Arc};

use async_trait::async_trait;
use tokio::sync::oneshot;
use uuid::Uuid;
use vargos_protocol::{error_codes, ErrorShape, RequestFrame, ResponseFrame, RPC_TIMEOUT_MS};

/// A handler a service exposes for one RPC method.
#[async_trait]
pub trait ServiceHandler: Send + Sync {
    async fn handle(&self, method: &str, params: Option<serde_json::Value>) -> ResponseFrame;
}

/// Server side: routes requests to the named service's handler.
#[derive(Default)]
pub struct RpcServer {
    handlers: HashMap<String, Arc<dyn ServiceHandler>>,
}

impl RpcServer {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, service: impl Into<String>, handler: Arc<dyn ServiceHandler>) {
        self.handlers.insert(service.into(), handler);
    }

    pub fn deregister(&mut self, service: &str) {
        self.handlers.remove(service);
    }

    /// Route `request` to its target's handler, defaulting unregistered
    /// targets to `SERVICE_UNAVAILABLE` and handler panics/errors to
    /// `INTERNAL` (the handler is expected to set its own error code on
    /// recoverable failures).
    pub async fn dispatch(&self, request: RequestFrame) -> ResponseFrame {
        let Some(handler) = self.handlers.get(&request.target) else {
            return ResponseFrame::err(
                request.id,
                ErrorShape::new(
                    error_codes::SERVICE_UNAVAILABLE,
                    format!("service '{}' is not registered", request.target),
                ),
            );
        };
        handler.handle(&request.method, request.params).await
    }
}

#[derive(Debug, thiserror::Error)]
pub enum RpcError {
    #[error("request timed out after {0}ms")]
    Timeout(u64),
    #[error("{code}: {message}")]
    Remote { code: String, message: String },
    #[error("pending response channel closed before settling")]
    ChannelClosed,
}

impl From<ErrorShape> for RpcError {
    fn from(shape: ErrorShape) -> Self {
        RpcError::Remote {
            code: shape.code,
            message: shape.message,
        }
    }
}

struct Pending {
    resolve: oneshot::Sender<ResponseFrame>,
}

/// Client side: generates request ids, tracks pending calls, and settles
/// them on a matching response or a timeout — whichever comes first.
#[derive(Default)]
pub struct RpcClient {
    pending: std::sync::Mutex<HashMap<String, Pending>>,
}

impl RpcClient {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a pending call and return the frame to send plus a future
    /// that resolves when the matching response arrives or the deadline
    /// passes.
    pub fn begin_call(
        &self,
        target: impl Into<String>,
        method: impl Into<String>,
        params: Option<serde_json::Value>,
    ) -> (RequestFrame, oneshot::Receiver<ResponseFrame>) {
        let id = Uuid::new_v4().to_string();
        let (tx, rx) = oneshot::channel();
        self.pending
            .lock().unwrap_or_else(|e| e.into_inner())
            .insert(id.clone(), Pending { resolve: tx });
        (
            RequestFrame {
                id,
                target: target.into(),
                method: method.into(),
                params,
            },
            rx,
        )
    }

    /// Settle the pending call matching `response.id`, if any (invariant:
    /// at most one outstanding request per id within a connection).
    pub fn settle(&self, response: ResponseFrame) {
        let pending = self
            .pending
            .lock().unwrap_or_else(|e| e.into_inner())
            .remove(&response.id);
        if let Some(pending) = pending {
            let _ = pending.resolve.send(response);
        }
    }

    /// Drop a pending call without settling it (used when its owning
    /// connection is torn down).
    pub fn cancel(&self, id: &str) {
        self.pending
            .lock().unwrap_or_else(|e| e.into_inner())
            .remove(id);
    }

    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.pending.lock().unwrap_or_else(|e| e.into_inner()).len()
    }
}

/// Await `rx` up to `timeout_ms` (defaults to `RPC_TIMEOUT_MS`), converting
/// a missed deadline into `RpcError::Timeout` and an error response into
/// `RpcError::Remote`.
pub async fn call_with_timeout(
    client: &RpcClient,
    id: String,
    rx: oneshot::Receiver<ResponseFrame>,
    timeout_ms: Option<u64>,
) -> Result<serde_json::Value, RpcError> {
    let timeout_ms = timeout_ms.unwrap_or(RPC_TIMEOUT_MS);
    let outcome = tokio::time::timeout(
        tokio::time::Duration::from_millis(timeout_ms),
        rx,
    )
    .await;

    match outcome {
        Ok(Ok(response)) => {
            if response.ok {
                Ok(response.payload.unwrap_or(serde_json::Value::Null))
            } else {
                Err(response
                    .error
                    .unwrap_or_else(|| ErrorShape::new(error_codes::INTERNAL, "unknown error"))
                    .into())
            }
        },
        Ok(Err(_)) => Err(RpcError::ChannelClosed),
        Err(_) => {
            client.cancel(&id);
            Err(RpcError::Timeout(timeout_ms))
        },
    }
}
