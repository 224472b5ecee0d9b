//! Capability interface the Gateway injects into every agent run.
//!
//! `vargos-agents` must never depend on `vargos-gateway` — the cycle
//! (gateway constructs runs, runs call back into gateway-registered
//! services) is broken by handing the runner a trait object instead of a
//! concrete Gateway reference (§9 Design Notes).

use async_trait::async_trait;
use serde_json::Value;

#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error("tool '{0}' is forbidden for this session")]
    Forbidden(String),
    #[error("service unavailable: {0}")]
    ServiceUnavailable(String),
    #[error("{0}")]
    Internal(String),
}

/// Routes a tool call to the service registered under that tool's name,
/// over the Gateway's RPC dispatcher (§4.7, §4.10).
#[async_trait]
pub trait ToolDispatch: Send + Sync {
    async fn dispatch(
        &self,
        session_key: &str,
        tool_name: &str,
        arguments: Value,
    ) -> Result<Value, DispatchError>;
}
