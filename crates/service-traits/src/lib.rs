//! Service trait interfaces for the domain services a Gateway tool call can
//! reach over RPC (§4.7, §4.10 of the specification).
//!
//! Each trait has a `Noop` implementation so the gateway can run standalone
//! in tests before a real domain crate is wired in — concrete channel
//! adapters, memory indexing, and LLM provider integration are external
//! collaborators specified only via these interfaces.

use {async_trait::async_trait, serde_json::Value, std::sync::Arc};

/// Error type returned by service methods.
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("{message}")]
    Message { message: String },
    #[error("{0}")]
    Serde(#[from] serde_json::Error),
}

impl ServiceError {
    #[must_use]
    pub fn message(message: impl std::fmt::Display) -> Self {
        Self::Message {
            message: message.to_string(),
        }
    }
}

impl From<String> for ServiceError {
    fn from(value: String) -> Self {
        Self::message(value)
    }
}

impl From<&str> for ServiceError {
    fn from(value: &str) -> Self {
        Self::message(value)
    }
}

impl From<ServiceError> for vargos_protocol::ErrorShape {
    fn from(err: ServiceError) -> Self {
        Self::new(vargos_protocol::error_codes::SERVICE_UNAVAILABLE, err.to_string())
    }
}

pub type ServiceResult<T = Value> = Result<T, ServiceError>;

// ── Agent ────────────────────────────────────────────────────────────────────

#[async_trait]
pub trait AgentService: Send + Sync {
    /// Start an agent run for the given session/task and return immediately.
    async fn run(&self, params: Value) -> ServiceResult;
    /// Run an agent to completion and return its final result.
    async fn run_wait(&self, params: Value) -> ServiceResult;
    /// Cancel the in-flight run for a session, if any.
    async fn cancel(&self, session_key: &str) -> ServiceResult;
    /// List session keys with an active run.
    async fn active_session_keys(&self) -> Vec<String>;
}

pub struct NoopAgentService;

#[async_trait]
impl AgentService for NoopAgentService {
    async fn run(&self, _params: Value) -> ServiceResult {
        Err("agent service not configured".into())
    }

    async fn run_wait(&self, _params: Value) -> ServiceResult {
        Err("agent service not configured".into())
    }

    async fn cancel(&self, _session_key: &str) -> ServiceResult {
        Ok(serde_json::json!({ "cancelled": false }))
    }

    async fn active_session_keys(&self) -> Vec<String> {
        Vec::new()
    }
}

// ── Sessions ─────────────────────────────────────────────────────────────────

#[async_trait]
pub trait SessionService: Send + Sync {
    async fn list(&self) -> ServiceResult;
    async fn history(&self, session_key: &str) -> ServiceResult;
    async fn append_message(&self, session_key: &str, message: Value) -> ServiceResult;
    async fn delete(&self, session_key: &str) -> ServiceResult;
}

pub struct NoopSessionService;

#[async_trait]
impl SessionService for NoopSessionService {
    async fn list(&self) -> ServiceResult {
        Ok(serde_json::json!([]))
    }

    async fn history(&self, _session_key: &str) -> ServiceResult {
        Ok(serde_json::json!([]))
    }

    async fn append_message(&self, _session_key: &str, _message: Value) -> ServiceResult {
        Ok(serde_json::json!({ "ok": true }))
    }

    async fn delete(&self, _session_key: &str) -> ServiceResult {
        Ok(serde_json::json!({ "ok": true }))
    }
}

// ── Channels (out of scope concrete adapters; interface only) ───────────────

#[async_trait]
pub trait ChannelService: Send + Sync {
    async fn status(&self) -> ServiceResult;
    async fn send(&self, params: Value) -> ServiceResult;
}

pub struct NoopChannelService;

#[async_trait]
impl ChannelService for NoopChannelService {
    async fn status(&self) -> ServiceResult {
        Ok(serde_json::json!({ "channels": [] }))
    }

    async fn send(&self, _params: Value) -> ServiceResult {
        Err("no channels configured".into())
    }
}

// ── Cron ─────────────────────────────────────────────────────────────────────

#[async_trait]
pub trait CronService: Send + Sync {
    async fn list(&self) -> ServiceResult;
    async fn add(&self, params: Value) -> ServiceResult;
    async fn remove(&self, trigger_id: &str) -> ServiceResult;
}

pub struct NoopCronService;

#[async_trait]
impl CronService for NoopCronService {
    async fn list(&self) -> ServiceResult {
        Ok(serde_json::json!([]))
    }

    async fn add(&self, _params: Value) -> ServiceResult {
        Err("cron not configured".into())
    }

    async fn remove(&self, _trigger_id: &str) -> ServiceResult {
        Err("cron not configured".into())
    }
}

// ── Memory (out of scope indexing; interface only) ──────────────────────────

#[async_trait]
pub trait MemoryService: Send + Sync {
    async fn search(&self, query: &str) -> ServiceResult;
    async fn store(&self, params: Value) -> ServiceResult;
}

pub struct NoopMemoryService;

#[async_trait]
impl MemoryService for NoopMemoryService {
    async fn search(&self, _query: &str) -> ServiceResult {
        Ok(serde_json::json!([]))
    }

    async fn store(&self, _params: Value) -> ServiceResult {
        Err("memory service not configured".into())
    }
}

// ── System info ──────────────────────────────────────────────────────────────

#[async_trait]
pub trait SystemInfoService: Send + Sync {
    async fn health(&self) -> ServiceResult;
}

pub struct NoopSystemInfoService;

#[async_trait]
impl SystemInfoService for NoopSystemInfoService {
    async fn health(&self) -> ServiceResult {
        Ok(serde_json::json!({ "ok": true, "connections": 0 }))
    }
}

// ── Services bundle ──────────────────────────────────────────────────────────

/// Bundle of all domain service trait objects reachable from the RPC
/// dispatcher (§4.7) and agent tool dispatch (§4.10).
pub struct Services {
    pub agent: Arc<dyn AgentService>,
    pub session: Arc<dyn SessionService>,
    pub channel: Arc<dyn ChannelService>,
    pub cron: Arc<dyn CronService>,
    pub memory: Arc<dyn MemoryService>,
    pub system_info: Arc<dyn SystemInfoService>,
}

impl Default for Services {
    fn default() -> Self {
        Self {
            agent: Arc::new(NoopAgentService),
            session: Arc::new(NoopSessionService),
            channel: Arc::new(NoopChannelService),
            cron: Arc::new(NoopCronService),
            memory: Arc::new(NoopMemoryService),
            system_info: Arc::new(NoopSystemInfoService),
        }
    }
}
