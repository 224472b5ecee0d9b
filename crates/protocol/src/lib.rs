//! Gateway wire protocol: frame shapes, error vocabulary, and session-key
//! conventions shared by every component that speaks to the Gateway.
//!
//! Frame types:
//! - `RequestFrame`  — producer/consumer → gateway RPC call
//! - `ResponseFrame` — gateway → caller RPC result
//! - `EventFrame`    — service → gateway → subscribers, server-push

mod codec;
pub mod keys;

pub use codec::{parse_frame, serialize_frame, ProtocolError};

use serde::{Deserialize, Serialize};

// ── Constants ────────────────────────────────────────────────────────────────

pub const PROTOCOL_VERSION: u32 = 1;
pub const DEFAULT_HOST: &str = "127.0.0.1";
pub const DEFAULT_PORT: u16 = 9000;
pub const MAX_PAYLOAD_BYTES: usize = 524_288; // 512 KB

pub const DEDUPE_TTL_MS: u64 = 60_000;
pub const DEDUPE_MAX_ENTRIES: usize = 10_000;

pub const DEBOUNCE_DELAY_MS: u64 = 1_500;
pub const DEBOUNCE_MAX_BATCH: usize = 20;

pub const RPC_TIMEOUT_MS: u64 = 30_000;

pub const RECONNECT_BASE_MS: u64 = 2_000;
pub const RECONNECT_MAX_MS: u64 = 30_000;

pub const REPLY_MAX_CHUNK_SIZE: usize = 4_000;
pub const REPLY_MAX_RETRIES: u32 = 3;
pub const REPLY_RETRY_BASE_MS: u64 = 500;

// ── Error codes ──────────────────────────────────────────────────────────────

pub mod error_codes {
    pub const PROTOCOL_ERROR: &str = "PROTOCOL_ERROR";
    pub const TIMEOUT: &str = "TIMEOUT";
    pub const SERVICE_UNAVAILABLE: &str = "SERVICE_UNAVAILABLE";
    pub const ALREADY_REGISTERED: &str = "ALREADY_REGISTERED";
    pub const TOOL_FORBIDDEN: &str = "TOOL_FORBIDDEN";
    pub const BACKPRESSURE: &str = "BACKPRESSURE";
    pub const VALIDATION: &str = "VALIDATION";
    pub const INTERNAL: &str = "INTERNAL";
}

// ── Error shape ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorShape {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl ErrorShape {
    #[must_use]
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            details: None,
        }
    }

    #[must_use]
    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }
}

// ── Frames ───────────────────────────────────────────────────────────────────

/// Client/producer → gateway RPC request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestFrame {
    pub id: String,
    pub target: String,
    pub method: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<serde_json::Value>,
}

/// Gateway → caller RPC response, correlated by `id`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResponseFrame {
    pub id: String,
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payload: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorShape>,
}

impl ResponseFrame {
    #[must_use]
    pub fn ok(id: impl Into<String>, payload: serde_json::Value) -> Self {
        Self {
            id: id.into(),
            ok: true,
            payload: Some(payload),
            error: None,
        }
    }

    #[must_use]
    pub fn err(id: impl Into<String>, error: ErrorShape) -> Self {
        Self {
            id: id.into(),
            ok: false,
            payload: None,
            error: Some(error),
        }
    }
}

/// Service → gateway → subscribers server-push event. `seq` is monotonic per
/// `source` within a single registration lifetime.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventFrame {
    pub source: String,
    pub event: String,
    pub payload: serde_json::Value,
    pub seq: u64,
}

/// Discriminated union of all frame types, keyed by `type` on the wire.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Frame {
    Request(RequestFrame),
    Response(ResponseFrame),
    Event(EventFrame),
}

// ── Service registration ─────────────────────────────────────────────────────

/// Declared capability set of a service connecting to the gateway.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceRegistration {
    pub service: String,
    pub version: u32,
    #[serde(default)]
    pub methods: Vec<String>,
    #[serde(default)]
    pub events: Vec<String>,
    #[serde(default)]
    pub subscriptions: Vec<String>,
}
