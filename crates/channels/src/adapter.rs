//! The channel adapter contract (§4.11).
//!
//! Every messaging surface (WhatsApp, Telegram, CLI, ...) implements
//! `ChannelAdapter` and is driven by the Gateway through this trait alone;
//! the Gateway never depends on a concrete adapter type (`spec.md` §9 Design
//! Notes — explicit capability interfaces instead of back-references).

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use crate::normalized_input::NormalizedInput;

#[derive(Debug, Error)]
pub enum ChannelError {
    #[error("channel unavailable: {0}")]
    Unavailable(String),
    #[error("send failed: {0}")]
    SendFailed(String),
    #[error("invalid recipient: {0}")]
    InvalidRecipient(String),
}

pub type ChannelResult<T> = Result<T, ChannelError>;

/// Receives inbound messages an adapter has accepted past its own
/// platform-level filtering. The Gateway implements this and hands itself to
/// each adapter at `start()`.
#[async_trait]
pub trait InboundSink: Send + Sync {
    async fn on_inbound_message(&self, fingerprint: String, from: String, input: NormalizedInput);
}

#[async_trait]
pub trait ChannelAdapter: Send + Sync {
    /// Stable identifier, e.g. `"whatsapp"`, `"telegram"`, `"cli"`.
    fn name(&self) -> &str;

    /// One-time setup (load credentials, validate config). Called before
    /// `start()`; must not connect yet.
    async fn initialize(&self) -> ChannelResult<()>;

    /// Begin receiving messages, forwarding each to `sink`.
    async fn start(&self, sink: Arc<dyn InboundSink>) -> ChannelResult<()>;

    /// Disconnect. Idempotent: calling `stop()` on an already-stopped
    /// adapter is not an error.
    async fn stop(&self) -> ChannelResult<()>;

    /// Send outbound text to a recipient on this channel.
    async fn send(&self, recipient_id: &str, text: &str) -> ChannelResult<()>;
}
