//! LLM provider interface.
//!
//! LLM provider integration is an external collaborator (out of scope per
//! the specification); this crate only defines the seam the lifecycle
//! drives against, so a concrete Anthropic/OpenAI/etc. provider can be
//! wired in without the runner knowing which one.

use async_trait::async_trait;
use serde_json::Value;

#[derive(Debug, Clone)]
pub enum CompletionOutcome {
    /// Final assistant text for this turn.
    Text(String),
    /// The model wants to call a tool before continuing.
    ToolCall {
        id: String,
        name: String,
        arguments: Value,
    },
}

#[async_trait]
pub trait LlmProvider: Send + Sync {
    fn id(&self) -> &str;

    /// Produce the next completion given the running message history and
    /// the tool schemas available to this run.
    async fn complete(
        &self,
        messages: &[Value],
        tools: &[Value],
    ) -> Result<CompletionOutcome, String>;
}

/// Placeholder provider for running the gateway before a real model backend
/// is wired in. Every completion fails with a configuration error rather
/// than silently producing text.
pub struct NoopLlmProvider;

#[async_trait]
impl LlmProvider for NoopLlmProvider {
    fn id(&self) -> &str {
        "noop"
    }

    async fn complete(&self, _messages: &[Value], _tools: &[Value]) -> Result<CompletionOutcome, String> {
        Err("no LLM provider configured".to_string())
    }
}
