//! Agent run lifecycle, tool dispatch, and tool registry (§4.10).
//!
//! This crate never depends on `vargos-gateway`; the Gateway drives runs by
//! injecting a `ToolDispatch` implementation, breaking the adapter/session
//! cycle the specification calls out (§9 Design Notes).

mod dispatch;
mod events;
mod lifecycle;
mod provider;
mod runner;
mod tool_registry;

pub use dispatch::{DispatchError, ToolDispatch};
pub use events::{
    AssistantStreamEvent, CompactionStreamEvent, RunCompletedEvent, RunEvent, ToolStreamEvent,
};
pub use lifecycle::{AgentPhase, AgentRun, IllegalTransition, LifecycleEvent};
pub use provider::{CompletionOutcome, LlmProvider, NoopLlmProvider};
pub use runner::{run_agent_loop, AgentRunOutcome};
pub use tool_registry::{AgentTool, ToolRegistry, SUBAGENT_DENIED_TOOLS};
