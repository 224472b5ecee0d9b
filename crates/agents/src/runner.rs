//! Drives a single agent run through the lifecycle state machine (§4.10),
//! dispatching tool calls via the injected `ToolDispatch` capability and
//! emitting `RunEvent`s on a typed channel rather than nested callbacks
//! (§9 Design Notes).
//!
//! `AgentPhase::apply` calls below are always fed an event the preceding
//! control flow guarantees is legal for the current phase (the loop's own
//! structure enforces this, not caller input); the `.expect()`s documenting
//! that are an invariant check, not a recoverable error path.
#![allow(clippy::expect_used)]

use std::sync::Arc;

use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, warn};
use vargos_protocol::{error_codes, keys::is_subagent_key, ErrorShape};

use crate::{
    dispatch::{DispatchError, ToolDispatch},
    events::{
        AssistantStreamEvent, CompactionStreamEvent, RunCompletedEvent, RunEvent, ToolStreamEvent,
    },
    lifecycle::{AgentRun, LifecycleEvent},
    provider::{CompletionOutcome, LlmProvider},
    tool_registry::{ToolRegistry, SUBAGENT_DENIED_TOOLS},
};

/// Hard ceiling on tool-call iterations within one run; prevents a
/// misbehaving provider from looping forever.
const MAX_ITERATIONS: usize = 25;

/// History length (in messages, including the seed system/user turns) above
/// which the loop compacts before asking the provider for another
/// completion. Keeps the window bounded without depending on a token
/// counter the provider trait doesn't expose.
const COMPACTION_THRESHOLD: usize = 40;

/// How many of the most recent messages survive a compaction untouched.
const COMPACTION_KEEP_RECENT: usize = 8;

/// Collapse everything in `history` older than the most recent
/// `COMPACTION_KEEP_RECENT` messages into a single synthetic system message,
/// returning the number of messages folded in if compaction happened.
fn compact_history(history: &mut Vec<serde_json::Value>) -> Option<usize> {
    if history.len() <= COMPACTION_THRESHOLD {
        return None;
    }
    let split_at = history.len() - COMPACTION_KEEP_RECENT;
    let summarized = history.drain(..split_at).count();
    history.insert(
        0,
        serde_json::json!({
            "role": "system",
            "content": format!("[{summarized} earlier messages summarized to stay within context]"),
        }),
    );
    Some(summarized)
}

#[derive(Debug)]
pub struct AgentRunOutcome {
    pub final_text: Option<String>,
    pub iterations: usize,
    pub failed: bool,
}

/// Run one agent turn to completion (or cancellation).
///
/// `history` seeds the message list; `user_message` is appended as the
/// newest turn. Events are pushed to `events` as they occur; the caller
/// (normally the session queue's run driver) owns forwarding
/// `AssistantStreamEvent`s to reply delivery.
pub async fn run_agent_loop(
    session_key: &str,
    provider: Arc<dyn LlmProvider>,
    dispatch: Arc<dyn ToolDispatch>,
    tools: &ToolRegistry,
    mut history: Vec<serde_json::Value>,
    user_message: &str,
    events: UnboundedSender<RunEvent>,
    cancel: &tokio::sync::Notify,
) -> AgentRunOutcome {
    let mut run = AgentRun::new();
    run.apply(LifecycleEvent::Start)
        .expect("idle accepts start");

    let tools = if is_subagent_key(session_key) {
        tools.clone_without(SUBAGENT_DENIED_TOOLS)
    } else {
        tools.clone_without(&[])
    };

    run.apply(LifecycleEvent::Ready)
        .expect("preparing accepts ready");

    history.push(serde_json::json!({ "role": "user", "content": user_message }));

    let schemas = tools.list_schemas();
    let mut iterations = 0usize;
    let mut final_text: Option<String> = None;

    loop {
        if iterations >= MAX_ITERATIONS {
            warn!(session_key, iterations, "agent run hit iteration ceiling");
            run.apply(LifecycleEvent::Finish)
                .expect("running accepts finish");
            let _ = events.send(RunEvent::Completed(RunCompletedEvent::err(
                session_key,
                ErrorShape::new(error_codes::INTERNAL, "iteration ceiling reached"),
            )));
            run.apply(LifecycleEvent::Err).expect("finalizing accepts err");
            return AgentRunOutcome {
                final_text,
                iterations,
                failed: true,
            };
        }
        iterations += 1;

        if let Some(summarized) = compact_history(&mut history) {
            run.apply(LifecycleEvent::Compaction)
                .expect("running accepts compaction");
            let _ = events.send(RunEvent::Compaction(CompactionStreamEvent {
                session_key: session_key.to_string(),
                summarized_messages: summarized,
            }));
        }

        let completion = tokio::select! {
            biased;
            () = cancel.notified() => {
                run.apply(LifecycleEvent::Cancel)
                    .expect("running accepts cancel");
                break;
            },
            result = provider.complete(&history, &schemas) => result,
        };

        let completion = match completion {
            Ok(outcome) => outcome,
            Err(err) => {
                run.apply(LifecycleEvent::Finish)
                    .expect("running accepts finish");
                let _ = events.send(RunEvent::Completed(RunCompletedEvent::err(
                    session_key,
                    ErrorShape::new(error_codes::INTERNAL, err),
                )));
                run.apply(LifecycleEvent::Err).expect("finalizing accepts err");
                return AgentRunOutcome {
                    final_text,
                    iterations,
                    failed: true,
                };
            },
        };

        match completion {
            CompletionOutcome::Text(text) => {
                run.apply(LifecycleEvent::Delta)
                    .expect("running accepts delta");
                let _ = events.send(RunEvent::Assistant(AssistantStreamEvent {
                    session_key: session_key.to_string(),
                    delta: text.clone(),
                }));
                history.push(serde_json::json!({ "role": "assistant", "content": text }));
                final_text = Some(text);
                run.apply(LifecycleEvent::Finish)
                    .expect("running accepts finish");
                break;
            },
            CompletionOutcome::ToolCall { id, name, arguments } => {
                run.apply(LifecycleEvent::Tool)
                    .expect("running accepts tool");
                let _ = events.send(RunEvent::Tool(ToolStreamEvent {
                    session_key: session_key.to_string(),
                    call_id: id.clone(),
                    tool_name: name.clone(),
                    arguments: arguments.clone(),
                }));

                let result = if tools.contains(&name) {
                    dispatch.dispatch(session_key, &name, arguments).await
                } else {
                    Err(DispatchError::Forbidden(name.clone()))
                };

                let (content, is_error) = match result {
                    Ok(value) => (value, false),
                    Err(DispatchError::Forbidden(tool)) => {
                        debug!(session_key, tool, "tool call denied for subagent");
                        (
                            serde_json::json!({ "code": error_codes::TOOL_FORBIDDEN, "tool": tool }),
                            true,
                        )
                    },
                    Err(err) => (serde_json::json!({ "error": err.to_string() }), true),
                };

                history.push(serde_json::json!({
                    "role": "tool",
                    "tool_call_id": id,
                    "is_error": is_error,
                    "content": content,
                }));
            },
        }
    }

    // Every path that breaks out of the loop above leaves the run in
    // `Finalizing`; settle it here based on whether it was cancelled.
    if run.cancelled {
        let _ = events.send(RunEvent::Completed(RunCompletedEvent::err(
            session_key,
            ErrorShape::new(error_codes::INTERNAL, "run cancelled"),
        )));
        run.apply(LifecycleEvent::Err)
            .expect("finalizing accepts err");
    } else {
        let _ = events.send(RunEvent::Completed(RunCompletedEvent::ok(session_key)));
        run.apply(LifecycleEvent::Ok)
            .expect("finalizing accepts ok");
    }

    AgentRunOutcome {
        final_text,
        iterations,
        failed: run.phase == crate::lifecycle::AgentPhase::Failed,
    }
}
