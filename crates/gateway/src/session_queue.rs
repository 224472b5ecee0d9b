//! Per-session message queue with queue-mode arbitration (§4.9).
//!
//! This is the coordination primitive: it is the only place an agent run is
//! started or cancelled. `RunStarter` is the capability the Gateway injects
//! so this module never references `vargos-agents` directly.

use std::{
    collections::{HashMap, VecDeque},
    sync::Arc,
};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, Notify};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum QueueMode {
    #[default]
    Queue,
    Interrupt,
    Replace,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueuedMessage {
    pub session_key: String,
    pub content: String,
    pub enqueued_at: i64,
    pub source: String,
}

/// Starts (and, via the `cancel` notify, is asked to stop) a single agent
/// run for a session. The Gateway's real implementation spawns
/// `vargos_agents::run_agent_loop` in the background and calls
/// `SessionQueue::on_run_finished` on completion.
#[async_trait]
pub trait RunStarter: Send + Sync {
    async fn start_run(&self, message: QueuedMessage, cancel: Arc<Notify>);
}

#[derive(Default)]
struct SessionState {
    mode: QueueMode,
    queue: VecDeque<QueuedMessage>,
    running: bool,
    cancel: Option<Arc<Notify>>,
}

pub struct SessionQueue {
    states: Mutex<HashMap<String, SessionState>>,
    starter: Arc<dyn RunStarter>,
}

impl SessionQueue {
    #[must_use]
    pub fn new(starter: Arc<dyn RunStarter>) -> Self {
        Self {
            states: Mutex::new(HashMap::new()),
            starter,
        }
    }

    pub async fn set_mode(&self, session_key: &str, mode: QueueMode) {
        let mut states = self.states.lock().await;
        states.entry(session_key.to_string()).or_default().mode = mode;
    }

    /// Enqueue `message`, applying the session's current queue-mode.
    pub async fn enqueue(&self, message: QueuedMessage) {
        let session_key = message.session_key.clone();
        let cancel_handle = {
            let mut states = self.states.lock().await;
            let state = states.entry(session_key.clone()).or_default();

            match state.mode {
                QueueMode::Queue => {
                    state.queue.push_back(message);
                    None
                },
                QueueMode::Interrupt => {
                    let cancel = state.cancel.take();
                    state.queue.push_back(message);
                    state.running = false;
                    cancel
                },
                QueueMode::Replace => {
                    let cancel = state.cancel.take();
                    state.queue.clear();
                    state.queue.push_back(message);
                    state.running = false;
                    cancel
                },
            }
        };

        if let Some(cancel) = cancel_handle {
            cancel.notify_one();
        }

        self.maybe_start_next(&session_key).await;
    }

    /// Called by the run driver when a run reaches `completed` or `failed`,
    /// regardless of phase. Starts the next queued message, if any.
    pub async fn on_run_finished(&self, session_key: &str) {
        {
            let mut states = self.states.lock().await;
            if let Some(state) = states.get_mut(session_key) {
                state.running = false;
                state.cancel = None;
            }
        }
        self.maybe_start_next(session_key).await;
    }

    async fn maybe_start_next(&self, session_key: &str) {
        let next = {
            let mut states = self.states.lock().await;
            let Some(state) = states.get_mut(session_key) else {
                return;
            };
            if state.running {
                return;
            }
            let Some(message) = state.queue.pop_front() else {
                return;
            };
            let cancel = Arc::new(Notify::new());
            state.running = true;
            state.cancel = Some(Arc::clone(&cancel));
            Some((message, cancel))
        };

        if let Some((message, cancel)) = next {
            self.starter.start_run(message, cancel).await;
        }
    }

    #[must_use]
    pub async fn is_running(&self, session_key: &str) -> bool {
        self.states
            .lock()
            .await
            .get(session_key)
            .is_some_and(|s| s.running)
    }

    #[must_use]
    pub async fn queue_len(&self, session_key: &str) -> usize {
        self.states
            .lock()
            .await
            .get(session_key)
            .map_or(0, |s| s.queue.len())
    }

    /// Cancel every in-flight run and drop all buffered messages (process
    /// shutdown). Runs are notified but not waited on; the caller should
    /// give them a grace period before exiting.
    pub async fn cancel_all(&self) {
        let mut states = self.states.lock().await;
        for state in states.values_mut() {
            if let Some(cancel) = state.cancel.take() {
                cancel.notify_one();
            }
            state.queue.clear();
            state.running = false;
        }
    }

    /// Cancel the in-flight run for one session and drop its queued
    /// messages. Returns whether a run was actually in flight.
    pub async fn cancel(&self, session_key: &str) -> bool {
        let mut states = self.states.lock().await;
        let Some(state) = states.get_mut(session_key) else {
            return false;
        };
        let was_running = state.running;
        if let Some(cancel) = state.cancel.take() {
            cancel.notify_one();
        }
        state.queue.clear();
        state.running = false;
        was_running
    }

    /// Session keys with a run currently in flight.
    #[must_use]
    pub async fn active_session_keys(&self) -> Vec<String> {
        self.states
            .lock()
            .await
            .iter()
            .filter(|(_, state)| state.running)
            .map(|(key, _)| key.clone())
            .collect()
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use tokio::sync::Mutex as TokioMutex;

    use super::*;

    struct RecordingStarter {
        started: TokioMutex<Vec<String>>,
        cancelled: AtomicUsize,
    }

    impl RecordingStarter {
        fn new() -> Self {
            Self {
                started: TokioMutex::new(Vec::new()),
                cancelled: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl RunStarter for RecordingStarter {
        async fn start_run(&self, message: QueuedMessage, cancel: Arc<Notify>) {
            self.started.lock().await.push(message.content);
            tokio::spawn(async move {
                cancel.notified().await;
            });
        }
    }

    fn msg(session_key: &str, content: &str) -> QueuedMessage {
        QueuedMessage {
            session_key: session_key.to_string(),
            content: content.to_string(),
            enqueued_at: 0,
            source: "test".to_string(),
        }
    }

    #[tokio::test]
    async fn queue_mode_starts_immediately_when_idle() {
        let starter = Arc::new(RecordingStarter::new());
        let queue = SessionQueue::new(Arc::clone(&starter) as Arc<dyn RunStarter>);
        queue.enqueue(msg("cli:chat", "hello")).await;
        assert!(queue.is_running("cli:chat").await);
        assert_eq!(starter.started.lock().await.as_slice(), ["hello"]);
    }

    #[tokio::test]
    async fn queue_mode_buffers_while_running() {
        let starter = Arc::new(RecordingStarter::new());
        let queue = SessionQueue::new(Arc::clone(&starter) as Arc<dyn RunStarter>);
        queue.enqueue(msg("cli:chat", "first")).await;
        queue.enqueue(msg("cli:chat", "second")).await;

        assert_eq!(queue.queue_len("cli:chat").await, 1);
        assert_eq!(starter.started.lock().await.as_slice(), ["first"]);
    }

    #[tokio::test]
    async fn completion_hook_drains_next_queued_message() {
        let starter = Arc::new(RecordingStarter::new());
        let queue = SessionQueue::new(Arc::clone(&starter) as Arc<dyn RunStarter>);
        queue.enqueue(msg("cli:chat", "first")).await;
        queue.enqueue(msg("cli:chat", "second")).await;

        queue.on_run_finished("cli:chat").await;

        assert_eq!(
            starter.started.lock().await.as_slice(),
            ["first", "second"]
        );
        assert_eq!(queue.queue_len("cli:chat").await, 0);
    }

    #[tokio::test]
    async fn interrupt_mode_cancels_in_flight_run_and_starts_new_one() {
        let starter = Arc::new(RecordingStarter::new());
        let queue = SessionQueue::new(Arc::clone(&starter) as Arc<dyn RunStarter>);
        queue.set_mode("cli:chat", QueueMode::Interrupt).await;

        queue.enqueue(msg("cli:chat", "first")).await;
        queue.enqueue(msg("cli:chat", "second")).await;

        assert_eq!(
            starter.started.lock().await.as_slice(),
            ["first", "second"]
        );
        assert!(queue.is_running("cli:chat").await);
    }

    #[tokio::test]
    async fn replace_mode_discards_other_pending_messages() {
        let starter = Arc::new(RecordingStarter::new());
        let queue = SessionQueue::new(Arc::clone(&starter) as Arc<dyn RunStarter>);
        queue.set_mode("cli:chat", QueueMode::Queue).await;
        queue.enqueue(msg("cli:chat", "first")).await;
        queue.enqueue(msg("cli:chat", "buffered")).await;
        assert_eq!(queue.queue_len("cli:chat").await, 1);

        queue.set_mode("cli:chat", QueueMode::Replace).await;
        queue.enqueue(msg("cli:chat", "replacement")).await;

        assert_eq!(queue.queue_len("cli:chat").await, 0);
        assert_eq!(
            starter.started.lock().await.as_slice(),
            ["first", "replacement"]
        );
    }

    #[tokio::test]
    async fn cancel_all_notifies_running_and_clears_queued() {
        let starter = Arc::new(RecordingStarter::new());
        let queue = SessionQueue::new(Arc::clone(&starter) as Arc<dyn RunStarter>);
        queue.set_mode("cli:chat", QueueMode::Queue).await;
        queue.enqueue(msg("cli:chat", "first")).await;
        queue.enqueue(msg("cli:chat", "buffered")).await;

        queue.cancel_all().await;

        assert!(!queue.is_running("cli:chat").await);
        assert_eq!(queue.queue_len("cli:chat").await, 0);
    }

    #[tokio::test]
    async fn at_most_one_run_per_session_key() {
        let starter = Arc::new(RecordingStarter::new());
        let queue = SessionQueue::new(Arc::clone(&starter) as Arc<dyn RunStarter>);
        queue.enqueue(msg("cli:chat", "a")).await;
        queue.enqueue(msg("cli:chat", "b")).await;
        queue.enqueue(msg("cli:chat", "c")).await;
        assert!(queue.is_running("cli:chat").await);
        assert_eq!(starter.started.lock().await.len(), 1);
    }

    #[tokio::test]
    async fn cancel_stops_only_the_named_session() {
        let starter = Arc::new(RecordingStarter::new());
        let queue = SessionQueue::new(Arc::clone(&starter) as Arc<dyn RunStarter>);
        queue.enqueue(msg("cli:chat", "a")).await;
        queue.enqueue(msg("whatsapp:1", "b")).await;

        assert!(queue.cancel("cli:chat").await);
        assert!(!queue.is_running("cli:chat").await);
        assert!(queue.is_running("whatsapp:1").await);
    }

    #[tokio::test]
    async fn cancel_on_idle_session_is_a_no_op() {
        let starter = Arc::new(RecordingStarter::new());
        let queue = SessionQueue::new(Arc::clone(&starter) as Arc<dyn RunStarter>);
        assert!(!queue.cancel("cli:chat").await);
    }

    #[tokio::test]
    async fn active_session_keys_lists_only_running_sessions() {
        let starter = Arc::new(RecordingStarter::new());
        let queue = SessionQueue::new(Arc::clone(&starter) as Arc<dyn RunStarter>);
        queue.enqueue(msg("cli:chat", "a")).await;
        queue.enqueue(msg("whatsapp:1", "b")).await;
        queue.cancel("whatsapp:1").await;

        let active = queue.active_session_keys().await;
        assert_eq!(active, vec!["cli:chat".to_string()]);
    }
}
