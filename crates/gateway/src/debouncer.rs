//! Per-key message coalescer that flushes after a quiet period or a batch
//! cap (§4.4).
//!
//! Resetting the timer on every `push` is intentional: the inbound pipeline
//! only drives an agent run once the user has "stopped typing" for
//! `delay_ms`. Flushed batches are delivered on a typed channel rather than
//! a callback, per the event-channel pattern used throughout the Gateway
//! (§9 Design Notes).

use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
};

use tokio::sync::mpsc::UnboundedSender;
use vargos_protocol::{DEBOUNCE_DELAY_MS, DEBOUNCE_MAX_BATCH};

#[derive(Debug, Clone, Copy)]
pub struct DebouncerConfig {
    pub delay_ms: u64,
    pub max_batch: usize,
}

impl Default for DebouncerConfig {
    fn default() -> Self {
        Self {
            delay_ms: DEBOUNCE_DELAY_MS,
            max_batch: DEBOUNCE_MAX_BATCH,
        }
    }
}

#[derive(Default)]
struct KeyState {
    buffer: Vec<String>,
    generation: u64,
}

/// Flushed batch for a single key, in push order.
pub type FlushedBatch = (String, Vec<String>);

pub struct Debouncer {
    config: DebouncerConfig,
    state: Arc<Mutex<HashMap<String, KeyState>>>,
    flush_tx: UnboundedSender<FlushedBatch>,
}

impl Debouncer {
    #[must_use]
    pub fn new(config: DebouncerConfig, flush_tx: UnboundedSender<FlushedBatch>) -> Self {
        Self {
            config,
            state: Arc::new(Mutex::new(HashMap::new())),
            flush_tx,
        }
    }

    /// Append `message` to `key`'s buffer and reset its quiet-period timer.
    /// Flushes immediately if the buffer reaches `max_batch`.
    pub fn push(&self, key: &str, message: impl Into<String>) {
        let generation = {
            let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
            let entry = state.entry(key.to_string()).or_default();
            entry.buffer.push(message.into());
            entry.generation += 1;

            if entry.buffer.len() >= self.config.max_batch {
                let messages = std::mem::take(&mut entry.buffer);
                state.remove(key);
                let _ = self.flush_tx.send((key.to_string(), messages));
                return;
            }
            entry.generation
        };

        let key = key.to_string();
        let state = Arc::clone(&self.state);
        let flush_tx = self.flush_tx.clone();
        let delay = tokio::time::Duration::from_millis(self.config.delay_ms);

        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let messages = {
                let mut state = state.lock().unwrap_or_else(|e| e.into_inner());
                match state.get(&key) {
                    Some(entry) if entry.generation == generation => {
                        state.remove(&key).map(|e| e.buffer)
                    },
                    _ => None,
                }
            };
            if let Some(messages) = messages {
                let _ = flush_tx.send((key, messages));
            }
        });
    }

    /// Discard `key`'s buffer without flushing. A timer already in flight
    /// for `key` will observe the generation bump and no-op.
    pub fn cancel(&self, key: &str) {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(entry) = state.get_mut(key) {
            entry.generation += 1;
            entry.buffer.clear();
        }
        state.remove(key);
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tokio::sync::mpsc;

    use super::*;

    #[tokio::test(start_paused = true)]
    async fn flushes_after_quiet_period() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let debouncer = Debouncer::new(
            DebouncerConfig {
                delay_ms: 100,
                max_batch: 20,
            },
            tx,
        );

        debouncer.push("cli:chat", "hello");
        tokio::time::sleep(Duration::from_millis(150)).await;

        let (key, messages) = rx.try_recv().expect("flush should have fired");
        assert_eq!(key, "cli:chat");
        assert_eq!(messages, vec!["hello".to_string()]);
    }

    #[tokio::test(start_paused = true)]
    async fn each_push_resets_the_timer() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let debouncer = Debouncer::new(
            DebouncerConfig {
                delay_ms: 100,
                max_batch: 20,
            },
            tx,
        );

        debouncer.push("cli:chat", "a");
        tokio::time::sleep(Duration::from_millis(60)).await;
        debouncer.push("cli:chat", "b");
        tokio::time::sleep(Duration::from_millis(60)).await;
        assert!(rx.try_recv().is_err(), "should not have flushed yet");

        tokio::time::sleep(Duration::from_millis(60)).await;
        let (_, messages) = rx.try_recv().expect("flush should fire once quiet");
        assert_eq!(messages, vec!["a".to_string(), "b".to_string()]);
    }

    #[tokio::test]
    async fn batch_cap_flushes_immediately() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let debouncer = Debouncer::new(
            DebouncerConfig {
                delay_ms: 10_000,
                max_batch: 2,
            },
            tx,
        );

        debouncer.push("cli:chat", "a");
        debouncer.push("cli:chat", "b");

        let (_, messages) = rx.try_recv().expect("batch cap should flush immediately");
        assert_eq!(messages, vec!["a".to_string(), "b".to_string()]);
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_discards_without_flushing() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let debouncer = Debouncer::new(
            DebouncerConfig {
                delay_ms: 50,
                max_batch: 20,
            },
            tx,
        );

        debouncer.push("cli:chat", "a");
        debouncer.cancel("cli:chat");
        tokio::time::sleep(Duration::from_millis(100)).await;

        assert!(rx.try_recv().is_err(), "cancelled key must not flush");
    }
}
