//! Glue for a single channel's inbound messages: allow-list → dedupe →
//! session-key resolve → debounce → enqueue (§4.12).

use std::sync::{Arc, Mutex};

use vargos_channels::{is_allowed, NormalizedInput};
use vargos_protocol::keys::normalize_session_key;
use tokio::sync::mpsc;

use crate::{
    debouncer::{Debouncer, DebouncerConfig},
    dedupe::{DedupeCache, DedupeConfig},
    session_queue::{QueuedMessage, SessionQueue},
};

/// A single channel's slice of the inbound pipeline. One instance per
/// connected adapter; all instances share the Gateway's `SessionQueue`.
pub struct InboundPipeline {
    channel: String,
    allow_from: Vec<String>,
    dedupe: Mutex<DedupeCache>,
    debouncer: Debouncer,
}

impl InboundPipeline {
    #[must_use]
    pub fn new(
        channel: impl Into<String>,
        allow_from: Vec<String>,
        dedupe_config: DedupeConfig,
        debounce_config: DebouncerConfig,
        session_queue: Arc<SessionQueue>,
    ) -> Self {
        let channel = channel.into();
        let (flush_tx, mut flush_rx) = mpsc::unbounded_channel();
        let debouncer = Debouncer::new(debounce_config, flush_tx);

        let flush_channel = channel.clone();
        tokio::spawn(async move {
            while let Some((session_key, messages)) = flush_rx.recv().await {
                let content = messages.join("\n");
                let now = chrono::Utc::now().timestamp_millis();
                let input = build_normalized_input(&flush_channel, &session_key, &content, now);
                let queued = QueuedMessage {
                    session_key: session_key.clone(),
                    content: input.content,
                    enqueued_at: input.timestamp,
                    source: flush_channel.clone(),
                };
                session_queue.enqueue(queued).await;
            }
        });

        Self {
            channel,
            allow_from,
            dedupe: Mutex::new(DedupeCache::new(dedupe_config)),
            debouncer,
        }
    }

    /// Run steps 1-4 of the inbound pipeline for one platform-native
    /// message. Returns `true` if it was accepted into the debouncer,
    /// `false` if dropped by the allow-list or dedupe cache.
    pub fn accept(
        &self,
        sender_id: &str,
        platform_id: Option<&str>,
        text: &str,
        now_ms: u64,
    ) -> bool {
        if !is_allowed(sender_id, &self.allow_from) {
            return false;
        }

        let fingerprint = match platform_id {
            Some(id) => vargos_channels::fingerprints::from_platform_id(&self.channel, id),
            None => vargos_channels::fingerprints::from_content(&self.channel, sender_id, text),
        };

        let inserted = {
            let mut dedupe = self.dedupe.lock().unwrap_or_else(|e| e.into_inner());
            dedupe.add(&fingerprint, now_ms)
        };
        if !inserted {
            return false;
        }

        let session_key = normalize_session_key(&self.channel, sender_id);
        self.debouncer.push(&session_key, text);
        true
    }
}

fn build_normalized_input(
    channel: &str,
    session_key: &str,
    content: &str,
    timestamp: i64,
) -> NormalizedInput {
    let user_id = session_key
        .split_once(':')
        .map_or(session_key, |(_, identifier)| identifier);
    NormalizedInput::text(content, channel, user_id, session_key, timestamp)
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use tokio::sync::Notify;

    use super::*;
    use crate::session_queue::RunStarter;

    struct RecordingStarter {
        started: tokio::sync::Mutex<Vec<QueuedMessage>>,
    }

    #[async_trait]
    impl RunStarter for RecordingStarter {
        async fn start_run(&self, message: QueuedMessage, _cancel: Arc<Notify>) {
            self.started.lock().await.push(message);
        }
    }

    fn pipeline(allow_from: Vec<String>) -> (InboundPipeline, Arc<RecordingStarter>) {
        let starter = Arc::new(RecordingStarter {
            started: tokio::sync::Mutex::new(Vec::new()),
        });
        let queue = Arc::new(SessionQueue::new(Arc::clone(&starter) as Arc<dyn RunStarter>));
        let pipeline = InboundPipeline::new(
            "whatsapp",
            allow_from,
            DedupeConfig::default(),
            DebouncerConfig {
                delay_ms: 10,
                max_batch: 20,
            },
            queue,
        );
        (pipeline, starter)
    }

    #[tokio::test(start_paused = true)]
    async fn accepted_message_reaches_queue_after_debounce() {
        let (pipeline, starter) = pipeline(Vec::new());
        assert!(pipeline.accept("+61423000000", Some("msg-1"), "hello", 0));
        tokio::time::sleep(tokio::time::Duration::from_millis(50)).await;
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }

        let started = starter.started.lock().await;
        assert_eq!(started.len(), 1);
        assert_eq!(started[0].session_key, "whatsapp:61423000000");
        assert_eq!(started[0].content, "hello");
    }

    #[tokio::test]
    async fn disallowed_sender_is_dropped() {
        let (pipeline, _starter) = pipeline(vec!["61400000000".to_string()]);
        assert!(!pipeline.accept("+61423000000", Some("msg-1"), "hello", 0));
    }

    #[tokio::test]
    async fn duplicate_platform_id_is_dropped() {
        let (pipeline, _starter) = pipeline(Vec::new());
        assert!(pipeline.accept("+61423000000", Some("msg-1"), "hello", 0));
        assert!(!pipeline.accept("+61423000000", Some("msg-1"), "hello again", 1));
    }
}
