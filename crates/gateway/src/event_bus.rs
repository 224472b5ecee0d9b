//! Topic-based publish/subscribe with per-source sequence numbers (§4.8).
//!
//! Topic ≡ `(source, event)`. Each subscriber gets its own bounded channel
//! so a slow reader cannot stall publishers for anyone else; once a
//! subscriber's channel is full it is dropped with `BACKPRESSURE` and must
//! resubscribe.

use std::{
    collections::{HashMap, HashSet},
    sync::Mutex,
};

use tokio::sync::mpsc;
use vargos_protocol::EventFrame;

/// High-water mark on a subscriber's outbound buffer before it is
/// considered backpressured and disconnected.
pub const SUBSCRIBER_BUFFER_CAPACITY: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackpressureDisconnect;

struct Subscriber {
    topics: HashSet<String>,
    sender: mpsc::Sender<EventFrame>,
}

#[derive(Default)]
pub struct EventBus {
    counters: Mutex<HashMap<String, u64>>,
    subscribers: Mutex<HashMap<String, Subscriber>>,
}

fn topic_key(source: &str, event: &str) -> String {
    format!("{source}.{event}")
}

impl EventBus {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `connection_id` as interested in `topics` (each formatted
    /// `source.event`), returning the receiving half of its channel.
    pub fn subscribe(
        &self,
        connection_id: impl Into<String>,
        topics: impl IntoIterator<Item = String>,
    ) -> mpsc::Receiver<EventFrame> {
        let (tx, rx) = mpsc::channel(SUBSCRIBER_BUFFER_CAPACITY);
        self.subscribers.lock().unwrap_or_else(|e| e.into_inner()).insert(
            connection_id.into(),
            Subscriber {
                topics: topics.into_iter().collect(),
                sender: tx,
            },
        );
        rx
    }

    pub fn unsubscribe(&self, connection_id: &str) {
        self.subscribers
            .lock().unwrap_or_else(|e| e.into_inner())
            .remove(connection_id);
    }

    /// Publish `payload` under `(source, event)`. Assigns the next sequence
    /// number for `source` and fans out to every subscriber whose topic set
    /// contains it. Subscribers whose buffer is full are dropped and their
    /// ids returned so the caller can tear down that connection.
    pub fn publish(
        &self,
        source: &str,
        event: &str,
        payload: serde_json::Value,
    ) -> (EventFrame, Vec<String>) {
        let seq = {
            let mut counters = self.counters.lock().unwrap_or_else(|e| e.into_inner());
            let counter = counters.entry(source.to_string()).or_insert(0);
            *counter += 1;
            *counter
        };

        let frame = EventFrame {
            source: source.to_string(),
            event: event.to_string(),
            payload,
            seq,
        };

        let topic = topic_key(source, event);
        let mut dropped = Vec::new();
        let mut subscribers = self.subscribers.lock().unwrap_or_else(|e| e.into_inner());
        subscribers.retain(|connection_id, subscriber| {
            if !subscriber.topics.contains(&topic) {
                return true;
            }
            match subscriber.sender.try_send(frame.clone()) {
                Ok(()) => true,
                Err(_) => {
                    dropped.push(connection_id.clone());
                    false
                },
            }
        });

        (frame, dropped)
    }

    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.lock().unwrap_or_else(|e| e.into_inner()).len()
    }
}
