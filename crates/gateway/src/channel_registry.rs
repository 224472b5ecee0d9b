//! Maps a session key's channel prefix to the adapter that owns it, so the
//! run driver can deliver a finished reply without knowing which concrete
//! channel the session came from (§4.5, §4.11).

use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use vargos_channels::ChannelAdapter;

use crate::reply_delivery::{self, ChunkSender, ReplyOptions};

#[derive(Default)]
pub struct ChannelRegistry {
    adapters: DashMap<String, Arc<dyn ChannelAdapter>>,
}

impl ChannelRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, adapter: Arc<dyn ChannelAdapter>) {
        self.adapters.insert(adapter.name().to_string(), adapter);
    }

    #[must_use]
    pub fn get(&self, channel: &str) -> Option<Arc<dyn ChannelAdapter>> {
        self.adapters.get(channel).map(|entry| Arc::clone(entry.value()))
    }
}

struct AdapterChunkSender {
    adapter: Arc<dyn ChannelAdapter>,
    recipient_id: String,
}

#[async_trait]
impl ChunkSender for AdapterChunkSender {
    async fn send_chunk(&self, chunk: &str) -> Result<(), String> {
        self.adapter
            .send(&self.recipient_id, chunk)
            .await
            .map_err(|err| err.to_string())
    }
}

/// Split a `channel:identifier` session key and deliver `text` through the
/// owning adapter. Sessions with no matching adapter (e.g. a bare CLI
/// session whose replies the interactive client reads off the event bus
/// directly) are not an error; the caller should treat `Ok(false)` as "no
/// delivery needed" rather than a failure.
pub async fn deliver_reply(
    registry: &ChannelRegistry,
    session_key: &str,
    text: &str,
) -> Result<bool, String> {
    let Some((channel, recipient_id)) = session_key.split_once(':') else {
        return Ok(false);
    };
    let Some(adapter) = registry.get(channel) else {
        return Ok(false);
    };

    let sender = AdapterChunkSender {
        adapter,
        recipient_id: recipient_id.to_string(),
    };
    reply_delivery::deliver(&sender, text, ReplyOptions::default())
        .await
        .map(|()| true)
        .map_err(|err| err.to_string())
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use vargos_channels::ChannelResult;

    use super::*;

    struct RecordingAdapter {
        sent: tokio::sync::Mutex<Vec<(String, String)>>,
    }

    #[async_trait]
    impl ChannelAdapter for RecordingAdapter {
        fn name(&self) -> &str {
            "whatsapp"
        }

        async fn initialize(&self) -> ChannelResult<()> {
            Ok(())
        }

        async fn start(&self, _sink: Arc<dyn vargos_channels::InboundSink>) -> ChannelResult<()> {
            Ok(())
        }

        async fn stop(&self) -> ChannelResult<()> {
            Ok(())
        }

        async fn send(&self, recipient_id: &str, text: &str) -> ChannelResult<()> {
            self.sent
                .lock()
                .await
                .push((recipient_id.to_string(), text.to_string()));
            Ok(())
        }
    }

    #[tokio::test]
    async fn delivers_through_the_registered_channel() {
        let registry = ChannelRegistry::new();
        let adapter = Arc::new(RecordingAdapter {
            sent: tokio::sync::Mutex::new(Vec::new()),
        });
        registry.register(Arc::clone(&adapter) as Arc<dyn ChannelAdapter>);

        let delivered = deliver_reply(&registry, "whatsapp:61423000000", "hello")
            .await
            .unwrap();
        assert!(delivered);
        assert_eq!(
            adapter.sent.lock().await.as_slice(),
            [("61423000000".to_string(), "hello".to_string())]
        );
    }

    #[tokio::test]
    async fn unregistered_channel_is_not_an_error() {
        let registry = ChannelRegistry::new();
        let delivered = deliver_reply(&registry, "cli:local", "hello").await.unwrap();
        assert!(!delivered);
    }
}
