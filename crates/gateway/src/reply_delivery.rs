//! Chunk a long reply on paragraph/sentence boundaries and deliver each
//! chunk sequentially with retries (§4.5).

use async_trait::async_trait;
use vargos_protocol::{REPLY_MAX_CHUNK_SIZE, REPLY_MAX_RETRIES, REPLY_RETRY_BASE_MS};

#[derive(Debug, Clone, Copy)]
pub struct ReplyOptions {
    pub max_chunk_size: usize,
    pub max_retries: u32,
    pub retry_base_ms: u64,
}

impl Default for ReplyOptions {
    fn default() -> Self {
        Self {
            max_chunk_size: REPLY_MAX_CHUNK_SIZE,
            max_retries: REPLY_MAX_RETRIES,
            retry_base_ms: REPLY_RETRY_BASE_MS,
        }
    }
}

/// The adapter's send path, injected so this module stays free of any
/// concrete channel dependency.
#[async_trait]
pub trait ChunkSender: Send + Sync {
    async fn send_chunk(&self, chunk: &str) -> Result<(), String>;
}

#[derive(Debug, thiserror::Error)]
#[error("send failed after exhausting retries: {0}")]
pub struct DeliveryError(pub String);

/// Split `text` into chunks no larger than `max_chunk_size`, in the
/// specified priority order: whole text, paragraph-joined, sentence-split,
/// hard cut.
#[must_use]
pub fn chunk_text(text: &str, max_chunk_size: usize) -> Vec<String> {
    if text.chars().count() <= max_chunk_size {
        return vec![text.to_string()];
    }

    let paragraphs: Vec<&str> = text.split("\n\n").collect();
    if paragraphs.iter().all(|p| p.chars().count() <= max_chunk_size) {
        return join_within_limit(&paragraphs, "\n\n", max_chunk_size);
    }

    let sentences = split_sentences(text);
    if sentences.iter().all(|s| s.chars().count() <= max_chunk_size) {
        return join_within_limit(&sentences, " ", max_chunk_size);
    }

    hard_cut(text, max_chunk_size)
}

fn join_within_limit(parts: &[&str], sep: &str, max_chunk_size: usize) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut current = String::new();

    for part in parts {
        let candidate_len = if current.is_empty() {
            part.chars().count()
        } else {
            current.chars().count() + sep.chars().count() + part.chars().count()
        };

        if candidate_len > max_chunk_size && !current.is_empty() {
            chunks.push(std::mem::take(&mut current));
        }

        if current.is_empty() {
            current.push_str(part);
        } else {
            current.push_str(sep);
            current.push_str(part);
        }
    }

    if !current.is_empty() {
        chunks.push(current);
    }

    chunks
}

fn split_sentences(text: &str) -> Vec<&str> {
    let mut sentences = Vec::new();
    let bytes = text.as_bytes();
    let mut start = 0;
    let mut i = 0;
    while i < bytes.len() {
        let ch = bytes[i];
        if matches!(ch, b'.' | b'!' | b'?') {
            let next_is_whitespace = bytes.get(i + 1).is_some_and(u8::is_ascii_whitespace);
            if next_is_whitespace || i + 1 == bytes.len() {
                sentences.push(text[start..=i].trim());
                start = i + 1;
            }
        }
        i += 1;
    }
    if start < text.len() {
        let rest = text[start..].trim();
        if !rest.is_empty() {
            sentences.push(rest);
        }
    }
    sentences.retain(|s| !s.is_empty());
    sentences
}

fn hard_cut(text: &str, max_chunk_size: usize) -> Vec<String> {
    text.chars()
        .collect::<Vec<char>>()
        .chunks(max_chunk_size)
        .map(|c| c.iter().collect())
        .collect()
}

/// Send `text` as one or more chunks via `sender`, retrying each chunk with
/// exponential backoff on failure. Chunks are sent strictly in order;
/// never in parallel.
pub async fn deliver(
    sender: &dyn ChunkSender,
    text: &str,
    opts: ReplyOptions,
) -> Result<(), DeliveryError> {
    for chunk in chunk_text(text, opts.max_chunk_size) {
        send_with_retry(sender, &chunk, opts).await?;
    }
    Ok(())
}

async fn send_with_retry(
    sender: &dyn ChunkSender,
    chunk: &str,
    opts: ReplyOptions,
) -> Result<(), DeliveryError> {
    let mut attempt = 0u32;
    loop {
        match sender.send_chunk(chunk).await {
            Ok(()) => return Ok(()),
            Err(err) if attempt < opts.max_retries => {
                let delay_ms = opts.retry_base_ms * 2u64.saturating_pow(attempt);
                tokio::time::sleep(tokio::time::Duration::from_millis(delay_ms)).await;
                attempt += 1;
                tracing::debug!(attempt, %err, "retrying reply chunk send");
            },
            Err(err) => return Err(DeliveryError(err)),
        }
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use std::sync::{
        atomic::{AtomicUsize, Ordering},
        Mutex,
    };

    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case("hello world", 100)]
    #[case("para one.\n\npara two.\n\npara three.", 12)]
    #[case("First sentence here. Second sentence here. Third one too.", 25)]
    #[case::hard_cut(&"a".repeat(50), 10)]
    fn every_chunk_respects_the_limit(#[case] text: &str, #[case] max_chunk_size: usize) {
        let chunks = chunk_text(text, max_chunk_size);
        assert!(chunks.iter().all(|c| c.chars().count() <= max_chunk_size));
    }

    #[test]
    fn short_text_is_a_single_chunk() {
        let chunks = chunk_text("hello world", 100);
        assert_eq!(chunks, vec!["hello world".to_string()]);
    }

    #[test]
    fn splits_on_paragraph_boundaries_when_they_fit() {
        let text = "para one.\n\npara two.\n\npara three.";
        let chunks = chunk_text(text, 12);
        assert!(chunks.iter().all(|c| c.chars().count() <= 12));
        assert_eq!(chunks, vec!["para one.", "para two.", "para three."]);
    }

    #[test]
    fn falls_back_to_sentence_split_when_paragraphs_too_long() {
        let text = "First sentence here. Second sentence here. Third one too.";
        let chunks = chunk_text(text, 25);
        assert!(chunks.iter().all(|c| c.chars().count() <= 25));
        assert!(chunks.len() > 1);
    }

    #[test]
    fn hard_cuts_when_no_natural_boundary_fits() {
        let text = "a".repeat(50);
        let chunks = chunk_text(&text, 10);
        assert_eq!(chunks.len(), 5);
        assert!(chunks.iter().all(|c| c.chars().count() == 10));
    }

    #[test]
    fn chunking_is_lossless() {
        let text = "First sentence. Second sentence. Third sentence.";
        let chunks = chunk_text(text, 20);
        let rejoined: String = chunks.join(" ");
        let normalized_original: String = text.split_whitespace().collect::<Vec<_>>().join(" ");
        let normalized_rejoined: String = rejoined.split_whitespace().collect::<Vec<_>>().join(" ");
        assert_eq!(normalized_original, normalized_rejoined);
    }

    struct FlakySender {
        fail_times: AtomicUsize,
        received: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl ChunkSender for FlakySender {
        async fn send_chunk(&self, chunk: &str) -> Result<(), String> {
            if self.fail_times.load(Ordering::SeqCst) > 0 {
                self.fail_times.fetch_sub(1, Ordering::SeqCst);
                return Err("transient failure".to_string());
            }
            self.received.lock().expect("mutex poisoned").push(chunk.to_string());
            Ok(())
        }
    }

    #[tokio::test]
    async fn retries_until_success_within_budget() {
        let sender = FlakySender {
            fail_times: AtomicUsize::new(2),
            received: Mutex::new(Vec::new()),
        };
        let opts = ReplyOptions {
            max_chunk_size: 4_000,
            max_retries: 3,
            retry_base_ms: 1,
        };
        deliver(&sender, "hello", opts).await.unwrap();
        assert_eq!(sender.received.lock().unwrap().as_slice(), ["hello"]);
    }

    #[tokio::test]
    async fn propagates_error_after_exhausting_retries() {
        let sender = FlakySender {
            fail_times: AtomicUsize::new(10),
            received: Mutex::new(Vec::new()),
        };
        let opts = ReplyOptions {
            max_chunk_size: 4_000,
            max_retries: 2,
            retry_base_ms: 1,
        };
        let result = deliver(&sender, "hello", opts).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn chunks_are_sent_in_order() {
        let sender = FlakySender {
            fail_times: AtomicUsize::new(0),
            received: Mutex::new(Vec::new()),
        };
        let opts = ReplyOptions {
            max_chunk_size: 10,
            max_retries: 0,
            retry_base_ms: 1,
        };
        let text = "a".repeat(30);
        deliver(&sender, &text, opts).await.unwrap();
        let received = sender.received.lock().unwrap();
        assert_eq!(received.len(), 3);
        assert!(received.iter().all(|c| c == &"a".repeat(10)));
    }
}
