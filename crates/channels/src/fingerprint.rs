//! Stable message fingerprints for dedupe (§4.12 step 2, glossary
//! "Fingerprint").
//!
//! Preferred form is `<channel>:<platform-id>` when the adapter's native
//! message carries a stable id. Adapters that receive messages with no such
//! id (some webhook deliveries resend without one) fall back to a content
//! hash so duplicate deliveries of the same text still collide.

use sha2::{Digest, Sha256};

#[must_use]
pub fn from_platform_id(channel: &str, platform_id: &str) -> String {
    format!("{channel}:{platform_id}")
}

#[must_use]
pub fn from_content(channel: &str, sender_id: &str, content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(channel.as_bytes());
    hasher.update(b":");
    hasher.update(sender_id.as_bytes());
    hasher.update(b":");
    hasher.update(content.as_bytes());
    let digest = hasher.finalize();
    format!("{channel}:{digest:x}")
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn platform_id_fingerprint_is_stable() {
        assert_eq!(from_platform_id("whatsapp", "abc123"), "whatsapp:abc123");
    }

    #[test]
    fn content_fingerprint_is_deterministic() {
        let a = from_content("telegram", "user1", "hello");
        let b = from_content("telegram", "user1", "hello");
        assert_eq!(a, b);
    }

    #[test]
    fn content_fingerprint_differs_on_content() {
        let a = from_content("telegram", "user1", "hello");
        let b = from_content("telegram", "user1", "goodbye");
        assert_ne!(a, b);
    }

    #[test]
    fn content_fingerprint_differs_on_sender() {
        let a = from_content("telegram", "user1", "hello");
        let b = from_content("telegram", "user2", "hello");
        assert_ne!(a, b);
    }
}
