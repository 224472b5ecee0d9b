//! On-disk media naming contract (`spec.md` §6): a pure path/filename
//! computation, not a storage implementation — saving bytes to disk is a
//! persistence collaborator's job and stays out of this crate per
//! `spec.md` §1's Non-goals.

use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};

/// `media/<session-key-with-colons-as-dashes>/` directory component for a
/// given session key.
#[must_use]
pub fn media_dir_name(session_key: &str) -> String {
    session_key.replace(':', "-")
}

/// `YYYY-MM-DD_HHMMSS_<4-hex-sha256-prefix>.<ext>`, `ext` derived from
/// `mime_type`. Unknown MIME types fall back to `bin`.
#[must_use]
pub fn media_filename(timestamp: DateTime<Utc>, content: &[u8], mime_type: &str) -> String {
    let stamp = timestamp.format("%Y-%m-%d_%H%M%S");
    let prefix = content_hash_prefix(content);
    let ext = extension_for_mime(mime_type);
    format!("{stamp}_{prefix}.{ext}")
}

fn content_hash_prefix(content: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content);
    let digest = hasher.finalize();
    format!("{:02x}{:02x}", digest[0], digest[1])
}

fn extension_for_mime(mime_type: &str) -> &'static str {
    match mime_type {
        "image/jpeg" => "jpg",
        "image/png" => "png",
        "image/webp" => "webp",
        "image/gif" => "gif",
        "audio/ogg" | "audio/ogg; codecs=opus" => "ogg",
        "audio/mpeg" => "mp3",
        "audio/wav" | "audio/x-wav" => "wav",
        "video/mp4" => "mp4",
        "application/pdf" => "pdf",
        _ => "bin",
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    #[test]
    fn session_key_colons_become_dashes() {
        assert_eq!(media_dir_name("whatsapp:61423000000"), "whatsapp-61423000000");
        assert_eq!(media_dir_name("agent:subagent:task1"), "agent-subagent-task1");
    }

    #[test]
    fn filename_matches_the_specified_shape() {
        let ts = Utc.with_ymd_and_hms(2026, 7, 28, 13, 5, 9).unwrap();
        let name = media_filename(ts, b"hello", "image/png");
        assert!(name.starts_with("2026-07-28_130509_"));
        assert!(name.ends_with(".png"));
        // stamp + underscore + 4 hex chars + ".png"
        assert_eq!(name.len(), "2026-07-28_130509_".len() + 4 + ".png".len());
    }

    #[test]
    fn same_content_and_timestamp_yields_the_same_name() {
        let ts = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
        assert_eq!(
            media_filename(ts, b"same bytes", "audio/ogg"),
            media_filename(ts, b"same bytes", "audio/ogg")
        );
    }

    #[test]
    fn unknown_mime_falls_back_to_bin() {
        let ts = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
        let name = media_filename(ts, b"x", "application/x-unknown-thing");
        assert!(name.ends_with(".bin"));
    }
}
