//! Session-key conventions shared by the inbound pipeline, the session
//! queue, and the agent lifecycle's subagent detection.
//!
//! Format: `<kind-or-channel>:<identifier>`, with a leading `+` stripped
//! from phone-number identifiers.

/// Normalize a `(channel, identifier)` pair into a canonical session key.
///
/// Strips a leading `+` from the identifier (phone numbers) and trims
/// surrounding whitespace from both parts.
#[must_use]
pub fn normalize_session_key(channel: &str, identifier: &str) -> String {
    let channel = channel.trim();
    let identifier = identifier.trim();
    let identifier = identifier.strip_prefix('+').unwrap_or(identifier);
    format!("{channel}:{identifier}")
}

/// Whether a session key identifies a subagent session.
///
/// Matches `agent:*`, `*:subagent:*`, or any key containing the substring
/// `subagent`.
#[must_use]
pub fn is_subagent_key(key: &str) -> bool {
    key.starts_with("agent:") || key.contains(":subagent:") || key.contains("subagent")
}
