//! Channel connection status (§4.11).
//!
//! Transitions are monotonic within a connection lifetime: an adapter moves
//! `disconnected -> connecting -> connected`, and may drop to `error` or back
//! to `disconnected` at any point, but never reports `connected` without
//! having passed through `connecting` first.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChannelStatus {
    Disconnected,
    Connecting,
    Connected,
    Error,
}

impl ChannelStatus {
    /// Whether `self -> next` is a legal transition.
    #[must_use]
    pub fn can_transition_to(self, next: ChannelStatus) -> bool {
        use ChannelStatus::{Connected, Connecting, Disconnected, Error};
        match (self, next) {
            (Disconnected, Connecting)
            | (Connecting, Connected)
            | (Connecting, Error)
            | (Connecting, Disconnected)
            | (Connected, Disconnected)
            | (Connected, Error)
            | (Error, Connecting)
            | (Error, Disconnected) => true,
            (a, b) => a == b,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelHealthSnapshot {
    pub channel: String,
    pub status: ChannelStatus,
    pub last_transition_at: i64,
    #[serde(default)]
    pub detail: Option<String>,
}
