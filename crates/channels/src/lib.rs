//! Channel adapter contract, allow-list gating, message fingerprinting, and
//! the normalized inbound message shape shared by every messaging surface.

mod adapter;
mod fingerprint;
mod gating;
mod media;
mod normalized_input;
mod status;

pub use adapter::{ChannelAdapter, ChannelError, ChannelResult, InboundSink};
pub use gating::is_allowed;
pub use media::{media_dir_name, media_filename};
pub use normalized_input::{InputKind, InputSource, NormalizedInput};
pub use status::{ChannelHealthSnapshot, ChannelStatus};

pub mod fingerprints {
    pub use crate::fingerprint::{from_content, from_platform_id};
}
