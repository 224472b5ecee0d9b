//! Session and session-message data model, plus the storage contract the
//! Gateway relies on to remain agnostic to the backing store.

mod message;
mod store;

pub use message::{MessageRole, SessionMessage};
pub use store::{MemorySessionStore, Session, SessionKind, SessionStore};
