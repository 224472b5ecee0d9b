//! `Session` type and its storage trait.
//!
//! The Gateway is agnostic to whether sessions live in files, SQLite, or
//! memory (`spec.md` §1 Out of scope); this crate defines the contract
//! (`SessionStore`) plus an in-memory implementation sufficient for the
//! Gateway to run standalone and for tests to instantiate independently
//! (`spec.md` §9 Design Notes — no module-level singletons).

use {
    async_trait::async_trait,
    dashmap::DashMap,
    serde::{Deserialize, Serialize},
};

use crate::message::SessionMessage;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionKind {
    Cli,
    Channel,
    Subagent,
    Cron,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub session_key: String,
    pub kind: SessionKind,
    #[serde(default)]
    pub label: Option<String>,
    #[serde(default)]
    pub agent_id: Option<String>,
    #[serde(default)]
    pub metadata: serde_json::Value,
    pub created_at: i64,
    pub updated_at: i64,
}

impl Session {
    #[must_use]
    pub fn new(session_key: impl Into<String>, kind: SessionKind, now: i64) -> Self {
        Self {
            session_key: session_key.into(),
            kind,
            label: None,
            agent_id: None,
            metadata: serde_json::Value::Null,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Storage contract for sessions and their message history.
///
/// Sessions are created on first inbound message or explicit RPC, mutated by
/// `append_message` and agent runs, and deleted only explicitly — never
/// garbage-collected implicitly (`spec.md` §3 Lifecycles).
#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn get_or_create(&self, session_key: &str, kind: SessionKind, now: i64) -> Session;
    async fn get(&self, session_key: &str) -> Option<Session>;
    async fn list(&self) -> Vec<Session>;
    async fn append_message(&self, session_key: &str, message: SessionMessage, now: i64);
    async fn history(&self, session_key: &str) -> Vec<SessionMessage>;
    async fn delete(&self, session_key: &str) -> bool;
}

/// Default in-memory `SessionStore`.
#[derive(Default)]
pub struct MemorySessionStore {
    sessions: DashMap<String, Session>,
    history: DashMap<String, Vec<SessionMessage>>,
}

impl MemorySessionStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn get_or_create(&self, session_key: &str, kind: SessionKind, now: i64) -> Session {
        self.sessions
            .entry(session_key.to_string())
            .or_insert_with(|| Session::new(session_key, kind, now))
            .clone()
    }

    async fn get(&self, session_key: &str) -> Option<Session> {
        self.sessions.get(session_key).map(|s| s.clone())
    }

    async fn list(&self) -> Vec<Session> {
        self.sessions.iter().map(|e| e.value().clone()).collect()
    }

    async fn append_message(&self, session_key: &str, message: SessionMessage, now: i64) {
        self.history
            .entry(session_key.to_string())
            .or_default()
            .push(message);
        if let Some(mut session) = self.sessions.get_mut(session_key) {
            session.updated_at = now;
        }
    }

    async fn history(&self, session_key: &str) -> Vec<SessionMessage> {
        self.history
            .get(session_key)
            .map(|h| h.clone())
            .unwrap_or_default()
    }

    async fn delete(&self, session_key: &str) -> bool {
        self.history.remove(session_key);
        self.sessions.remove(session_key).is_some()
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn get_or_create_is_idempotent() {
        let store = MemorySessionStore::new();
        let a = store.get_or_create("cli:chat", SessionKind::Cli, 100).await;
        let b = store.get_or_create("cli:chat", SessionKind::Cli, 200).await;
        assert_eq!(a.created_at, b.created_at);
    }

    #[tokio::test]
    async fn messages_persist_in_arrival_order() {
        let store = MemorySessionStore::new();
        store.get_or_create("cli:chat", SessionKind::Cli, 0).await;
        store
            .append_message("cli:chat", SessionMessage::user("a", 1), 1)
            .await;
        store
            .append_message("cli:chat", SessionMessage::assistant("b", 2), 2)
            .await;
        let history = store.history("cli:chat").await;
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].content, "a");
        assert_eq!(history[1].content, "b");
    }

    #[tokio::test]
    async fn delete_removes_session_and_history() {
        let store = MemorySessionStore::new();
        store.get_or_create("cli:chat", SessionKind::Cli, 0).await;
        store
            .append_message("cli:chat", SessionMessage::user("a", 1), 1)
            .await;
        assert!(store.delete("cli:chat").await);
        assert!(store.get("cli:chat").await.is_none());
        assert!(store.history("cli:chat").await.is_empty());
    }

    #[tokio::test]
    async fn sessions_are_never_implicitly_garbage_collected() {
        let store = MemorySessionStore::new();
        store.get_or_create("cli:chat", SessionKind::Cli, 0).await;
        // No implicit expiry mechanism exists; session remains until deleted.
        assert!(store.get("cli:chat").await.is_some());
    }
}
