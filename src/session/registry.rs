//! Per-conversation session exclusivity.
//!
//! At most one live session exists per conversation id: opening a new one
//! supersedes and tears down whatever was registered before it. This is the
//! primary guard against double delivery of broker frames.

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::auth::TokenProvider;
use crate::session::{ChatSession, spawn_disconnect};
use crate::types::SessionEvent;

#[derive(Debug, Default)]
pub struct SessionRegistry {
    sessions: DashMap<Uuid, Arc<ChatSession>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create and register a session for a conversation. Any previously
    /// registered session for the same conversation is torn down in the
    /// background.
    pub fn open(
        &self,
        conversation_id: Uuid,
        ws_url: impl Into<String>,
        tokens: Arc<dyn TokenProvider>,
    ) -> (Arc<ChatSession>, mpsc::UnboundedReceiver<SessionEvent>) {
        let (session, events) = ChatSession::new(conversation_id, ws_url, tokens);
        let session = Arc::new(session);
        if let Some(previous) = self.sessions.insert(conversation_id, Arc::clone(&session)) {
            tracing::debug!(
                target: "flowchat::session::registry",
                conversation_id = %conversation_id,
                "Superseding existing session"
            );
            spawn_disconnect(previous);
        }
        (session, events)
    }

    pub fn get(&self, conversation_id: &Uuid) -> Option<Arc<ChatSession>> {
        self.sessions
            .get(conversation_id)
            .map(|entry| Arc::clone(entry.value()))
    }

    /// Deregister and tear down a conversation's session, if the given handle
    /// is still the registered one. A handle already superseded is ignored so
    /// a stale room closing late cannot kill its replacement.
    pub async fn close(&self, session: &Arc<ChatSession>) {
        let conversation_id = session.conversation_id();
        let removed = self
            .sessions
            .remove_if(&conversation_id, |_, current| Arc::ptr_eq(current, session));
        if removed.is_some() {
            session.disconnect().await;
        }
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}
