use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A single chat message as delivered by the backend, either from the history
/// endpoint or echoed back on the conversation topic. Immutable once stored.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    pub id: Uuid,
    /// The original backend named this field `friendshipId`; both spellings are
    /// accepted on the wire.
    #[serde(alias = "friendshipId")]
    pub conversation_id: Uuid,
    pub sender_id: Uuid,
    pub sender_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sender_picture: Option<String>,
    #[serde(default)]
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attachment_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attachment_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attachment_name: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl ChatMessage {
    pub fn has_attachment(&self) -> bool {
        self.attachment_url.is_some()
    }
}

/// The remote side of a 1:1 conversation. Fetched once per conversation open
/// and held immutable for the lifetime of the view.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Participant {
    pub id: Uuid,
    pub username: String,
    #[serde(rename = "name")]
    pub display_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub picture: Option<String>,
}

/// Ephemeral typing-presence signal fanned out on the typing topic. Never
/// persisted; consumed only to mutate the presence set.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct TypingEvent {
    #[serde(rename = "type")]
    pub kind: String,
    pub user_id: Uuid,
    #[serde(default)]
    pub user_name: String,
    pub is_typing: bool,
}

impl TypingEvent {
    pub const KIND: &'static str = "typing";

    pub fn is_typing_kind(&self) -> bool {
        self.kind == Self::KIND
    }
}

/// Identity of the authenticated local user. Session issuance is owned by the
/// external auth service; the chat layer only ever reads this.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalUser {
    pub id: Uuid,
    pub username: String,
    pub display_name: String,
}

/// Lifecycle of a broker connection. Owned exclusively by the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Disconnected,
    Connecting,
    Connected,
}

/// Events a connection session emits toward its consumer (the room pump).
#[derive(Debug, Clone)]
pub enum SessionEvent {
    ConnectionChange(bool),
    Message(ChatMessage),
    Typing(TypingEvent),
    Error(String),
}
