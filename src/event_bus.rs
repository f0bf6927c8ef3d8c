//! In-process typed event bus.
//!
//! Components publish application-level events (connection changes, user-facing
//! notifications) on a broadcast channel instead of firing ambient string-named
//! browser-style events; consumers subscribe for exactly the payloads they can
//! type-match on.

use tokio::sync::broadcast;
use uuid::Uuid;

const BUFFER_SIZE: usize = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeLevel {
    Info,
    Error,
}

/// Application events the chat layer publishes for host UI consumption.
#[derive(Debug, Clone)]
pub enum AppEvent {
    /// Connection state of a conversation's session changed.
    ConnectionChanged { conversation_id: Uuid, connected: bool },
    /// A message was appended to a conversation's store.
    MessageAppended { conversation_id: Uuid, message_id: Uuid },
    /// A user-visible notification (transport errors, failed sends, ...).
    Notice { level: NoticeLevel, message: String },
}

#[derive(Debug, Clone)]
pub struct EventBus {
    sender: broadcast::Sender<AppEvent>,
}

impl EventBus {
    pub fn new() -> Self {
        Self {
            sender: broadcast::channel(BUFFER_SIZE).0,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<AppEvent> {
        self.sender.subscribe()
    }

    /// Publish an event; a send with no live subscribers is a no-op.
    pub fn publish(&self, event: AppEvent) {
        let _ = self.sender.send(event);
    }

    pub fn notify_error(&self, message: impl Into<String>) {
        self.publish(AppEvent::Notice {
            level: NoticeLevel::Error,
            message: message.into(),
        });
    }

    pub fn notify_info(&self, message: impl Into<String>) {
        self.publish(AppEvent::Notice {
            level: NoticeLevel::Info,
            message: message.into(),
        });
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}
