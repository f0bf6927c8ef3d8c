//! Outbound delivery: publish immediately when connected, otherwise connect
//! lazily under a bounded wait and publish on success.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::timeout;

use crate::session::ChatSession;

/// How long a send will wait for a lazy connect before giving up.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(7);

#[derive(Debug, Clone)]
pub struct DeliveryCoordinator {
    session: Arc<ChatSession>,
    connect_timeout: Duration,
}

impl DeliveryCoordinator {
    pub fn new(session: Arc<ChatSession>, connect_timeout: Duration) -> Self {
        Self {
            session,
            connect_timeout,
        }
    }

    /// Deliver a chat message, connecting first if necessary.
    ///
    /// Resolves exactly once per call: `true` when the frame was written to
    /// the broker socket, `false` on a failed or timed-out connect, a write
    /// error, or a blank body. The caller keeps the input text on `false`.
    pub async fn send_message(&self, body: &str) -> bool {
        let body = body.trim();
        if body.is_empty() {
            return false;
        }

        if !self.session.is_connected().await && !self.connect_within_deadline().await {
            return false;
        }

        match self.session.send_chat(body).await {
            Ok(()) => true,
            Err(err) => {
                tracing::warn!(
                    target: "flowchat::delivery",
                    conversation_id = %self.session.conversation_id(),
                    "Failed to publish message: {err}"
                );
                false
            }
        }
    }

    /// Forward a typing signal. Only published while connected; typing
    /// presence is not worth a connection attempt, and a failed write is
    /// logged and dropped.
    pub async fn send_typing(&self, typing: bool) {
        if !self.session.is_connected().await {
            return;
        }
        if let Err(err) = self.session.send_typing(typing).await {
            tracing::debug!(
                target: "flowchat::delivery",
                conversation_id = %self.session.conversation_id(),
                "Dropped typing signal: {err}"
            );
        }
    }

    /// Run the connect attempt on its own task so the deadline firing here
    /// abandons only this caller's wait. The attempt itself keeps running and
    /// settles the session's state either way, so no caller can strand it in
    /// a connecting limbo.
    async fn connect_within_deadline(&self) -> bool {
        let session = Arc::clone(&self.session);
        let attempt = tokio::spawn(async move { session.connect().await });
        match timeout(self.connect_timeout, attempt).await {
            Ok(Ok(connected)) => connected,
            Ok(Err(_)) => false,
            Err(_) => {
                tracing::warn!(
                    target: "flowchat::delivery",
                    conversation_id = %self.session.conversation_id(),
                    timeout_ms = self.connect_timeout.as_millis() as u64,
                    "Connect did not complete within the send deadline"
                );
                false
            }
        }
    }
}
