//! An open conversation: the surface a rendering layer talks to.
//!
//! Opening a room fetches history and the remote participant in parallel,
//! registers a broker session for the conversation, and starts a pump task
//! that folds session events into the room state. All state reads go through
//! [`ChatRoom::snapshot`]; all mutations happen on the pump task or behind the
//! same lock, so the render layer never observes a half-applied update.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{RwLock, mpsc};
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::api::{ChatApiClient, DEFAULT_HISTORY_LIMIT};
use crate::auth::TokenProvider;
use crate::conversation::{
    ConversationStore, PresenceAggregator, SearchController, SearchSnapshot,
};
use crate::delivery::DeliveryCoordinator;
use crate::error::Result;
use crate::event_bus::{AppEvent, EventBus};
use crate::session::{ChatSession, SessionRegistry};
use crate::types::{ChatMessage, LocalUser, Participant, SessionEvent};
use crate::typing::TypingDebouncer;

/// Consistent view of a room for rendering. `messages` pairs each message
/// with its first-in-group flag.
#[derive(Debug, Clone)]
pub struct RoomSnapshot {
    pub messages: Vec<(ChatMessage, bool)>,
    pub participant: Participant,
    pub connected: bool,
    pub someone_typing: bool,
    pub search: Option<SearchSnapshot>,
}

#[derive(Debug)]
struct RoomState {
    store: ConversationStore,
    presence: PresenceAggregator,
    search: SearchController,
    connected: bool,
    local_typing: bool,
}

pub struct ChatRoom {
    conversation_id: Uuid,
    participant: Participant,
    api: Arc<ChatApiClient>,
    session: Arc<ChatSession>,
    delivery: DeliveryCoordinator,
    registry: Arc<SessionRegistry>,
    bus: EventBus,
    debouncer: TypingDebouncer,
    state: Arc<RwLock<RoomState>>,
    pump: JoinHandle<()>,
    typing_pump: JoinHandle<()>,
}

impl std::fmt::Debug for ChatRoom {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChatRoom")
            .field("conversation_id", &self.conversation_id)
            .field("participant", &self.participant.username)
            .finish()
    }
}

impl ChatRoom {
    #[allow(clippy::too_many_arguments)]
    pub async fn open(
        conversation_id: Uuid,
        local_user: LocalUser,
        api: Arc<ChatApiClient>,
        tokens: Arc<dyn TokenProvider>,
        registry: Arc<SessionRegistry>,
        bus: EventBus,
        ws_url: String,
        connect_timeout: Duration,
        typing_timeout: Duration,
    ) -> Result<Self> {
        let (history, participant) = tokio::try_join!(
            api.fetch_messages(conversation_id, DEFAULT_HISTORY_LIMIT),
            api.fetch_participant(conversation_id),
        )?;
        tracing::debug!(
            target: "flowchat::room",
            conversation_id = %conversation_id,
            history_len = history.len(),
            "Opening conversation with {}",
            participant.username
        );

        let (session, session_events) = registry.open(conversation_id, ws_url, tokens);
        let delivery = DeliveryCoordinator::new(Arc::clone(&session), connect_timeout);

        let state = Arc::new(RwLock::new(RoomState {
            store: ConversationStore::from_history(history),
            presence: PresenceAggregator::new(local_user.id),
            search: SearchController::new(),
            connected: false,
            local_typing: false,
        }));

        let pump = tokio::spawn(pump_events(
            conversation_id,
            Arc::clone(&state),
            bus.clone(),
            session_events,
        ));

        let (debouncer, typing_signals) = TypingDebouncer::spawn(typing_timeout);
        let typing_pump = tokio::spawn(pump_typing(
            Arc::clone(&state),
            delivery.clone(),
            typing_signals,
        ));

        // First connect runs in the background; the room is usable (history,
        // search, retry) even while the broker is unreachable.
        {
            let session = Arc::clone(&session);
            tokio::spawn(async move {
                session.connect().await;
            });
        }

        Ok(Self {
            conversation_id,
            participant,
            api,
            session,
            delivery,
            registry,
            bus,
            debouncer,
            state,
            pump,
            typing_pump,
        })
    }

    pub fn conversation_id(&self) -> Uuid {
        self.conversation_id
    }

    pub fn participant(&self) -> &Participant {
        &self.participant
    }

    pub async fn snapshot(&self) -> RoomSnapshot {
        let mut state = self.state.write().await;
        let flags = state.store.group_flags();
        let messages = state
            .store
            .messages()
            .iter()
            .cloned()
            .zip(flags)
            .collect();
        let local_typing = state.local_typing;
        RoomSnapshot {
            messages,
            participant: self.participant.clone(),
            connected: state.connected,
            someone_typing: state.presence.someone_else_typing(local_typing),
            search: state.search.snapshot(),
        }
    }

    /// Send a chat message. The echoed message arrives on the topic; nothing
    /// is appended locally. On failure the caller keeps its input text and a
    /// user-facing notice is published.
    pub async fn send_message(&self, body: &str) -> bool {
        if body.trim().is_empty() {
            // Nothing to send; not an error either.
            return false;
        }
        let sent = self.delivery.send_message(body).await;
        if sent {
            self.debouncer.stop();
        } else {
            self.bus.notify_error("Could not send message");
        }
        sent
    }

    /// Feed every input-field change here; typing signals are debounced and
    /// forwarded to the typing destination.
    pub fn input_changed(&self, text: &str) {
        self.debouncer.input_changed(text);
    }

    /// Upload an attachment. The backend creates the message and broadcasts
    /// it on the topic, so the echo lands through the normal live path.
    pub async fn upload_attachment(
        &self,
        file_name: &str,
        bytes: Vec<u8>,
        content: &str,
    ) -> Result<ChatMessage> {
        let result = self
            .api
            .upload_attachment(self.conversation_id, file_name, bytes, content)
            .await;
        if let Err(err) = &result {
            self.bus.notify_error(format!("Upload failed: {err}"));
        }
        result
    }

    /// Run a server-side search. On failure the previous result set stays and
    /// a notice is published.
    ///
    /// The request runs without the state lock held, so message delivery and
    /// snapshots stay live while the server is thinking; the lock is taken
    /// only to fold the response in. A blank query clears the active search.
    pub async fn search(&self, query: &str) -> Result<()> {
        let query = query.trim();
        if query.is_empty() {
            self.state.write().await.search.clear();
            return Ok(());
        }
        match self.api.search_messages(self.conversation_id, query).await {
            Ok(response) => {
                self.state.write().await.search.apply_response(query, response);
                Ok(())
            }
            Err(err) => {
                tracing::warn!(
                    target: "flowchat::room",
                    conversation_id = %self.conversation_id,
                    "Search failed: {err}"
                );
                self.bus.notify_error("Search failed");
                Err(err)
            }
        }
    }

    pub async fn advance_match(&self, delta: i64) {
        self.state.write().await.search.advance(delta);
    }

    pub async fn clear_search(&self) {
        self.state.write().await.search.clear();
    }

    /// Manual reconnect after a drop. No automatic retry happens anywhere.
    pub async fn retry_connect(&self) -> bool {
        self.session.connect().await
    }

    /// Tear the room down: disconnect and deregister the session, stop both
    /// pump tasks.
    pub async fn close(&self) {
        self.registry.close(&self.session).await;
        self.pump.abort();
        self.typing_pump.abort();
    }
}

impl Drop for ChatRoom {
    fn drop(&mut self) {
        self.pump.abort();
        self.typing_pump.abort();
    }
}

/// Single writer into the room state: folds session events into the store and
/// presence set and republishes what the host UI cares about.
async fn pump_events(
    conversation_id: Uuid,
    state: Arc<RwLock<RoomState>>,
    bus: EventBus,
    mut events: mpsc::UnboundedReceiver<SessionEvent>,
) {
    while let Some(event) = events.recv().await {
        match event {
            SessionEvent::ConnectionChange(connected) => {
                state.write().await.connected = connected;
                bus.publish(AppEvent::ConnectionChanged {
                    conversation_id,
                    connected,
                });
            }
            SessionEvent::Message(message) => {
                let message_id = message.id;
                let appended = state.write().await.store.append(message);
                if appended {
                    bus.publish(AppEvent::MessageAppended {
                        conversation_id,
                        message_id,
                    });
                }
            }
            SessionEvent::Typing(event) => {
                state.write().await.presence.apply(&event);
            }
            SessionEvent::Error(detail) => {
                bus.notify_error(detail);
            }
        }
    }
}

async fn pump_typing(
    state: Arc<RwLock<RoomState>>,
    delivery: DeliveryCoordinator,
    mut signals: mpsc::UnboundedReceiver<bool>,
) {
    while let Some(typing) = signals.recv().await {
        state.write().await.local_typing = typing;
        delivery.send_typing(typing).await;
    }
}
