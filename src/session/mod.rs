//! One STOMP-over-WebSocket connection per open conversation.
//!
//! The session owns the full connection lifecycle: WebSocket connect, STOMP
//! handshake with the bearer credential, the two topic subscriptions, and a
//! reader task that demuxes inbound frames into [`SessionEvent`]s. There is no
//! automatic retry; a dropped connection surfaces as
//! `SessionEvent::ConnectionChange(false)` and the consumer decides when to
//! reconnect.

pub mod registry;

pub use registry::SessionRegistry;

use std::sync::Arc;

use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::{Mutex, mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use uuid::Uuid;

use crate::auth::TokenProvider;
use crate::error::{FlowchatError, Result};
use crate::stomp::{
    Command, Frame, connect_frame, disconnect_frame, send_frame, subscribe_frame,
    unsubscribe_frame,
};
use crate::types::{ChatMessage, SessionEvent, SessionState, TypingEvent};

type WsWriter = SplitSink<WebSocketStream<MaybeTlsStream<TcpStream>>, WsMessage>;
type WsReader = SplitStream<WebSocketStream<MaybeTlsStream<TcpStream>>>;

#[derive(Debug)]
struct Inner {
    state: SessionState,
    /// Bumped on every new connect attempt and every teardown. A handshake or
    /// reader task carrying a stale epoch must not touch the state: the
    /// connection it belongs to has been superseded.
    epoch: u64,
    writer: Option<WsWriter>,
    reader_task: Option<JoinHandle<()>>,
    /// Callers awaiting an in-flight connect attempt. Each is resolved exactly
    /// once: `true` on handshake completion, `false` on failure or teardown.
    waiters: Vec<oneshot::Sender<bool>>,
    message_sub: String,
    typing_sub: String,
}

/// A conversation's broker connection. Cheap to share behind an `Arc`; all
/// methods take `&self`.
pub struct ChatSession {
    conversation_id: Uuid,
    ws_url: String,
    tokens: Arc<dyn TokenProvider>,
    events: mpsc::UnboundedSender<SessionEvent>,
    inner: Arc<Mutex<Inner>>,
}

impl std::fmt::Debug for ChatSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChatSession")
            .field("conversation_id", &self.conversation_id)
            .field("ws_url", &self.ws_url)
            .finish()
    }
}

impl ChatSession {
    pub fn new(
        conversation_id: Uuid,
        ws_url: impl Into<String>,
        tokens: Arc<dyn TokenProvider>,
    ) -> (Self, mpsc::UnboundedReceiver<SessionEvent>) {
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let session = Self {
            conversation_id,
            ws_url: ws_url.into(),
            tokens,
            events: event_tx,
            inner: Arc::new(Mutex::new(Inner {
                state: SessionState::Disconnected,
                epoch: 0,
                writer: None,
                reader_task: None,
                waiters: Vec::new(),
                message_sub: String::new(),
                typing_sub: String::new(),
            })),
        };
        (session, event_rx)
    }

    pub fn conversation_id(&self) -> Uuid {
        self.conversation_id
    }

    pub async fn state(&self) -> SessionState {
        self.inner.lock().await.state
    }

    pub async fn is_connected(&self) -> bool {
        self.state().await == SessionState::Connected
    }

    /// Establish the connection. Idempotent: already connected resolves `true`
    /// immediately, and callers arriving while an attempt is in flight share
    /// that attempt's outcome instead of racing a second handshake.
    pub async fn connect(&self) -> bool {
        let attempt = {
            let mut inner = self.inner.lock().await;
            match inner.state {
                SessionState::Connected => return true,
                SessionState::Connecting => {
                    let (tx, rx) = oneshot::channel();
                    inner.waiters.push(tx);
                    drop(inner);
                    // Sender dropped (teardown mid-attempt) counts as failure.
                    return rx.await.unwrap_or(false);
                }
                SessionState::Disconnected => {
                    inner.state = SessionState::Connecting;
                    inner.epoch += 1;
                    inner.epoch
                }
            }
        };

        match self.establish(attempt).await {
            Ok(()) => true,
            Err(err) => {
                tracing::warn!(
                    target: "flowchat::session",
                    conversation_id = %self.conversation_id,
                    "Connect failed: {err}"
                );
                let _ = self
                    .events
                    .send(SessionEvent::Error(format!("Connection failed: {err}")));
                let mut inner = self.inner.lock().await;
                // A newer attempt or a teardown owns the state now; this
                // failure only concerns its own epoch.
                if inner.epoch == attempt {
                    inner.state = SessionState::Disconnected;
                    for waiter in inner.waiters.drain(..) {
                        let _ = waiter.send(false);
                    }
                }
                false
            }
        }
    }

    async fn establish(&self, attempt: u64) -> Result<()> {
        let token = self
            .tokens
            .bearer_token()
            .ok_or(FlowchatError::NotAuthenticated)?;

        let (ws, _response) = connect_async(&self.ws_url).await?;
        let (mut writer, mut reader) = ws.split();

        writer
            .send(WsMessage::Text(connect_frame(&token).encode()))
            .await?;
        await_connected(&mut reader).await?;

        let message_sub = format!("sub-{}", Uuid::new_v4());
        let typing_sub = format!("sub-{}", Uuid::new_v4());
        let message_topic = format!("/topic/chats/{}", self.conversation_id);
        let typing_topic = format!("/topic/chats/{}/typing", self.conversation_id);
        writer
            .send(WsMessage::Text(
                subscribe_frame(&message_sub, &message_topic).encode(),
            ))
            .await?;
        writer
            .send(WsMessage::Text(
                subscribe_frame(&typing_sub, &typing_topic).encode(),
            ))
            .await?;

        let reader_task = tokio::spawn(read_loop(
            self.conversation_id,
            attempt,
            Arc::clone(&self.inner),
            self.events.clone(),
            reader,
            typing_sub.clone(),
        ));

        let mut inner = self.inner.lock().await;
        if inner.epoch != attempt {
            // Torn down or superseded while the handshake was in flight; do
            // not install this transport over whatever owns the state now.
            reader_task.abort();
            let _ = writer.close().await;
            return Err(FlowchatError::Handshake(
                "session was torn down during connect".to_string(),
            ));
        }
        inner.writer = Some(writer);
        inner.reader_task = Some(reader_task);
        inner.message_sub = message_sub;
        inner.typing_sub = typing_sub;
        inner.state = SessionState::Connected;
        for waiter in inner.waiters.drain(..) {
            let _ = waiter.send(true);
        }
        drop(inner);

        tracing::debug!(
            target: "flowchat::session",
            conversation_id = %self.conversation_id,
            "Session connected"
        );
        let _ = self.events.send(SessionEvent::ConnectionChange(true));
        Ok(())
    }

    /// Tear the connection down: unsubscribe both topics, close the socket,
    /// stop the reader, release pending waiters. No-op when already down.
    pub async fn disconnect(&self) {
        let mut inner = self.inner.lock().await;
        if inner.state == SessionState::Disconnected && inner.waiters.is_empty() {
            return;
        }
        let was_connected = inner.state == SessionState::Connected;
        // Invalidate any in-flight handshake and its reader.
        inner.epoch += 1;

        if let Some(mut writer) = inner.writer.take() {
            // Best effort: the socket may already be gone.
            let _ = writer
                .send(WsMessage::Text(
                    unsubscribe_frame(&inner.message_sub).encode(),
                ))
                .await;
            let _ = writer
                .send(WsMessage::Text(
                    unsubscribe_frame(&inner.typing_sub).encode(),
                ))
                .await;
            let _ = writer
                .send(WsMessage::Text(disconnect_frame().encode()))
                .await;
            let _ = writer.close().await;
        }
        if let Some(task) = inner.reader_task.take() {
            task.abort();
        }
        inner.state = SessionState::Disconnected;
        for waiter in inner.waiters.drain(..) {
            let _ = waiter.send(false);
        }
        drop(inner);

        tracing::debug!(
            target: "flowchat::session",
            conversation_id = %self.conversation_id,
            "Session disconnected"
        );
        if was_connected {
            let _ = self.events.send(SessionEvent::ConnectionChange(false));
        }
    }

    /// Publish a chat message to the conversation's send destination. The
    /// body is trimmed; an empty body is silently skipped.
    pub async fn send_chat(&self, body: &str) -> Result<()> {
        let body = body.trim();
        if body.is_empty() {
            return Ok(());
        }
        let destination = format!("/app/chats/{}/send", self.conversation_id);
        self.publish(send_frame(&destination, body)).await
    }

    /// Publish a typing-presence signal. Fire-and-forget at the transport
    /// level: success means the frame was written to the socket.
    pub async fn send_typing(&self, typing: bool) -> Result<()> {
        let destination = format!("/app/chats/{}/typing", self.conversation_id);
        let body = if typing { "true" } else { "false" };
        self.publish(send_frame(&destination, body)).await
    }

    async fn publish(&self, frame: Frame) -> Result<()> {
        let mut inner = self.inner.lock().await;
        let writer = inner.writer.as_mut().ok_or(FlowchatError::NotConnected)?;
        writer.send(WsMessage::Text(frame.encode())).await?;
        Ok(())
    }
}

/// Drain the socket until the broker answers the STOMP handshake.
async fn await_connected(reader: &mut WsReader) -> Result<()> {
    while let Some(message) = reader.next().await {
        let WsMessage::Text(text) = message? else {
            continue;
        };
        let Some(frame) = Frame::parse(&text)? else {
            continue;
        };
        match frame.command {
            Command::Connected => return Ok(()),
            Command::Error => {
                let detail = frame
                    .get_header("message")
                    .map(str::to_string)
                    .unwrap_or(frame.body);
                return Err(FlowchatError::Handshake(detail));
            }
            other => {
                tracing::debug!(
                    target: "flowchat::session",
                    "Ignoring {other} frame during handshake"
                );
            }
        }
    }
    Err(FlowchatError::Handshake(
        "socket closed before CONNECTED".to_string(),
    ))
}

async fn read_loop(
    conversation_id: Uuid,
    attempt: u64,
    inner: Arc<Mutex<Inner>>,
    events: mpsc::UnboundedSender<SessionEvent>,
    mut reader: WsReader,
    typing_sub: String,
) {
    while let Some(message) = reader.next().await {
        let text = match message {
            Ok(WsMessage::Text(text)) => text,
            Ok(WsMessage::Close(_)) => break,
            Ok(_) => continue,
            Err(err) => {
                tracing::warn!(
                    target: "flowchat::session",
                    conversation_id = %conversation_id,
                    "WebSocket read error: {err}"
                );
                break;
            }
        };
        let frame = match Frame::parse(&text) {
            Ok(Some(frame)) => frame,
            Ok(None) => continue, // heart-beat
            Err(err) => {
                tracing::warn!(
                    target: "flowchat::session",
                    conversation_id = %conversation_id,
                    "Dropping unparseable frame: {err}"
                );
                continue;
            }
        };
        match frame.command {
            Command::Message => dispatch_message(&events, &typing_sub, frame),
            Command::Error => {
                let detail = frame
                    .get_header("message")
                    .map(str::to_string)
                    .unwrap_or(frame.body);
                let _ = events.send(SessionEvent::Error(detail));
            }
            other => {
                tracing::debug!(
                    target: "flowchat::session",
                    "Ignoring unexpected {other} frame"
                );
            }
        }
    }

    // Server-initiated drop. An explicit disconnect() aborts this task before
    // it can get here; the epoch check covers the window where this reader's
    // connection was already replaced by a newer one.
    let mut inner = inner.lock().await;
    if inner.epoch == attempt && inner.state == SessionState::Connected {
        inner.state = SessionState::Disconnected;
        inner.writer = None;
        drop(inner);
        tracing::info!(
            target: "flowchat::session",
            conversation_id = %conversation_id,
            "Connection lost"
        );
        let _ = events.send(SessionEvent::ConnectionChange(false));
    }
}

fn dispatch_message(
    events: &mpsc::UnboundedSender<SessionEvent>,
    typing_sub: &str,
    frame: Frame,
) {
    let is_typing_topic = frame.get_header("subscription") == Some(typing_sub)
        || frame
            .get_header("destination")
            .is_some_and(|d| d.ends_with("/typing"));

    if is_typing_topic {
        match serde_json::from_str::<TypingEvent>(&frame.body) {
            Ok(event) => {
                let _ = events.send(SessionEvent::Typing(event));
            }
            Err(err) => {
                tracing::warn!(
                    target: "flowchat::session",
                    "Dropping malformed typing payload: {err}"
                );
            }
        }
    } else {
        match serde_json::from_str::<ChatMessage>(&frame.body) {
            Ok(message) => {
                let _ = events.send(SessionEvent::Message(message));
            }
            Err(err) => {
                tracing::warn!(
                    target: "flowchat::session",
                    "Dropping malformed message payload: {err}"
                );
            }
        }
    }
}

// Lets the registry tear down a superseded session without blocking the
// caller that replaced it.
pub(crate) fn spawn_disconnect(session: Arc<ChatSession>) {
    tokio::spawn(async move {
        session.disconnect().await;
    });
}
