//! Shared test fixtures: an in-process WebSocket peer speaking just enough
//! STOMP to exercise the session, delivery, and room layers.

use std::time::Duration;

use futures::{SinkExt, StreamExt};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio_tungstenite::accept_async;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use uuid::Uuid;

use crate::stomp::{Command, Frame};

#[derive(Clone, Copy)]
pub(crate) enum HandshakeReply {
    /// Answer CONNECT with CONNECTED immediately.
    Connected,
    /// Hold the CONNECT until the test sends `ReplyConnected`.
    ManualConnected,
    /// Answer CONNECT with an ERROR frame.
    Error,
}

pub(crate) enum BrokerCommand {
    Send(Frame),
    ReplyConnected,
    Close,
}

/// One-connection mock broker. Every client frame is forwarded to `seen`;
/// server-to-client traffic is driven through `commands`.
pub(crate) struct Broker {
    pub url: String,
    pub seen: mpsc::UnboundedReceiver<Frame>,
    pub commands: mpsc::UnboundedSender<BrokerCommand>,
}

pub(crate) async fn spawn_broker(reply: HandshakeReply) -> Broker {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (seen_tx, seen_rx) = mpsc::unbounded_channel();
    let (command_tx, mut command_rx) = mpsc::unbounded_channel::<BrokerCommand>();

    tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let ws = accept_async(stream).await.unwrap();
        let (mut write, mut read) = ws.split();
        loop {
            tokio::select! {
                inbound = read.next() => {
                    let Some(Ok(WsMessage::Text(text))) = inbound else { break };
                    let Ok(Some(frame)) = Frame::parse(&text) else { continue };
                    let is_connect = frame.command == Command::Connect;
                    let _ = seen_tx.send(frame);
                    if is_connect {
                        match reply {
                            HandshakeReply::Connected => {
                                let connected =
                                    Frame::new(Command::Connected).header("version", "1.2");
                                write.send(WsMessage::Text(connected.encode())).await.unwrap();
                            }
                            HandshakeReply::Error => {
                                let error =
                                    Frame::new(Command::Error).header("message", "Access refused");
                                write.send(WsMessage::Text(error.encode())).await.unwrap();
                            }
                            HandshakeReply::ManualConnected => {}
                        }
                    }
                }
                command = command_rx.recv() => {
                    match command {
                        Some(BrokerCommand::Send(frame)) => {
                            write.send(WsMessage::Text(frame.encode())).await.unwrap();
                        }
                        Some(BrokerCommand::ReplyConnected) => {
                            let connected =
                                Frame::new(Command::Connected).header("version", "1.2");
                            write.send(WsMessage::Text(connected.encode())).await.unwrap();
                        }
                        Some(BrokerCommand::Close) | None => {
                            let _ = write.close().await;
                            break;
                        }
                    }
                }
            }
        }
    });

    Broker {
        url: format!("ws://{addr}"),
        seen: seen_rx,
        commands: command_tx,
    }
}

impl Broker {
    pub async fn expect_frame(&mut self) -> Frame {
        tokio::time::timeout(Duration::from_secs(5), self.seen.recv())
            .await
            .expect("timed out waiting for frame")
            .expect("broker closed")
    }

    /// Push a MESSAGE frame onto the conversation's message topic.
    pub fn deliver_message(&self, conversation_id: Uuid, body: impl Into<String>) {
        let frame = Frame::new(Command::Message)
            .header("destination", format!("/topic/chats/{conversation_id}"))
            .body(body);
        self.commands
            .send(BrokerCommand::Send(frame))
            .expect("broker gone");
    }

    /// Push a MESSAGE frame onto the conversation's typing topic.
    pub fn deliver_typing(&self, conversation_id: Uuid, body: impl Into<String>) {
        let frame = Frame::new(Command::Message)
            .header(
                "destination",
                format!("/topic/chats/{conversation_id}/typing"),
            )
            .body(body);
        self.commands
            .send(BrokerCommand::Send(frame))
            .expect("broker gone");
    }
}

/// Wire-shaped message JSON for pushing through the mock broker.
pub(crate) fn message_json(conversation_id: Uuid, id: u128, sender: Uuid, content: &str) -> String {
    format!(
        r#"{{"id":"{}","friendshipId":"{conversation_id}","senderId":"{sender}","senderName":"Peer","content":"{content}","createdAt":"2024-05-01T10:00:00Z"}}"#,
        Uuid::from_u128(id)
    )
}

pub(crate) fn typing_json(user_id: Uuid, is_typing: bool) -> String {
    format!(
        r#"{{"type":"typing","userId":"{user_id}","userName":"Peer","isTyping":{is_typing}}}"#
    )
}
