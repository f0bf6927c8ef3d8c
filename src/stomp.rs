//! Minimal STOMP 1.2 frame codec for the chat broker.
//!
//! The backend fans conversation traffic out through a STOMP endpoint; the
//! session layer only needs the handful of frames involved in the
//! connect/subscribe/send lifecycle, so this is a small hand-rolled codec
//! rather than a full protocol implementation. Frames are exchanged as text
//! payloads over the WebSocket transport.

use std::fmt;

use crate::error::{FlowchatError, Result};

/// Frame commands the chat session sends or expects to receive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    // client -> server
    Connect,
    Send,
    Subscribe,
    Unsubscribe,
    Disconnect,
    // server -> client
    Connected,
    Message,
    Receipt,
    Error,
}

impl Command {
    fn as_str(&self) -> &'static str {
        match self {
            Command::Connect => "CONNECT",
            Command::Send => "SEND",
            Command::Subscribe => "SUBSCRIBE",
            Command::Unsubscribe => "UNSUBSCRIBE",
            Command::Disconnect => "DISCONNECT",
            Command::Connected => "CONNECTED",
            Command::Message => "MESSAGE",
            Command::Receipt => "RECEIPT",
            Command::Error => "ERROR",
        }
    }

    fn parse(s: &str) -> Option<Self> {
        match s {
            "CONNECT" => Some(Command::Connect),
            "SEND" => Some(Command::Send),
            "SUBSCRIBE" => Some(Command::Subscribe),
            "UNSUBSCRIBE" => Some(Command::Unsubscribe),
            "DISCONNECT" => Some(Command::Disconnect),
            "CONNECTED" => Some(Command::Connected),
            "MESSAGE" => Some(Command::Message),
            "RECEIPT" => Some(Command::Receipt),
            "ERROR" => Some(Command::Error),
            _ => None,
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single STOMP frame: command line, header lines, blank line, body, NUL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub command: Command,
    pub headers: Vec<(String, String)>,
    pub body: String,
}

impl Frame {
    pub fn new(command: Command) -> Self {
        Self {
            command,
            headers: Vec::new(),
            body: String::new(),
        }
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn body(mut self, body: impl Into<String>) -> Self {
        self.body = body.into();
        self
    }

    /// First value for a header name, if present.
    pub fn get_header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }

    /// Serialize to the wire text representation.
    pub fn encode(&self) -> String {
        let mut out = String::with_capacity(self.body.len() + 64);
        out.push_str(self.command.as_str());
        out.push('\n');
        for (name, value) in &self.headers {
            out.push_str(&escape_header(name));
            out.push(':');
            out.push_str(&escape_header(value));
            out.push('\n');
        }
        if !self.body.is_empty() {
            out.push_str("content-length:");
            out.push_str(&self.body.len().to_string());
            out.push('\n');
        }
        out.push('\n');
        out.push_str(&self.body);
        out.push('\0');
        out
    }

    /// Parse one frame from a WebSocket text payload.
    ///
    /// Returns `Ok(None)` for heart-beat payloads (a lone EOL), which the
    /// session ignores.
    pub fn parse(raw: &str) -> Result<Option<Frame>> {
        let raw = raw.strip_suffix('\0').unwrap_or(raw);
        if raw.is_empty() || raw == "\n" || raw == "\r\n" {
            return Ok(None);
        }

        let (head, body) = raw
            .split_once("\n\n")
            .or_else(|| raw.split_once("\r\n\r\n"))
            .unwrap_or((raw, ""));

        let mut lines = head.lines();
        let command_line = lines
            .next()
            .ok_or_else(|| FlowchatError::Frame("empty frame".into()))?;
        let command = Command::parse(command_line.trim_end_matches('\r'))
            .ok_or_else(|| FlowchatError::Frame(format!("unknown command: {command_line}")))?;

        let mut headers = Vec::new();
        for line in lines {
            let line = line.trim_end_matches('\r');
            if line.is_empty() {
                continue;
            }
            let (name, value) = line
                .split_once(':')
                .ok_or_else(|| FlowchatError::Frame(format!("malformed header: {line}")))?;
            headers.push((unescape_header(name), unescape_header(value)));
        }

        Ok(Some(Frame {
            command,
            headers,
            body: body.to_string(),
        }))
    }
}

// STOMP 1.2 header escaping: backslash, newline, carriage return, colon.
fn escape_header(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            ':' => out.push_str("\\c"),
            _ => out.push(c),
        }
    }
    out
}

fn unescape_header(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut chars = s.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('\\') => out.push('\\'),
            Some('n') => out.push('\n'),
            Some('r') => out.push('\r'),
            Some('c') => out.push(':'),
            Some(other) => {
                out.push('\\');
                out.push(other);
            }
            None => out.push('\\'),
        }
    }
    out
}

/// CONNECT frame carrying the bearer credential.
pub fn connect_frame(bearer_token: &str) -> Frame {
    Frame::new(Command::Connect)
        .header("accept-version", "1.2")
        .header("heart-beat", "0,0")
        .header("Authorization", format!("Bearer {bearer_token}"))
}

pub fn subscribe_frame(subscription_id: &str, destination: &str) -> Frame {
    Frame::new(Command::Subscribe)
        .header("id", subscription_id)
        .header("destination", destination)
}

pub fn unsubscribe_frame(subscription_id: &str) -> Frame {
    Frame::new(Command::Unsubscribe).header("id", subscription_id)
}

pub fn send_frame(destination: &str, body: &str) -> Frame {
    Frame::new(Command::Send)
        .header("destination", destination)
        .body(body)
}

pub fn disconnect_frame() -> Frame {
    Frame::new(Command::Disconnect)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_connect_carries_bearer_header() {
        let encoded = connect_frame("jwt-abc").encode();
        assert!(encoded.starts_with("CONNECT\n"));
        assert!(encoded.contains("Authorization:Bearer jwt-abc\n"));
        assert!(encoded.ends_with("\n\0"));
    }

    #[test]
    fn encode_send_includes_content_length_and_nul() {
        let encoded = send_frame("/app/chats/c1/send", "hello").encode();
        assert!(encoded.starts_with("SEND\n"));
        assert!(encoded.contains("destination:/app/chats/c1/send\n"));
        assert!(encoded.contains("content-length:5\n"));
        assert!(encoded.ends_with("\nhello\0"));
    }

    #[test]
    fn parse_round_trips_message_frame() {
        let frame = Frame::new(Command::Message)
            .header("destination", "/topic/chats/c1")
            .header("subscription", "sub-0")
            .body(r#"{"id":"m1"}"#);
        let parsed = Frame::parse(&frame.encode()).unwrap().unwrap();
        assert_eq!(parsed.command, Command::Message);
        assert_eq!(parsed.get_header("destination"), Some("/topic/chats/c1"));
        assert_eq!(parsed.get_header("subscription"), Some("sub-0"));
        assert_eq!(parsed.body, r#"{"id":"m1"}"#);
    }

    #[test]
    fn parse_heart_beat_is_none() {
        assert!(Frame::parse("\n").unwrap().is_none());
        assert!(Frame::parse("\r\n").unwrap().is_none());
        assert!(Frame::parse("").unwrap().is_none());
    }

    #[test]
    fn parse_unknown_command_is_error() {
        let err = Frame::parse("BOGUS\n\nbody\0").unwrap_err();
        assert!(err.to_string().contains("unknown command"));
    }

    #[test]
    fn parse_malformed_header_is_error() {
        let err = Frame::parse("MESSAGE\nnot-a-header\n\nbody\0").unwrap_err();
        assert!(err.to_string().contains("malformed header"));
    }

    #[test]
    fn parse_handles_crlf_line_endings() {
        let raw = "CONNECTED\r\nversion:1.2\r\n\r\n\0";
        let parsed = Frame::parse(raw).unwrap().unwrap();
        assert_eq!(parsed.command, Command::Connected);
        assert_eq!(parsed.get_header("version"), Some("1.2"));
        assert!(parsed.body.is_empty());
    }

    #[test]
    fn header_escaping_round_trips() {
        let frame = Frame::new(Command::Send)
            .header("destination", "/app/x")
            .header("note", "a:b\nc\\d");
        let parsed = Frame::parse(&frame.encode()).unwrap().unwrap();
        assert_eq!(parsed.get_header("note"), Some("a:b\nc\\d"));
    }

    #[test]
    fn error_frame_body_is_preserved() {
        let raw = "ERROR\nmessage:denied\n\nAccess refused\0";
        let parsed = Frame::parse(raw).unwrap().unwrap();
        assert_eq!(parsed.command, Command::Error);
        assert_eq!(parsed.get_header("message"), Some("denied"));
        assert_eq!(parsed.body, "Access refused");
    }
}
