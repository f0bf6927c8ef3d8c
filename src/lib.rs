//! Realtime chat transport and session management for 1:1 direct messaging.
//!
//! The crate owns everything between a rendering layer and the chat backend:
//! the STOMP-over-WebSocket session per conversation, lazy connect-and-send
//! delivery, the ordered message store with visual grouping, typing presence
//! in both directions, and server-delegated search. Auth, friend management,
//! and persistence live in external collaborators.

pub mod api;
pub mod auth;
pub mod client;
pub mod conversation;
pub mod delivery;
pub mod error;
pub mod event_bus;
pub mod room;
pub mod session;
pub mod stomp;
pub mod types;
pub mod typing;

#[cfg(test)]
pub(crate) mod test_utils;

pub use crate::api::ChatApiClient;
pub use crate::auth::{StaticTokenProvider, TokenProvider};
pub use crate::client::{Flowchat, FlowchatConfig};
pub use crate::conversation::{
    ConversationStore, PresenceAggregator, SearchController, SearchSnapshot,
};
pub use crate::delivery::DeliveryCoordinator;
pub use crate::error::{FlowchatError, Result};
pub use crate::event_bus::{AppEvent, EventBus, NoticeLevel};
pub use crate::room::{ChatRoom, RoomSnapshot};
pub use crate::session::{ChatSession, SessionRegistry};
pub use crate::types::{ChatMessage, LocalUser, Participant, SessionState, TypingEvent};
pub use crate::typing::TypingDebouncer;

use once_cell::sync::OnceCell;
use std::sync::Mutex;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{filter::EnvFilter, fmt::Layer, prelude::*, registry::Registry};

static TRACING_GUARDS: OnceCell<Mutex<Option<(WorkerGuard, WorkerGuard)>>> = OnceCell::new();
static TRACING_INIT: OnceCell<()> = OnceCell::new();

pub(crate) fn init_tracing(logs_dir: &std::path::Path) {
    TRACING_INIT.get_or_init(|| {
        let file_appender = tracing_appender::rolling::RollingFileAppender::builder()
            .rotation(tracing_appender::rolling::Rotation::DAILY)
            .filename_prefix("flowchat")
            .filename_suffix("log")
            .build(logs_dir)
            .expect("Failed to create file appender");

        let (non_blocking_file, file_guard) = tracing_appender::non_blocking(file_appender);
        let (non_blocking_stdout, stdout_guard) = tracing_appender::non_blocking(std::io::stdout());

        TRACING_GUARDS
            .set(Mutex::new(Some((file_guard, stdout_guard))))
            .ok();

        let stdout_layer = Layer::new()
            .with_writer(non_blocking_stdout)
            .with_ansi(true)
            .with_target(true);

        let file_layer = Layer::new()
            .with_writer(non_blocking_file)
            .with_ansi(false)
            .with_target(true);

        Registry::default()
            .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
            .with(stdout_layer)
            .with(file_layer)
            .init();
    });
}
