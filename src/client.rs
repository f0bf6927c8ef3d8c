//! Top-level handle: configuration plus the shared collaborators every open
//! conversation uses (REST client, session registry, event bus, identity).

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;
use uuid::Uuid;

use crate::api::ChatApiClient;
use crate::auth::TokenProvider;
use crate::delivery::DEFAULT_CONNECT_TIMEOUT;
use crate::error::{FlowchatError, Result};
use crate::event_bus::{AppEvent, EventBus};
use crate::room::ChatRoom;
use crate::session::SessionRegistry;
use crate::types::LocalUser;
use crate::typing::DEFAULT_TYPING_TIMEOUT;

#[derive(Clone, Debug)]
pub struct FlowchatConfig {
    /// Base URL of the REST backend, e.g. `https://api.example.com`.
    pub api_base_url: String,
    /// WebSocket URL of the STOMP broker, e.g. `wss://api.example.com/ws`.
    pub ws_url: String,
    /// Directory for application logs.
    pub logs_dir: PathBuf,
    /// How long a send waits for a lazy connect.
    pub connect_timeout: Duration,
    /// Typing-indicator inactivity window.
    pub typing_timeout: Duration,
}

impl FlowchatConfig {
    pub fn new(
        api_base_url: impl Into<String>,
        ws_url: impl Into<String>,
        logs_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            api_base_url: api_base_url.into(),
            ws_url: ws_url.into(),
            logs_dir: logs_dir.into(),
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            typing_timeout: DEFAULT_TYPING_TIMEOUT,
        }
    }

    /// Build a config from `FLOWCHAT_*` environment variables, loading a
    /// `.env` file first when present. `FLOWCHAT_API_URL` and
    /// `FLOWCHAT_WS_URL` are required; `FLOWCHAT_LOGS_DIR` defaults to a
    /// directory under the system temp dir.
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();
        let api_base_url = required_var("FLOWCHAT_API_URL")?;
        let ws_url = required_var("FLOWCHAT_WS_URL")?;
        let logs_dir = std::env::var("FLOWCHAT_LOGS_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| std::env::temp_dir().join("flowchat").join("logs"));
        Ok(Self::new(api_base_url, ws_url, logs_dir))
    }
}

fn required_var(name: &str) -> Result<String> {
    std::env::var(name)
        .map_err(|_| FlowchatError::Configuration(format!("{name} is not set")))
}

/// The application-wide chat handle. One instance per authenticated user;
/// conversations are opened from it and share its collaborators.
pub struct Flowchat {
    pub config: FlowchatConfig,
    local_user: LocalUser,
    tokens: Arc<dyn TokenProvider>,
    api: Arc<ChatApiClient>,
    registry: Arc<SessionRegistry>,
    bus: EventBus,
}

impl std::fmt::Debug for Flowchat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Flowchat")
            .field("config", &self.config)
            .field("local_user", &self.local_user.username)
            .finish()
    }
}

impl Flowchat {
    /// Set up logging and the shared collaborators. Auth is external: the
    /// caller supplies the authenticated identity and a token source.
    pub fn initialize(
        config: FlowchatConfig,
        local_user: LocalUser,
        tokens: Arc<dyn TokenProvider>,
    ) -> Result<Self> {
        std::fs::create_dir_all(&config.logs_dir)?;
        crate::init_tracing(&config.logs_dir);
        tracing::info!(
            target: "flowchat::client",
            user = %local_user.username,
            "Initializing flowchat"
        );

        let api = Arc::new(ChatApiClient::new(
            config.api_base_url.clone(),
            Arc::clone(&tokens),
        ));
        Ok(Self {
            config,
            local_user,
            tokens,
            api,
            registry: Arc::new(SessionRegistry::new()),
            bus: EventBus::new(),
        })
    }

    pub fn local_user(&self) -> &LocalUser {
        &self.local_user
    }

    pub fn api(&self) -> &Arc<ChatApiClient> {
        &self.api
    }

    /// Subscribe to application events (connection changes, appended
    /// messages, user-facing notices).
    pub fn subscribe(&self) -> broadcast::Receiver<AppEvent> {
        self.bus.subscribe()
    }

    /// Open a conversation: fetch its history and participant, register its
    /// session, and start its event pump. Opening a conversation that is
    /// already open supersedes the previous session.
    pub async fn open_conversation(&self, conversation_id: Uuid) -> Result<ChatRoom> {
        ChatRoom::open(
            conversation_id,
            self.local_user.clone(),
            Arc::clone(&self.api),
            Arc::clone(&self.tokens),
            Arc::clone(&self.registry),
            self.bus.clone(),
            self.config.ws_url.clone(),
            self.config.connect_timeout,
            self.config.typing_timeout,
        )
        .await
    }
}
