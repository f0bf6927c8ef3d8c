use thiserror::Error;

pub type Result<T> = core::result::Result<T, FlowchatError>;

#[derive(Error, Debug)]
pub enum FlowchatError {
    #[error("Filesystem error: {0}")]
    Filesystem(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Not authenticated")]
    NotAuthenticated,

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("Broker handshake failed: {0}")]
    Handshake(String),

    #[error("Malformed broker frame: {0}")]
    Frame(String),

    #[error("Session is not connected")]
    NotConnected,

    #[error("Timed out waiting for connection")]
    SendTimeout,

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Other error: {0}")]
    Other(#[from] anyhow::Error),
}

impl From<Box<dyn std::error::Error + Send + Sync>> for FlowchatError {
    fn from(err: Box<dyn std::error::Error + Send + Sync>) -> Self {
        FlowchatError::Other(anyhow::anyhow!(err.to_string()))
    }
}
