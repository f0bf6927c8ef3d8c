//! Typed client for the chat endpoints of the external REST backend.
//!
//! Every call carries the bearer credential from the injected [`TokenProvider`].
//! Non-OK responses are surfaced with the server-provided `{"error": ...}` text
//! when the body carries one, falling back to the raw body.

use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;
use uuid::Uuid;

use crate::auth::TokenProvider;
use crate::error::{FlowchatError, Result};
use crate::types::{ChatMessage, Participant};

pub const DEFAULT_HISTORY_LIMIT: usize = 50;

/// Bound on any single REST round trip; an unresponsive backend must never
/// hang a caller indefinitely.
const HTTP_TIMEOUT: Duration = Duration::from_secs(30);

/// Response of the conversation search endpoint: the matched ids (ordered by
/// the server), the total match count, and a windowed context slice of
/// messages around each match.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SearchResponse {
    pub messages: Vec<ChatMessage>,
    pub matched_ids: Vec<Uuid>,
    pub matches_count: usize,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    error: String,
}

#[derive(Clone)]
pub struct ChatApiClient {
    http: reqwest::Client,
    base_url: String,
    tokens: Arc<dyn TokenProvider>,
}

impl std::fmt::Debug for ChatApiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChatApiClient")
            .field("base_url", &self.base_url)
            .field("tokens", &"<REDACTED>")
            .finish()
    }
}

impl ChatApiClient {
    pub fn new(base_url: impl Into<String>, tokens: Arc<dyn TokenProvider>) -> Self {
        let http = reqwest::Client::builder()
            .timeout(HTTP_TIMEOUT)
            .build()
            .expect("HTTP client construction failed");
        Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            tokens,
        }
    }

    fn token(&self) -> Result<String> {
        self.tokens
            .bearer_token()
            .ok_or(FlowchatError::NotAuthenticated)
    }

    /// Message history for a conversation, returned oldest-first.
    ///
    /// The wire order is newest-first; it is reversed here so the store can
    /// treat the batch as its starting display sequence.
    pub async fn fetch_messages(
        &self,
        conversation_id: Uuid,
        limit: usize,
    ) -> Result<Vec<ChatMessage>> {
        let url = format!(
            "{}/api/chats/{}/messages?limit={}",
            self.base_url, conversation_id, limit
        );
        let response = self
            .http
            .get(&url)
            .bearer_auth(self.token()?)
            .send()
            .await?;
        let mut messages: Vec<ChatMessage> = Self::read_json(response).await?;
        messages.reverse();
        Ok(messages)
    }

    /// The remote participant of a 1:1 conversation.
    pub async fn fetch_participant(&self, conversation_id: Uuid) -> Result<Participant> {
        let url = format!(
            "{}/api/chats/{}/participant",
            self.base_url, conversation_id
        );
        let response = self
            .http
            .get(&url)
            .bearer_auth(self.token()?)
            .send()
            .await?;
        Self::read_json(response).await
    }

    /// Upload an attachment; the backend stores the blob, creates a message
    /// carrying it, broadcasts that message on the conversation topic, and
    /// echoes it back here.
    pub async fn upload_attachment(
        &self,
        conversation_id: Uuid,
        file_name: &str,
        bytes: Vec<u8>,
        content: &str,
    ) -> Result<ChatMessage> {
        let mime = infer::get(&bytes)
            .map(|kind| kind.mime_type().to_string())
            .unwrap_or_else(|| "application/octet-stream".to_string());

        let part = reqwest::multipart::Part::bytes(bytes)
            .file_name(file_name.to_string())
            .mime_str(&mime)
            .map_err(FlowchatError::Http)?;
        let form = reqwest::multipart::Form::new()
            .part("file", part)
            .text("content", content.to_string());

        let url = format!("{}/api/chats/{}/upload", self.base_url, conversation_id);
        let response = self
            .http
            .post(&url)
            .bearer_auth(self.token()?)
            .multipart(form)
            .send()
            .await?;
        Self::read_json(response).await
    }

    /// Server-side message search scoped to the conversation.
    pub async fn search_messages(
        &self,
        conversation_id: Uuid,
        query: &str,
    ) -> Result<SearchResponse> {
        let url = format!("{}/api/chats/{}/search", self.base_url, conversation_id);
        let response = self
            .http
            .get(&url)
            .query(&[("q", query)])
            .bearer_auth(self.token()?)
            .send()
            .await?;
        Self::read_json(response).await
    }

    async fn read_json<T: serde::de::DeserializeOwned>(response: reqwest::Response) -> Result<T> {
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<ApiErrorBody>(&body)
                .map(|b| b.error)
                .unwrap_or(body);
            return Err(FlowchatError::Api {
                status: status.as_u16(),
                message,
            });
        }
        Ok(response.json::<T>().await?)
    }
}
