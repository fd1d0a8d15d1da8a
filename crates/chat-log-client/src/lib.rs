//! Request wrapper around the conversation message log.
//!
//! The client is stateless and never retries; callers decide what a failure
//! means for them.

mod message;

use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Serialize;
use thiserror::Error;
use tracing::debug;
use uuid::Uuid;

pub use message::{Attachment, Message, MessageId, SubmitPayload};
use message::SubmitRequestBody;

pub const DEFAULT_TIMEOUT_MS: u64 = 10_000;
const MIN_TIMEOUT_MS: u64 = 250;

#[derive(Debug, Clone)]
pub struct ChatLogClientConfig {
    pub base_url: String,
    pub timeout_ms: u64,
}

impl ChatLogClientConfig {
    #[must_use]
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            timeout_ms: DEFAULT_TIMEOUT_MS,
        }
    }
}

#[derive(Debug, Error)]
pub enum ChatLogClientError {
    #[error("chat_log_base_url_missing")]
    BaseUrlMissing,
    #[error("chat_log_invalid_path")]
    InvalidPath,
    #[error("chat_log_request_failed:{message}")]
    Request { message: String },
    #[error("chat_log_read_failed:{message}")]
    Read { message: String },
    #[error("chat_log_http_{status}:{body}")]
    Http { status: StatusCode, body: String },
    #[error("chat_log_json_decode_failed:{message}")]
    Decode { message: String },
}

impl ChatLogClientError {
    #[must_use]
    pub fn is_forbidden(&self) -> bool {
        matches!(self, Self::Http { status, .. } if *status == StatusCode::FORBIDDEN)
    }

    #[must_use]
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            Self::Http { status, .. } => Some(*status),
            _ => None,
        }
    }
}

/// The three operations the sync engine needs from the backend log.
#[async_trait]
pub trait RemoteLog: Send + Sync {
    /// Fetch one page of a conversation, newest-last. Page 1 is the latest page;
    /// an empty page means there is no older history.
    async fn fetch_page(
        &self,
        conversation_id: &str,
        page: u32,
    ) -> Result<Vec<Message>, ChatLogClientError>;

    async fn submit(
        &self,
        conversation_id: &str,
        payload: &SubmitPayload,
    ) -> Result<Message, ChatLogClientError>;

    async fn delete_message(&self, id: MessageId) -> Result<(), ChatLogClientError>;
}

#[derive(Debug, Clone)]
pub struct ChatLogClient {
    base_url: String,
    timeout: Duration,
    http: reqwest::Client,
}

impl ChatLogClient {
    pub fn new(config: ChatLogClientConfig) -> Result<Self, ChatLogClientError> {
        let base_url = normalize_base_url(&config.base_url)?;
        Ok(Self {
            base_url,
            timeout: Duration::from_millis(config.timeout_ms.max(MIN_TIMEOUT_MS)),
            http: reqwest::Client::new(),
        })
    }

    #[must_use]
    pub fn base_url(&self) -> &str {
        self.base_url.as_str()
    }

    #[must_use]
    pub fn endpoint(&self, path: &str) -> Option<String> {
        let trimmed = path.trim();
        if trimmed.is_empty() {
            return None;
        }
        if trimmed.starts_with('/') {
            Some(format!("{}{}", self.base_url, trimmed))
        } else {
            Some(format!("{}/{}", self.base_url, trimmed))
        }
    }

    /// `None` when the conversation id is blank. The id is percent-encoded as
    /// a single path segment.
    #[must_use]
    pub fn messages_path(conversation_id: &str) -> Option<String> {
        let segment = encode_path_segment(conversation_id.trim())?;
        Some(format!("/api/conversations/{segment}/messages"))
    }

    #[must_use]
    pub fn page_path(conversation_id: &str, page: u32) -> Option<String> {
        let path = Self::messages_path(conversation_id)?;
        Some(format!("{path}?page={}", page.max(1)))
    }

    #[must_use]
    pub fn message_path(id: MessageId) -> String {
        format!("/api/messages/{id}")
    }

    async fn get_json<T>(&self, path: &str) -> Result<T, ChatLogClientError>
    where
        T: for<'de> serde::Deserialize<'de>,
    {
        let url = self.endpoint(path).ok_or(ChatLogClientError::InvalidPath)?;
        let response = self
            .http
            .get(url.as_str())
            .header("x-request-id", request_id())
            .timeout(self.timeout)
            .send()
            .await
            .map_err(request_error)?;
        decode_json_response(response).await
    }

    async fn post_json<Req, Res>(&self, path: &str, payload: &Req) -> Result<Res, ChatLogClientError>
    where
        Req: Serialize + ?Sized,
        Res: for<'de> serde::Deserialize<'de>,
    {
        let url = self.endpoint(path).ok_or(ChatLogClientError::InvalidPath)?;
        let response = self
            .http
            .post(url.as_str())
            .header("x-request-id", request_id())
            .timeout(self.timeout)
            .json(payload)
            .send()
            .await
            .map_err(request_error)?;
        decode_json_response(response).await
    }

    async fn delete(&self, path: &str) -> Result<(), ChatLogClientError> {
        let url = self.endpoint(path).ok_or(ChatLogClientError::InvalidPath)?;
        let response = self
            .http
            .delete(url.as_str())
            .header("x-request-id", request_id())
            .timeout(self.timeout)
            .send()
            .await
            .map_err(request_error)?;
        let status = response.status();
        if status.is_success() {
            return Ok(());
        }
        let bytes = response
            .bytes()
            .await
            .map_err(|error| ChatLogClientError::Read {
                message: error.to_string(),
            })?;
        Err(format_http_error(status, &bytes))
    }
}

#[async_trait]
impl RemoteLog for ChatLogClient {
    async fn fetch_page(
        &self,
        conversation_id: &str,
        page: u32,
    ) -> Result<Vec<Message>, ChatLogClientError> {
        let path =
            Self::page_path(conversation_id, page).ok_or(ChatLogClientError::InvalidPath)?;
        let messages: Vec<Message> = self.get_json(path.as_str()).await?;
        debug!(
            conversation_id,
            page,
            count = messages.len(),
            "fetched message page"
        );
        Ok(messages)
    }

    async fn submit(
        &self,
        conversation_id: &str,
        payload: &SubmitPayload,
    ) -> Result<Message, ChatLogClientError> {
        let path = Self::messages_path(conversation_id).ok_or(ChatLogClientError::InvalidPath)?;
        let body = SubmitRequestBody::from(payload);
        self.post_json(path.as_str(), &body).await
    }

    async fn delete_message(&self, id: MessageId) -> Result<(), ChatLogClientError> {
        self.delete(Self::message_path(id).as_str()).await
    }
}

pub fn format_http_error(status: StatusCode, body: &[u8]) -> ChatLogClientError {
    let body = non_empty_string(String::from_utf8_lossy(body).to_string())
        .unwrap_or_else(|| "<empty>".to_string());
    ChatLogClientError::Http { status, body }
}

fn request_id() -> String {
    format!("req_{}", Uuid::new_v4().simple())
}

fn request_error(error: reqwest::Error) -> ChatLogClientError {
    ChatLogClientError::Request {
        message: error.to_string(),
    }
}

fn encode_path_segment(raw: &str) -> Option<String> {
    if raw.is_empty() {
        return None;
    }
    let mut url = reqwest::Url::parse("http://segment.invalid/").ok()?;
    url.path_segments_mut().ok()?.pop_if_empty().push(raw);
    url.path().strip_prefix('/').map(str::to_string)
}

fn normalize_base_url(base_url: &str) -> Result<String, ChatLogClientError> {
    let trimmed = base_url.trim();
    if trimmed.is_empty() {
        return Err(ChatLogClientError::BaseUrlMissing);
    }
    Ok(trimmed.trim_end_matches('/').to_string())
}

async fn decode_json_response<T>(response: reqwest::Response) -> Result<T, ChatLogClientError>
where
    T: for<'de> serde::Deserialize<'de>,
{
    let status = response.status();
    let bytes = response
        .bytes()
        .await
        .map_err(|error| ChatLogClientError::Read {
            message: error.to_string(),
        })?;

    if !status.is_success() {
        return Err(format_http_error(status, &bytes));
    }

    serde_json::from_slice::<T>(&bytes).map_err(|error| ChatLogClientError::Decode {
        message: error.to_string(),
    })
}

fn non_empty_string(value: String) -> Option<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoint_builder_normalizes_paths() {
        let client = ChatLogClient::new(ChatLogClientConfig::new("https://sites.example.com/"))
            .expect("chat log client");

        assert_eq!(
            client.endpoint("/api/messages/4"),
            Some("https://sites.example.com/api/messages/4".to_string())
        );
        assert_eq!(
            client.endpoint("api/messages/4"),
            Some("https://sites.example.com/api/messages/4".to_string())
        );
        assert_eq!(client.endpoint("  "), None);
    }

    #[test]
    fn path_helpers_are_deterministic() {
        assert_eq!(
            ChatLogClient::messages_path(" conv_7 ").as_deref(),
            Some("/api/conversations/conv_7/messages")
        );
        assert_eq!(
            ChatLogClient::page_path("conv_7", 3).as_deref(),
            Some("/api/conversations/conv_7/messages?page=3")
        );
        assert_eq!(
            ChatLogClient::page_path("conv_7", 0).as_deref(),
            Some("/api/conversations/conv_7/messages?page=1")
        );
        assert_eq!(ChatLogClient::messages_path("  "), None);
        assert_eq!(ChatLogClient::message_path(MessageId(42)), "/api/messages/42");
    }

    #[test]
    fn conversation_id_is_encoded_as_one_segment() {
        assert_eq!(
            ChatLogClient::messages_path("team/ops?x 1").as_deref(),
            Some("/api/conversations/team%2Fops%3Fx%201/messages")
        );
        assert_eq!(
            ChatLogClient::page_path("a#b", 2).as_deref(),
            Some("/api/conversations/a%23b/messages?page=2")
        );
    }

    #[test]
    fn http_error_mapping_preserves_shape() {
        let error = format_http_error(StatusCode::BAD_GATEWAY, b" upstream down ");
        assert_eq!(error.to_string(), "chat_log_http_502 Bad Gateway:upstream down");
        assert_eq!(error.status(), Some(StatusCode::BAD_GATEWAY));
        assert!(!error.is_forbidden());

        let forbidden = format_http_error(StatusCode::FORBIDDEN, b"");
        assert_eq!(forbidden.to_string(), "chat_log_http_403 Forbidden:<empty>");
        assert!(forbidden.is_forbidden());
    }

    #[test]
    fn base_url_missing_is_rejected() {
        let result = ChatLogClient::new(ChatLogClientConfig::new("   "));
        assert!(matches!(result, Err(ChatLogClientError::BaseUrlMissing)));
    }

    #[test]
    fn timeout_has_a_floor() {
        let mut config = ChatLogClientConfig::new("http://127.0.0.1:9");
        config.timeout_ms = 5;
        let client = ChatLogClient::new(config).expect("chat log client");
        assert_eq!(client.timeout, Duration::from_millis(MIN_TIMEOUT_MS));
    }
}
