use std::fmt;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Server-assigned message identity. The client never mints one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageId(pub u64);

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for MessageId {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

/// One entry of a conversation log as returned by the backend.
///
/// `created_at` is display metadata only; ordering always follows the position
/// the log returned the message at.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub id: MessageId,
    pub conversation_id: String,
    pub sender_id: String,
    #[serde(default)]
    pub sender_display: String,
    #[serde(default)]
    pub body: Option<String>,
    #[serde(default)]
    pub attachment_ref: Option<String>,
    #[serde(default)]
    pub reply_to_summary: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Message {
    #[must_use]
    pub fn body_text(&self) -> Option<&str> {
        self.body
            .as_deref()
            .map(str::trim)
            .filter(|body| !body.is_empty())
    }
}

/// Locally picked file waiting to be posted with a message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attachment {
    pub file_name: String,
    pub content_type: String,
    pub bytes: Vec<u8>,
}

/// Everything the backend needs to append a message to a conversation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmitPayload {
    pub sender_id: String,
    pub body: Option<String>,
    pub attachment: Option<Attachment>,
    pub reply_to_text: Option<String>,
}

#[derive(Debug, Serialize)]
pub(crate) struct SubmitRequestBody<'a> {
    pub sender_id: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attachment: Option<AttachmentUpload<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reply_to_text: Option<&'a str>,
}

#[derive(Debug, Serialize)]
pub(crate) struct AttachmentUpload<'a> {
    pub file_name: &'a str,
    pub content_type: &'a str,
    pub data_base64: String,
}

impl<'a> From<&'a SubmitPayload> for SubmitRequestBody<'a> {
    fn from(payload: &'a SubmitPayload) -> Self {
        Self {
            sender_id: payload.sender_id.as_str(),
            body: payload.body.as_deref(),
            attachment: payload.attachment.as_ref().map(|attachment| AttachmentUpload {
                file_name: attachment.file_name.as_str(),
                content_type: attachment.content_type.as_str(),
                data_base64: BASE64_STANDARD.encode(&attachment.bytes),
            }),
            reply_to_text: payload.reply_to_text.as_deref(),
        }
    }
}
