//! Optimistic send with rollback.
//!
//! The composer is cleared the moment a send starts. The captured draft lives
//! in a [`PendingSend`] until the backend answers; it is never shown as a
//! message. Failure puts the draft back.

use chat_log_client::{Attachment, Message, MessageId, SubmitPayload};
use chrono::{DateTime, Utc};
use thiserror::Error;

const REPLY_EXCERPT_MAX_CHARS: usize = 120;
const ATTACHMENT_EXCERPT: &str = "[attachment]";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MembershipStatus {
    Active,
    Pending,
    Muted,
    Banned,
}

impl MembershipStatus {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Pending => "pending",
            Self::Muted => "muted",
            Self::Banned => "banned",
        }
    }

    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "active" => Some(Self::Active),
            "pending" => Some(Self::Pending),
            "muted" => Some(Self::Muted),
            "banned" => Some(Self::Banned),
            _ => None,
        }
    }

    #[must_use]
    pub fn can_post(self) -> bool {
        self == Self::Active
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Draft {
    pub body: String,
    pub attachment: Option<Attachment>,
}

impl Draft {
    #[must_use]
    pub fn text(body: impl Into<String>) -> Self {
        Self {
            body: body.into(),
            attachment: None,
        }
    }

    #[must_use]
    pub fn is_sendable(&self) -> bool {
        !self.body.trim().is_empty() || self.attachment.is_some()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.body.is_empty() && self.attachment.is_none()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplySummary {
    pub message_id: MessageId,
    pub sender_display: String,
    pub excerpt: String,
}

impl ReplySummary {
    #[must_use]
    pub fn from_message(message: &Message) -> Self {
        let excerpt = match message.body_text() {
            Some(body) => truncate_chars(body, REPLY_EXCERPT_MAX_CHARS),
            None => ATTACHMENT_EXCERPT.to_string(),
        };
        Self {
            message_id: message.id,
            sender_display: message.sender_display.clone(),
            excerpt,
        }
    }

    #[must_use]
    pub fn reply_text(&self) -> String {
        if self.sender_display.trim().is_empty() {
            self.excerpt.clone()
        } else {
            format!("{}: {}", self.sender_display.trim(), self.excerpt)
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingSend {
    pub local_body: String,
    pub local_attachment: Option<Attachment>,
    pub reply_to_summary: Option<ReplySummary>,
    pub submitted_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum SendRejection {
    #[error("message has no body and no attachment")]
    Empty,
    #[error("posting is disabled for this member")]
    Forbidden,
    #[error("a send is already in flight")]
    InFlight,
}

/// What the input area should show.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComposerState {
    pub draft: Draft,
    pub reply_target: Option<ReplySummary>,
    pub error: Option<String>,
    pub posting_enabled: bool,
    pub sending: bool,
}

#[derive(Debug, Clone)]
pub struct SendPipeline {
    sender_id: String,
    membership: MembershipStatus,
    draft: Draft,
    reply_target: Option<ReplySummary>,
    pending: Option<PendingSend>,
    error: Option<String>,
}

impl SendPipeline {
    #[must_use]
    pub fn new(sender_id: impl Into<String>, membership: MembershipStatus) -> Self {
        Self {
            sender_id: sender_id.into(),
            membership,
            draft: Draft::default(),
            reply_target: None,
            pending: None,
            error: None,
        }
    }

    /// Capture `draft`, clear the composer and build the submission.
    pub fn begin(&mut self, draft: Draft, now: DateTime<Utc>) -> Result<SubmitPayload, SendRejection> {
        if !self.membership.can_post() {
            return Err(SendRejection::Forbidden);
        }
        if !draft.is_sendable() {
            return Err(SendRejection::Empty);
        }
        if self.pending.is_some() {
            return Err(SendRejection::InFlight);
        }

        let reply = self.reply_target.take();
        let body = draft.body.trim().to_string();
        let payload = SubmitPayload {
            sender_id: self.sender_id.clone(),
            body: (!body.is_empty()).then(|| body.clone()),
            attachment: draft.attachment.clone(),
            reply_to_text: reply.as_ref().map(ReplySummary::reply_text),
        };

        self.pending = Some(PendingSend {
            local_body: draft.body,
            local_attachment: draft.attachment,
            reply_to_summary: reply,
            submitted_at: now,
        });
        self.draft = Draft::default();
        self.error = None;
        Ok(payload)
    }

    /// The backend accepted the message; the captured draft is no longer needed.
    pub fn confirm(&mut self) -> Option<PendingSend> {
        self.pending.take()
    }

    /// Put the captured draft back into the composer. Text typed while the send
    /// was in flight is kept after the restored text.
    pub fn rollback(&mut self, error: impl Into<String>) -> Option<PendingSend> {
        let pending = self.pending.take()?;
        self.draft.body = if self.draft.body.is_empty() {
            pending.local_body.clone()
        } else {
            format!("{}\n{}", pending.local_body, self.draft.body)
        };
        if self.draft.attachment.is_none() {
            self.draft.attachment = pending.local_attachment.clone();
        }
        self.error = Some(error.into());
        Some(pending)
    }

    pub fn set_draft_body(&mut self, body: impl Into<String>) {
        self.draft.body = body.into();
    }

    pub fn set_attachment(&mut self, attachment: Option<Attachment>) {
        self.draft.attachment = attachment;
    }

    pub fn set_reply_target(&mut self, message: &Message) {
        self.reply_target = Some(ReplySummary::from_message(message));
    }

    pub fn clear_reply_target(&mut self) -> bool {
        self.reply_target.take().is_some()
    }

    /// Drop the reply target if it points at `id`.
    pub fn forget_reply_to(&mut self, id: MessageId) -> bool {
        if self
            .reply_target
            .as_ref()
            .is_some_and(|target| target.message_id == id)
        {
            self.reply_target = None;
            return true;
        }
        false
    }

    pub fn dismiss_error(&mut self) -> bool {
        self.error.take().is_some()
    }

    pub fn set_membership(&mut self, membership: MembershipStatus) -> bool {
        let changed = self.membership != membership;
        self.membership = membership;
        changed
    }

    #[must_use]
    pub fn membership(&self) -> MembershipStatus {
        self.membership
    }

    #[must_use]
    pub fn pending(&self) -> Option<&PendingSend> {
        self.pending.as_ref()
    }

    #[must_use]
    pub fn composer_state(&self) -> ComposerState {
        ComposerState {
            draft: self.draft.clone(),
            reply_target: self.reply_target.clone(),
            error: self.error.clone(),
            posting_enabled: self.membership.can_post(),
            sending: self.pending.is_some(),
        }
    }
}

fn truncate_chars(value: &str, max_chars: usize) -> String {
    if value.chars().count() <= max_chars {
        return value.to_string();
    }
    let mut truncated: String = value.chars().take(max_chars).collect();
    truncated.push('…');
    truncated
}

#[cfg(test)]
mod tests {
    use chat_log_client::{Attachment, Message, MessageId};
    use chrono::Utc;

    use super::{Draft, MembershipStatus, ReplySummary, SendPipeline, SendRejection};

    fn message(id: u64, body: Option<&str>) -> Message {
        Message {
            id: MessageId(id),
            conversation_id: "conv_1".to_string(),
            sender_id: "member_2".to_string(),
            sender_display: "Ada".to_string(),
            body: body.map(str::to_string),
            attachment_ref: None,
            reply_to_summary: None,
            created_at: Utc::now(),
        }
    }

    fn attachment() -> Attachment {
        Attachment {
            file_name: "map.png".to_string(),
            content_type: "image/png".to_string(),
            bytes: vec![0, 1],
        }
    }

    #[test]
    fn begin_clears_the_composer_and_consumes_the_reply() {
        let mut pipeline = SendPipeline::new("member_1", MembershipStatus::Active);
        pipeline.set_draft_body("stale text");
        pipeline.set_reply_target(&message(4, Some("where do we meet?")));

        let payload = pipeline
            .begin(Draft::text("  at the pier  "), Utc::now())
            .expect("send starts");
        assert_eq!(payload.sender_id, "member_1");
        assert_eq!(payload.body.as_deref(), Some("at the pier"));
        assert_eq!(payload.reply_to_text.as_deref(), Some("Ada: where do we meet?"));

        let composer = pipeline.composer_state();
        assert!(composer.draft.is_empty());
        assert_eq!(composer.reply_target, None);
        assert!(composer.sending);
    }

    #[test]
    fn failure_restores_body_and_attachment_but_not_the_reply() {
        let mut pipeline = SendPipeline::new("member_1", MembershipStatus::Active);
        pipeline.set_reply_target(&message(4, Some("hello")));
        let draft = Draft {
            body: "hi".to_string(),
            attachment: Some(attachment()),
        };
        let _ = pipeline.begin(draft, Utc::now()).expect("send starts");

        let pending = pipeline.rollback("chat_log_http_500").expect("pending send");
        assert_eq!(pending.local_body, "hi");

        let composer = pipeline.composer_state();
        assert_eq!(composer.draft.body, "hi");
        assert_eq!(composer.draft.attachment, Some(attachment()));
        assert_eq!(composer.reply_target, None);
        assert_eq!(composer.error.as_deref(), Some("chat_log_http_500"));
        assert!(!composer.sending);

        assert!(pipeline.dismiss_error());
        assert_eq!(pipeline.composer_state().error, None);
    }

    #[test]
    fn text_typed_during_flight_survives_rollback() {
        let mut pipeline = SendPipeline::new("member_1", MembershipStatus::Active);
        let _ = pipeline.begin(Draft::text("first"), Utc::now()).expect("send starts");
        pipeline.set_draft_body("second");
        let _ = pipeline.rollback("boom");
        assert_eq!(pipeline.composer_state().draft.body, "first\nsecond");
    }

    #[test]
    fn confirm_discards_the_pending_send() {
        let mut pipeline = SendPipeline::new("member_1", MembershipStatus::Active);
        let _ = pipeline.begin(Draft::text("ok"), Utc::now()).expect("send starts");
        assert!(pipeline.confirm().is_some());
        assert!(pipeline.pending().is_none());
        assert!(pipeline.composer_state().draft.is_empty());
        assert!(pipeline.rollback("late").is_none());
    }

    #[test]
    fn preconditions_reject_without_touching_state() {
        let mut pipeline = SendPipeline::new("member_1", MembershipStatus::Muted);
        pipeline.set_reply_target(&message(1, Some("x")));
        assert_eq!(
            pipeline.begin(Draft::text("hi"), Utc::now()),
            Err(SendRejection::Forbidden)
        );
        assert!(!pipeline.composer_state().posting_enabled);
        assert!(pipeline.composer_state().reply_target.is_some());

        assert!(pipeline.set_membership(MembershipStatus::Active));
        assert_eq!(
            pipeline.begin(Draft::text("   "), Utc::now()),
            Err(SendRejection::Empty)
        );

        let attachment_only = Draft {
            body: String::new(),
            attachment: Some(attachment()),
        };
        let payload = pipeline.begin(attachment_only, Utc::now()).expect("attachment only");
        assert_eq!(payload.body, None);
        assert_eq!(
            pipeline.begin(Draft::text("again"), Utc::now()),
            Err(SendRejection::InFlight)
        );
    }

    #[test]
    fn reply_summary_truncates_and_labels_attachments() {
        let long = "x".repeat(200);
        let summary = ReplySummary::from_message(&message(9, Some(long.as_str())));
        assert_eq!(summary.excerpt.chars().count(), 121);
        assert!(summary.excerpt.ends_with('…'));

        let attachment_only = ReplySummary::from_message(&message(10, None));
        assert_eq!(attachment_only.excerpt, "[attachment]");
    }

    #[test]
    fn membership_parses_backend_strings() {
        assert_eq!(MembershipStatus::parse(" Active "), Some(MembershipStatus::Active));
        assert_eq!(MembershipStatus::parse("banned"), Some(MembershipStatus::Banned));
        assert_eq!(MembershipStatus::parse("owner"), None);
        assert!(!MembershipStatus::Pending.can_post());
    }
}
