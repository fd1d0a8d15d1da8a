use chat_log_client::{Message, MessageId};
use chrono::NaiveDate;

/// In-memory state of one open conversation.
///
/// Exactly one session owns a view; it is dropped when the conversation is
/// closed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversationView {
    pub conversation_id: String,
    pub messages: Vec<Message>,
    pub oldest_loaded_page: u32,
    pub has_more_older: bool,
    pub last_known_id: Option<MessageId>,
    /// Leading messages that came from older pages. Live polls leave them alone.
    pub history_len: usize,
}

/// Consecutive messages sharing a calendar day, used for date separators.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DateGroup<'a> {
    pub date: NaiveDate,
    pub messages: &'a [Message],
}

impl ConversationView {
    #[must_use]
    pub fn new(conversation_id: impl Into<String>) -> Self {
        Self {
            conversation_id: conversation_id.into(),
            messages: Vec::new(),
            oldest_loaded_page: 1,
            has_more_older: true,
            last_known_id: None,
            history_len: 0,
        }
    }

    pub fn replace_messages(&mut self, messages: Vec<Message>) {
        self.messages = messages;
        self.last_known_id = self.messages.last().map(|message| message.id);
    }

    pub fn remove_message(&mut self, id: MessageId) -> bool {
        let Some(index) = self.messages.iter().position(|message| message.id == id) else {
            return false;
        };
        self.messages.remove(index);
        if index < self.history_len {
            self.history_len -= 1;
        }
        self.last_known_id = self.messages.last().map(|message| message.id);
        true
    }

    #[must_use]
    pub fn contains(&self, id: MessageId) -> bool {
        self.messages.iter().any(|message| message.id == id)
    }

    #[must_use]
    pub fn find(&self, id: MessageId) -> Option<&Message> {
        self.messages.iter().find(|message| message.id == id)
    }

    /// Split the list into runs of the same UTC day. Log order is preserved, so
    /// a day can appear twice if the log interleaves timestamps.
    #[must_use]
    pub fn date_groups(&self) -> Vec<DateGroup<'_>> {
        let mut groups: Vec<DateGroup<'_>> = Vec::new();
        let mut start = 0;
        for (index, message) in self.messages.iter().enumerate() {
            let date = message.created_at.date_naive();
            let boundary = self.messages[start].created_at.date_naive() != date;
            if boundary {
                groups.push(DateGroup {
                    date: self.messages[start].created_at.date_naive(),
                    messages: &self.messages[start..index],
                });
                start = index;
            }
        }
        if let Some(first) = self.messages.get(start) {
            groups.push(DateGroup {
                date: first.created_at.date_naive(),
                messages: &self.messages[start..],
            });
        }
        groups
    }
}

#[cfg(test)]
mod tests {
    use chat_log_client::{Message, MessageId};
    use chrono::{NaiveDate, TimeZone, Utc};

    use super::ConversationView;

    fn message_at(id: u64, day: u32, hour: u32) -> Message {
        Message {
            id: MessageId(id),
            conversation_id: "conv_1".to_string(),
            sender_id: "member_1".to_string(),
            sender_display: "Member".to_string(),
            body: Some("hello".to_string()),
            attachment_ref: None,
            reply_to_summary: None,
            created_at: Utc
                .with_ymd_and_hms(2026, 4, day, hour, 0, 0)
                .single()
                .expect("valid timestamp"),
        }
    }

    #[test]
    fn replace_tracks_last_known_id() {
        let mut view = ConversationView::new("conv_1");
        assert_eq!(view.last_known_id, None);
        view.replace_messages(vec![message_at(1, 1, 9), message_at(2, 1, 10)]);
        assert_eq!(view.last_known_id, Some(MessageId(2)));

        assert!(view.remove_message(MessageId(2)));
        assert_eq!(view.last_known_id, Some(MessageId(1)));
        assert!(!view.remove_message(MessageId(2)));
    }

    #[test]
    fn removing_older_history_shrinks_the_history_prefix() {
        let mut view = ConversationView::new("conv_1");
        view.replace_messages(vec![message_at(1, 1, 9), message_at(2, 1, 10), message_at(3, 1, 11)]);
        view.history_len = 2;

        assert!(view.remove_message(MessageId(1)));
        assert_eq!(view.history_len, 1);
        assert!(view.remove_message(MessageId(3)));
        assert_eq!(view.history_len, 1);
    }

    #[test]
    fn date_groups_follow_log_order() {
        let mut view = ConversationView::new("conv_1");
        view.replace_messages(vec![
            message_at(1, 1, 9),
            message_at(2, 1, 23),
            message_at(3, 2, 1),
            message_at(4, 1, 8),
        ]);

        let groups = view.date_groups();
        let shape: Vec<(NaiveDate, usize)> = groups
            .iter()
            .map(|group| (group.date, group.messages.len()))
            .collect();
        assert_eq!(
            shape,
            vec![
                (NaiveDate::from_ymd_opt(2026, 4, 1).expect("valid date"), 2),
                (NaiveDate::from_ymd_opt(2026, 4, 2).expect("valid date"), 1),
                (NaiveDate::from_ymd_opt(2026, 4, 1).expect("valid date"), 1),
            ]
        );
    }

    #[test]
    fn empty_view_has_no_groups() {
        assert!(ConversationView::new("conv_1").date_groups().is_empty());
    }
}
