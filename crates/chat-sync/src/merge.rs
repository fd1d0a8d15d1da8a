//! Reconciliation of in-memory message lists with freshly fetched pages.
//!
//! Identity is the message id alone. Position comes from the log: the live
//! page decides which known messages survive, and anything new is appended
//! after them. Older pages are only ever prepended.

use std::collections::HashSet;

use chat_log_client::{Message, MessageId};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LiveMerge {
    /// Same length and same trailing id as before; nothing to re-render.
    Unchanged,
    Changed {
        messages: Vec<Message>,
        removed: usize,
        appended: usize,
    },
}

impl LiveMerge {
    #[must_use]
    pub fn is_changed(&self) -> bool {
        matches!(self, Self::Changed { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackfillMerge {
    pub messages: Vec<Message>,
    pub prepended: usize,
}

/// Merge the latest page `fetched` into `current`.
///
/// Messages in `current` that the latest page no longer carries are dropped
/// (deleted server-side), retained ones keep their relative order, and ids
/// not seen before are appended in the order the page returned them.
#[must_use]
pub fn merge_live(current: &[Message], fetched: &[Message]) -> LiveMerge {
    let present: HashSet<MessageId> = fetched.iter().map(|message| message.id).collect();
    let known: HashSet<MessageId> = current.iter().map(|message| message.id).collect();

    let mut seen = HashSet::with_capacity(current.len() + fetched.len());
    let mut merged = Vec::with_capacity(current.len().max(fetched.len()));

    for message in current {
        if present.contains(&message.id) && seen.insert(message.id) {
            merged.push(message.clone());
        }
    }
    let retained = merged.len();

    for message in fetched {
        if !known.contains(&message.id) && seen.insert(message.id) {
            merged.push(message.clone());
        }
    }

    if merged.len() == current.len() && last_id(&merged) == last_id(current) {
        return LiveMerge::Unchanged;
    }

    let appended = merged.len() - retained;
    LiveMerge::Changed {
        removed: current.len().saturating_sub(retained),
        appended,
        messages: merged,
    }
}

/// Live merge over a list whose first `history_len` messages came from older
/// pages. Only the live window is reconciled against the latest page; a
/// latest-page message already held in history keeps its older position.
#[must_use]
pub fn merge_live_window(current: &[Message], history_len: usize, fetched: &[Message]) -> LiveMerge {
    let split = history_len.min(current.len());
    if split == 0 {
        return merge_live(current, fetched);
    }
    let (history, live) = current.split_at(split);
    let held: HashSet<MessageId> = history.iter().map(|message| message.id).collect();
    let fresh: Vec<Message> = fetched
        .iter()
        .filter(|message| !held.contains(&message.id))
        .cloned()
        .collect();

    match merge_live(live, &fresh) {
        LiveMerge::Unchanged => LiveMerge::Unchanged,
        LiveMerge::Changed {
            messages,
            removed,
            appended,
        } => {
            let mut combined = Vec::with_capacity(history.len() + messages.len());
            combined.extend_from_slice(history);
            combined.extend(messages);
            LiveMerge::Changed {
                messages: combined,
                removed,
                appended,
            }
        }
    }
}

/// Prepend an older page. Ids already present win and keep their position.
#[must_use]
pub fn merge_backfill(current: &[Message], older: &[Message]) -> BackfillMerge {
    let mut seen: HashSet<MessageId> = current.iter().map(|message| message.id).collect();
    let mut merged = Vec::with_capacity(older.len() + current.len());

    for message in older {
        if seen.insert(message.id) {
            merged.push(message.clone());
        }
    }
    let prepended = merged.len();
    merged.extend(current.iter().cloned());

    BackfillMerge {
        messages: merged,
        prepended,
    }
}

fn last_id(messages: &[Message]) -> Option<MessageId> {
    messages.last().map(|message| message.id)
}
