use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chat_sync::{
    ChatLogClientError, ConversationHandle, EnvironmentSignal, Message, MessageId, RemoteLog,
    SessionOptions, SubmitPayload, Viewport, ViewportMetrics, spawn_session,
};
use chrono::Utc;
use tokio::sync::Notify;
use tokio::task::JoinHandle;

pub const ROW_HEIGHT: f64 = 100.0;
pub const CLIENT_HEIGHT: f64 = 500.0;
pub const CONVERSATION: &str = "conv_1";
pub const SENDER: &str = "member_1";

pub fn message(id: u64) -> Message {
    Message {
        id: MessageId(id),
        conversation_id: CONVERSATION.to_string(),
        sender_id: "member_2".to_string(),
        sender_display: "Ada".to_string(),
        body: Some(format!("message {id}")),
        attachment_ref: None,
        reply_to_summary: None,
        created_at: Utc::now(),
    }
}

pub fn messages(ids: impl IntoIterator<Item = u64>) -> Vec<Message> {
    ids.into_iter().map(message).collect()
}

pub fn ids(messages: &[Message]) -> Vec<u64> {
    messages.iter().map(|message| message.id.0).collect()
}

/// Scripted in-memory log. Submitted messages are appended to page 1.
#[derive(Default)]
pub struct FakeLog {
    pages: Mutex<HashMap<u32, Vec<Message>>>,
    fetches: Mutex<Vec<u32>>,
    submits: Mutex<Vec<SubmitPayload>>,
    deletes: Mutex<Vec<MessageId>>,
    gates: Mutex<HashMap<u32, Arc<Notify>>>,
    fail_fetches: AtomicBool,
    fail_submits: AtomicBool,
    fail_deletes: AtomicBool,
    next_id: AtomicU64,
}

impl FakeLog {
    pub fn with_latest(latest: Vec<Message>) -> Arc<Self> {
        let log = Self {
            next_id: AtomicU64::new(1_000),
            ..Self::default()
        };
        log.set_page(1, latest);
        Arc::new(log)
    }

    pub fn set_page(&self, page: u32, messages: Vec<Message>) {
        if let Ok(mut pages) = self.pages.lock() {
            pages.insert(page, messages);
        }
    }

    /// Holds fetches of `page` until the returned notify is signalled.
    pub fn gate_page(&self, page: u32) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        if let Ok(mut gates) = self.gates.lock() {
            gates.insert(page, Arc::clone(&gate));
        }
        gate
    }

    pub fn fail_fetches(&self, fail: bool) {
        self.fail_fetches.store(fail, Ordering::SeqCst);
    }

    pub fn fail_submits(&self, fail: bool) {
        self.fail_submits.store(fail, Ordering::SeqCst);
    }

    pub fn fail_deletes(&self, fail: bool) {
        self.fail_deletes.store(fail, Ordering::SeqCst);
    }

    pub fn fetches_of(&self, page: u32) -> usize {
        self.fetches
            .lock()
            .map(|fetches| fetches.iter().filter(|fetched| **fetched == page).count())
            .unwrap_or_default()
    }

    pub fn submits(&self) -> Vec<SubmitPayload> {
        self.submits
            .lock()
            .map(|submits| submits.clone())
            .unwrap_or_default()
    }

    pub fn deletes(&self) -> Vec<MessageId> {
        self.deletes
            .lock()
            .map(|deletes| deletes.clone())
            .unwrap_or_default()
    }

    fn server_error() -> ChatLogClientError {
        ChatLogClientError::Request {
            message: "connection reset by peer".to_string(),
        }
    }
}

#[async_trait]
impl RemoteLog for FakeLog {
    async fn fetch_page(
        &self,
        _conversation_id: &str,
        page: u32,
    ) -> Result<Vec<Message>, ChatLogClientError> {
        if let Ok(mut fetches) = self.fetches.lock() {
            fetches.push(page);
        }
        let gate = self
            .gates
            .lock()
            .ok()
            .and_then(|mut gates| gates.remove(&page));
        if let Some(gate) = gate {
            gate.notified().await;
        }
        if self.fail_fetches.load(Ordering::SeqCst) {
            return Err(Self::server_error());
        }
        Ok(self
            .pages
            .lock()
            .ok()
            .and_then(|pages| pages.get(&page).cloned())
            .unwrap_or_default())
    }

    async fn submit(
        &self,
        conversation_id: &str,
        payload: &SubmitPayload,
    ) -> Result<Message, ChatLogClientError> {
        if let Ok(mut submits) = self.submits.lock() {
            submits.push(payload.clone());
        }
        if self.fail_submits.load(Ordering::SeqCst) {
            return Err(Self::server_error());
        }
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let created = Message {
            id: MessageId(id),
            conversation_id: conversation_id.to_string(),
            sender_id: payload.sender_id.clone(),
            sender_display: "Me".to_string(),
            body: payload.body.clone(),
            attachment_ref: payload
                .attachment
                .as_ref()
                .map(|attachment| attachment.file_name.clone()),
            reply_to_summary: payload.reply_to_text.clone(),
            created_at: Utc::now(),
        };
        if let Ok(mut pages) = self.pages.lock() {
            pages.entry(1).or_default().push(created.clone());
        }
        Ok(created)
    }

    async fn delete_message(&self, id: MessageId) -> Result<(), ChatLogClientError> {
        if let Ok(mut deletes) = self.deletes.lock() {
            deletes.push(id);
        }
        if self.fail_deletes.load(Ordering::SeqCst) {
            return Err(Self::server_error());
        }
        if let Ok(mut pages) = self.pages.lock() {
            for messages in pages.values_mut() {
                messages.retain(|message| message.id != id);
            }
        }
        Ok(())
    }
}

#[derive(Debug, Default)]
struct ViewportState {
    rows: usize,
    scroll_top: f64,
}

/// Fixed-height rows; the row count follows the last change notification.
#[derive(Debug, Default)]
pub struct FakeViewport {
    state: Mutex<ViewportState>,
}

impl FakeViewport {
    pub fn set_rows(&self, rows: usize) {
        if let Ok(mut state) = self.state.lock() {
            state.rows = rows;
        }
    }

    pub fn scroll_top(&self) -> f64 {
        self.metrics().scroll_top
    }

    pub fn bottom(&self) -> f64 {
        let metrics = self.metrics();
        (metrics.scroll_height - metrics.client_height).max(0.0)
    }
}

impl Viewport for FakeViewport {
    fn metrics(&self) -> ViewportMetrics {
        self.state
            .lock()
            .map(|state| ViewportMetrics {
                scroll_top: state.scroll_top,
                scroll_height: state.rows as f64 * ROW_HEIGHT,
                client_height: CLIENT_HEIGHT,
            })
            .unwrap_or_default()
    }

    fn set_scroll_top(&self, scroll_top: f64) {
        if let Ok(mut state) = self.state.lock() {
            let max = (state.rows as f64 * ROW_HEIGHT - CLIENT_HEIGHT).max(0.0);
            state.scroll_top = scroll_top.clamp(0.0, max);
        }
    }
}

pub struct Harness {
    pub log: Arc<FakeLog>,
    pub viewport: Arc<FakeViewport>,
    pub handle: ConversationHandle,
    pub task: JoinHandle<()>,
}

impl Harness {
    pub fn open(log: Arc<FakeLog>) -> Self {
        Self::open_with(log, SessionOptions::new(CONVERSATION, SENDER))
    }

    pub fn open_with(log: Arc<FakeLog>, options: SessionOptions) -> Self {
        let viewport = Arc::new(FakeViewport::default());
        let (handle, task) = spawn_session(
            Arc::clone(&log) as Arc<dyn RemoteLog>,
            Arc::clone(&viewport) as Arc<dyn Viewport>,
            options,
        );
        let rows = Arc::clone(&viewport);
        handle.on_messages_changed(move |change| rows.set_rows(change.messages.len()));
        Self {
            log,
            viewport,
            handle,
            task,
        }
    }

    /// User-driven scroll: moves the viewport and tells the session.
    pub fn scroll_to(&self, scroll_top: f64) {
        self.viewport.set_scroll_top(scroll_top);
        self.handle.signal(EnvironmentSignal::Scrolled {
            scroll_top: self.viewport.scroll_top(),
        });
    }

    pub async fn message_ids(&self) -> Vec<u64> {
        self.handle
            .snapshot()
            .await
            .map(|snapshot| ids(&snapshot.view.messages))
            .unwrap_or_default()
    }
}

/// Let spawned fetches and the session loop run without crossing a poll tick.
pub async fn settle() {
    for _ in 0..4 {
        tokio::task::yield_now().await;
    }
    tokio::time::sleep(Duration::from_millis(1)).await;
    for _ in 0..4 {
        tokio::task::yield_now().await;
    }
}

pub async fn advance(duration: Duration) {
    tokio::time::sleep(duration).await;
    settle().await;
}
