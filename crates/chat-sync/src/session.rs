//! One synchronization session per open conversation.
//!
//! A single task owns every piece of mutable state. Network calls run on
//! spawned tasks and report back through a completion channel; once the
//! session task exits that channel is closed, so late results are dropped
//! without touching anything.

use std::collections::HashMap;
use std::sync::Arc;

use chat_log_client::{Attachment, ChatLogClientError, Message, MessageId, RemoteLog};
use chrono::Utc;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{Instant, sleep_until};
use tracing::{debug, info, trace, warn};

use crate::config::SyncConfig;
use crate::environment::{EnvironmentSignal, Viewport};
use crate::merge::{LiveMerge, merge_backfill, merge_live, merge_live_window};
use crate::pagination::{BackfillController, BackfillSnapshot, ScrollAnchor};
use crate::scheduler::{PauseReason, PollScheduler, PollSnapshot};
use crate::send::{ComposerState, Draft, MembershipStatus, SendPipeline, SendRejection};
use crate::view::ConversationView;
use crate::viewport::{MergeTrigger, ScrollActivity, should_auto_scroll};

const LATEST_PAGE: u32 = 1;

#[derive(Debug, Clone)]
pub struct MessagesChanged {
    pub conversation_id: String,
    pub messages: Arc<[Message]>,
    pub trigger: MergeTrigger,
}

pub type MessagesListener = Box<dyn Fn(&MessagesChanged) + Send + 'static>;
pub type ComposerListener = Box<dyn Fn(&ComposerState) + Send + 'static>;

#[derive(Debug, Error)]
pub enum SendError {
    #[error(transparent)]
    Rejected(#[from] SendRejection),
    #[error("submit failed: {0}")]
    Submit(ChatLogClientError),
    #[error("conversation session closed")]
    Closed,
}

#[derive(Debug, Error)]
pub enum DeleteError {
    #[error("delete failed: {0}")]
    Remote(ChatLogClientError),
    #[error("message {0} is not loaded in this conversation")]
    UnknownMessage(MessageId),
    #[error("delete of message {0} is already in flight")]
    InFlight(MessageId),
    #[error("conversation session closed")]
    Closed,
}

#[derive(Debug, Clone)]
pub struct SessionOptions {
    pub conversation_id: String,
    pub sender_id: String,
    pub membership: MembershipStatus,
    pub config: SyncConfig,
}

impl SessionOptions {
    #[must_use]
    pub fn new(conversation_id: impl Into<String>, sender_id: impl Into<String>) -> Self {
        Self {
            conversation_id: conversation_id.into(),
            sender_id: sender_id.into(),
            membership: MembershipStatus::Active,
            config: SyncConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncHealthSnapshot {
    pub polls_succeeded: u64,
    pub polls_failed: u64,
    pub polls_skipped: u64,
    pub polls_discarded: u64,
    pub consecutive_poll_failures: u32,
    pub last_poll_error: Option<String>,
    pub backfills_failed: u64,
}

#[derive(Debug, Clone)]
pub struct SessionSnapshot {
    pub view: ConversationView,
    pub composer: ComposerState,
    pub poll: PollSnapshot,
    pub backfill: BackfillSnapshot,
    pub health: SyncHealthSnapshot,
    pub live_in_flight: bool,
    pub failed_deletes: HashMap<MessageId, String>,
}

enum Command {
    OnMessagesChanged(MessagesListener),
    OnComposerChanged(ComposerListener),
    Send {
        draft: Draft,
        reply: oneshot::Sender<Result<Message, SendError>>,
    },
    SetDraftBody(String),
    SetAttachment(Option<Attachment>),
    SetReplyTarget(Box<Message>),
    ClearReplyTarget,
    DismissError,
    SetMembership(MembershipStatus),
    RequestOlder,
    Refresh,
    Delete {
        id: MessageId,
        reply: oneshot::Sender<Result<(), DeleteError>>,
    },
    Signal(EnvironmentSignal),
    Snapshot(oneshot::Sender<SessionSnapshot>),
    Close,
}

enum Completion {
    Live {
        trigger: MergeTrigger,
        result: Result<Vec<Message>, ChatLogClientError>,
    },
    Backfill {
        page: u32,
        anchor: ScrollAnchor,
        result: Result<Vec<Message>, ChatLogClientError>,
    },
    Refresh {
        result: Result<Vec<Message>, ChatLogClientError>,
    },
    Submit {
        result: Result<Message, ChatLogClientError>,
    },
    Delete {
        id: MessageId,
        result: Result<(), ChatLogClientError>,
    },
}

/// Cloneable front door to a running session.
#[derive(Clone)]
pub struct ConversationHandle {
    conversation_id: Arc<str>,
    commands: mpsc::UnboundedSender<Command>,
}

impl ConversationHandle {
    #[must_use]
    pub fn conversation_id(&self) -> &str {
        &self.conversation_id
    }

    pub fn on_messages_changed<F>(&self, listener: F)
    where
        F: Fn(&MessagesChanged) + Send + 'static,
    {
        self.dispatch(Command::OnMessagesChanged(Box::new(listener)));
    }

    pub fn on_composer_changed<F>(&self, listener: F)
    where
        F: Fn(&ComposerState) + Send + 'static,
    {
        self.dispatch(Command::OnComposerChanged(Box::new(listener)));
    }

    /// Resolves once the backend accepted or refused the message.
    pub async fn send_message(&self, draft: Draft) -> Result<Message, SendError> {
        let (reply, response) = oneshot::channel();
        if !self.dispatch(Command::Send { draft, reply }) {
            return Err(SendError::Closed);
        }
        response.await.unwrap_or(Err(SendError::Closed))
    }

    pub async fn delete_message(&self, id: MessageId) -> Result<(), DeleteError> {
        let (reply, response) = oneshot::channel();
        if !self.dispatch(Command::Delete { id, reply }) {
            return Err(DeleteError::Closed);
        }
        response.await.unwrap_or(Err(DeleteError::Closed))
    }

    pub fn set_draft_body(&self, body: impl Into<String>) {
        self.dispatch(Command::SetDraftBody(body.into()));
    }

    pub fn set_attachment(&self, attachment: Option<Attachment>) {
        self.dispatch(Command::SetAttachment(attachment));
    }

    pub fn set_reply_target(&self, message: &Message) {
        self.dispatch(Command::SetReplyTarget(Box::new(message.clone())));
    }

    pub fn clear_reply_target(&self) {
        self.dispatch(Command::ClearReplyTarget);
    }

    pub fn dismiss_error(&self) {
        self.dispatch(Command::DismissError);
    }

    pub fn set_membership(&self, membership: MembershipStatus) {
        self.dispatch(Command::SetMembership(membership));
    }

    pub fn request_older(&self) {
        self.dispatch(Command::RequestOlder);
    }

    pub fn refresh(&self) {
        self.dispatch(Command::Refresh);
    }

    pub fn signal(&self, signal: EnvironmentSignal) {
        self.dispatch(Command::Signal(signal));
    }

    /// `None` once the session has shut down.
    pub async fn snapshot(&self) -> Option<SessionSnapshot> {
        let (reply, response) = oneshot::channel();
        if !self.dispatch(Command::Snapshot(reply)) {
            return None;
        }
        response.await.ok()
    }

    pub fn close(&self) {
        self.dispatch(Command::Close);
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.commands.is_closed()
    }

    fn dispatch(&self, command: Command) -> bool {
        if self.commands.send(command).is_err() {
            trace!(conversation_id = %self.conversation_id, "command dropped; session closed");
            return false;
        }
        true
    }
}

/// Start syncing a conversation. Must be called from within a tokio runtime.
/// The initial fetch of the latest page starts immediately.
pub fn spawn_session(
    log: Arc<dyn RemoteLog>,
    viewport: Arc<dyn Viewport>,
    options: SessionOptions,
) -> (ConversationHandle, JoinHandle<()>) {
    let (command_tx, command_rx) = mpsc::unbounded_channel();
    let (completion_tx, completion_rx) = mpsc::unbounded_channel();
    let handle = ConversationHandle {
        conversation_id: Arc::from(options.conversation_id.as_str()),
        commands: command_tx,
    };
    let session = ConversationSession::new(log, viewport, options, completion_tx);
    let task = tokio::spawn(session.run(command_rx, completion_rx));
    (handle, task)
}

struct ConversationSession {
    log: Arc<dyn RemoteLog>,
    viewport: Arc<dyn Viewport>,
    config: SyncConfig,
    view: ConversationView,
    scheduler: PollScheduler,
    backfill: BackfillController,
    scroll: ScrollActivity,
    send: SendPipeline,
    completions: mpsc::UnboundedSender<Completion>,
    message_listeners: Vec<MessagesListener>,
    composer_listeners: Vec<ComposerListener>,
    loaded: bool,
    live_in_flight: bool,
    refresh_in_flight: bool,
    next_tick: Option<Instant>,
    tick_deferred: bool,
    settle_at: Option<Instant>,
    awaiting_own: Option<MessageId>,
    send_reply: Option<oneshot::Sender<Result<Message, SendError>>>,
    deletes_in_flight: HashMap<MessageId, oneshot::Sender<Result<(), DeleteError>>>,
    failed_deletes: HashMap<MessageId, String>,
    health: SyncHealthSnapshot,
}

impl ConversationSession {
    fn new(
        log: Arc<dyn RemoteLog>,
        viewport: Arc<dyn Viewport>,
        options: SessionOptions,
        completions: mpsc::UnboundedSender<Completion>,
    ) -> Self {
        let now = Instant::now();
        let config = options.config;
        Self {
            log,
            viewport,
            view: ConversationView::new(options.conversation_id),
            scheduler: PollScheduler::new(&config, now),
            backfill: BackfillController::new(config.backfill_threshold_px),
            scroll: ScrollActivity::new(config.scroll_idle, config.scroll_delta_px),
            send: SendPipeline::new(options.sender_id, options.membership),
            config,
            completions,
            message_listeners: Vec::new(),
            composer_listeners: Vec::new(),
            loaded: false,
            live_in_flight: false,
            refresh_in_flight: false,
            next_tick: None,
            tick_deferred: false,
            settle_at: None,
            awaiting_own: None,
            send_reply: None,
            deletes_in_flight: HashMap::new(),
            failed_deletes: HashMap::new(),
            health: SyncHealthSnapshot::default(),
        }
    }

    async fn run(
        mut self,
        mut commands: mpsc::UnboundedReceiver<Command>,
        mut completions: mpsc::UnboundedReceiver<Completion>,
    ) {
        info!(conversation_id = %self.view.conversation_id, "conversation sync opened");
        self.start_live_fetch(MergeTrigger::Initial);
        self.next_tick = Some(Instant::now() + self.scheduler.interval());

        loop {
            let tick_at = self.next_tick;
            let settle_at = self.settle_at;
            let inactivity_at = self.scheduler.inactivity_deadline();

            tokio::select! {
                biased;
                command = commands.recv() => match command {
                    Some(Command::Close) | None => break,
                    Some(command) => self.handle_command(command),
                },
                Some(completion) = completions.recv() => self.handle_completion(completion),
                () = sleep_until_opt(settle_at) => self.finish_backfill_settle(),
                () = sleep_until_opt(inactivity_at) => self.handle_inactivity(),
                () = sleep_until_opt(tick_at) => self.handle_tick(),
            }
        }

        info!(conversation_id = %self.view.conversation_id, "conversation sync closed");
    }

    fn handle_command(&mut self, command: Command) {
        match command {
            Command::OnMessagesChanged(listener) => self.message_listeners.push(listener),
            Command::OnComposerChanged(listener) => self.composer_listeners.push(listener),
            Command::Send { draft, reply } => self.start_send(draft, reply),
            Command::SetDraftBody(body) => {
                self.send.set_draft_body(body);
                self.notify_composer();
            }
            Command::SetAttachment(attachment) => {
                self.send.set_attachment(attachment);
                self.notify_composer();
            }
            Command::SetReplyTarget(message) => {
                self.send.set_reply_target(&message);
                self.notify_composer();
            }
            Command::ClearReplyTarget => {
                if self.send.clear_reply_target() {
                    self.notify_composer();
                }
            }
            Command::DismissError => {
                if self.send.dismiss_error() {
                    self.notify_composer();
                }
            }
            Command::SetMembership(membership) => {
                if self.send.set_membership(membership) {
                    debug!(
                        conversation_id = %self.view.conversation_id,
                        membership = membership.as_str(),
                        "membership changed"
                    );
                    self.notify_composer();
                }
            }
            Command::RequestOlder => self.start_backfill(None),
            Command::Refresh => self.start_refresh(),
            Command::Delete { id, reply } => self.start_delete(id, reply),
            Command::Signal(signal) => self.handle_signal(signal),
            Command::Snapshot(reply) => {
                let _ = reply.send(self.snapshot());
            }
            Command::Close => {}
        }
    }

    fn handle_completion(&mut self, completion: Completion) {
        match completion {
            Completion::Live { trigger, result } => self.finish_live_fetch(trigger, result),
            Completion::Backfill {
                page,
                anchor,
                result,
            } => self.finish_backfill(page, anchor, result),
            Completion::Refresh { result } => self.finish_refresh(result),
            Completion::Submit { result } => self.finish_send(result),
            Completion::Delete { id, result } => self.finish_delete(id, result),
        }
    }

    fn handle_signal(&mut self, signal: EnvironmentSignal) {
        let now = Instant::now();
        match signal {
            EnvironmentSignal::VisibilityChanged { visible } => {
                let was_paused = self.scheduler.is_paused();
                if let Some(transition) = self.scheduler.on_visibility_change(visible, now) {
                    debug!(
                        conversation_id = %self.view.conversation_id,
                        from = transition.from.as_str(),
                        to = transition.to.as_str(),
                        "poll cadence changed"
                    );
                    self.rearm_tick(now);
                }
                if was_paused && !self.scheduler.is_paused() {
                    self.run_deferred_tick(now);
                }
            }
            EnvironmentSignal::Activity(kind) => {
                if let Some(transition) = self.scheduler.on_activity(kind, now) {
                    debug!(
                        conversation_id = %self.view.conversation_id,
                        activity = kind.as_str(),
                        from = transition.from.as_str(),
                        to = transition.to.as_str(),
                        "poll cadence changed"
                    );
                    self.rearm_tick(now);
                }
            }
            EnvironmentSignal::Scrolled { scroll_top } => {
                self.scroll.record(scroll_top, now);
                if self.backfill.is_near_top(scroll_top) {
                    self.start_backfill(Some(scroll_top));
                }
            }
        }
    }

    fn handle_inactivity(&mut self) {
        let now = Instant::now();
        if let Some(transition) = self.scheduler.on_inactivity_check(now) {
            debug!(
                conversation_id = %self.view.conversation_id,
                from = transition.from.as_str(),
                to = transition.to.as_str(),
                "poll cadence changed"
            );
            self.rearm_tick(now);
        }
    }

    fn handle_tick(&mut self) {
        let now = Instant::now();
        self.next_tick = None;
        if let Some(reason) = self.scheduler.paused_reason() {
            trace!(
                conversation_id = %self.view.conversation_id,
                reason = reason.as_str(),
                "poll tick deferred"
            );
            self.tick_deferred = true;
            return;
        }

        if self.live_in_flight || self.backfill.is_loading() || self.scroll.is_active(now) {
            self.health.polls_skipped += 1;
            trace!(conversation_id = %self.view.conversation_id, "poll tick skipped");
        } else {
            self.start_live_fetch(MergeTrigger::Poll);
        }
        self.next_tick = Some(now + self.scheduler.interval());
    }

    fn rearm_tick(&mut self, now: Instant) {
        if self.next_tick.is_some() {
            self.next_tick = Some(now + self.scheduler.interval());
        }
    }

    fn run_deferred_tick(&mut self, now: Instant) {
        if self.tick_deferred {
            self.tick_deferred = false;
            self.next_tick = Some(now);
        }
    }

    fn start_live_fetch(&mut self, trigger: MergeTrigger) -> bool {
        if self.live_in_flight {
            self.health.polls_skipped += 1;
            debug!(
                conversation_id = %self.view.conversation_id,
                trigger = trigger.as_str(),
                "live fetch already in flight; dropping request"
            );
            return false;
        }
        self.live_in_flight = true;

        let log = Arc::clone(&self.log);
        let completions = self.completions.clone();
        let conversation_id = self.view.conversation_id.clone();
        tokio::spawn(async move {
            let result = log.fetch_page(&conversation_id, LATEST_PAGE).await;
            let _ = completions.send(Completion::Live { trigger, result });
        });
        true
    }

    fn finish_live_fetch(
        &mut self,
        trigger: MergeTrigger,
        result: Result<Vec<Message>, ChatLogClientError>,
    ) {
        self.live_in_flight = false;
        let fetched = match result {
            Ok(fetched) => fetched,
            Err(error) => {
                self.record_poll_failure(&error);
                return;
            }
        };
        if matches!(
            self.scheduler.paused_reason(),
            Some(PauseReason::Backfilling | PauseReason::Refreshing)
        ) {
            self.health.polls_discarded += 1;
            debug!(
                conversation_id = %self.view.conversation_id,
                trigger = trigger.as_str(),
                "discarding live page fetched while the list was being rebuilt"
            );
            return;
        }
        self.health.polls_succeeded += 1;
        self.health.consecutive_poll_failures = 0;

        let now = Instant::now();
        let before = self.viewport.metrics();
        let was_near_bottom = before.is_near_bottom(self.config.near_bottom_threshold_px);
        let actively_scrolling = self.scroll.is_active(now);
        let first_load = !self.loaded;
        self.loaded = true;
        if first_load && fetched.is_empty() {
            self.backfill.complete(LATEST_PAGE, 0);
            self.sync_pagination();
        }

        let messages = match merge_live_window(&self.view.messages, self.view.history_len, &fetched) {
            LiveMerge::Changed {
                messages,
                removed,
                appended,
            } => {
                debug!(
                    conversation_id = %self.view.conversation_id,
                    trigger = trigger.as_str(),
                    removed,
                    appended,
                    "live page merged"
                );
                messages
            }
            LiveMerge::Unchanged => {
                if first_load {
                    self.notify_messages(MergeTrigger::Initial);
                }
                if self.awaiting_own.is_some_and(|id| self.view.contains(id)) {
                    self.awaiting_own = None;
                }
                return;
            }
        };

        // Only the merge that first brings the sent message in counts as its arrival.
        let own_landed = self
            .awaiting_own
            .filter(|id| messages.iter().any(|message| message.id == *id));
        let own_arrived = own_landed.is_some_and(|id| !self.view.contains(id));
        if own_landed.is_some() {
            self.awaiting_own = None;
        }
        let trigger = if first_load {
            MergeTrigger::Initial
        } else if own_arrived {
            MergeTrigger::OwnSend
        } else {
            MergeTrigger::Poll
        };

        self.view.replace_messages(messages);
        self.notify_messages(trigger);
        if should_auto_scroll(was_near_bottom, actively_scrolling, trigger) {
            self.scroll_to_bottom();
        }
    }

    fn record_poll_failure(&mut self, error: &ChatLogClientError) {
        self.health.polls_failed += 1;
        self.health.consecutive_poll_failures =
            self.health.consecutive_poll_failures.saturating_add(1);
        self.health.last_poll_error = Some(error.to_string());
        if self.health.consecutive_poll_failures == 1 {
            warn!(
                conversation_id = %self.view.conversation_id,
                error = %error,
                "live poll failed; retrying on next tick"
            );
        } else {
            debug!(
                conversation_id = %self.view.conversation_id,
                error = %error,
                failures = self.health.consecutive_poll_failures,
                "live poll still failing"
            );
        }
    }

    fn start_backfill(&mut self, scroll_top: Option<f64>) {
        if !self.loaded {
            trace!(conversation_id = %self.view.conversation_id, "backfill ignored before first load");
            return;
        }
        if self.refresh_in_flight {
            trace!(conversation_id = %self.view.conversation_id, "backfill ignored during refresh");
            return;
        }
        let started = match scroll_top {
            Some(scroll_top) => self.backfill.begin_if_near_top(scroll_top),
            None => self.backfill.begin(),
        };
        let page = match started {
            Ok(page) => page,
            Err(skip) => {
                trace!(
                    conversation_id = %self.view.conversation_id,
                    reason = skip.as_str(),
                    "backfill not started"
                );
                return;
            }
        };

        self.scheduler.pause(PauseReason::Backfilling);
        self.settle_at = None;
        let metrics = self.viewport.metrics();
        let anchor = ScrollAnchor {
            scroll_top: metrics.scroll_top,
            scroll_height: metrics.scroll_height,
        };
        debug!(conversation_id = %self.view.conversation_id, page, "backfill started");

        let log = Arc::clone(&self.log);
        let completions = self.completions.clone();
        let conversation_id = self.view.conversation_id.clone();
        tokio::spawn(async move {
            let result = log.fetch_page(&conversation_id, page).await;
            let _ = completions.send(Completion::Backfill {
                page,
                anchor,
                result,
            });
        });
    }

    fn finish_backfill(
        &mut self,
        page: u32,
        anchor: ScrollAnchor,
        result: Result<Vec<Message>, ChatLogClientError>,
    ) {
        match result {
            Ok(older) => {
                self.backfill.complete(page, older.len());
                self.sync_pagination();
                let merged = merge_backfill(&self.view.messages, &older);
                debug!(
                    conversation_id = %self.view.conversation_id,
                    page,
                    prepended = merged.prepended,
                    "backfill merged"
                );
                if merged.prepended > 0 {
                    self.view.replace_messages(merged.messages);
                    self.view.history_len += merged.prepended;
                    self.notify_messages(MergeTrigger::Backfill);
                    let after = self.viewport.metrics();
                    let scroll_top = anchor.compensated_scroll_top(after.scroll_height);
                    self.viewport.set_scroll_top(scroll_top);
                    self.scroll.sync_position(scroll_top);
                }
            }
            Err(error) => {
                self.backfill.fail();
                self.health.backfills_failed += 1;
                warn!(
                    conversation_id = %self.view.conversation_id,
                    page,
                    error = %error,
                    "backfill failed"
                );
            }
        }
        self.settle_at = Some(Instant::now() + self.config.backfill_settle);
    }

    fn finish_backfill_settle(&mut self) {
        self.settle_at = None;
        if self.scheduler.resume(PauseReason::Backfilling) {
            self.run_deferred_tick(Instant::now());
        }
    }

    fn start_refresh(&mut self) {
        if self.refresh_in_flight || self.backfill.is_loading() {
            debug!(conversation_id = %self.view.conversation_id, "refresh dropped; list busy");
            return;
        }
        self.refresh_in_flight = true;
        self.scheduler.pause(PauseReason::Refreshing);

        let log = Arc::clone(&self.log);
        let completions = self.completions.clone();
        let conversation_id = self.view.conversation_id.clone();
        tokio::spawn(async move {
            let result = log.fetch_page(&conversation_id, LATEST_PAGE).await;
            let _ = completions.send(Completion::Refresh { result });
        });
    }

    fn finish_refresh(&mut self, result: Result<Vec<Message>, ChatLogClientError>) {
        self.refresh_in_flight = false;
        match result {
            Ok(fetched) => {
                let messages = match merge_live(&[], &fetched) {
                    LiveMerge::Changed { messages, .. } => messages,
                    LiveMerge::Unchanged => Vec::new(),
                };
                self.backfill.reset();
                if messages.is_empty() {
                    self.backfill.complete(LATEST_PAGE, 0);
                }
                self.sync_pagination();
                self.loaded = true;
                self.view.replace_messages(messages);
                self.view.history_len = 0;
                self.awaiting_own = None;
                self.notify_messages(MergeTrigger::Refresh);
                self.scroll_to_bottom();
            }
            Err(error) => {
                warn!(
                    conversation_id = %self.view.conversation_id,
                    error = %error,
                    "refresh failed"
                );
            }
        }

        let now = Instant::now();
        if self.scheduler.resume(PauseReason::Refreshing) {
            self.tick_deferred = false;
            self.next_tick = Some(now + self.scheduler.interval());
        }
    }

    fn start_send(&mut self, draft: Draft, reply: oneshot::Sender<Result<Message, SendError>>) {
        let payload = match self.send.begin(draft, Utc::now()) {
            Ok(payload) => payload,
            Err(rejection) => {
                debug!(
                    conversation_id = %self.view.conversation_id,
                    reason = %rejection,
                    "send rejected"
                );
                if rejection == SendRejection::Forbidden {
                    self.notify_composer();
                }
                let _ = reply.send(Err(SendError::Rejected(rejection)));
                return;
            }
        };
        self.send_reply = Some(reply);
        self.notify_composer();

        let log = Arc::clone(&self.log);
        let completions = self.completions.clone();
        let conversation_id = self.view.conversation_id.clone();
        tokio::spawn(async move {
            let result = log.submit(&conversation_id, &payload).await;
            let _ = completions.send(Completion::Submit { result });
        });
    }

    fn finish_send(&mut self, result: Result<Message, ChatLogClientError>) {
        let reply = self.send_reply.take();
        match result {
            Ok(message) => {
                let _ = self.send.confirm();
                self.awaiting_own = Some(message.id);
                self.notify_composer();
                debug!(
                    conversation_id = %self.view.conversation_id,
                    message_id = %message.id,
                    "message accepted"
                );
                self.start_live_fetch(MergeTrigger::OwnSend);
                if let Some(reply) = reply {
                    let _ = reply.send(Ok(message));
                }
            }
            Err(error) => {
                let _ = self.send.rollback(error.to_string());
                self.notify_composer();
                warn!(
                    conversation_id = %self.view.conversation_id,
                    error = %error,
                    "message submit failed; draft restored"
                );
                if let Some(reply) = reply {
                    let _ = reply.send(Err(SendError::Submit(error)));
                }
            }
        }
    }

    fn start_delete(&mut self, id: MessageId, reply: oneshot::Sender<Result<(), DeleteError>>) {
        if !self.view.contains(id) {
            let _ = reply.send(Err(DeleteError::UnknownMessage(id)));
            return;
        }
        if self.deletes_in_flight.contains_key(&id) {
            let _ = reply.send(Err(DeleteError::InFlight(id)));
            return;
        }
        self.failed_deletes.remove(&id);
        self.deletes_in_flight.insert(id, reply);

        let log = Arc::clone(&self.log);
        let completions = self.completions.clone();
        tokio::spawn(async move {
            let result = log.delete_message(id).await;
            let _ = completions.send(Completion::Delete { id, result });
        });
    }

    fn finish_delete(&mut self, id: MessageId, result: Result<(), ChatLogClientError>) {
        let reply = self.deletes_in_flight.remove(&id);
        let outcome = match result {
            Ok(()) => {
                if self.view.remove_message(id) {
                    if self.send.forget_reply_to(id) {
                        self.notify_composer();
                    }
                    self.notify_messages(MergeTrigger::Delete);
                }
                Ok(())
            }
            Err(error) => {
                warn!(
                    conversation_id = %self.view.conversation_id,
                    message_id = %id,
                    error = %error,
                    "message delete failed"
                );
                self.failed_deletes.insert(id, error.to_string());
                Err(DeleteError::Remote(error))
            }
        };
        if let Some(reply) = reply {
            let _ = reply.send(outcome);
        }
    }

    fn scroll_to_bottom(&mut self) {
        self.viewport.scroll_to_bottom();
        self.scroll.sync_position(self.viewport.metrics().scroll_top);
    }

    fn sync_pagination(&mut self) {
        let snapshot = self.backfill.snapshot();
        self.view.oldest_loaded_page = snapshot.current_page;
        self.view.has_more_older = snapshot.has_more;
    }

    fn notify_messages(&self, trigger: MergeTrigger) {
        if self.message_listeners.is_empty() {
            return;
        }
        let change = MessagesChanged {
            conversation_id: self.view.conversation_id.clone(),
            messages: Arc::from(self.view.messages.clone()),
            trigger,
        };
        for listener in &self.message_listeners {
            listener(&change);
        }
    }

    fn notify_composer(&self) {
        if self.composer_listeners.is_empty() {
            return;
        }
        let state = self.send.composer_state();
        for listener in &self.composer_listeners {
            listener(&state);
        }
    }

    fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            view: self.view.clone(),
            composer: self.send.composer_state(),
            poll: self.scheduler.snapshot(),
            backfill: self.backfill.snapshot(),
            health: self.health.clone(),
            live_in_flight: self.live_in_flight,
            failed_deletes: self.failed_deletes.clone(),
        }
    }
}

async fn sleep_until_opt(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}
