//! Client-side synchronization for a polled conversation log.
//!
//! A [`ConversationHandle`] drives one open conversation: it keeps the live
//! tail merged, loads older pages on demand, adapts its poll cadence to
//! visibility and user activity, and sends messages optimistically.

pub mod config;
pub mod environment;
pub mod merge;
pub mod pagination;
pub mod scheduler;
pub mod send;
pub mod session;
pub mod view;
pub mod viewport;

pub use chat_log_client::{
    Attachment, ChatLogClient, ChatLogClientConfig, ChatLogClientError, Message, MessageId,
    RemoteLog, SubmitPayload,
};
pub use config::{ConfigError, PollIntervals, SyncConfig};
pub use environment::{DetachedViewport, EnvironmentSignal, Viewport};
pub use merge::{BackfillMerge, LiveMerge, merge_backfill, merge_live, merge_live_window};
pub use pagination::{BackfillController, BackfillSkip, BackfillSnapshot, ScrollAnchor};
pub use scheduler::{ActivityKind, PauseReason, PollCadence, PollScheduler, PollSnapshot};
pub use send::{
    ComposerState, Draft, MembershipStatus, PendingSend, ReplySummary, SendPipeline,
    SendRejection,
};
pub use session::{
    ConversationHandle, DeleteError, MessagesChanged, SendError, SessionOptions, SessionSnapshot,
    SyncHealthSnapshot, spawn_session,
};
pub use view::{ConversationView, DateGroup};
pub use viewport::{MergeTrigger, ScrollActivity, ViewportMetrics, should_auto_scroll};
