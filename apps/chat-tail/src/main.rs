//! Follow one conversation from a terminal.
//!
//! Every stdin line is posted as a message. `/older`, `/refresh`,
//! `/delete <id>` and `/quit` drive the session directly.

#![allow(clippy::print_stdout, clippy::print_stderr)]

use std::cell::Cell;
use std::sync::Arc;

use anyhow::{Context, Result};
use chat_log_client::DEFAULT_TIMEOUT_MS;
use chat_sync::{
    ChatLogClient, ChatLogClientConfig, ComposerState, ConversationHandle, DetachedViewport,
    Draft, MembershipStatus, MergeTrigger, Message, MessageId, MessagesChanged, SendError,
    SessionOptions, SyncConfig, spawn_session,
};
use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(name = "chat-tail")]
#[command(about = "Follow a conversation and post stdin lines to it")]
struct Args {
    /// Base URL of the message log service.
    #[arg(long, env = "CHAT_LOG_BASE_URL")]
    base_url: String,

    /// Per-request timeout in milliseconds.
    #[arg(long, env = "CHAT_LOG_TIMEOUT_MS", default_value_t = DEFAULT_TIMEOUT_MS)]
    timeout_ms: u64,

    #[arg(long, env = "CHAT_TAIL_CONVERSATION")]
    conversation: String,

    #[arg(long, env = "CHAT_TAIL_SENDER")]
    sender: String,

    /// One of active, pending, muted, banned.
    #[arg(long, env = "CHAT_TAIL_MEMBERSHIP", default_value = "active", value_parser = parse_membership)]
    membership: MembershipStatus,
}

enum Input<'a> {
    Older,
    Refresh,
    Delete(&'a str),
    Quit,
    Post(&'a str),
}

impl<'a> Input<'a> {
    fn parse(line: &'a str) -> Option<Self> {
        let line = line.trim();
        if line.is_empty() {
            return None;
        }
        Some(match line {
            "/older" => Self::Older,
            "/refresh" => Self::Refresh,
            "/quit" => Self::Quit,
            _ => match line.strip_prefix("/delete ") {
                Some(id) => Self::Delete(id.trim()),
                None => Self::Post(line),
            },
        })
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    let config = SyncConfig::from_env().context("read CHAT_SYNC_* settings")?;
    let client = ChatLogClient::new(ChatLogClientConfig {
        base_url: args.base_url.clone(),
        timeout_ms: args.timeout_ms,
    })
    .context("build chat log client")?;

    let options = SessionOptions {
        membership: args.membership,
        config,
        ..SessionOptions::new(args.conversation.clone(), args.sender.clone())
    };
    let (handle, session) = spawn_session(Arc::new(client), Arc::new(DetachedViewport), options);

    let last_shown = Cell::new(None);
    handle.on_messages_changed(move |change| render_messages(change, &last_shown));
    handle.on_composer_changed(render_composer);
    info!(
        base_url = %args.base_url,
        conversation_id = %args.conversation,
        membership = args.membership.as_str(),
        "following conversation"
    );

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line.context("read stdin")? else {
                    break;
                };
                match Input::parse(&line) {
                    None => {}
                    Some(Input::Quit) => break,
                    Some(Input::Older) => handle.request_older(),
                    Some(Input::Refresh) => handle.refresh(),
                    Some(Input::Delete(raw)) => delete(&handle, raw).await,
                    Some(Input::Post(body)) => {
                        if !post(&handle, body).await {
                            break;
                        }
                    }
                }
            }
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    handle.close();
    session.await.context("join conversation session")?;
    Ok(())
}

/// Returns false once the session is gone.
async fn post(handle: &ConversationHandle, body: &str) -> bool {
    match handle.send_message(Draft::text(body)).await {
        Ok(message) => {
            info!(message_id = %message.id, "message sent");
            true
        }
        Err(SendError::Closed) => false,
        Err(error) => {
            warn!(error = %error, "message not sent");
            true
        }
    }
}

async fn delete(handle: &ConversationHandle, raw: &str) {
    let Ok(id) = raw.parse::<u64>() else {
        eprintln!("not a message id: {raw}");
        return;
    };
    if let Err(error) = handle.delete_message(MessageId(id)).await {
        eprintln!("delete {id} failed: {error}");
    }
}

fn render_messages(change: &MessagesChanged, last_shown: &Cell<Option<MessageId>>) {
    match change.trigger {
        MergeTrigger::Backfill => {
            println!("-- {} messages loaded --", change.messages.len());
            return;
        }
        MergeTrigger::Delete => {
            println!("-- message removed --");
            return;
        }
        MergeTrigger::Initial | MergeTrigger::Refresh => last_shown.set(None),
        MergeTrigger::Poll | MergeTrigger::OwnSend => {}
    }

    let start = last_shown
        .get()
        .and_then(|last| change.messages.iter().position(|message| message.id == last))
        .map_or(0, |index| index + 1);
    for message in change.messages.iter().skip(start) {
        println!("{}", format_message(message));
    }
    if let Some(last) = change.messages.last() {
        last_shown.set(Some(last.id));
    }
}

fn render_composer(state: &ComposerState) {
    if let Some(error) = &state.error {
        eprintln!("send failed: {error}");
    }
    if !state.posting_enabled {
        eprintln!("posting is disabled for this member");
    }
    if !state.draft.is_empty() {
        eprintln!("draft kept: {}", state.draft.body);
    }
}

fn format_message(message: &Message) -> String {
    let body = message.body_text().unwrap_or("[attachment]");
    let mut line = format!(
        "#{} {} {}: {}",
        message.id,
        message.created_at.format("%Y-%m-%d %H:%M"),
        display_name(message),
        body
    );
    if let Some(reply) = &message.reply_to_summary {
        line.push_str(&format!("  (re: {reply})"));
    }
    line
}

fn display_name(message: &Message) -> &str {
    if message.sender_display.trim().is_empty() {
        &message.sender_id
    } else {
        &message.sender_display
    }
}

fn parse_membership(raw: &str) -> Result<MembershipStatus, String> {
    MembershipStatus::parse(raw).ok_or_else(|| format!("unknown membership status `{raw}`"))
}
