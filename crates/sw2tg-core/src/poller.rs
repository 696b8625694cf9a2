//! Inbound update polling and command dispatch.
//!
//! The cursor is an explicit value: `poll` takes the current cursor and
//! returns the advanced one. It moves past every observed update before that
//! update's command runs, so a failing command is never redelivered.

use std::{str::FromStr, sync::Arc};

use async_trait::async_trait;
use chrono::{Local, NaiveDate};

use crate::{
    domain::{ChatId, MessageId},
    messaging::{delivery::Delivery, types::ChatAction},
    Error, Result,
};

const ACK_TEXT: &str = "On it 💪";
const DONE_TEXT: &str = "Done 💪";

/// What the first poll after startup does with the backlog.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum StartupPolicy {
    /// Advance past pending updates without running their commands.
    #[default]
    Drain,
    /// Run pending commands like any later poll.
    Dispatch,
}

impl FromStr for StartupPolicy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "drain" => Ok(Self::Drain),
            "dispatch" => Ok(Self::Dispatch),
            other => Err(Error::Config(format!(
                "unknown startup policy {other:?} (expected drain or dispatch)"
            ))),
        }
    }
}

/// Next update offset to request.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct UpdateCursor {
    offset: i64,
    primed: bool,
}

impl UpdateCursor {
    /// Fresh cursor: offset zero, first poll not yet done.
    pub fn new() -> Self {
        Self::default()
    }

    /// Cursor resuming at `offset`, as if a poll already happened.
    pub fn at(offset: i64) -> Self {
        Self {
            offset,
            primed: true,
        }
    }

    pub fn offset(&self) -> i64 {
        self.offset
    }

    pub fn is_primed(&self) -> bool {
        self.primed
    }

    fn observe(&mut self, update_id: i64) {
        if update_id >= self.offset {
            self.offset = update_id + 1;
        }
    }
}

/// Recognized bot commands.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Command {
    Tracks,
    Today,
    Tomorrow,
    Week,
}

const COMMAND_TABLE: &[(&str, Command)] = &[
    ("/tracks", Command::Tracks),
    ("/today", Command::Today),
    ("/tomorrow", Command::Tomorrow),
    ("/week", Command::Week),
];

impl Command {
    pub fn all() -> impl Iterator<Item = Command> {
        COMMAND_TABLE.iter().map(|(_, c)| *c)
    }

    /// Look up a command token such as `/today`.
    pub fn lookup(token: &str) -> Option<Command> {
        COMMAND_TABLE
            .iter()
            .find(|(name, _)| *name == token)
            .map(|(_, c)| *c)
    }

    /// Name without the leading slash.
    pub fn name(self) -> &'static str {
        COMMAND_TABLE
            .iter()
            .find(|(_, c)| *c == self)
            .map(|(name, _)| name.trim_start_matches('/'))
            .unwrap_or_default()
    }

    pub fn description(self) -> &'static str {
        match self {
            Command::Tracks => "List the available tracks",
            Command::Today => "Today's workouts [track]",
            Command::Tomorrow => "Tomorrow's workouts [track]",
            Command::Week => "This week's workouts [track]",
        }
    }
}

/// Split `/cmd@bot rest of text` into a known command and its argument.
pub fn parse_command(text: &str, bot_username: Option<&str>) -> Option<(Command, Option<String>)> {
    let text = match bot_username.filter(|u| !u.is_empty()) {
        Some(username) => text.replace(&format!("@{username}"), ""),
        None => text.to_string(),
    };

    let mut parts = text.trim().splitn(2, char::is_whitespace);
    let command = Command::lookup(parts.next()?)?;
    let args = parts
        .next()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string);
    Some((command, args))
}

/// A command as received, ready for its handler.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CommandInvocation {
    pub command: Command,
    /// Remainder of the message after the command token (a track key).
    pub args: Option<String>,
    pub chat_id: ChatId,
    pub message_id: MessageId,
    /// Local date the command was received on.
    pub today: NaiveDate,
}

#[async_trait]
pub trait CommandHandler: Send + Sync {
    async fn handle(&self, invocation: &CommandInvocation) -> Result<()>;
}

#[derive(Debug)]
pub struct DispatchFailure {
    pub update_id: i64,
    pub error: Error,
}

#[derive(Debug)]
pub struct PollReport {
    pub cursor: UpdateCursor,
    pub received: usize,
    pub dispatched: usize,
    pub failures: Vec<DispatchFailure>,
}

pub struct UpdatePoller {
    delivery: Delivery,
    handler: Arc<dyn CommandHandler>,
    bot_username: Option<String>,
    policy: StartupPolicy,
    clock: fn() -> NaiveDate,
}

fn local_today() -> NaiveDate {
    Local::now().date_naive()
}

impl UpdatePoller {
    pub fn new(
        delivery: Delivery,
        handler: Arc<dyn CommandHandler>,
        bot_username: Option<String>,
        policy: StartupPolicy,
    ) -> Self {
        Self {
            delivery,
            handler,
            bot_username,
            policy,
            clock: local_today,
        }
    }

    pub fn with_clock(mut self, clock: fn() -> NaiveDate) -> Self {
        self.clock = clock;
        self
    }

    /// Fetch updates from `cursor` and dispatch the recognized commands.
    ///
    /// Fails only when the updates themselves cannot be fetched; the caller
    /// then keeps its previous cursor. Handler failures are collected in the
    /// report and never stop the cursor from reaching `max_id + 1`.
    pub async fn poll(&self, cursor: UpdateCursor) -> Result<PollReport> {
        let mut cursor = cursor;
        tracing::debug!("Getting messages with offset {}", cursor.offset);
        let updates = self.delivery.port().get_updates(cursor.offset).await?;

        let dispatch = cursor.primed || self.policy == StartupPolicy::Dispatch;
        let mut report = PollReport {
            cursor,
            received: updates.len(),
            dispatched: 0,
            failures: Vec::new(),
        };

        for update in updates {
            tracing::info!("Processing message with offset {}", update.update_id);
            cursor.observe(update.update_id);
            if !dispatch {
                continue;
            }

            let Some(msg) = update.message else {
                continue;
            };
            let Some(text) = msg.text.as_deref() else {
                continue;
            };
            let Some((command, args)) = parse_command(text, self.bot_username.as_deref()) else {
                continue;
            };

            let invocation = CommandInvocation {
                command,
                args,
                chat_id: msg.chat_id,
                message_id: msg.message_id,
                today: (self.clock)(),
            };
            match self.dispatch(&invocation).await {
                Ok(()) => report.dispatched += 1,
                Err(error) => {
                    tracing::error!(
                        "/{} from chat {} failed: {error}",
                        command.name(),
                        msg.chat_id.0
                    );
                    report.failures.push(DispatchFailure {
                        update_id: update.update_id,
                        error,
                    });
                }
            }
        }

        if !dispatch && report.received > 0 {
            tracing::info!(
                "Drained {} pending updates without dispatch",
                report.received
            );
        }

        cursor.primed = true;
        report.cursor = cursor;
        Ok(report)
    }

    async fn dispatch(&self, invocation: &CommandInvocation) -> Result<()> {
        let chat_id = invocation.chat_id;
        let reply_to = invocation.message_id;

        self.delivery.send_reply(chat_id, ACK_TEXT, reply_to).await?;
        self.delivery
            .port()
            .send_chat_action(chat_id, ChatAction::Typing)
            .await?;
        self.handler.handle(invocation).await?;
        self.delivery.send_reply(chat_id, DONE_TEXT, reply_to).await
    }
}
