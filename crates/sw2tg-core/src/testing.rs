//! In-memory ports shared by the unit tests.

use std::{
    collections::{BTreeSet, HashMap, VecDeque},
    sync::Mutex,
    time::Duration,
};

use async_trait::async_trait;
use chrono::NaiveDate;
use tokio::time::Instant;

use crate::{
    domain::{ChatId, MessageId, MessageRef},
    messaging::{
        port::MessagingPort,
        types::{
            BotCommand, ChatAction, IncomingMessage, IncomingUpdate, MessagingCapabilities,
            OutgoingMessage,
        },
    },
    workouts::{DayBuckets, TrackWeek, WorkoutSource},
    Error, Result,
};

pub(crate) enum SendOutcome {
    Ok,
    RateLimited(Duration),
    Reject,
}

#[derive(Default)]
pub(crate) struct FakeMessenger {
    next_id: Mutex<i32>,
    outcomes: Mutex<VecDeque<SendOutcome>>,
    sent: Mutex<Vec<OutgoingMessage>>,
    sent_at: Mutex<Vec<Instant>>,
    actions: Mutex<Vec<(ChatId, ChatAction)>>,
    batches: Mutex<VecDeque<Option<Vec<IncomingUpdate>>>>,
    offsets: Mutex<Vec<i64>>,
    commands: Mutex<Vec<BotCommand>>,
    set_commands_calls: Mutex<usize>,
}

impl FakeMessenger {
    pub(crate) fn new() -> Self {
        Self {
            next_id: Mutex::new(1),
            ..Default::default()
        }
    }

    /// Outcomes for the next sends; once exhausted every send succeeds.
    pub(crate) fn script(&self, outcomes: impl IntoIterator<Item = SendOutcome>) {
        self.outcomes.lock().unwrap().extend(outcomes);
    }

    /// Queue one `get_updates` answer; `None` fails the call.
    pub(crate) fn push_updates(&self, batch: Option<Vec<IncomingUpdate>>) {
        self.batches.lock().unwrap().push_back(batch);
    }

    pub(crate) fn set_published_commands(&self, commands: Vec<BotCommand>) {
        *self.commands.lock().unwrap() = commands;
    }

    pub(crate) fn sent(&self) -> Vec<OutgoingMessage> {
        self.sent.lock().unwrap().clone()
    }

    /// Clock reading of every send attempt, in order.
    pub(crate) fn sent_at(&self) -> Vec<Instant> {
        self.sent_at.lock().unwrap().clone()
    }

    pub(crate) fn sent_texts(&self) -> Vec<String> {
        self.sent().into_iter().map(|m| m.text).collect()
    }

    pub(crate) fn actions(&self) -> Vec<(ChatId, ChatAction)> {
        self.actions.lock().unwrap().clone()
    }

    pub(crate) fn offsets(&self) -> Vec<i64> {
        self.offsets.lock().unwrap().clone()
    }

    pub(crate) fn published_commands(&self) -> Vec<BotCommand> {
        self.commands.lock().unwrap().clone()
    }

    pub(crate) fn set_commands_calls(&self) -> usize {
        *self.set_commands_calls.lock().unwrap()
    }
}

#[async_trait]
impl MessagingPort for FakeMessenger {
    fn capabilities(&self) -> MessagingCapabilities {
        MessagingCapabilities {
            max_message_len: 4096,
        }
    }

    async fn bot_username(&self) -> Result<String> {
        Ok("sw2tg_bot".to_string())
    }

    async fn send_message(&self, msg: &OutgoingMessage) -> Result<MessageRef> {
        self.sent.lock().unwrap().push(msg.clone());
        self.sent_at.lock().unwrap().push(Instant::now());
        let outcome = self.outcomes.lock().unwrap().pop_front();
        match outcome {
            None | Some(SendOutcome::Ok) => {}
            Some(SendOutcome::RateLimited(retry_after)) => {
                return Err(Error::RateLimited { retry_after })
            }
            Some(SendOutcome::Reject) => {
                return Err(Error::Delivery("can't parse entities".to_string()))
            }
        }

        let mut next = self.next_id.lock().unwrap();
        let id = *next;
        *next += 1;
        Ok(MessageRef {
            chat_id: msg.chat_id,
            message_id: MessageId(id),
        })
    }

    async fn send_chat_action(&self, chat_id: ChatId, action: ChatAction) -> Result<()> {
        self.actions.lock().unwrap().push((chat_id, action));
        Ok(())
    }

    async fn get_updates(&self, offset: i64) -> Result<Vec<IncomingUpdate>> {
        self.offsets.lock().unwrap().push(offset);
        match self.batches.lock().unwrap().pop_front() {
            Some(Some(batch)) => Ok(batch),
            Some(None) => Err(Error::Network("connection reset".to_string())),
            None => Ok(Vec::new()),
        }
    }

    async fn get_commands(&self) -> Result<Vec<BotCommand>> {
        Ok(self.published_commands())
    }

    async fn set_commands(&self, commands: &[BotCommand]) -> Result<()> {
        *self.set_commands_calls.lock().unwrap() += 1;
        *self.commands.lock().unwrap() = commands.to_vec();
        Ok(())
    }
}

pub(crate) fn text_update(update_id: i64, chat: i64, text: &str) -> IncomingUpdate {
    IncomingUpdate {
        update_id,
        message: Some(IncomingMessage {
            message_id: MessageId(update_id as i32 * 10),
            chat_id: ChatId(chat),
            sender: Some("athlete".to_string()),
            text: Some(text.to_string()),
        }),
    }
}

/// Workout source serving fixed weeks per track.
#[derive(Default)]
pub(crate) struct FakeSource {
    pub(crate) weeks: HashMap<String, DayBuckets>,
    pub(crate) tracks: BTreeSet<String>,
    pub(crate) fail: bool,
    pub(crate) calls: Mutex<Vec<(Vec<String>, NaiveDate)>>,
}

impl FakeSource {
    pub(crate) fn calls(&self) -> Vec<(Vec<String>, NaiveDate)> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl WorkoutSource for FakeSource {
    async fn fetch_week_by_tracks(
        &self,
        tracks: &[String],
        start: NaiveDate,
    ) -> Result<Vec<TrackWeek>> {
        self.calls.lock().unwrap().push((tracks.to_vec(), start));
        if self.fail {
            return Err(Error::Auth("credentials rejected".to_string()));
        }
        Ok(tracks
            .iter()
            .map(|t| TrackWeek {
                track: t.clone(),
                days: self.weeks.get(t).cloned().unwrap_or_default(),
            })
            .collect())
    }

    async fn list_tracks(&self) -> Result<BTreeSet<String>> {
        if self.fail {
            return Err(Error::Auth("credentials rejected".to_string()));
        }
        Ok(self.tracks.clone())
    }
}
