//! Outward operations: fetch workouts and announce them to a chat.

use std::{collections::BTreeSet, sync::Arc, time::Duration};

use async_trait::async_trait;
use chrono::NaiveDate;

use crate::{
    domain::ChatId,
    formatting::{escape_markdown_v2, MessageComposer},
    messaging::delivery::Delivery,
    poller::{Command, CommandHandler, CommandInvocation},
    workouts::WorkoutSource,
    Error, Result,
};

/// Sent after every announcement run.
pub const CLOSING_GLYPH: &str = "🏋️";

pub struct WorkoutBridge {
    source: Arc<dyn WorkoutSource>,
    delivery: Delivery,
    composer: MessageComposer,
    daily_tracks: Vec<String>,
    weekly_tracks: Vec<String>,
    week_interval: Duration,
}

impl WorkoutBridge {
    pub fn new(source: Arc<dyn WorkoutSource>, delivery: Delivery, composer: MessageComposer) -> Self {
        Self {
            source,
            delivery,
            composer,
            daily_tracks: Vec::new(),
            weekly_tracks: Vec::new(),
            week_interval: Duration::from_secs(1),
        }
    }

    pub fn with_daily_tracks(mut self, tracks: Vec<String>) -> Self {
        self.daily_tracks = tracks;
        self
    }

    pub fn with_weekly_tracks(mut self, tracks: Vec<String>) -> Self {
        self.weekly_tracks = tracks;
        self
    }

    /// Pause between sends of a week-wide run.
    pub fn with_week_interval(mut self, interval: Duration) -> Self {
        self.week_interval = interval;
        self
    }

    pub async fn send_all_tracks_for_date(&self, date: NaiveDate, chat_id: ChatId) -> Result<()> {
        self.send_tracks_for_date(&self.daily_tracks, date, chat_id)
            .await
    }

    pub async fn send_one_track_for_date(
        &self,
        date: NaiveDate,
        track: &str,
        chat_id: ChatId,
    ) -> Result<()> {
        self.send_tracks_for_date(&[track.to_string()], date, chat_id)
            .await
    }

    pub async fn send_all_tracks_for_week(&self, start: NaiveDate, chat_id: ChatId) -> Result<()> {
        self.send_tracks_for_week(&self.weekly_tracks, start, chat_id)
            .await
    }

    pub async fn send_one_track_for_week(
        &self,
        start: NaiveDate,
        track: &str,
        chat_id: ChatId,
    ) -> Result<()> {
        self.send_tracks_for_week(&[track.to_string()], start, chat_id)
            .await
    }

    pub async fn list_tracks(&self) -> Result<BTreeSet<String>> {
        self.source.list_tracks().await
    }

    async fn send_tracks_for_date(
        &self,
        tracks: &[String],
        date: NaiveDate,
        chat_id: ChatId,
    ) -> Result<()> {
        tracing::info!("Sending {} tracks for {date} to {}", tracks.len(), chat_id.0);
        let weeks = self.source.fetch_week_by_tracks(tracks, date).await?;
        for week in &weeks {
            let blocks = self
                .composer
                .compose(&week.track, date, week.days.items_on(date));
            self.delivery.send_batch(chat_id, &blocks).await?;
        }
        self.delivery.send(chat_id, CLOSING_GLYPH).await
    }

    async fn send_tracks_for_week(
        &self,
        tracks: &[String],
        start: NaiveDate,
        chat_id: ChatId,
    ) -> Result<()> {
        tracing::info!(
            "Sending {} tracks for the week of {start} to {}",
            tracks.len(),
            chat_id.0
        );
        let weeks = self.source.fetch_week_by_tracks(tracks, start).await?;
        // One batch for the whole run so every send, the closing one
        // included, is spaced by the interval.
        let mut blocks = Vec::new();
        for week in &weeks {
            for (day, items) in week.days.iter() {
                blocks.extend(self.composer.compose(&week.track, day, items));
            }
        }
        blocks.push(CLOSING_GLYPH.to_string());
        self.delivery
            .send_batch_paced(chat_id, &blocks, self.week_interval)
            .await
    }

    async fn send_track_list(&self, chat_id: ChatId) -> Result<()> {
        for track in self.list_tracks().await? {
            self.delivery
                .send(chat_id, &escape_markdown_v2(&track))
                .await?;
        }
        Ok(())
    }
}

#[async_trait]
impl CommandHandler for WorkoutBridge {
    async fn handle(&self, invocation: &CommandInvocation) -> Result<()> {
        let chat_id = invocation.chat_id;
        let today = invocation.today;
        let track = invocation.args.as_deref();

        match invocation.command {
            Command::Tracks => self.send_track_list(chat_id).await,
            Command::Today => match track {
                Some(track) => self.send_one_track_for_date(today, track, chat_id).await,
                None => self.send_all_tracks_for_date(today, chat_id).await,
            },
            Command::Tomorrow => {
                let tomorrow = today
                    .succ_opt()
                    .ok_or_else(|| Error::External(format!("no day after {today}")))?;
                match track {
                    Some(track) => self.send_one_track_for_date(tomorrow, track, chat_id).await,
                    None => self.send_all_tracks_for_date(tomorrow, chat_id).await,
                }
            }
            Command::Week => match track {
                Some(track) => self.send_one_track_for_week(today, track, chat_id).await,
                None => self.send_all_tracks_for_week(today, chat_id).await,
            },
        }
    }
}
