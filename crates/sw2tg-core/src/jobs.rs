//! The bot's scheduled jobs and failure reporting.

use std::{fmt, sync::Arc};

use async_trait::async_trait;
use chrono::{Local, NaiveDate};

use crate::{
    bridge::WorkoutBridge,
    config::Config,
    domain::ChatId,
    formatting::{escape_markdown_v2, BlockBuilder},
    messaging::{delivery::Delivery, port::MessagingPort, types::BotCommand},
    poller::{Command, UpdateCursor, UpdatePoller},
    scheduler::{CronSchedule, JobRunner},
    Error, Result,
};

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum JobKind {
    /// Poll inbound updates and dispatch commands.
    PollUpdates,
    /// Announce tomorrow's workouts of the daily tracks.
    SendDaily,
    /// Announce the week starting tomorrow for the weekly tracks.
    SendWeekly,
}

impl JobKind {
    pub fn name(self) -> &'static str {
        match self {
            JobKind::PollUpdates => "updates",
            JobKind::SendDaily => "send-daily",
            JobKind::SendWeekly => "send-weekly",
        }
    }
}

impl fmt::Display for JobKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Cron schedules of every job, as configured.
pub fn schedules(cfg: &Config) -> Vec<CronSchedule> {
    vec![
        CronSchedule {
            job: JobKind::PollUpdates,
            cron: cfg.cron_updates.clone(),
        },
        CronSchedule {
            job: JobKind::SendDaily,
            cron: cfg.cron_send_daily.clone(),
        },
        CronSchedule {
            job: JobKind::SendWeekly,
            cron: cfg.cron_send_weekly.clone(),
        },
    ]
}

#[derive(Clone, Copy, Debug)]
pub struct JobChats {
    pub daily: ChatId,
    pub weekly: ChatId,
    pub errors: ChatId,
}

impl From<&Config> for JobChats {
    fn from(cfg: &Config) -> Self {
        Self {
            daily: cfg.daily_chat,
            weekly: cfg.weekly_chat,
            errors: cfg.errors_chat,
        }
    }
}

/// Runs the jobs and reports their failures to the errors chat.
pub struct BotJobs {
    poller: UpdatePoller,
    bridge: Arc<WorkoutBridge>,
    delivery: Delivery,
    chats: JobChats,
    max_len: usize,
    cursor: tokio::sync::Mutex<UpdateCursor>,
    clock: fn() -> NaiveDate,
}

fn local_today() -> NaiveDate {
    Local::now().date_naive()
}

impl BotJobs {
    pub fn new(
        poller: UpdatePoller,
        bridge: Arc<WorkoutBridge>,
        delivery: Delivery,
        chats: JobChats,
        max_len: usize,
    ) -> Self {
        Self {
            poller,
            bridge,
            delivery,
            chats,
            max_len,
            cursor: tokio::sync::Mutex::new(UpdateCursor::new()),
            clock: local_today,
        }
    }

    pub fn with_clock(mut self, clock: fn() -> NaiveDate) -> Self {
        self.clock = clock;
        self
    }

    pub async fn cursor(&self) -> UpdateCursor {
        *self.cursor.lock().await
    }

    /// One poll. Each failed command is reported on its own; the poll
    /// itself only fails when the updates could not be fetched.
    pub async fn poll_updates(&self) -> Result<()> {
        let report = {
            let mut cursor = self.cursor.lock().await;
            let report = self.poller.poll(*cursor).await?;
            *cursor = report.cursor;
            report
        };

        for failure in &report.failures {
            self.report_failure(JobKind::PollUpdates, &failure.error)
                .await;
        }
        Ok(())
    }

    pub async fn send_daily(&self) -> Result<()> {
        let tomorrow = self.tomorrow()?;
        self.bridge
            .send_all_tracks_for_date(tomorrow, self.chats.daily)
            .await
    }

    pub async fn send_weekly(&self) -> Result<()> {
        let tomorrow = self.tomorrow()?;
        self.bridge
            .send_all_tracks_for_week(tomorrow, self.chats.weekly)
            .await
    }

    fn tomorrow(&self) -> Result<NaiveDate> {
        let today = (self.clock)();
        today
            .succ_opt()
            .ok_or_else(|| Error::External(format!("no day after {today}")))
    }

    /// Send the error's message and its debug rendering to the errors chat.
    /// A failure while reporting is only logged.
    async fn report_failure(&self, job: JobKind, error: &Error) {
        let mut blocks = BlockBuilder::new(self.max_len);
        blocks.push(&escape_markdown_v2(&format!("{job} failed: {error}")));
        blocks.break_block();
        blocks.push(&escape_markdown_v2(&format!("{error:?}")));

        for text in blocks.finish() {
            if let Err(e) = self.delivery.send(self.chats.errors, &text).await {
                tracing::error!("Could not report {job} failure: {e}");
                return;
            }
        }
    }
}

#[async_trait]
impl JobRunner for BotJobs {
    async fn run(&self, job: JobKind) -> Result<()> {
        let result = match job {
            JobKind::PollUpdates => self.poll_updates().await,
            JobKind::SendDaily => self.send_daily().await,
            JobKind::SendWeekly => self.send_weekly().await,
        };
        if let Err(e) = &result {
            tracing::error!("Job {job} failed: {e}");
            self.report_failure(job, e).await;
        }
        result
    }
}

/// Publish the command menu when any known command is missing from it.
///
/// Returns whether the menu was updated.
pub async fn sync_commands(port: &dyn MessagingPort) -> Result<bool> {
    tracing::info!("Getting bot commands");
    let published = port.get_commands().await?;
    let missing = Command::all().any(|c| !published.iter().any(|p| p.command == c.name()));
    if !missing {
        return Ok(false);
    }

    tracing::info!("Setting bot commands");
    let commands = Command::all()
        .map(|c| BotCommand {
            command: c.name().to_string(),
            description: c.description().to_string(),
        })
        .collect::<Vec<_>>();
    port.set_commands(&commands).await?;
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        bridge::CLOSING_GLYPH,
        formatting::MessageComposer,
        poller::StartupPolicy,
        testing::{text_update, FakeMessenger, FakeSource, SendOutcome},
    };

    const DAILY: ChatId = ChatId(-1);
    const WEEKLY: ChatId = ChatId(-2);
    const ERRORS: ChatId = ChatId(-3);

    fn fixed_day() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 9, 7).unwrap()
    }

    fn jobs(fake: &Arc<FakeMessenger>, source: &Arc<FakeSource>) -> BotJobs {
        let delivery = Delivery::new(fake.clone());
        let bridge = Arc::new(
            WorkoutBridge::new(source.clone(), delivery.clone(), MessageComposer::new(4096))
                .with_daily_tracks(vec!["Mayhem".into()])
                .with_weekly_tracks(vec!["Open Gym".into()]),
        );
        let poller = UpdatePoller::new(
            delivery.clone(),
            bridge.clone(),
            None,
            StartupPolicy::Dispatch,
        )
        .with_clock(fixed_day);
        BotJobs::new(
            poller,
            bridge,
            delivery,
            JobChats {
                daily: DAILY,
                weekly: WEEKLY,
                errors: ERRORS,
            },
            4096,
        )
        .with_clock(fixed_day)
    }

    fn texts_to(fake: &FakeMessenger, chat: ChatId) -> Vec<String> {
        fake.sent()
            .into_iter()
            .filter(|m| m.chat_id == chat)
            .map(|m| m.text)
            .collect()
    }

    #[test]
    fn job_names_and_order() {
        assert_eq!(JobKind::SendDaily.to_string(), "send-daily");
        assert!(JobKind::PollUpdates < JobKind::SendWeekly);
    }

    #[tokio::test]
    async fn failed_command_is_reported_and_cursor_still_advances() {
        let fake = Arc::new(FakeMessenger::new());
        fake.push_updates(Some(vec![text_update(12, 5, "/today")]));
        let source = Arc::new(FakeSource {
            fail: true,
            ..Default::default()
        });
        let jobs = jobs(&fake, &source);

        jobs.run(JobKind::PollUpdates).await.unwrap();

        assert_eq!(jobs.cursor().await.offset(), 13);
        let reports = texts_to(&fake, ERRORS);
        assert_eq!(reports.len(), 2);
        assert!(reports[0].starts_with("updates failed: authentication failed"));
        assert!(reports[1].starts_with("Auth\\("));
    }

    #[tokio::test]
    async fn fetch_failure_keeps_cursor_and_reports() {
        let fake = Arc::new(FakeMessenger::new());
        fake.push_updates(None);
        let jobs = jobs(&fake, &Arc::new(FakeSource::default()));

        assert!(jobs.run(JobKind::PollUpdates).await.is_err());

        assert_eq!(jobs.cursor().await, UpdateCursor::new());
        assert!(texts_to(&fake, ERRORS)[0].contains("network failure"));
    }

    #[tokio::test]
    async fn daily_job_sends_tomorrow_to_daily_chat() {
        let fake = Arc::new(FakeMessenger::new());
        let source = Arc::new(FakeSource::default());

        jobs(&fake, &source).run(JobKind::SendDaily).await.unwrap();

        let tomorrow = NaiveDate::from_ymd_opt(2025, 9, 8).unwrap();
        assert_eq!(source.calls(), vec![(vec!["Mayhem".to_string()], tomorrow)]);
        let daily = texts_to(&fake, DAILY);
        assert_eq!(daily.last().map(String::as_str), Some(CLOSING_GLYPH));
    }

    #[tokio::test]
    async fn weekly_job_starts_tomorrow_in_weekly_chat() {
        let fake = Arc::new(FakeMessenger::new());
        let source = Arc::new(FakeSource::default());

        jobs(&fake, &source).run(JobKind::SendWeekly).await.unwrap();

        let tomorrow = NaiveDate::from_ymd_opt(2025, 9, 8).unwrap();
        assert_eq!(source.calls(), vec![(vec!["Open Gym".to_string()], tomorrow)]);
        assert_eq!(texts_to(&fake, WEEKLY), vec![CLOSING_GLYPH]);
    }

    #[tokio::test]
    async fn reporting_failure_is_swallowed() {
        let fake = Arc::new(FakeMessenger::new());
        fake.script([SendOutcome::Reject, SendOutcome::Reject]);
        let source = Arc::new(FakeSource {
            fail: true,
            ..Default::default()
        });

        let err = jobs(&fake, &source)
            .run(JobKind::SendDaily)
            .await
            .unwrap_err();

        assert!(matches!(err, Error::Auth(_)));
        assert_eq!(fake.sent().len(), 2);
    }

    #[tokio::test]
    async fn sync_publishes_commands_only_when_missing() {
        let fake = Arc::new(FakeMessenger::new());
        fake.set_published_commands(vec![BotCommand {
            command: "tracks".to_string(),
            description: "tracks".to_string(),
        }]);

        assert!(sync_commands(fake.as_ref()).await.unwrap());
        let names: Vec<_> = fake
            .published_commands()
            .into_iter()
            .map(|c| c.command)
            .collect();
        assert_eq!(names, vec!["tracks", "today", "tomorrow", "week"]);

        assert!(!sync_commands(fake.as_ref()).await.unwrap());
        assert_eq!(fake.set_commands_calls(), 1);
    }
}
