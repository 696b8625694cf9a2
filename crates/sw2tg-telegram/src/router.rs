use std::sync::Arc;

use teloxide::prelude::*;

use sw2tg_core::{
    bridge::WorkoutBridge,
    config::Config,
    formatting::MessageComposer,
    jobs::{schedules, sync_commands, BotJobs, JobChats},
    messaging::{delivery::Delivery, port::MessagingPort},
    poller::UpdatePoller,
    scheduler::CronScheduler,
    workouts::WorkoutSource,
};
use sw2tg_sugarwod::{SugarWodClient, SugarWodSettings};

use crate::TelegramMessenger;

/// Wire the adapters together, start the jobs and run until Ctrl-C.
pub async fn run(cfg: Arc<Config>) -> anyhow::Result<()> {
    let bot = Bot::new(cfg.telegram_bot_token.clone());
    let messenger: Arc<dyn MessagingPort> = Arc::new(
        TelegramMessenger::new(bot).with_max_message_len(cfg.message_max_length),
    );

    let bot_username = match messenger.bot_username().await {
        Ok(username) => {
            tracing::info!("sw2tg started: @{username}");
            Some(username)
        }
        Err(e) => {
            tracing::warn!("Could not read bot username, mentions stay unstripped: {e}");
            None
        }
    };
    tracing::info!(
        "Daily tracks: {:?}, weekly tracks: {:?}",
        cfg.daily_tracks,
        cfg.weekly_tracks
    );

    let source: Arc<dyn WorkoutSource> =
        Arc::new(SugarWodClient::new(SugarWodSettings::from(cfg.as_ref()))?);
    let delivery = Delivery::new(messenger.clone());
    let composer = MessageComposer::new(messenger.capabilities().max_message_len);

    let bridge = Arc::new(
        WorkoutBridge::new(source, delivery.clone(), composer)
            .with_daily_tracks(cfg.daily_tracks.clone())
            .with_weekly_tracks(cfg.weekly_tracks.clone())
            .with_week_interval(cfg.week_send_interval),
    );
    let poller = UpdatePoller::new(
        delivery.clone(),
        bridge.clone(),
        bot_username,
        cfg.startup_policy,
    );
    let jobs = Arc::new(BotJobs::new(
        poller,
        bridge,
        delivery,
        JobChats::from(cfg.as_ref()),
        composer.max_len(),
    ));

    if let Err(e) = sync_commands(messenger.as_ref()).await {
        tracing::error!("Error on commands retrieval / update: {e}");
    }

    let scheduler = CronScheduler::new(jobs);
    scheduler.start(schedules(&cfg)).await?;
    for (job, next) in scheduler.next_runs().await {
        match next {
            Some(at) => tracing::info!("Job {job} next run at {at}"),
            None => tracing::warn!("Job {job} will never run"),
        }
    }

    tokio::signal::ctrl_c().await?;
    tracing::info!("Shutting down");
    scheduler.stop().await;

    Ok(())
}
