use std::{env, fs, path::Path, time::Duration};

use crate::{domain::ChatId, errors::Error, poller::StartupPolicy, Result};

/// Typed configuration, loaded from the environment (and `.env` when present).
#[derive(Clone, Debug)]
pub struct Config {
    // Telegram
    pub telegram_bot_token: String,
    pub daily_chat: ChatId,
    pub weekly_chat: ChatId,
    pub errors_chat: ChatId,
    pub message_max_length: usize,

    // SugarWOD account
    pub sw_username: String,
    pub sw_password: String,

    // SugarWOD endpoints
    pub sw_base_url: String,
    pub sw_login_page: String,
    pub sw_logout_page: String,
    pub sw_calendar_page: String,
    pub sw_login_api: String,
    pub sw_workouts_api: String,
    pub sw_affiliate_session_api: String,
    pub sw_http_timeout: Duration,

    // Tracks sent by the scheduled jobs
    pub daily_tracks: Vec<String>,
    pub weekly_tracks: Vec<String>,

    // Schedules
    pub cron_updates: String,
    pub cron_send_daily: String,
    pub cron_send_weekly: String,

    // Behavior
    pub startup_policy: StartupPolicy,
    pub week_send_interval: Duration,
}

impl Config {
    pub fn load() -> Result<Self> {
        load_dotenv_if_present(Path::new(".env"));

        let telegram_bot_token = required("TELEGRAM_BOT_TOKEN")?;
        let daily_chat = required_chat("TELEGRAM_CHAT_DAILY")?;
        let weekly_chat = required_chat("TELEGRAM_CHAT_WEEKLY")?;
        let errors_chat = required_chat("TELEGRAM_CHAT_ERRORS")?;
        let message_max_length = env_usize("TELEGRAM_MESSAGE_MAX_LENGTH").unwrap_or(4096);
        if message_max_length < 16 {
            return Err(Error::Config(format!(
                "TELEGRAM_MESSAGE_MAX_LENGTH is too small: {message_max_length}"
            )));
        }

        let sw_username = required("SW_USERNAME")?;
        let sw_password = required("SW_PASSWORD")?;

        let sw_base_url = env_str("SW_BASE_URL")
            .and_then(non_empty)
            .unwrap_or_else(|| "https://app.sugarwod.com".to_string());
        let sw_login_page = env_or("SW_PAGE_LOGIN", "/login");
        let sw_logout_page = env_or("SW_PAGE_LOGOUT", "/logout");
        let sw_calendar_page = env_or("SW_PAGE_CALENDAR", "/workouts/calendar");
        let sw_login_api = env_or("SW_API_LOGIN", "/public/api/v1/login");
        let sw_workouts_api = env_or("SW_API_WORKOUTS", "/api/workouts");
        let sw_affiliate_session_api = env_or(
            "SW_API_AFFILIATE_SESSION",
            "/api/affiliates/{affiliateId}/session",
        );
        let sw_http_timeout = Duration::from_secs(env_u64("SW_HTTP_TIMEOUT_SECS").unwrap_or(30));

        let daily_tracks = parse_csv(env_str("SW_TRACKS_DAILY"));
        let weekly_tracks = parse_csv(env_str("SW_TRACKS_WEEKLY"));

        let cron_updates = env_or("CRON_UPDATES", "*/10 * * * * *");
        let cron_send_daily = env_or("CRON_SEND_DAILY", "0 0 20 * * *");
        let cron_send_weekly = env_or("CRON_SEND_WEEKLY", "0 0 18 * * SUN");

        let startup_policy = match env_str("STARTUP_POLICY").and_then(non_empty) {
            Some(raw) => raw.parse::<StartupPolicy>()?,
            None => StartupPolicy::default(),
        };
        let week_send_interval =
            Duration::from_millis(env_u64("WEEK_SEND_INTERVAL_MS").unwrap_or(1000));

        Ok(Self {
            telegram_bot_token,
            daily_chat,
            weekly_chat,
            errors_chat,
            message_max_length,
            sw_username,
            sw_password,
            sw_base_url,
            sw_login_page,
            sw_logout_page,
            sw_calendar_page,
            sw_login_api,
            sw_workouts_api,
            sw_affiliate_session_api,
            sw_http_timeout,
            daily_tracks,
            weekly_tracks,
            cron_updates,
            cron_send_daily,
            cron_send_weekly,
            startup_policy,
            week_send_interval,
        })
    }
}

fn required(key: &str) -> Result<String> {
    env_str(key)
        .and_then(non_empty)
        .ok_or_else(|| Error::Config(format!("{key} environment variable is required")))
}

fn required_chat(key: &str) -> Result<ChatId> {
    let raw = required(key)?;
    raw.trim()
        .parse::<i64>()
        .map(ChatId)
        .map_err(|_| Error::Config(format!("{key} must be a numeric chat id, got {raw:?}")))
}

fn env_str(key: &str) -> Option<String> {
    env::var(key).ok()
}

fn env_or(key: &str, default: &str) -> String {
    env_str(key)
        .and_then(non_empty)
        .unwrap_or_else(|| default.to_string())
}

fn load_dotenv_if_present(path: &Path) {
    let Ok(contents) = fs::read_to_string(path) else {
        return;
    };

    for raw in contents.lines() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let Some((k, v)) = line.split_once('=') else {
            continue;
        };

        let key = k.trim();
        if key.is_empty() {
            continue;
        }
        if env::var_os(key).is_some() {
            continue; // do not override existing env
        }

        env::set_var(key, strip_quotes(v.trim()));
    }
}

fn strip_quotes(val: &str) -> &str {
    if val.len() >= 2
        && ((val.starts_with('"') && val.ends_with('"'))
            || (val.starts_with('\'') && val.ends_with('\'')))
    {
        return &val[1..val.len() - 1];
    }
    val
}

fn env_u64(key: &str) -> Option<u64> {
    env_str(key).and_then(|s| s.trim().parse::<u64>().ok())
}

fn env_usize(key: &str) -> Option<usize> {
    env_str(key).and_then(|s| s.trim().parse::<usize>().ok())
}

fn parse_csv(v: Option<String>) -> Vec<String> {
    v.unwrap_or_default()
        .split(',')
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .map(|s| s.to_string())
        .collect()
}

fn non_empty(s: String) -> Option<String> {
    if s.trim().is_empty() {
        None
    } else {
        Some(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn csv_tracks_keep_order_and_drop_blanks() {
        let tracks = parse_csv(Some(" Mayhem , ,Crossfit Open ,".to_string()));
        assert_eq!(tracks, vec!["Mayhem", "Crossfit Open"]);
        assert!(parse_csv(None).is_empty());
    }

    #[test]
    fn dotenv_values_lose_surrounding_quotes() {
        assert_eq!(strip_quotes("\"abc\""), "abc");
        assert_eq!(strip_quotes("'a b'"), "a b");
        assert_eq!(strip_quotes("\"unbalanced"), "\"unbalanced");
        assert_eq!(strip_quotes("\""), "\"");
    }
}
