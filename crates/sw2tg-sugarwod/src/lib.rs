//! SugarWOD adapter.
//!
//! Drives the SugarWOD web app the way a browser does: cookie-primed login,
//! calendar page visit, then the JSON endpoints behind it.

use std::{collections::BTreeSet, time::Duration};

use async_trait::async_trait;
use chrono::NaiveDate;
use reqwest::{header::COOKIE, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;

use sw2tg_core::{
    config::Config,
    errors::Error,
    workouts::{encode_date, DayBuckets, TrackWeek, WorkoutSource},
    Result,
};

pub mod cookies;
pub mod csrf;
mod dto;
pub mod session;

use dto::{AffiliateSessionResponse, WorkoutsResponse};
use session::Session;

const AFFILIATE_PLACEHOLDER: &str = "{affiliateId}";

/// Account and endpoint paths, relative to `base_url`.
#[derive(Clone, Debug)]
pub struct SugarWodSettings {
    pub base_url: String,
    pub username: String,
    pub password: String,
    pub login_page: String,
    pub logout_page: String,
    pub calendar_page: String,
    pub login_api: String,
    pub workouts_api: String,
    pub affiliate_session_api: String,
    pub timeout: Duration,
}

impl From<&Config> for SugarWodSettings {
    fn from(cfg: &Config) -> Self {
        Self {
            base_url: cfg.sw_base_url.clone(),
            username: cfg.sw_username.clone(),
            password: cfg.sw_password.clone(),
            login_page: cfg.sw_login_page.clone(),
            logout_page: cfg.sw_logout_page.clone(),
            calendar_page: cfg.sw_calendar_page.clone(),
            login_api: cfg.sw_login_api.clone(),
            workouts_api: cfg.sw_workouts_api.clone(),
            affiliate_session_api: cfg.sw_affiliate_session_api.clone(),
            timeout: cfg.sw_http_timeout,
        }
    }
}

#[derive(Clone, Debug)]
pub struct SugarWodClient {
    http: reqwest::Client,
    settings: SugarWodSettings,
}

pub(crate) fn network(e: reqwest::Error) -> Error {
    Error::Network(format!("sugarwod request error: {e}"))
}

impl SugarWodClient {
    pub fn new(settings: SugarWodSettings) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(settings.timeout)
            .build()
            .map_err(|e| Error::Config(format!("http client build failed: {e}")))?;
        Ok(Self { http, settings })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.settings.base_url.trim_end_matches('/'), path)
    }

    fn with_cookies(&self, req: RequestBuilder, session: &Session) -> RequestBuilder {
        match session.cookie_header() {
            Some(header) => req.header(COOKIE, header),
            None => req,
        }
    }

    /// GET with the session cookies, merging whatever the response sets.
    async fn get(
        &self,
        session: &mut Session,
        path: &str,
        query: &[(&str, &str)],
    ) -> Result<reqwest::Response> {
        let req = self.http.get(self.url(path)).query(query);
        let resp = self
            .with_cookies(req, session)
            .send()
            .await
            .map_err(network)?;
        session.jar.merge(resp.headers());

        let status = resp.status();
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(Error::Auth(format!("GET {path} rejected with {status}")));
        }
        if !status.is_success() {
            return Err(Error::Network(format!("GET {path} failed with {status}")));
        }
        Ok(resp)
    }

    pub(crate) async fn get_text(
        &self,
        session: &mut Session,
        path: &str,
        query: &[(&str, &str)],
    ) -> Result<String> {
        self.get(session, path, query)
            .await?
            .text()
            .await
            .map_err(network)
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        session: &mut Session,
        path: &str,
        query: &[(&str, &str)],
    ) -> Result<T> {
        let text = self.get_text(session, path, query).await?;
        Ok(serde_json::from_str(&text)?)
    }

    /// One track's week within an open session.
    pub async fn fetch_week(
        &self,
        session: &mut Session,
        track: &str,
        start: NaiveDate,
    ) -> Result<DayBuckets> {
        tracing::info!("Get week {track} {start}");
        let week = encode_date(start);
        let query = [("week", week.as_str()), ("track", track)];

        // The calendar visit rotates cookies the workouts endpoint expects.
        self.get_text(session, &self.settings.calendar_page, &query)
            .await?;
        let resp: WorkoutsResponse = self
            .get_json(session, &self.settings.workouts_api, &query)
            .await?;

        Ok(DayBuckets::group(resp.data.unwrap_or_default()))
    }

    /// One track's week in its own session.
    pub async fn fetch_week_for_track(&self, track: &str, start: NaiveDate) -> Result<DayBuckets> {
        let mut weeks = self
            .fetch_week_by_tracks(&[track.to_string()], start)
            .await?;
        Ok(weeks.pop().map(|w| w.days).unwrap_or_default())
    }

    async fn fetch_weeks(
        &self,
        session: &mut Session,
        tracks: &[String],
        start: NaiveDate,
    ) -> Result<Vec<TrackWeek>> {
        let mut weeks: Vec<TrackWeek> = Vec::with_capacity(tracks.len());
        for track in tracks {
            if weeks.iter().any(|w| &w.track == track) {
                continue;
            }
            let days = self.fetch_week(session, track, start).await?;
            weeks.push(TrackWeek {
                track: track.clone(),
                days,
            });
        }
        Ok(weeks)
    }

    async fn session_tracks(&self, session: &mut Session) -> Result<BTreeSet<String>> {
        let affiliate_id = session
            .affiliate_id
            .clone()
            .ok_or_else(|| Error::Auth("login response without affiliate id".to_string()))?;
        tracing::info!("Get session tracks");
        let path = self
            .settings
            .affiliate_session_api
            .replace(AFFILIATE_PLACEHOLDER, &affiliate_id);
        let resp: AffiliateSessionResponse = self.get_json(session, &path, &[]).await?;
        Ok(resp.track_keys())
    }
}

#[async_trait]
impl WorkoutSource for SugarWodClient {
    async fn fetch_week_by_tracks(
        &self,
        tracks: &[String],
        start: NaiveDate,
    ) -> Result<Vec<TrackWeek>> {
        let mut session = self.login().await?;
        let result = self.fetch_weeks(&mut session, tracks, start).await;
        self.logout(&mut session).await;
        result
    }

    async fn list_tracks(&self) -> Result<BTreeSet<String>> {
        let mut session = self.login().await?;
        let result = self.session_tracks(&mut session).await;
        self.logout(&mut session).await;
        result
    }
}
