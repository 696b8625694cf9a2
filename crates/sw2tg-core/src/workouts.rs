//! Workout model shared by the SugarWOD adapter and the message composer.

use std::collections::{BTreeMap, BTreeSet};

use async_trait::async_trait;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::Result;

/// One scheduled workout entry, as returned by the workouts listing.
///
/// Every field is optional on the wire; missing values decode to `None`.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct WorkoutItem {
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub scheduled_date_integer: Option<i64>,
    pub title: Option<String>,
    pub description: Option<String>,
    pub athletes_notes: Option<String>,
    pub media_provider: Option<String>,
    pub media_metadata: Option<serde_json::Value>,
}

impl WorkoutItem {
    pub fn scheduled_date(&self) -> Option<NaiveDate> {
        self.scheduled_date_integer.and_then(decode_date)
    }

    /// The player embed markup of a YouTube video item, if the metadata carries one.
    pub fn youtube_embed_html(&self) -> Option<&str> {
        if self.kind.as_deref() != Some("video") || self.media_provider.as_deref() != Some("youtube")
        {
            return None;
        }
        self.media_metadata
            .as_ref()?
            .get("raw")?
            .get("player")?
            .get("embedHtml")?
            .as_str()
    }
}

/// Encode a date the way the workouts service expects it (`YYYYMMDD`).
pub fn encode_date(date: NaiveDate) -> String {
    date.format("%Y%m%d").to_string()
}

/// Decode an 8-digit `YYYYMMDD` integer.
pub fn decode_date(value: i64) -> Option<NaiveDate> {
    if !(1_000_01_01..=9999_12_31).contains(&value) {
        return None;
    }
    let year = (value / 10_000) as i32;
    let month = ((value / 100) % 100) as u32;
    let day = (value % 100) as u32;
    NaiveDate::from_ymd_opt(year, month, day)
}

/// Workouts of one track grouped by calendar date.
///
/// Dates iterate in ascending order; items within a day keep server order.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct DayBuckets {
    days: BTreeMap<NaiveDate, Vec<WorkoutItem>>,
}

impl DayBuckets {
    pub fn group(items: impl IntoIterator<Item = WorkoutItem>) -> Self {
        let mut days: BTreeMap<NaiveDate, Vec<WorkoutItem>> = BTreeMap::new();
        for item in items {
            let Some(date) = item.scheduled_date() else {
                tracing::warn!(
                    "skipping workout {:?} with undecodable date {:?}",
                    item.title,
                    item.scheduled_date_integer
                );
                continue;
            };
            days.entry(date).or_default().push(item);
        }
        Self { days }
    }

    /// Items scheduled on `date`; a date without entries is an empty day.
    pub fn items_on(&self, date: NaiveDate) -> &[WorkoutItem] {
        self.days.get(&date).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn iter(&self) -> impl Iterator<Item = (NaiveDate, &[WorkoutItem])> {
        self.days.iter().map(|(d, items)| (*d, items.as_slice()))
    }

    pub fn len(&self) -> usize {
        self.days.len()
    }

    pub fn is_empty(&self) -> bool {
        self.days.is_empty()
    }
}

/// A track's week, as fetched in one session.
#[derive(Clone, Debug, PartialEq)]
pub struct TrackWeek {
    pub track: String,
    pub days: DayBuckets,
}

/// Port to the upstream workout service.
#[async_trait]
pub trait WorkoutSource: Send + Sync {
    /// Fetch the week starting at `start` for every track, within one session.
    ///
    /// Results keep the order of `tracks`; repeated keys are fetched once.
    async fn fetch_week_by_tracks(&self, tracks: &[String], start: NaiveDate)
        -> Result<Vec<TrackWeek>>;

    /// Track keys the account is subscribed to.
    async fn list_tracks(&self) -> Result<BTreeSet<String>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(date: i64, title: &str) -> WorkoutItem {
        WorkoutItem {
            scheduled_date_integer: Some(date),
            title: Some(title.to_string()),
            ..Default::default()
        }
    }

    fn ymd(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn groups_by_day_preserving_server_order() {
        let buckets = DayBuckets::group(vec![
            item(20250901, "a"),
            item(20250901, "b"),
            item(20250902, "c"),
        ]);

        assert_eq!(buckets.len(), 2);
        let first: Vec<_> = buckets
            .items_on(ymd(2025, 9, 1))
            .iter()
            .map(|i| i.title.as_deref().unwrap())
            .collect();
        assert_eq!(first, vec!["a", "b"]);
        assert_eq!(buckets.items_on(ymd(2025, 9, 2)).len(), 1);
    }

    #[test]
    fn missing_day_is_empty_not_an_error() {
        let buckets = DayBuckets::group(vec![item(20250908, "only monday")]);
        assert!(buckets.items_on(ymd(2025, 9, 7)).is_empty());
        assert_eq!(buckets.items_on(ymd(2025, 9, 8)).len(), 1);
    }

    #[test]
    fn undecodable_dates_are_skipped() {
        let buckets = DayBuckets::group(vec![item(20251341, "bad"), item(42, "tiny")]);
        assert!(buckets.is_empty());
    }

    #[test]
    fn date_codec_matches_service_format() {
        assert_eq!(encode_date(ymd(2025, 9, 7)), "20250907");
        assert_eq!(decode_date(20250907), Some(ymd(2025, 9, 7)));
        assert_eq!(decode_date(20250230), None);
    }

    #[test]
    fn deserializes_wire_item_with_nulls() {
        let raw = serde_json::json!({
            "type": "video",
            "scheduledDateInteger": 20250907,
            "title": "Fran",
            "description": null,
            "mediaProvider": "youtube",
            "mediaMetadata": {"raw": {"player": {"embedHtml": "<iframe src=\"https://y/embed/x\"></iframe>"}}}
        });
        let item: WorkoutItem = serde_json::from_value(raw).unwrap();
        assert_eq!(item.kind.as_deref(), Some("video"));
        assert_eq!(item.description, None);
        assert_eq!(item.athletes_notes, None);
        assert!(item.youtube_embed_html().unwrap().contains("src="));
    }

    #[test]
    fn embed_requires_youtube_video() {
        let mut item = WorkoutItem {
            kind: Some("video".into()),
            media_provider: Some("vimeo".into()),
            media_metadata: Some(serde_json::json!({"raw": {"player": {"embedHtml": "x"}}})),
            ..Default::default()
        };
        assert_eq!(item.youtube_embed_html(), None);
        item.media_provider = Some("youtube".into());
        assert_eq!(item.youtube_embed_html(), Some("x"));
        item.media_metadata = Some(serde_json::json!({"raw": null}));
        assert_eq!(item.youtube_embed_html(), None);
    }
}
