//! Wire shapes of the SugarWOD endpoints. Every node may be missing or null.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use sw2tg_core::workouts::WorkoutItem;

#[derive(Debug, Serialize)]
pub(crate) struct LoginRequest<'a> {
    pub username: &'a str,
    pub password: &'a str,
    #[serde(rename = "_method")]
    pub method: &'static str,
    #[serde(rename = "_csrf", skip_serializing_if = "Option::is_none")]
    pub csrf: Option<&'a str>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub(crate) struct LoginResponse {
    pub data: Option<LoginData>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub(crate) struct LoginData {
    pub session_token: Option<String>,
    pub object_id: Option<String>,
    pub affiliate: Option<ObjectRef>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub(crate) struct ObjectRef {
    pub object_id: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub(crate) struct WorkoutsResponse {
    pub data: Option<Vec<WorkoutItem>>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub(crate) struct AffiliateSessionResponse {
    data: Option<AffiliateSessionData>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct AffiliateSessionData {
    athlete: Option<Athlete>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct Athlete {
    subscriptions: Option<Vec<Option<Subscription>>>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct Subscription {
    marketplace_product: Option<MarketplaceProduct>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct MarketplaceProduct {
    publishing_tracks: Option<Vec<Option<PublishingTrack>>>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct PublishingTrack {
    key: Option<String>,
}

impl AffiliateSessionResponse {
    /// Every publishing track key of every subscribed product.
    pub fn track_keys(self) -> BTreeSet<String> {
        self.data
            .and_then(|d| d.athlete)
            .and_then(|a| a.subscriptions)
            .into_iter()
            .flatten()
            .flatten()
            .filter_map(|s| s.marketplace_product)
            .filter_map(|p| p.publishing_tracks)
            .flatten()
            .flatten()
            .filter_map(|t| t.key)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn login_body_skips_missing_csrf() {
        let body = serde_json::to_value(LoginRequest {
            username: "u",
            password: "p",
            method: "post",
            csrf: None,
        })
        .unwrap();
        assert_eq!(
            body,
            serde_json::json!({"username": "u", "password": "p", "_method": "post"})
        );
    }

    #[test]
    fn track_keys_skip_null_nodes() {
        let raw = serde_json::json!({
            "data": {"athlete": {"subscriptions": [
                null,
                {"marketplaceProduct": null},
                {"marketplaceProduct": {"publishingTracks": null}},
                {"marketplaceProduct": {"publishingTracks": [
                    {"key": "Mayhem Compete"}, null, {"key": null}, {"key": "Open Gym"}
                ]}},
                {"marketplaceProduct": {"publishingTracks": [{"key": "Mayhem Compete"}]}}
            ]}}
        });
        let resp: AffiliateSessionResponse = serde_json::from_value(raw).unwrap();
        let keys: Vec<_> = resp.track_keys().into_iter().collect();
        assert_eq!(keys, vec!["Mayhem Compete", "Open Gym"]);
    }

    #[test]
    fn empty_session_has_no_tracks() {
        let resp: AffiliateSessionResponse =
            serde_json::from_value(serde_json::json!({"data": null})).unwrap();
        assert!(resp.track_keys().is_empty());
    }

    #[test]
    fn login_response_reads_affiliate() {
        let resp: LoginResponse = serde_json::from_value(serde_json::json!({
            "data": {"sessionToken": "r:abc", "objectId": "u1", "affiliate": {"objectId": "aff1"}}
        }))
        .unwrap();
        let data = resp.data.unwrap();
        assert_eq!(data.session_token.as_deref(), Some("r:abc"));
        assert_eq!(data.object_id.as_deref(), Some("u1"));
        assert_eq!(data.affiliate.and_then(|a| a.object_id).as_deref(), Some("aff1"));
    }
}
