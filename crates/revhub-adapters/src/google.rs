use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use revhub_core::rating::CANONICAL_MAX;
use revhub_core::{review_id, Channel, PublicationStatus, ReviewDraft, ReviewKind};
use revhub_storage::{FetchError, HttpFetcher};
use serde::Deserialize;
use serde_json::{Map, Value as JsonValue};
use thiserror::Error;
use tracing::debug;
use uuid::Uuid;

use crate::{checked_rating, raw_source_meta, ChannelAdapter, NormalizeError};

pub const DEFAULT_PLACES_BASE_URL: &str = "https://maps.googleapis.com/maps/api/place";

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct GooglePlaceReview {
    #[serde(default)]
    pub author_name: Option<String>,
    #[serde(default)]
    pub rating: Option<f64>,
    #[serde(default)]
    pub text: Option<String>,
    pub time: i64,
    #[serde(flatten)]
    pub extra: Map<String, JsonValue>,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct GoogleAdapter;

impl ChannelAdapter for GoogleAdapter {
    type Raw = GooglePlaceReview;

    fn normalize(
        &self,
        raw: &GooglePlaceReview,
        payload: JsonValue,
    ) -> Result<ReviewDraft, NormalizeError> {
        // already on the 0-5 scale
        let rating = checked_rating(raw.rating, CANONICAL_MAX)?;
        let submitted_at = DateTime::from_timestamp(raw.time, 0)
            .ok_or_else(|| NormalizeError::Timestamp(raw.time.to_string()))?;

        Ok(ReviewDraft {
            channel: Channel::Google,
            kind: ReviewKind::Public,
            status: PublicationStatus::Published,
            rating,
            rating_raw: rating,
            categories: None,
            title: None,
            comment: raw.text.clone().unwrap_or_default(),
            author_name: raw.author_name.clone().filter(|s| !s.trim().is_empty()),
            submitted_at,
            source_meta: raw_source_meta(payload),
        })
    }
}

pub fn google_review_id(
    listing_id: Uuid,
    author_name: Option<&str>,
    submitted_at: DateTime<Utc>,
) -> String {
    let name = format!(
        "{}:{}:{}",
        listing_id,
        author_name.unwrap_or_default(),
        submitted_at.to_rfc3339_opts(SecondsFormat::Secs, true)
    );
    review_id(
        Channel::Google,
        Uuid::new_v5(&Uuid::NAMESPACE_URL, name.as_bytes()),
    )
}

#[derive(Debug, Error)]
pub enum PlacesError {
    #[error(transparent)]
    Fetch(#[from] FetchError),
    #[error("places api returned {status}: {message}")]
    Status { status: String, message: String },
}

#[async_trait]
pub trait PlaceReviewSource: Send + Sync {
    async fn place_reviews(&self, place_id: &str) -> Result<Vec<JsonValue>, PlacesError>;
}

#[derive(Debug, Deserialize)]
struct PlaceDetailsResponse {
    status: String,
    #[serde(default)]
    result: Option<PlaceDetailsResult>,
    #[serde(default)]
    error_message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PlaceDetailsResult {
    #[serde(default)]
    reviews: Vec<JsonValue>,
}

#[derive(Clone)]
pub struct GooglePlacesClient {
    http: Arc<HttpFetcher>,
    base_url: String,
    api_key: String,
}

impl GooglePlacesClient {
    pub fn new(http: Arc<HttpFetcher>, base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
        }
    }
}

impl fmt::Debug for GooglePlacesClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GooglePlacesClient")
            .field("base_url", &self.base_url)
            .field("api_key", &"<redacted>")
            .finish()
    }
}

#[async_trait]
impl PlaceReviewSource for GooglePlacesClient {
    async fn place_reviews(&self, place_id: &str) -> Result<Vec<JsonValue>, PlacesError> {
        let url = format!("{}/details/json", self.base_url);
        let body: PlaceDetailsResponse = self
            .http
            .get_json(
                "google",
                &url,
                &[
                    ("place_id", place_id),
                    ("fields", "reviews"),
                    ("key", self.api_key.as_str()),
                ],
            )
            .await?;

        match body.status.as_str() {
            "OK" => {
                let reviews = body.result.map(|r| r.reviews).unwrap_or_default();
                debug!(count = reviews.len(), "place reviews fetched");
                Ok(reviews)
            }
            "ZERO_RESULTS" => Ok(Vec::new()),
            _ => Err(PlacesError::Status {
                message: body
                    .error_message
                    .unwrap_or_else(|| "no error message".to_string()),
                status: body.status,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::extract::Query;
    use axum::{routing::get, Json, Router};
    use revhub_storage::HttpClientConfig;
    use serde_json::json;
    use std::collections::HashMap;
    use tokio::net::TcpListener;

    async fn serve(router: Router) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        format!("http://{addr}")
    }

    fn client(base: &str, key: &str) -> GooglePlacesClient {
        let http = Arc::new(HttpFetcher::new(HttpClientConfig::default()).unwrap());
        GooglePlacesClient::new(http, base, key)
    }

    #[test]
    fn normalizes_public_review_without_rescaling() {
        let payload = json!({
            "author_name": "Alex Thompson",
            "rating": 4,
            "text": "Amazing apartment with incredible views!",
            "time": 1623715200,
            "relative_time_description": "3 years ago"
        });
        let (_, draft) = GoogleAdapter.ingest(payload.clone()).unwrap();
        assert_eq!(draft.kind, ReviewKind::Public);
        assert_eq!(draft.status, PublicationStatus::Published);
        assert_eq!(draft.rating, Some(4.0));
        assert_eq!(draft.rating_raw, Some(4.0));
        assert!(draft.categories.is_none());
        assert_eq!(draft.submitted_at.timestamp(), 1623715200);
        assert_eq!(draft.source_meta["raw"], payload);
    }

    #[test]
    fn source_meta_keeps_the_payload_untouched() {
        let payload = json!({ "rating": 5, "time": 1623715200 });
        let (_, draft) = GoogleAdapter.ingest(payload.clone()).unwrap();
        assert_eq!(draft.source_meta, json!({ "raw": payload }));
        assert!(draft.source_meta["raw"].get("author_name").is_none());
        assert!(draft.source_meta["raw"]["rating"].is_u64());
        assert_eq!(draft.author_name, None);
    }

    #[test]
    fn rejects_ratings_above_five() {
        assert!(matches!(
            GoogleAdapter.ingest(json!({ "rating": 8, "time": 1 })),
            Err(NormalizeError::Rating { .. })
        ));
    }

    #[test]
    fn review_id_is_deterministic() {
        let listing = Uuid::from_u128(7);
        let at = DateTime::from_timestamp(1623715200, 0).unwrap();
        let a = google_review_id(listing, Some("Alex"), at);
        assert_eq!(a, google_review_id(listing, Some("Alex"), at));
        assert_ne!(a, google_review_id(listing, Some("Sam"), at));
        assert!(a.starts_with("google:"));
    }

    #[tokio::test]
    async fn fetches_reviews_for_place() {
        let router = Router::new().route(
            "/details/json",
            get(|Query(params): Query<HashMap<String, String>>| async move {
                assert_eq!(params.get("key").map(String::as_str), Some("test-key"));
                assert_eq!(params.get("fields").map(String::as_str), Some("reviews"));
                Json(json!({
                    "status": "OK",
                    "result": { "reviews": [
                        { "author_name": params["place_id"], "rating": 5, "time": 1 }
                    ] }
                }))
            }),
        );
        let base = serve(router).await;
        let reviews = client(&base, "test-key").place_reviews("place-1").await.unwrap();
        assert_eq!(reviews.len(), 1);
        assert_eq!(reviews[0]["author_name"], "place-1");
    }

    #[tokio::test]
    async fn api_status_errors_are_reported() {
        let router = Router::new().route(
            "/details/json",
            get(|| async {
                Json(json!({ "status": "REQUEST_DENIED", "error_message": "The provided API key is invalid." }))
            }),
        );
        let base = serve(router).await;
        let err = client(&base, "bad").place_reviews("place-1").await.unwrap_err();
        match err {
            PlacesError::Status { status, message } => {
                assert_eq!(status, "REQUEST_DENIED");
                assert!(message.contains("invalid"));
            }
            other => panic!("unexpected error {other:?}"),
        }
    }
}
