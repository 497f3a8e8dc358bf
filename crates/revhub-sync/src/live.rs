use std::sync::Arc;

use revhub_adapters::{google_review_id, ChannelAdapter, GoogleAdapter, PlaceReviewSource};
use revhub_core::{Channel, CoreError, NewReview, ReviewDto};
use revhub_storage::ReviewRepository;
use serde::Serialize;
use tracing::{info, instrument, warn};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SyncReport {
    pub ok: bool,
    pub message: String,
    pub reviews: Vec<ReviewDto>,
}

impl SyncReport {
    fn failed(message: impl Into<String>) -> Self {
        Self {
            ok: false,
            message: message.into(),
            reviews: Vec::new(),
        }
    }
}

pub struct GoogleSync {
    repo: Arc<dyn ReviewRepository>,
    source: Option<Arc<dyn PlaceReviewSource>>,
}

impl GoogleSync {
    pub fn new(repo: Arc<dyn ReviewRepository>, source: Option<Arc<dyn PlaceReviewSource>>) -> Self {
        Self { repo, source }
    }

    pub fn is_configured(&self) -> bool {
        self.source.is_some()
    }

    #[instrument(skip(self))]
    pub async fn sync(&self, listing_id: Uuid, place_id: &str) -> Result<SyncReport, CoreError> {
        let source = self
            .source
            .as_ref()
            .ok_or_else(|| CoreError::validation("Google Places API key is not configured"))?;
        let place_id = place_id.trim();
        if place_id.is_empty() {
            return Err(CoreError::validation("placeId is required"));
        }
        let listing = self
            .repo
            .find_listing(listing_id)
            .await?
            .ok_or_else(|| CoreError::not_found("listing", listing_id.to_string()))?;

        let raw_reviews = match source.place_reviews(place_id).await {
            Ok(reviews) => reviews,
            Err(err) => {
                warn!(error = %err, "google places fetch failed");
                return Ok(SyncReport::failed(format!(
                    "Failed to fetch Google reviews: {err}"
                )));
            }
        };

        let adapter = GoogleAdapter;
        let fetched = raw_reviews.len();
        let mut created = Vec::new();
        let mut skipped = 0usize;
        for value in raw_reviews {
            let draft = match adapter.ingest(value) {
                Ok((_, draft)) => draft,
                Err(err) => {
                    warn!(error = %err, "skipping google review");
                    skipped += 1;
                    continue;
                }
            };

            let existing = self
                .repo
                .find_review_by_fingerprint(
                    Channel::Google,
                    draft.author_name.as_deref(),
                    draft.submitted_at,
                )
                .await?;
            if existing.is_some() {
                skipped += 1;
                continue;
            }

            let id = google_review_id(listing.id, draft.author_name.as_deref(), draft.submitted_at);
            match self
                .repo
                .insert_review(NewReview {
                    id,
                    listing_id: listing.id,
                    draft,
                })
                .await?
            {
                Some(review) => created.push(ReviewDto::from_review(&review, &listing.name)),
                None => skipped += 1,
            }
        }

        self.repo
            .add_channel_key(listing.id, Channel::Google, place_id)
            .await?;

        info!(fetched, created = created.len(), skipped, "google sync finished");
        Ok(SyncReport {
            ok: true,
            message: format!(
                "Synced {} new Google reviews ({} fetched, {} skipped)",
                created.len(),
                fetched,
                skipped
            ),
            reviews: created,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use revhub_adapters::PlacesError;
    use revhub_core::ReviewQuery;
    use revhub_storage::{FetchError, MemoryRepository};
    use serde_json::{json, Value as JsonValue};
    use std::time::Duration;

    struct FixedPlace(Vec<JsonValue>);

    #[async_trait]
    impl PlaceReviewSource for FixedPlace {
        async fn place_reviews(&self, _place_id: &str) -> Result<Vec<JsonValue>, PlacesError> {
            Ok(self.0.clone())
        }
    }

    struct DownPlace;

    #[async_trait]
    impl PlaceReviewSource for DownPlace {
        async fn place_reviews(&self, _place_id: &str) -> Result<Vec<JsonValue>, PlacesError> {
            Err(PlacesError::Fetch(FetchError::Timeout(Duration::from_secs(10))))
        }
    }

    fn place_reviews() -> Vec<JsonValue> {
        vec![
            json!({ "author_name": "Alex Thompson", "rating": 5, "text": "Amazing views", "time": 1623715200 }),
            json!({ "author_name": "Emma Davis", "rating": 3, "text": "Some maintenance issues", "time": 1630800000 }),
            json!({ "author_name": "Broken", "rating": 9, "time": 1630800000 }),
        ]
    }

    async fn setup(source: Option<Arc<dyn PlaceReviewSource>>) -> (Arc<MemoryRepository>, GoogleSync, Uuid) {
        let repo = Arc::new(MemoryRepository::new());
        let listing = repo.resolve_listing("2B N1 A - 29 Shoreditch Heights").await.unwrap();
        let sync = GoogleSync::new(repo.clone(), source);
        (repo, sync, listing.id)
    }

    #[tokio::test]
    async fn inserts_new_reviews_and_records_place_id() {
        let (repo, sync, listing_id) = setup(Some(Arc::new(FixedPlace(place_reviews())))).await;
        let report = sync.sync(listing_id, "place-1").await.unwrap();
        assert!(report.ok);
        assert_eq!(report.reviews.len(), 2);
        assert!(report.reviews.iter().all(|r| r.channel == Channel::Google && !r.approved));
        assert!(report.reviews.iter().all(|r| r.id.starts_with("google:")));

        let listing = repo.find_listing(listing_id).await.unwrap().unwrap();
        assert_eq!(listing.channel_keys.get("google").map(String::as_str), Some("place-1"));
    }

    #[tokio::test]
    async fn second_sync_finds_nothing_new() {
        let (repo, sync, listing_id) = setup(Some(Arc::new(FixedPlace(place_reviews())))).await;
        sync.sync(listing_id, "place-1").await.unwrap();
        let again = sync.sync(listing_id, "place-1").await.unwrap();
        assert!(again.ok);
        assert!(again.reviews.is_empty());
        let total = repo.search(&ReviewQuery::default()).await.unwrap().total;
        assert_eq!(total, 2);
    }

    #[tokio::test]
    async fn upstream_failure_is_reported_not_raised() {
        let (repo, sync, listing_id) = setup(Some(Arc::new(DownPlace))).await;
        let report = sync.sync(listing_id, "place-1").await.unwrap();
        assert!(!report.ok);
        assert!(report.message.contains("timed out"));
        assert!(report.reviews.is_empty());
        let listing = repo.find_listing(listing_id).await.unwrap().unwrap();
        assert!(listing.channel_keys.is_empty());
    }

    #[tokio::test]
    async fn missing_credential_or_params_are_validation_errors() {
        let (_, sync, listing_id) = setup(None).await;
        assert!(!sync.is_configured());
        assert!(matches!(
            sync.sync(listing_id, "place-1").await,
            Err(CoreError::Validation(_))
        ));

        let (_, sync, listing_id) = setup(Some(Arc::new(FixedPlace(Vec::new())))).await;
        assert!(matches!(
            sync.sync(listing_id, "  ").await,
            Err(CoreError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn unknown_listing_is_not_found() {
        let (_, sync, _) = setup(Some(Arc::new(FixedPlace(place_reviews())))).await;
        assert!(matches!(
            sync.sync(Uuid::new_v4(), "place-1").await,
            Err(CoreError::NotFound { entity: "listing", .. })
        ));
    }
}
