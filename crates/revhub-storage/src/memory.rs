use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use revhub_core::{
    Channel, Listing, NewReview, Review, ReviewFilter, ReviewPage, ReviewQuery, ReviewRow,
};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::{ReviewRepository, StorageError, UpsertOutcome};

#[derive(Debug, Default)]
struct Arena {
    listings: HashMap<Uuid, Listing>,
    listing_by_name: HashMap<String, Uuid>,
    reviews: HashMap<String, Review>,
}

impl Arena {
    fn listing_name(&self, id: Uuid) -> &str {
        self.listings
            .get(&id)
            .map(|l| l.name.as_str())
            .unwrap_or_default()
    }

    fn ensure_listing(&self, id: Uuid) -> Result<(), StorageError> {
        if self.listings.contains_key(&id) {
            Ok(())
        } else {
            Err(StorageError::NotFound {
                entity: "listing",
                id: id.to_string(),
            })
        }
    }

    fn matching<'a>(&'a self, filter: &'a ReviewFilter) -> impl Iterator<Item = &'a Review> + 'a {
        self.reviews
            .values()
            .filter(move |r| filter.matches(r, self.listing_name(r.listing_id)))
    }
}

#[derive(Debug, Clone, Default)]
pub struct MemoryRepository {
    arena: Arc<RwLock<Arena>>,
}

impl MemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ReviewRepository for MemoryRepository {
    async fn resolve_listing(&self, name: &str) -> Result<Listing, StorageError> {
        let mut arena = self.arena.write().await;
        if let Some(id) = arena.listing_by_name.get(name) {
            if let Some(listing) = arena.listings.get(id) {
                return Ok(listing.clone());
            }
        }
        let listing = Listing::named(name, Utc::now());
        arena.listing_by_name.insert(listing.name.clone(), listing.id);
        arena.listings.insert(listing.id, listing.clone());
        Ok(listing)
    }

    async fn find_listing(&self, id: Uuid) -> Result<Option<Listing>, StorageError> {
        Ok(self.arena.read().await.listings.get(&id).cloned())
    }

    async fn list_listings(&self) -> Result<Vec<Listing>, StorageError> {
        let arena = self.arena.read().await;
        let mut listings = arena.listings.values().cloned().collect::<Vec<_>>();
        listings.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(listings)
    }

    async fn add_channel_key(
        &self,
        listing_id: Uuid,
        channel: Channel,
        key: &str,
    ) -> Result<Listing, StorageError> {
        let mut arena = self.arena.write().await;
        let listing = arena
            .listings
            .get_mut(&listing_id)
            .ok_or_else(|| StorageError::NotFound {
                entity: "listing",
                id: listing_id.to_string(),
            })?;
        listing
            .channel_keys
            .insert(channel.as_str().to_string(), key.to_string());
        listing.updated_at = Utc::now();
        Ok(listing.clone())
    }

    async fn find_review(&self, id: &str) -> Result<Option<Review>, StorageError> {
        Ok(self.arena.read().await.reviews.get(id).cloned())
    }

    async fn find_review_by_fingerprint(
        &self,
        channel: Channel,
        author_name: Option<&str>,
        submitted_at: DateTime<Utc>,
    ) -> Result<Option<Review>, StorageError> {
        let arena = self.arena.read().await;
        Ok(arena
            .reviews
            .values()
            .find(|r| {
                r.channel == channel
                    && r.author_name.as_deref() == author_name
                    && r.submitted_at == submitted_at
            })
            .cloned())
    }

    async fn upsert_review(&self, new: NewReview) -> Result<UpsertOutcome, StorageError> {
        let mut arena = self.arena.write().await;
        arena.ensure_listing(new.listing_id)?;
        let now = Utc::now();
        match arena.reviews.get_mut(&new.id) {
            Some(existing) => {
                existing.overwrite(new, now);
                Ok(UpsertOutcome::Updated(existing.clone()))
            }
            None => {
                let review = Review::create(new, now);
                arena.reviews.insert(review.id.clone(), review.clone());
                Ok(UpsertOutcome::Created(review))
            }
        }
    }

    async fn insert_review(&self, new: NewReview) -> Result<Option<Review>, StorageError> {
        let mut arena = self.arena.write().await;
        arena.ensure_listing(new.listing_id)?;
        if arena.reviews.contains_key(&new.id) {
            return Ok(None);
        }
        let review = Review::create(new, Utc::now());
        arena.reviews.insert(review.id.clone(), review.clone());
        Ok(Some(review))
    }

    async fn set_approval(&self, id: &str, approved: bool) -> Result<Option<Review>, StorageError> {
        let mut arena = self.arena.write().await;
        Ok(arena.reviews.get_mut(id).map(|review| {
            review.approved = approved;
            review.updated_at = Utc::now();
            review.clone()
        }))
    }

    async fn search(&self, query: &ReviewQuery) -> Result<ReviewPage, StorageError> {
        let arena = self.arena.read().await;
        let mut matched = arena.matching(&query.filter).collect::<Vec<_>>();
        matched.sort_by(|a, b| query.sort.compare(a, b));

        let total = matched.len() as u64;
        let items = matched
            .into_iter()
            .skip(query.window.skip() as usize)
            .take(query.window.take() as usize)
            .map(|review| ReviewRow {
                listing_name: arena.listing_name(review.listing_id).to_string(),
                review: review.clone(),
            })
            .collect();
        Ok(ReviewPage { total, items })
    }

    async fn reviews_for_listing(&self, listing_id: Uuid) -> Result<Vec<Review>, StorageError> {
        let arena = self.arena.read().await;
        let mut reviews = arena
            .reviews
            .values()
            .filter(|r| r.listing_id == listing_id)
            .cloned()
            .collect::<Vec<_>>();
        reviews.sort_by(|a, b| revhub_core::ReviewSort::DateDesc.compare(a, b));
        Ok(reviews)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use revhub_core::{PageWindow, PublicationStatus, ReviewDraft, ReviewKind, ReviewSort};

    fn at(day: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, day, 9, 0, 0).single().unwrap()
    }

    fn new_review(id: &str, listing_id: Uuid, rating: Option<f64>, day: u32) -> NewReview {
        NewReview {
            id: id.to_string(),
            listing_id,
            draft: ReviewDraft {
                channel: Channel::Hostaway,
                kind: ReviewKind::HostToGuest,
                status: PublicationStatus::Published,
                rating,
                rating_raw: rating.map(|r| r * 2.0),
                categories: None,
                title: None,
                comment: format!("comment for {id}"),
                author_name: Some(format!("author {id}")),
                submitted_at: at(day),
                source_meta: serde_json::json!({ "id": id }),
            },
        }
    }

    #[tokio::test]
    async fn resolve_listing_is_idempotent_under_concurrency() {
        let repo = MemoryRepository::new();
        let mut handles = Vec::new();
        for _ in 0..16 {
            let repo = repo.clone();
            handles.push(tokio::spawn(async move {
                repo.resolve_listing("Test Loft").await.unwrap().id
            }));
        }
        let mut ids = Vec::new();
        for handle in handles {
            ids.push(handle.await.unwrap());
        }
        ids.dedup();
        assert_eq!(ids.len(), 1);
        assert_eq!(repo.list_listings().await.unwrap().len(), 1);

        let listing = repo.resolve_listing("Test Loft").await.unwrap();
        assert_eq!(listing.external_ref.as_deref(), Some("Test Loft"));
    }

    #[tokio::test]
    async fn upsert_preserves_approval_and_creation_time() {
        let repo = MemoryRepository::new();
        let listing = repo.resolve_listing("Loft").await.unwrap();

        let first = repo
            .upsert_review(new_review("hostaway:1", listing.id, Some(4.0), 1))
            .await
            .unwrap();
        assert!(first.is_created());
        assert!(!first.review().approved);

        repo.set_approval("hostaway:1", true).await.unwrap().unwrap();

        let mut changed = new_review("hostaway:1", listing.id, Some(2.0), 2);
        changed.draft.comment = "rewritten".into();
        let second = repo.upsert_review(changed).await.unwrap();
        assert!(!second.is_created());

        let stored = repo.find_review("hostaway:1").await.unwrap().unwrap();
        assert!(stored.approved);
        assert_eq!(stored.created_at, first.review().created_at);
        assert_eq!(stored.comment, "rewritten");
        assert_eq!(stored.rating, Some(2.0));
        assert!(stored.updated_at >= first.review().updated_at);
    }

    #[tokio::test]
    async fn writes_require_an_existing_listing() {
        let repo = MemoryRepository::new();
        let err = repo
            .upsert_review(new_review("hostaway:9", Uuid::new_v4(), None, 1))
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::NotFound { entity: "listing", .. }));
    }

    #[tokio::test]
    async fn insert_review_skips_existing_ids() {
        let repo = MemoryRepository::new();
        let listing = repo.resolve_listing("Loft").await.unwrap();
        assert!(repo
            .insert_review(new_review("google:a", listing.id, Some(5.0), 1))
            .await
            .unwrap()
            .is_some());
        assert!(repo
            .insert_review(new_review("google:a", listing.id, Some(5.0), 1))
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn search_counts_before_paging() {
        let repo = MemoryRepository::new();
        let listing = repo.resolve_listing("Loft").await.unwrap();
        for day in 1..=5 {
            repo.upsert_review(new_review(&format!("hostaway:{day}"), listing.id, Some(day as f64), day))
                .await
                .unwrap();
        }

        let page = repo
            .search(&ReviewQuery {
                filter: ReviewFilter {
                    min_rating: Some(2.0),
                    ..Default::default()
                },
                sort: ReviewSort::DateDesc,
                window: PageWindow::new(Some(2), Some(2)),
            })
            .await
            .unwrap();

        assert_eq!(page.total, 4);
        let ids: Vec<_> = page.items.iter().map(|r| r.review.id.as_str()).collect();
        assert_eq!(ids, ["hostaway:3", "hostaway:2"]);
        assert!(page.items.iter().all(|r| r.listing_name == "Loft"));
    }

    #[tokio::test]
    async fn fingerprint_lookup_matches_author_time_and_channel() {
        let repo = MemoryRepository::new();
        let listing = repo.resolve_listing("Loft").await.unwrap();
        repo.upsert_review(new_review("hostaway:1", listing.id, None, 3))
            .await
            .unwrap();

        let hit = repo
            .find_review_by_fingerprint(Channel::Hostaway, Some("author hostaway:1"), at(3))
            .await
            .unwrap();
        assert!(hit.is_some());
        let miss = repo
            .find_review_by_fingerprint(Channel::Google, Some("author hostaway:1"), at(3))
            .await
            .unwrap();
        assert!(miss.is_none());
    }

    #[tokio::test]
    async fn channel_keys_accumulate() {
        let repo = MemoryRepository::new();
        let listing = repo.resolve_listing("Loft").await.unwrap();
        let updated = repo
            .add_channel_key(listing.id, Channel::Google, "place-123")
            .await
            .unwrap();
        assert_eq!(updated.channel_keys.get("google").map(String::as_str), Some("place-123"));
        assert!(repo
            .add_channel_key(Uuid::new_v4(), Channel::Google, "x")
            .await
            .is_err());
    }
}
