use std::sync::Arc;

use revhub_core::{Channel, CoreError, CoreResult, ReviewDto, ReviewQuery};
use revhub_storage::ReviewRepository;
use revhub_sync::HostawaySeeder;
use serde::Serialize;
use tracing::{debug, error};

use crate::ReviewQueryParams;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReviewListing {
    pub page: u32,
    pub page_size: u32,
    pub total: u64,
    pub items: Vec<ReviewDto>,
}

#[derive(Clone)]
pub struct ReviewQueryService {
    repo: Arc<dyn ReviewRepository>,
    seeder: Arc<HostawaySeeder>,
}

impl ReviewQueryService {
    pub fn new(repo: Arc<dyn ReviewRepository>, seeder: Arc<HostawaySeeder>) -> Self {
        Self { repo, seeder }
    }

    pub async fn hostaway_reviews(&self, params: ReviewQueryParams) -> CoreResult<ReviewListing> {
        let mut query = params.into_query()?;
        query.filter.channel = Some(Channel::Hostaway);

        self.seeder.ensure_seeded().await.map_err(|err| {
            error!(error = ?err, "hostaway seed failed");
            CoreError::Internal("hostaway seed failed".to_string())
        })?;

        self.run(query).await
    }

    pub async fn search_reviews(&self, params: ReviewQueryParams) -> CoreResult<ReviewListing> {
        self.run(params.into_query()?).await
    }

    async fn run(&self, query: ReviewQuery) -> CoreResult<ReviewListing> {
        debug!(?query, "running review query");
        let page = self.repo.search(&query).await?;
        Ok(ReviewListing {
            page: query.window.page,
            page_size: query.window.page_size,
            total: page.total,
            items: page.items.into_iter().map(ReviewDto::from).collect(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use revhub_storage::MemoryRepository;
    use std::path::Path;

    fn service() -> (Arc<MemoryRepository>, ReviewQueryService) {
        let repo = Arc::new(MemoryRepository::new());
        let fixture = Path::new(env!("CARGO_MANIFEST_DIR")).join("../../fixtures/hostaway/reviews.json");
        let seeder = Arc::new(HostawaySeeder::new(repo.clone(), fixture));
        (repo.clone(), ReviewQueryService::new(repo, seeder))
    }

    fn params(f: impl FnOnce(&mut ReviewQueryParams)) -> ReviewQueryParams {
        let mut p = ReviewQueryParams::default();
        f(&mut p);
        p
    }

    #[tokio::test]
    async fn hostaway_listing_seeds_before_querying() {
        let (repo, service) = service();
        assert_eq!(repo.search(&ReviewQuery::default()).await.unwrap().total, 0);

        let listing = service.hostaway_reviews(ReviewQueryParams::default()).await.unwrap();
        assert_eq!(listing.total, 7);
        assert_eq!(listing.items.len(), 7);
        assert_eq!(listing.page, 1);
        assert_eq!(listing.page_size, 50);
        assert!(listing
            .items
            .windows(2)
            .all(|w| w[0].submitted_at >= w[1].submitted_at));
    }

    #[tokio::test]
    async fn cross_channel_search_does_not_seed() {
        let (_, service) = service();
        let listing = service.search_reviews(ReviewQueryParams::default()).await.unwrap();
        assert_eq!(listing.total, 0);
    }

    #[tokio::test]
    async fn filters_are_conjunctive_and_total_matches_items() {
        let (repo, service) = service();
        service.hostaway_reviews(ReviewQueryParams::default()).await.unwrap();
        repo.set_approval("hostaway:7454", true).await.unwrap();
        repo.set_approval("hostaway:7456", true).await.unwrap();

        let listing = service
            .hostaway_reviews(params(|p| {
                p.approved = Some("true".into());
                p.min_rating = Some("4".into());
            }))
            .await
            .unwrap();
        assert_eq!(listing.total, 1);
        assert_eq!(listing.total as usize, listing.items.len());
        assert_eq!(listing.items[0].id, "hostaway:7454");
    }

    #[tokio::test]
    async fn pages_share_the_total() {
        let (_, service) = service();
        let first = service
            .hostaway_reviews(params(|p| p.page_size = Some("3".into())))
            .await
            .unwrap();
        let third = service
            .hostaway_reviews(params(|p| {
                p.page_size = Some("3".into());
                p.page = Some("3".into());
            }))
            .await
            .unwrap();
        assert_eq!(first.total, 7);
        assert_eq!(third.total, 7);
        assert_eq!(first.items.len(), 3);
        assert_eq!(third.items.len(), 1);
    }

    #[tokio::test]
    async fn text_search_and_date_range_compose() {
        let (_, service) = service();
        service.hostaway_reviews(ReviewQueryParams::default()).await.unwrap();

        let listing = service
            .search_reviews(params(|p| {
                p.q = Some("HEATING".into());
                p.from = Some("2021-01-01".into());
                p.to = Some("2021-12-31".into());
                p.channel = Some("hostaway".into());
            }))
            .await
            .unwrap();
        assert_eq!(listing.total, 1);
        assert_eq!(listing.items[0].id, "hostaway:7455");
        assert_eq!(listing.items[0].rating, Some(3.0));
    }

    #[tokio::test]
    async fn invalid_params_fail_before_seeding() {
        let (repo, service) = service();
        let err = service
            .hostaway_reviews(params(|p| p.page = Some("x".into())))
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::Validation(_)));
        assert_eq!(repo.search(&ReviewQuery::default()).await.unwrap().total, 0);
    }

    #[tokio::test]
    async fn seed_failure_is_internal() {
        let repo = Arc::new(MemoryRepository::new());
        let seeder = Arc::new(HostawaySeeder::new(repo.clone(), "/missing/reviews.json"));
        let service = ReviewQueryService::new(repo, seeder);
        let err = service
            .hostaway_reviews(ReviewQueryParams::default())
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::Internal(_)));
    }
}
