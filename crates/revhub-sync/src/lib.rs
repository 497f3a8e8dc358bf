//! Process configuration and the ingestion paths: the Hostaway bulk seed and
//! the on-demand Google Places sync.

mod config;
mod live;
mod seed;

use std::sync::Arc;

use anyhow::Result;
use revhub_adapters::{GooglePlacesClient, PlaceReviewSource};
use revhub_storage::ReviewRepository;

pub use config::{open_repository, AppConfig, StorageBackend};
pub use live::{GoogleSync, SyncReport};
pub use seed::{HostawaySeeder, SeedSummary};

pub fn google_sync_from_config(
    config: &AppConfig,
    repo: Arc<dyn ReviewRepository>,
) -> Result<GoogleSync> {
    let source = match &config.google_api_key {
        Some(key) => {
            let client =
                GooglePlacesClient::new(config.http_fetcher()?, config.google_base_url.clone(), key.clone());
            Some(Arc::new(client) as Arc<dyn PlaceReviewSource>)
        }
        None => None,
    };
    Ok(GoogleSync::new(repo, source))
}
