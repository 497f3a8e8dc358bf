use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use revhub_adapters::{load_hostaway_export, ChannelAdapter, HostawayAdapter};
use revhub_core::NewReview;
use revhub_storage::ReviewRepository;
use serde::Serialize;
use serde_json::Value as JsonValue;
use tokio::sync::OnceCell;
use tracing::{debug, info, instrument, warn};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SeedSummary {
    pub processed: usize,
    pub created: usize,
    pub updated: usize,
    pub failed: usize,
}

pub struct HostawaySeeder {
    repo: Arc<dyn ReviewRepository>,
    source_path: PathBuf,
    seeded: OnceCell<SeedSummary>,
}

impl HostawaySeeder {
    pub fn new(repo: Arc<dyn ReviewRepository>, source_path: impl Into<PathBuf>) -> Self {
        Self {
            repo,
            source_path: source_path.into(),
            seeded: OnceCell::new(),
        }
    }

    /// Seeds at most once per process. Concurrent callers wait for the same
    /// run; a failed run leaves the gate open for the next caller.
    pub async fn ensure_seeded(&self) -> Result<SeedSummary> {
        self.seeded.get_or_try_init(|| self.run()).await.copied()
    }

    #[instrument(skip(self), fields(path = %self.source_path.display()))]
    pub async fn run(&self) -> Result<SeedSummary> {
        let export = load_hostaway_export(&self.source_path)?;
        if export.result.is_empty() {
            info!("hostaway export has no items");
        }

        let mut summary = SeedSummary::default();
        for value in export.result {
            summary.processed += 1;
            match self.ingest(value).await? {
                Some(true) => summary.created += 1,
                Some(false) => summary.updated += 1,
                None => summary.failed += 1,
            }
        }

        info!(
            processed = summary.processed,
            created = summary.created,
            updated = summary.updated,
            failed = summary.failed,
            "hostaway seed finished"
        );
        Ok(summary)
    }

    async fn ingest(&self, value: JsonValue) -> Result<Option<bool>> {
        let adapter = HostawayAdapter;
        let raw = match adapter.decode(&value) {
            Ok(raw) => raw,
            Err(err) => {
                warn!(error = %err, "skipping undecodable hostaway item");
                return Ok(None);
            }
        };
        let draft = match adapter.normalize(&raw, value) {
            Ok(draft) => draft,
            Err(err) => {
                warn!(id = %raw.id, error = %err, "skipping hostaway item");
                return Ok(None);
            }
        };

        let listing = self
            .repo
            .resolve_listing(raw.listing_name())
            .await
            .with_context(|| format!("resolving listing `{}`", raw.listing_name()))?;
        let outcome = self
            .repo
            .upsert_review(NewReview {
                id: raw.review_id(),
                listing_id: listing.id,
                draft,
            })
            .await
            .with_context(|| format!("upserting {}", raw.review_id()))?;
        debug!(
            id = %outcome.review().id,
            approved = outcome.review().approved,
            created = outcome.is_created(),
            "hostaway review stored"
        );
        Ok(Some(outcome.is_created()))
    }
}
