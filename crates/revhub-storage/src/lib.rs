//! Review persistence behind one repository interface, plus the HTTP fetch utility
//! used by live channel adapters.

mod http;
mod memory;
mod postgres;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use revhub_core::{
    Channel, CoreError, Listing, NewReview, Review, ReviewPage, ReviewQuery,
};
use thiserror::Error;
use uuid::Uuid;

pub use http::{FetchError, HttpClientConfig, HttpFetcher};
pub use memory::MemoryRepository;
pub use postgres::{PgRepository, MIGRATOR};

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: String },
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("stored value is invalid: {0}")]
    Corrupt(String),
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("migration error: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),
}

impl From<StorageError> for CoreError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::NotFound { entity, id } => CoreError::NotFound { entity, id },
            StorageError::Conflict(msg) => CoreError::IntegrityConflict(msg),
            other => CoreError::Internal(other.to_string()),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum UpsertOutcome {
    Created(Review),
    Updated(Review),
}

impl UpsertOutcome {
    pub fn is_created(&self) -> bool {
        matches!(self, UpsertOutcome::Created(_))
    }

    pub fn review(&self) -> &Review {
        match self {
            UpsertOutcome::Created(r) | UpsertOutcome::Updated(r) => r,
        }
    }
}

/// `resolve_listing` and `upsert_review` are atomic per name or id, and
/// `search` takes its count and page from one snapshot.
#[async_trait]
pub trait ReviewRepository: Send + Sync {
    async fn resolve_listing(&self, name: &str) -> Result<Listing, StorageError>;

    async fn find_listing(&self, id: Uuid) -> Result<Option<Listing>, StorageError>;

    async fn list_listings(&self) -> Result<Vec<Listing>, StorageError>;

    async fn add_channel_key(
        &self,
        listing_id: Uuid,
        channel: Channel,
        key: &str,
    ) -> Result<Listing, StorageError>;

    async fn find_review(&self, id: &str) -> Result<Option<Review>, StorageError>;

    async fn find_review_by_fingerprint(
        &self,
        channel: Channel,
        author_name: Option<&str>,
        submitted_at: DateTime<Utc>,
    ) -> Result<Option<Review>, StorageError>;

    async fn upsert_review(&self, new: NewReview) -> Result<UpsertOutcome, StorageError>;

    async fn insert_review(&self, new: NewReview) -> Result<Option<Review>, StorageError>;

    async fn set_approval(&self, id: &str, approved: bool) -> Result<Option<Review>, StorageError>;

    async fn search(&self, query: &ReviewQuery) -> Result<ReviewPage, StorageError>;

    async fn reviews_for_listing(&self, listing_id: Uuid) -> Result<Vec<Review>, StorageError>;
}
