use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use revhub_core::{
    CategoryRatings, Channel, Listing, NewReview, Review, ReviewFilter, ReviewPage, ReviewQuery,
    ReviewRow, ReviewSort,
};
use serde_json::Value as JsonValue;
use sqlx::migrate::Migrator;
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::types::Json;
use sqlx::{PgPool, Postgres, QueryBuilder, Row};
use tracing::{debug, instrument};
use uuid::Uuid;

use crate::{ReviewRepository, StorageError, UpsertOutcome};

pub static MIGRATOR: Migrator = sqlx::migrate!("../../migrations");

const LISTING_COLUMNS: &str = "id, name, external_ref, channel_keys, created_at, updated_at";

const REVIEW_COLUMNS: &str = "r.id, r.listing_id, r.channel, r.kind, r.status, r.rating, \
    r.rating_raw, r.categories, r.title, r.comment, r.author_name, r.submitted_at, r.approved, \
    r.source_meta, r.created_at, r.updated_at";

#[derive(Debug, Clone)]
pub struct PgRepository {
    pool: PgPool,
}

impl PgRepository {
    // never put the DSN in a span: it may carry credentials
    #[instrument(skip(database_url))]
    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self, StorageError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections.max(1))
            .acquire_timeout(Duration::from_secs(5))
            .connect(database_url)
            .await?;
        Ok(Self { pool })
    }

    pub async fn migrate(&self) -> Result<(), StorageError> {
        MIGRATOR.run(&self.pool).await?;
        Ok(())
    }

    async fn find_listing_by_name(&self, name: &str) -> Result<Option<Listing>, StorageError> {
        let row = sqlx::query(&format!("SELECT {LISTING_COLUMNS} FROM listings WHERE name = $1"))
            .bind(name)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(listing_from_row).transpose()
    }
}

#[async_trait]
impl ReviewRepository for PgRepository {
    async fn resolve_listing(&self, name: &str) -> Result<Listing, StorageError> {
        // create-then-refetch: a concurrent insert of the same name loses on
        // the unique constraint and reads the winner's row instead
        for attempt in 0..2 {
            if let Some(listing) = self.find_listing_by_name(name).await? {
                return Ok(listing);
            }
            let inserted = sqlx::query(&format!(
                "INSERT INTO listings (id, name, external_ref, channel_keys, created_at, updated_at) \
                 VALUES ($1, $2, $2, '{{}}'::jsonb, NOW(), NOW()) \
                 ON CONFLICT (name) DO NOTHING \
                 RETURNING {LISTING_COLUMNS}"
            ))
            .bind(Uuid::new_v4())
            .bind(name)
            .fetch_optional(&self.pool)
            .await?;
            if let Some(row) = inserted {
                return listing_from_row(&row);
            }
            debug!(attempt, "listing insert lost a race, refetching");
        }
        Err(StorageError::Conflict(format!("listing `{name}` could not be resolved")))
    }

    async fn find_listing(&self, id: Uuid) -> Result<Option<Listing>, StorageError> {
        let row = sqlx::query(&format!("SELECT {LISTING_COLUMNS} FROM listings WHERE id = $1"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(listing_from_row).transpose()
    }

    async fn list_listings(&self) -> Result<Vec<Listing>, StorageError> {
        let rows = sqlx::query(&format!("SELECT {LISTING_COLUMNS} FROM listings ORDER BY name"))
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(listing_from_row).collect()
    }

    async fn add_channel_key(
        &self,
        listing_id: Uuid,
        channel: Channel,
        key: &str,
    ) -> Result<Listing, StorageError> {
        let row = sqlx::query(&format!(
            "UPDATE listings \
                SET channel_keys = COALESCE(channel_keys, '{{}}'::jsonb) || jsonb_build_object($2::text, $3::text), \
                    updated_at = NOW() \
              WHERE id = $1 \
             RETURNING {LISTING_COLUMNS}"
        ))
        .bind(listing_id)
        .bind(channel.as_str())
        .bind(key)
        .fetch_optional(&self.pool)
        .await?;
        match row {
            Some(row) => listing_from_row(&row),
            None => Err(StorageError::NotFound {
                entity: "listing",
                id: listing_id.to_string(),
            }),
        }
    }

    async fn find_review(&self, id: &str) -> Result<Option<Review>, StorageError> {
        let row = sqlx::query(&format!("SELECT {REVIEW_COLUMNS} FROM reviews r WHERE r.id = $1"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(review_from_row).transpose()
    }

    async fn find_review_by_fingerprint(
        &self,
        channel: Channel,
        author_name: Option<&str>,
        submitted_at: DateTime<Utc>,
    ) -> Result<Option<Review>, StorageError> {
        let row = sqlx::query(&format!(
            "SELECT {REVIEW_COLUMNS} FROM reviews r \
              WHERE r.channel = $1 \
                AND r.author_name IS NOT DISTINCT FROM $2 \
                AND r.submitted_at = $3 \
              LIMIT 1"
        ))
        .bind(channel.as_str())
        .bind(author_name)
        .bind(submitted_at)
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(review_from_row).transpose()
    }

    async fn upsert_review(&self, new: NewReview) -> Result<UpsertOutcome, StorageError> {
        // approved and created_at stay out of the update list
        let sql = format!(
            "INSERT INTO reviews AS r (id, listing_id, channel, kind, status, rating, rating_raw, \
                 categories, title, comment, author_name, submitted_at, approved, source_meta, \
                 created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, FALSE, $13, NOW(), NOW()) \
             ON CONFLICT (id) DO UPDATE SET \
                 listing_id = EXCLUDED.listing_id, \
                 channel = EXCLUDED.channel, \
                 kind = EXCLUDED.kind, \
                 status = EXCLUDED.status, \
                 rating = EXCLUDED.rating, \
                 rating_raw = EXCLUDED.rating_raw, \
                 categories = EXCLUDED.categories, \
                 title = EXCLUDED.title, \
                 comment = EXCLUDED.comment, \
                 author_name = EXCLUDED.author_name, \
                 submitted_at = EXCLUDED.submitted_at, \
                 source_meta = EXCLUDED.source_meta, \
                 updated_at = NOW() \
             RETURNING {REVIEW_COLUMNS}, (r.xmax = 0) AS inserted"
        );
        let row = bind_review(sqlx::query(&sql), &new)
            .fetch_one(&self.pool)
            .await
            .map_err(|err| classify(err, new.listing_id))?;
        let inserted: bool = row.try_get("inserted")?;
        let review = review_from_row(&row)?;
        Ok(if inserted {
            UpsertOutcome::Created(review)
        } else {
            UpsertOutcome::Updated(review)
        })
    }

    async fn insert_review(&self, new: NewReview) -> Result<Option<Review>, StorageError> {
        let sql = format!(
            "INSERT INTO reviews AS r (id, listing_id, channel, kind, status, rating, rating_raw, \
                 categories, title, comment, author_name, submitted_at, approved, source_meta, \
                 created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, FALSE, $13, NOW(), NOW()) \
             ON CONFLICT (id) DO NOTHING \
             RETURNING {REVIEW_COLUMNS}"
        );
        let row = bind_review(sqlx::query(&sql), &new)
            .fetch_optional(&self.pool)
            .await
            .map_err(|err| classify(err, new.listing_id))?;
        row.as_ref().map(review_from_row).transpose()
    }

    async fn set_approval(&self, id: &str, approved: bool) -> Result<Option<Review>, StorageError> {
        let row = sqlx::query(&format!(
            "UPDATE reviews AS r SET approved = $2, updated_at = NOW() WHERE r.id = $1 \
             RETURNING {REVIEW_COLUMNS}"
        ))
        .bind(id)
        .bind(approved)
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(review_from_row).transpose()
    }

    async fn search(&self, query: &ReviewQuery) -> Result<ReviewPage, StorageError> {
        let mut tx = self.pool.begin().await?;
        // count and page must observe the same snapshot
        sqlx::query("SET TRANSACTION ISOLATION LEVEL REPEATABLE READ, READ ONLY")
            .execute(&mut *tx)
            .await?;

        let mut count_qb: QueryBuilder<'_, Postgres> = QueryBuilder::new(
            "SELECT COUNT(*) FROM reviews r JOIN listings l ON l.id = r.listing_id WHERE TRUE",
        );
        push_filters(&mut count_qb, &query.filter);
        let total: i64 = count_qb.build_query_scalar().fetch_one(&mut *tx).await?;

        let mut page_qb: QueryBuilder<'_, Postgres> = QueryBuilder::new(format!(
            "SELECT {REVIEW_COLUMNS}, l.name AS listing_name \
               FROM reviews r JOIN listings l ON l.id = r.listing_id WHERE TRUE"
        ));
        push_filters(&mut page_qb, &query.filter);
        page_qb.push(" ORDER BY ").push(order_by(query.sort));
        page_qb
            .push(" LIMIT ")
            .push_bind(query.window.take() as i64)
            .push(" OFFSET ")
            .push_bind(query.window.skip() as i64);
        debug!(sql = page_qb.sql(), "review search");
        let rows = page_qb.build().fetch_all(&mut *tx).await?;
        tx.commit().await?;

        let items = rows
            .iter()
            .map(|row| {
                Ok(ReviewRow {
                    review: review_from_row(row)?,
                    listing_name: row.try_get("listing_name")?,
                })
            })
            .collect::<Result<Vec<_>, StorageError>>()?;
        Ok(ReviewPage {
            total: total.max(0) as u64,
            items,
        })
    }

    async fn reviews_for_listing(&self, listing_id: Uuid) -> Result<Vec<Review>, StorageError> {
        let rows = sqlx::query(&format!(
            "SELECT {REVIEW_COLUMNS} FROM reviews r WHERE r.listing_id = $1 \
             ORDER BY {}",
            order_by(ReviewSort::DateDesc)
        ))
        .bind(listing_id)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(review_from_row).collect()
    }
}

fn bind_review<'q>(
    query: sqlx::query::Query<'q, Postgres, sqlx::postgres::PgArguments>,
    new: &'q NewReview,
) -> sqlx::query::Query<'q, Postgres, sqlx::postgres::PgArguments> {
    let draft = &new.draft;
    query
        .bind(&new.id)
        .bind(new.listing_id)
        .bind(draft.channel.as_str())
        .bind(draft.kind.as_str())
        .bind(draft.status.as_str())
        .bind(draft.rating)
        .bind(draft.rating_raw)
        .bind(draft.categories.as_ref().map(Json))
        .bind(draft.title.as_deref())
        .bind(&draft.comment)
        .bind(draft.author_name.as_deref())
        .bind(draft.submitted_at)
        .bind(&draft.source_meta)
}

fn push_filters(qb: &mut QueryBuilder<'_, Postgres>, filter: &ReviewFilter) {
    if let Some(name) = &filter.listing_name {
        qb.push(" AND l.name = ").push_bind(name.clone());
    }
    if let Some(listing_id) = filter.listing_id {
        qb.push(" AND r.listing_id = ").push_bind(listing_id);
    }
    if let Some(channel) = filter.channel {
        qb.push(" AND r.channel = ").push_bind(channel.as_str());
    }
    if let Some(approved) = filter.approved {
        qb.push(" AND r.approved = ").push_bind(approved);
    }
    if let Some(search) = &filter.search {
        qb.push(" AND r.comment ILIKE ")
            .push_bind(like_pattern(search))
            .push(" ESCAPE '\\'");
    }
    if let Some(min_rating) = filter.min_rating {
        qb.push(" AND r.rating >= ").push_bind(min_rating);
    }
    if let Some(from) = filter.submitted_from {
        qb.push(" AND r.submitted_at >= ").push_bind(from);
    }
    if let Some(to) = filter.submitted_to {
        qb.push(" AND r.submitted_at <= ").push_bind(to);
    }
}

fn order_by(sort: ReviewSort) -> &'static str {
    match sort {
        ReviewSort::DateDesc => "r.submitted_at DESC, r.id COLLATE \"C\" ASC",
        ReviewSort::DateAsc => "r.submitted_at ASC, r.id COLLATE \"C\" ASC",
        ReviewSort::RatingDesc => {
            "r.rating DESC NULLS LAST, r.submitted_at DESC, r.id COLLATE \"C\" ASC"
        }
        ReviewSort::RatingAsc => "r.rating ASC NULLS LAST, r.submitted_at DESC, r.id COLLATE \"C\" ASC",
    }
}

fn like_pattern(needle: &str) -> String {
    let mut out = String::with_capacity(needle.len() + 2);
    out.push('%');
    for ch in needle.chars() {
        if matches!(ch, '%' | '_' | '\\') {
            out.push('\\');
        }
        out.push(ch);
    }
    out.push('%');
    out
}

fn classify(err: sqlx::Error, listing_id: Uuid) -> StorageError {
    if let sqlx::Error::Database(db_err) = &err {
        // foreign_key_violation
        if db_err.code().as_deref() == Some("23503") {
            return StorageError::NotFound {
                entity: "listing",
                id: listing_id.to_string(),
            };
        }
    }
    StorageError::Database(err)
}

fn listing_from_row(row: &PgRow) -> Result<Listing, StorageError> {
    let channel_keys: Option<Json<BTreeMap<String, String>>> = row.try_get("channel_keys")?;
    Ok(Listing {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        external_ref: row.try_get("external_ref")?,
        channel_keys: channel_keys.map(|j| j.0).unwrap_or_default(),
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn review_from_row(row: &PgRow) -> Result<Review, StorageError> {
    let channel: String = row.try_get("channel")?;
    let kind: String = row.try_get("kind")?;
    let status: String = row.try_get("status")?;
    let categories: Option<Json<CategoryRatings>> = row.try_get("categories")?;
    let source_meta: Option<JsonValue> = row.try_get("source_meta")?;
    Ok(Review {
        id: row.try_get("id")?,
        listing_id: row.try_get("listing_id")?,
        channel: channel
            .parse()
            .map_err(|e: revhub_core::CoreError| StorageError::Corrupt(e.to_string()))?,
        kind: kind
            .parse()
            .map_err(|e: revhub_core::CoreError| StorageError::Corrupt(e.to_string()))?,
        status: status
            .parse()
            .map_err(|e: revhub_core::CoreError| StorageError::Corrupt(e.to_string()))?,
        rating: row.try_get("rating")?,
        rating_raw: row.try_get("rating_raw")?,
        categories: categories.map(|j| j.0),
        title: row.try_get("title")?,
        comment: row.try_get("comment")?,
        author_name: row.try_get("author_name")?,
        submitted_at: row.try_get("submitted_at")?,
        approved: row.try_get("approved")?,
        source_meta: source_meta.unwrap_or(JsonValue::Null),
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use revhub_core::{PublicationStatus, ReviewDraft, ReviewKind};

    #[test]
    fn like_pattern_escapes_metacharacters() {
        assert_eq!(like_pattern("clean"), "%clean%");
        assert_eq!(like_pattern("100%_off"), "%100\\%\\_off%");
    }

    #[test]
    fn filters_compose_with_and() {
        let mut qb: QueryBuilder<'_, Postgres> = QueryBuilder::new("SELECT 1 FROM reviews r WHERE TRUE");
        push_filters(
            &mut qb,
            &ReviewFilter {
                channel: Some(Channel::Hostaway),
                approved: Some(true),
                min_rating: Some(4.0),
                ..Default::default()
            },
        );
        assert_eq!(
            qb.sql(),
            "SELECT 1 FROM reviews r WHERE TRUE AND r.channel = $1 AND r.approved = $2 AND r.rating >= $3"
        );
    }

    #[test]
    fn every_order_ends_with_id_tiebreak() {
        for sort in [
            ReviewSort::DateDesc,
            ReviewSort::DateAsc,
            ReviewSort::RatingDesc,
            ReviewSort::RatingAsc,
        ] {
            assert!(order_by(sort).ends_with("r.id COLLATE \"C\" ASC"));
        }
    }

    fn draft(comment: &str, rating: f64) -> ReviewDraft {
        ReviewDraft {
            channel: Channel::Hostaway,
            kind: ReviewKind::Public,
            status: PublicationStatus::Published,
            rating: Some(rating),
            rating_raw: Some(rating * 2.0),
            categories: None,
            title: None,
            comment: comment.to_string(),
            author_name: Some("Shane Finkelstein".into()),
            submitted_at: Utc.with_ymd_and_hms(2020, 8, 21, 22, 45, 14).single().unwrap(),
            source_meta: serde_json::json!({ "raw": { "id": 7453, "rating": rating * 2.0 } }),
        }
    }

    #[tokio::test]
    #[ignore = "needs a postgres database in DATABASE_URL"]
    async fn reupsert_keeps_approval_and_creation_time() {
        let Ok(url) = std::env::var("DATABASE_URL") else {
            return;
        };
        let repo = PgRepository::connect(&url, 2).await.unwrap();
        repo.migrate().await.unwrap();

        let listing = repo
            .resolve_listing(&format!("Shoreditch Heights {}", Uuid::new_v4()))
            .await
            .unwrap();
        let id = format!("hostaway:{}", Uuid::new_v4());

        let first = repo
            .upsert_review(NewReview {
                id: id.clone(),
                listing_id: listing.id,
                draft: draft("Great stay", 5.0),
            })
            .await
            .unwrap();
        assert!(first.is_created());
        assert!(!first.review().approved);

        let approved = repo.set_approval(&id, true).await.unwrap().unwrap();
        assert!(approved.approved);

        let second = repo
            .upsert_review(NewReview {
                id: id.clone(),
                listing_id: listing.id,
                draft: draft("Great stay, edited", 4.0),
            })
            .await
            .unwrap();
        assert!(!second.is_created());

        let stored = repo.find_review(&id).await.unwrap().unwrap();
        assert!(stored.approved);
        assert_eq!(stored.created_at, first.review().created_at);
        assert_eq!(stored.comment, "Great stay, edited");
        assert_eq!(stored.rating, Some(4.0));
        assert_eq!(stored.source_meta["raw"]["id"], 7453);
        assert_eq!(repo.reviews_for_listing(listing.id).await.unwrap().len(), 1);
    }
}
