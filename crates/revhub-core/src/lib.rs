//! Core domain model for RevHub: listings, canonical reviews and the query contract.

pub mod category;
pub mod error;
pub mod query;
pub mod rating;

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use uuid::Uuid;

pub use category::{map_category, Category};
pub use error::{CoreError, CoreResult};
pub use query::{PageWindow, ReviewFilter, ReviewPage, ReviewQuery, ReviewRow, ReviewSort};

pub type CategoryRatings = BTreeMap<Category, f64>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Channel {
    Hostaway,
    Google,
}

impl Channel {
    pub fn as_str(self) -> &'static str {
        match self {
            Channel::Hostaway => "hostaway",
            Channel::Google => "google",
        }
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Channel {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "hostaway" => Ok(Channel::Hostaway),
            "google" => Ok(Channel::Google),
            other => Err(CoreError::validation(format!("unknown channel `{other}`"))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ReviewKind {
    #[serde(rename = "host-to-guest")]
    HostToGuest,
    #[serde(rename = "public")]
    Public,
}

impl ReviewKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ReviewKind::HostToGuest => "host-to-guest",
            ReviewKind::Public => "public",
        }
    }
}

impl FromStr for ReviewKind {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "host-to-guest" => Ok(ReviewKind::HostToGuest),
            "public" => Ok(ReviewKind::Public),
            other => Err(CoreError::validation(format!("unknown review kind `{other}`"))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PublicationStatus {
    Published,
    Hidden,
    Pending,
}

impl PublicationStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            PublicationStatus::Published => "published",
            PublicationStatus::Hidden => "hidden",
            PublicationStatus::Pending => "pending",
        }
    }
}

impl FromStr for PublicationStatus {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "published" => Ok(PublicationStatus::Published),
            "hidden" => Ok(PublicationStatus::Hidden),
            "pending" => Ok(PublicationStatus::Pending),
            other => Err(CoreError::validation(format!("unknown publication status `{other}`"))),
        }
    }
}

pub fn review_id(channel: Channel, native_id: impl fmt::Display) -> String {
    format!("{}:{}", channel.as_str(), native_id)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Listing {
    pub id: Uuid,
    pub name: String,
    pub external_ref: Option<String>,
    pub channel_keys: BTreeMap<String, String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Listing {
    pub fn named(name: impl Into<String>, now: DateTime<Utc>) -> Self {
        let name = name.into();
        Self {
            id: Uuid::new_v4(),
            external_ref: Some(name.clone()),
            name,
            channel_keys: BTreeMap::new(),
            created_at: now,
            updated_at: now,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReviewDraft {
    pub channel: Channel,
    pub kind: ReviewKind,
    pub status: PublicationStatus,
    pub rating: Option<f64>,
    pub rating_raw: Option<f64>,
    pub categories: Option<CategoryRatings>,
    pub title: Option<String>,
    pub comment: String,
    pub author_name: Option<String>,
    pub submitted_at: DateTime<Utc>,
    pub source_meta: JsonValue,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewReview {
    pub id: String,
    pub listing_id: Uuid,
    pub draft: ReviewDraft,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Review {
    pub id: String,
    pub listing_id: Uuid,
    pub channel: Channel,
    pub kind: ReviewKind,
    pub status: PublicationStatus,
    pub rating: Option<f64>,
    pub rating_raw: Option<f64>,
    pub categories: Option<CategoryRatings>,
    pub title: Option<String>,
    pub comment: String,
    pub author_name: Option<String>,
    pub submitted_at: DateTime<Utc>,
    pub approved: bool,
    pub source_meta: JsonValue,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Review {
    pub fn create(new: NewReview, now: DateTime<Utc>) -> Self {
        let NewReview {
            id,
            listing_id,
            draft,
        } = new;
        Self {
            id,
            listing_id,
            channel: draft.channel,
            kind: draft.kind,
            status: draft.status,
            rating: draft.rating,
            rating_raw: draft.rating_raw,
            categories: draft.categories,
            title: draft.title,
            comment: draft.comment,
            author_name: draft.author_name,
            submitted_at: draft.submitted_at,
            approved: false,
            source_meta: draft.source_meta,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn overwrite(&mut self, new: NewReview, now: DateTime<Utc>) {
        let approved = self.approved;
        let created_at = self.created_at;
        *self = Review::create(new, now);
        self.approved = approved;
        self.created_at = created_at;
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReviewDto {
    pub id: String,
    pub listing_id: Uuid,
    pub listing_name: String,
    pub channel: Channel,
    #[serde(rename = "type")]
    pub kind: ReviewKind,
    pub status: PublicationStatus,
    pub rating: Option<f64>,
    pub rating_raw: Option<f64>,
    pub categories: Option<CategoryRatings>,
    pub title: Option<String>,
    pub comment: String,
    pub author_name: Option<String>,
    pub submitted_at: String,
    pub approved: bool,
}

impl ReviewDto {
    pub fn from_review(review: &Review, listing_name: &str) -> Self {
        Self {
            id: review.id.clone(),
            listing_id: review.listing_id,
            listing_name: listing_name.to_string(),
            channel: review.channel,
            kind: review.kind,
            status: review.status,
            rating: review.rating,
            rating_raw: review.rating_raw,
            categories: review.categories.clone(),
            title: review.title.clone(),
            comment: review.comment.clone(),
            author_name: review.author_name.clone(),
            submitted_at: review
                .submitted_at
                .to_rfc3339_opts(SecondsFormat::Millis, true),
            approved: review.approved,
        }
    }
}

impl From<ReviewRow> for ReviewDto {
    fn from(row: ReviewRow) -> Self {
        ReviewDto::from_review(&row.review, &row.listing_name)
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use chrono::TimeZone;

    pub fn ts(y: i32, m: u32, d: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, 12, 0, 0).single().unwrap()
    }

    pub fn draft(rating: Option<f64>, comment: &str, submitted_at: DateTime<Utc>) -> ReviewDraft {
        ReviewDraft {
            channel: Channel::Hostaway,
            kind: ReviewKind::HostToGuest,
            status: PublicationStatus::Published,
            rating,
            rating_raw: rating.map(|r| r * 2.0),
            categories: None,
            title: None,
            comment: comment.to_string(),
            author_name: Some("Guest".into()),
            submitted_at,
            source_meta: serde_json::json!({}),
        }
    }

    pub fn review(id: &str, rating: Option<f64>, approved: bool, submitted_at: DateTime<Utc>) -> Review {
        let mut review = Review::create(
            NewReview {
                id: id.to_string(),
                listing_id: Uuid::nil(),
                draft: draft(rating, "", submitted_at),
            },
            submitted_at,
        );
        review.approved = approved;
        review
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::*;
    use super::*;

    #[test]
    fn review_id_is_channel_prefixed() {
        assert_eq!(review_id(Channel::Hostaway, 7453), "hostaway:7453");
        assert_eq!(review_id(Channel::Google, "abc"), "google:abc");
    }

    #[test]
    fn overwrite_keeps_moderation_state_and_creation_time() {
        let created = ts(2024, 1, 1);
        let mut review = Review::create(
            NewReview {
                id: "hostaway:1".into(),
                listing_id: Uuid::nil(),
                draft: draft(Some(4.0), "first", ts(2023, 12, 30)),
            },
            created,
        );
        review.approved = true;

        let other_listing = Uuid::new_v4();
        review.overwrite(
            NewReview {
                id: "hostaway:1".into(),
                listing_id: other_listing,
                draft: draft(Some(2.5), "edited", ts(2023, 12, 31)),
            },
            ts(2024, 2, 1),
        );

        assert!(review.approved);
        assert_eq!(review.created_at, created);
        assert_eq!(review.updated_at, ts(2024, 2, 1));
        assert_eq!(review.comment, "edited");
        assert_eq!(review.rating, Some(2.5));
        assert_eq!(review.listing_id, other_listing);
    }

    #[test]
    fn dto_uses_camel_case_and_iso_instant() {
        let review = review("hostaway:7453", Some(5.0), true, ts(2020, 8, 21));
        let dto = ReviewDto::from_review(&review, "Test Loft");
        let json = serde_json::to_value(&dto).unwrap();
        assert_eq!(json["listingName"], "Test Loft");
        assert_eq!(json["type"], "host-to-guest");
        assert_eq!(json["submittedAt"], "2020-08-21T12:00:00.000Z");
        assert_eq!(json["ratingRaw"], 10.0);
        assert_eq!(json["approved"], true);
    }

    #[test]
    fn channel_parses_case_insensitively() {
        assert_eq!("Hostaway".parse::<Channel>().unwrap(), Channel::Hostaway);
        assert!("airbnb".parse::<Channel>().is_err());
    }
}
