use std::fmt;
use std::path::Path;

use anyhow::Result;
use chrono::{DateTime, Utc};
use revhub_core::rating::{to_five_scale, TEN_POINT_MAX};
use revhub_core::{
    map_category, review_id, CategoryRatings, Channel, PublicationStatus, ReviewDraft, ReviewKind,
};
use serde::Deserialize;
use tracing::debug;
use serde_json::{Map, Value as JsonValue};

use crate::{checked_rating, raw_source_meta, read_json_file, ChannelAdapter, NormalizeError};

pub const UNKNOWN_LISTING: &str = "Unknown Listing";

#[derive(Debug, Clone, Default, Deserialize)]
pub struct HostawayExport {
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub result: Vec<JsonValue>,
}

pub fn load_hostaway_export(path: impl AsRef<Path>) -> Result<HostawayExport> {
    read_json_file(path)
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum NativeId {
    Number(u64),
    Text(String),
}

impl fmt::Display for NativeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NativeId::Number(n) => write!(f, "{n}"),
            NativeId::Text(s) => f.write_str(s),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct HostawayCategoryRating {
    pub category: String,
    #[serde(default)]
    pub rating: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HostawayReview {
    pub id: NativeId,
    #[serde(rename = "type", default)]
    pub kind: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub rating: Option<f64>,
    #[serde(default)]
    pub public_review: Option<String>,
    #[serde(default)]
    pub review_category: Vec<HostawayCategoryRating>,
    pub submitted_at: String,
    #[serde(default)]
    pub guest_name: Option<String>,
    #[serde(default)]
    pub listing_name: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, JsonValue>,
}

impl HostawayReview {
    pub fn review_id(&self) -> String {
        review_id(Channel::Hostaway, &self.id)
    }

    pub fn listing_name(&self) -> &str {
        self.listing_name
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .unwrap_or(UNKNOWN_LISTING)
    }
}

pub fn parse_submitted_at(raw: &str) -> Result<DateTime<Utc>, NormalizeError> {
    let candidate = format!("{}Z", raw.trim().replacen(' ', "T", 1));
    DateTime::parse_from_rfc3339(&candidate)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|_| NormalizeError::Timestamp(raw.to_string()))
}

#[derive(Debug, Clone, Copy, Default)]
pub struct HostawayAdapter;

impl ChannelAdapter for HostawayAdapter {
    type Raw = HostawayReview;

    fn normalize(
        &self,
        raw: &HostawayReview,
        payload: JsonValue,
    ) -> Result<ReviewDraft, NormalizeError> {
        let rating_raw = checked_rating(raw.rating, TEN_POINT_MAX)?;

        let mut categories = CategoryRatings::new();
        for entry in &raw.review_category {
            let value = checked_rating(entry.rating, TEN_POINT_MAX)?;
            match to_five_scale(value) {
                Some(scaled) => {
                    categories.insert(map_category(&entry.category), scaled);
                }
                // unrated entries stay visible in source_meta
                None => debug!(
                    review = %raw.id,
                    category = %entry.category,
                    "category entry has no rating"
                ),
            }
        }

        let kind = match raw.kind.as_deref() {
            Some("host-to-guest") => ReviewKind::HostToGuest,
            _ => ReviewKind::Public,
        };
        let status = match raw.status.as_deref() {
            None => PublicationStatus::Published,
            Some(s) => s.parse().map_err(|e: revhub_core::CoreError| NormalizeError::Field {
                field: "status",
                message: e.to_string(),
            })?,
        };

        Ok(ReviewDraft {
            channel: Channel::Hostaway,
            kind,
            status,
            rating: to_five_scale(rating_raw),
            rating_raw,
            categories: (!categories.is_empty()).then_some(categories),
            title: None,
            comment: raw.public_review.clone().unwrap_or_default(),
            author_name: raw.guest_name.clone(),
            submitted_at: parse_submitted_at(&raw.submitted_at)?,
            source_meta: raw_source_meta(payload),
        })
    }
}
