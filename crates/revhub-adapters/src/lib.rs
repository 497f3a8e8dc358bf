//! Per-channel raw payload types and the normalizers that turn them into
//! canonical review drafts.

pub mod google;
pub mod hostaway;

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use revhub_core::ReviewDraft;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value as JsonValue;
use thiserror::Error;

pub use google::{
    google_review_id, GoogleAdapter, GooglePlaceReview, GooglePlacesClient, PlaceReviewSource,
    PlacesError, DEFAULT_PLACES_BASE_URL,
};
pub use hostaway::{
    load_hostaway_export, HostawayAdapter, HostawayExport, HostawayReview, UNKNOWN_LISTING,
};

#[derive(Debug, Error)]
pub enum NormalizeError {
    #[error("invalid timestamp `{0}`")]
    Timestamp(String),
    #[error("rating {value} outside 0..={max}")]
    Rating { value: f64, max: f64 },
    #[error("unsupported value for {field}: {message}")]
    Field { field: &'static str, message: String },
    #[error("malformed payload: {0}")]
    Payload(#[from] serde_json::Error),
}

/// A channel's normalizer. `Raw` is that channel's payload shape and never
/// travels past this boundary; `payload` is the untouched item it was
/// decoded from and ends up in `source_meta`.
pub trait ChannelAdapter: Send + Sync {
    type Raw: DeserializeOwned;

    fn normalize(&self, raw: &Self::Raw, payload: JsonValue) -> Result<ReviewDraft, NormalizeError>;

    fn decode(&self, value: &JsonValue) -> Result<Self::Raw, NormalizeError> {
        Ok(Self::Raw::deserialize(value)?)
    }

    fn ingest(&self, value: JsonValue) -> Result<(Self::Raw, ReviewDraft), NormalizeError> {
        let raw = self.decode(&value)?;
        let draft = self.normalize(&raw, value)?;
        Ok((raw, draft))
    }
}

fn raw_source_meta(payload: JsonValue) -> JsonValue {
    serde_json::json!({ "raw": payload })
}

fn read_json_file<T: DeserializeOwned>(path: impl AsRef<Path>) -> Result<T> {
    let path = path.as_ref();
    let data = fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    serde_json::from_str(&data).with_context(|| format!("parsing {}", path.display()))
}

fn checked_rating(value: Option<f64>, max: f64) -> Result<Option<f64>, NormalizeError> {
    match value {
        Some(v) if !revhub_core::rating::in_range(v, max) => {
            Err(NormalizeError::Rating { value: v, max })
        }
        other => Ok(other),
    }
}
