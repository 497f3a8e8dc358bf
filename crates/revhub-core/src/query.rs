use std::cmp::Ordering;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::{Channel, CoreError, Review};

pub const DEFAULT_PAGE_SIZE: u32 = 50;
pub const MAX_PAGE_SIZE: u32 = 200;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReviewFilter {
    pub listing_name: Option<String>,
    pub listing_id: Option<Uuid>,
    pub channel: Option<Channel>,
    pub approved: Option<bool>,
    pub search: Option<String>,
    pub min_rating: Option<f64>,
    pub submitted_from: Option<DateTime<Utc>>,
    pub submitted_to: Option<DateTime<Utc>>,
}

impl ReviewFilter {
    pub fn matches(&self, review: &Review, listing_name: &str) -> bool {
        if let Some(name) = &self.listing_name {
            if listing_name != name {
                return false;
            }
        }
        if let Some(id) = self.listing_id {
            if review.listing_id != id {
                return false;
            }
        }
        if let Some(channel) = self.channel {
            if review.channel != channel {
                return false;
            }
        }
        if let Some(approved) = self.approved {
            if review.approved != approved {
                return false;
            }
        }
        if let Some(needle) = &self.search {
            if !review.comment.to_lowercase().contains(&needle.to_lowercase()) {
                return false;
            }
        }
        if let Some(min) = self.min_rating {
            // unrated reviews never clear a floor
            match review.rating {
                Some(rating) if rating >= min => {}
                _ => return false,
            }
        }
        if let Some(from) = self.submitted_from {
            if review.submitted_at < from {
                return false;
            }
        }
        if let Some(to) = self.submitted_to {
            if review.submitted_at > to {
                return false;
            }
        }
        true
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ReviewSort {
    #[default]
    DateDesc,
    DateAsc,
    RatingDesc,
    RatingAsc,
}

impl ReviewSort {
    /// Total order used by in-process sorting. Mirrors the SQL `ORDER BY`:
    /// unrated reviews sort last under rating orders, rating ties fall back to
    /// newest first, and `id` breaks every remaining tie.
    pub fn compare(self, a: &Review, b: &Review) -> Ordering {
        let primary = match self {
            ReviewSort::DateDesc => b.submitted_at.cmp(&a.submitted_at),
            ReviewSort::DateAsc => a.submitted_at.cmp(&b.submitted_at),
            ReviewSort::RatingDesc => {
                compare_ratings(a.rating, b.rating, true).then(b.submitted_at.cmp(&a.submitted_at))
            }
            ReviewSort::RatingAsc => {
                compare_ratings(a.rating, b.rating, false).then(b.submitted_at.cmp(&a.submitted_at))
            }
        };
        primary.then_with(|| a.id.cmp(&b.id))
    }
}

fn compare_ratings(a: Option<f64>, b: Option<f64>, descending: bool) -> Ordering {
    match (a, b) {
        (Some(x), Some(y)) => {
            let ord = x.partial_cmp(&y).unwrap_or(Ordering::Equal);
            if descending {
                ord.reverse()
            } else {
                ord
            }
        }
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

impl FromStr for ReviewSort {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "" | "date_desc" => Ok(ReviewSort::DateDesc),
            "date_asc" => Ok(ReviewSort::DateAsc),
            "rating_desc" => Ok(ReviewSort::RatingDesc),
            "rating_asc" => Ok(ReviewSort::RatingAsc),
            other => Err(CoreError::validation(format!(
                "sort must be one of date_desc, date_asc, rating_desc, rating_asc (got `{other}`)"
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageWindow {
    pub page: u32,
    pub page_size: u32,
}

impl Default for PageWindow {
    fn default() -> Self {
        Self {
            page: 1,
            page_size: DEFAULT_PAGE_SIZE,
        }
    }
}

impl PageWindow {
    pub fn new(page: Option<i64>, page_size: Option<i64>) -> Self {
        let page = page.unwrap_or(1).clamp(1, u32::MAX as i64) as u32;
        let page_size = page_size
            .unwrap_or(DEFAULT_PAGE_SIZE as i64)
            .clamp(1, MAX_PAGE_SIZE as i64) as u32;
        Self { page, page_size }
    }

    pub fn skip(&self) -> u64 {
        (self.page as u64 - 1) * self.page_size as u64
    }

    pub fn take(&self) -> u64 {
        self.page_size as u64
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReviewQuery {
    pub filter: ReviewFilter,
    pub sort: ReviewSort,
    pub window: PageWindow,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ReviewRow {
    pub review: Review,
    pub listing_name: String,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReviewPage {
    pub total: u64,
    pub items: Vec<ReviewRow>,
}
