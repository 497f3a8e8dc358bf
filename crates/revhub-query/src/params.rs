use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use revhub_core::{Channel, CoreError, CoreResult, PageWindow, ReviewFilter, ReviewQuery};
use serde::Deserialize;
use uuid::Uuid;

use crate::stats::TrendPeriod;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReviewQueryParams {
    pub listing: Option<String>,
    pub listing_id: Option<String>,
    pub channel: Option<String>,
    pub approved: Option<String>,
    pub q: Option<String>,
    pub min_rating: Option<String>,
    pub from: Option<String>,
    pub to: Option<String>,
    pub sort: Option<String>,
    pub page: Option<String>,
    pub page_size: Option<String>,
}

impl ReviewQueryParams {
    pub fn into_query(self) -> CoreResult<ReviewQuery> {
        let filter = ReviewFilter {
            listing_name: non_blank(self.listing),
            listing_id: non_blank(self.listing_id)
                .map(|v| {
                    Uuid::parse_str(&v)
                        .map_err(|_| CoreError::validation(format!("listingId is not a valid id: `{v}`")))
                })
                .transpose()?,
            channel: non_blank(self.channel).map(|v| v.parse::<Channel>()).transpose()?,
            approved: parse_approved(self.approved.as_deref())?,
            search: non_blank(self.q),
            min_rating: non_blank(self.min_rating)
                .map(|v| match parse_number::<f64>("minRating", &v)? {
                    n if n.is_finite() => Ok(n),
                    _ => Err(CoreError::validation("minRating must be finite")),
                })
                .transpose()?,
            submitted_from: non_blank(self.from)
                .map(|v| parse_instant("from", &v, Bound::Start))
                .transpose()?,
            submitted_to: non_blank(self.to)
                .map(|v| parse_instant("to", &v, Bound::End))
                .transpose()?,
        };

        let sort = self.sort.as_deref().unwrap_or_default().parse()?;
        let page = non_blank(self.page)
            .map(|v| parse_number::<i64>("page", &v))
            .transpose()?;
        let page_size = non_blank(self.page_size)
            .map(|v| parse_number::<i64>("pageSize", &v))
            .transpose()?;

        Ok(ReviewQuery {
            filter,
            sort,
            window: PageWindow::new(page, page_size),
        })
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TrendParams {
    pub period: Option<String>,
}

impl TrendParams {
    pub fn period(&self) -> CoreResult<TrendPeriod> {
        self.period.as_deref().unwrap_or_default().parse()
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComparisonParams {
    pub property_ids: Option<String>,
}

impl ComparisonParams {
    pub fn listing_ids(&self) -> CoreResult<Vec<Uuid>> {
        let ids = self
            .property_ids
            .as_deref()
            .unwrap_or_default()
            .split(',')
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(|v| {
                Uuid::parse_str(v)
                    .map_err(|_| CoreError::validation(format!("propertyIds contains an invalid id: `{v}`")))
            })
            .collect::<CoreResult<Vec<_>>>()?;
        if ids.is_empty() {
            return Err(CoreError::validation("propertyIds is required"));
        }
        Ok(ids)
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn parse_approved(value: Option<&str>) -> CoreResult<Option<bool>> {
    match value.map(|v| v.trim().to_ascii_lowercase()).as_deref() {
        None | Some("") | Some("any") | Some("all") => Ok(None),
        Some("true") | Some("1") => Ok(Some(true)),
        Some("false") | Some("0") => Ok(Some(false)),
        Some(other) => Err(CoreError::validation(format!(
            "approved must be true, false or any (got `{other}`)"
        ))),
    }
}

fn parse_number<T: std::str::FromStr>(field: &str, value: &str) -> CoreResult<T> {
    value
        .parse()
        .map_err(|_| CoreError::validation(format!("{field} must be a number (got `{value}`)")))
}

#[derive(Clone, Copy)]
enum Bound {
    Start,
    End,
}

fn parse_instant(field: &str, value: &str, bound: Bound) -> CoreResult<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Ok(dt.with_timezone(&Utc));
    }
    let date = NaiveDate::parse_from_str(value, "%Y-%m-%d").map_err(|_| {
        CoreError::validation(format!("{field} must be a date or RFC 3339 instant (got `{value}`)"))
    })?;
    let time = match bound {
        Bound::Start => NaiveTime::MIN,
        Bound::End => NaiveTime::from_hms_milli_opt(23, 59, 59, 999).unwrap_or(NaiveTime::MIN),
    };
    Ok(date.and_time(time).and_utc())
}
