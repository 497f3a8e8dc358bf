use std::collections::BTreeMap;
use std::str::FromStr;

use chrono::{DateTime, Duration, SecondsFormat, Utc};
use revhub_core::{Category, CoreError, CoreResult, Listing, Review};
use revhub_storage::ReviewRepository;
use serde::Serialize;
use uuid::Uuid;

const RECENT_WINDOW_DAYS: i64 = 30;
const TOP_PERFORMERS: usize = 3;
const RECENT_TREND_WINDOWS: [(&str, i64); 3] =
    [("Last 7 days", 7), ("Last 30 days", 30), ("Last 90 days", 90)];

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CategoryStat {
    pub category: Category,
    pub average_rating: f64,
    pub review_count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PropertySummary {
    pub id: Uuid,
    pub name: String,
    pub total_reviews: usize,
    pub approved_reviews: usize,
    pub average_rating: f64,
    pub approval_rate: u32,
    pub recent_reviews: usize,
    pub category_stats: Vec<CategoryStat>,
    pub last_review_date: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PropertyRef {
    pub id: Uuid,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PropertyMetrics {
    pub total_reviews: usize,
    pub approved_reviews: usize,
    pub average_rating: f64,
    pub approval_rate: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RatingBucket {
    pub rating: u8,
    pub count: usize,
    pub percentage: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MonthlyStat {
    pub month: String,
    pub review_count: usize,
    pub average_rating: f64,
    pub approval_rate: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Trend {
    Up,
    Down,
    Stable,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Trends {
    pub rating: Trend,
    pub volume: Trend,
    pub approval: Trend,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PropertyPerformance {
    pub property: PropertyRef,
    pub metrics: PropertyMetrics,
    pub rating_distribution: Vec<RatingBucket>,
    pub monthly_stats: Vec<MonthlyStat>,
    pub category_stats: Vec<CategoryStat>,
    pub trends: Trends,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TrendPeriod {
    Week,
    #[default]
    Month,
    Quarter,
    Year,
}

impl TrendPeriod {
    pub fn days(self) -> i64 {
        match self {
            TrendPeriod::Week => 7,
            TrendPeriod::Month => 30,
            TrendPeriod::Quarter => 90,
            TrendPeriod::Year => 365,
        }
    }

    // daily buckets up to a month, monthly beyond
    fn bucket(self, at: DateTime<Utc>) -> String {
        match self {
            TrendPeriod::Week | TrendPeriod::Month => at.format("%Y-%m-%d").to_string(),
            TrendPeriod::Quarter | TrendPeriod::Year => at.format("%Y-%m").to_string(),
        }
    }
}

impl FromStr for TrendPeriod {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "" | "30d" => Ok(TrendPeriod::Month),
            "7d" => Ok(TrendPeriod::Week),
            "90d" => Ok(TrendPeriod::Quarter),
            "1y" => Ok(TrendPeriod::Year),
            other => Err(CoreError::validation(format!(
                "period must be one of 7d, 30d, 90d, 1y; got `{other}`"
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VolumePoint {
    pub period: String,
    pub count: usize,
    pub average_rating: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApprovalPoint {
    pub period: String,
    pub approved: usize,
    pub total: usize,
    pub approval_rate: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PropertyTrends {
    pub volume_trend: Vec<VolumePoint>,
    pub approval_trend: Vec<ApprovalPoint>,
    pub insights: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OverviewSummary {
    pub total_properties: usize,
    pub total_reviews: usize,
    pub approved_reviews: usize,
    pub average_rating: f64,
    pub approval_rate: u32,
    pub recent_activity: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PerformerStat {
    pub id: Uuid,
    pub name: String,
    pub average_rating: f64,
    pub approval_rate: u32,
    pub review_count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WindowStat {
    pub period: String,
    pub review_count: usize,
    pub average_rating: f64,
    pub approval_rate: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalyticsOverview {
    pub summary: OverviewSummary,
    pub top_performers: Vec<PerformerStat>,
    pub category_stats: Vec<CategoryStat>,
    pub recent_trends: Vec<WindowStat>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum InsightKind {
    Positive,
    Info,
    Warning,
    Critical,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Insight {
    #[serde(rename = "type")]
    pub kind: InsightKind,
    pub message: String,
    pub action: String,
}

impl Insight {
    fn new(kind: InsightKind, message: impl Into<String>, action: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            action: action.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    High,
    Medium,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Recommendation {
    pub priority: Priority,
    pub title: String,
    pub description: String,
    pub action: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnalyticsInsights {
    pub insights: Vec<Insight>,
    pub recommendations: Vec<Recommendation>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ComparisonMetrics {
    pub average_rating: f64,
    pub approval_rate: u32,
    pub total_reviews: usize,
    pub category_stats: Vec<CategoryStat>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ComparedProperty {
    pub id: Uuid,
    pub name: String,
    pub metrics: Option<ComparisonMetrics>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PropertyComparison {
    pub properties: Vec<ComparedProperty>,
    pub comparison: Vec<Insight>,
}

pub async fn property_summaries(repo: &dyn ReviewRepository) -> CoreResult<Vec<PropertySummary>> {
    let now = Utc::now();
    let mut out = Vec::new();
    for listing in repo.list_listings().await? {
        let reviews = repo.reviews_for_listing(listing.id).await?;
        out.push(summarize(&listing, &reviews, now));
    }
    Ok(out)
}

pub async fn property_performance(
    repo: &dyn ReviewRepository,
    listing_id: Uuid,
) -> CoreResult<PropertyPerformance> {
    let listing = repo
        .find_listing(listing_id)
        .await?
        .ok_or_else(|| CoreError::not_found("listing", listing_id.to_string()))?;
    let reviews = repo.reviews_for_listing(listing.id).await?;
    Ok(performance(&listing, &reviews))
}

pub async fn property_trends(
    repo: &dyn ReviewRepository,
    listing_id: Uuid,
    period: TrendPeriod,
) -> CoreResult<PropertyTrends> {
    let listing = repo
        .find_listing(listing_id)
        .await?
        .ok_or_else(|| CoreError::not_found("listing", listing_id.to_string()))?;
    let reviews = repo.reviews_for_listing(listing.id).await?;
    Ok(period_trends(&reviews, period, Utc::now()))
}

pub async fn analytics_overview(repo: &dyn ReviewRepository) -> CoreResult<AnalyticsOverview> {
    let portfolio = load_portfolio(repo).await?;
    Ok(overview(&portfolio, Utc::now()))
}

pub async fn analytics_insights(repo: &dyn ReviewRepository) -> CoreResult<AnalyticsInsights> {
    let reviews: Vec<Review> = load_portfolio(repo)
        .await?
        .into_iter()
        .flat_map(|(_, reviews)| reviews)
        .collect();
    Ok(insights(&reviews, Utc::now()))
}

pub async fn property_comparison(
    repo: &dyn ReviewRepository,
    listing_ids: &[Uuid],
) -> CoreResult<PropertyComparison> {
    let mut properties = Vec::with_capacity(listing_ids.len());
    for id in listing_ids {
        let listing = repo.find_listing(*id).await?;
        let reviews = match &listing {
            Some(listing) => repo.reviews_for_listing(listing.id).await?,
            None => Vec::new(),
        };
        properties.push(compare_property(*id, listing.as_ref(), &reviews));
    }
    let comparison = comparison_insights(&properties);
    Ok(PropertyComparison {
        properties,
        comparison,
    })
}

async fn load_portfolio(repo: &dyn ReviewRepository) -> CoreResult<Vec<(Listing, Vec<Review>)>> {
    let mut out = Vec::new();
    for listing in repo.list_listings().await? {
        let reviews = repo.reviews_for_listing(listing.id).await?;
        out.push((listing, reviews));
    }
    Ok(out)
}

pub fn summarize(listing: &Listing, reviews: &[Review], now: DateTime<Utc>) -> PropertySummary {
    let cutoff = now - Duration::days(RECENT_WINDOW_DAYS);
    PropertySummary {
        id: listing.id,
        name: listing.name.clone(),
        total_reviews: reviews.len(),
        approved_reviews: approved_count(reviews),
        average_rating: round1(mean(valid_ratings(reviews))),
        approval_rate: percent(approved_count(reviews), reviews.len()),
        recent_reviews: reviews.iter().filter(|r| r.submitted_at >= cutoff).count(),
        category_stats: category_stats(reviews),
        last_review_date: reviews
            .iter()
            .map(|r| r.submitted_at)
            .max()
            .map(|at| at.to_rfc3339_opts(SecondsFormat::Millis, true)),
    }
}

pub fn performance(listing: &Listing, reviews: &[Review]) -> PropertyPerformance {
    let rated: Vec<f64> = valid_ratings(reviews).collect();
    let rating_distribution = (1..=5u8)
        .rev()
        .map(|star| {
            let count = rated.iter().filter(|r| r.round() as u8 == star).count();
            RatingBucket {
                rating: star,
                count,
                percentage: percent(count, rated.len()),
            }
        })
        .collect();

    PropertyPerformance {
        property: PropertyRef {
            id: listing.id,
            name: listing.name.clone(),
        },
        metrics: PropertyMetrics {
            total_reviews: reviews.len(),
            approved_reviews: approved_count(reviews),
            average_rating: round1(mean(rated.iter().copied())),
            approval_rate: percent(approved_count(reviews), reviews.len()),
        },
        rating_distribution,
        monthly_stats: monthly_stats(reviews),
        category_stats: category_stats(reviews),
        trends: trends(reviews),
    }
}

pub fn period_trends(reviews: &[Review], period: TrendPeriod, now: DateTime<Utc>) -> PropertyTrends {
    let cutoff = now - Duration::days(period.days());
    let in_window: Vec<&Review> = reviews.iter().filter(|r| r.submitted_at >= cutoff).collect();

    let mut buckets: BTreeMap<String, Vec<&Review>> = BTreeMap::new();
    for &review in &in_window {
        buckets
            .entry(period.bucket(review.submitted_at))
            .or_default()
            .push(review);
    }

    let mut volume_trend = Vec::with_capacity(buckets.len());
    let mut approval_trend = Vec::with_capacity(buckets.len());
    for (bucket, group) in &buckets {
        let approved = group.iter().filter(|r| r.approved).count();
        volume_trend.push(VolumePoint {
            period: bucket.clone(),
            count: group.len(),
            average_rating: round1(mean(group.iter().copied().filter_map(valid_rating))),
        });
        approval_trend.push(ApprovalPoint {
            period: bucket.clone(),
            approved,
            total: group.len(),
            approval_rate: percent(approved, group.len()),
        });
    }

    let insights = trend_insights(&in_window, &volume_trend);
    PropertyTrends {
        volume_trend,
        approval_trend,
        insights,
    }
}

fn trend_insights(reviews: &[&Review], volume: &[VolumePoint]) -> Vec<String> {
    if reviews.is_empty() {
        return vec!["No reviews found for this period".to_string()];
    }
    let mut out = Vec::new();

    let count_at = |back: usize| {
        volume
            .len()
            .checked_sub(back)
            .and_then(|i| volume.get(i))
            .map_or(0, |p| p.count)
    };
    let (latest, previous) = (count_at(1), count_at(2));
    if latest > previous {
        out.push(format!(
            "Review volume increased by {} reviews this period",
            latest - previous
        ));
    } else if latest < previous {
        out.push(format!(
            "Review volume decreased by {} reviews this period",
            previous - latest
        ));
    }

    let rated: Vec<f64> = reviews.iter().copied().filter_map(valid_rating).collect();
    let average = mean(rated.iter().copied());
    if average >= 4.5 {
        out.push("Excellent average rating maintained".to_string());
    } else if !rated.is_empty() && average < 3.5 {
        out.push("Average rating needs attention".to_string());
    }

    let approved = reviews.iter().filter(|r| r.approved).count();
    if (approved as f64) < reviews.len() as f64 * 0.5 {
        out.push("Consider approving more reviews to improve public visibility".to_string());
    }
    out
}

pub fn overview(portfolio: &[(Listing, Vec<Review>)], now: DateTime<Utc>) -> AnalyticsOverview {
    let all: Vec<Review> = portfolio
        .iter()
        .flat_map(|(_, reviews)| reviews.iter().cloned())
        .collect();
    let recent_cutoff = now - Duration::days(RECENT_WINDOW_DAYS);

    let mut top_performers: Vec<PerformerStat> = portfolio
        .iter()
        .filter(|(_, reviews)| !reviews.is_empty())
        .map(|(listing, reviews)| PerformerStat {
            id: listing.id,
            name: listing.name.clone(),
            average_rating: round1(mean(valid_ratings(reviews))),
            approval_rate: percent(approved_count(reviews), reviews.len()),
            review_count: reviews.len(),
        })
        .collect();
    top_performers.sort_by(|a, b| {
        b.average_rating
            .total_cmp(&a.average_rating)
            .then_with(|| a.name.cmp(&b.name))
    });
    top_performers.truncate(TOP_PERFORMERS);

    let recent_trends = RECENT_TREND_WINDOWS
        .iter()
        .map(|(label, days)| {
            let cutoff = now - Duration::days(*days);
            let window: Vec<Review> = all
                .iter()
                .filter(|r| r.submitted_at >= cutoff)
                .cloned()
                .collect();
            WindowStat {
                period: (*label).to_string(),
                review_count: window.len(),
                average_rating: round1(mean(valid_ratings(&window))),
                approval_rate: percent(approved_count(&window), window.len()),
            }
        })
        .collect();

    AnalyticsOverview {
        summary: OverviewSummary {
            total_properties: portfolio.len(),
            total_reviews: all.len(),
            approved_reviews: approved_count(&all),
            average_rating: round1(mean(valid_ratings(&all))),
            approval_rate: percent(approved_count(&all), all.len()),
            recent_activity: all.iter().filter(|r| r.submitted_at >= recent_cutoff).count(),
        },
        top_performers,
        category_stats: category_stats(&all),
        recent_trends,
    }
}

pub fn insights(reviews: &[Review], now: DateTime<Utc>) -> AnalyticsInsights {
    let mut out = Vec::new();

    let month_ago = now - Duration::days(30);
    let two_months_ago = now - Duration::days(60);
    let recent = reviews.iter().filter(|r| r.submitted_at >= month_ago).count();
    let previous = reviews
        .iter()
        .filter(|r| r.submitted_at >= two_months_ago && r.submitted_at < month_ago)
        .count();
    if recent > previous {
        out.push(Insight::new(
            InsightKind::Positive,
            format!("Review volume increased by {} reviews this month", recent - previous),
            "Continue current strategies",
        ));
    } else if recent < previous {
        out.push(Insight::new(
            InsightKind::Warning,
            format!("Review volume decreased by {} reviews this month", previous - recent),
            "Consider review request campaigns",
        ));
    }

    let rated: Vec<f64> = valid_ratings(reviews).collect();
    let average = round1(mean(rated.iter().copied()));
    if !rated.is_empty() && average < 4.0 {
        out.push(Insight::new(
            InsightKind::Critical,
            format!("Overall average rating is {average}, below target"),
            "Focus on improving guest experience",
        ));
    } else if average >= 4.5 {
        out.push(Insight::new(
            InsightKind::Positive,
            format!("Excellent overall rating of {average}"),
            "Maintain current standards",
        ));
    }

    let approval_rate = percent(approved_count(reviews), reviews.len());
    if !reviews.is_empty() && approval_rate < 60 {
        out.push(Insight::new(
            InsightKind::Warning,
            format!("Only {approval_rate}% of reviews are approved for public display"),
            "Review approval criteria and approve more high-quality reviews",
        ));
    }

    // categories nobody rated carry no signal
    let categories: Vec<CategoryStat> = category_stats(reviews)
        .into_iter()
        .filter(|c| c.review_count > 0)
        .collect();
    if let Some(lowest) = categories
        .iter()
        .min_by(|a, b| a.average_rating.total_cmp(&b.average_rating))
        .filter(|c| c.average_rating < 4.0)
    {
        out.push(Insight::new(
            InsightKind::Warning,
            format!(
                "{} ratings are lowest at {}",
                lowest.category.as_str(),
                lowest.average_rating
            ),
            format!("Focus on improving {}", lowest.category.as_str()),
        ));
    }

    let mut recommendations = Vec::new();
    if !reviews.is_empty() && approval_rate < 70 {
        recommendations.push(Recommendation {
            priority: Priority::High,
            title: "Increase Review Approval Rate".to_string(),
            description: format!(
                "Current approval rate is {approval_rate}%. Consider approving more 4+ star reviews."
            ),
            action: "Review and approve high-quality reviews".to_string(),
        });
    }
    for category in categories.iter().filter(|c| c.average_rating < 4.0) {
        let name = category.category.as_str();
        recommendations.push(Recommendation {
            priority: Priority::Medium,
            title: format!("Improve {name} Ratings"),
            description: format!("{name} has an average rating of {}", category.average_rating),
            action: format!("Focus on {name} improvements"),
        });
    }

    AnalyticsInsights {
        insights: out,
        recommendations,
    }
}

pub fn compare_property(id: Uuid, listing: Option<&Listing>, reviews: &[Review]) -> ComparedProperty {
    let name = listing.map_or_else(|| "Unknown Property".to_string(), |l| l.name.clone());
    let metrics = match listing {
        Some(_) if !reviews.is_empty() => Some(ComparisonMetrics {
            average_rating: round1(mean(valid_ratings(reviews))),
            approval_rate: percent(approved_count(reviews), reviews.len()),
            total_reviews: reviews.len(),
            category_stats: category_stats(reviews),
        }),
        _ => None,
    };
    ComparedProperty { id, name, metrics }
}

pub fn comparison_insights(properties: &[ComparedProperty]) -> Vec<Insight> {
    let rated: Vec<(&ComparedProperty, f64)> = properties
        .iter()
        .filter_map(|p| p.metrics.as_ref().map(|m| (p, m.average_rating)))
        .collect();
    if rated.len() < 2 {
        return Vec::new();
    }
    let best = rated.iter().max_by(|a, b| a.1.total_cmp(&b.1));
    let worst = rated.iter().min_by(|a, b| a.1.total_cmp(&b.1));
    match (best, worst) {
        (Some((best, high)), Some((_, low))) if high - low > 0.5 => vec![Insight::new(
            InsightKind::Info,
            format!("{} has the highest rating ({high})", best.name),
            "Learn from top performer strategies",
        )],
        _ => Vec::new(),
    }
}

fn valid_ratings(reviews: &[Review]) -> impl Iterator<Item = f64> + '_ {
    reviews.iter().filter_map(valid_rating)
}

fn valid_rating(review: &Review) -> Option<f64> {
    review
        .rating
        .filter(|r| revhub_core::rating::in_range(*r, revhub_core::rating::CANONICAL_MAX))
}

fn approved_count(reviews: &[Review]) -> usize {
    reviews.iter().filter(|r| r.approved).count()
}

fn mean(values: impl Iterator<Item = f64>) -> f64 {
    let (sum, n) = values.fold((0.0, 0usize), |(s, n), v| (s + v, n + 1));
    if n == 0 {
        0.0
    } else {
        sum / n as f64
    }
}

fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

fn percent(part: usize, whole: usize) -> u32 {
    if whole == 0 {
        0
    } else {
        (part as f64 / whole as f64 * 100.0).round() as u32
    }
}

fn category_stats(reviews: &[Review]) -> Vec<CategoryStat> {
    Category::REPORTED
        .iter()
        .map(|category| {
            let values: Vec<f64> = reviews
                .iter()
                .filter_map(|r| r.categories.as_ref()?.get(category).copied())
                .collect();
            CategoryStat {
                category: *category,
                average_rating: round1(mean(values.iter().copied())),
                review_count: values.len(),
            }
        })
        .collect()
}

fn monthly_stats(reviews: &[Review]) -> Vec<MonthlyStat> {
    let mut months: BTreeMap<String, Vec<&Review>> = BTreeMap::new();
    for review in reviews {
        months
            .entry(review.submitted_at.format("%Y-%m").to_string())
            .or_default()
            .push(review);
    }
    months
        .into_iter()
        .map(|(month, group)| {
            let rated: Vec<f64> = group.iter().filter_map(|r| r.rating).collect();
            let approved = group.iter().filter(|r| r.approved).count();
            MonthlyStat {
                month,
                review_count: group.len(),
                average_rating: round1(mean(rated.into_iter())),
                approval_rate: percent(approved, group.len()),
            }
        })
        .collect()
}

fn trends(reviews: &[Review]) -> Trends {
    if reviews.len() < 2 {
        return Trends {
            rating: Trend::Stable,
            volume: Trend::Stable,
            approval: Trend::Stable,
        };
    }
    let mut ordered: Vec<&Review> = reviews.iter().collect();
    ordered.sort_by(|a, b| b.submitted_at.cmp(&a.submitted_at));
    let (recent, older) = ordered.split_at(reviews.len().div_ceil(2));

    let avg = |half: &[&Review]| mean(half.iter().filter_map(|r| r.rating));
    let rate = |half: &[&Review]| half.iter().filter(|r| r.approved).count() as f64 / half.len() as f64;

    Trends {
        rating: direction(avg(recent), avg(older)),
        volume: direction(recent.len() as f64, older.len() as f64),
        approval: direction(rate(recent), rate(older)),
    }
}

fn direction(recent: f64, older: f64) -> Trend {
    if recent > older {
        Trend::Up
    } else if recent < older {
        Trend::Down
    } else {
        Trend::Stable
    }
}
