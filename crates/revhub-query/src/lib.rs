//! Read side and moderation: review listings, the approval gate,
//! per-listing statistics and portfolio analytics.

mod approval;
mod params;
mod service;
mod stats;

pub use approval::{
    ApprovalChange, ApprovalGate, CredentialCheck, CredentialVerifier, SharedSecretVerifier,
};
pub use params::{ComparisonParams, ReviewQueryParams, TrendParams};
pub use service::{ReviewListing, ReviewQueryService};
pub use stats::{
    analytics_insights, analytics_overview, property_comparison, property_performance,
    property_summaries, property_trends, AnalyticsInsights, AnalyticsOverview, ApprovalPoint,
    CategoryStat, ComparedProperty, ComparisonMetrics, Insight, InsightKind, MonthlyStat,
    OverviewSummary, PerformerStat, Priority, PropertyComparison, PropertyMetrics,
    PropertyPerformance, PropertyRef, PropertySummary, PropertyTrends, RatingBucket,
    Recommendation, Trend, TrendPeriod, Trends, VolumePoint, WindowStat,
};
