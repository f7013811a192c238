use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Headline metrics for one field of a performance series.
///
/// This struct is the final output of the `AnalyticsEngine` and is what the
/// command line prints once a run finishes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerformanceSummary {
    /// The series field the metrics were computed from.
    pub field: String,
    pub points: usize,
    pub first_date: NaiveDate,
    pub last_date: NaiveDate,

    // I. Profitability
    pub first_value: Decimal,
    pub last_value: Decimal,
    pub change: Decimal,
    pub total_return_pct: Option<Decimal>, // Option<> because the first value can be 0

    // II. Risk and Drawdown
    pub peak_value: Decimal,
    pub max_drawdown: Decimal,
    pub max_drawdown_pct: Option<Decimal>, // Option<> for a non-positive peak
}
