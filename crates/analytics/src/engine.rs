use crate::report::PerformanceSummary;
use chrono::NaiveDate;
use core_types::SeriesPoint;
use protocol::codec::{PORTFOLIO_VALUE_FIELD, VALUE_FIELD};
use rust_decimal::Decimal;

/// A stateless calculator for deriving headline metrics from a performance series.
#[derive(Debug, Default)]
pub struct AnalyticsEngine {}

impl AnalyticsEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Picks the field a summary should be computed from when the caller
    /// has no preference: `portfolioValue` for structured streams, `val`
    /// for bare-text ones.
    pub fn default_field(points: &[SeriesPoint]) -> Option<&'static str> {
        [PORTFOLIO_VALUE_FIELD, VALUE_FIELD]
            .into_iter()
            .find(|field| points.iter().any(|p| p.fields.contains_key(*field)))
    }

    /// Summarises `field` over `points`.
    ///
    /// # Returns
    ///
    /// `None` if no point carries the field (including an empty series).
    pub fn summarize(&self, points: &[SeriesPoint], field: Option<&str>) -> Option<PerformanceSummary> {
        let field = match field {
            Some(field) => field,
            None => Self::default_field(points)?,
        };

        let curve: Vec<(NaiveDate, Decimal)> = points
            .iter()
            .filter_map(|p| p.get(field).map(|v| (p.date, v)))
            .collect();
        let (&(first_date, first_value), &(last_date, last_value)) =
            (curve.first()?, curve.last()?);

        let change = last_value - first_value;
        let total_return_pct = if first_value.is_zero() {
            None
        } else {
            Some(change / first_value * Decimal::from(100))
        };

        let (peak_value, max_drawdown, drawdown_peak) = Self::calculate_drawdown(&curve);
        let max_drawdown_pct = if drawdown_peak > Decimal::ZERO {
            Some(max_drawdown / drawdown_peak * Decimal::from(100))
        } else {
            None
        };

        Some(PerformanceSummary {
            field: field.to_string(),
            points: curve.len(),
            first_date,
            last_date,
            first_value,
            last_value,
            change,
            total_return_pct,
            peak_value,
            max_drawdown,
            max_drawdown_pct,
        })
    }

    /// Returns `(overall peak, max drawdown, peak the max drawdown was measured from)`.
    fn calculate_drawdown(curve: &[(NaiveDate, Decimal)]) -> (Decimal, Decimal, Decimal) {
        let mut peak = curve[0].1;
        let mut max_drawdown = Decimal::ZERO;
        let mut drawdown_peak = peak;

        for &(_date, value) in curve {
            if value > peak {
                peak = value;
            }
            let drawdown = peak - value;
            if drawdown > max_drawdown {
                max_drawdown = drawdown;
                drawdown_peak = peak;
            }
        }

        (peak, max_drawdown, drawdown_peak)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use std::collections::BTreeMap;

    fn series(field: &str, values: &[Decimal]) -> Vec<SeriesPoint> {
        let start = NaiveDate::from_ymd_opt(2021, 6, 1).unwrap();
        values
            .iter()
            .enumerate()
            .map(|(i, v)| SeriesPoint {
                date: start + chrono::Days::new(i as u64),
                fields: BTreeMap::from([(field.to_string(), *v)]),
            })
            .collect()
    }

    #[test]
    fn summarizes_return_and_drawdown() {
        let points = series("portfolioValue", &[dec!(100), dec!(120), dec!(90), dec!(110)]);
        let summary = AnalyticsEngine::new().summarize(&points, None).unwrap();

        assert_eq!(summary.field, "portfolioValue");
        assert_eq!(summary.points, 4);
        assert_eq!(summary.change, dec!(10));
        assert_eq!(summary.total_return_pct, Some(dec!(10)));
        assert_eq!(summary.peak_value, dec!(120));
        assert_eq!(summary.max_drawdown, dec!(30));
        assert_eq!(summary.max_drawdown_pct, Some(dec!(25)));
        assert_eq!(summary.last_date, NaiveDate::from_ymd_opt(2021, 6, 4).unwrap());
    }

    #[test]
    fn falls_back_to_bare_value_field() {
        let points = series("val", &[dec!(100), dec!(105)]);
        let summary = AnalyticsEngine::new().summarize(&points, None).unwrap();
        assert_eq!(summary.field, "val");
        assert_eq!(summary.max_drawdown, Decimal::ZERO);
        assert_eq!(summary.max_drawdown_pct, Some(Decimal::ZERO));
    }

    #[test]
    fn empty_or_missing_field_has_no_summary() {
        let engine = AnalyticsEngine::new();
        assert!(engine.summarize(&[], None).is_none());
        let points = series("val", &[dec!(1)]);
        assert!(engine.summarize(&points, Some("pnl")).is_none());
    }

    #[test]
    fn zero_start_has_no_return_pct() {
        let points = series("pnl", &[dec!(0), dec!(5)]);
        let summary = AnalyticsEngine::new().summarize(&points, Some("pnl")).unwrap();
        assert_eq!(summary.total_return_pct, None);
        assert_eq!(summary.change, dec!(5));
    }
}
