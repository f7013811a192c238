use crate::error::SeriesError;
use chrono::{Days, NaiveDate};
use core_types::SeriesPoint;
use protocol::DataPoint;

/// Folds decoded data frames into an ordered, date-indexed series.
///
/// Points are only ever appended. Dates strictly increase: a frame without a
/// date lands one day after the previous point (or after the origin for the
/// first point), and a frame with a date must be later than the last one.
#[derive(Debug, Clone, Default)]
pub struct SeriesAccumulator {
    origin: Option<NaiveDate>,
    title: Option<String>,
    axis_label: Option<String>,
    points: Vec<SeriesPoint>,
}

impl SeriesAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Clears the series and records the origin. The first implicit point
    /// will be dated `origin + 1 day`.
    pub fn reset(&mut self, origin: NaiveDate, title: Option<String>, axis_label: Option<String>) {
        self.origin = Some(origin);
        self.title = title;
        self.axis_label = axis_label;
        self.points.clear();
    }

    /// Places `point` on the date axis and appends it.
    pub fn append(&mut self, point: DataPoint) -> Result<SeriesPoint, SeriesError> {
        let last = self.last_date();
        let date = match (point.date, last) {
            (Some(date), Some(last)) if date <= last => {
                return Err(SeriesError::OutOfOrder { last, got: date });
            }
            (Some(date), _) => date,
            (None, Some(last)) => last
                .checked_add_days(Days::new(1))
                .ok_or(SeriesError::DateOverflow(last))?,
            (None, None) => return Err(SeriesError::NoOrigin),
        };

        let series_point = SeriesPoint {
            date,
            fields: point.fields,
        };
        self.points.push(series_point.clone());
        Ok(series_point)
    }

    /// Read-only view of every point appended so far.
    pub fn snapshot(&self) -> &[SeriesPoint] {
        &self.points
    }

    pub fn origin(&self) -> Option<NaiveDate> {
        self.origin
    }

    pub fn title(&self) -> Option<&str> {
        self.title.as_deref()
    }

    pub fn axis_label(&self) -> Option<&str> {
        self.axis_label.as_deref()
    }

    pub fn last(&self) -> Option<&SeriesPoint> {
        self.points.last()
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    fn last_date(&self) -> Option<NaiveDate> {
        self.points.last().map(|p| p.date).or(self.origin)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;
    use std::collections::BTreeMap;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn implicit(val: Decimal) -> DataPoint {
        DataPoint::value(val)
    }

    fn dated(on: NaiveDate, val: Decimal) -> DataPoint {
        DataPoint {
            date: Some(on),
            fields: BTreeMap::from([("val".to_string(), val)]),
        }
    }

    #[test]
    fn implicit_points_advance_one_day_each() {
        let mut acc = SeriesAccumulator::new();
        acc.reset(date(2020, 1, 1), None, None);
        for i in 0..40 {
            acc.append(implicit(Decimal::from(i))).unwrap();
        }

        let snapshot = acc.snapshot();
        assert_eq!(snapshot.len(), 40);
        assert_eq!(snapshot[0].date, date(2020, 1, 2));
        for pair in snapshot.windows(2) {
            assert_eq!(pair[0].date.succ_opt().unwrap(), pair[1].date);
        }
        // Crosses the month boundary.
        assert_eq!(snapshot[39].date, date(2020, 2, 10));
    }

    #[test]
    fn explicit_dates_must_increase() {
        let mut acc = SeriesAccumulator::new();
        acc.reset(date(2021, 6, 1), None, None);
        acc.append(dated(date(2021, 6, 3), dec!(1))).unwrap();

        let err = acc.append(dated(date(2021, 6, 3), dec!(2))).unwrap_err();
        assert_eq!(
            err,
            SeriesError::OutOfOrder {
                last: date(2021, 6, 3),
                got: date(2021, 6, 3)
            }
        );
        assert!(acc.append(dated(date(2021, 5, 1), dec!(2))).is_err());
        assert_eq!(acc.len(), 1);

        // An implicit point continues from the last explicit one.
        let next = acc.append(implicit(dec!(3))).unwrap();
        assert_eq!(next.date, date(2021, 6, 4));

        // Earlier points are never rewritten by later appends.
        let seen = acc.snapshot().to_vec();
        acc.append(implicit(dec!(4))).unwrap();
        assert_eq!(&acc.snapshot()[..seen.len()], seen.as_slice());
    }

    #[test]
    fn explicit_date_cannot_precede_origin() {
        let mut acc = SeriesAccumulator::new();
        acc.reset(date(2021, 6, 1), None, None);
        assert!(matches!(
            acc.append(dated(date(2021, 6, 1), dec!(1))),
            Err(SeriesError::OutOfOrder { .. })
        ));
    }

    #[test]
    fn implicit_point_without_origin_fails() {
        let mut acc = SeriesAccumulator::new();
        assert_eq!(acc.append(implicit(dec!(1))), Err(SeriesError::NoOrigin));
        // An explicit date needs no origin.
        acc.append(dated(date(2019, 3, 1), dec!(1))).unwrap();
        assert_eq!(acc.len(), 1);
    }

    #[test]
    fn reset_clears_points_and_records_metadata() {
        let mut acc = SeriesAccumulator::new();
        acc.reset(date(2020, 1, 1), None, None);
        acc.append(implicit(dec!(1))).unwrap();

        acc.reset(
            date(2012, 1, 1),
            Some("Performance".to_string()),
            Some("Date".to_string()),
        );
        assert!(acc.is_empty());
        assert_eq!(acc.title(), Some("Performance"));
        assert_eq!(acc.axis_label(), Some("Date"));
        assert_eq!(acc.origin(), Some(date(2012, 1, 1)));
        assert!(acc.last().is_none());
    }
}
