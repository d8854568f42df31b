//! Calendar model: canonical period sequences and gap filling.
//!
//! Every published time series must be calendar-contiguous. A day with no
//! posts is a zero row, not a missing row, or charts downstream would
//! silently skip it.

use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, Utc};
use chrono_tz::Tz;

use crate::domain::types::{Granularity, Period};

/// Convert a UTC instant to its civil date in the source time zone.
///
/// Truncation to period boundaries must happen on this civil date; truncating
/// the UTC instant would shift day and week boundaries for events near
/// midnight.
pub fn civil_date(instant: DateTime<Utc>, zone: Tz) -> NaiveDate {
    instant.with_timezone(&zone).date_naive()
}

/// The ordered sequence of periods of `granularity` intersecting `[from, to]`.
///
/// The first period is the one containing `from` (its start may precede
/// `from`); the last is the one containing `to`. An inverted range yields
/// nothing.
pub fn periods_of(granularity: Granularity, from: NaiveDate, to: NaiveDate) -> Vec<Period> {
    let mut periods = Vec::new();
    if from > to {
        return periods;
    }
    let mut period = Period::containing(granularity, from);
    while period.start() <= to {
        periods.push(period);
        period = period.next();
    }
    periods
}

/// Densify a sparse series keyed by period start over `[from, to]`.
///
/// Every period produced by [`periods_of`] appears exactly once, in ascending
/// order; periods absent from `series` are synthesized with `zero`.
pub fn fill_gaps<T>(
    mut series: BTreeMap<NaiveDate, T>,
    granularity: Granularity,
    from: NaiveDate,
    to: NaiveDate,
    zero: impl Fn(Period) -> T,
) -> Vec<(Period, T)> {
    periods_of(granularity, from, to)
        .into_iter()
        .map(|period| {
            let row = series.remove(&period.start()).unwrap_or_else(|| zero(period));
            (period, row)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).expect("valid date")
    }

    #[test]
    fn daily_periods_cover_the_range_inclusively() {
        let periods = periods_of(Granularity::Day, date(2024, 3, 1), date(2024, 3, 5));
        let starts: Vec<_> = periods.iter().map(|p| p.start()).collect();
        assert_eq!(
            starts,
            vec![
                date(2024, 3, 1),
                date(2024, 3, 2),
                date(2024, 3, 3),
                date(2024, 3, 4),
                date(2024, 3, 5),
            ]
        );
    }

    #[test]
    fn first_period_may_start_before_the_range() {
        // 2024-03-01 is a Friday; its week starts Monday 02-26.
        let periods = periods_of(Granularity::Week, date(2024, 3, 1), date(2024, 3, 4));
        let starts: Vec<_> = periods.iter().map(|p| p.start()).collect();
        assert_eq!(starts, vec![date(2024, 2, 26), date(2024, 3, 4)]);
    }

    #[test]
    fn inverted_range_yields_no_periods() {
        assert!(periods_of(Granularity::Day, date(2024, 3, 5), date(2024, 3, 1)).is_empty());
    }

    #[test]
    fn fill_gaps_synthesizes_zero_rows_in_order() {
        let mut series = BTreeMap::new();
        series.insert(date(2024, 3, 1), 3u64);
        series.insert(date(2024, 3, 5), 1u64);

        let dense = fill_gaps(
            series,
            Granularity::Day,
            date(2024, 3, 1),
            date(2024, 3, 5),
            |_| 0,
        );

        assert_eq!(dense.len(), 5);
        let values: Vec<_> = dense.iter().map(|(_, v)| *v).collect();
        assert_eq!(values, vec![3, 0, 0, 0, 1]);
    }

    #[test]
    fn fill_gaps_is_complete_for_every_granularity() {
        for granularity in Granularity::ALL {
            let dense = fill_gaps(
                BTreeMap::<NaiveDate, u64>::new(),
                granularity,
                date(2023, 11, 15),
                date(2024, 2, 10),
                |_| 0,
            );
            let expected = periods_of(granularity, date(2023, 11, 15), date(2024, 2, 10));
            assert_eq!(dense.len(), expected.len());
            for ((period, value), expected) in dense.iter().zip(expected) {
                assert_eq!(*period, expected);
                assert_eq!(*value, 0);
            }
        }
    }

    #[test]
    fn civil_date_shifts_across_midnight() {
        // 2024-03-05 03:30 UTC is still 2024-03-04 in New York.
        let instant = Utc.with_ymd_and_hms(2024, 3, 5, 3, 30, 0).unwrap();
        assert_eq!(
            civil_date(instant, chrono_tz::America::New_York),
            date(2024, 3, 4)
        );
        assert_eq!(civil_date(instant, chrono_tz::UTC), date(2024, 3, 5));
    }
}
