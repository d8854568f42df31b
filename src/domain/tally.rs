//! Category tallies and the single-pass rollup ledger.
//!
//! The ledger consumes the event stream once and maintains accumulators for
//! all four granularities at the same time: global tallies, per-author
//! tallies, and distinct-poster sets. Series extraction gap-fills through the
//! calendar model so every published series is calendar-contiguous.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, NaiveDate, Utc};
use chrono_tz::Tz;

use crate::domain::calendar::{civil_date, fill_gaps};
use crate::domain::identity::AuthorDirectory;
use crate::domain::types::{Category, Granularity, Period};

/// Per-category counters for one period bucket.
///
/// The only mutations are [`CategoryTally::record`] and
/// [`CategoryTally::merge`], so `total()` is the category sum by
/// construction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CategoryTally {
    counts: [u64; 6],
}

impl CategoryTally {
    pub fn record(&mut self, category: Category) {
        self.counts[category as usize] += 1;
    }

    pub fn merge(&mut self, other: &CategoryTally) {
        for (slot, add) in self.counts.iter_mut().zip(other.counts) {
            *slot += add;
        }
    }

    pub fn count(&self, category: Category) -> u64 {
        self.counts[category as usize]
    }

    pub fn total(&self) -> u64 {
        self.counts.iter().sum()
    }
}

/// One value per granularity.
#[derive(Debug, Clone, Default)]
struct PerGranularity<T> {
    day: T,
    week: T,
    month: T,
    year: T,
}

impl<T> PerGranularity<T> {
    fn get(&self, granularity: Granularity) -> &T {
        match granularity {
            Granularity::Day => &self.day,
            Granularity::Week => &self.week,
            Granularity::Month => &self.month,
            Granularity::Year => &self.year,
        }
    }

    fn get_mut(&mut self, granularity: Granularity) -> &mut T {
        match granularity {
            Granularity::Day => &mut self.day,
            Granularity::Week => &mut self.week,
            Granularity::Month => &mut self.month,
            Granularity::Year => &mut self.year,
        }
    }
}

type TallySeries = BTreeMap<NaiveDate, CategoryTally>;

/// Accumulated rollup state for one run.
///
/// Scoped to a single run object; nothing here survives between runs.
pub struct RollupLedger {
    zone: Tz,
    epoch_start: NaiveDate,
    today: NaiveDate,
    events_seen: u64,
    global: PerGranularity<TallySeries>,
    authors: Vec<PerGranularity<TallySeries>>,
    posters: PerGranularity<BTreeMap<NaiveDate, BTreeSet<usize>>>,
}

impl RollupLedger {
    pub fn new(zone: Tz, epoch_start: NaiveDate, today: NaiveDate, author_count: usize) -> Self {
        let mut authors = Vec::with_capacity(author_count);
        authors.resize_with(author_count, PerGranularity::default);
        Self {
            zone,
            epoch_start,
            today,
            events_seen: 0,
            global: PerGranularity::default(),
            authors,
            posters: PerGranularity::default(),
        }
    }

    pub fn zone(&self) -> Tz {
        self.zone
    }

    pub fn epoch_start(&self) -> NaiveDate {
        self.epoch_start
    }

    pub fn today(&self) -> NaiveDate {
        self.today
    }

    pub fn events_seen(&self) -> u64 {
        self.events_seen
    }

    /// Fold one event into every granularity bucket it belongs to.
    pub fn observe(&mut self, author_index: usize, posted_at: DateTime<Utc>, category: Category) {
        let date = civil_date(posted_at, self.zone);
        for granularity in Granularity::ALL {
            let start = Period::containing(granularity, date).start();
            self.global
                .get_mut(granularity)
                .entry(start)
                .or_default()
                .record(category);
            self.authors[author_index]
                .get_mut(granularity)
                .entry(start)
                .or_default()
                .record(category);
            self.posters
                .get_mut(granularity)
                .entry(start)
                .or_default()
                .insert(author_index);
        }
        self.events_seen += 1;
    }

    /// The global series, gap-filled over the full epoch→today range.
    pub fn global_series(&self, granularity: Granularity) -> Vec<(Period, CategoryTally)> {
        fill_gaps(
            self.global.get(granularity).clone(),
            granularity,
            self.epoch_start,
            self.today,
            |_| CategoryTally::default(),
        )
    }

    /// One author's series, gap-filled over that author's own first→last
    /// active range. Empty when the author produced no events.
    pub fn author_series(
        &self,
        granularity: Granularity,
        author_index: usize,
    ) -> Vec<(Period, CategoryTally)> {
        let series = self.authors[author_index].get(granularity);
        let (Some(first), Some(last)) = (series.keys().next(), series.keys().next_back()) else {
            return Vec::new();
        };
        fill_gaps(series.clone(), granularity, *first, *last, |_| {
            CategoryTally::default()
        })
    }

    /// Distinct active authors per period, gap-filled over epoch→today.
    pub fn poster_counts(&self, granularity: Granularity) -> Vec<(Period, u64)> {
        let counts: BTreeMap<NaiveDate, u64> = self
            .posters
            .get(granularity)
            .iter()
            .map(|(start, set)| (*start, set.len() as u64))
            .collect();
        fill_gaps(counts, granularity, self.epoch_start, self.today, |_| 0)
    }

    /// The authors active in one period instance with their tallies, in
    /// author-index order. Empty when nobody posted that period.
    pub fn active_authors(&self, period: Period) -> Vec<(usize, CategoryTally)> {
        let Some(active) = self.posters.get(period.granularity()).get(&period.start()) else {
            return Vec::new();
        };
        active
            .iter()
            .filter_map(|&index| {
                self.authors[index]
                    .get(period.granularity())
                    .get(&period.start())
                    .map(|tally| (index, *tally))
            })
            .collect()
    }
}

/// Authors whose first-ever post falls in each period, counting only authors
/// with at least `min_posts` total posts; gap-filled over epoch→today.
pub fn new_poster_counts(
    directory: &AuthorDirectory,
    zone: Tz,
    granularity: Granularity,
    epoch_start: NaiveDate,
    today: NaiveDate,
    min_posts: u64,
) -> Vec<(Period, u64)> {
    let mut counts: BTreeMap<NaiveDate, u64> = BTreeMap::new();
    for author in directory.authors() {
        if author.record.post_count < min_posts {
            continue;
        }
        let date = civil_date(author.record.first_post_at, zone);
        let start = Period::containing(granularity, date).start();
        *counts.entry(start).or_default() += 1;
    }
    fill_gaps(counts, granularity, epoch_start, today, |_| 0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::types::AuthorRecord;
    use chrono::TimeZone;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).expect("valid date")
    }

    fn instant(y: i32, m: u32, d: u32, h: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, h, 0, 0).unwrap()
    }

    fn ledger(author_count: usize) -> RollupLedger {
        RollupLedger::new(
            chrono_tz::UTC,
            date(2024, 3, 1),
            date(2024, 3, 10),
            author_count,
        )
    }

    #[test]
    fn totals_equal_the_category_sum() {
        let mut book = ledger(1);
        book.observe(0, instant(2024, 3, 4, 12), Category::Ontopic);
        book.observe(0, instant(2024, 3, 4, 13), Category::Ontopic);
        book.observe(0, instant(2024, 3, 4, 14), Category::Tangent);

        let series = book.global_series(Granularity::Day);
        for (_, tally) in &series {
            let sum: u64 = Category::ALL.iter().map(|c| tally.count(*c)).sum();
            assert_eq!(tally.total(), sum);
        }
        let (_, day) = series[3];
        assert_eq!(day.total(), 3);
        assert_eq!(day.count(Category::Ontopic), 2);
        assert_eq!(day.count(Category::Tangent), 1);
    }

    #[test]
    fn global_series_spans_epoch_to_today_even_when_empty() {
        let book = ledger(0);
        let series = book.global_series(Granularity::Day);
        assert_eq!(series.len(), 10);
        assert!(series.iter().all(|(_, tally)| tally.total() == 0));
    }

    #[test]
    fn author_series_is_bounded_by_own_activity() {
        let mut book = ledger(2);
        book.observe(0, instant(2024, 3, 3, 9), Category::Stupid);
        book.observe(0, instant(2024, 3, 6, 9), Category::Nws);
        book.observe(1, instant(2024, 3, 1, 9), Category::Political);

        let series = book.author_series(Granularity::Day, 0);
        assert_eq!(series.len(), 4);
        assert_eq!(series[0].0.start(), date(2024, 3, 3));
        assert_eq!(series[3].0.start(), date(2024, 3, 6));
        assert_eq!(series[1].1.total(), 0);

        let series = book.author_series(Granularity::Day, 1);
        assert_eq!(series.len(), 1);
    }

    #[test]
    fn author_with_no_events_has_an_empty_series() {
        let book = ledger(1);
        assert!(book.author_series(Granularity::Day, 0).is_empty());
    }

    #[test]
    fn events_bucket_by_civil_date_not_utc() {
        let mut book = RollupLedger::new(
            chrono_tz::America::New_York,
            date(2024, 3, 1),
            date(2024, 3, 10),
            1,
        );
        // 03:30 UTC on the 5th is 22:30 on the 4th in New York.
        book.observe(0, instant(2024, 3, 5, 3), Category::Ontopic);

        let series = book.global_series(Granularity::Day);
        let march_4 = series
            .iter()
            .find(|(p, _)| p.start() == date(2024, 3, 4))
            .expect("march 4 present");
        assert_eq!(march_4.1.total(), 1);
        let march_5 = series
            .iter()
            .find(|(p, _)| p.start() == date(2024, 3, 5))
            .expect("march 5 present");
        assert_eq!(march_5.1.total(), 0);
    }

    #[test]
    fn poster_counts_are_distinct_per_period() {
        let mut book = ledger(2);
        book.observe(0, instant(2024, 3, 4, 9), Category::Ontopic);
        book.observe(0, instant(2024, 3, 4, 10), Category::Ontopic);
        book.observe(1, instant(2024, 3, 4, 11), Category::Nws);

        let counts = book.poster_counts(Granularity::Day);
        let march_4 = counts
            .iter()
            .find(|(p, _)| p.start() == date(2024, 3, 4))
            .expect("march 4 present");
        assert_eq!(march_4.1, 2);
        assert_eq!(counts.len(), 10);
    }

    #[test]
    fn active_authors_reports_only_that_period() {
        let mut book = ledger(2);
        book.observe(0, instant(2024, 3, 4, 9), Category::Ontopic);
        book.observe(1, instant(2024, 3, 5, 9), Category::Nws);

        let period = Period::containing(Granularity::Day, date(2024, 3, 4));
        let active = book.active_authors(period);
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].0, 0);

        let empty = Period::containing(Granularity::Day, date(2024, 3, 9));
        assert!(book.active_authors(empty).is_empty());
    }

    #[test]
    fn new_poster_counts_respect_the_activity_threshold() {
        let records = vec![
            AuthorRecord {
                key: "u1".into(),
                display_name: "prolific".into(),
                first_post_id: 1,
                first_post_at: instant(2024, 3, 2, 9),
                post_count: 25,
            },
            AuthorRecord {
                key: "u2".into(),
                display_name: "drive-by".into(),
                first_post_id: 2,
                first_post_at: instant(2024, 3, 2, 10),
                post_count: 1,
            },
        ];
        let directory = AuthorDirectory::assign(records);

        let all = new_poster_counts(
            &directory,
            chrono_tz::UTC,
            Granularity::Day,
            date(2024, 3, 1),
            date(2024, 3, 10),
            1,
        );
        let march_2 = all.iter().find(|(p, _)| p.start() == date(2024, 3, 2));
        assert_eq!(march_2.map(|(_, n)| *n), Some(2));

        let active = new_poster_counts(
            &directory,
            chrono_tz::UTC,
            Granularity::Day,
            date(2024, 3, 1),
            date(2024, 3, 10),
            10,
        );
        let march_2 = active.iter().find(|(p, _)| p.start() == date(2024, 3, 2));
        assert_eq!(march_2.map(|(_, n)| *n), Some(1));
    }
}
