//! Shared domain enumerations and source records for the rollup pipeline.

use chrono::{DateTime, Datelike, Days, NaiveDate, Utc};

use crate::domain::error::DomainError;

/// The six post categories recognized by the source schema.
///
/// Categories arrive as numeric codes; anything outside `1..=6` is a schema
/// mismatch and must abort the run rather than be coerced or dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Category {
    Ontopic,
    Nws,
    Stupid,
    Political,
    Tangent,
    Informative,
}

impl Category {
    pub const ALL: [Category; 6] = [
        Category::Ontopic,
        Category::Nws,
        Category::Stupid,
        Category::Political,
        Category::Tangent,
        Category::Informative,
    ];

    pub fn from_code(code: i16) -> Result<Self, DomainError> {
        match code {
            1 => Ok(Category::Ontopic),
            2 => Ok(Category::Nws),
            3 => Ok(Category::Stupid),
            4 => Ok(Category::Political),
            5 => Ok(Category::Tangent),
            6 => Ok(Category::Informative),
            _ => Err(DomainError::UnrecognizedCategory { code }),
        }
    }

    pub fn code(self) -> i16 {
        match self {
            Category::Ontopic => 1,
            Category::Nws => 2,
            Category::Stupid => 3,
            Category::Political => 4,
            Category::Tangent => 5,
            Category::Informative => 6,
        }
    }
}

/// Calendar bucket width for period truncation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Granularity {
    Day,
    Week,
    Month,
    Year,
}

impl Granularity {
    pub const ALL: [Granularity; 4] = [
        Granularity::Day,
        Granularity::Week,
        Granularity::Month,
        Granularity::Year,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Granularity::Day => "day",
            Granularity::Week => "week",
            Granularity::Month => "month",
            Granularity::Year => "year",
        }
    }
}

/// One concrete calendar bucket: a granularity plus its aligned start date.
///
/// Weeks start on Monday. Month and year periods always start on the first
/// of the month and January 1 respectively, so successor arithmetic never
/// has to renormalize a day-of-month.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Period {
    granularity: Granularity,
    start: NaiveDate,
}

impl Period {
    /// The period of `granularity` containing the civil date `date`.
    pub fn containing(granularity: Granularity, date: NaiveDate) -> Self {
        let start = match granularity {
            Granularity::Day => date,
            Granularity::Week => date
                .checked_sub_days(Days::new(u64::from(date.weekday().num_days_from_monday())))
                .expect("week start within calendar range"),
            Granularity::Month => NaiveDate::from_ymd_opt(date.year(), date.month(), 1)
                .expect("first of month is a valid date"),
            Granularity::Year => {
                NaiveDate::from_ymd_opt(date.year(), 1, 1).expect("January 1 is a valid date")
            }
        };
        Self { granularity, start }
    }

    pub fn granularity(&self) -> Granularity {
        self.granularity
    }

    pub fn start(&self) -> NaiveDate {
        self.start
    }

    /// The immediately following period of the same granularity.
    pub fn next(&self) -> Self {
        let start = match self.granularity {
            Granularity::Day => self.start.succ_opt().expect("successor day within range"),
            Granularity::Week => self
                .start
                .checked_add_days(Days::new(7))
                .expect("successor week within range"),
            Granularity::Month => {
                let (year, month) = if self.start.month() == 12 {
                    (self.start.year() + 1, 1)
                } else {
                    (self.start.year(), self.start.month() + 1)
                };
                NaiveDate::from_ymd_opt(year, month, 1).expect("first of month is a valid date")
            }
            Granularity::Year => NaiveDate::from_ymd_opt(self.start.year() + 1, 1, 1)
                .expect("January 1 is a valid date"),
        };
        Self {
            granularity: self.granularity,
            start,
        }
    }

    /// Human-readable period key used in the `period` CSV column.
    pub fn label(&self) -> String {
        match self.granularity {
            Granularity::Day | Granularity::Week => self.start.format("%Y-%m-%d").to_string(),
            Granularity::Month => self.start.format("%Y-%m").to_string(),
            Granularity::Year => self.start.format("%Y").to_string(),
        }
    }

    /// Compact `YYYYMMDD` stamp used in per-period artifact names.
    pub fn stamp(&self) -> String {
        self.start.format("%Y%m%d").to_string()
    }
}

/// One distinct author as reported by the event source, ordered by the
/// author's first-ever event.
#[derive(Debug, Clone)]
pub struct AuthorRecord {
    pub key: String,
    pub display_name: String,
    pub first_post_id: u64,
    pub first_post_at: DateTime<Utc>,
    pub post_count: u64,
}

/// One raw event row streamed from the source. The category is kept as the
/// raw wire code so decoding (and its failure mode) stays in the pipeline.
#[derive(Debug, Clone)]
pub struct EventRecord {
    pub author_key: String,
    pub posted_at: DateTime<Utc>,
    pub category: i16,
}
