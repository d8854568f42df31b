//! Artifact partitioner: slices rollup output into the file-per-entity
//! layout the publish step expects.
//!
//! File names are stable dashboard contracts; changing one breaks consumers
//! that probe for existence rather than content.

use bytes::Bytes;
use chrono::SecondsFormat;

use crate::domain::calendar::periods_of;
use crate::domain::identity::AuthorDirectory;
use crate::domain::tally::{self, CategoryTally, RollupLedger};
use crate::domain::types::{Category, Granularity, Period};
use crate::util::csv::{CsvValue, CsvWriter};

/// One output file, ready to hash and publish.
#[derive(Debug, Clone)]
pub struct Artifact {
    pub name: String,
    pub bytes: Bytes,
}

impl Artifact {
    fn new(name: String, body: String) -> Self {
        Self {
            name,
            bytes: Bytes::from(body),
        }
    }
}

const SERIES_COLUMNS: [&str; 9] = [
    "period",
    "date",
    "total_post_count",
    "ontopic_post_count",
    "nws_post_count",
    "stupid_post_count",
    "political_post_count",
    "tangent_post_count",
    "informative_post_count",
];

const USER_SERIES_COLUMNS: [&str; 10] = [
    "period",
    "date",
    "total_post_count",
    "ontopic_post_count",
    "nws_post_count",
    "stupid_post_count",
    "political_post_count",
    "tangent_post_count",
    "informative_post_count",
    "user_id",
];

const SCOREBOARD_COLUMNS: [&str; 8] = [
    "user_id",
    "total_post_count",
    "ontopic_post_count",
    "nws_post_count",
    "stupid_post_count",
    "political_post_count",
    "tangent_post_count",
    "informative_post_count",
];

/// Build the complete artifact set for one run.
pub fn partition(
    directory: &AuthorDirectory,
    ledger: &RollupLedger,
    activity_threshold: u64,
) -> Vec<Artifact> {
    let mut artifacts = Vec::new();

    artifacts.push(users_artifact(directory));
    artifacts.push(users_info_artifact(directory));

    for granularity in Granularity::ALL {
        artifacts.push(global_series_artifact(ledger, granularity));
        artifacts.extend(author_series_artifacts(directory, ledger, granularity));
        artifacts.extend(scoreboard_artifacts(directory, ledger, granularity));
        artifacts.push(poster_counts_artifact(ledger, granularity));
        artifacts.push(new_poster_counts_artifact(directory, ledger, granularity, 1));
        artifacts.push(new_poster_counts_artifact(
            directory,
            ledger,
            granularity,
            activity_threshold,
        ));
    }

    artifacts
}

fn users_artifact(directory: &AuthorDirectory) -> Artifact {
    let mut writer = CsvWriter::with_header(&["user_id", "username"]);
    for author in directory.authors() {
        writer.record(&[
            CsvValue::Text(&author.short_id),
            CsvValue::Text(&author.record.display_name),
        ]);
    }
    Artifact::new("users.csv".to_string(), writer.finish())
}

fn users_info_artifact(directory: &AuthorDirectory) -> Artifact {
    let mut writer = CsvWriter::with_header(&[
        "user_id",
        "username",
        "first_post_id",
        "first_post_date",
        "post_count",
    ]);
    for author in directory.authors() {
        let first_post_date = author
            .record
            .first_post_at
            .to_rfc3339_opts(SecondsFormat::Secs, true);
        writer.record(&[
            CsvValue::Text(&author.short_id),
            CsvValue::Text(&author.record.display_name),
            CsvValue::Integer(author.record.first_post_id),
            CsvValue::Text(&first_post_date),
            CsvValue::Integer(author.record.post_count),
        ]);
    }
    Artifact::new("users_info.csv".to_string(), writer.finish())
}

fn tally_cells(tally: &CategoryTally) -> [CsvValue<'static>; 7] {
    [
        CsvValue::Integer(tally.total()),
        CsvValue::Integer(tally.count(Category::Ontopic)),
        CsvValue::Integer(tally.count(Category::Nws)),
        CsvValue::Integer(tally.count(Category::Stupid)),
        CsvValue::Integer(tally.count(Category::Political)),
        CsvValue::Integer(tally.count(Category::Tangent)),
        CsvValue::Integer(tally.count(Category::Informative)),
    ]
}

fn write_series_row(writer: &mut CsvWriter, period: Period, tally: &CategoryTally) {
    let label = period.label();
    let date = period.start().format("%Y-%m-%d").to_string();
    let mut cells = vec![CsvValue::Text(&label), CsvValue::Text(&date)];
    cells.extend_from_slice(&tally_cells(tally));
    writer.record(&cells);
}

fn global_series_artifact(ledger: &RollupLedger, granularity: Granularity) -> Artifact {
    let mut writer = CsvWriter::with_header(&SERIES_COLUMNS);
    for (period, tally) in ledger.global_series(granularity) {
        write_series_row(&mut writer, period, &tally);
    }
    Artifact::new(
        format!("{}_post_counts.csv", granularity.as_str()),
        writer.finish(),
    )
}

fn author_series_artifacts(
    directory: &AuthorDirectory,
    ledger: &RollupLedger,
    granularity: Granularity,
) -> Vec<Artifact> {
    let mut artifacts = Vec::new();
    for (index, author) in directory.authors().iter().enumerate() {
        let series = ledger.author_series(granularity, index);
        if series.is_empty() {
            continue;
        }
        let mut writer = CsvWriter::with_header(&USER_SERIES_COLUMNS);
        for (period, tally) in series {
            let label = period.label();
            let date = period.start().format("%Y-%m-%d").to_string();
            let mut cells = vec![CsvValue::Text(&label), CsvValue::Text(&date)];
            cells.extend_from_slice(&tally_cells(&tally));
            cells.push(CsvValue::Text(&author.short_id));
            writer.record(&cells);
        }
        artifacts.push(Artifact::new(
            format!(
                "{}_post_counts_for_user_{}.csv",
                granularity.as_str(),
                author.short_id
            ),
            writer.finish(),
        ));
    }
    artifacts
}

fn scoreboard_artifacts(
    directory: &AuthorDirectory,
    ledger: &RollupLedger,
    granularity: Granularity,
) -> Vec<Artifact> {
    let mut artifacts = Vec::new();
    for period in periods_of(granularity, ledger.epoch_start(), ledger.today()) {
        let mut rows: Vec<(&str, CategoryTally)> = ledger
            .active_authors(period)
            .into_iter()
            .map(|(index, tally)| (directory.get(index).short_id.as_str(), tally))
            .collect();
        rows.sort_by(|a, b| b.1.total().cmp(&a.1.total()).then_with(|| a.0.cmp(b.0)));

        // Zero-event periods still publish a header-only scoreboard:
        // consumers probe for file existence to tell "nobody posted" apart
        // from "period missing".
        let mut writer = CsvWriter::with_header(&SCOREBOARD_COLUMNS);
        for (short_id, tally) in rows {
            let mut cells = vec![CsvValue::Text(short_id)];
            cells.extend_from_slice(&tally_cells(&tally));
            writer.record(&cells);
        }
        artifacts.push(Artifact::new(
            format!(
                "post_counts_by_user_for_{}_{}.csv",
                granularity.as_str(),
                period.stamp()
            ),
            writer.finish(),
        ));
    }
    artifacts
}

fn poster_counts_artifact(ledger: &RollupLedger, granularity: Granularity) -> Artifact {
    let mut writer = CsvWriter::with_header(&["period", "date", "poster_count"]);
    for (period, count) in ledger.poster_counts(granularity) {
        let label = period.label();
        let date = period.start().format("%Y-%m-%d").to_string();
        writer.record(&[
            CsvValue::Text(&label),
            CsvValue::Text(&date),
            CsvValue::Integer(count),
        ]);
    }
    Artifact::new(
        format!("{}_poster_counts.csv", granularity.as_str()),
        writer.finish(),
    )
}

fn new_poster_counts_artifact(
    directory: &AuthorDirectory,
    ledger: &RollupLedger,
    granularity: Granularity,
    min_posts: u64,
) -> Artifact {
    let counts = tally::new_poster_counts(
        directory,
        ledger.zone(),
        granularity,
        ledger.epoch_start(),
        ledger.today(),
        min_posts,
    );
    let mut writer = CsvWriter::with_header(&["period", "date", "new_poster_count"]);
    for (period, count) in counts {
        let label = period.label();
        let date = period.start().format("%Y-%m-%d").to_string();
        writer.record(&[
            CsvValue::Text(&label),
            CsvValue::Text(&date),
            CsvValue::Integer(count),
        ]);
    }
    let name = if min_posts > 1 {
        format!(
            "{}_new_{}plus_poster_counts.csv",
            granularity.as_str(),
            min_posts
        )
    } else {
        format!("{}_new_poster_counts.csv", granularity.as_str())
    };
    Artifact::new(name, writer.finish())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::types::{AuthorRecord, Category};
    use crate::util::csv;
    use chrono::{NaiveDate, TimeZone, Utc};

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).expect("valid date")
    }

    fn fixture() -> (AuthorDirectory, RollupLedger) {
        let directory = AuthorDirectory::assign(vec![
            AuthorRecord {
                key: "u1".into(),
                display_name: "Bob".into(),
                first_post_id: 1,
                first_post_at: Utc.with_ymd_and_hms(2024, 3, 1, 9, 0, 0).unwrap(),
                post_count: 3,
            },
            AuthorRecord {
                key: "u2".into(),
                display_name: "bob99".into(),
                first_post_id: 5,
                first_post_at: Utc.with_ymd_and_hms(2024, 3, 2, 9, 0, 0).unwrap(),
                post_count: 1,
            },
        ]);

        let mut ledger = RollupLedger::new(chrono_tz::UTC, date(2024, 3, 1), date(2024, 3, 5), 2);
        let bob = directory.index_of("u1").unwrap();
        let bob99 = directory.index_of("u2").unwrap();
        ledger.observe(
            bob,
            Utc.with_ymd_and_hms(2024, 3, 1, 9, 0, 0).unwrap(),
            Category::Ontopic,
        );
        ledger.observe(
            bob,
            Utc.with_ymd_and_hms(2024, 3, 1, 10, 0, 0).unwrap(),
            Category::Stupid,
        );
        ledger.observe(
            bob,
            Utc.with_ymd_and_hms(2024, 3, 5, 10, 0, 0).unwrap(),
            Category::Ontopic,
        );
        ledger.observe(
            bob99,
            Utc.with_ymd_and_hms(2024, 3, 2, 9, 0, 0).unwrap(),
            Category::Political,
        );
        (directory, ledger)
    }

    fn find<'a>(artifacts: &'a [Artifact], name: &str) -> &'a Artifact {
        artifacts
            .iter()
            .find(|a| a.name == name)
            .unwrap_or_else(|| panic!("artifact `{name}` missing"))
    }

    #[test]
    fn partition_emits_the_full_artifact_family() {
        let (directory, ledger) = fixture();
        let artifacts = partition(&directory, &ledger, 10);

        for name in [
            "users.csv",
            "users_info.csv",
            "day_post_counts.csv",
            "week_post_counts.csv",
            "month_post_counts.csv",
            "year_post_counts.csv",
            "day_post_counts_for_user_bob.csv",
            "day_post_counts_for_user_bob2.csv",
            "day_poster_counts.csv",
            "day_new_poster_counts.csv",
            "day_new_10plus_poster_counts.csv",
            "post_counts_by_user_for_day_20240301.csv",
            "post_counts_by_user_for_week_20240226.csv",
            "post_counts_by_user_for_month_20240301.csv",
            "post_counts_by_user_for_year_20240101.csv",
        ] {
            find(&artifacts, name);
        }
    }

    #[test]
    fn global_daily_series_is_gap_filled() {
        let (directory, ledger) = fixture();
        let artifacts = partition(&directory, &ledger, 10);
        let body = String::from_utf8(find(&artifacts, "day_post_counts.csv").bytes.to_vec())
            .expect("utf8");

        insta::assert_snapshot!(body, @r#"
        "period","date","total_post_count","ontopic_post_count","nws_post_count","stupid_post_count","political_post_count","tangent_post_count","informative_post_count"
        "2024-03-01","2024-03-01",2,1,0,1,0,0,0
        "2024-03-02","2024-03-02",1,0,0,0,1,0,0
        "2024-03-03","2024-03-03",0,0,0,0,0,0,0
        "2024-03-04","2024-03-04",0,0,0,0,0,0,0
        "2024-03-05","2024-03-05",1,1,0,0,0,0,0
        "#);
    }

    #[test]
    fn author_series_covers_only_their_activity_range() {
        let (directory, ledger) = fixture();
        let artifacts = partition(&directory, &ledger, 10);
        let body = String::from_utf8(
            find(&artifacts, "day_post_counts_for_user_bob.csv")
                .bytes
                .to_vec(),
        )
        .expect("utf8");

        let rows = csv::parse(&body).expect("parses");
        // Header plus 2024-03-01 through 2024-03-05.
        assert_eq!(rows.len(), 6);
        assert_eq!(rows[1][0], "2024-03-01");
        assert_eq!(rows[5][0], "2024-03-05");
        assert!(rows.iter().skip(1).all(|row| row[9] == "bob"));

        let bob99 = String::from_utf8(
            find(&artifacts, "day_post_counts_for_user_bob2.csv")
                .bytes
                .to_vec(),
        )
        .expect("utf8");
        assert_eq!(csv::parse(&bob99).expect("parses").len(), 2);
    }

    #[test]
    fn empty_period_scoreboard_is_header_only() {
        let (directory, ledger) = fixture();
        let artifacts = partition(&directory, &ledger, 10);
        let body = String::from_utf8(
            find(&artifacts, "post_counts_by_user_for_day_20240304.csv")
                .bytes
                .to_vec(),
        )
        .expect("utf8");

        let rows = csv::parse(&body).expect("parses");
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0][0], "user_id");
    }

    #[test]
    fn scoreboard_orders_by_total_descending() {
        let (directory, ledger) = fixture();
        let artifacts = partition(&directory, &ledger, 10);
        let body = String::from_utf8(
            find(&artifacts, "post_counts_by_user_for_month_20240301.csv")
                .bytes
                .to_vec(),
        )
        .expect("utf8");

        let rows = csv::parse(&body).expect("parses");
        assert_eq!(rows[1][0], "bob");
        assert_eq!(rows[1][1], "3");
        assert_eq!(rows[2][0], "bob2");
        assert_eq!(rows[2][1], "1");
    }

    #[test]
    fn reparsing_a_series_reproduces_the_ledger() {
        let (directory, ledger) = fixture();
        let artifacts = partition(&directory, &ledger, 10);
        let body = String::from_utf8(find(&artifacts, "day_post_counts.csv").bytes.to_vec())
            .expect("utf8");

        let rows = csv::parse(&body).expect("parses");
        let series = ledger.global_series(Granularity::Day);
        assert_eq!(rows.len(), series.len() + 1);
        for (row, (period, tally)) in rows.iter().skip(1).zip(series) {
            assert_eq!(row[0], period.label());
            let total: u64 = row[2].parse().expect("integer total");
            assert_eq!(total, tally.total());
            let sum: u64 = row[3..9]
                .iter()
                .map(|cell| cell.parse::<u64>().expect("integer cell"))
                .sum();
            assert_eq!(total, sum);
        }
    }

    #[test]
    fn users_info_lists_first_post_metadata() {
        let (directory, ledger) = fixture();
        let artifacts = partition(&directory, &ledger, 10);
        let body =
            String::from_utf8(find(&artifacts, "users_info.csv").bytes.to_vec()).expect("utf8");

        insta::assert_snapshot!(body, @r#"
        "user_id","username","first_post_id","first_post_date","post_count"
        "bob","Bob",1,"2024-03-01T09:00:00Z",3
        "bob2","bob99",5,"2024-03-02T09:00:00Z",1
        "#);
    }
}
