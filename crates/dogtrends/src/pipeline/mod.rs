use anyhow::{Result, anyhow};
use serde::Serialize;

use crate::aggregate::{Counts, YearWeekday, count_by, count_distinct_by};
use crate::config::AnalysisConfig;
use crate::exclusion::{RegionFilter, ValidDogSet, dog_counts, valid_dog_set};
use crate::models::{Snapshot, Weekday};
use crate::reporter::{
    CompletionRow, REPORT_SCHEMA_VERSION, RegionKind, RegionRanking, Report, WeekdayRow, YearOrder,
    YearWeekdayRow, highlights, region_ranking, weekday_rows, year_weekday_rows,
};
use crate::temporal::{
    HourOffset, NormalizedTimestamp, format_sqlite_datetime, now_utc_rfc3339, normalize,
    parse_created_at,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Grouping {
    Weekday,
    YearWeekday(YearOrder),
}

/// One weekday breakdown. `valid_dogs: None` counts every completion without
/// joining to dogs or users.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WeekdayQuery {
    pub valid_dogs: Option<RegionFilter>,
    pub offset: HourOffset,
    pub grouping: Grouping,
}

impl WeekdayQuery {
    #[must_use]
    pub fn raw_peaks() -> Self {
        Self {
            valid_dogs: None,
            offset: HourOffset::UTC,
            grouping: Grouping::Weekday,
        }
    }

    #[must_use]
    pub fn cleaned_by_year() -> Self {
        Self {
            valid_dogs: Some(RegionFilter::any()),
            offset: HourOffset::UTC,
            grouping: Grouping::YearWeekday(YearOrder::CountDesc),
        }
    }

    #[must_use]
    pub fn local_by_year(config: &AnalysisConfig) -> Self {
        Self {
            valid_dogs: Some(config.mainland_filter()),
            offset: config.utc_offset,
            grouping: Grouping::YearWeekday(YearOrder::Calendar),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum WeekdayBreakdown {
    Weekday(Vec<WeekdayRow>),
    ByYear(Vec<YearWeekdayRow>),
}

impl WeekdayBreakdown {
    #[must_use]
    pub fn total(&self) -> usize {
        match self {
            Self::Weekday(rows) => rows.iter().map(|row| row.numtests).sum(),
            Self::ByYear(rows) => rows.iter().map(|row| row.numtests).sum(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegionQuery {
    pub kind: RegionKind,
    pub filter: RegionFilter,
    pub limit: usize,
}

impl RegionQuery {
    #[must_use]
    pub fn top_states(config: &AnalysisConfig) -> Self {
        Self {
            kind: RegionKind::State,
            filter: config.home_country_filter(),
            limit: config.top_states,
        }
    }

    #[must_use]
    pub fn top_countries(config: &AnalysisConfig) -> Self {
        Self {
            kind: RegionKind::Country,
            filter: RegionFilter::any(),
            limit: config.top_countries,
        }
    }
}

/// Completions that survive the optional valid-dog join, normalized to the
/// requested offset. Rows without `created_at` are skipped; a value that
/// cannot be parsed fails the whole pass.
pub fn normalized_completions(
    snapshot: &Snapshot,
    valid_dogs: Option<&ValidDogSet>,
    offset: HourOffset,
) -> Result<Vec<NormalizedTimestamp>> {
    normalized_rows(snapshot, valid_dogs, offset)
        .map(|row| row.map(|(_, timestamp)| timestamp))
        .collect()
}

/// First `limit` completions in rowid order with their derived weekday and,
/// under a non-zero offset, the corrected time.
pub fn preview_completions(
    snapshot: &Snapshot,
    query: &WeekdayQuery,
    limit: usize,
) -> Result<Vec<CompletionRow>> {
    let valid_dogs = resolve_valid_dogs(snapshot, query);
    normalized_rows(snapshot, valid_dogs.as_ref(), query.offset)
        .take(limit)
        .map(|row| {
            let (created_at, timestamp) = row?;
            Ok(CompletionRow {
                created_at: created_at.to_string(),
                corrected_time: (!query.offset.is_utc())
                    .then(|| format_sqlite_datetime(timestamp.instant)),
                weekday_num: timestamp.weekday_num(),
                daylabel: timestamp.weekday,
            })
        })
        .collect()
}

fn normalized_rows<'a>(
    snapshot: &'a Snapshot,
    valid_dogs: Option<&'a ValidDogSet>,
    offset: HourOffset,
) -> impl Iterator<Item = Result<(&'a str, NormalizedTimestamp)>> + 'a {
    snapshot
        .completed_tests
        .iter()
        .filter(move |test| {
            valid_dogs.is_none_or(|valid_dogs| {
                test.dog_guid
                    .as_deref()
                    .is_some_and(|dog_guid| valid_dogs.contains(dog_guid))
            })
        })
        .filter_map(|test| test.created_at.as_deref().map(|created_at| (test, created_at)))
        .map(move |(test, created_at)| {
            let instant = parse_created_at(created_at).map_err(|error| {
                anyhow!(
                    "complete_tests rowid {}: invalid created_at {created_at:?}: {error}",
                    test.row_id
                )
            })?;
            let timestamp = normalize(instant, offset).ok_or_else(|| {
                anyhow!(
                    "complete_tests rowid {}: created_at {created_at:?} cannot be shifted by {offset}",
                    test.row_id
                )
            })?;
            Ok((created_at, timestamp))
        })
}

pub fn weekday_counts(snapshot: &Snapshot, query: &WeekdayQuery) -> Result<Counts<Weekday>> {
    let valid_dogs = resolve_valid_dogs(snapshot, query);
    let completions = normalized_completions(snapshot, valid_dogs.as_ref(), query.offset)?;
    Ok(count_by(completions.iter().map(|timestamp| timestamp.weekday)))
}

pub fn year_weekday_counts(
    snapshot: &Snapshot,
    query: &WeekdayQuery,
) -> Result<Counts<YearWeekday>> {
    let valid_dogs = resolve_valid_dogs(snapshot, query);
    let completions = normalized_completions(snapshot, valid_dogs.as_ref(), query.offset)?;
    Ok(count_by(completions.iter().map(|timestamp| YearWeekday {
        year: timestamp.year,
        weekday: timestamp.weekday,
    })))
}

pub fn run_weekday_query(snapshot: &Snapshot, query: &WeekdayQuery) -> Result<WeekdayBreakdown> {
    let breakdown = match query.grouping {
        Grouping::Weekday => WeekdayBreakdown::Weekday(weekday_rows(&weekday_counts(
            snapshot, query,
        )?)),
        Grouping::YearWeekday(order) => WeekdayBreakdown::ByYear(year_weekday_rows(
            &year_weekday_counts(snapshot, query)?,
            order,
        )),
    };
    tracing::debug!(
        offset = %query.offset,
        filtered = query.valid_dogs.is_some(),
        total = breakdown.total(),
        "computed weekday breakdown"
    );
    Ok(breakdown)
}

/// Distinct owners per region across every completion of a valid dog.
#[must_use]
pub fn region_counts(snapshot: &Snapshot, query: &RegionQuery) -> Counts<Option<String>> {
    let valid_dogs = valid_dog_set(&snapshot.users, &snapshot.dogs, &query.filter);

    let pairs = snapshot
        .completed_tests
        .iter()
        .filter_map(|test| test.dog_guid.as_deref())
        .flat_map(|dog_guid| valid_dogs.owners(dog_guid))
        .map(|owner| {
            let region = match query.kind {
                RegionKind::State => owner.state.clone(),
                RegionKind::Country => owner.country.clone(),
            };
            (region, owner.user_guid.as_str())
        });
    count_distinct_by(pairs)
}

#[must_use]
pub fn run_region_query(snapshot: &Snapshot, query: &RegionQuery) -> RegionRanking {
    region_ranking(query.kind, &region_counts(snapshot, query), query.limit)
}

/// Runs every question against one loaded snapshot.
pub fn build_report(snapshot: &Snapshot, config: &AnalysisConfig, database: &str) -> Result<Report> {
    config.validate()?;

    let weekday_peaks = match run_weekday_query(snapshot, &WeekdayQuery::raw_peaks())? {
        WeekdayBreakdown::Weekday(rows) => rows,
        WeekdayBreakdown::ByYear(_) => Vec::new(),
    };
    let weekdays_by_year = by_year_rows(run_weekday_query(
        snapshot,
        &WeekdayQuery::cleaned_by_year(),
    )?);
    let local_weekdays_by_year = by_year_rows(run_weekday_query(
        snapshot,
        &WeekdayQuery::local_by_year(config),
    )?);
    let top_states = run_region_query(snapshot, &RegionQuery::top_states(config));
    let top_countries = run_region_query(snapshot, &RegionQuery::top_countries(config));
    let highlights = highlights(&weekday_peaks, &top_states, &top_countries);

    Ok(Report {
        schema_version: REPORT_SCHEMA_VERSION.to_string(),
        generated_at_utc: now_utc_rfc3339(),
        database: database.to_string(),
        utc_offset: config.utc_offset.to_string(),
        home_country: config.home_country.clone(),
        excluded_states: config.excluded_states.clone(),
        dog_counts: dog_counts(&snapshot.users, &snapshot.dogs),
        weekday_peaks,
        weekdays_by_year,
        local_weekdays_by_year,
        top_states,
        top_countries,
        highlights,
    })
}

fn resolve_valid_dogs(snapshot: &Snapshot, query: &WeekdayQuery) -> Option<ValidDogSet> {
    query
        .valid_dogs
        .as_ref()
        .map(|filter| valid_dog_set(&snapshot.users, &snapshot.dogs, filter))
}

fn by_year_rows(breakdown: WeekdayBreakdown) -> Vec<YearWeekdayRow> {
    match breakdown {
        WeekdayBreakdown::ByYear(rows) => rows,
        WeekdayBreakdown::Weekday(_) => Vec::new(),
    }
}
