use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::aggregate::{Counts, YearWeekday};
use crate::exclusion::DogCounts;
use crate::models::Weekday;

pub const REPORT_SCHEMA_VERSION: &str = "dogtrends.report.v1";
const MISSING_REGION_LABEL: &str = "(none)";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct WeekdayRow {
    pub weekday_num: u8,
    pub daylabel: Weekday,
    pub numtests: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct YearWeekdayRow {
    pub weekday_num: u8,
    pub year: i32,
    pub daylabel: Weekday,
    pub numtests: usize,
}

/// One completion as the normalizer sees it. `corrected_time` is only set
/// when an offset was applied.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct CompletionRow {
    pub created_at: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub corrected_time: Option<String>,

    pub weekday_num: u8,
    pub daylabel: Weekday,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum RegionKind {
    State,
    Country,
}

impl RegionKind {
    /// Column name used in rendered tables and the SQL text.
    #[must_use]
    pub const fn column(self) -> &'static str {
        match self {
            Self::State => "state",
            Self::Country => "country",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct RegionRow {
    pub region: Option<String>,
    pub numusers: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct RegionRanking {
    pub kind: RegionKind,
    pub limit: usize,
    pub rows: Vec<RegionRow>,
}

/// How rows of a per-year breakdown are ordered inside each year.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum YearOrder {
    #[default]
    CountDesc,
    Calendar,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct Highlights {
    pub busiest_day: Option<Weekday>,
    pub quietest_day: Option<Weekday>,
    pub leading_state: Option<String>,
    pub leading_country: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct Report {
    pub schema_version: String,
    pub generated_at_utc: String,
    pub database: String,
    pub utc_offset: String,
    pub home_country: String,
    pub excluded_states: Vec<String>,
    pub dog_counts: DogCounts,
    pub weekday_peaks: Vec<WeekdayRow>,
    pub weekdays_by_year: Vec<YearWeekdayRow>,
    pub local_weekdays_by_year: Vec<YearWeekdayRow>,
    pub top_states: RegionRanking,
    pub top_countries: RegionRanking,
    pub highlights: Highlights,
}

/// Sorts by count descending. Keys with equal counts keep ascending key
/// order, and `limit` truncates after sorting.
#[must_use]
pub fn rank<K: Ord + Clone>(counts: &Counts<K>, limit: Option<usize>) -> Vec<(K, usize)> {
    let mut ranked = counts
        .iter()
        .map(|(key, count)| (key.clone(), *count))
        .collect::<Vec<_>>();
    ranked.sort_by(|left, right| right.1.cmp(&left.1));
    if let Some(limit) = limit {
        ranked.truncate(limit);
    }
    ranked
}

#[must_use]
pub fn weekday_rows(counts: &Counts<Weekday>) -> Vec<WeekdayRow> {
    rank(counts, None)
        .into_iter()
        .map(|(weekday, numtests)| WeekdayRow {
            weekday_num: weekday.number(),
            daylabel: weekday,
            numtests,
        })
        .collect()
}

/// Years ascending, then rows ordered per `order` inside each year.
#[must_use]
pub fn year_weekday_rows(counts: &Counts<YearWeekday>, order: YearOrder) -> Vec<YearWeekdayRow> {
    let mut rows = counts
        .iter()
        .map(|(key, numtests)| YearWeekdayRow {
            weekday_num: key.weekday.number(),
            year: key.year,
            daylabel: key.weekday,
            numtests: *numtests,
        })
        .collect::<Vec<_>>();

    match order {
        YearOrder::CountDesc => rows.sort_by(|left, right| {
            left.year
                .cmp(&right.year)
                .then_with(|| right.numtests.cmp(&left.numtests))
        }),
        YearOrder::Calendar => rows.sort_by_key(|row| (row.year, row.daylabel.calendar_rank())),
    }
    rows
}

#[must_use]
pub fn region_ranking(
    kind: RegionKind,
    counts: &Counts<Option<String>>,
    limit: usize,
) -> RegionRanking {
    let rows = rank(counts, Some(limit))
        .into_iter()
        .map(|(region, numusers)| RegionRow { region, numusers })
        .collect();
    RegionRanking { kind, limit, rows }
}

#[must_use]
pub fn highlights(
    weekday_peaks: &[WeekdayRow],
    top_states: &RegionRanking,
    top_countries: &RegionRanking,
) -> Highlights {
    Highlights {
        busiest_day: weekday_peaks.first().map(|row| row.daylabel),
        quietest_day: weekday_peaks.last().map(|row| row.daylabel),
        leading_state: top_states.rows.iter().find_map(|row| row.region.clone()),
        leading_country: top_countries.rows.iter().find_map(|row| row.region.clone()),
    }
}

#[must_use]
pub fn render_weekday_table(rows: &[WeekdayRow]) -> String {
    render_table(
        &["weekday_num", "daylabel", "numtests"],
        rows.iter().map(|row| {
            vec![
                row.weekday_num.to_string(),
                row.daylabel.to_string(),
                row.numtests.to_string(),
            ]
        }),
    )
}

#[must_use]
pub fn render_year_weekday_table(rows: &[YearWeekdayRow]) -> String {
    render_table(
        &["weekday_num", "year", "daylabel", "numtests"],
        rows.iter().map(|row| {
            vec![
                row.weekday_num.to_string(),
                row.year.to_string(),
                row.daylabel.to_string(),
                row.numtests.to_string(),
            ]
        }),
    )
}

#[must_use]
pub fn render_completion_rows(rows: &[CompletionRow]) -> String {
    let shifted = rows.iter().any(|row| row.corrected_time.is_some());
    let headers: &[&str] = if shifted {
        &["created_at", "corrected_time", "weekday_num", "daylabel"]
    } else {
        &["created_at", "weekday_num", "daylabel"]
    };
    render_table(
        headers,
        rows.iter().map(|row| {
            let mut cells = vec![row.created_at.clone()];
            if shifted {
                cells.push(row.corrected_time.clone().unwrap_or_default());
            }
            cells.push(row.weekday_num.to_string());
            cells.push(row.daylabel.to_string());
            cells
        }),
    )
}

#[must_use]
pub fn render_region_table(ranking: &RegionRanking) -> String {
    render_table(
        &[ranking.kind.column(), "numusers"],
        ranking.rows.iter().map(|row| {
            vec![
                row.region
                    .clone()
                    .unwrap_or_else(|| MISSING_REGION_LABEL.to_string()),
                row.numusers.to_string(),
            ]
        }),
    )
}

#[must_use]
pub fn render_dog_counts(counts: &DogCounts) -> String {
    render_table(
        &["total_linked_dogs", "unique_dogs", "valid_unique_dogs"],
        std::iter::once(vec![
            counts.total_linked_dogs.to_string(),
            counts.unique_dogs.to_string(),
            counts.valid_unique_dogs.to_string(),
        ]),
    )
}

#[must_use]
pub fn render_markdown(report: &Report) -> String {
    let mainland = if report.excluded_states.is_empty() {
        report.home_country.clone()
    } else {
        format!(
            "{} excluding {}",
            report.home_country,
            report.excluded_states.join(", ")
        )
    };

    let mut sections = vec![
        "# Dognition engagement report".to_string(),
        [
            format!("- database: `{}`", report.database),
            format!("- generated_at_utc: {}", report.generated_at_utc),
            format!("- utc_offset: {}", report.utc_offset),
        ]
        .join("\n"),
        "## Highlights".to_string(),
        render_highlights(&report.highlights),
        "## Weekday peaks (all completions, UTC)".to_string(),
        render_weekday_table(&report.weekday_peaks),
        "## Dog counts".to_string(),
        render_dog_counts(&report.dog_counts),
        "## Weekdays by year (valid dogs, UTC)".to_string(),
        render_year_weekday_table(&report.weekdays_by_year),
        format!(
            "## Weekdays by year ({}, {mainland})",
            report.utc_offset
        ),
        render_year_weekday_table(&report.local_weekdays_by_year),
        format!(
            "## Top {} states in {} by users",
            report.top_states.limit, report.home_country
        ),
        render_region_table(&report.top_states),
        format!("## Top {} countries by users", report.top_countries.limit),
        render_region_table(&report.top_countries),
    ];
    sections.retain(|section| !section.is_empty());

    let mut rendered = sections.join("\n\n");
    rendered.push('\n');
    rendered
}

pub fn render_json(report: &Report) -> Result<String> {
    serde_json::to_string_pretty(report).context("failed to encode report as JSON")
}

#[must_use]
pub fn report_json_schema() -> Value {
    let schema = schemars::schema_for!(Report);
    match serde_json::to_value(schema) {
        Ok(value) => value,
        Err(error) => {
            panic!("failed to serialize generated report schema: {error}");
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportArtifactLayout {
    pub markdown: PathBuf,
    pub json: PathBuf,
}

#[must_use]
pub fn build_artifact_layout(out_dir: &Path) -> ReportArtifactLayout {
    ReportArtifactLayout {
        markdown: out_dir.join("report.md"),
        json: out_dir.join("report.json"),
    }
}

pub fn write_report_artifacts(layout: &ReportArtifactLayout, report: &Report) -> Result<()> {
    for path in [&layout.markdown, &layout.json] {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).with_context(|| {
                format!("failed to create report directory: {}", parent.display())
            })?;
        }
    }

    std::fs::write(&layout.markdown, render_markdown(report)).with_context(|| {
        format!("failed to write report markdown: {}", layout.markdown.display())
    })?;
    std::fs::write(&layout.json, render_json(report)?)
        .with_context(|| format!("failed to write report json: {}", layout.json.display()))
}

fn render_highlights(highlights: &Highlights) -> String {
    let or_dash = |value: Option<String>| value.unwrap_or_else(|| "-".to_string());
    [
        format!(
            "- busiest day: {}",
            or_dash(highlights.busiest_day.map(|day| day.to_string()))
        ),
        format!(
            "- quietest day: {}",
            or_dash(highlights.quietest_day.map(|day| day.to_string()))
        ),
        format!(
            "- leading state: {}",
            or_dash(highlights.leading_state.clone())
        ),
        format!(
            "- leading country: {}",
            or_dash(highlights.leading_country.clone())
        ),
    ]
    .join("\n")
}

fn render_table<I>(headers: &[&str], rows: I) -> String
where
    I: IntoIterator<Item = Vec<String>>,
{
    let mut lines = vec![
        format!("| {} |", headers.join(" | ")),
        format!("|{}", " --- |".repeat(headers.len())),
    ];
    lines.extend(rows.into_iter().map(|cells| format!("| {} |", cells.join(" | "))));
    lines.join("\n")
}
