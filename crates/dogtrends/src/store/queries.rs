//! SQLite renditions of every question. Result columns keep the names the
//! reports were written against (`weekday_num`, `daylabel`, `numtests`,
//! `numusers`), and the `ORDER BY` clauses reproduce the reporter's ordering
//! so rows can be compared one-to-one with the in-memory pipeline.

use anyhow::{Context, Result, anyhow, bail};
use rusqlite::types::Value as SqlValue;
use rusqlite::{Connection, params_from_iter};

use super::text_column;
use crate::exclusion::{DogCounts, RegionFilter};
use crate::models::Weekday;
use crate::pipeline::{Grouping, RegionQuery, WeekdayBreakdown, WeekdayQuery};
use crate::reporter::{
    CompletionRow, RegionRanking, RegionRow, WeekdayRow, YearOrder, YearWeekdayRow,
};

pub const TOTAL_LINKED_DOGS_SQL: &str = r#"
SELECT
    COUNT(*) AS total_linked_dogs
FROM dogs d
INNER JOIN users u ON d.user_guid = u.user_guid;
"#;

pub const UNIQUE_DOGS_SQL: &str = r#"
SELECT
    COUNT(DISTINCT d.dog_guid) AS unique_dogs
FROM dogs d
JOIN users u ON d.user_guid = u.user_guid;
"#;

pub const VALID_UNIQUE_DOGS_SQL: &str = r#"
SELECT
    COUNT(DISTINCT d.dog_guid) AS valid_unique_dogs
FROM dogs d
JOIN users u ON d.user_guid = u.user_guid
WHERE (u.exclude IS NULL OR u.exclude = 0)
  AND (d.exclude IS NULL OR d.exclude = 0);
"#;

/// SQL text plus positional parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct BoundQuery {
    pub sql: String,
    pub params: Vec<SqlValue>,
}

impl BoundQuery {
    fn bind(&mut self, value: SqlValue) -> String {
        self.params.push(value);
        format!("?{}", self.params.len())
    }
}

#[must_use]
pub fn weekday_query_sql(query: &WeekdayQuery) -> BoundQuery {
    let mut bound = BoundQuery {
        sql: String::new(),
        params: Vec::new(),
    };
    let modifier = bound.bind(SqlValue::Text(query.offset.sqlite_modifier()));
    let instant = format!("datetime(c.created_at, {modifier})");
    let day_index = format!("CAST(strftime('%w', {instant}) AS INTEGER)");
    let by_year = matches!(query.grouping, Grouping::YearWeekday(_));

    let mut columns = vec![format!("    {day_index} + 1 AS weekday_num")];
    if by_year {
        columns.push(
            "    CAST(strftime('%Y', c.created_at) AS INTEGER) AS year".to_string(),
        );
    }
    columns.push("    COUNT(c.created_at) AS numtests".to_string());
    columns.push(daylabel_column(&day_index));

    let mut sql = format!("SELECT\n{}\nFROM complete_tests c\n", columns.join(",\n"));
    if let Some(filter) = &query.valid_dogs {
        let subquery = cleaned_dogs_subquery(&mut bound, filter, None);
        sql.push_str(&format!(
            "JOIN (\n{subquery}\n) AS dogs_cleaned ON c.dog_guid = dogs_cleaned.dog_guid\n"
        ));
    }
    sql.push_str("WHERE c.created_at IS NOT NULL\n");

    let tail = match query.grouping {
        Grouping::Weekday => {
            "GROUP BY daylabel\nORDER BY numtests DESC, weekday_num ASC".to_string()
        }
        Grouping::YearWeekday(YearOrder::CountDesc) => {
            "GROUP BY year, daylabel\nORDER BY year ASC, numtests DESC, weekday_num ASC"
                .to_string()
        }
        Grouping::YearWeekday(YearOrder::Calendar) => {
            format!("GROUP BY year, daylabel\nORDER BY year ASC, ({day_index} + 6) % 7 ASC")
        }
    };
    sql.push_str(&tail);
    sql.push(';');

    bound.sql = sql;
    bound
}

/// Row-level preview: `created_at`, the corrected time under a non-zero
/// offset, and the derived weekday, in rowid order.
#[must_use]
pub fn completion_preview_sql(query: &WeekdayQuery, limit: usize) -> BoundQuery {
    let mut bound = BoundQuery {
        sql: String::new(),
        params: Vec::new(),
    };
    let modifier = bound.bind(SqlValue::Text(query.offset.sqlite_modifier()));
    let instant = format!("datetime(c.created_at, {modifier})");
    let day_index = format!("CAST(strftime('%w', {instant}) AS INTEGER)");

    let mut columns = vec!["    c.created_at AS created_at".to_string()];
    if !query.offset.is_utc() {
        columns.push(format!("    {instant} AS corrected_time"));
    }
    columns.push(format!("    {day_index} + 1 AS weekday_num"));
    columns.push(daylabel_column(&day_index));

    let mut sql = format!("SELECT\n{}\nFROM complete_tests c\n", columns.join(",\n"));
    if let Some(filter) = &query.valid_dogs {
        let subquery = cleaned_dogs_subquery(&mut bound, filter, None);
        sql.push_str(&format!(
            "JOIN (\n{subquery}\n) AS dogs_cleaned ON c.dog_guid = dogs_cleaned.dog_guid\n"
        ));
    }
    let limit = bound.bind(SqlValue::Integer(i64::try_from(limit).unwrap_or(i64::MAX)));
    sql.push_str(&format!(
        "WHERE c.created_at IS NOT NULL\nORDER BY c.rowid\nLIMIT {limit};"
    ));

    bound.sql = sql;
    bound
}

#[must_use]
pub fn region_query_sql(query: &RegionQuery) -> BoundQuery {
    let mut bound = BoundQuery {
        sql: String::new(),
        params: Vec::new(),
    };
    let column = query.kind.column();
    let subquery = cleaned_dogs_subquery(&mut bound, &query.filter, Some(column));
    let limit = bound.bind(SqlValue::Integer(
        i64::try_from(query.limit).unwrap_or(i64::MAX),
    ));

    bound.sql = format!(
        "SELECT
    dogs_cleaned.{column} AS {column},
    COUNT(DISTINCT dogs_cleaned.user_guid) AS numusers
FROM complete_tests c
JOIN (
{subquery}
) AS dogs_cleaned ON c.dog_guid = dogs_cleaned.dog_guid
GROUP BY {column}
ORDER BY numusers DESC, {column} ASC
LIMIT {limit};"
    );
    bound
}

pub fn run_weekday_query(connection: &Connection, query: &WeekdayQuery) -> Result<WeekdayBreakdown> {
    let bound = weekday_query_sql(query);
    tracing::debug!(sql = %bound.sql, "executing weekday query");
    let mut statement = connection
        .prepare(&bound.sql)
        .context("failed to prepare weekday query")?;
    let by_year = matches!(query.grouping, Grouping::YearWeekday(_));

    let mut rows = statement
        .query(params_from_iter(bound.params.iter()))
        .context("failed to execute weekday query")?;
    let mut flat = Vec::new();
    let mut yearly = Vec::new();
    while let Some(row) = rows.next().context("failed to read weekday query row")? {
        let weekday_num = row
            .get::<&str, Option<i64>>("weekday_num")
            .context("failed to decode weekday_num")?
            .ok_or_else(|| anyhow!("created_at value could not be interpreted by sqlite"))?;
        let daylabel = row
            .get::<&str, Option<String>>("daylabel")
            .context("failed to decode daylabel")?;
        let numtests = row
            .get::<&str, i64>("numtests")
            .context("failed to decode numtests")?;

        let weekday = u8::try_from(weekday_num)
            .ok()
            .and_then(Weekday::from_number)
            .ok_or_else(|| anyhow!("weekday_num out of range: {weekday_num}"))?;
        if daylabel.as_deref().and_then(Weekday::from_label) != Some(weekday) {
            bail!("daylabel {daylabel:?} does not match weekday_num {weekday_num}");
        }
        let numtests = usize::try_from(numtests).context("numtests must be non-negative")?;

        if by_year {
            let year = row
                .get::<&str, i64>("year")
                .context("failed to decode year")?;
            yearly.push(YearWeekdayRow {
                weekday_num: weekday.number(),
                year: i32::try_from(year).context("year out of range")?,
                daylabel: weekday,
                numtests,
            });
        } else {
            flat.push(WeekdayRow {
                weekday_num: weekday.number(),
                daylabel: weekday,
                numtests,
            });
        }
    }

    Ok(if by_year {
        WeekdayBreakdown::ByYear(yearly)
    } else {
        WeekdayBreakdown::Weekday(flat)
    })
}

pub fn run_completion_preview(
    connection: &Connection,
    query: &WeekdayQuery,
    limit: usize,
) -> Result<Vec<CompletionRow>> {
    let bound = completion_preview_sql(query, limit);
    tracing::debug!(sql = %bound.sql, "executing completion preview");
    let mut statement = connection
        .prepare(&bound.sql)
        .context("failed to prepare completion preview")?;
    let shifted = !query.offset.is_utc();

    let mut rows = statement
        .query(params_from_iter(bound.params.iter()))
        .context("failed to execute completion preview")?;
    let mut preview = Vec::new();
    while let Some(row) = rows.next().context("failed to read completion preview row")? {
        let created_at = text_column(row, 0)
            .context("failed to decode created_at")?
            .unwrap_or_default();
        let corrected_time = if shifted {
            Some(
                row.get::<&str, Option<String>>("corrected_time")
                    .context("failed to decode corrected_time")?
                    .ok_or_else(|| anyhow!("sqlite could not shift created_at {created_at:?}"))?,
            )
        } else {
            None
        };
        let weekday_num = row
            .get::<&str, Option<i64>>("weekday_num")
            .context("failed to decode weekday_num")?
            .ok_or_else(|| anyhow!("sqlite could not interpret created_at {created_at:?}"))?;
        let weekday = u8::try_from(weekday_num)
            .ok()
            .and_then(Weekday::from_number)
            .ok_or_else(|| anyhow!("weekday_num out of range: {weekday_num}"))?;
        let daylabel = row
            .get::<&str, Option<String>>("daylabel")
            .context("failed to decode daylabel")?;
        if daylabel.as_deref().and_then(Weekday::from_label) != Some(weekday) {
            bail!("daylabel {daylabel:?} does not match weekday_num {weekday_num}");
        }

        preview.push(CompletionRow {
            created_at,
            corrected_time,
            weekday_num: weekday.number(),
            daylabel: weekday,
        });
    }
    Ok(preview)
}

pub fn run_region_query(connection: &Connection, query: &RegionQuery) -> Result<RegionRanking> {
    let bound = region_query_sql(query);
    tracing::debug!(sql = %bound.sql, "executing region query");
    let mut statement = connection
        .prepare(&bound.sql)
        .context("failed to prepare region query")?;
    let mapped = statement
        .query_map(params_from_iter(bound.params.iter()), |row| {
            Ok((text_column(row, 0)?, row.get::<usize, i64>(1)?))
        })
        .context("failed to execute region query")?;

    let mut rows = Vec::new();
    for row in mapped {
        let (region, numusers) = row.context("failed to decode region query row")?;
        rows.push(RegionRow {
            region,
            numusers: usize::try_from(numusers).context("numusers must be non-negative")?,
        });
    }

    Ok(RegionRanking {
        kind: query.kind,
        limit: query.limit,
        rows,
    })
}

pub fn dog_counts(connection: &Connection) -> Result<DogCounts> {
    let count = |sql: &str, label: &str| -> Result<usize> {
        let value = connection
            .query_row(sql, [], |row| row.get::<usize, i64>(0))
            .with_context(|| format!("failed to query {label}"))?;
        usize::try_from(value).with_context(|| format!("{label} must be non-negative"))
    };

    Ok(DogCounts {
        total_linked_dogs: count(TOTAL_LINKED_DOGS_SQL, "total_linked_dogs")?,
        unique_dogs: count(UNIQUE_DOGS_SQL, "unique_dogs")?,
        valid_unique_dogs: count(VALID_UNIQUE_DOGS_SQL, "valid_unique_dogs")?,
    })
}

fn daylabel_column(day_index: &str) -> String {
    let labels = Weekday::ALL
        .iter()
        .map(|day| format!("        WHEN {} THEN '{}'", day.number(), day.label()))
        .collect::<Vec<_>>()
        .join("\n");
    format!("    CASE {day_index} + 1\n{labels}\n    END AS daylabel")
}

fn cleaned_dogs_subquery(
    bound: &mut BoundQuery,
    filter: &RegionFilter,
    region_column: Option<&str>,
) -> String {
    let projection = match region_column {
        Some(column) => format!("d.dog_guid, u.user_guid, u.{column}"),
        None => "d.dog_guid".to_string(),
    };
    let mut lines = vec![
        format!("    SELECT DISTINCT {projection}"),
        "    FROM dogs d".to_string(),
        "    JOIN users u ON d.user_guid = u.user_guid".to_string(),
        "    WHERE (u.exclude IS NULL OR u.exclude = 0)".to_string(),
        "      AND (d.exclude IS NULL OR d.exclude = 0)".to_string(),
    ];
    if let Some(country) = &filter.country {
        let placeholder = bound.bind(SqlValue::Text(country.clone()));
        lines.push(format!("      AND u.country = {placeholder}"));
    }
    if !filter.excluded_states.is_empty() {
        let placeholders = filter
            .excluded_states
            .iter()
            .map(|state| bound.bind(SqlValue::Text(state.clone())))
            .collect::<Vec<_>>()
            .join(", ");
        lines.push(format!("      AND u.state NOT IN ({placeholders})"));
    }
    lines.join("\n")
}
