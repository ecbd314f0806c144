use anyhow::Result;
use clap::Args;
use serde::Serialize;

use super::analysis::{
    RegionArgs, envelope_failure, load, ok_envelope, parse_utc_offset, print_envelope,
};
use crate::config::{AnalysisConfig, RuntimePaths};
use crate::exclusion::RegionFilter;
use crate::pipeline::{
    Grouping, WeekdayBreakdown, WeekdayQuery, preview_completions, run_weekday_query,
};
use crate::reporter::{
    CompletionRow, YearOrder, render_completion_rows, render_weekday_table,
    render_year_weekday_table,
};
use crate::temporal::HourOffset;

#[derive(Debug, Clone, Args)]
pub struct WeekdaysArgs {
    /// Only count completions of dogs whose owner and dog rows are not flagged.
    #[arg(long, default_value_t = false)]
    pub cleaned: bool,

    #[arg(long, default_value_t = false)]
    pub by_year: bool,

    /// Shift timestamps before deriving weekday and year.
    #[arg(
        long,
        value_name = "OFFSET",
        allow_hyphen_values = true,
        value_parser = parse_utc_offset
    )]
    pub utc_offset: Option<HourOffset>,

    /// Home country minus excluded states; implies `--cleaned` and defaults the
    /// offset to UTC-6.
    #[arg(long, default_value_t = false)]
    pub us_mainland: bool,

    /// List the first N completions with their derived weekday instead of
    /// counting them.
    #[arg(long, value_name = "N")]
    pub rows: Option<usize>,

    #[command(flatten)]
    pub region: RegionArgs,

    #[arg(long, default_value_t = false)]
    pub json: bool,
}

#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
enum WeekdaysRows {
    Counts(WeekdayBreakdown),
    Preview(Vec<CompletionRow>),
}

#[derive(Debug, Clone, Serialize)]
struct WeekdaysOutput {
    utc_offset: String,
    filter: &'static str,
    rows: WeekdaysRows,
}

pub fn run(args: &WeekdaysArgs, runtime_paths: &RuntimePaths) -> Result<()> {
    if !args.json {
        println!(
            "weekdays: start db={} filter={} by_year={}",
            runtime_paths.database.display(),
            filter_key(args),
            args.by_year
        );
    }

    let result = build_query(args).and_then(|query| {
        let (_, snapshot) = load(runtime_paths)?;
        let rows = match args.rows {
            Some(limit) => WeekdaysRows::Preview(preview_completions(&snapshot, &query, limit)?),
            None => WeekdaysRows::Counts(run_weekday_query(&snapshot, &query)?),
        };
        Ok((query, rows))
    });

    if args.json {
        let (query, rows) = result.map_err(|error| envelope_failure("weekdays", &error))?;
        let output = WeekdaysOutput {
            utc_offset: query.offset.to_string(),
            filter: filter_key(args),
            rows,
        };
        return print_envelope(&ok_envelope("weekdays", &output, runtime_paths)?);
    }

    let (query, rows) = result?;
    match &rows {
        WeekdaysRows::Preview(rows) => {
            println!("weekdays: utc_offset={} rows={}", query.offset, rows.len());
            println!("{}", render_completion_rows(rows));
        }
        WeekdaysRows::Counts(breakdown) => {
            println!(
                "weekdays: utc_offset={} total={}",
                query.offset,
                breakdown.total()
            );
            match breakdown {
                WeekdayBreakdown::Weekday(rows) => println!("{}", render_weekday_table(rows)),
                WeekdayBreakdown::ByYear(rows) => {
                    println!("{}", render_year_weekday_table(rows));
                }
            }
        }
    }
    Ok(())
}

/// Flag combination to query: `--us-mainland` wins over `--cleaned`, and an
/// explicit `--utc-offset` wins over the mainland default.
pub fn build_query(args: &WeekdaysArgs) -> Result<WeekdayQuery> {
    let mut config = AnalysisConfig::default();
    args.region.apply(&mut config);
    config.validate()?;

    let valid_dogs = if args.us_mainland {
        Some(config.mainland_filter())
    } else if args.cleaned {
        Some(RegionFilter::any())
    } else {
        None
    };
    let offset = match args.utc_offset {
        Some(offset) => offset,
        None if args.us_mainland => config.utc_offset,
        None => HourOffset::UTC,
    };
    let grouping = match (args.by_year, args.us_mainland) {
        (false, _) => Grouping::Weekday,
        (true, false) => Grouping::YearWeekday(YearOrder::CountDesc),
        (true, true) => Grouping::YearWeekday(YearOrder::Calendar),
    };

    Ok(WeekdayQuery {
        valid_dogs,
        offset,
        grouping,
    })
}

const fn filter_key(args: &WeekdaysArgs) -> &'static str {
    if args.us_mainland {
        "mainland"
    } else if args.cleaned {
        "cleaned"
    } else {
        "raw"
    }
}
