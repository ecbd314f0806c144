use anyhow::Result;
use clap::Args;
use serde::Serialize;

use super::analysis::{envelope_failure, ok_envelope, print_envelope};
use crate::config::RuntimePaths;
use crate::models::WarningCode;
use crate::store::{
    COMPLETE_TESTS_TABLE, CreatedAtRange, SchemaCheck, check_snapshot_schema, created_at_range,
    open_snapshot,
};

#[derive(Debug, Clone, Args)]
pub struct InspectArgs {
    #[arg(long, default_value_t = false)]
    pub json: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InspectReport {
    pub database: String,
    pub file_size_bytes: u64,
    pub ready: bool,
    pub schema: SchemaCheck,
    pub created_at_range: Option<CreatedAtRange>,
    pub problems: Vec<String>,
}

pub fn inspect_snapshot(runtime_paths: &RuntimePaths) -> Result<InspectReport> {
    let path = runtime_paths.database.as_path();
    let connection = open_snapshot(path)?;
    let file_size_bytes = std::fs::metadata(path).map(|meta| meta.len()).unwrap_or(0);
    let schema = check_snapshot_schema(&connection)?;

    let timestamps_readable = schema.tables.iter().any(|table| {
        table.table == COMPLETE_TESTS_TABLE && table.present && table.missing_columns.is_empty()
    });
    let created_at_range = if timestamps_readable {
        Some(created_at_range(&connection)?)
    } else {
        None
    };

    Ok(InspectReport {
        database: path.display().to_string(),
        file_size_bytes,
        ready: schema.is_complete(),
        problems: schema.problems(),
        schema,
        created_at_range,
    })
}

#[must_use]
pub fn render_text_report(report: &InspectReport) -> String {
    let mut lines = vec![
        format!("database: {}", report.database),
        format!("file_size_bytes: {}", report.file_size_bytes),
        format!("ready: {}", report.ready),
    ];

    for table in &report.schema.tables {
        let rows = table
            .row_count
            .map_or_else(|| "-".to_string(), |count| count.to_string());
        lines.push(format!(
            "table.{}: present={} rows={rows}",
            table.table, table.present
        ));
    }

    if let Some(range) = &report.created_at_range {
        lines.push(format!(
            "created_at.earliest: {}",
            range.earliest.as_deref().unwrap_or("-")
        ));
        lines.push(format!(
            "created_at.latest: {}",
            range.latest.as_deref().unwrap_or("-")
        ));
        lines.push(format!("created_at.null_rows: {}", range.null_rows));
    }

    if !report.problems.is_empty() {
        lines.push("problems:".to_string());
        lines.extend(report.problems.iter().map(|problem| format!("- {problem}")));
    }

    lines.join("\n")
}

pub fn run(args: &InspectArgs, runtime_paths: &RuntimePaths) -> Result<()> {
    let result = inspect_snapshot(runtime_paths);
    if args.json {
        let report = result.map_err(|error| envelope_failure("inspect", &error))?;
        let envelope = report.problems.iter().fold(
            ok_envelope("inspect", &report, runtime_paths)?,
            |envelope, problem| envelope.with_warning(WarningCode::SchemaIncomplete, problem.clone()),
        );
        return print_envelope(&envelope);
    }

    println!("{}", render_text_report(&result?));
    Ok(())
}
