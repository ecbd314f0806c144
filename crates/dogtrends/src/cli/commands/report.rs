use anyhow::Result;
use clap::Args;

use super::analysis::{AnalysisArgs, load};
use crate::config::RuntimePaths;
use crate::pipeline::build_report;
use crate::reporter::{build_artifact_layout, write_report_artifacts};

#[derive(Debug, Clone, Args)]
pub struct ReportArgs {
    #[command(flatten)]
    pub analysis: AnalysisArgs,

    /// Also print the rendered Markdown to stdout.
    #[arg(long, default_value_t = false)]
    pub print: bool,
}

pub fn run(args: &ReportArgs, runtime_paths: &RuntimePaths) -> Result<()> {
    let config = args.analysis.to_config()?;
    println!(
        "report: start db={} utc_offset={} out_dir={}",
        runtime_paths.database.display(),
        config.utc_offset,
        runtime_paths.out_dir.display()
    );

    let (_, snapshot) = load(runtime_paths)?;
    let report = build_report(
        &snapshot,
        &config,
        &runtime_paths.database.display().to_string(),
    )?;
    let artifacts = build_artifact_layout(&runtime_paths.out_dir);
    write_report_artifacts(&artifacts, &report)?;

    println!(
        "report: wrote markdown={} json={}",
        artifacts.markdown.display(),
        artifacts.json.display()
    );
    println!(
        "report: summary valid_dogs={} busiest_day={} leading_state={} leading_country={}",
        report.dog_counts.valid_unique_dogs,
        report
            .highlights
            .busiest_day
            .map_or_else(|| "-".to_string(), |day| day.to_string()),
        report.highlights.leading_state.as_deref().unwrap_or("-"),
        report.highlights.leading_country.as_deref().unwrap_or("-"),
    );
    if args.print {
        print!("{}", crate::reporter::render_markdown(&report));
    }
    println!(
        "report: complete next=review {}",
        artifacts.markdown.display()
    );

    Ok(())
}
