use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use super::commands::{
    dogs::DogsArgs, inspect::InspectArgs, regions::RegionsArgs, report::ReportArgs,
    schema::SchemaArgs, verify::VerifyArgs, weekdays::WeekdaysArgs,
};

#[derive(Debug, Parser)]
#[command(
    name = "dogtrends",
    version,
    about = "Engagement timing and geography reports over a Dognition snapshot"
)]
pub struct Cli {
    #[command(flatten)]
    pub runtime: RuntimeArgs,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Clone, Args)]
pub struct RuntimeArgs {
    /// SQLite snapshot holding `users`, `dogs` and `complete_tests`.
    #[arg(long, global = true, value_name = "PATH")]
    pub db: Option<PathBuf>,

    #[arg(long, global = true, value_name = "PATH")]
    pub home_dir: Option<PathBuf>,

    #[arg(long, global = true, value_name = "PATH")]
    pub cwd: Option<PathBuf>,

    #[arg(long, global = true, value_name = "PATH")]
    pub out_dir: Option<PathBuf>,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Completed tests per weekday, optionally per year, filtered or shifted.
    Weekdays(WeekdaysArgs),
    /// Linked, unique and valid dog counts.
    Dogs(DogsArgs),
    /// Top states or countries by distinct users.
    Regions(RegionsArgs),
    /// Runs every question and writes report.md and report.json.
    Report(ReportArgs),
    /// Checks snapshot tables, columns, row counts and timestamp range.
    Inspect(InspectArgs),
    /// Compares the in-memory pipeline against the SQL text of each question.
    Verify(VerifyArgs),
    /// Prints the JSON schema of the report artifact.
    Schema(SchemaArgs),
}
