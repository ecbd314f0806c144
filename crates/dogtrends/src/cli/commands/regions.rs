use anyhow::Result;
use clap::{Args, ValueEnum};

use super::analysis::{RegionArgs, envelope_failure, load, ok_envelope, print_envelope};
use crate::config::{AnalysisConfig, RuntimePaths};
use crate::pipeline::{RegionQuery, run_region_query};
use crate::reporter::{RegionKind, render_region_table};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum RegionScope {
    States,
    Countries,
}

#[derive(Debug, Clone, Args)]
pub struct RegionsArgs {
    #[arg(value_enum, value_name = "SCOPE")]
    pub scope: RegionScope,

    /// Rows to keep; defaults to 5 states or 10 countries.
    #[arg(long, value_name = "N")]
    pub top: Option<usize>,

    #[command(flatten)]
    pub region: RegionArgs,

    #[arg(long, default_value_t = false)]
    pub json: bool,
}

pub fn run(args: &RegionsArgs, runtime_paths: &RuntimePaths) -> Result<()> {
    if !args.json {
        println!(
            "regions: start db={} scope={}",
            runtime_paths.database.display(),
            scope_key(args.scope)
        );
    }

    let result = build_query(args).and_then(|query| {
        let (_, snapshot) = load(runtime_paths)?;
        Ok(run_region_query(&snapshot, &query))
    });

    if args.json {
        let ranking = result.map_err(|error| envelope_failure("regions", &error))?;
        return print_envelope(&ok_envelope("regions", &ranking, runtime_paths)?);
    }

    let ranking = result?;
    println!("{}", render_region_table(&ranking));
    Ok(())
}

pub fn build_query(args: &RegionsArgs) -> Result<RegionQuery> {
    let mut config = AnalysisConfig::default();
    args.region.apply(&mut config);
    match (args.scope, args.top) {
        (RegionScope::States, Some(top)) => config.top_states = top,
        (RegionScope::Countries, Some(top)) => config.top_countries = top,
        (_, None) => {}
    }
    config.validate()?;

    Ok(match args.scope {
        RegionScope::States => RegionQuery::top_states(&config),
        RegionScope::Countries => RegionQuery::top_countries(&config),
    })
}

const fn scope_key(scope: RegionScope) -> &'static str {
    match scope {
        RegionScope::States => RegionKind::State.column(),
        RegionScope::Countries => RegionKind::Country.column(),
    }
}
