//! Flags and plumbing shared by the commands that run questions.

use anyhow::{Context, Error, Result};
use clap::Args;
use rusqlite::Connection;
use serde::Serialize;

use crate::config::{AnalysisConfig, RuntimePaths};
use crate::models::{Envelope, EnvelopeCommandFailure, Snapshot};
use crate::temporal::HourOffset;

#[derive(Debug, Clone, Default, Args)]
pub struct RegionArgs {
    /// Home country code for state rankings and mainland filtering.
    #[arg(long, value_name = "CODE")]
    pub country: Option<String>,

    /// State codes left out of mainland analysis; replaces the default list.
    #[arg(long = "exclude-state", value_name = "CODE", value_delimiter = ',')]
    pub exclude_states: Vec<String>,
}

impl RegionArgs {
    pub fn apply(&self, config: &mut AnalysisConfig) {
        if let Some(country) = &self.country {
            config.home_country = country.trim().to_string();
        }
        if !self.exclude_states.is_empty() {
            config.excluded_states = self
                .exclude_states
                .iter()
                .map(|state| state.trim().to_string())
                .collect();
        }
    }
}

#[derive(Debug, Clone, Default, Args)]
pub struct AnalysisArgs {
    /// Fixed offset used for local-time weekdays, e.g. `-6`, `UTC-6`, `-06:00`.
    #[arg(
        long,
        value_name = "OFFSET",
        allow_hyphen_values = true,
        value_parser = parse_utc_offset
    )]
    pub utc_offset: Option<HourOffset>,

    #[command(flatten)]
    pub region: RegionArgs,

    #[arg(long, value_name = "N")]
    pub top_states: Option<usize>,

    #[arg(long, value_name = "N")]
    pub top_countries: Option<usize>,
}

impl AnalysisArgs {
    pub fn to_config(&self) -> Result<AnalysisConfig> {
        let mut config = AnalysisConfig::default();
        if let Some(offset) = self.utc_offset {
            config.utc_offset = offset;
        }
        self.region.apply(&mut config);
        if let Some(top_states) = self.top_states {
            config.top_states = top_states;
        }
        if let Some(top_countries) = self.top_countries {
            config.top_countries = top_countries;
        }
        config.validate()?;
        Ok(config)
    }
}

pub fn parse_utc_offset(raw: &str) -> Result<HourOffset, String> {
    HourOffset::parse(raw).map_err(|error| format!("{error:#}"))
}

/// Opens the snapshot read-only and loads all three tables.
pub fn load(runtime_paths: &RuntimePaths) -> Result<(Connection, Snapshot)> {
    let connection = crate::store::open_snapshot(&runtime_paths.database)?;
    let snapshot = crate::store::load_snapshot(&connection)?;
    Ok((connection, snapshot))
}

pub fn ok_envelope<T: Serialize>(
    command: &str,
    data: &T,
    runtime_paths: &RuntimePaths,
) -> Result<Envelope> {
    let data = serde_json::to_value(data)
        .with_context(|| format!("failed to encode {command} result"))?;
    Ok(Envelope::ok(command, data).with_database(&runtime_paths.database))
}

pub fn print_envelope(envelope: &Envelope) -> Result<()> {
    println!("{}", envelope.encode()?);
    Ok(())
}

/// Wraps a failure so `main` prints it as a JSON envelope on stdout.
#[must_use]
pub fn envelope_failure(command: &str, error: &Error) -> Error {
    Error::new(EnvelopeCommandFailure::from(Envelope::failed(command, error)))
}
