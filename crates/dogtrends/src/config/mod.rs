use std::path::{Component, Path, PathBuf};

use anyhow::{Result, bail};

use crate::exclusion::RegionFilter;
use crate::temporal::HourOffset;

pub const DEFAULT_DATABASE_FILE: &str = "dognition.sqlite";
pub const DEFAULT_UTC_OFFSET_HOURS: i8 = -6;
pub const DEFAULT_HOME_COUNTRY: &str = "US";
pub const DEFAULT_EXCLUDED_STATES: &[&str] = &["HI", "AK"];
pub const DEFAULT_TOP_STATES: usize = 5;
pub const DEFAULT_TOP_COUNTRIES: usize = 10;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimePaths {
    pub home_dir: PathBuf,
    pub cwd: PathBuf,
    pub database: PathBuf,
    pub out_dir: PathBuf,
}

pub fn resolve_runtime_paths(
    home_dir: &Path,
    cwd: &Path,
    database_override: Option<&Path>,
    out_dir_override: Option<&Path>,
) -> Result<RuntimePaths> {
    if !home_dir.is_absolute() {
        bail!("home_dir must be absolute: {}", home_dir.display());
    }
    if !cwd.is_absolute() {
        bail!("cwd must be absolute: {}", cwd.display());
    }

    let home_dir = normalize_lexical(home_dir);
    let cwd = normalize_lexical(cwd);
    let database = match database_override {
        Some(path) => resolve_user_path(path, &home_dir, &cwd)?,
        None => cwd.join(DEFAULT_DATABASE_FILE),
    };
    let out_dir = match out_dir_override {
        Some(path) => resolve_user_path(path, &home_dir, &cwd)?,
        None => home_dir.join(".dogtrends").join("output"),
    };

    Ok(RuntimePaths {
        home_dir,
        cwd,
        database: normalize_lexical(&database),
        out_dir: normalize_lexical(&out_dir),
    })
}

/// Knobs shared by every question; defaults reproduce the published
/// analysis (Central time, contiguous US, top 5 states, top 10 countries).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnalysisConfig {
    pub utc_offset: HourOffset,
    pub home_country: String,
    pub excluded_states: Vec<String>,
    pub top_states: usize,
    pub top_countries: usize,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            utc_offset: HourOffset::new(DEFAULT_UTC_OFFSET_HOURS)
                .unwrap_or(HourOffset::UTC),
            home_country: DEFAULT_HOME_COUNTRY.to_string(),
            excluded_states: DEFAULT_EXCLUDED_STATES
                .iter()
                .map(|state| (*state).to_string())
                .collect(),
            top_states: DEFAULT_TOP_STATES,
            top_countries: DEFAULT_TOP_COUNTRIES,
        }
    }
}

impl AnalysisConfig {
    pub fn validate(&self) -> Result<()> {
        if self.home_country.trim().is_empty() {
            bail!("home country must not be empty");
        }
        if self.excluded_states.iter().any(|state| state.trim().is_empty()) {
            bail!("excluded states must not contain empty codes");
        }
        if self.top_states == 0 {
            bail!("top states must be greater than zero");
        }
        if self.top_countries == 0 {
            bail!("top countries must be greater than zero");
        }
        Ok(())
    }

    /// Home country minus the excluded states, used for local-time analysis.
    #[must_use]
    pub fn mainland_filter(&self) -> RegionFilter {
        RegionFilter::country(self.home_country.clone())
            .excluding_states(self.excluded_states.iter().cloned())
    }

    #[must_use]
    pub fn home_country_filter(&self) -> RegionFilter {
        RegionFilter::country(self.home_country.clone())
    }
}

fn resolve_user_path(path: &Path, home_dir: &Path, cwd: &Path) -> Result<PathBuf> {
    let expanded = expand_tilde(path, home_dir)?;
    let resolved = if expanded.is_absolute() {
        expanded
    } else {
        cwd.join(expanded)
    };

    Ok(normalize_lexical(&resolved))
}

fn expand_tilde(path: &Path, home_dir: &Path) -> Result<PathBuf> {
    let mut components = path.components();
    match components.next() {
        Some(Component::Normal(first)) if first == "~" => {
            let mut expanded = home_dir.to_path_buf();
            for component in components {
                expanded.push(component.as_os_str());
            }
            Ok(expanded)
        }
        Some(Component::Normal(first))
            if first
                .to_str()
                .is_some_and(|segment| segment.starts_with('~')) =>
        {
            bail!(
                "unsupported home expansion syntax (only `~` and `~/...` are supported): {}",
                path.display()
            )
        }
        _ => Ok(path.to_path_buf()),
    }
}

fn normalize_lexical(path: &Path) -> PathBuf {
    let mut normalized = PathBuf::new();

    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !normalized.pop() {
                    normalized.push(component.as_os_str());
                }
            }
            _ => normalized.push(component.as_os_str()),
        }
    }

    normalized
}
