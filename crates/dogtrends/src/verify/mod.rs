use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::config::AnalysisConfig;
use crate::exclusion::dog_counts;
use crate::models::Snapshot;
use crate::pipeline::{self, RegionQuery, WeekdayQuery};
use crate::store::queries;
use crate::temporal::now_utc_rfc3339;

pub const VERIFY_SCHEMA_VERSION: &str = "dogtrends.verify.v1";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerifyStatus {
    Pass,
    Fail,
}

/// One question answered twice: by the in-memory pipeline and by its SQL
/// text executed against the same snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParityCheck {
    pub question: String,
    pub description: String,
    pub matches: bool,
    pub native: Value,
    pub sql: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VerifyReport {
    pub schema_version: String,
    pub generated_at_utc: String,
    pub database: String,
    pub utc_offset: String,
    pub status: VerifyStatus,
    pub checks_run: usize,
    pub mismatches: usize,
    pub checks: Vec<ParityCheck>,
}

impl VerifyReport {
    #[must_use]
    pub fn first_mismatch(&self) -> Option<&ParityCheck> {
        self.checks.iter().find(|check| !check.matches)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifyArtifactLayout {
    pub report_json: PathBuf,
}

#[must_use]
pub fn build_artifact_layout(out_dir: &Path) -> VerifyArtifactLayout {
    VerifyArtifactLayout {
        report_json: out_dir.join("verify").join("report.json"),
    }
}

pub fn write_report_artifact(path: &Path, report: &VerifyReport) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).context("failed to create verify artifact directory")?;
    }

    let encoded = serde_json::to_vec_pretty(report).context("failed to encode verify report json")?;
    std::fs::write(path, encoded).context("failed to write verify report artifact")
}

pub fn verify_snapshot(
    connection: &Connection,
    snapshot: &Snapshot,
    config: &AnalysisConfig,
    database: &str,
) -> Result<VerifyReport> {
    config.validate()?;
    let mut checks = Vec::new();

    for (question, description, query) in [
        ("q1", "weekday peaks over every completion", WeekdayQuery::raw_peaks()),
        (
            "q3",
            "weekday by year over valid dogs",
            WeekdayQuery::cleaned_by_year(),
        ),
        (
            "q4",
            "local weekday by year over mainland valid dogs",
            WeekdayQuery::local_by_year(config),
        ),
    ] {
        let native = pipeline::run_weekday_query(snapshot, &query)
            .with_context(|| format!("{question}: native pipeline failed"))?;
        let sql = queries::run_weekday_query(connection, &query)
            .with_context(|| format!("{question}: sql query failed"))?;
        checks.push(parity_check(question, description, &native, &sql)?);
    }

    let native_counts = dog_counts(&snapshot.users, &snapshot.dogs);
    let sql_counts = queries::dog_counts(connection).context("q2: sql query failed")?;
    checks.push(parity_check(
        "q2",
        "linked, unique and valid dog counts",
        &native_counts,
        &sql_counts,
    )?);

    for (question, description, query) in [
        (
            "q5",
            "top states by distinct users",
            RegionQuery::top_states(config),
        ),
        (
            "q6",
            "top countries by distinct users",
            RegionQuery::top_countries(config),
        ),
    ] {
        let native = pipeline::run_region_query(snapshot, &query);
        let sql = queries::run_region_query(connection, &query)
            .with_context(|| format!("{question}: sql query failed"))?;
        checks.push(parity_check(question, description, &native, &sql)?);
    }

    checks.sort_by(|left, right| left.question.cmp(&right.question));
    let mismatches = checks.iter().filter(|check| !check.matches).count();
    for check in checks.iter().filter(|check| !check.matches) {
        tracing::warn!(question = %check.question, "native and sql results differ");
    }

    Ok(VerifyReport {
        schema_version: VERIFY_SCHEMA_VERSION.to_string(),
        generated_at_utc: now_utc_rfc3339(),
        database: database.to_string(),
        utc_offset: config.utc_offset.to_string(),
        status: if mismatches == 0 {
            VerifyStatus::Pass
        } else {
            VerifyStatus::Fail
        },
        checks_run: checks.len(),
        mismatches,
        checks,
    })
}

fn parity_check<T>(question: &str, description: &str, native: &T, sql: &T) -> Result<ParityCheck>
where
    T: PartialEq + Serialize,
{
    Ok(ParityCheck {
        question: question.to_string(),
        description: description.to_string(),
        matches: native == sql,
        native: serde_json::to_value(native)
            .with_context(|| format!("{question}: failed to encode native result"))?,
        sql: serde_json::to_value(sql)
            .with_context(|| format!("{question}: failed to encode sql result"))?,
    })
}

#[cfg(test)]
mod tests {
    use super::{VerifyStatus, build_artifact_layout, verify_snapshot};
    use crate::config::AnalysisConfig;
    use crate::models::{CompletedTest, Dog, Snapshot, User};
    use crate::store::{SnapshotWriterConfig, load_snapshot, open_snapshot, write_snapshot};

    fn temp_db(prefix: &str) -> std::path::PathBuf {
        let nanos = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .expect("system clock should be after unix epoch")
            .as_nanos();
        std::env::temp_dir()
            .join(format!("dogtrends-{prefix}-{nanos}"))
            .join("snapshot.sqlite")
    }

    fn fixture() -> Snapshot {
        let users = vec![
            User {
                user_guid: Some("u1".to_string()),
                exclude: None,
                country: Some("US".to_string()),
                state: Some("NC".to_string()),
            },
            User {
                user_guid: Some("u2".to_string()),
                exclude: Some(false),
                country: Some("US".to_string()),
                state: Some("AK".to_string()),
            },
            User {
                user_guid: Some("u3".to_string()),
                exclude: Some(true),
                country: Some("US".to_string()),
                state: Some("CA".to_string()),
            },
            User {
                user_guid: Some("u4".to_string()),
                exclude: None,
                country: Some("DE".to_string()),
                state: None,
            },
        ];
        let dogs = vec![
            Dog {
                dog_guid: Some("d1".to_string()),
                user_guid: Some("u1".to_string()),
                exclude: None,
            },
            Dog {
                dog_guid: Some("d2".to_string()),
                user_guid: Some("u2".to_string()),
                exclude: None,
            },
            Dog {
                dog_guid: Some("d3".to_string()),
                user_guid: Some("u3".to_string()),
                exclude: None,
            },
            Dog {
                dog_guid: Some("d4".to_string()),
                user_guid: Some("u4".to_string()),
                exclude: Some(true),
            },
            Dog {
                dog_guid: Some("d5".to_string()),
                user_guid: Some("u4".to_string()),
                exclude: None,
            },
            Dog {
                dog_guid: Some("d-orphan".to_string()),
                user_guid: Some("missing".to_string()),
                exclude: None,
            },
        ];
        let stamps = [
            ("d1", "2013-02-03 05:30:00"),
            ("d1", "2013-02-04 12:00:00"),
            ("d2", "2014-06-01 23:15:00"),
            ("d3", "2014-06-02 08:00:00"),
            ("d4", "2014-06-03 08:00:00"),
            ("d5", "2015-01-01 02:00:00"),
            ("d5", "2015-01-04 18:45:10"),
            ("d-orphan", "2015-01-05 10:00:00"),
        ];
        let completed_tests = stamps
            .iter()
            .enumerate()
            .map(|(index, (dog, stamp))| CompletedTest {
                row_id: i64::try_from(index).expect("index fits i64") + 1,
                dog_guid: Some((*dog).to_string()),
                created_at: Some((*stamp).to_string()),
            })
            .collect();

        Snapshot {
            users,
            dogs,
            completed_tests,
        }
    }

    #[test]
    fn native_pipeline_matches_sql_text_on_fixture() {
        let path = temp_db("verify");
        std::fs::create_dir_all(path.parent().expect("parent")).expect("create temp dir");
        write_snapshot(&path, &fixture(), SnapshotWriterConfig { batch_size: 2 })
            .expect("fixture should be written");

        let connection = open_snapshot(&path).expect("snapshot should open");
        let snapshot = load_snapshot(&connection).expect("snapshot should load");
        let report = verify_snapshot(
            &connection,
            &snapshot,
            &AnalysisConfig::default(),
            &path.display().to_string(),
        )
        .expect("verification should run");

        let mismatched = report
            .checks
            .iter()
            .filter(|check| !check.matches)
            .map(|check| format!("{}: native={} sql={}", check.question, check.native, check.sql))
            .collect::<Vec<_>>();
        assert!(mismatched.is_empty(), "{mismatched:#?}");
        assert_eq!(report.status, VerifyStatus::Pass);
        assert_eq!(report.checks_run, 6);
        assert_eq!(
            report
                .checks
                .iter()
                .map(|check| check.question.as_str())
                .collect::<Vec<_>>(),
            vec!["q1", "q2", "q3", "q4", "q5", "q6"]
        );

        std::fs::remove_dir_all(path.parent().expect("parent")).expect("cleanup temp dir");
    }

    #[test]
    fn artifact_layout_nests_under_verify() {
        let layout = build_artifact_layout(std::path::Path::new("/tmp/out"));
        assert_eq!(
            layout.report_json,
            std::path::PathBuf::from("/tmp/out/verify/report.json")
        );
    }
}
