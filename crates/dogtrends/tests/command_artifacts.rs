use std::path::{Path, PathBuf};
use std::process::{Command, Output};
use std::time::{SystemTime, UNIX_EPOCH};

use dogtrends::models::{CompletedTest, Dog, Snapshot, User};
use dogtrends::store::{SnapshotWriterConfig, write_snapshot};
use serde_json::Value;

fn unique_temp_dir(prefix: &str) -> PathBuf {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system time should be after unix epoch")
        .as_nanos();
    std::env::temp_dir().join(format!("{prefix}-{nanos}"))
}

struct Workspace {
    root: PathBuf,
    home_dir: PathBuf,
    cwd: PathBuf,
    out_dir: PathBuf,
}

impl Workspace {
    fn new(prefix: &str) -> Self {
        let root = unique_temp_dir(prefix);
        let workspace = Self {
            home_dir: root.join("home"),
            cwd: root.join("cwd"),
            out_dir: root.join("out"),
            root,
        };
        for dir in [&workspace.home_dir, &workspace.cwd] {
            std::fs::create_dir_all(dir).expect("workspace dir should be creatable");
        }
        workspace
    }

    fn run(&self, args: &[&str]) -> Output {
        Command::new(env!("CARGO_BIN_EXE_dogtrends"))
            .arg("--home-dir")
            .arg(&self.home_dir)
            .arg("--cwd")
            .arg(&self.cwd)
            .arg("--out-dir")
            .arg(&self.out_dir)
            .args(args)
            .env_remove("RUST_LOG")
            .output()
            .expect("command should execute")
    }
}

impl Drop for Workspace {
    fn drop(&mut self) {
        let _ = std::fs::remove_dir_all(&self.root);
    }
}

fn write_fixture(path: &Path) {
    let user = |guid: &str, exclude, country: &str, state: Option<&str>| User {
        user_guid: Some(guid.to_string()),
        exclude,
        country: Some(country.to_string()),
        state: state.map(str::to_string),
    };
    let dog = |guid: &str, owner: &str, exclude| Dog {
        dog_guid: Some(guid.to_string()),
        user_guid: Some(owner.to_string()),
        exclude,
    };
    let stamps = [
        ("d1", "2013-10-06 15:00:00"),
        ("d1", "2013-10-13 15:00:00"),
        ("d2", "2013-10-20 15:00:00"),
        ("d2", "2013-10-07 15:00:00"),
        ("d3", "2013-10-14 02:00:00"),
        ("d4", "2013-10-11 15:00:00"),
    ];

    let snapshot = Snapshot {
        users: vec![
            user("u1", None, "US", Some("NC")),
            user("u2", None, "US", Some("TX")),
            user("u3", None, "CA", None),
            user("u4", Some(true), "US", Some("NC")),
        ],
        dogs: vec![
            dog("d1", "u1", None),
            dog("d2", "u2", None),
            dog("d3", "u3", None),
            dog("d4", "u4", None),
        ],
        completed_tests: stamps
            .iter()
            .zip(1_i64..)
            .map(|((dog_guid, created_at), row_id)| CompletedTest {
                row_id,
                dog_guid: Some((*dog_guid).to_string()),
                created_at: Some((*created_at).to_string()),
            })
            .collect(),
    };
    write_snapshot(path, &snapshot, SnapshotWriterConfig::default())
        .expect("fixture snapshot should be writable");
}

fn stdout_json(output: &Output) -> Value {
    let stdout = String::from_utf8_lossy(&output.stdout);
    serde_json::from_str(stdout.trim()).unwrap_or_else(|error| {
        panic!("stdout should be one JSON document ({error}): {stdout}");
    })
}

#[test]
fn default_database_is_resolved_from_cwd() {
    let workspace = Workspace::new("dogtrends-cmd-default-db");
    write_fixture(&workspace.cwd.join("dognition.sqlite"));

    let output = workspace.run(&["dogs"]);
    assert_eq!(output.status.code(), Some(0));
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("| total_linked_dogs | unique_dogs | valid_unique_dogs |"));
    assert!(stdout.contains("| 4 | 4 | 3 |"));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("dogtrends: starting `dogs`"));
    assert!(stderr.contains("dogtrends: completed `dogs` (exit_code=0)"));
}

#[test]
fn weekdays_json_envelope_carries_rows() {
    let workspace = Workspace::new("dogtrends-cmd-weekdays-json");
    let db = workspace.root.join("snap.sqlite");
    write_fixture(&db);
    let db_arg = db.display().to_string();

    let output = workspace.run(&["--db", &db_arg, "weekdays", "--cleaned", "--json"]);
    assert_eq!(output.status.code(), Some(0));

    let envelope = stdout_json(&output);
    assert_eq!(envelope["ok"], true);
    assert_eq!(envelope["command"], "weekdays");
    assert_eq!(envelope["meta"]["schema_version"], "dogtrends.envelope.v1");
    assert_eq!(envelope["data"]["filter"], "cleaned");
    assert_eq!(envelope["data"]["utc_offset"], "UTC");

    let rows = envelope["data"]["rows"]
        .as_array()
        .expect("rows should be an array");
    let pairs = rows
        .iter()
        .map(|row| {
            (
                row["daylabel"].as_str().unwrap_or_default().to_string(),
                row["numtests"].as_u64().unwrap_or_default(),
            )
        })
        .collect::<Vec<_>>();
    assert_eq!(
        pairs,
        vec![("Su".to_string(), 3), ("Mo".to_string(), 2)]
    );
}

#[test]
fn mainland_filter_shifts_and_drops_foreign_users() {
    let workspace = Workspace::new("dogtrends-cmd-mainland");
    let db = workspace.root.join("snap.sqlite");
    write_fixture(&db);
    let db_arg = db.display().to_string();

    let output = workspace.run(&[
        "--db",
        &db_arg,
        "weekdays",
        "--us-mainland",
        "--utc-offset",
        "UTC-6",
        "--json",
    ]);
    assert_eq!(output.status.code(), Some(0));
    let envelope = stdout_json(&output);
    assert_eq!(envelope["data"]["filter"], "mainland");
    assert_eq!(envelope["data"]["utc_offset"], "UTC-6");
    assert_eq!(envelope["data"]["rows"][0]["daylabel"], "Su");
    assert_eq!(envelope["data"]["rows"][0]["numtests"], 3);
}

#[test]
fn weekday_rows_preview_lists_corrected_times() {
    let workspace = Workspace::new("dogtrends-cmd-weekday-rows");
    let db = workspace.root.join("snap.sqlite");
    write_fixture(&db);
    let db_arg = db.display().to_string();

    let output = workspace.run(&[
        "--db",
        &db_arg,
        "weekdays",
        "--cleaned",
        "--utc-offset",
        "-6",
        "--rows",
        "2",
        "--json",
    ]);
    assert_eq!(output.status.code(), Some(0));
    let envelope = stdout_json(&output);
    let rows = envelope["data"]["rows"]
        .as_array()
        .expect("rows should be an array");
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0]["created_at"], "2013-10-06 15:00:00");
    assert_eq!(rows[0]["corrected_time"], "2013-10-06 09:00:00");
    assert_eq!(rows[0]["weekday_num"], 1);
    assert_eq!(rows[1]["created_at"], "2013-10-13 15:00:00");

    let text = workspace.run(&["--db", &db_arg, "weekdays", "--rows", "1"]);
    assert_eq!(text.status.code(), Some(0));
    let stdout = String::from_utf8_lossy(&text.stdout);
    assert!(stdout.contains("| created_at | weekday_num | daylabel |"));
    assert!(stdout.contains("| 2013-10-06 15:00:00 | 1 | Su |"));
}

#[test]
fn report_writes_markdown_and_json_artifacts() {
    let workspace = Workspace::new("dogtrends-cmd-report");
    let db = workspace.root.join("snap.sqlite");
    write_fixture(&db);
    let db_arg = db.display().to_string();

    let output = workspace.run(&["--db", &db_arg, "report"]);
    assert_eq!(
        output.status.code(),
        Some(0),
        "stderr: {}",
        String::from_utf8_lossy(&output.stderr)
    );

    let markdown = std::fs::read_to_string(workspace.out_dir.join("report.md"))
        .expect("report.md should be written");
    assert!(markdown.starts_with("# Dognition engagement report"));
    assert!(markdown.contains("| weekday_num | daylabel | numtests |"));
    assert!(markdown.contains("| state | numusers |"));
    assert!(markdown.contains("| country | numusers |"));

    let json: Value = serde_json::from_str(
        &std::fs::read_to_string(workspace.out_dir.join("report.json"))
            .expect("report.json should be written"),
    )
    .expect("report.json should parse");
    assert_eq!(json["schema_version"], "dogtrends.report.v1");
    assert_eq!(json["utc_offset"], "UTC-6");
    assert_eq!(json["dog_counts"]["valid_unique_dogs"], 3);
    assert_eq!(json["highlights"]["busiest_day"], "Su");
    assert_eq!(json["top_countries"]["rows"][0]["region"], "US");

    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("report: complete next=review"));
}

#[test]
fn verify_writes_passing_report() {
    let workspace = Workspace::new("dogtrends-cmd-verify");
    let db = workspace.root.join("snap.sqlite");
    write_fixture(&db);
    let db_arg = db.display().to_string();

    let output = workspace.run(&["--db", &db_arg, "verify"]);
    assert_eq!(
        output.status.code(),
        Some(0),
        "stdout: {}",
        String::from_utf8_lossy(&output.stdout)
    );

    let report: Value = serde_json::from_str(
        &std::fs::read_to_string(workspace.out_dir.join("verify").join("report.json"))
            .expect("verify report should be written"),
    )
    .expect("verify report should parse");
    assert_eq!(report["status"], "pass");
    assert_eq!(report["checks_run"], 6);
    assert_eq!(report["mismatches"], 0);
}

#[test]
fn inspect_json_reports_ready_snapshot() {
    let workspace = Workspace::new("dogtrends-cmd-inspect");
    let db = workspace.root.join("snap.sqlite");
    write_fixture(&db);
    let db_arg = db.display().to_string();

    let output = workspace.run(&["--db", &db_arg, "inspect", "--json"]);
    assert_eq!(output.status.code(), Some(0));

    let envelope = stdout_json(&output);
    assert_eq!(envelope["data"]["ready"], true);
    assert_eq!(envelope["data"]["created_at_range"]["earliest"], "2013-10-06 15:00:00");
    assert_eq!(envelope["data"]["created_at_range"]["null_rows"], 0);
    let tables = envelope["data"]["schema"]["tables"]
        .as_array()
        .expect("tables should be an array");
    assert_eq!(tables.len(), 3);
}

#[test]
fn schema_prints_report_json_schema() {
    let workspace = Workspace::new("dogtrends-cmd-schema");
    let output = workspace.run(&["schema"]);
    assert_eq!(output.status.code(), Some(0));

    let schema = stdout_json(&output);
    assert_eq!(schema["title"], "Report");
    assert!(schema["properties"]["top_states"].is_object());
}
