use std::path::Path;

use anyhow::{Context, Result, bail};
use rusqlite::types::Value as SqlValue;
use rusqlite::{Connection, OpenFlags, Row, params};
use serde::Serialize;

use crate::models::{CompletedTest, Dog, Snapshot, User};

pub mod queries;

pub const USERS_TABLE: &str = "users";
pub const DOGS_TABLE: &str = "dogs";
pub const COMPLETE_TESTS_TABLE: &str = "complete_tests";
pub const DEFAULT_INSERT_BATCH_SIZE: usize = 500;

pub const REQUIRED_COLUMNS: &[(&str, &[&str])] = &[
    (USERS_TABLE, &["user_guid", "exclude", "country", "state"]),
    (DOGS_TABLE, &["dog_guid", "user_guid", "exclude"]),
    (COMPLETE_TESTS_TABLE, &["dog_guid", "created_at"]),
];

const CREATE_USERS_TABLE_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS users (
    user_guid TEXT,
    exclude INTEGER,
    country TEXT,
    state TEXT
);
"#;

const CREATE_DOGS_TABLE_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS dogs (
    dog_guid TEXT,
    user_guid TEXT,
    exclude INTEGER
);
"#;

const CREATE_COMPLETE_TESTS_TABLE_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS complete_tests (
    dog_guid TEXT,
    created_at TEXT
);
"#;

const CREATE_INDEX_USERS_GUID_SQL: &str = r#"
CREATE INDEX IF NOT EXISTS idx_users_user_guid
ON users (user_guid);
"#;

const CREATE_INDEX_DOGS_USER_SQL: &str = r#"
CREATE INDEX IF NOT EXISTS idx_dogs_user_guid
ON dogs (user_guid);
"#;

const CREATE_INDEX_COMPLETE_TESTS_DOG_SQL: &str = r#"
CREATE INDEX IF NOT EXISTS idx_complete_tests_dog_guid
ON complete_tests (dog_guid);
"#;

#[must_use]
pub fn schema_statements() -> &'static [&'static str] {
    &[
        CREATE_USERS_TABLE_SQL,
        CREATE_DOGS_TABLE_SQL,
        CREATE_COMPLETE_TESTS_TABLE_SQL,
        CREATE_INDEX_USERS_GUID_SQL,
        CREATE_INDEX_DOGS_USER_SQL,
        CREATE_INDEX_COMPLETE_TESTS_DOG_SQL,
    ]
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SnapshotWriterConfig {
    pub batch_size: usize,
}

impl Default for SnapshotWriterConfig {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_INSERT_BATCH_SIZE,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SnapshotWriteStats {
    pub users_written: usize,
    pub dogs_written: usize,
    pub completed_tests_written: usize,
    pub batches_committed: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TableCheck {
    pub table: String,
    pub present: bool,
    pub row_count: Option<u64>,
    pub missing_columns: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SchemaCheck {
    pub tables: Vec<TableCheck>,
}

impl SchemaCheck {
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.tables
            .iter()
            .all(|table| table.present && table.missing_columns.is_empty())
    }

    #[must_use]
    pub fn problems(&self) -> Vec<String> {
        let mut problems = Vec::new();
        for table in &self.tables {
            if !table.present {
                problems.push(format!("missing table `{}`", table.table));
            } else if !table.missing_columns.is_empty() {
                problems.push(format!(
                    "table `{}` is missing column(s): {}",
                    table.table,
                    table.missing_columns.join(", ")
                ));
            }
        }
        problems
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CreatedAtRange {
    pub earliest: Option<String>,
    pub latest: Option<String>,
    pub null_rows: u64,
}

/// Opens an existing snapshot without write access.
pub fn open_snapshot(path: &Path) -> Result<Connection> {
    if !path.is_file() {
        bail!("snapshot database does not exist: {}", path.display());
    }

    Connection::open_with_flags(
        path,
        OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
    )
    .with_context(|| format!("failed to open snapshot database: {}", path.display()))
}

pub fn open_snapshot_for_write(path: &Path) -> Result<Connection> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).with_context(|| {
            format!(
                "failed to create snapshot parent directory: {}",
                parent.display()
            )
        })?;
    }

    Connection::open(path)
        .with_context(|| format!("failed to open snapshot database: {}", path.display()))
}

pub fn create_snapshot_schema(connection: &Connection) -> Result<()> {
    connection
        .execute_batch(&schema_statements().join("\n"))
        .context("failed to create snapshot schema")
}

pub fn check_snapshot_schema(connection: &Connection) -> Result<SchemaCheck> {
    let mut tables = Vec::with_capacity(REQUIRED_COLUMNS.len());

    for (table, required) in REQUIRED_COLUMNS {
        if !table_exists(connection, table)? {
            tables.push(TableCheck {
                table: (*table).to_string(),
                present: false,
                row_count: None,
                missing_columns: required.iter().map(|column| (*column).to_string()).collect(),
            });
            continue;
        }

        let columns = table_columns(connection, table)?;
        let missing_columns = required
            .iter()
            .filter(|column| !columns.iter().any(|present| present == *column))
            .map(|column| (*column).to_string())
            .collect();
        let row_count = connection
            .query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |row| {
                row.get::<usize, i64>(0)
            })
            .with_context(|| format!("failed to count rows in `{table}`"))?;

        tables.push(TableCheck {
            table: (*table).to_string(),
            present: true,
            row_count: Some(u64::try_from(row_count).unwrap_or(0)),
            missing_columns,
        });
    }

    Ok(SchemaCheck { tables })
}

pub fn ensure_snapshot_schema(connection: &Connection) -> Result<()> {
    let check = check_snapshot_schema(connection)?;
    if !check.is_complete() {
        bail!("snapshot schema is incomplete: {}", check.problems().join("; "));
    }
    Ok(())
}

pub fn created_at_range(connection: &Connection) -> Result<CreatedAtRange> {
    connection
        .query_row(
            &format!(
                "SELECT MIN(created_at), MAX(created_at), COUNT(*) - COUNT(created_at) FROM {COMPLETE_TESTS_TABLE}"
            ),
            [],
            |row| {
                Ok(CreatedAtRange {
                    earliest: text_column(row, 0)?,
                    latest: text_column(row, 1)?,
                    null_rows: u64::try_from(row.get::<usize, i64>(2)?).unwrap_or(0),
                })
            },
        )
        .context("failed to query created_at range")
}

/// Loads the three source tables after checking that every column the
/// pipeline reads is present.
pub fn load_snapshot(connection: &Connection) -> Result<Snapshot> {
    ensure_snapshot_schema(connection)?;

    let users = collect_rows(
        connection,
        &format!("SELECT user_guid, exclude, country, state FROM {USERS_TABLE} ORDER BY rowid"),
        |row| {
            Ok(User {
                user_guid: text_column(row, 0)?,
                exclude: flag_column(row, 1)?,
                country: text_column(row, 2)?,
                state: text_column(row, 3)?,
            })
        },
    )
    .context("failed to load users")?;

    let dogs = collect_rows(
        connection,
        &format!("SELECT dog_guid, user_guid, exclude FROM {DOGS_TABLE} ORDER BY rowid"),
        |row| {
            Ok(Dog {
                dog_guid: text_column(row, 0)?,
                user_guid: text_column(row, 1)?,
                exclude: flag_column(row, 2)?,
            })
        },
    )
    .context("failed to load dogs")?;

    let completed_tests = collect_rows(
        connection,
        &format!("SELECT rowid, dog_guid, created_at FROM {COMPLETE_TESTS_TABLE} ORDER BY rowid"),
        |row| {
            Ok(CompletedTest {
                row_id: row.get::<usize, i64>(0)?,
                dog_guid: text_column(row, 1)?,
                created_at: text_column(row, 2)?,
            })
        },
    )
    .context("failed to load complete_tests")?;

    tracing::debug!(
        users = users.len(),
        dogs = dogs.len(),
        completed_tests = completed_tests.len(),
        "loaded snapshot"
    );

    Ok(Snapshot {
        users,
        dogs,
        completed_tests,
    })
}

pub fn load_snapshot_file(path: &Path) -> Result<Snapshot> {
    let connection = open_snapshot(path)?;
    load_snapshot(&connection)
}

pub fn write_snapshot(
    path: &Path,
    snapshot: &Snapshot,
    config: SnapshotWriterConfig,
) -> Result<SnapshotWriteStats> {
    let mut connection = open_snapshot_for_write(path)?;
    create_snapshot_schema(&connection)?;
    write_snapshot_batched(&mut connection, snapshot, config)
}

pub fn write_snapshot_batched(
    connection: &mut Connection,
    snapshot: &Snapshot,
    config: SnapshotWriterConfig,
) -> Result<SnapshotWriteStats> {
    let batch_size = config.batch_size.max(1);
    let mut batches_committed = 0usize;

    for batch in snapshot.users.chunks(batch_size) {
        let tx = connection
            .transaction()
            .context("failed to open sqlite transaction")?;
        {
            let mut statement = tx
                .prepare_cached(&format!(
                    "INSERT INTO {USERS_TABLE} (user_guid, exclude, country, state) VALUES (?1, ?2, ?3, ?4)"
                ))
                .context("failed to prepare users insert statement")?;
            for user in batch {
                statement
                    .execute(params![
                        user.user_guid,
                        opt_bool_int_value(user.exclude),
                        user.country,
                        user.state
                    ])
                    .with_context(|| format!("failed to insert user {:?}", user.user_guid))?;
            }
        }
        tx.commit().context("failed to commit users batch")?;
        batches_committed += 1;
    }

    for batch in snapshot.dogs.chunks(batch_size) {
        let tx = connection
            .transaction()
            .context("failed to open sqlite transaction")?;
        {
            let mut statement = tx
                .prepare_cached(&format!(
                    "INSERT INTO {DOGS_TABLE} (dog_guid, user_guid, exclude) VALUES (?1, ?2, ?3)"
                ))
                .context("failed to prepare dogs insert statement")?;
            for dog in batch {
                statement
                    .execute(params![
                        dog.dog_guid,
                        dog.user_guid,
                        opt_bool_int_value(dog.exclude)
                    ])
                    .with_context(|| format!("failed to insert dog {:?}", dog.dog_guid))?;
            }
        }
        tx.commit().context("failed to commit dogs batch")?;
        batches_committed += 1;
    }

    for batch in snapshot.completed_tests.chunks(batch_size) {
        let tx = connection
            .transaction()
            .context("failed to open sqlite transaction")?;
        {
            let mut statement = tx
                .prepare_cached(&format!(
                    "INSERT INTO {COMPLETE_TESTS_TABLE} (dog_guid, created_at) VALUES (?1, ?2)"
                ))
                .context("failed to prepare complete_tests insert statement")?;
            for test in batch {
                statement
                    .execute(params![test.dog_guid, test.created_at])
                    .with_context(|| {
                        format!("failed to insert completed test for {:?}", test.dog_guid)
                    })?;
            }
        }
        tx.commit()
            .context("failed to commit complete_tests batch")?;
        batches_committed += 1;
    }

    Ok(SnapshotWriteStats {
        users_written: snapshot.users.len(),
        dogs_written: snapshot.dogs.len(),
        completed_tests_written: snapshot.completed_tests.len(),
        batches_committed,
    })
}

fn collect_rows<T, F>(connection: &Connection, query: &str, map: F) -> Result<Vec<T>>
where
    F: FnMut(&Row<'_>) -> rusqlite::Result<T>,
{
    let mut statement = connection
        .prepare(query)
        .with_context(|| format!("failed to prepare query: {query}"))?;
    let rows = statement
        .query_map([], map)
        .with_context(|| format!("failed to execute query: {query}"))?;

    let mut collected = Vec::new();
    for row in rows {
        collected.push(row.context("failed to decode snapshot row")?);
    }
    Ok(collected)
}

fn table_exists(connection: &Connection, table: &str) -> Result<bool> {
    let exists = connection
        .query_row(
            "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE type IN ('table', 'view') AND name = ?1)",
            [table],
            |row| row.get::<usize, i64>(0),
        )
        .with_context(|| format!("failed to look up table `{table}`"))?;
    Ok(exists != 0)
}

fn table_columns(connection: &Connection, table: &str) -> Result<Vec<String>> {
    collect_rows(
        connection,
        &format!("SELECT name FROM pragma_table_info('{table}')"),
        |row| row.get::<usize, String>(0),
    )
}

/// Reads a guid or label column, accepting numeric storage as text.
pub(crate) fn text_column(row: &Row<'_>, index: usize) -> rusqlite::Result<Option<String>> {
    Ok(match row.get::<usize, SqlValue>(index)? {
        SqlValue::Null => None,
        SqlValue::Integer(value) => Some(value.to_string()),
        SqlValue::Real(value) => Some(value.to_string()),
        SqlValue::Text(value) => Some(value),
        SqlValue::Blob(value) => Some(String::from_utf8_lossy(&value).into_owned()),
    })
}

/// `NULL` and numeric zero include the row; every other value flags it.
fn flag_column(row: &Row<'_>, index: usize) -> rusqlite::Result<Option<bool>> {
    Ok(match row.get::<usize, SqlValue>(index)? {
        SqlValue::Null => None,
        SqlValue::Integer(value) => Some(value != 0),
        SqlValue::Real(value) => Some(value != 0.0),
        SqlValue::Text(value) => Some(
            value
                .trim()
                .parse::<f64>()
                .map_or(true, |numeric| numeric != 0.0),
        ),
        SqlValue::Blob(_) => Some(true),
    })
}

fn opt_bool_int_value(value: Option<bool>) -> SqlValue {
    match value {
        Some(true) => SqlValue::Integer(1),
        Some(false) => SqlValue::Integer(0),
        None => SqlValue::Null,
    }
}
