use crate::loader::LoadedDataset;
use crate::model::{LevelCounts, SchoolId, TestResult};
use crate::repo::TestResultRepository;
use anyhow::anyhow;
use rusqlite::{Connection, OptionalExtension};
use serde::Serialize;
use std::path::Path;
use uuid::Uuid;

pub const DB_FILE_NAME: &str = "schoolreport.sqlite3";

pub fn open_db(workspace: &Path) -> anyhow::Result<Connection> {
    std::fs::create_dir_all(workspace)?;
    let db_path = workspace.join(DB_FILE_NAME);
    let conn = Connection::open(db_path)?;
    conn.execute("PRAGMA foreign_keys = ON", [])?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS datasets(
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            source_path TEXT NOT NULL,
            sha256 TEXT NOT NULL UNIQUE,
            imported_at TEXT NOT NULL,
            row_count INTEGER NOT NULL,
            skipped_rows INTEGER NOT NULL,
            invalid_count INTEGER NOT NULL DEFAULT 0
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS test_results(
            dataset_id TEXT NOT NULL,
            ordinal INTEGER NOT NULL,
            school_id TEXT NOT NULL,
            name TEXT NOT NULL,
            grade INTEGER NOT NULL,
            year INTEGER NOT NULL,
            num_tested INTEGER NOT NULL,
            level1 INTEGER NOT NULL,
            level2 INTEGER NOT NULL,
            level3 INTEGER NOT NULL,
            level4 INTEGER NOT NULL,
            PRIMARY KEY(dataset_id, ordinal),
            FOREIGN KEY(dataset_id) REFERENCES datasets(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_test_results_dataset_grade_year
         ON test_results(dataset_id, grade, year)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS settings(
            key TEXT PRIMARY KEY,
            value_json TEXT NOT NULL
        )",
        [],
    )?;

    Ok(conn)
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DatasetRow {
    pub id: String,
    pub name: String,
    pub source_path: String,
    pub sha256: String,
    pub imported_at: String,
    pub row_count: i64,
    pub skipped_rows: i64,
    pub invalid_count: i64,
}

const DATASET_COLUMNS: &str =
    "id, name, source_path, sha256, imported_at, row_count, skipped_rows, invalid_count";

fn dataset_from_row(r: &rusqlite::Row<'_>) -> rusqlite::Result<DatasetRow> {
    Ok(DatasetRow {
        id: r.get(0)?,
        name: r.get(1)?,
        source_path: r.get(2)?,
        sha256: r.get(3)?,
        imported_at: r.get(4)?,
        row_count: r.get(5)?,
        skipped_rows: r.get(6)?,
        invalid_count: r.get(7)?,
    })
}

pub fn find_dataset_by_sha256(
    conn: &Connection,
    sha256: &str,
) -> anyhow::Result<Option<DatasetRow>> {
    let sql = format!("SELECT {} FROM datasets WHERE sha256 = ?", DATASET_COLUMNS);
    Ok(conn
        .query_row(&sql, [sha256], dataset_from_row)
        .optional()?)
}

pub fn get_dataset(conn: &Connection, dataset_id: &str) -> anyhow::Result<Option<DatasetRow>> {
    let sql = format!("SELECT {} FROM datasets WHERE id = ?", DATASET_COLUMNS);
    Ok(conn
        .query_row(&sql, [dataset_id], dataset_from_row)
        .optional()?)
}

pub fn list_datasets(conn: &Connection) -> anyhow::Result<Vec<DatasetRow>> {
    let sql = format!(
        "SELECT {} FROM datasets ORDER BY imported_at, rowid",
        DATASET_COLUMNS
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map([], dataset_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// Stores a loaded dataset and its rows in input order.
pub fn insert_dataset(
    conn: &Connection,
    name: &str,
    source_path: &Path,
    loaded: &LoadedDataset,
) -> anyhow::Result<DatasetRow> {
    let row = DatasetRow {
        id: Uuid::new_v4().to_string(),
        name: name.to_string(),
        source_path: source_path.to_string_lossy().to_string(),
        sha256: loaded.sha256.clone(),
        imported_at: chrono::Utc::now().to_rfc3339(),
        row_count: loaded.results.len() as i64,
        skipped_rows: loaded.skipped_rows as i64,
        invalid_count: loaded
            .results
            .iter()
            .filter(|r| r.avg().is_invalid())
            .count() as i64,
    };

    let tx = conn.unchecked_transaction()?;
    tx.execute(
        "INSERT INTO datasets(
            id, name, source_path, sha256, imported_at, row_count, skipped_rows, invalid_count)
         VALUES(?, ?, ?, ?, ?, ?, ?, ?)",
        (
            &row.id,
            &row.name,
            &row.source_path,
            &row.sha256,
            &row.imported_at,
            row.row_count,
            row.skipped_rows,
            row.invalid_count,
        ),
    )?;
    {
        let mut stmt = tx.prepare(
            "INSERT INTO test_results(
                dataset_id, ordinal, school_id, name, grade, year,
                num_tested, level1, level2, level3, level4)
             VALUES(?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )?;
        for (ordinal, r) in loaded.results.iter().enumerate() {
            let levels = r.levels();
            stmt.execute(rusqlite::params![
                &row.id,
                ordinal as i64,
                r.id().as_str(),
                r.name(),
                r.grade(),
                r.year(),
                r.num_tested(),
                levels.level1,
                levels.level2,
                levels.level3,
                levels.level4,
            ])?;
        }
    }
    tx.commit()?;
    Ok(row)
}

/// Rebuilds the repository for a dataset; derived fields are recomputed.
pub fn load_repository(
    conn: &Connection,
    dataset_id: &str,
) -> anyhow::Result<Option<TestResultRepository>> {
    if get_dataset(conn, dataset_id)?.is_none() {
        return Ok(None);
    }

    let mut stmt = conn.prepare(
        "SELECT school_id, name, grade, year, num_tested, level1, level2, level3, level4
         FROM test_results
         WHERE dataset_id = ?
         ORDER BY ordinal",
    )?;
    let rows = stmt
        .query_map([dataset_id], |r| {
            Ok((
                r.get::<_, String>(0)?,
                r.get::<_, String>(1)?,
                r.get::<_, i64>(2)?,
                r.get::<_, i64>(3)?,
                r.get::<_, i64>(4)?,
                LevelCounts {
                    level1: r.get(5)?,
                    level2: r.get(6)?,
                    level3: r.get(7)?,
                    level4: r.get(8)?,
                },
            ))
        })?
        .collect::<Result<Vec<_>, _>>()?;

    let mut results = Vec::with_capacity(rows.len());
    for (school_id, name, grade, year, num_tested, levels) in rows {
        let id = SchoolId::parse(&school_id).map_err(|e| anyhow!(e))?;
        let r = TestResult::new(id, name, grade, year, num_tested, levels)
            .map_err(|e| anyhow!("stored row {} is invalid: {}", school_id, e))?;
        results.push(r);
    }
    Ok(Some(TestResultRepository::from_results(dataset_id, results)))
}

pub fn settings_get_json(
    conn: &Connection,
    key: &str,
) -> anyhow::Result<Option<serde_json::Value>> {
    let raw: Option<String> = conn
        .query_row(
            "SELECT value_json FROM settings WHERE key = ?",
            [key],
            |r| r.get(0),
        )
        .optional()?;
    match raw {
        Some(s) => Ok(Some(serde_json::from_str(&s)?)),
        None => Ok(None),
    }
}

pub fn settings_set_json(
    conn: &Connection,
    key: &str,
    value: &serde_json::Value,
) -> anyhow::Result<()> {
    conn.execute(
        "INSERT INTO settings(key, value_json) VALUES(?, ?)
         ON CONFLICT(key) DO UPDATE SET value_json = excluded.value_json",
        (key, serde_json::to_string(value)?),
    )?;
    Ok(())
}
