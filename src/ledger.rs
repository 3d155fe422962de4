use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::Connection;

pub fn connect(path: &Path) -> Result<Connection> {
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create {}", dir.display()))?;
    }
    let conn = Connection::open(path).with_context(|| format!("Failed to open {:?}", path))?;
    conn.execute_batch("PRAGMA journal_mode=WAL;")?;
    Ok(conn)
}

pub fn init_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS extract_runs (
            id             INTEGER PRIMARY KEY,
            run_id         TEXT NOT NULL,
            extract        TEXT NOT NULL,
            years          TEXT NOT NULL,
            rows_loaded    INTEGER NOT NULL,
            failed_count   INTEGER NOT NULL,
            failed_sample  TEXT,
            error          TEXT,
            started_at     TEXT NOT NULL,
            finished_at    TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_runs_extract ON extract_runs(extract);
        CREATE INDEX IF NOT EXISTS idx_runs_run_id ON extract_runs(run_id);
        ",
    )?;
    Ok(())
}

pub fn new_run_id() -> String {
    format!("run-{}", Utc::now().format("%Y%m%dT%H%M%S%.3f"))
}

#[derive(Debug, Clone)]
pub struct RunRow {
    pub run_id: String,
    pub extract: String,
    pub years: String,
    pub rows_loaded: usize,
    pub failed_count: usize,
    /// JSON array of the first failed keys.
    pub failed_sample: Option<String>,
    pub error: Option<String>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

pub fn insert_run(conn: &Connection, row: &RunRow) -> Result<()> {
    conn.execute(
        "INSERT INTO extract_runs
         (run_id, extract, years, rows_loaded, failed_count, failed_sample, error, started_at, finished_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
        rusqlite::params![
            row.run_id,
            row.extract,
            row.years,
            row.rows_loaded as i64,
            row.failed_count as i64,
            row.failed_sample,
            row.error,
            row.started_at,
            row.finished_at,
        ],
    )?;
    Ok(())
}

/// Most recent runs first.
pub fn fetch_recent_runs(conn: &Connection, limit: usize) -> Result<Vec<RunRow>> {
    let mut stmt = conn.prepare(
        "SELECT run_id, extract, years, rows_loaded, failed_count, failed_sample, error,
                started_at, finished_at
         FROM extract_runs
         ORDER BY id DESC
         LIMIT ?1",
    )?;
    let rows = stmt
        .query_map([limit as i64], |row| {
            Ok(RunRow {
                run_id: row.get(0)?,
                extract: row.get(1)?,
                years: row.get(2)?,
                rows_loaded: row.get::<_, i64>(3)? as usize,
                failed_count: row.get::<_, i64>(4)? as usize,
                failed_sample: row.get(5)?,
                error: row.get(6)?,
                started_at: row.get(7)?,
                finished_at: row.get(8)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}
