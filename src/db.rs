//! Database layer for the advisor's learning state
//!
//! SQLite, single file, no network. Holds the bandit arms, the ledger of
//! issued recommendations, human decisions, measured outcomes and an audit
//! trail of past cycles. Team and task records stay with the host product.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection};
use std::path::Path;

use crate::types::CycleReport;

/// Initialize the database with schema
pub fn init_db(path: &Path) -> Result<Connection> {
    let conn = Connection::open(path)
        .with_context(|| format!("Failed to open database at {:?}", path))?;

    conn.execute_batch(SCHEMA)?;

    Ok(conn)
}

/// Throwaway database for tests and one-shot runs
pub fn open_in_memory() -> Result<Connection> {
    let conn = Connection::open_in_memory().context("Failed to open in-memory database")?;
    conn.execute_batch(SCHEMA)?;
    Ok(conn)
}

const SCHEMA: &str = r#"
-- One Beta(alpha, beta) posterior per project and recommendation type
CREATE TABLE IF NOT EXISTS bandit_arms (
    project TEXT NOT NULL,
    kind TEXT NOT NULL,
    alpha REAL NOT NULL DEFAULT 2.0,
    beta REAL NOT NULL DEFAULT 2.0,
    accepts INTEGER NOT NULL DEFAULT 0,
    rejects INTEGER NOT NULL DEFAULT 0,
    version INTEGER NOT NULL DEFAULT 0,   -- compare-and-swap key
    updated_at TEXT NOT NULL,
    PRIMARY KEY (project, kind)
);

-- Recommendations handed out, so later decisions find their arm
CREATE TABLE IF NOT EXISTS recommendations (
    id TEXT PRIMARY KEY,
    project TEXT NOT NULL,
    kind TEXT NOT NULL,
    cycle_id TEXT NOT NULL,
    predicted_json TEXT NOT NULL,         -- ImpactEstimate at issue time
    issued_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_recommendations_project ON recommendations(project);

-- At most one human verdict per recommendation
CREATE TABLE IF NOT EXISTS decisions (
    recommendation_id TEXT PRIMARY KEY REFERENCES recommendations(id),
    verdict TEXT NOT NULL CHECK (verdict IN ('ACCEPT', 'REJECT')),
    reason TEXT,
    decided_at TEXT NOT NULL
);

-- Measured effects; write-once via the primary key
CREATE TABLE IF NOT EXISTS outcomes (
    recommendation_id TEXT PRIMARY KEY REFERENCES recommendations(id),
    delivery_delta REAL NOT NULL,
    cost_delta REAL NOT NULL,
    burnout_delta REAL NOT NULL,
    on_time INTEGER NOT NULL,
    measured_at TEXT NOT NULL
);

-- Audit trail of completed cycles
CREATE TABLE IF NOT EXISTS cycles (
    id TEXT PRIMARY KEY,
    project TEXT NOT NULL,
    cycle_at TEXT NOT NULL,
    seed TEXT NOT NULL,
    snapshot_hash TEXT NOT NULL,
    confidence INTEGER NOT NULL,
    report_json TEXT NOT NULL,
    created_at TEXT DEFAULT CURRENT_TIMESTAMP
);

CREATE INDEX IF NOT EXISTS idx_cycles_project ON cycles(project, cycle_at);
"#;

/// Save a finished cycle report
pub fn insert_cycle(conn: &Connection, report: &CycleReport) -> Result<()> {
    let report_json = serde_json::to_string(report)?;
    conn.execute(
        r#"
        INSERT INTO cycles (id, project, cycle_at, seed, snapshot_hash, confidence, report_json)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
        "#,
        params![
            report.cycle_id,
            report.project,
            report.cycle_at.to_rfc3339(),
            report.seed.to_string(),
            report.snapshot_hash,
            report.confidence,
            report_json,
        ],
    )?;
    Ok(())
}

/// Most recent cycle reports for a project, newest first
pub fn recent_cycles(conn: &Connection, project: &str, limit: usize) -> Result<Vec<CycleReport>> {
    let mut stmt = conn.prepare(
        "SELECT report_json FROM cycles WHERE project = ?1 ORDER BY cycle_at DESC, created_at DESC LIMIT ?2",
    )?;

    let rows = stmt
        .query_map(params![project, limit as i64], |row| row.get::<_, String>(0))?
        .collect::<Result<Vec<_>, _>>()?;

    rows.iter()
        .map(|json| serde_json::from_str(json).context("Corrupt cycle report"))
        .collect()
}

/// Parse an RFC 3339 column
pub(crate) fn parse_timestamp(idx: usize, raw: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e)))
}
