use std::fs::{create_dir_all, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use rusqlite::{params, Connection, OpenFlags};
use serde::Serialize;
use thiserror::Error;

use crate::config::InkpostConfig;
use crate::workflow::PublishReport;

#[derive(Debug, Error)]
pub enum AuditError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),
    #[error("serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    pub run_id: String,
    pub ts: String,
    pub target_id: String,
    pub title: String,
    pub auth_tier: Option<String>,
    pub saved: bool,
    pub published: bool,
    pub failure: Option<String>,
    pub attempts: i64,
}

/// Publish runs as JSON lines plus a SQLite ledger of runs and injection
/// attempts.
#[derive(Debug)]
pub struct AuditLog {
    log: Mutex<File>,
    db_path: PathBuf,
    flags: OpenFlags,
}

impl AuditLog {
    pub fn new(log_path: impl AsRef<Path>, db_path: impl AsRef<Path>) -> Result<Self, AuditError> {
        let log_path = log_path.as_ref().to_path_buf();
        if let Some(parent) = log_path.parent() {
            create_dir_all(parent)?;
        }
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&log_path)?;
        let db_path = db_path.as_ref().to_path_buf();
        if let Some(parent) = db_path.parent() {
            create_dir_all(parent)?;
        }
        let audit = Self {
            log: Mutex::new(file),
            db_path,
            flags: OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_CREATE,
        };
        audit.initialize_db()?;
        Ok(audit)
    }

    pub fn from_config(config: &InkpostConfig) -> Result<Self, AuditError> {
        Self::new(
            config.resolve_path(&config.observability.audit_log),
            config.resolve_path(&config.observability.audit_db),
        )
    }

    fn initialize_db(&self) -> Result<(), AuditError> {
        let conn = self.open_db()?;
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS publish_runs (
                run_id TEXT PRIMARY KEY,
                ts DATETIME DEFAULT CURRENT_TIMESTAMP,
                target_id TEXT,
                title TEXT,
                auth_tier TEXT,
                saved INTEGER,
                published INTEGER,
                failure TEXT
            );
            CREATE INDEX IF NOT EXISTS idx_publish_runs_ts ON publish_runs(ts DESC);
            CREATE TABLE IF NOT EXISTS injection_attempts (
                run_id TEXT,
                field TEXT,
                seq INTEGER,
                strategy_id TEXT,
                succeeded INTEGER,
                observed_length INTEGER,
                evidence TEXT
            );
            CREATE INDEX IF NOT EXISTS idx_injection_attempts_run ON injection_attempts(run_id);",
        )?;
        Ok(())
    }

    fn open_db(&self) -> Result<Connection, AuditError> {
        Ok(Connection::open_with_flags(&self.db_path, self.flags)?)
    }

    pub fn database_path(&self) -> &Path {
        &self.db_path
    }

    pub fn record_run(&self, report: &PublishReport) -> Result<(), AuditError> {
        let json = serde_json::to_string(report)?;
        if let Ok(mut guard) = self.log.lock() {
            writeln!(guard, "{json}")?;
            guard.flush()?;
        }

        let failure = report
            .first_failure()
            .map(|record| format!("{}: {}", record.step, record.detail));
        let auth_tier = report
            .auth
            .as_ref()
            .and_then(|auth| auth.tier)
            .map(|tier| tier.to_string());
        let run_id = report.run_id.to_string();

        let mut conn = self.open_db()?;
        let tx = conn.transaction()?;
        tx.execute(
            "INSERT OR REPLACE INTO publish_runs (
                run_id, ts, target_id, title, auth_tier, saved, published, failure
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                run_id,
                report.started_at.to_rfc3339(),
                report.target_id,
                report.title,
                auth_tier,
                report.saved as i64,
                report.published as i64,
                failure,
            ],
        )?;
        for injection in &report.injections {
            for (seq, attempt) in injection.attempts.iter().enumerate() {
                tx.execute(
                    "INSERT INTO injection_attempts (
                        run_id, field, seq, strategy_id, succeeded, observed_length, evidence
                    ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                    params![
                        run_id,
                        injection.field.to_string(),
                        seq as i64,
                        attempt.strategy_id,
                        attempt.succeeded as i64,
                        attempt.observed_length as i64,
                        attempt.evidence,
                    ],
                )?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    /// Most recent runs first.
    pub fn recent_runs(&self, limit: usize) -> Result<Vec<RunSummary>, AuditError> {
        let conn = self.open_db()?;
        let mut stmt = conn.prepare(
            "SELECT r.run_id, r.ts, r.target_id, r.title, r.auth_tier, r.saved, r.published, r.failure,
                    (SELECT COUNT(*) FROM injection_attempts a WHERE a.run_id = r.run_id)
             FROM publish_runs r
             ORDER BY r.ts DESC
             LIMIT ?1",
        )?;
        let rows = stmt.query_map(params![limit as i64], |row| {
            Ok(RunSummary {
                run_id: row.get(0)?,
                ts: row.get(1)?,
                target_id: row.get(2)?,
                title: row.get(3)?,
                auth_tier: row.get(4)?,
                saved: row.get::<_, i64>(5)? != 0,
                published: row.get::<_, i64>(6)? != 0,
                failure: row.get(7)?,
                attempts: row.get(8)?,
            })
        })?;
        let mut runs = Vec::new();
        for row in rows {
            runs.push(row?);
        }
        Ok(runs)
    }
}
