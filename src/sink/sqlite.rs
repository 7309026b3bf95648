use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use chrono::Utc;
use log::{debug, info};
use rusqlite::{Connection, OptionalExtension, Transaction, params};
use uuid::Uuid;

use super::{ReportSink, RunReport};

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS projects (
    id          TEXT PRIMARY KEY,
    name        TEXT NOT NULL UNIQUE,
    description TEXT,
    status      TEXT NOT NULL DEFAULT 'Active' CHECK (status IN ('Active', 'Inactive')),
    created_at  TEXT NOT NULL,
    updated_at  TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS test_runs (
    id             TEXT PRIMARY KEY,
    name           TEXT NOT NULL,
    status         TEXT NOT NULL CHECK (status IN ('running', 'passed', 'failed')),
    start_time     TEXT NOT NULL,
    end_time       TEXT,
    total_tests    INTEGER NOT NULL DEFAULT 0,
    passed_tests   INTEGER NOT NULL DEFAULT 0,
    failed_tests   INTEGER NOT NULL DEFAULT 0,
    skipped_tests  INTEGER NOT NULL DEFAULT 0,
    total_duration REAL NOT NULL DEFAULT 0,
    environment    TEXT,
    branch         TEXT,
    "commit"       TEXT,
    user_id        TEXT NOT NULL,
    project_id     TEXT REFERENCES projects(id),
    created_at     TEXT NOT NULL,
    updated_at     TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS test_cases (
    id            TEXT PRIMARY KEY,
    test_run_id   TEXT NOT NULL REFERENCES test_runs(id) ON DELETE CASCADE,
    position      INTEGER NOT NULL,
    name          TEXT NOT NULL,
    status        TEXT NOT NULL CHECK (status IN ('Passed', 'Failed', 'Skipped')),
    duration      INTEGER,
    error_message TEXT,
    error_stack   TEXT,
    retry_count   INTEGER NOT NULL DEFAULT 0,
    suite         TEXT,
    file          TEXT,
    created_at    TEXT NOT NULL,
    updated_at    TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS test_cases_run ON test_cases (test_run_id, position);
"#;

/// Stores runs in a SQLite database: one `test_runs` row per run with its
/// `test_cases` children.
///
/// The connection is opened by [`SqliteSink::init`] and closed by
/// [`ReportSink::shutdown`].
pub struct SqliteSink {
    path: PathBuf,
    conn: Mutex<Option<Connection>>,
}

impl SqliteSink {
    /// Open (or create) the database and make sure the tables exist.
    pub fn init(path: &Path) -> Result<Self> {
        info!("Opening database {}", path.display());
        let conn = Connection::open(path)
            .with_context(|| format!("failed to open database {}", path.display()))?;
        conn.execute_batch(SCHEMA)
            .context("failed to create database tables")?;
        Ok(Self {
            path: path.to_path_buf(),
            conn: Mutex::new(Some(conn)),
        })
    }
}

#[async_trait]
impl ReportSink for SqliteSink {
    async fn publish(&self, report: &RunReport) -> Result<()> {
        let mut guard = self
            .conn
            .lock()
            .map_err(|_| anyhow!("database connection lock poisoned"))?;
        let conn = guard.as_mut().context("database connection is closed")?;

        let tx = conn.transaction()?;
        let run_id = insert_run(&tx, report)?;
        tx.commit().context("failed to commit test run")?;

        info!(
            "Stored test run {} with {} test case(s) in {}",
            run_id,
            report.test_cases.len(),
            self.path.display()
        );
        Ok(())
    }

    async fn shutdown(&self) -> Result<()> {
        let conn = self
            .conn
            .lock()
            .map_err(|_| anyhow!("database connection lock poisoned"))?
            .take();
        if let Some(conn) = conn {
            debug!("Closing database {}", self.path.display());
            conn.close()
                .map_err(|(_, e)| e)
                .context("failed to close database")?;
        }
        Ok(())
    }

    fn name(&self) -> &str {
        "SQLite"
    }
}

fn insert_run(tx: &Transaction<'_>, report: &RunReport) -> Result<String> {
    let now = Utc::now().to_rfc3339();
    let project_id = resolve_project(tx, report, &now)?;
    let run_id = Uuid::new_v4().to_string();

    tx.execute(
        r#"INSERT INTO test_runs (
            id, name, status, start_time, end_time,
            total_tests, passed_tests, failed_tests, skipped_tests, total_duration,
            environment, branch, "commit", user_id, project_id, created_at, updated_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?16)"#,
        params![
            run_id,
            report.name,
            report.status.as_str(),
            report.start_time.to_rfc3339(),
            report.end_time.to_rfc3339(),
            report.total_tests as i64,
            report.passed_tests as i64,
            report.failed_tests as i64,
            report.skipped_tests as i64,
            report.total_duration as f64,
            report.environment,
            report.branch,
            report.commit,
            report.user_id,
            project_id,
            now,
        ],
    )
    .context("failed to insert test run")?;

    let mut stmt = tx.prepare(
        "INSERT INTO test_cases (
            id, test_run_id, position, name, status, duration,
            error_message, error_stack, suite, file, created_at, updated_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?11)",
    )?;
    for (position, case) in report.test_cases.iter().enumerate() {
        stmt.execute(params![
            Uuid::new_v4().to_string(),
            run_id,
            position as i64,
            case.title,
            case.status.label(),
            case.duration_ms as i64,
            case.error_message,
            case.error_stack,
            case.suite,
            case.file,
            now,
        ])
        .with_context(|| format!("failed to insert test case {:?}", case.title))?;
    }

    Ok(run_id)
}

/// An explicit `projectId` wins and is registered on first use; otherwise the
/// project is looked up by name and created on first use.
fn resolve_project(tx: &Transaction<'_>, report: &RunReport, now: &str) -> Result<Option<String>> {
    if let Some(id) = report.project_id.as_deref().filter(|id| !id.is_empty()) {
        let known = tx
            .query_row("SELECT 1 FROM projects WHERE id = ?1", [id], |_| Ok(()))
            .optional()
            .context("failed to look up project")?
            .is_some();
        if !known {
            let name = report
                .project_name
                .as_deref()
                .filter(|n| !n.is_empty())
                .unwrap_or(id);
            debug!("Registering project {id} as {name:?}");
            tx.execute(
                "INSERT INTO projects (id, name, description, status, created_at, updated_at)
                 VALUES (?1, ?2, ?3, 'Active', ?4, ?4)",
                params![id, name, report.project_description, now],
            )
            .with_context(|| format!("failed to register project {id}"))?;
        }
        return Ok(Some(id.to_string()));
    }
    let Some(name) = report.project_name.as_deref().filter(|n| !n.is_empty()) else {
        return Ok(None);
    };

    tx.execute(
        "INSERT INTO projects (id, name, description, status, created_at, updated_at)
         VALUES (?1, ?2, ?3, 'Active', ?4, ?4)
         ON CONFLICT(name) DO NOTHING",
        params![Uuid::new_v4().to_string(), name, report.project_description, now],
    )
    .context("failed to create project")?;
    let id = tx
        .query_row("SELECT id FROM projects WHERE name = ?1", [name], |row| {
            row.get::<_, String>(0)
        })
        .context("failed to look up project")?;
    Ok(Some(id))
}
