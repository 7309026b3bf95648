pub mod http;
pub mod sqlite;

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::config::{Config, Transport};
use crate::models::{ParsedReport, TestCaseRecord};

/// Destination for a normalized test run.
#[async_trait]
pub trait ReportSink: Send + Sync {
    /// Persist or transmit one run.
    async fn publish(&self, report: &RunReport) -> Result<()>;

    /// Release any held resources. Publishing afterwards is an error.
    async fn shutdown(&self) -> Result<()> {
        Ok(())
    }

    /// Display name for this sink (e.g., "HTTP").
    fn name(&self) -> &str;
}

/// Construct the sink selected by the configuration.
pub fn connect(config: &Config) -> Result<Arc<dyn ReportSink>> {
    match config.transport {
        Transport::Http => {
            let url = config
                .server_api_url
                .as_deref()
                .context("serverApiUrl is required in the configuration")?;
            let timeout = Duration::from_secs(config.http.timeout_secs);
            Ok(Arc::new(http::HttpSink::new(url, timeout)?))
        }
        Transport::Sqlite => {
            let path = config
                .database_path
                .as_deref()
                .context("databasePath is required in the configuration")?;
            Ok(Arc::new(sqlite::SqliteSink::init(path)?))
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Passed,
    Failed,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Passed => "passed",
            RunStatus::Failed => "failed",
        }
    }
}

/// The payload handed to a sink: run identity, counters and every test case.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunReport {
    pub user_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub project_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub project_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub project_description: Option<String>,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub environment: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub branch: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub commit: Option<String>,
    pub total_tests: usize,
    pub passed_tests: usize,
    pub failed_tests: usize,
    pub skipped_tests: usize,
    /// Milliseconds.
    pub total_duration: u64,
    pub test_cases: Vec<TestCaseRecord>,
    pub status: RunStatus,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
}

impl RunReport {
    pub fn new(
        config: &Config,
        parsed: ParsedReport,
        start_time: DateTime<Utc>,
        end_time: DateTime<Utc>,
    ) -> Self {
        let summary = parsed.summary;
        Self {
            user_id: config.user_id.clone().unwrap_or_default(),
            project_name: config.project_name.clone(),
            project_id: config.project_id.clone(),
            project_description: config.project_description.clone(),
            name: config.run_name().to_string(),
            environment: config.environment.clone(),
            branch: config.branch.clone(),
            commit: config.commit.clone(),
            total_tests: summary.total,
            passed_tests: summary.passed,
            failed_tests: summary.failed,
            skipped_tests: summary.skipped,
            total_duration: summary.duration_ms,
            test_cases: parsed.test_cases,
            status: if summary.has_failures() {
                RunStatus::Failed
            } else {
                RunStatus::Passed
            },
            start_time,
            end_time,
        }
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;
    use crate::models::TestStatus;

    /// A two-case run with one failure.
    pub fn run_report() -> RunReport {
        let config = Config {
            user_id: Some("user-1".into()),
            project_name: Some("web".into()),
            project_description: Some("storefront".into()),
            branch: Some("main".into()),
            ..Config::default()
        };
        let mut parsed = ParsedReport::default();
        parsed.push(TestCaseRecord::new("a", TestStatus::Passed, 500));
        let mut failed = TestCaseRecord::new("b", TestStatus::Failed, 1000);
        failed.error_message = Some("boom".into());
        failed.suite = Some("api".into());
        parsed.push(failed);

        let now = Utc::now();
        RunReport::new(&config, parsed, now, now)
    }
}
