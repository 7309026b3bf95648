use serde::{Deserialize, Serialize};

use super::status::TestStatus;

/// One observed test execution, as normalized from any report format.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestCaseRecord {
    pub title: String,
    pub status: TestStatus,
    #[serde(rename = "duration")]
    pub duration_ms: u64,
    pub error_message: Option<String>,
    pub error_stack: Option<String>,
    pub file: Option<String>,
    pub suite: Option<String>,
}

impl TestCaseRecord {
    pub fn new(title: impl Into<String>, status: TestStatus, duration_ms: u64) -> Self {
        Self {
            title: title.into(),
            status,
            duration_ms,
            error_message: None,
            error_stack: None,
            file: None,
            suite: None,
        }
    }
}

/// Pass/fail/skip counters plus total duration.
///
/// Counters only move through [`RunSummary::count`] and [`RunSummary::absorb`],
/// which keeps `total == passed + failed + skipped`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunSummary {
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
    pub skipped: usize,
    pub duration_ms: u64,
}

impl RunSummary {
    pub fn count(&mut self, status: TestStatus) {
        self.total += 1;
        match status {
            TestStatus::Passed => self.passed += 1,
            TestStatus::Failed => self.failed += 1,
            TestStatus::Skipped => self.skipped += 1,
        }
    }

    /// Field-wise sum of another summary into this one.
    pub fn absorb(&mut self, other: &RunSummary) {
        self.total += other.total;
        self.passed += other.passed;
        self.failed += other.failed;
        self.skipped += other.skipped;
        self.duration_ms = self.duration_ms.saturating_add(other.duration_ms);
    }

    pub fn is_consistent(&self) -> bool {
        self.total == self.passed + self.failed + self.skipped
    }

    pub fn has_failures(&self) -> bool {
        self.failed > 0
    }
}

/// The output of parsing one report file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedReport {
    pub summary: RunSummary,
    pub test_cases: Vec<TestCaseRecord>,
}

impl ParsedReport {
    /// Count a record into the summary (including its duration) and keep it.
    pub fn push(&mut self, record: TestCaseRecord) {
        self.summary.count(record.status);
        self.summary.duration_ms = self.summary.duration_ms.saturating_add(record.duration_ms);
        self.test_cases.push(record);
    }

    /// Append another report, preserving order.
    pub fn extend(&mut self, other: ParsedReport) {
        self.summary.absorb(&other.summary);
        self.test_cases.extend(other.test_cases);
    }
}
