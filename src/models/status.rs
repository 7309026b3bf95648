use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TestStatus {
    #[default]
    Passed,
    Failed,
    Skipped,
}

impl TestStatus {
    /// Map a free-form status string from a report onto the canonical three states.
    ///
    /// Matching is case-insensitive and ignores surrounding whitespace. Anything
    /// not recognised as a pass or a failure is treated as skipped, so every
    /// record lands in exactly one summary bucket.
    pub fn normalize(raw: &str) -> Self {
        match raw.trim().to_lowercase().as_str() {
            "pass" | "passed" | "ok" | "success" => TestStatus::Passed,
            "fail" | "failed" | "failure" | "error" | "broken" => TestStatus::Failed,
            _ => TestStatus::Skipped,
        }
    }

    /// Capitalised label used by the relational store.
    pub fn label(&self) -> &'static str {
        match self {
            TestStatus::Passed => "Passed",
            TestStatus::Failed => "Failed",
            TestStatus::Skipped => "Skipped",
        }
    }
}
