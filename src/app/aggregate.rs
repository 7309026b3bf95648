use std::path::PathBuf;

use futures_util::{StreamExt, stream};
use log::{debug, info, warn};
use serde::Deserialize;
use thiserror::Error;

use crate::models::ParsedReport;
use crate::parsers::{ParseError, ReportFormat};

/// What to do when one report file cannot be parsed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParseErrorPolicy {
    /// Abort the whole run.
    #[default]
    Fail,
    /// Log a warning and leave the file out.
    Skip,
}

#[derive(Debug, Error)]
pub enum AggregateError {
    #[error("no parseable report files")]
    NoReports,

    #[error("failed to parse {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: ParseError,
    },

    #[error("parser task for {} did not complete: {source}", path.display())]
    Join {
        path: PathBuf,
        #[source]
        source: tokio::task::JoinError,
    },
}

/// Combined result of parsing a set of report files.
#[derive(Debug, Default)]
pub struct Aggregate {
    pub report: ParsedReport,
    /// Files that contributed to `report`, in fold order.
    pub parsed: Vec<PathBuf>,
    /// Files left out because their extension has no parser.
    pub unsupported: Vec<PathBuf>,
    /// Files left out because parsing failed under [`ParseErrorPolicy::Skip`].
    pub failed: Vec<PathBuf>,
}

/// Parses report files on the blocking pool and folds them in input order.
pub struct Aggregator {
    concurrency: usize,
    on_parse_error: ParseErrorPolicy,
}

impl Aggregator {
    pub fn new(concurrency: usize, on_parse_error: ParseErrorPolicy) -> Self {
        Self {
            concurrency: concurrency.max(1),
            on_parse_error,
        }
    }

    pub async fn aggregate(&self, paths: &[PathBuf]) -> Result<Aggregate, AggregateError> {
        let mut aggregate = Aggregate::default();

        let mut jobs = Vec::with_capacity(paths.len());
        for path in paths {
            match ReportFormat::detect(path) {
                Some(format) => jobs.push((path.clone(), format)),
                None => {
                    warn!("Unsupported file type, skipping {}", path.display());
                    aggregate.unsupported.push(path.clone());
                }
            }
        }
        if jobs.is_empty() {
            return Err(AggregateError::NoReports);
        }

        // `buffered` yields results in input order regardless of completion order.
        let results = stream::iter(jobs)
            .map(|(path, format)| async move {
                debug!("Parsing {} as {}", path.display(), format.name());
                let task_path = path.clone();
                let outcome =
                    tokio::task::spawn_blocking(move || format.parse_file(&task_path)).await;
                (path, outcome)
            })
            .buffered(self.concurrency);
        let mut results = std::pin::pin!(results);

        while let Some((path, outcome)) = results.next().await {
            let report = match outcome {
                Ok(Ok(report)) => report,
                Ok(Err(source)) => match self.on_parse_error {
                    ParseErrorPolicy::Fail => return Err(AggregateError::Parse { path, source }),
                    ParseErrorPolicy::Skip => {
                        warn!("Skipping {}: {}", path.display(), source);
                        aggregate.failed.push(path);
                        continue;
                    }
                },
                Err(source) => return Err(AggregateError::Join { path, source }),
            };

            let summary = &report.summary;
            info!(
                "Parsed {}: {} total, {} passed, {} failed, {} skipped",
                path.display(),
                summary.total,
                summary.passed,
                summary.failed,
                summary.skipped
            );
            aggregate.report.extend(report);
            aggregate.parsed.push(path);
        }

        if aggregate.parsed.is_empty() {
            return Err(AggregateError::NoReports);
        }
        debug_assert!(aggregate.report.summary.is_consistent());
        Ok(aggregate)
    }
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use calamine::{Data, Range};

    use super::*;
    use crate::models::{RunSummary, TestStatus};
    use crate::parsers::{excel, junit};

    const JUNIT: &str = r#"<testsuite name="api" time="1.5">
  <testcase name="a" time="0.5"/>
  <testcase name="b" time="1.0"><failure message="boom"/></testcase>
</testsuite>"#;

    const HTML: &str = r#"<div class="test-case"><i class="name">c</i><i class="status">pass</i><i class="duration">1</i></div>
<div class="test-case"><i class="name">d</i><i class="status">fail</i></div>
<div class="test-case"><i class="name">e</i><i class="status">pending</i></div>"#;

    fn write(dir: &Path, name: &str, content: &str) -> PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, content).unwrap();
        path
    }

    fn titles(aggregate: &Aggregate) -> Vec<&str> {
        aggregate
            .report
            .test_cases
            .iter()
            .map(|t| t.title.as_str())
            .collect()
    }

    #[tokio::test]
    async fn folds_files_in_input_order() {
        let dir = tempfile::tempdir().unwrap();
        let html = write(dir.path(), "one.html", HTML);
        let xml = write(dir.path(), "two.xml", JUNIT);

        let aggregate = Aggregator::new(4, ParseErrorPolicy::Fail)
            .aggregate(&[html.clone(), xml.clone()])
            .await
            .unwrap();

        assert_eq!(
            aggregate.report.summary,
            RunSummary {
                total: 5,
                passed: 2,
                failed: 2,
                skipped: 1,
                duration_ms: 2500,
            }
        );
        assert_eq!(titles(&aggregate), ["c", "d", "e", "a", "b"]);
        assert_eq!(aggregate.parsed, [html, xml]);
    }

    #[tokio::test]
    async fn order_is_stable_across_concurrency_levels() {
        let dir = tempfile::tempdir().unwrap();
        let paths: Vec<_> = (0..6)
            .map(|i| {
                let xml = format!(r#"<testsuite><testcase name="t{i}"/></testsuite>"#);
                write(dir.path(), &format!("r{i}.xml"), &xml)
            })
            .collect();

        let serial = Aggregator::new(1, ParseErrorPolicy::Fail)
            .aggregate(&paths)
            .await
            .unwrap();
        let parallel = Aggregator::new(8, ParseErrorPolicy::Fail)
            .aggregate(&paths)
            .await
            .unwrap();

        assert_eq!(titles(&serial), ["t0", "t1", "t2", "t3", "t4", "t5"]);
        assert_eq!(serial.report, parallel.report);
    }

    #[tokio::test]
    async fn unsupported_files_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let xml = write(dir.path(), "ok.xml", JUNIT);
        let txt = write(dir.path(), "notes.txt", "hello");

        let aggregate = Aggregator::new(2, ParseErrorPolicy::Fail)
            .aggregate(&[txt.clone(), xml])
            .await
            .unwrap();

        assert_eq!(aggregate.unsupported, [txt]);
        assert_eq!(aggregate.report.summary.total, 2);
    }

    #[tokio::test]
    async fn no_parseable_files_is_fatal() {
        let err = Aggregator::new(2, ParseErrorPolicy::Fail)
            .aggregate(&[PathBuf::from("a.txt")])
            .await
            .unwrap_err();
        assert!(matches!(err, AggregateError::NoReports));

        let err = Aggregator::new(2, ParseErrorPolicy::Fail)
            .aggregate(&[])
            .await
            .unwrap_err();
        assert!(matches!(err, AggregateError::NoReports));
    }

    #[tokio::test]
    async fn malformed_file_fails_the_run_by_default() {
        let dir = tempfile::tempdir().unwrap();
        let good = write(dir.path(), "good.xml", JUNIT);
        let bad = write(dir.path(), "bad.xml", "<testsuite><testcase></testsuite>");

        let err = Aggregator::new(2, ParseErrorPolicy::Fail)
            .aggregate(&[good, bad.clone()])
            .await
            .unwrap_err();

        match err {
            AggregateError::Parse { path, .. } => assert_eq!(path, bad),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn skip_policy_leaves_malformed_file_out() {
        let dir = tempfile::tempdir().unwrap();
        let bad = write(dir.path(), "bad.xml", "<testsuite><testcase></testsuite>");
        let good = write(dir.path(), "good.xml", JUNIT);

        let aggregate = Aggregator::new(2, ParseErrorPolicy::Skip)
            .aggregate(&[bad.clone(), good.clone()])
            .await
            .unwrap();

        assert_eq!(aggregate.failed, [bad.clone()]);
        assert_eq!(aggregate.parsed, [good]);
        assert_eq!(aggregate.report.summary.total, 2);

        let err = Aggregator::new(2, ParseErrorPolicy::Skip)
            .aggregate(&[bad])
            .await
            .unwrap_err();
        assert!(matches!(err, AggregateError::NoReports));
    }

    #[test]
    fn junit_and_excel_reports_fold_together() {
        let mut sheet = Range::new((0, 0), (3, 1));
        let cells = [
            ["Name", "Status"],
            ["x", "pass"],
            ["y", "skip"],
            ["z", "blocked"],
        ];
        for (r, row) in cells.iter().enumerate() {
            for (c, text) in row.iter().enumerate() {
                sheet.set_value((r as u32, c as u32), Data::String(text.to_string()));
            }
        }

        let mut combined = ParsedReport::default();
        combined.extend(junit::parse(JUNIT).unwrap());
        combined.extend(excel::parse_range(&sheet));

        assert_eq!(combined.summary.total, 5);
        assert_eq!(combined.summary.passed, 2);
        assert_eq!(combined.summary.failed, 1);
        assert_eq!(combined.summary.skipped, 2);
        assert!(combined.summary.is_consistent());
        assert_eq!(combined.test_cases.len(), 5);
        assert_eq!(combined.test_cases[4].status, TestStatus::Skipped);
    }
}
