use anyhow::{Context, Result};
use chrono::Utc;
use log::info;

use crate::config::Config;
use crate::sink::{ReportSink, RunReport};

pub mod aggregate;
pub mod scan;

pub use aggregate::{Aggregate, Aggregator};

/// A run ready to be published, plus what happened to each report file.
#[derive(Debug)]
pub struct Collected {
    pub report: RunReport,
    pub files_parsed: usize,
    pub files_unsupported: usize,
    pub files_failed: usize,
}

/// Scan the configured reports directory and normalize every report in it.
///
/// Only the run fields of `config` are checked here; sink settings are the
/// caller's concern.
pub async fn collect(config: &Config) -> Result<Collected> {
    config.validate_run()?;
    let start_time = Utc::now();

    let dir = config.reports_dir()?;
    info!("Scanning reports directory {}", dir.display());
    let files = scan::discover(dir, &config.discovery.ignore)?;
    info!("Found {} report file(s)", files.len());

    let aggregator = Aggregator::new(
        config.discovery.concurrency,
        config.discovery.on_parse_error,
    );
    let Aggregate {
        report,
        parsed,
        unsupported,
        failed,
    } = aggregator
        .aggregate(&files)
        .await
        .context("failed to aggregate test reports")?;

    let summary = report.summary;
    info!(
        "Aggregated {} file(s): {} total, {} passed, {} failed, {} skipped in {}ms",
        parsed.len(),
        summary.total,
        summary.passed,
        summary.failed,
        summary.skipped,
        summary.duration_ms
    );

    Ok(Collected {
        report: RunReport::new(config, report, start_time, Utc::now()),
        files_parsed: parsed.len(),
        files_unsupported: unsupported.len(),
        files_failed: failed.len(),
    })
}

/// Hand a collected run to a sink.
pub async fn publish(report: &RunReport, sink: &dyn ReportSink) -> Result<()> {
    info!(
        "Publishing {} test case(s) via {}",
        report.test_cases.len(),
        sink.name()
    );
    sink.publish(report)
        .await
        .with_context(|| format!("failed to publish test results via {}", sink.name()))
}
