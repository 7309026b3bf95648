use scraper::{ElementRef, Html, Selector};

use crate::models::{ParsedReport, TestCaseRecord, TestStatus};

use super::{ParseError, parse_duration_ms};

const ROW: &str = ".test-case, .test, tr.test";
const TITLE: &str = ".name, .test-name";
const STATUS: &str = ".status, .result";
const DURATION: &str = ".duration, .time";
const ERROR: &str = ".error, .failure, .message";

/// Selectors for the class-name conventions used by common HTML test reports.
struct RowSelectors {
    row: Selector,
    title: Selector,
    status: Selector,
    duration: Selector,
    error: Selector,
}

impl RowSelectors {
    fn new() -> Result<Self, ParseError> {
        Ok(Self {
            row: selector(ROW)?,
            title: selector(TITLE)?,
            status: selector(STATUS)?,
            duration: selector(DURATION)?,
            error: selector(ERROR)?,
        })
    }
}

fn selector(css: &'static str) -> Result<Selector, ParseError> {
    Selector::parse(css).map_err(|e| ParseError::Selector {
        selector: css,
        message: e.to_string(),
    })
}

/// Scrape test rows out of an HTML report.
///
/// Each matched row becomes one record. Unknown status text is counted as
/// skipped.
pub fn parse(html: &str) -> Result<ParsedReport, ParseError> {
    let selectors = RowSelectors::new()?;
    let document = Html::parse_document(html);
    let mut report = ParsedReport::default();

    for row in document.select(&selectors.row) {
        let title = first_text(row, &selectors.title).unwrap_or_default();
        let status = first_text(row, &selectors.status)
            .map(|s| TestStatus::normalize(&s))
            .unwrap_or(TestStatus::Skipped);
        let duration_ms = first_text(row, &selectors.duration)
            .map(|d| parse_duration_ms(&d))
            .unwrap_or(0);

        let mut record = TestCaseRecord::new(title, status, duration_ms);
        record.error_message = first_text(row, &selectors.error);
        report.push(record);
    }

    Ok(report)
}

/// Trimmed text of the first descendant matching `selector`, if non-empty.
fn first_text(row: ElementRef<'_>, selector: &Selector) -> Option<String> {
    let element = row.select(selector).next()?;
    let text = element.text().collect::<String>();
    let text = text.trim();
    (!text.is_empty()).then(|| text.to_string())
}
