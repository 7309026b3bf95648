use std::path::Path;

use calamine::{Data, Range, Reader, open_workbook_auto};

use crate::models::{ParsedReport, TestCaseRecord, TestStatus};

use super::{ParseError, parse_duration_ms, seconds_to_ms};

/// Header aliases, tried in priority order.
const TITLE_COLUMNS: &[&str] = &["Test Name", "Name", "Test"];
const STATUS_COLUMNS: &[&str] = &["Status", "Result"];
const DURATION_COLUMNS: &[&str] = &["Duration", "Time"];
const ERROR_COLUMNS: &[&str] = &["Error", "Message"];

/// Read the first sheet of an `.xlsx`/`.xls` workbook.
pub fn parse_workbook(path: &Path) -> Result<ParsedReport, ParseError> {
    let mut workbook = open_workbook_auto(path)?;
    match workbook.worksheet_range_at(0) {
        Some(range) => Ok(parse_range(&range?)),
        None => Ok(ParsedReport::default()),
    }
}

/// Interpret a sheet whose first row is a header, one test case per row.
pub fn parse_range(range: &Range<Data>) -> ParsedReport {
    let mut report = ParsedReport::default();
    let mut rows = range.rows();
    let Some(header) = rows.next() else {
        return report;
    };
    let columns = Columns::locate(header);

    for row in rows.filter(|row| !row.iter().all(is_blank)) {
        let title = first_text(row, &columns.title).unwrap_or_default();
        let status = first_text(row, &columns.status)
            .map(|s| TestStatus::normalize(&s))
            .unwrap_or(TestStatus::Skipped);
        let duration_ms = columns
            .duration
            .iter()
            .find_map(|&i| row.get(i).and_then(cell_duration_ms))
            .unwrap_or(0);

        let mut record = TestCaseRecord::new(title, status, duration_ms);
        record.error_message = first_text(row, &columns.error);
        report.push(record);
    }

    report
}

/// Column indexes for each field, ordered by alias priority.
#[derive(Debug, Default)]
struct Columns {
    title: Vec<usize>,
    status: Vec<usize>,
    duration: Vec<usize>,
    error: Vec<usize>,
}

impl Columns {
    fn locate(header: &[Data]) -> Self {
        let find = |aliases: &[&str]| -> Vec<usize> {
            aliases
                .iter()
                .filter_map(|alias| {
                    header
                        .iter()
                        .position(|cell| matches!(cell, Data::String(s) if s.trim() == *alias))
                })
                .collect()
        };
        Self {
            title: find(TITLE_COLUMNS),
            status: find(STATUS_COLUMNS),
            duration: find(DURATION_COLUMNS),
            error: find(ERROR_COLUMNS),
        }
    }
}

fn is_blank(cell: &Data) -> bool {
    match cell {
        Data::Empty => true,
        Data::String(s) => s.trim().is_empty(),
        _ => false,
    }
}

fn first_text(row: &[Data], columns: &[usize]) -> Option<String> {
    columns.iter().find_map(|&i| row.get(i).and_then(cell_text))
}

fn cell_text(cell: &Data) -> Option<String> {
    let text = match cell {
        Data::Empty | Data::Error(_) => return None,
        Data::String(s) => s.trim().to_string(),
        other => other.to_string(),
    };
    (!text.is_empty()).then_some(text)
}

/// Numeric cells are seconds; text cells go through the lenient duration parser.
/// Date and time cells hold a day fraction.
fn cell_duration_ms(cell: &Data) -> Option<u64> {
    match cell {
        Data::Float(f) => Some(seconds_to_ms(*f)),
        Data::Int(i) => Some(seconds_to_ms(*i as f64)),
        Data::DateTime(dt) => Some(seconds_to_ms(dt.as_f64() * SECONDS_PER_DAY)),
        Data::DurationIso(s) => iso_duration_seconds(s).map(seconds_to_ms),
        Data::String(s) if !s.trim().is_empty() => Some(parse_duration_ms(s)),
        _ => None,
    }
}

const SECONDS_PER_DAY: f64 = 86_400.0;

/// Seconds in an ISO 8601 duration made of days and time parts, e.g. `PT1M30.5S`.
fn iso_duration_seconds(text: &str) -> Option<f64> {
    let rest = text.trim().strip_prefix('P')?;
    let (days, time) = match rest.split_once('T') {
        Some((days, time)) => (days, time),
        None => (rest, ""),
    };

    let mut seconds = 0.0;
    for (part, units) in [(days, &DATE_UNITS[..]), (time, &TIME_UNITS[..])] {
        let mut number = String::new();
        for c in part.chars() {
            if c.is_ascii_digit() || c == '.' {
                number.push(c);
                continue;
            }
            let (_, scale) = units.iter().find(|(unit, _)| *unit == c)?;
            seconds += number.parse::<f64>().ok()? * scale;
            number.clear();
        }
        if !number.is_empty() {
            return None;
        }
    }
    Some(seconds)
}

const DATE_UNITS: [(char, f64); 1] = [('D', SECONDS_PER_DAY)];
const TIME_UNITS: [(char, f64); 3] = [('H', 3600.0), ('M', 60.0), ('S', 1.0)];

#[cfg(test)]
mod tests {
    use calamine::{ExcelDateTime, ExcelDateTimeType};

    use super::*;
    use crate::models::RunSummary;

    fn sheet(rows: &[&[Data]]) -> Range<Data> {
        let width = rows.iter().map(|r| r.len()).max().unwrap_or(1) as u32;
        let mut range = Range::new((0, 0), (rows.len() as u32 - 1, width - 1));
        for (r, row) in rows.iter().enumerate() {
            for (c, cell) in row.iter().enumerate() {
                range.set_value((r as u32, c as u32), cell.clone());
            }
        }
        range
    }

    fn s(text: &str) -> Data {
        Data::String(text.to_string())
    }

    #[test]
    fn maps_aliased_columns() {
        let range = sheet(&[
            &[s("Test Name"), s("Status"), s("Duration"), s("Error")],
            &[s("login"), s("pass"), Data::Float(1.5), Data::Empty],
            &[s("logout"), s("FAIL"), s("250ms"), s("timeout")],
            &[s("export"), s("skip"), Data::Int(2), Data::Empty],
        ]);
        let report = parse_range(&range);

        assert_eq!(
            report.summary,
            RunSummary {
                total: 3,
                passed: 1,
                failed: 1,
                skipped: 1,
                duration_ms: 3750,
            }
        );
        assert_eq!(report.test_cases[1].error_message.as_deref(), Some("timeout"));
        assert_eq!(report.test_cases[1].duration_ms, 250);
        assert!(report.test_cases[0].error_message.is_none());
    }

    #[test]
    fn unknown_status_counts_as_skipped() {
        let range = sheet(&[
            &[s("Name"), s("Result")],
            &[s("a"), s("pass")],
            &[s("b"), s("blocked")],
        ]);
        let report = parse_range(&range);

        assert_eq!(report.test_cases[0].status, TestStatus::Passed);
        assert_eq!(report.test_cases[1].status, TestStatus::Skipped);
        assert_eq!(report.summary.total, 2);
        assert_eq!(report.summary.skipped, 1);
        assert!(report.summary.is_consistent());
    }

    #[test]
    fn alias_priority_falls_through_empty_cells() {
        let range = sheet(&[
            &[s("Test"), s("Name"), s("Test Name"), s("Status"), s("Time"), s("Message")],
            &[s("t"), s("n"), s("tn"), s("pass"), Data::Float(0.1), s("m")],
            &[s("t"), s("n"), Data::Empty, s("pass"), Data::Empty, Data::Empty],
            &[s("t"), Data::Empty, Data::Empty, s("pass"), Data::Empty, Data::Empty],
        ]);
        let report = parse_range(&range);

        let titles: Vec<_> = report.test_cases.iter().map(|t| t.title.as_str()).collect();
        assert_eq!(titles, ["tn", "n", "t"]);
        assert_eq!(report.test_cases[0].duration_ms, 100);
        assert_eq!(report.test_cases[0].error_message.as_deref(), Some("m"));
        assert_eq!(report.test_cases[1].duration_ms, 0);
    }

    #[test]
    fn blank_rows_are_ignored() {
        let range = sheet(&[
            &[s("Name"), s("Status")],
            &[s("a"), s("pass")],
            &[Data::Empty, s("  ")],
            &[s("b"), s("fail")],
        ]);
        let report = parse_range(&range);
        assert_eq!(report.summary.total, 2);
        assert_eq!(report.summary.failed, 1);
    }

    #[test]
    fn header_only_sheet_is_empty() {
        let report = parse_range(&sheet(&[&[s("Name"), s("Status")]]));
        assert_eq!(report, ParsedReport::default());
        assert_eq!(parse_range(&Range::empty()), ParsedReport::default());
    }

    #[test]
    fn time_formatted_durations_are_converted() {
        let range = sheet(&[
            &[s("Test Name"), s("Status"), s("Time")],
            &[
                s("clock"),
                s("pass"),
                Data::DateTime(ExcelDateTime::new(
                    90.0 / 86_400.0,
                    ExcelDateTimeType::TimeDelta,
                    false,
                )),
            ],
            &[s("iso"), s("pass"), Data::DurationIso("PT1M2.5S".into())],
        ]);
        let report = parse_range(&range);

        assert_eq!(report.test_cases[0].duration_ms, 90_000);
        assert_eq!(report.test_cases[1].duration_ms, 62_500);
        assert_eq!(report.summary.duration_ms, 152_500);
    }

    #[test]
    fn iso_durations() {
        assert_eq!(iso_duration_seconds("PT1H30M"), Some(5400.0));
        assert_eq!(iso_duration_seconds("P1DT1S"), Some(86_401.0));
        assert_eq!(iso_duration_seconds("PT0.25S"), Some(0.25));
        assert_eq!(iso_duration_seconds("1:30"), None);
        assert_eq!(iso_duration_seconds("PT5"), None);
    }

    #[test]
    fn unreadable_workbook_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.xlsx");
        std::fs::write(&path, b"this is not a zip archive").unwrap();

        let err = parse_workbook(&path).unwrap_err();
        assert!(matches!(err, ParseError::Excel(_)), "{err:?}");
    }
}
