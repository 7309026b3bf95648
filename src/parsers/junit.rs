use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};

use crate::models::{ParsedReport, TestCaseRecord, TestStatus};

use super::{ParseError, seconds_to_ms};

const TAG_TEST_SUITES: &[u8] = b"testsuites";
const TAG_TEST_SUITE: &[u8] = b"testsuite";
const TAG_TEST_CASE: &[u8] = b"testcase";
const TAG_FAILURE: &[u8] = b"failure";
const TAG_ERROR: &[u8] = b"error";
const TAG_SKIPPED: &[u8] = b"skipped";

/// Parse a JUnit XML document.
///
/// The summary duration is the sum of the suite-declared `time` attributes,
/// not of the individual test cases, so the two may disagree on inconsistent
/// input.
pub fn parse(xml: &str) -> Result<ParsedReport, ParseError> {
    let mut parser = JunitParser::default();
    let mut reader = Reader::from_str(xml);

    loop {
        match reader.read_event()? {
            Event::Start(e) => {
                parser.enter_element()?;
                parser.open_elements.push(local_name(&e));
                parser.open(&e)?;
            }
            Event::Empty(e) => {
                parser.enter_element()?;
                parser.open(&e)?;
                parser.close(e.local_name().as_ref());
                parser.root_closed = parser.open_elements.is_empty();
            }
            Event::End(e) => {
                parser.open_elements.pop();
                parser.close(e.local_name().as_ref());
                parser.root_closed = parser.open_elements.is_empty();
            }
            Event::Text(e) => {
                let text = e.unescape()?;
                if parser.open_elements.is_empty() {
                    if !text.trim().is_empty() {
                        return Err(ParseError::OutsideRoot("text"));
                    }
                } else {
                    parser.text(&text);
                }
            }
            Event::CData(e) => {
                if parser.open_elements.is_empty() {
                    return Err(ParseError::OutsideRoot("CDATA"));
                }
                parser.text(&String::from_utf8_lossy(&e));
            }
            Event::Eof => break,
            _ => (),
        }
    }

    if let Some(unclosed) = parser.open_elements.pop() {
        return Err(ParseError::UnexpectedEof(unclosed));
    }
    if !parser.saw_root {
        return Err(ParseError::MissingTestSuite);
    }
    Ok(parser.report)
}

/// A `<failure>` or `<error>` element seen inside a test case.
#[derive(Debug, Default)]
struct Problem {
    message: Option<String>,
    body: String,
}

#[derive(Debug, Default)]
struct OpenCase {
    title: String,
    classname: Option<String>,
    duration_ms: u64,
    suite: Option<String>,
    skipped: bool,
    failure: Option<Problem>,
    error: Option<Problem>,
}

#[derive(Debug, Clone, Copy)]
enum Capture {
    Failure,
    Error,
}

#[derive(Debug, Default)]
struct JunitParser {
    report: ParsedReport,
    open_elements: Vec<String>,
    /// Names of the enclosing `<testsuite>` elements, innermost last.
    suites: Vec<Option<String>>,
    current_case: Option<OpenCase>,
    capture: Option<Capture>,
    saw_root: bool,
    /// Set once the document element has been closed.
    root_closed: bool,
}

impl JunitParser {
    /// A well-formed document has exactly one root element.
    fn enter_element(&self) -> Result<(), ParseError> {
        if self.root_closed {
            return Err(ParseError::OutsideRoot("element"));
        }
        Ok(())
    }

    fn open(&mut self, e: &BytesStart) -> Result<(), ParseError> {
        match e.local_name().as_ref() {
            TAG_TEST_SUITES => self.saw_root = true,
            TAG_TEST_SUITE => self.open_suite(e)?,
            TAG_TEST_CASE => self.open_case(e)?,
            TAG_SKIPPED => {
                if let Some(case) = self.current_case.as_mut() {
                    case.skipped = true;
                }
            }
            TAG_FAILURE => self.open_problem(e, Capture::Failure)?,
            TAG_ERROR => self.open_problem(e, Capture::Error)?,
            _ => (),
        }
        Ok(())
    }

    fn close(&mut self, tag: &[u8]) {
        match tag {
            TAG_TEST_SUITE => {
                self.suites.pop();
            }
            TAG_TEST_CASE => self.close_case(),
            TAG_FAILURE | TAG_ERROR => self.capture = None,
            _ => (),
        }
    }

    fn open_suite(&mut self, e: &BytesStart) -> Result<(), ParseError> {
        self.saw_root = true;
        // Nested suites are already covered by their parent's declared time.
        if self.suites.is_empty() {
            let time = attr(e, "time")?;
            self.report.summary.duration_ms = self
                .report
                .summary
                .duration_ms
                .saturating_add(seconds_attr(time.as_deref()));
        }
        self.suites.push(attr(e, "name")?);
        Ok(())
    }

    fn open_case(&mut self, e: &BytesStart) -> Result<(), ParseError> {
        // Test cases only count inside a suite.
        if self.suites.is_empty() {
            return Ok(());
        }
        let time = attr(e, "time")?;
        self.current_case = Some(OpenCase {
            title: attr(e, "name")?.unwrap_or_default(),
            classname: attr(e, "classname")?,
            duration_ms: seconds_attr(time.as_deref()),
            suite: self.suites.last().cloned().flatten(),
            ..OpenCase::default()
        });
        Ok(())
    }

    fn open_problem(&mut self, e: &BytesStart, kind: Capture) -> Result<(), ParseError> {
        let Some(case) = self.current_case.as_mut() else {
            return Ok(());
        };
        let slot = match kind {
            Capture::Failure => &mut case.failure,
            Capture::Error => &mut case.error,
        };
        // Only the first element of each kind counts.
        if slot.is_some() {
            return Ok(());
        }
        *slot = Some(Problem {
            message: attr(e, "message")?,
            body: String::new(),
        });
        self.capture = Some(kind);
        Ok(())
    }

    fn text(&mut self, text: &str) {
        let (Some(kind), Some(case)) = (self.capture, self.current_case.as_mut()) else {
            return;
        };
        let slot = match kind {
            Capture::Failure => &mut case.failure,
            Capture::Error => &mut case.error,
        };
        if let Some(problem) = slot.as_mut() {
            problem.body.push_str(text);
        }
    }

    fn close_case(&mut self) {
        let Some(case) = self.current_case.take() else {
            return;
        };
        self.capture = None;

        let mut record = TestCaseRecord::new(case.title, TestStatus::Passed, case.duration_ms);
        record.file = case.classname;
        record.suite = case.suite;

        if case.skipped {
            record.status = TestStatus::Skipped;
        } else if let Some(problem) = case.failure.or(case.error) {
            record.status = TestStatus::Failed;
            record.error_message = problem.message;
            let body = problem.body.trim();
            record.error_stack = (!body.is_empty()).then(|| body.to_string());
        }

        self.report.summary.count(record.status);
        self.report.test_cases.push(record);
    }
}

fn local_name(e: &BytesStart) -> String {
    String::from_utf8_lossy(e.local_name().as_ref()).into_owned()
}

fn attr(e: &BytesStart, name: &str) -> Result<Option<String>, ParseError> {
    let Some(attribute) = e
        .try_get_attribute(name)
        .map_err(quick_xml::Error::from)?
    else {
        return Ok(None);
    };
    Ok(Some(attribute.unescape_value()?.into_owned()))
}

fn seconds_attr(raw: Option<&str>) -> u64 {
    raw.and_then(|s| s.trim().parse::<f64>().ok())
        .map(seconds_to_ms)
        .unwrap_or(0)
}
