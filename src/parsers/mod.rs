pub mod excel;
pub mod html;
pub mod junit;

use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::models::ParsedReport;

/// Errors raised while turning one report file into a [`ParsedReport`].
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed XML: {0}")]
    Xml(#[from] quick_xml::Error),

    #[error("malformed XML: document ended inside <{0}>")]
    UnexpectedEof(String),

    #[error("malformed XML: {0} outside the root element")]
    OutsideRoot(&'static str),

    #[error("no <testsuite> element found")]
    MissingTestSuite,

    #[error("invalid selector {selector:?}: {message}")]
    Selector {
        selector: &'static str,
        message: String,
    },

    #[error("failed to read workbook: {0}")]
    Excel(#[from] calamine::Error),
}

/// Parser strategy chosen from a report file's extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportFormat {
    Junit,
    Html,
    Excel,
}

impl ReportFormat {
    /// Pick a parser by lower-cased extension. No content sniffing is done.
    pub fn detect(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        match ext.as_str() {
            "xml" => Some(ReportFormat::Junit),
            "html" | "htm" => Some(ReportFormat::Html),
            "xlsx" | "xls" => Some(ReportFormat::Excel),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            ReportFormat::Junit => "JUnit XML",
            ReportFormat::Html => "HTML",
            ReportFormat::Excel => "Excel",
        }
    }

    /// Read and parse the file at `path` with this format's parser.
    pub fn parse_file(&self, path: &Path) -> Result<ParsedReport, ParseError> {
        match self {
            ReportFormat::Junit => junit::parse(&read_text(path)?),
            ReportFormat::Html => html::parse(&read_text(path)?),
            ReportFormat::Excel => excel::parse_workbook(path),
        }
    }
}

fn read_text(path: &Path) -> Result<String, ParseError> {
    let bytes = std::fs::read(path).map_err(|source| ParseError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

/// Convert seconds to whole milliseconds. Negative, NaN and infinite values become 0.
pub fn seconds_to_ms(secs: f64) -> u64 {
    if secs.is_finite() && secs > 0.0 {
        (secs * 1000.0).round() as u64
    } else {
        0
    }
}

/// Parse a human-written duration into milliseconds.
///
/// The leading number is read the way a lenient float parser would, so
/// `"1.5s"` and `"1.5 sec"` both work. The number is taken as seconds unless
/// it is followed by `ms`. Anything unparsable is 0.
pub fn parse_duration_ms(text: &str) -> u64 {
    let text = text.trim();
    let end = numeric_prefix_len(text);
    let Ok(value) = text[..end].parse::<f64>() else {
        return 0;
    };
    if text[end..].trim().eq_ignore_ascii_case("ms") {
        seconds_to_ms(value / 1000.0)
    } else {
        seconds_to_ms(value)
    }
}

fn numeric_prefix_len(text: &str) -> usize {
    let bytes = text.as_bytes();
    let mut end = 0;
    if matches!(bytes.first(), Some(b'+' | b'-')) {
        end += 1;
    }
    let mut seen_dot = false;
    while let Some(&b) = bytes.get(end) {
        match b {
            b'0'..=b'9' => end += 1,
            b'.' if !seen_dot => {
                seen_dot = true;
                end += 1;
            }
            _ => break,
        }
    }
    end
}
