pub mod result;
pub mod status;

pub use result::{ParsedReport, RunSummary, TestCaseRecord};
pub use status::TestStatus;
