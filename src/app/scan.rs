use std::path::{Path, PathBuf};

use glob::Pattern;
use log::debug;
use thiserror::Error;

use crate::parsers::ReportFormat;

#[derive(Debug, Error)]
pub enum ScanError {
    #[error("reports directory {} does not exist", .0.display())]
    MissingDir(PathBuf),

    #[error("{} is not a directory", .0.display())]
    NotADirectory(PathBuf),

    #[error("failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid glob pattern {pattern:?}: {source}")]
    Pattern {
        pattern: String,
        #[source]
        source: glob::PatternError,
    },

    #[error("no report files found in {}", .0.display())]
    NoReports(PathBuf),
}

/// List the report files directly inside `dir`, in name order.
///
/// Only files with a supported extension are kept. `ignore` holds glob
/// patterns matched against each file's path relative to `dir`.
pub fn discover(dir: &Path, ignore: &[String]) -> Result<Vec<PathBuf>, ScanError> {
    let dir = std::path::absolute(dir).map_err(|source| ScanError::Io {
        path: dir.to_path_buf(),
        source,
    })?;
    if !dir.exists() {
        return Err(ScanError::MissingDir(dir));
    }
    if !dir.is_dir() {
        return Err(ScanError::NotADirectory(dir));
    }
    // Surface permission problems here; glob would silently yield nothing.
    std::fs::read_dir(&dir).map_err(|source| ScanError::Io {
        path: dir.clone(),
        source,
    })?;

    let ignore = ignore
        .iter()
        .map(|pattern| {
            Pattern::new(pattern).map_err(|source| ScanError::Pattern {
                pattern: pattern.clone(),
                source,
            })
        })
        .collect::<Result<Vec<_>, _>>()?;

    let pattern = PathBuf::from(Pattern::escape(&dir.to_string_lossy())).join("*");
    let pattern = pattern.to_string_lossy().to_string();
    let entries = glob::glob(&pattern).map_err(|source| ScanError::Pattern {
        pattern: pattern.clone(),
        source,
    })?;

    let mut files = Vec::new();
    for entry in entries {
        let path = entry.map_err(|e| ScanError::Io {
            path: e.path().to_path_buf(),
            source: e.into(),
        })?;
        if !path.is_file() || ReportFormat::detect(&path).is_none() {
            continue;
        }
        let relative = path.strip_prefix(&dir).unwrap_or(&path);
        if ignore.iter().any(|p| p.matches_path(relative)) {
            debug!("Ignoring {}", path.display());
            continue;
        }
        files.push(path);
    }

    if files.is_empty() {
        return Err(ScanError::NoReports(dir));
    }
    Ok(files)
}
